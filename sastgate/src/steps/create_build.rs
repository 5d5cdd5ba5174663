use async_trait::async_trait;
use tracing::{info, instrument};

use crate::api::RemoteScanAPI;
use crate::error::ScanError;
use crate::settings::Settings;
use crate::state::{ScanSession, ScanState};

use super::{StepHandler, WorkflowStep};

/// Registers a new build of the application with the remote service.
pub struct CreateBuildStep;

#[async_trait]
impl StepHandler for CreateBuildStep {
    fn step(&self) -> WorkflowStep {
        WorkflowStep::CreateBuild
    }

    #[instrument(skip_all, fields(app_id = %settings.app_id, build_id = %settings.build_id))]
    async fn run(
        &self,
        settings: &Settings,
        session: &mut ScanSession,
        api: &dyn RemoteScanAPI,
    ) -> Result<(), ScanError> {
        let build = api
            .create_build(
                &settings.app_id,
                &settings.build_id,
                settings.sandbox.as_deref(),
            )
            .await?;
        info!(build_id = %build.build_id, "build created");
        session.set_build(build);
        session.advance(self.step(), ScanState::BuildCreated)?;
        Ok(())
    }
}
