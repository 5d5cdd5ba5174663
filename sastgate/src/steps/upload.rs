use async_trait::async_trait;
use tracing::{info, instrument};

use crate::api::RemoteScanAPI;
use crate::artifacts;
use crate::error::ScanError;
use crate::settings::Settings;
use crate::state::{ScanSession, ScanState};

use super::{StepHandler, WorkflowStep, require_build};

/// Uploads every whitelisted artifact from the build directory.
///
/// Re-uploading the same filename after a transient failure overwrites the
/// previous copy remotely, so the whole step can be retried safely.
pub struct UploadStep;

#[async_trait]
impl StepHandler for UploadStep {
    fn step(&self) -> WorkflowStep {
        WorkflowStep::Upload
    }

    #[instrument(skip_all, fields(build_dir = %settings.build_dir.display()))]
    async fn run(
        &self,
        settings: &Settings,
        session: &mut ScanSession,
        api: &dyn RemoteScanAPI,
    ) -> Result<(), ScanError> {
        let build = require_build(session, self.step())?;
        let artifacts = artifacts::collect(&settings.build_dir)?;
        info!(count = artifacts.len(), "beginning artifact uploads");

        for artifact in &artifacts {
            let ack = api.upload_artifact(&build, artifact).await?;
            info!(artifact = %ack.filename, "uploaded");
        }

        session.advance(self.step(), ScanState::ArtifactUploaded)?;
        Ok(())
    }
}
