use async_trait::async_trait;
use tracing::{info, instrument, warn};

use crate::api::RemoteScanAPI;
use crate::error::ScanError;
use crate::outcome::ComplianceVerdict;
use crate::settings::Settings;
use crate::state::{ScanSession, ScanState};

use super::{StepHandler, WorkflowStep};

/// Retrieves the policy-compliance verdict for the application.
///
/// The observed verdict is always recorded as-is; whether it gates the run
/// is decided later from `ignore_compliance_status`.
pub struct CheckComplianceStep;

#[async_trait]
impl StepHandler for CheckComplianceStep {
    fn step(&self) -> WorkflowStep {
        WorkflowStep::CheckCompliance
    }

    #[instrument(skip_all, fields(app_id = %settings.app_id))]
    async fn run(
        &self,
        settings: &Settings,
        session: &mut ScanSession,
        api: &dyn RemoteScanAPI,
    ) -> Result<(), ScanError> {
        let verdict = api
            .get_compliance(&settings.app_id, settings.sandbox.as_deref())
            .await?;

        session.set_verdict(verdict);
        session.record_status(verdict.to_string());
        session.advance_min(self.step(), ScanState::ResultsRetrieved);
        session.advance_min(self.step(), ScanState::terminal_for(verdict));

        match verdict {
            ComplianceVerdict::Passed => {
                info!(verdict = %verdict, "application is in compliance");
            }
            ComplianceVerdict::Failed | ComplianceVerdict::Conflict => {
                warn!(verdict = %verdict, "application is not in compliance");
            }
            ComplianceVerdict::NotAssessed | ComplianceVerdict::Unknown => {
                warn!(verdict = %verdict, "unable to determine the compliance status");
            }
        }
        Ok(())
    }
}
