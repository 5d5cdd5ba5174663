use anyhow::anyhow;
use async_trait::async_trait;
use tracing::{info, instrument};

use crate::api::{RemoteScanAPI, ScanPhase};
use crate::error::{ApiError, ScanError};
use crate::settings::Settings;
use crate::state::{ScanSession, ScanState};

use super::{Poll, StepHandler, WorkflowStep, poll_status, require_build};

/// Waits for a scan this run did not submit, typically the one the remote
/// launches itself after an auto-scan pre-scan.
pub struct CheckPendingScansStep;

#[async_trait]
impl StepHandler for CheckPendingScansStep {
    fn step(&self) -> WorkflowStep {
        WorkflowStep::CheckPendingScans
    }

    #[instrument(skip_all, fields(app_id = %settings.app_id))]
    async fn run(
        &self,
        settings: &Settings,
        session: &mut ScanSession,
        api: &dyn RemoteScanAPI,
    ) -> Result<(), ScanError> {
        let build = require_build(session, self.step())?;

        let step = self.step();
        let report = poll_status(api, &build, &settings.poll, step, |report| {
            match report.phase {
                ScanPhase::Failed | ScanPhase::PrescanFailed => {
                    Err(ScanError::Remote(ApiError::permanent(anyhow!(
                        "pending scan failed with status {:?}",
                        report.raw_status
                    ))))
                }
                ScanPhase::ResultsReady => Ok(Poll::Done),
                ScanPhase::ScanRunning => {
                    session.advance_min(step, ScanState::ScanInProgress);
                    Ok(Poll::Continue)
                }
                _ => Ok(Poll::Continue),
            }
        })
        .await?;

        session.record_status(&report.raw_status);
        session.advance_min(self.step(), ScanState::ScanComplete);
        info!("no scans pending");
        Ok(())
    }
}
