use anyhow::anyhow;
use async_trait::async_trait;
use tracing::{info, instrument};

use crate::api::{RemoteScanAPI, ScanOptions, ScanPhase};
use crate::error::{ApiError, ScanError};
use crate::settings::Settings;
use crate::state::{ScanSession, ScanState};

use super::{Poll, StepHandler, WorkflowStep, poll_status, require_build};

/// Launches the full static-analysis scan and waits for results.
pub struct BeginScanStep;

#[async_trait]
impl StepHandler for BeginScanStep {
    fn step(&self) -> WorkflowStep {
        WorkflowStep::BeginScan
    }

    #[instrument(skip_all, fields(app_id = %settings.app_id))]
    async fn run(
        &self,
        settings: &Settings,
        session: &mut ScanSession,
        api: &dyn RemoteScanAPI,
    ) -> Result<(), ScanError> {
        let build = require_build(session, self.step())?;

        let ack = api.begin_scan(&build, &ScanOptions::default()).await?;
        info!(status = %ack.status, "scan submitted");
        session.advance_min(self.step(), ScanState::ScanSubmitted);

        let step = self.step();
        let report = poll_status(api, &build, &settings.poll, step, |report| {
            match report.phase {
                ScanPhase::Failed | ScanPhase::PrescanFailed => {
                    Err(ScanError::Remote(ApiError::permanent(anyhow!(
                        "scan failed with status {:?}",
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
        info!("scan complete");
        Ok(())
    }
}
