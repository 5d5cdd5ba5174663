use anyhow::anyhow;
use async_trait::async_trait;
use tracing::{info, instrument, warn};

use crate::api::{PrescanOptions, RemoteScanAPI, ScanPhase, StatusReport};
use crate::error::{ApiError, ScanError};
use crate::settings::Settings;
use crate::state::{ScanSession, ScanState};

use super::{Poll, StepHandler, WorkflowStep, poll_status, require_build};

/// Submits the pre-scan validation pass and waits for it to finish.
///
/// With `auto_scan` the remote launches the full scan on its own once the
/// pre-scan succeeds; the status may therefore already be past
/// `PrescanSuccess` when polling catches up, which still counts as done.
pub struct BeginPrescanStep;

/// Module errors become warnings when non-fatal top-level modules are
/// scanned anyway; otherwise they sink the step.
pub(crate) fn apply_module_policy(
    settings: &Settings,
    session: &mut ScanSession,
    report: &StatusReport,
) -> Result<(), ScanError> {
    if report.module_errors.is_empty() {
        return Ok(());
    }
    if settings.scan_all_nonfatal_top_level_modules {
        for error in &report.module_errors {
            warn!(module_error = %error, "remote reported a non-fatal module error");
            session.record_warning(format!("module error: {error}"));
        }
        Ok(())
    } else {
        Err(ScanError::Remote(ApiError::permanent(anyhow!(
            "remote reported fatal module errors: {}",
            report.module_errors.join("; ")
        ))))
    }
}

#[async_trait]
impl StepHandler for BeginPrescanStep {
    fn step(&self) -> WorkflowStep {
        WorkflowStep::BeginPrescan
    }

    #[instrument(skip_all, fields(app_id = %settings.app_id))]
    async fn run(
        &self,
        settings: &Settings,
        session: &mut ScanSession,
        api: &dyn RemoteScanAPI,
    ) -> Result<(), ScanError> {
        let build = require_build(session, self.step())?;
        let options = PrescanOptions {
            auto_scan: settings.auto_scan,
            scan_all_nonfatal_top_level_modules: settings.scan_all_nonfatal_top_level_modules,
        };

        let ack = api.begin_prescan(&build, &options).await?;
        info!(status = %ack.status, "pre-scan submitted");
        session.advance_min(self.step(), ScanState::PrescanSubmitted);

        let report = poll_status(api, &build, &settings.poll, self.step(), |report| {
            match report.phase {
                ScanPhase::PrescanFailed | ScanPhase::Failed => {
                    Err(ScanError::Remote(ApiError::permanent(anyhow!(
                        "pre-scan failed with status {:?}",
                        report.raw_status
                    ))))
                }
                phase if phase >= ScanPhase::PrescanSuccess => Ok(Poll::Done),
                _ => Ok(Poll::Continue),
            }
        })
        .await?;

        session.record_status(&report.raw_status);
        apply_module_policy(settings, session, &report)?;
        session.advance_min(self.step(), ScanState::PrescanComplete);
        if settings.auto_scan {
            info!("pre-scan complete; remote will start the scan automatically");
        } else {
            info!("pre-scan complete");
        }
        Ok(())
    }
}
