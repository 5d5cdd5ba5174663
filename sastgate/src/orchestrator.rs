use std::sync::Arc;

use tracing::{error, info, instrument, warn};

use crate::api::RemoteScanAPI;
use crate::error::ScanError;
use crate::outcome::{ComplianceVerdict, Outcome, StepRecord, StepStatus};
use crate::settings::Settings;
use crate::state::{self, ScanSession};
use crate::steps::{StepHandler, StepRegistry, WorkflowStep};

/// Drives one scan lifecycle: validates the requested workflow, executes its
/// steps in order with retry discipline, and folds the terminal state into
/// an [`Outcome`].
pub struct Orchestrator {
    api: Arc<dyn RemoteScanAPI>,
    registry: StepRegistry,
}

impl Orchestrator {
    pub fn new(api: Arc<dyn RemoteScanAPI>) -> Self {
        Self::with_registry(api, StepRegistry::default())
    }

    pub fn with_registry(api: Arc<dyn RemoteScanAPI>, registry: StepRegistry) -> Self {
        Self { api, registry }
    }

    /// Run the configured workflow to completion.
    ///
    /// `Configuration` and `Sequence` errors are raised here, before any
    /// remote call. Once the first step starts, every failure is folded
    /// into the returned [`Outcome`] instead.
    #[instrument(skip_all, fields(app_id = %settings.app_id, build_id = %settings.build_id))]
    pub async fn run(&self, settings: &Settings) -> Result<Outcome, ScanError> {
        self.registry.validate(&settings.workflow)?;
        state::validate_order(settings.workflow.iter().map(|s| (*s, s.spec())))?;
        settings.ensure_remote_ready()?;

        let mut session = ScanSession::new(&settings.app_id);
        let mut records: Vec<StepRecord> = Vec::with_capacity(settings.workflow.len());
        let mut aborted = false;

        for (index, step) in settings.workflow.iter().copied().enumerate() {
            let Some(handler) = self.registry.get(step) else {
                return Err(ScanError::Configuration(format!(
                    "no handler registered for workflow step {step}"
                )));
            };

            match self
                .run_with_retry(handler, step, settings, &mut session)
                .await
            {
                Ok(()) => {
                    info!(step = %step, state = %session.state(), "workflow step complete");
                    records.push(StepRecord {
                        step,
                        status: StepStatus::Succeeded,
                        message: session.last_status().unwrap_or_default().to_string(),
                    });
                }
                Err(err) => {
                    let status = match &err {
                        ScanError::Timeout { .. } => StepStatus::TimedOut,
                        _ => StepStatus::Failed,
                    };
                    error!(step = %step, error = %err, "workflow step failed");
                    records.push(StepRecord {
                        step,
                        status,
                        message: err.to_string(),
                    });
                    for skipped in settings.workflow[index + 1..].iter().copied() {
                        records.push(StepRecord {
                            step: skipped,
                            status: StepStatus::Skipped,
                            message: String::new(),
                        });
                    }
                    aborted = true;
                    break;
                }
            }
        }

        let success = derive_success(!aborted, session.verdict(), settings.ignore_compliance_status);
        if success
            && matches!(
                session.verdict(),
                Some(ComplianceVerdict::Failed | ComplianceVerdict::Conflict)
            )
        {
            warn!("application is out of compliance; passing anyway by configuration");
        }

        Ok(Outcome {
            success,
            verdict: session.verdict().unwrap_or(ComplianceVerdict::NotAssessed),
            steps: records,
            warnings: session.warnings().to_vec(),
        })
    }

    /// Invoke one handler, absorbing transient failures with exponential
    /// backoff until the attempt or wall-clock budget runs out.
    async fn run_with_retry(
        &self,
        handler: &dyn StepHandler,
        step: WorkflowStep,
        settings: &Settings,
        session: &mut ScanSession,
    ) -> Result<(), ScanError> {
        let policy = &settings.retry;
        let started = tokio::time::Instant::now();
        let mut backoff = policy.initial_backoff;

        loop {
            let attempt = session.note_attempt(step);
            match handler.run(settings, session, self.api.as_ref()).await {
                Ok(()) => return Ok(()),
                Err(err)
                    if err.is_transient()
                        && attempt < policy.max_attempts
                        && started.elapsed() + backoff < policy.max_elapsed =>
                {
                    warn!(
                        step = %step,
                        attempt,
                        backoff_secs = backoff.as_secs(),
                        error = %err,
                        "transient remote failure; retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    backoff = (backoff * 2).min(policy.max_backoff);
                }
                Err(err) => return Err(err),
            }
        }
    }
}

/// The run passes when every step succeeded and the verdict, if one was
/// retrieved, allows it. An indeterminate verdict never passes: the ignore
/// flag overrides a known non-compliance, not the absence of an answer.
fn derive_success(
    steps_ok: bool,
    verdict: Option<ComplianceVerdict>,
    ignore_compliance_status: bool,
) -> bool {
    if !steps_ok {
        return false;
    }
    match verdict {
        None | Some(ComplianceVerdict::Passed) => true,
        Some(ComplianceVerdict::Failed | ComplianceVerdict::Conflict) => ignore_compliance_status,
        Some(ComplianceVerdict::NotAssessed | ComplianceVerdict::Unknown) => false,
    }
}
