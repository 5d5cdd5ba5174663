pub mod begin_prescan;
pub mod begin_scan;
pub mod check_compliance;
pub mod check_pending;
pub mod create_build;
pub mod upload;

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use serde::Serialize;

use crate::api::{BuildRef, RemoteScanAPI, StatusReport};
use crate::error::ScanError;
use crate::settings::{PollPolicy, Settings};
use crate::state::{ScanSession, ScanState};

pub use begin_prescan::BeginPrescanStep;
pub use begin_scan::BeginScanStep;
pub use check_compliance::CheckComplianceStep;
pub use check_pending::CheckPendingScansStep;
pub use create_build::CreateBuildStep;
pub use upload::UploadStep;

/// One step of the scan lifecycle, as named on the CLI and in config files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStep {
    CreateBuild,
    Upload,
    BeginPrescan,
    BeginScan,
    CheckPendingScans,
    CheckCompliance,
}

impl WorkflowStep {
    pub const ALL: [WorkflowStep; 6] = [
        WorkflowStep::CreateBuild,
        WorkflowStep::Upload,
        WorkflowStep::BeginPrescan,
        WorkflowStep::BeginScan,
        WorkflowStep::CheckPendingScans,
        WorkflowStep::CheckCompliance,
    ];

    /// State-machine contract for this step: the minimum state it may run
    /// from, the state it leaves behind, and whether it is a waiting step
    /// (idempotent transitions) rather than a submitting one.
    pub fn spec(&self) -> StepSpec {
        match self {
            WorkflowStep::CreateBuild => StepSpec {
                min: ScanState::NotStarted,
                result: ScanState::BuildCreated,
                waits: false,
            },
            WorkflowStep::Upload => StepSpec {
                min: ScanState::BuildCreated,
                result: ScanState::ArtifactUploaded,
                waits: false,
            },
            WorkflowStep::BeginPrescan => StepSpec {
                min: ScanState::ArtifactUploaded,
                result: ScanState::PrescanComplete,
                waits: false,
            },
            WorkflowStep::BeginScan => StepSpec {
                min: ScanState::PrescanComplete,
                result: ScanState::ScanComplete,
                waits: false,
            },
            WorkflowStep::CheckPendingScans => StepSpec {
                min: ScanState::PrescanComplete,
                result: ScanState::ScanComplete,
                waits: true,
            },
            WorkflowStep::CheckCompliance => StepSpec {
                min: ScanState::NotStarted,
                result: ScanState::ResultsRetrieved,
                waits: true,
            },
        }
    }
}

impl fmt::Display for WorkflowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = match self {
            WorkflowStep::CreateBuild => "create_build",
            WorkflowStep::Upload => "upload",
            WorkflowStep::BeginPrescan => "begin_prescan",
            WorkflowStep::BeginScan => "begin_scan",
            WorkflowStep::CheckPendingScans => "check_pending_scans",
            WorkflowStep::CheckCompliance => "check_compliance",
        };
        f.write_str(tag)
    }
}

impl FromStr for WorkflowStep {
    type Err = ScanError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "create_build" => Ok(WorkflowStep::CreateBuild),
            "upload" => Ok(WorkflowStep::Upload),
            "begin_prescan" => Ok(WorkflowStep::BeginPrescan),
            "begin_scan" => Ok(WorkflowStep::BeginScan),
            "check_pending_scans" => Ok(WorkflowStep::CheckPendingScans),
            "check_compliance" => Ok(WorkflowStep::CheckCompliance),
            other => Err(ScanError::Configuration(format!(
                "unknown workflow step: {other}"
            ))),
        }
    }
}

/// Ordering contract a step imposes on the scan state machine.
#[derive(Debug, Clone, Copy)]
pub struct StepSpec {
    pub min: ScanState,
    pub result: ScanState,
    pub waits: bool,
}

/// A workflow step handler. Implementations perform one logical remote
/// operation (plus any status polling it implies) and advance the session.
#[async_trait]
pub trait StepHandler: Send + Sync {
    fn step(&self) -> WorkflowStep;

    async fn run(
        &self,
        settings: &Settings,
        session: &mut ScanSession,
        api: &dyn RemoteScanAPI,
    ) -> Result<(), ScanError>;
}

/// Lookup from step tag to handler. New steps register here without the
/// orchestrator changing; ordering legality is the state machine's concern,
/// not the registry's.
pub struct StepRegistry {
    handlers: HashMap<WorkflowStep, Box<dyn StepHandler>>,
}

impl StepRegistry {
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, handler: Box<dyn StepHandler>) {
        self.handlers.insert(handler.step(), handler);
    }

    pub fn get(&self, step: WorkflowStep) -> Option<&dyn StepHandler> {
        self.handlers.get(&step).map(Box::as_ref)
    }

    /// Pre-flight check of a requested step list: non-empty, every step
    /// registered, no step repeated back-to-back.
    pub fn validate(&self, workflow: &[WorkflowStep]) -> Result<(), ScanError> {
        if workflow.is_empty() {
            return Err(ScanError::Configuration(
                "workflow must contain at least one step".into(),
            ));
        }
        for step in workflow {
            if !self.handlers.contains_key(step) {
                return Err(ScanError::Configuration(format!(
                    "no handler registered for workflow step {step}"
                )));
            }
        }
        for pair in workflow.windows(2) {
            if pair[0] == pair[1] {
                return Err(ScanError::Configuration(format!(
                    "workflow step {} repeated back-to-back",
                    pair[0]
                )));
            }
        }
        Ok(())
    }
}

impl Default for StepRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(Box::new(CreateBuildStep));
        registry.register(Box::new(UploadStep));
        registry.register(Box::new(BeginPrescanStep));
        registry.register(Box::new(BeginScanStep));
        registry.register(Box::new(CheckPendingScansStep));
        registry.register(Box::new(CheckComplianceStep));
        registry
    }
}

/// Verdict of one poll-loop inspection.
pub(crate) enum Poll {
    Continue,
    Done,
}

/// Re-query the build status on a fixed interval until `inspect` reports
/// completion, a fatal condition, or the deadline passes. The deadline is
/// checked after each query, so the loop overruns it by at most one
/// interval.
pub(crate) async fn poll_status<F>(
    api: &dyn RemoteScanAPI,
    build: &BuildRef,
    policy: &PollPolicy,
    step: WorkflowStep,
    mut inspect: F,
) -> Result<StatusReport, ScanError>
where
    F: FnMut(&StatusReport) -> Result<Poll, ScanError>,
{
    let started = tokio::time::Instant::now();
    loop {
        let report = api.get_scan_status(build).await?;
        if let Poll::Done = inspect(&report)? {
            return Ok(report);
        }
        if started.elapsed() >= policy.deadline {
            return Err(ScanError::Timeout {
                step,
                waited: policy.deadline,
            });
        }
        tokio::time::sleep(policy.interval).await;
    }
}

/// A step that talks about a build can only run once one exists.
pub(crate) fn require_build(
    session: &ScanSession,
    step: WorkflowStep,
) -> Result<BuildRef, ScanError> {
    session.build().cloned().ok_or(ScanError::Sequence {
        step,
        state: session.state(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn step_round_trips_through_str() {
        for step in WorkflowStep::ALL {
            let parsed: WorkflowStep = step.to_string().parse().unwrap();
            assert_eq!(parsed, step);
        }
    }

    #[test]
    fn unknown_step_is_configuration_error() {
        let err = "submit_artifacts".parse::<WorkflowStep>().unwrap_err();
        assert!(matches!(err, ScanError::Configuration(_)));
        assert!(err.to_string().contains("submit_artifacts"));
    }

    #[test]
    fn default_registry_covers_all_steps() {
        let registry = StepRegistry::default();
        for step in WorkflowStep::ALL {
            assert!(registry.get(step).is_some(), "missing handler for {step}");
        }
    }

    #[test]
    fn validate_rejects_empty_workflow() {
        let registry = StepRegistry::default();
        let err = registry.validate(&[]).unwrap_err();
        assert!(matches!(err, ScanError::Configuration(_)));
    }

    #[test]
    fn validate_rejects_unregistered_step() {
        let mut registry = StepRegistry::empty();
        registry.register(Box::new(CheckComplianceStep));
        let err = registry
            .validate(&[WorkflowStep::CreateBuild])
            .unwrap_err();
        assert!(err.to_string().contains("create_build"));
    }

    #[test]
    fn validate_rejects_adjacent_duplicates() {
        let registry = StepRegistry::default();
        let err = registry
            .validate(&[WorkflowStep::CheckCompliance, WorkflowStep::CheckCompliance])
            .unwrap_err();
        assert!(err.to_string().contains("repeated back-to-back"));
    }

    #[test]
    fn validate_accepts_default_workflow() {
        let registry = StepRegistry::default();
        registry
            .validate(&[
                WorkflowStep::CreateBuild,
                WorkflowStep::Upload,
                WorkflowStep::BeginPrescan,
                WorkflowStep::CheckPendingScans,
                WorkflowStep::CheckCompliance,
            ])
            .unwrap();
    }

    #[test]
    fn non_adjacent_repeats_pass_registry_validation() {
        // Ordering problems are the state machine's to reject, not the
        // registry's.
        let registry = StepRegistry::default();
        registry
            .validate(&[
                WorkflowStep::CheckCompliance,
                WorkflowStep::CheckPendingScans,
                WorkflowStep::CheckCompliance,
            ])
            .unwrap();
    }
}
