use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use tracing::debug;

use crate::api::BuildRef;
use crate::error::ScanError;
use crate::outcome::ComplianceVerdict;
use crate::steps::{StepSpec, WorkflowStep};

/// Lifecycle of one application build, strictly ordered.
///
/// Transitions only ever move toward the end of this list; the three final
/// states are alternative terminals reached from `ResultsRetrieved`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanState {
    NotStarted,
    BuildCreated,
    ArtifactUploaded,
    PrescanSubmitted,
    PrescanComplete,
    ScanSubmitted,
    ScanInProgress,
    ScanComplete,
    ResultsRetrieved,
    Compliant,
    NonCompliant,
    AssessmentUnavailable,
}

impl fmt::Display for ScanState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanState::NotStarted => "not_started",
            ScanState::BuildCreated => "build_created",
            ScanState::ArtifactUploaded => "artifact_uploaded",
            ScanState::PrescanSubmitted => "prescan_submitted",
            ScanState::PrescanComplete => "prescan_complete",
            ScanState::ScanSubmitted => "scan_submitted",
            ScanState::ScanInProgress => "scan_in_progress",
            ScanState::ScanComplete => "scan_complete",
            ScanState::ResultsRetrieved => "results_retrieved",
            ScanState::Compliant => "compliant",
            ScanState::NonCompliant => "non_compliant",
            ScanState::AssessmentUnavailable => "assessment_unavailable",
        };
        f.write_str(name)
    }
}

impl ScanState {
    /// Terminal state matching a retrieved compliance verdict.
    pub fn terminal_for(verdict: ComplianceVerdict) -> ScanState {
        match verdict {
            ComplianceVerdict::Passed => ScanState::Compliant,
            ComplianceVerdict::Failed | ComplianceVerdict::Conflict => ScanState::NonCompliant,
            ComplianceVerdict::NotAssessed | ComplianceVerdict::Unknown => {
                ScanState::AssessmentUnavailable
            }
        }
    }
}

/// Mutable record of one scan run, owned by the orchestrator.
///
/// Created in `NotStarted` and discarded at process exit; never persisted.
#[derive(Debug)]
pub struct ScanSession {
    state: ScanState,
    app_id: String,
    build: Option<BuildRef>,
    last_status: Option<String>,
    verdict: Option<ComplianceVerdict>,
    warnings: Vec<String>,
    attempts: HashMap<WorkflowStep, u32>,
}

impl ScanSession {
    pub fn new(app_id: impl Into<String>) -> Self {
        Self {
            state: ScanState::NotStarted,
            app_id: app_id.into(),
            build: None,
            last_status: None,
            verdict: None,
            warnings: Vec::new(),
            attempts: HashMap::new(),
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    /// Strict forward transition. Staying put or moving backward is a
    /// sequence violation.
    pub fn advance(&mut self, step: WorkflowStep, to: ScanState) -> Result<(), ScanError> {
        if to <= self.state {
            return Err(ScanError::Sequence {
                step,
                state: self.state,
            });
        }
        debug!(step = %step, from = %self.state, to = %to, "state transition");
        self.state = to;
        Ok(())
    }

    /// Idempotent transition for waiting steps: advances only when `to` is
    /// ahead of the current state.
    pub fn advance_min(&mut self, step: WorkflowStep, to: ScanState) {
        if to > self.state {
            debug!(step = %step, from = %self.state, to = %to, "state transition");
            self.state = to;
        }
    }

    pub fn set_build(&mut self, build: BuildRef) {
        self.build = Some(build);
    }

    pub fn build(&self) -> Option<&BuildRef> {
        self.build.as_ref()
    }

    pub fn record_status(&mut self, raw_status: impl Into<String>) {
        self.last_status = Some(raw_status.into());
    }

    pub fn last_status(&self) -> Option<&str> {
        self.last_status.as_deref()
    }

    pub fn set_verdict(&mut self, verdict: ComplianceVerdict) {
        self.verdict = Some(verdict);
    }

    pub fn verdict(&self) -> Option<ComplianceVerdict> {
        self.verdict
    }

    pub fn record_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn warnings(&self) -> &[String] {
        &self.warnings
    }

    pub fn note_attempt(&mut self, step: WorkflowStep) -> u32 {
        let count = self.attempts.entry(step).or_insert(0);
        *count += 1;
        *count
    }

    pub fn attempts(&self, step: WorkflowStep) -> u32 {
        self.attempts.get(&step).copied().unwrap_or(0)
    }
}

/// Simulate the state machine over a requested step list without touching
/// the remote service. Runs before the first handler so ordering mistakes
/// surface as a raised error rather than a half-executed run.
pub fn validate_order<I>(steps: I) -> Result<(), ScanError>
where
    I: IntoIterator<Item = (WorkflowStep, StepSpec)>,
{
    let mut state = ScanState::NotStarted;
    for (step, spec) in steps {
        if state < spec.min {
            return Err(ScanError::Sequence { step, state });
        }
        if !spec.waits && state >= spec.result {
            return Err(ScanError::Sequence { step, state });
        }
        state = state.max(spec.result);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> ScanSession {
        ScanSession::new("1337")
    }

    #[test]
    fn new_session_starts_not_started() {
        assert_eq!(session().state(), ScanState::NotStarted);
    }

    #[test]
    fn advance_moves_forward() {
        let mut s = session();
        s.advance(WorkflowStep::CreateBuild, ScanState::BuildCreated)
            .unwrap();
        assert_eq!(s.state(), ScanState::BuildCreated);
    }

    #[test]
    fn advance_rejects_same_state() {
        let mut s = session();
        s.advance(WorkflowStep::CreateBuild, ScanState::BuildCreated)
            .unwrap();
        let err = s
            .advance(WorkflowStep::CreateBuild, ScanState::BuildCreated)
            .unwrap_err();
        assert!(matches!(err, ScanError::Sequence { .. }));
    }

    #[test]
    fn advance_rejects_backward() {
        let mut s = session();
        s.advance(WorkflowStep::BeginScan, ScanState::ScanComplete)
            .unwrap();
        let err = s
            .advance(WorkflowStep::Upload, ScanState::ArtifactUploaded)
            .unwrap_err();
        assert!(matches!(
            err,
            ScanError::Sequence {
                state: ScanState::ScanComplete,
                ..
            }
        ));
    }

    #[test]
    fn advance_min_is_idempotent() {
        let mut s = session();
        s.advance_min(WorkflowStep::CheckPendingScans, ScanState::ScanComplete);
        s.advance_min(WorkflowStep::CheckPendingScans, ScanState::ScanComplete);
        assert_eq!(s.state(), ScanState::ScanComplete);
    }

    #[test]
    fn advance_min_never_moves_backward() {
        let mut s = session();
        s.advance_min(WorkflowStep::BeginScan, ScanState::ScanComplete);
        s.advance_min(WorkflowStep::BeginPrescan, ScanState::PrescanComplete);
        assert_eq!(s.state(), ScanState::ScanComplete);
    }

    #[test]
    fn attempts_are_counted_per_step() {
        let mut s = session();
        assert_eq!(s.note_attempt(WorkflowStep::Upload), 1);
        assert_eq!(s.note_attempt(WorkflowStep::Upload), 2);
        assert_eq!(s.attempts(WorkflowStep::Upload), 2);
        assert_eq!(s.attempts(WorkflowStep::CreateBuild), 0);
    }

    #[test]
    fn terminal_for_maps_verdicts() {
        assert_eq!(
            ScanState::terminal_for(ComplianceVerdict::Passed),
            ScanState::Compliant
        );
        assert_eq!(
            ScanState::terminal_for(ComplianceVerdict::Failed),
            ScanState::NonCompliant
        );
        assert_eq!(
            ScanState::terminal_for(ComplianceVerdict::Conflict),
            ScanState::NonCompliant
        );
        assert_eq!(
            ScanState::terminal_for(ComplianceVerdict::NotAssessed),
            ScanState::AssessmentUnavailable
        );
        assert_eq!(
            ScanState::terminal_for(ComplianceVerdict::Unknown),
            ScanState::AssessmentUnavailable
        );
    }

    #[test]
    fn state_display_is_snake_case() {
        assert_eq!(ScanState::PrescanComplete.to_string(), "prescan_complete");
        assert_eq!(ScanState::NonCompliant.to_string(), "non_compliant");
    }

    #[test]
    fn validate_order_accepts_full_lifecycle() {
        let steps = [
            WorkflowStep::CreateBuild,
            WorkflowStep::Upload,
            WorkflowStep::BeginPrescan,
            WorkflowStep::BeginScan,
            WorkflowStep::CheckPendingScans,
            WorkflowStep::CheckCompliance,
        ];
        validate_order(steps.iter().map(|s| (*s, s.spec()))).unwrap();
    }

    #[test]
    fn validate_order_accepts_auto_scan_lifecycle() {
        let steps = [
            WorkflowStep::CreateBuild,
            WorkflowStep::Upload,
            WorkflowStep::BeginPrescan,
            WorkflowStep::CheckPendingScans,
            WorkflowStep::CheckCompliance,
        ];
        validate_order(steps.iter().map(|s| (*s, s.spec()))).unwrap();
    }

    #[test]
    fn validate_order_accepts_compliance_only() {
        let steps = [WorkflowStep::CheckCompliance];
        validate_order(steps.iter().map(|s| (*s, s.spec()))).unwrap();
    }

    #[test]
    fn validate_order_rejects_scan_before_prescan() {
        let steps = [
            WorkflowStep::CreateBuild,
            WorkflowStep::Upload,
            WorkflowStep::BeginScan,
        ];
        let err = validate_order(steps.iter().map(|s| (*s, s.spec()))).unwrap_err();
        assert!(matches!(
            err,
            ScanError::Sequence {
                step: WorkflowStep::BeginScan,
                state: ScanState::ArtifactUploaded,
            }
        ));
    }

    #[test]
    fn validate_order_rejects_upload_without_build() {
        let steps = [WorkflowStep::Upload];
        let err = validate_order(steps.iter().map(|s| (*s, s.spec()))).unwrap_err();
        assert!(matches!(
            err,
            ScanError::Sequence {
                step: WorkflowStep::Upload,
                state: ScanState::NotStarted,
            }
        ));
    }

    #[test]
    fn validate_order_rejects_repeated_create_build() {
        let steps = [
            WorkflowStep::CreateBuild,
            WorkflowStep::Upload,
            WorkflowStep::CreateBuild,
        ];
        let err = validate_order(steps.iter().map(|s| (*s, s.spec()))).unwrap_err();
        assert!(matches!(
            err,
            ScanError::Sequence {
                step: WorkflowStep::CreateBuild,
                ..
            }
        ));
    }
}
