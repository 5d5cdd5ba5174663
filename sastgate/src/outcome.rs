use std::fmt;

use serde::Serialize;

use crate::steps::WorkflowStep;

/// Process exit codes, so pipeline tooling can branch on the failure cause.
pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_CONFIG: i32 = 1;
pub const EXIT_REMOTE: i32 = 2;
pub const EXIT_NON_COMPLIANT: i32 = 3;

/// Judgment the remote service issues for an application's latest scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComplianceVerdict {
    Passed,
    Failed,
    NotAssessed,
    Conflict,
    Unknown,
}

impl ComplianceVerdict {
    /// Map a remote policy-compliance status string onto a verdict.
    /// Anything unrecognized is `Unknown` rather than an error; the gate
    /// treats it as indeterminate.
    pub fn from_status(raw: &str) -> Self {
        match raw {
            "Pass" => ComplianceVerdict::Passed,
            "Did Not Pass" => ComplianceVerdict::Failed,
            "Not Assessed" => ComplianceVerdict::NotAssessed,
            "Conflict" => ComplianceVerdict::Conflict,
            _ => ComplianceVerdict::Unknown,
        }
    }

    /// True when the remote made an actual pass/fail determination.
    pub fn is_determined(&self) -> bool {
        matches!(
            self,
            ComplianceVerdict::Passed | ComplianceVerdict::Failed | ComplianceVerdict::Conflict
        )
    }
}

impl fmt::Display for ComplianceVerdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ComplianceVerdict::Passed => "passed",
            ComplianceVerdict::Failed => "failed",
            ComplianceVerdict::NotAssessed => "not_assessed",
            ComplianceVerdict::Conflict => "conflict",
            ComplianceVerdict::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Succeeded,
    Failed,
    TimedOut,
    Skipped,
}

impl fmt::Display for StepStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            StepStatus::Succeeded => "succeeded",
            StepStatus::Failed => "failed",
            StepStatus::TimedOut => "timed_out",
            StepStatus::Skipped => "skipped",
        };
        f.write_str(name)
    }
}

/// Result of one workflow step, in execution order.
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    pub step: WorkflowStep,
    pub status: StepStatus,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub message: String,
}

/// Terminal record of one run. Immutable once produced; the report writers
/// and the process exit code both derive from it.
#[derive(Debug, Serialize)]
pub struct Outcome {
    pub success: bool,
    pub verdict: ComplianceVerdict,
    pub steps: Vec<StepRecord>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl Outcome {
    pub fn exit_code(&self) -> i32 {
        if self.success {
            EXIT_SUCCESS
        } else if matches!(
            self.verdict,
            ComplianceVerdict::Failed | ComplianceVerdict::Conflict
        ) {
            EXIT_NON_COMPLIANT
        } else {
            EXIT_REMOTE
        }
    }

    /// The step that stalled or failed, if the run did not complete.
    pub fn failed_step(&self) -> Option<&StepRecord> {
        self.steps
            .iter()
            .find(|r| matches!(r.status, StepStatus::Failed | StepStatus::TimedOut))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn outcome(success: bool, verdict: ComplianceVerdict) -> Outcome {
        Outcome {
            success,
            verdict,
            steps: vec![],
            warnings: vec![],
        }
    }

    #[test]
    fn verdict_from_status_maps_known_strings() {
        assert_eq!(ComplianceVerdict::from_status("Pass"), ComplianceVerdict::Passed);
        assert_eq!(
            ComplianceVerdict::from_status("Did Not Pass"),
            ComplianceVerdict::Failed
        );
        assert_eq!(
            ComplianceVerdict::from_status("Not Assessed"),
            ComplianceVerdict::NotAssessed
        );
        assert_eq!(
            ComplianceVerdict::from_status("Conflict"),
            ComplianceVerdict::Conflict
        );
    }

    #[test]
    fn verdict_from_status_unknown_strings() {
        assert_eq!(
            ComplianceVerdict::from_status("Calculating..."),
            ComplianceVerdict::Unknown
        );
        assert_eq!(ComplianceVerdict::from_status(""), ComplianceVerdict::Unknown);
    }

    #[test]
    fn determined_verdicts() {
        assert!(ComplianceVerdict::Passed.is_determined());
        assert!(ComplianceVerdict::Failed.is_determined());
        assert!(ComplianceVerdict::Conflict.is_determined());
        assert!(!ComplianceVerdict::NotAssessed.is_determined());
        assert!(!ComplianceVerdict::Unknown.is_determined());
    }

    #[test]
    fn success_exits_zero() {
        assert_eq!(outcome(true, ComplianceVerdict::Passed).exit_code(), EXIT_SUCCESS);
        assert_eq!(
            outcome(true, ComplianceVerdict::NotAssessed).exit_code(),
            EXIT_SUCCESS
        );
    }

    #[test]
    fn determined_non_compliance_exits_three() {
        assert_eq!(
            outcome(false, ComplianceVerdict::Failed).exit_code(),
            EXIT_NON_COMPLIANT
        );
        assert_eq!(
            outcome(false, ComplianceVerdict::Conflict).exit_code(),
            EXIT_NON_COMPLIANT
        );
    }

    #[test]
    fn other_failures_exit_two() {
        assert_eq!(
            outcome(false, ComplianceVerdict::NotAssessed).exit_code(),
            EXIT_REMOTE
        );
        assert_eq!(
            outcome(false, ComplianceVerdict::Unknown).exit_code(),
            EXIT_REMOTE
        );
    }

    #[test]
    fn failed_step_finds_first_failure() {
        let o = Outcome {
            success: false,
            verdict: ComplianceVerdict::NotAssessed,
            steps: vec![
                StepRecord {
                    step: WorkflowStep::CreateBuild,
                    status: StepStatus::Succeeded,
                    message: String::new(),
                },
                StepRecord {
                    step: WorkflowStep::Upload,
                    status: StepStatus::Failed,
                    message: "boom".into(),
                },
                StepRecord {
                    step: WorkflowStep::BeginPrescan,
                    status: StepStatus::Skipped,
                    message: String::new(),
                },
            ],
            warnings: vec![],
        };
        assert_eq!(o.failed_step().unwrap().step, WorkflowStep::Upload);
    }

    #[test]
    fn outcome_serializes_snake_case() {
        let o = outcome(false, ComplianceVerdict::NotAssessed);
        let json = serde_json::to_value(&o).unwrap();
        assert_eq!(json["verdict"], "not_assessed");
        assert_eq!(json["success"], false);
    }
}
