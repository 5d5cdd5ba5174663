use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::state::ScanState;
use crate::steps::WorkflowStep;

/// Failure raised by a [`crate::api::RemoteScanAPI`] call.
///
/// The two variants drive the retry policy: `Transient` failures are retried
/// with backoff up to the configured budget, `Permanent` failures abort the
/// run on first sight.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("transient remote failure: {0}")]
    Transient(#[source] anyhow::Error),
    #[error("permanent remote failure: {0}")]
    Permanent(#[source] anyhow::Error),
}

impl ApiError {
    pub fn transient(err: impl Into<anyhow::Error>) -> Self {
        ApiError::Transient(err.into())
    }

    pub fn permanent(err: impl Into<anyhow::Error>) -> Self {
        ApiError::Permanent(err.into())
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, ApiError::Transient(_))
    }
}

/// Any failure the scan workflow can produce.
///
/// `Configuration` and `Sequence` are raised before the first step executes;
/// everything else is absorbed into a failed [`crate::outcome::Outcome`].
#[derive(Debug, Error)]
pub enum ScanError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("step {step} cannot run in state {state}")]
    Sequence { step: WorkflowStep, state: ScanState },

    #[error(transparent)]
    Remote(#[from] ApiError),

    #[error("{step} did not complete within {}s", waited.as_secs())]
    Timeout { step: WorkflowStep, waited: Duration },

    #[error("no uploadable artifacts found in {}", dir.display())]
    NoArtifacts { dir: PathBuf },
}

impl ScanError {
    /// True when the retry wrapper is allowed to re-run the failed step.
    pub fn is_transient(&self) -> bool {
        matches!(self, ScanError::Remote(e) if e.is_transient())
    }
}
