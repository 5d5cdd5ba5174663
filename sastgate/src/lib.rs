//! Drives one static-analysis scan lifecycle against a remote
//! security-analysis service and gates a build pipeline on the resulting
//! compliance verdict.
//!
//! The entry point is [`Orchestrator::run`], which consumes resolved
//! [`Settings`], executes the configured workflow steps against a
//! [`RemoteScanAPI`], and returns a terminal [`Outcome`].

pub mod api;
pub mod artifacts;
pub mod client;
pub mod error;
pub mod orchestrator;
pub mod outcome;
pub mod report;
pub mod settings;
pub mod state;
pub mod steps;

pub use api::{BuildRef, PrescanOptions, RemoteScanAPI, ScanOptions, ScanPhase, StatusReport};
pub use client::HttpScanApi;
pub use error::{ApiError, ScanError};
pub use orchestrator::Orchestrator;
pub use outcome::{ComplianceVerdict, Outcome, StepRecord, StepStatus};
pub use settings::{Credentials, Overrides, PollPolicy, RetryPolicy, Settings};
pub use state::{ScanSession, ScanState};
pub use steps::{StepHandler, StepRegistry, WorkflowStep};
