use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;
use crate::outcome::ComplianceVerdict;

/// Server-acknowledged handle for one build of one application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildRef {
    pub app_id: String,
    pub build_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sandbox: Option<String>,
}

/// Acknowledgement for one uploaded artifact.
#[derive(Debug, Clone, Deserialize)]
pub struct UploadAck {
    pub filename: String,
}

/// Acknowledgement for a prescan or scan submission.
#[derive(Debug, Clone, Deserialize)]
pub struct SubmissionAck {
    pub status: String,
}

/// Options forwarded with a prescan submission.
#[derive(Debug, Clone, Serialize)]
pub struct PrescanOptions {
    pub auto_scan: bool,
    pub scan_all_nonfatal_top_level_modules: bool,
}

/// Options forwarded with a scan submission.
#[derive(Debug, Clone, Serialize)]
pub struct ScanOptions {
    pub scan_all_top_level_modules: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            scan_all_top_level_modules: true,
        }
    }
}

/// Coarse lifecycle phase parsed from the remote status string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ScanPhase {
    Pending,
    PrescanRunning,
    PrescanFailed,
    PrescanSuccess,
    ScanRunning,
    ResultsReady,
    Failed,
}

impl ScanPhase {
    /// Classify a remote build status string. Unrecognized statuses map to
    /// `Pending` so the poll loop keeps watching until its deadline.
    pub fn parse(raw: &str) -> Self {
        match raw {
            "Incomplete" | "Not Submitted to Engine" => ScanPhase::Pending,
            "Pre-Scan Submitted" => ScanPhase::PrescanRunning,
            "Pre-Scan Failed" => ScanPhase::PrescanFailed,
            "Pre-Scan Success" => ScanPhase::PrescanSuccess,
            "Submitted to Engine" | "Scan In Process" => ScanPhase::ScanRunning,
            "Results Ready" => ScanPhase::ResultsReady,
            other if other.contains("Failed") => ScanPhase::Failed,
            _ => ScanPhase::Pending,
        }
    }
}

/// One status observation for a build.
#[derive(Debug, Clone)]
pub struct StatusReport {
    pub raw_status: String,
    pub phase: ScanPhase,
    /// Module-level errors the remote attached to the build, if any.
    pub module_errors: Vec<String>,
}

impl StatusReport {
    pub fn new(raw_status: impl Into<String>, module_errors: Vec<String>) -> Self {
        let raw_status = raw_status.into();
        let phase = ScanPhase::parse(&raw_status);
        Self {
            raw_status,
            phase,
            module_errors,
        }
    }
}

/// Capability handle for the remote security-analysis service.
///
/// Every method performs exactly one logical remote operation and reports
/// failures as [`ApiError::Transient`] or [`ApiError::Permanent`] so callers
/// can apply retry policy without inspecting transport details.
#[async_trait]
pub trait RemoteScanAPI: Send + Sync {
    async fn create_build(
        &self,
        app_id: &str,
        build_id: &str,
        sandbox: Option<&str>,
    ) -> Result<BuildRef, ApiError>;

    async fn upload_artifact(&self, build: &BuildRef, path: &Path) -> Result<UploadAck, ApiError>;

    async fn begin_prescan(
        &self,
        build: &BuildRef,
        options: &PrescanOptions,
    ) -> Result<SubmissionAck, ApiError>;

    async fn begin_scan(
        &self,
        build: &BuildRef,
        options: &ScanOptions,
    ) -> Result<SubmissionAck, ApiError>;

    async fn get_scan_status(&self, build: &BuildRef) -> Result<StatusReport, ApiError>;

    async fn get_compliance(
        &self,
        app_id: &str,
        sandbox: Option<&str>,
    ) -> Result<ComplianceVerdict, ApiError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_parses_prescan_statuses() {
        assert_eq!(ScanPhase::parse("Pre-Scan Submitted"), ScanPhase::PrescanRunning);
        assert_eq!(ScanPhase::parse("Pre-Scan Success"), ScanPhase::PrescanSuccess);
        assert_eq!(ScanPhase::parse("Pre-Scan Failed"), ScanPhase::PrescanFailed);
    }

    #[test]
    fn phase_parses_scan_statuses() {
        assert_eq!(ScanPhase::parse("Submitted to Engine"), ScanPhase::ScanRunning);
        assert_eq!(ScanPhase::parse("Scan In Process"), ScanPhase::ScanRunning);
        assert_eq!(ScanPhase::parse("Results Ready"), ScanPhase::ResultsReady);
    }

    #[test]
    fn phase_treats_unknown_status_as_pending() {
        assert_eq!(ScanPhase::parse("Vendor Reviewing"), ScanPhase::Pending);
        assert_eq!(ScanPhase::parse(""), ScanPhase::Pending);
    }

    #[test]
    fn phase_catches_other_failed_statuses() {
        assert_eq!(ScanPhase::parse("Scan Failed"), ScanPhase::Failed);
    }

    #[test]
    fn phase_ordering_tracks_lifecycle() {
        assert!(ScanPhase::Pending < ScanPhase::PrescanSuccess);
        assert!(ScanPhase::PrescanSuccess < ScanPhase::ScanRunning);
        assert!(ScanPhase::ScanRunning < ScanPhase::ResultsReady);
    }

    #[test]
    fn status_report_derives_phase() {
        let report = StatusReport::new("Results Ready", vec![]);
        assert_eq!(report.phase, ScanPhase::ResultsReady);
        assert_eq!(report.raw_status, "Results Ready");
    }
}
