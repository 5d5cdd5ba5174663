use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tracing::warn;

use crate::error::ScanError;
use crate::steps::WorkflowStep;

pub const API_KEY_ID_ENV: &str = "SASTGATE_API_KEY_ID";
pub const API_KEY_SECRET_ENV: &str = "SASTGATE_API_KEY_SECRET";

/// API key pair for the remote service. `Debug` redacts both halves so the
/// pair can never leak through logs or panic messages.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub api_key_id: String,
    pub api_key_secret: String,
}

impl Credentials {
    pub fn is_empty(&self) -> bool {
        self.api_key_id.is_empty() || self.api_key_secret.is_empty()
    }

    fn validate(&self) -> Result<(), ScanError> {
        if self.api_key_id.len() != 32 || !is_hex(&self.api_key_id) {
            return Err(ScanError::Configuration(
                "api key id must be a 32 character hex string".into(),
            ));
        }
        if self.api_key_secret.len() != 128 || !is_hex(&self.api_key_secret) {
            return Err(ScanError::Configuration(
                "api key secret must be a 128 character hex string".into(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key_id", &"<redacted>")
            .field("api_key_secret", &"<redacted>")
            .finish()
    }
}

fn is_hex(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_hexdigit())
}

/// Bounded-retry parameters for transient remote failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_elapsed: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 4,
            initial_backoff: Duration::from_secs(2),
            max_backoff: Duration::from_secs(30),
            max_elapsed: Duration::from_secs(300),
        }
    }
}

/// Status-poll parameters for asynchronous remote operations.
#[derive(Debug, Clone, Copy)]
pub struct PollPolicy {
    pub interval: Duration,
    pub deadline: Duration,
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            deadline: Duration::from_secs(60 * 60),
        }
    }
}

/// Effective configuration for one run. Resolved once, then read-only.
#[derive(Debug, Clone)]
pub struct Settings {
    pub credentials: Credentials,
    pub app_id: String,
    pub sandbox: Option<String>,
    pub build_id: String,
    pub build_dir: PathBuf,
    pub base_url: String,
    pub workflow: Vec<WorkflowStep>,
    pub auto_scan: bool,
    pub scan_all_nonfatal_top_level_modules: bool,
    pub ignore_compliance_status: bool,
    pub loglevel: tracing::Level,
    pub retry: RetryPolicy,
    pub poll: PollPolicy,
}

impl Settings {
    /// Invariant checked before the first remote call: the credential pair
    /// and the application id must be present.
    pub fn ensure_remote_ready(&self) -> Result<(), ScanError> {
        if self.credentials.is_empty() {
            return Err(ScanError::Configuration(
                "api credentials are required before contacting the remote service".into(),
            ));
        }
        if self.app_id.is_empty() {
            return Err(ScanError::Configuration(
                "an application id is required before contacting the remote service".into(),
            ));
        }
        Ok(())
    }
}

/// Values passed on the command line (or by a library caller). Highest
/// precedence layer; `None` fields fall through to environment, config
/// file, then built-in defaults.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub api_key_id: Option<String>,
    pub api_key_secret: Option<String>,
    pub app_id: Option<String>,
    pub build_id: Option<String>,
    pub build_dir: Option<PathBuf>,
    pub sandbox: Option<String>,
    pub base_url: Option<String>,
    pub workflow: Option<Vec<String>>,
    pub disable_auto_scan: bool,
    pub disable_scan_nonfatal_modules: bool,
    pub ignore_compliance_status: bool,
    pub loglevel: Option<tracing::Level>,
}

/// Shape of the YAML config file. Credentials are deliberately not part of
/// the file schema; a pair found there is ignored with a warning to deter
/// committing secrets.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    app_id: Option<String>,
    build_id: Option<String>,
    build_dir: Option<PathBuf>,
    sandbox: Option<String>,
    base_url: Option<String>,
    workflow: Option<Vec<String>>,
    auto_scan: Option<bool>,
    scan_all_nonfatal_top_level_modules: Option<bool>,
    ignore_compliance_status: Option<bool>,
    loglevel: Option<String>,
    poll_interval_seconds: Option<u64>,
    scan_deadline_minutes: Option<u64>,
    retry_max_attempts: Option<u32>,
    api_key_id: Option<String>,
    api_key_secret: Option<String>,
}

fn load_file(path: &Path) -> Result<FileConfig, ScanError> {
    match path.extension().and_then(|e| e.to_str()) {
        Some("yml") | Some("yaml") => {}
        _ => {
            warn!(file = %path.display(), "config file suffix is not .yml or .yaml; ignoring it");
            return Ok(FileConfig::default());
        }
    }

    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            warn!(file = %path.display(), "config file not found");
            return Ok(FileConfig::default());
        }
        Err(e) => {
            return Err(ScanError::Configuration(format!(
                "failed to read config file {}: {e}",
                path.display()
            )));
        }
    };

    let config: FileConfig = serde_yaml::from_str(&raw).map_err(|e| {
        ScanError::Configuration(format!("failed to parse config file {}: {e}", path.display()))
    })?;

    if config.api_key_id.is_some() || config.api_key_secret.is_some() {
        warn!(
            file = %path.display(),
            "api credentials in the config file are ignored; pass them via \
             {API_KEY_ID_ENV}/{API_KEY_SECRET_ENV} or the command line"
        );
    }

    Ok(config)
}

fn default_build_id() -> String {
    chrono::Utc::now().format("%Y-%m-%d_%H-%M-%S").to_string()
}

fn validate_app_id(app_id: &str) -> Result<(), ScanError> {
    if app_id.is_empty() || !app_id.chars().all(|c| c.is_ascii_digit()) {
        return Err(ScanError::Configuration(format!(
            "app id must be a string of digits, got {app_id:?}"
        )));
    }
    Ok(())
}

fn validate_build_id(build_id: &str) -> Result<(), ScanError> {
    // Unreserved URI characters only, so the id is safe in paths and params.
    let ok = !build_id.is_empty()
        && build_id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '.' | '_' | '~'));
    if !ok {
        return Err(ScanError::Configuration(format!(
            "build id may only contain alphanumerics and -._~, got {build_id:?}"
        )));
    }
    Ok(())
}

fn validate_base_url(base_url: &str) -> Result<(), ScanError> {
    let url = reqwest::Url::parse(base_url)
        .map_err(|e| ScanError::Configuration(format!("invalid base url {base_url:?}: {e}")))?;

    let host = url
        .host_str()
        .ok_or_else(|| ScanError::Configuration(format!("base url {base_url:?} has no host")))?;

    let loopback = matches!(host, "localhost" | "127.0.0.1" | "[::1]" | "::1");
    if url.scheme() != "https" && !loopback {
        return Err(ScanError::Configuration(format!(
            "base url {base_url:?} must use https"
        )));
    }
    if !url.path().ends_with('/') {
        return Err(ScanError::Configuration(format!(
            "base url {base_url:?} must end with /"
        )));
    }
    Ok(())
}

fn parse_workflow(tags: &[String]) -> Result<Vec<WorkflowStep>, ScanError> {
    tags.iter().map(|tag| tag.parse()).collect()
}

fn parse_loglevel(raw: &str) -> Result<tracing::Level, ScanError> {
    raw.parse()
        .map_err(|_| ScanError::Configuration(format!("invalid log level: {raw:?}")))
}

/// Merge defaults, the config file, environment variables, and overrides
/// into one validated [`Settings`]. Precedence, lowest to highest:
/// built-in default, config file, environment, command line.
pub fn resolve(config_file: &Path, overrides: Overrides) -> Result<Settings, ScanError> {
    let file = load_file(config_file)?;

    let api_key_id = overrides
        .api_key_id
        .or_else(|| std::env::var(API_KEY_ID_ENV).ok())
        .unwrap_or_default();
    let api_key_secret = overrides
        .api_key_secret
        .or_else(|| std::env::var(API_KEY_SECRET_ENV).ok())
        .unwrap_or_default();
    let credentials = Credentials {
        api_key_id,
        api_key_secret,
    };
    credentials.validate()?;

    let app_id = overrides
        .app_id
        .or(file.app_id)
        .ok_or_else(|| ScanError::Configuration("an application id is required".into()))?;
    validate_app_id(&app_id)?;

    let build_id = overrides
        .build_id
        .or(file.build_id)
        .unwrap_or_else(default_build_id);
    validate_build_id(&build_id)?;

    let base_url = overrides
        .base_url
        .or(file.base_url)
        .ok_or_else(|| ScanError::Configuration("a base url is required".into()))?;
    validate_base_url(&base_url)?;

    let workflow_tags = overrides.workflow.or(file.workflow).unwrap_or_else(|| {
        vec![
            "create_build".into(),
            "upload".into(),
            "begin_prescan".into(),
            "check_pending_scans".into(),
            "check_compliance".into(),
        ]
    });
    let workflow = parse_workflow(&workflow_tags)?;

    let loglevel = match overrides.loglevel {
        Some(level) => level,
        None => match file.loglevel.as_deref() {
            Some(raw) => parse_loglevel(raw)?,
            None => tracing::Level::WARN,
        },
    };

    let mut retry = RetryPolicy::default();
    if let Some(attempts) = file.retry_max_attempts {
        if attempts == 0 {
            return Err(ScanError::Configuration(
                "retry_max_attempts must be at least 1".into(),
            ));
        }
        retry.max_attempts = attempts;
    }

    let mut poll = PollPolicy::default();
    if let Some(seconds) = file.poll_interval_seconds {
        poll.interval = Duration::from_secs(seconds);
    }
    if let Some(minutes) = file.scan_deadline_minutes {
        poll.deadline = Duration::from_secs(minutes * 60);
    }

    Ok(Settings {
        credentials,
        app_id,
        sandbox: overrides.sandbox.or(file.sandbox),
        build_id,
        build_dir: overrides
            .build_dir
            .or(file.build_dir)
            .unwrap_or_else(|| PathBuf::from("/build")),
        base_url,
        workflow,
        auto_scan: if overrides.disable_auto_scan {
            false
        } else {
            file.auto_scan.unwrap_or(true)
        },
        scan_all_nonfatal_top_level_modules: if overrides.disable_scan_nonfatal_modules {
            false
        } else {
            file.scan_all_nonfatal_top_level_modules.unwrap_or(true)
        },
        ignore_compliance_status: overrides.ignore_compliance_status
            || file.ignore_compliance_status.unwrap_or(false),
        loglevel,
        retry,
        poll,
    })
}
