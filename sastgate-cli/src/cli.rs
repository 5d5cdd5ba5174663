use std::path::PathBuf;

use clap::Parser;

use sastgate::settings::Overrides;

/// Submit build artifacts for static analysis and gate the pipeline on the
/// compliance verdict
#[derive(Parser)]
#[command(name = "sastgate", version)]
pub struct Cli {
    /// API key id for the remote scan service
    #[arg(long, env = "SASTGATE_API_KEY_ID", hide_env_values = true)]
    pub api_key_id: Option<String>,

    /// API key secret for the remote scan service
    #[arg(long, env = "SASTGATE_API_KEY_SECRET", hide_env_values = true)]
    pub api_key_secret: Option<String>,

    /// Application id as assigned by the scan service
    #[arg(long)]
    pub app_id: Option<String>,

    /// Directory containing the build artifacts to upload
    #[arg(long)]
    pub build_dir: Option<PathBuf>,

    /// Build version identifier
    #[arg(long)]
    pub build_id: Option<String>,

    /// Sandbox to scan in, instead of the application's policy context
    #[arg(long)]
    pub sandbox: Option<String>,

    /// Base URL of the remote scan API
    #[arg(long)]
    pub base_url: Option<String>,

    /// Path to a YAML config file
    #[arg(long, default_value = "config.yml")]
    pub config_file: PathBuf,

    /// Do not let the remote start the scan automatically after pre-scan
    #[arg(long)]
    pub disable_auto_scan: bool,

    /// Fail on module errors instead of scanning non-fatal modules anyway
    #[arg(long)]
    pub disable_scan_nonfatal_modules: bool,

    /// Record the compliance status but do not gate on it
    #[arg(long)]
    pub ignore_compliance_status: bool,

    /// Workflow steps to run, in order
    #[arg(long, num_args = 1.., value_name = "STEP")]
    pub workflow: Option<Vec<String>>,

    /// Emit the outcome as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Enable debug level logging
    #[arg(long, conflicts_with = "verbose")]
    pub debug: bool,

    /// Enable info level logging
    #[arg(long)]
    pub verbose: bool,
}

impl Cli {
    pub fn loglevel(&self) -> Option<tracing::Level> {
        if self.debug {
            Some(tracing::Level::DEBUG)
        } else if self.verbose {
            Some(tracing::Level::INFO)
        } else {
            None
        }
    }

    pub fn overrides(&self) -> Overrides {
        Overrides {
            api_key_id: self.api_key_id.clone(),
            api_key_secret: self.api_key_secret.clone(),
            app_id: self.app_id.clone(),
            build_id: self.build_id.clone(),
            build_dir: self.build_dir.clone(),
            sandbox: self.sandbox.clone(),
            base_url: self.base_url.clone(),
            workflow: self.workflow.clone(),
            disable_auto_scan: self.disable_auto_scan,
            disable_scan_nonfatal_modules: self.disable_scan_nonfatal_modules,
            ignore_compliance_status: self.ignore_compliance_status,
            loglevel: self.loglevel(),
        }
    }
}
