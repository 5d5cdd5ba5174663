mod cli;

use std::process;
use std::sync::Arc;

use clap::Parser;
use tracing::{error, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, reload};

use cli::Cli;
use sastgate::outcome::{EXIT_CONFIG, EXIT_REMOTE};
use sastgate::{HttpScanApi, Orchestrator, ScanError, report, settings};

#[tokio::main]
async fn main() {
    let args = Cli::parse();

    // Log as JSON from the start, at WARN until the effective config says
    // otherwise.
    let (filter, reload_handle) = reload::Layer::new(LevelFilter::WARN);
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().with_writer(std::io::stderr))
        .init();

    let settings = match settings::resolve(&args.config_file, args.overrides()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(EXIT_CONFIG);
        }
    };
    let _ = reload_handle.modify(|f| *f = LevelFilter::from_level(settings.loglevel));

    let api = match HttpScanApi::from_settings(&settings) {
        Ok(api) => api,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(EXIT_CONFIG);
        }
    };
    let orchestrator = Orchestrator::new(Arc::new(api));

    let outcome = tokio::select! {
        result = orchestrator.run(&settings) => match result {
            Ok(outcome) => outcome,
            Err(e @ (ScanError::Configuration(_) | ScanError::Sequence { .. })) => {
                eprintln!("error: {e}");
                process::exit(EXIT_CONFIG);
            }
            Err(e) => {
                error!(error = %e, "scan run failed");
                process::exit(EXIT_REMOTE);
            }
        },
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted; abandoning the scan run");
            process::exit(EXIT_REMOTE);
        }
    };

    let formatter = report::formatter(args.json);
    let mut stdout = std::io::stdout();
    if let Err(e) = formatter.write_outcome(&outcome, &mut stdout) {
        error!(error = %e, "failed to write the outcome report");
        process::exit(EXIT_REMOTE);
    }

    process::exit(outcome.exit_code());
}
