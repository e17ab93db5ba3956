#![forbid(unsafe_code)]

//! `chat-conformance`: conformance harness binary.
//!
//! Loads the suite configuration, then builds, spawns, and scripts each
//! selected chat-server implementation in turn. Exits with status 0 when
//! every selected language passes and 1 otherwise.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, ValueEnum};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use chat_conformance::orchestrator::ProcessLauncher;
use chat_conformance::report::ConsoleReporter;
use chat_conformance::runner::{Selection, TestRunner};
use chat_conformance::{AppError, Result, SuiteConfig};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(
    name = "chat-conformance",
    about = "Conformance harness for line-oriented chat servers",
    version,
    long_about = None
)]
struct Cli {
    /// Path to the suite configuration (JSON, or TOML by extension).
    #[arg(long, default_value = "test_config.json")]
    config: PathBuf,

    /// Print build and per-test progress.
    #[arg(short, long)]
    verbose: bool,

    /// Only run the named language; repeat to select several.
    #[arg(long = "lang", value_name = "NAME")]
    languages: Vec<String>,

    /// Only run test cases whose name matches this regular expression.
    #[arg(long, value_name = "PATTERN")]
    filter: Option<String>,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn main() -> ExitCode {
    let args = Cli::parse();
    if let Err(err) = init_tracing(args.log_format) {
        eprintln!("{err}");
        return ExitCode::FAILURE;
    }

    match run(args) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!(%err, "conformance run aborted");
            eprintln!("error: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Cli) -> Result<bool> {
    let config = SuiteConfig::load_from_path(&args.config)?;
    let selection = Selection::new(args.languages, args.filter.as_deref())?;
    info!(
        config = %args.config.display(),
        languages = config.languages.len(),
        tests = config.tests.len(),
        "configuration loaded"
    );

    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(execute(&config, &selection, args.verbose))
}

async fn execute(config: &SuiteConfig, selection: &Selection, verbose: bool) -> Result<bool> {
    let suite = config.to_suite();
    let runner = TestRunner::new(ProcessLauncher, ConsoleReporter::new(verbose));

    // Dropping the run future drops any live server process, which kills it.
    tokio::select! {
        summary = runner.run(&suite, selection) => Ok(summary.success()),
        () = shutdown_signal() => {
            warn!("interrupted; stopping the conformance run");
            Ok(false)
        }
    }
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let subscriber = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
