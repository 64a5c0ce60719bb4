//! `autoapply` runs budgeted, rate-limited job application sessions.
//!
//! The binary wraps `autoapply-lib` for the command line: it loads a TOML
//! configuration, recovers sessions a previous run left behind, and drives
//! a simulated batch through the real engine so limits and throttle
//! policies can be validated before any live automation is attached.
//!
//! Run a dry-run session with defaults:
//!
//! ```sh
//! autoapply
//! ```
//!
//! Cap the session and parallelism:
//!
//! ```sh
//! autoapply --tasks 30 --max-applications 10 --workers 3
//! ```
#![warn(clippy::all, clippy::pedantic)]
#![deny(missing_docs)]

use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use console::style;
use log::warn;

use autoapply_lib::pool::DEFAULT_TASK_TIMEOUT;
use autoapply_lib::session::SessionParams;
use autoapply_lib::store::{MemoryStore, SessionStore};
use autoapply_lib::{EngineBuilder, TaskStatus, WorkflowExecutor};

mod options;
mod simulate;

use options::{Config, Opts, AUTOAPPLY_CONFIG_FILE};
use simulate::{sample_tasks, SimulatedExecutor};

/// A C-like enum that can be cast to `i32` and used as process exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitCode {
    /// Every task ended in success or a policy skip
    Success = 0,
    // NOTE: exit code 1 is used for any `Result::Err` bubbled up to
    // `main()` using the `?` operator.
    #[allow(unused)]
    UnexpectedFailure = 1,
    /// At least one application failed or errored
    ApplicationFailures = 2,
}

fn main() -> Result<()> {
    // std::process::exit doesn't guarantee that all destructors will be
    // run, therefore we wrap the main code in another function to ensure
    // that destructors (and with them throttle slot releases) run.
    let exit_code = run_main()?;
    std::process::exit(exit_code as i32);
}

fn run_main() -> Result<ExitCode> {
    let opts = Opts::parse();
    init_logging(&opts);
    let config = load_config(&opts)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("cannot start tokio runtime")?;
    runtime.block_on(run(opts, config))
}

/// Initialize logging with a compact, timestamp-less format
fn init_logging(opts: &Opts) {
    let mut builder = env_logger::Builder::new();
    builder
        .format_timestamp(None)
        .format_target(false)
        .filter_level(opts.log_level_filter())
        .format(|buf, record| writeln!(buf, "[{}] {}", record.level(), record.args()));

    if let Ok(spec) = std::env::var("RUST_LOG") {
        builder.parse_filters(&spec);
    }
    builder.init();
}

/// Load the configuration file (explicit flag, or `autoapply.toml` in the
/// working directory when present) and merge CLI overrides into it
fn load_config(opts: &Opts) -> Result<Config> {
    let mut config = if let Some(path) = &opts.config {
        Config::load_from_file(path)?
    } else {
        let default_path = PathBuf::from(AUTOAPPLY_CONFIG_FILE);
        if default_path.is_file() {
            Config::load_from_file(&default_path)?
        } else {
            Config::default()
        }
    };
    config.merge(opts);
    Ok(config)
}

async fn run(opts: Opts, config: Config) -> Result<ExitCode> {
    let store = Arc::new(MemoryStore::new());
    let executor = Arc::new(SimulatedExecutor {
        work_time: Duration::from_millis(400),
    }) as Arc<dyn WorkflowExecutor>;

    let engine = EngineBuilder::builder()
        .executor(executor)
        .store(Arc::clone(&store) as Arc<dyn SessionStore>)
        .throttle(config.throttle)
        .retry(config.retry)
        .rules(config.rules)
        .workers(config.workers.unwrap_or(config.limits.max_parallel_workers))
        .task_timeout(config.task_timeout.unwrap_or(DEFAULT_TASK_TIMEOUT))
        .build()
        .engine();

    // Sessions a previous process left running become interrupted digests
    let recovered = engine
        .recover_active_sessions()
        .await
        .context("crash recovery scan failed")?;
    for id in &recovered {
        warn!("recovered interrupted session {id}");
    }

    let session_id = engine
        .create_session(
            SessionParams::builder()
                .owner(uuid::Uuid::new_v4())
                .name(format!("dry run ({} tasks)", opts.tasks))
                .limits(config.limits)
                .build(),
        )
        .await;

    let tasks = sample_tasks(session_id, opts.tasks);
    let results = engine
        .run_batch(tasks)
        .await
        .context("batch execution failed")?;

    let mut failures = 0_usize;
    for result in &results {
        let domain = result
            .domain
            .as_ref()
            .map_or_else(|| "-".to_string(), ToString::to_string);
        let detail = result.detail.as_deref().unwrap_or("");
        let line = match result.status {
            TaskStatus::Success => style(format!(
                "\u{2714} {domain} [{}, {} attempt(s)]",
                result.effort, result.attempts
            ))
            .green(),
            TaskStatus::Skipped => {
                style(format!("? {domain} [skipped: {detail}]")).yellow()
            }
            TaskStatus::Failed | TaskStatus::Error => {
                failures += 1;
                style(format!("\u{2717} {domain} [{}: {detail}]", result.status)).red()
            }
        };
        println!("{line}");
    }

    let snapshot = engine.current_snapshot(session_id).await?;
    if !snapshot.status.is_terminal() {
        engine.stop_session(session_id, "batch finished").await?;
    }

    if let Some(digest) = store.digest(session_id).await? {
        println!();
        println!("{}", style(digest.summary()).bold());
    }

    engine.shutdown().await;

    if failures > 0 {
        Ok(ExitCode::ApplicationFailures)
    } else {
        Ok(ExitCode::Success)
    }
}
