use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

use autoapply_lib::session::SessionLimits;
use autoapply_lib::throttle::ThrottleConfig;
use autoapply_lib::{EffortRules, RetryPolicy};

/// Default config file name looked up in the working directory
pub(crate) const AUTOAPPLY_CONFIG_FILE: &str = "autoapply.toml";

#[derive(Debug, Parser)]
#[command(
    name = "autoapply",
    version,
    about = "Run budgeted, rate-limited job application sessions",
    long_about = "Runs a batch of simulated application tasks through the \
                  autoapply engine: session budgets, per-domain throttling, \
                  bounded worker concurrency, retries, and an end-of-session \
                  digest."
)]
pub(crate) struct Opts {
    /// Configuration file to use
    #[arg(short, long, env = "AUTOAPPLY_CONFIG")]
    pub(crate) config: Option<PathBuf>,

    /// Number of pool workers (overrides the config file)
    #[arg(long)]
    pub(crate) workers: Option<usize>,

    /// Session application budget (overrides the config file)
    #[arg(long)]
    pub(crate) max_applications: Option<u32>,

    /// Session time budget, e.g. "90s" or "1h" (overrides the config file)
    #[arg(long, value_parser = humantime::parse_duration)]
    pub(crate) max_duration: Option<Duration>,

    /// Number of simulated application tasks to run
    #[arg(long, default_value_t = 12)]
    pub(crate) tasks: usize,

    /// More output per occurrence (-v warnings and info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    pub(crate) verbose: u8,

    /// Less output per occurrence
    #[arg(short, long, action = clap::ArgAction::Count, conflicts_with = "verbose")]
    pub(crate) quiet: u8,
}

impl Opts {
    /// The log level filter implied by `-v`/`-q` counts
    pub(crate) fn log_level_filter(&self) -> log::LevelFilter {
        // Info is the baseline; -v moves towards trace, -q towards off
        let verbosity = 2_i16 + i16::from(self.verbose) - i16::from(self.quiet);
        match verbosity {
            i16::MIN..=-1 => log::LevelFilter::Off,
            0 => log::LevelFilter::Error,
            1 => log::LevelFilter::Warn,
            2 => log::LevelFilter::Info,
            3 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    }
}

/// The TOML configuration file, all sections optional.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub(crate) struct Config {
    /// Number of pool workers
    pub(crate) workers: Option<usize>,

    /// Session budgets
    pub(crate) limits: SessionLimits,

    /// Per-domain throttling and pacing
    pub(crate) throttle: ThrottleConfig,

    /// Backoff policy for transient failures
    pub(crate) retry: RetryPolicy,

    /// Typed effort escalation rules
    pub(crate) rules: EffortRules,

    /// Upper bound on a single workflow attempt
    #[serde(with = "humantime_serde")]
    pub(crate) task_timeout: Option<Duration>,
}

impl Config {
    /// Load a config file
    pub(crate) fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("cannot read `{}`", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("cannot parse `{}`", path.display()))
    }

    /// Fold CLI overrides into this config; CLI wins over file values
    pub(crate) fn merge(&mut self, opts: &Opts) {
        if let Some(workers) = opts.workers {
            self.workers = Some(workers);
        }
        if let Some(max_applications) = opts.max_applications {
            self.limits.max_applications = max_applications;
        }
        if let Some(max_duration) = opts.max_duration {
            self.limits.max_duration = max_duration;
        }
    }
}
