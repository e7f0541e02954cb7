// Event loop configuration, read from the environment.

use std::env;

use lazy_static::lazy_static;
use tracing::warn;

use crate::error::ConfigError;

/// Environment variable holding the job budget: a number, or `none` (or nothing) for no limit.
pub const JOB_BUDGET_VAR: &str = "PAN_FUTURES_JOB_BUDGET";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Config {
    /// The maximum number of jobs and timers a single run may execute. `None` means unlimited.
    pub job_budget: Option<usize>,
}

impl Config {
    pub fn with_job_budget(budget: usize) -> Config {
        Config {
            job_budget: Some(budget),
        }
    }

    pub fn from_env() -> Result<Config, ConfigError> {
        match env::var(JOB_BUDGET_VAR) {
            Ok(raw) => Config::parse(&raw),
            Err(env::VarError::NotPresent) => Ok(Config::default()),
            Err(env::VarError::NotUnicode(_)) => Err(ConfigError::NotUnicode {
                var: JOB_BUDGET_VAR,
            }),
        }
    }

    // Parses a job budget as it would appear in `JOB_BUDGET_VAR`.
    pub fn parse(raw: &str) -> Result<Config, ConfigError> {
        let raw = raw.trim();
        if raw.is_empty() || raw.eq_ignore_ascii_case("none") {
            return Ok(Config { job_budget: None });
        }

        raw.parse()
            .map(Config::with_job_budget)
            .map_err(|_| ConfigError::InvalidBudget {
                value: raw.to_string(),
            })
    }
}

lazy_static! {
    static ref DEFAULT: Config = Config::from_env().unwrap_or_else(|err| {
        warn!(%err, "falling back to the default event loop config");
        Config::default()
    });
}

// The config used by `event_loop::run` and `event_loop::run_until_settled`. Read once per process.
pub fn default_config() -> &'static Config {
    &DEFAULT
}
