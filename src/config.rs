//! Command line and environment configuration

use std::time::Duration;

use chrono::FixedOffset;
use clap::{Parser, ValueEnum};

use crate::reconcilers::coffee::parse_expected_duration;
use crate::{Error, Result};

/// Output format for log lines
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// One JSON object per line
    #[default]
    Json,
    /// Human readable
    Text,
}

/// Runtime settings for the controller.
///
/// Every option has a default so the binary can be started without
/// arguments, both locally and from the container entrypoint.
#[derive(Parser, Clone, Debug)]
#[command(name = "kubespresso", version, about)]
pub struct Settings {
    /// Base URL of the coffee machine HTTP API
    #[arg(
        long,
        env = "KUBESPRESSO_COFFEE_MACHINE_URL",
        default_value = "http://coffee-machine.local"
    )]
    pub coffee_machine_url: String,

    /// Bearer token sent to the coffee machine
    #[arg(long, env = "KUBESPRESSO_COFFEE_MACHINE_TOKEN", hide_env_values = true)]
    pub coffee_machine_token: Option<String>,

    /// Recipe to brew
    #[arg(long, env = "KUBESPRESSO_RECIPE", default_value = "espresso")]
    pub recipe: String,

    /// Timeout for a single brew request
    #[arg(long, env = "KUBESPRESSO_BREW_TIMEOUT_SECS", default_value_t = 10)]
    pub brew_timeout_secs: u64,

    /// Job label holding the expected run time
    #[arg(
        long,
        env = "KUBESPRESSO_DURATION_LABEL",
        default_value = "expectedDuration"
    )]
    pub duration_label: String,

    /// Job label naming the person to brew for
    #[arg(long, env = "KUBESPRESSO_OWNER_LABEL", default_value = "owner")]
    pub owner_label: String,

    /// Jobs expected to finish sooner than this do not earn a coffee
    #[arg(long, env = "KUBESPRESSO_MIN_EXPECTED_DURATION", default_value = "10m")]
    pub min_expected_duration: String,

    /// Offset from UTC, in minutes, used to decide when a day starts
    #[arg(
        long,
        env = "KUBESPRESSO_UTC_OFFSET_MINUTES",
        default_value_t = 0,
        allow_negative_numbers = true
    )]
    pub utc_offset_minutes: i32,

    /// Only watch Jobs in this namespace
    #[arg(long, env = "KUBESPRESSO_NAMESPACE")]
    pub namespace: Option<String>,

    /// Port for the metrics and health endpoints
    #[arg(long, env = "KUBESPRESSO_METRICS_PORT", default_value_t = 8080)]
    pub metrics_port: u16,

    /// Log output format
    #[arg(long, env = "KUBESPRESSO_LOG_FORMAT", value_enum, default_value_t = LogFormat::Json)]
    pub log_format: LogFormat,

    /// Decide and log, but never call the coffee machine or patch Jobs
    #[arg(long, env = "KUBESPRESSO_DRY_RUN")]
    pub dry_run: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Settings::parse_from(["kubespresso"])
    }
}

impl Settings {
    /// Check settings that clap cannot check on its own
    pub fn validate(&self) -> Result<()> {
        let url = reqwest::Url::parse(&self.coffee_machine_url).map_err(|e| {
            Error::Config(format!(
                "coffee-machine-url '{}' is not a valid URL: {}",
                self.coffee_machine_url, e
            ))
        })?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(Error::Config(format!(
                "coffee-machine-url must use http or https, got '{}'",
                url.scheme()
            )));
        }

        if self.brew_timeout_secs == 0 {
            return Err(Error::Config("brew-timeout-secs must be >= 1".to_string()));
        }

        if self.duration_label.trim().is_empty() {
            return Err(Error::Config("duration-label cannot be empty".to_string()));
        }

        if self.owner_label.trim().is_empty() {
            return Err(Error::Config("owner-label cannot be empty".to_string()));
        }

        self.min_expected_duration()?;
        self.day_offset()?;

        Ok(())
    }

    /// Parsed minimum expected duration
    pub fn min_expected_duration(&self) -> Result<Duration> {
        parse_expected_duration(&self.min_expected_duration)
    }

    /// Offset that defines the calendar day for "one coffee per day"
    pub fn day_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.utc_offset_minutes * 60).ok_or_else(|| {
            Error::Config(format!(
                "utc-offset-minutes must be within +/-1440, got {}",
                self.utc_offset_minutes
            ))
        })
    }

    /// Timeout for brew requests
    pub fn brew_timeout(&self) -> Duration {
        Duration::from_secs(self.brew_timeout_secs)
    }
}
