//! Ledger configuration.
//!
//! Defaults match the clinic's production settings; every value can be
//! overridden through `DENTLEDGER_*` environment variables or the `with_*`
//! builders.

use thiserror::Error;

use dentledger_auth::{STAFF_EDIT_WINDOW_DAYS, StaffEditPolicy};
use dentledger_core::DomainError;
use dentledger_observability::LogFormat;

pub const ENV_STAFF_EDIT_WINDOW_DAYS: &str = "DENTLEDGER_STAFF_EDIT_WINDOW_DAYS";
pub const ENV_CLINIC_UTC_OFFSET_MINUTES: &str = "DENTLEDGER_CLINIC_UTC_OFFSET_MINUTES";
pub const ENV_LOG_FORMAT: &str = "DENTLEDGER_LOG_FORMAT";
pub const ENV_LOG_FILTER: &str = "DENTLEDGER_LOG_FILTER";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {var}: '{value}' ({reason})")]
    InvalidValue {
        var: &'static str,
        value: String,
        reason: String,
    },

    #[error("invalid staff edit policy: {0}")]
    Policy(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerConfig {
    /// Calendar days after confirmation during which non-admins may edit
    /// staff credits.
    pub staff_edit_window_days: i64,
    /// Fixed offset of the clinic's local calendar, in minutes east of UTC.
    pub clinic_utc_offset_minutes: i32,
    pub log_format: LogFormat,
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    pub log_filter: String,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            staff_edit_window_days: STAFF_EDIT_WINDOW_DAYS,
            clinic_utc_offset_minutes: 0,
            log_format: LogFormat::Json,
            log_filter: "info".to_string(),
        }
    }
}

impl LedgerConfig {
    pub fn with_staff_edit_window_days(mut self, days: i64) -> Self {
        self.staff_edit_window_days = days;
        self
    }

    pub fn with_clinic_utc_offset_minutes(mut self, minutes: i32) -> Self {
        self.clinic_utc_offset_minutes = minutes;
        self
    }

    pub fn with_log_format(mut self, format: LogFormat) -> Self {
        self.log_format = format;
        self
    }

    pub fn with_log_filter(mut self, filter: impl Into<String>) -> Self {
        self.log_filter = filter.into();
        self
    }

    /// Read overrides from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read overrides through `lookup`; unset keys keep their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(ENV_STAFF_EDIT_WINDOW_DAYS) {
            config.staff_edit_window_days = parse(ENV_STAFF_EDIT_WINDOW_DAYS, &raw)?;
        }
        if let Some(raw) = lookup(ENV_CLINIC_UTC_OFFSET_MINUTES) {
            config.clinic_utc_offset_minutes = parse(ENV_CLINIC_UTC_OFFSET_MINUTES, &raw)?;
        }
        if let Some(raw) = lookup(ENV_LOG_FORMAT) {
            config.log_format = raw.parse().map_err(|e: dentledger_observability::ParseLogFormatError| {
                ConfigError::InvalidValue {
                    var: ENV_LOG_FORMAT,
                    value: raw.clone(),
                    reason: e.to_string(),
                }
            })?;
        }
        if let Some(raw) = lookup(ENV_LOG_FILTER) {
            if !raw.trim().is_empty() {
                config.log_filter = raw.trim().to_string();
            }
        }

        // Fail on a bad window or offset at load time, not at first use.
        config.staff_edit_policy()?;
        Ok(config)
    }

    pub fn staff_edit_policy(&self) -> Result<StaffEditPolicy, ConfigError> {
        StaffEditPolicy::new(self.staff_edit_window_days, self.clinic_utc_offset_minutes)
            .map_err(|e: DomainError| ConfigError::Policy(e.to_string()))
    }
}

fn parse<T>(var: &'static str, raw: &str) -> Result<T, ConfigError>
where
    T: core::str::FromStr,
    T::Err: core::fmt::Display,
{
    raw.trim().parse().map_err(|e: T::Err| ConfigError::InvalidValue {
        var,
        value: raw.to_string(),
        reason: e.to_string(),
    })
}
