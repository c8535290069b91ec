//! Configuration management for Bruteguard.
//!
//! Settings are read from YAML, either under a top-level `BruteGuard` section
//! or directly at the document root:
//!
//! ```yaml
//! BruteGuard:
//!   Enabled: true
//!   GreenRetries: 10
//!   IncreaseRequestTime: 20
//!   TimeUntilReset: 2
//!   TimeUntilResetUnit: H
//!   StatusCodesForAutoProcess: [200, 204]
//! ```

use serde_yaml::{Mapping, Value};
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, info};

use crate::error::{BruteGuardError, Result};
use crate::throttle::{ResetWindow, TimeUnit};

/// Name of the configuration section.
pub const SECTION: &str = "BruteGuard";

/// Status code released automatically when none are configured.
pub const DEFAULT_AUTO_RELEASE_STATUS: u16 = 200;

/// Tunables of the throttling engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GuardConfig {
    /// Master switch; a disabled engine returns no decisions
    pub enabled: bool,
    /// Attempts allowed without delay (inclusive)
    pub green_retries: u32,
    /// Delay added per attempt above `green_retries`, in milliseconds
    pub increase_request_time_ms: u64,
    /// Window magnitude
    pub time_until_reset: u32,
    /// Window unit
    pub time_until_reset_unit: TimeUnit,
    /// Response status codes that trigger an automatic release
    pub status_codes_for_auto_process: Vec<u16>,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            green_retries: default_green_retries(),
            increase_request_time_ms: default_increase_request_time(),
            time_until_reset: default_time_until_reset(),
            time_until_reset_unit: default_time_until_reset_unit(),
            status_codes_for_auto_process: vec![DEFAULT_AUTO_RELEASE_STATUS],
        }
    }
}

fn default_enabled() -> bool {
    true
}

fn default_green_retries() -> u32 {
    10
}

fn default_increase_request_time() -> u64 {
    20
}

fn default_time_until_reset() -> u32 {
    2
}

fn default_time_until_reset_unit() -> TimeUnit {
    TimeUnit::Hours
}

impl GuardConfig {
    /// Load configuration from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading throttle configuration");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load configuration from a YAML string.
    ///
    /// Missing or null keys take their defaults. Present values that cannot
    /// be read as the expected type fail with
    /// [`BruteGuardError::ConfigurationInvalid`].
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let document: Value = serde_yaml::from_str(yaml)
            .map_err(|e| BruteGuardError::Config(format!("Failed to parse configuration: {}", e)))?;

        let root = match document {
            Value::Null => Mapping::new(),
            Value::Mapping(mapping) => mapping,
            other => {
                return Err(BruteGuardError::Config(format!(
                    "Configuration must be a mapping, found {}",
                    describe(&other)
                )))
            }
        };

        let section = match root.get(SECTION).cloned() {
            Some(Value::Mapping(section)) => section,
            Some(Value::Null) => Mapping::new(),
            Some(other) => {
                return Err(BruteGuardError::Config(format!(
                    "Section {} must be a mapping, found {}",
                    SECTION,
                    describe(&other)
                )))
            }
            None => root,
        };

        Self::from_section(&section)
    }

    fn from_section(section: &Mapping) -> Result<Self> {
        let config = Self {
            enabled: read_scalar(section, "Enabled", "bool", default_enabled)?,
            green_retries: read_scalar(
                section,
                "GreenRetries",
                "unsigned integer",
                default_green_retries,
            )?,
            increase_request_time_ms: read_scalar(
                section,
                "IncreaseRequestTime",
                "unsigned integer (milliseconds)",
                default_increase_request_time,
            )?,
            time_until_reset: read_scalar(
                section,
                "TimeUntilReset",
                "unsigned integer",
                default_time_until_reset,
            )?,
            time_until_reset_unit: read_scalar(
                section,
                "TimeUntilResetUnit",
                "time unit (Y, M, D, H, Min, S, Ms)",
                default_time_until_reset_unit,
            )?,
            status_codes_for_auto_process: read_status_codes(section)?,
        }
        .normalized();

        debug!(
            enabled = config.enabled,
            green_retries = config.green_retries,
            increase_request_time_ms = config.increase_request_time_ms,
            window = %config.window(),
            status_codes = ?config.status_codes_for_auto_process,
            "Configuration is valid"
        );

        Ok(config)
    }

    /// Apply fallbacks: an empty auto-release list means `[200]`.
    pub fn normalized(mut self) -> Self {
        if self.status_codes_for_auto_process.is_empty() {
            self.status_codes_for_auto_process = vec![DEFAULT_AUTO_RELEASE_STATUS];
        }
        self
    }

    /// The configured reset window.
    pub fn window(&self) -> ResetWindow {
        ResetWindow::new(self.time_until_reset, self.time_until_reset_unit)
    }

    /// Whether `status` triggers an automatic release.
    pub fn is_auto_release_status(&self, status: u16) -> bool {
        self.status_codes_for_auto_process.contains(&status)
    }
}

/// Read a scalar key, accepting native YAML values and their string forms.
fn read_scalar<T: FromStr>(
    section: &Mapping,
    key: &str,
    expected: &'static str,
    default: fn() -> T,
) -> Result<T> {
    match section.get(key) {
        None | Some(Value::Null) => Ok(default()),
        Some(value) => parse_scalar(value).ok_or_else(|| invalid(key, expected, value)),
    }
}

fn read_status_codes(section: &Mapping) -> Result<Vec<u16>> {
    const KEY: &str = "StatusCodesForAutoProcess";
    const EXPECTED: &str = "list of HTTP status codes";

    match section.get(KEY) {
        None | Some(Value::Null) => Ok(vec![DEFAULT_AUTO_RELEASE_STATUS]),
        Some(Value::Sequence(items)) => items
            .iter()
            .map(|item| parse_scalar::<u16>(item).ok_or_else(|| invalid(KEY, EXPECTED, item)))
            .collect(),
        Some(value) => parse_scalar::<u16>(value)
            .map(|code| vec![code])
            .ok_or_else(|| invalid(KEY, EXPECTED, value)),
    }
}

fn parse_scalar<T: FromStr>(value: &Value) -> Option<T> {
    match value {
        Value::Bool(b) => b.to_string().parse().ok(),
        Value::Number(n) => n.to_string().parse().ok(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn invalid(key: &str, expected: &'static str, value: &Value) -> BruteGuardError {
    BruteGuardError::ConfigurationInvalid {
        key: key.to_string(),
        expected,
        value: render(value),
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        other => describe(other).to_string(),
    }
}

fn describe(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Sequence(_) => "sequence",
        Value::Mapping(_) => "mapping",
        Value::Tagged(_) => "tagged value",
    }
}
