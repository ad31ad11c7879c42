//! Application configuration loaded from environment variables.
//!
//! A `.env` file in the working directory is read first when present.
//! Integrations are optional: a missing intervals.icu key or Drive token
//! only disables the matching command.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveDate;

use crate::models::snapshot::DEFAULT_FTP;

pub const DEFAULT_DB_PATH: &str = "casey-rides.db";
pub const DEFAULT_BACKUP_FILENAME: &str = "casey-rides-backup.json";
pub const DEFAULT_OLDEST: &str = "2024-12-29";
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_BACKOFF_MS: u64 = 1000;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
  #[error("Missing configuration: {0}")]
  Missing(&'static str),

  #[error("Invalid value for {var}: '{value}' ({reason})")]
  Invalid {
    var: &'static str,
    value: String,
    reason: &'static str,
  },
}

/// intervals.icu credentials and import window
#[derive(Debug, Clone, PartialEq)]
pub struct IntervalsConfig {
  pub athlete_id: String,
  pub api_key: String,
  /// Earliest activity day requested
  pub oldest: NaiveDate,
}

/// Application configuration, loaded once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
  /// SQLite file holding the local snapshot
  pub db_path: PathBuf,
  /// FTP used until the stored snapshot carries one
  pub ftp: f64,
  pub intervals: Option<IntervalsConfig>,
  /// Bearer token for Google Drive
  pub drive_access_token: Option<String>,
  pub backup_filename: String,
  /// Per-request timeout for every HTTP call
  pub http_timeout: Duration,
  /// First wait before retrying a rate-limited request
  pub retry_backoff: Duration,
}

impl Default for Config {
  fn default() -> Self {
    Self {
      db_path: PathBuf::from(DEFAULT_DB_PATH),
      ftp: DEFAULT_FTP,
      intervals: None,
      drive_access_token: None,
      backup_filename: DEFAULT_BACKUP_FILENAME.to_string(),
      http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
      retry_backoff: Duration::from_millis(DEFAULT_BACKOFF_MS),
    }
  }
}

impl Config {
  /// Load configuration from the process environment (and `.env`)
  pub fn from_env() -> Result<Self, ConfigError> {
    dotenvy::dotenv().ok();
    Self::from_lookup(|key| env::var(key).ok())
  }

  /// Build configuration from any key lookup; blank values count as unset
  pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
  where
    F: Fn(&str) -> Option<String>,
  {
    let get = |key: &str| {
      lookup(key)
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
    };
    let defaults = Self::default();

    let ftp = match get("CASEY_FTP") {
      Some(raw) => parse_ftp(&raw)?,
      None => defaults.ftp,
    };

    let intervals = match (get("INTERVALS_ATHLETE_ID"), get("INTERVALS_API_KEY")) {
      (Some(athlete_id), Some(api_key)) => {
        let oldest_raw = get("INTERVALS_OLDEST").unwrap_or_else(|| DEFAULT_OLDEST.to_string());
        let oldest = NaiveDate::parse_from_str(&oldest_raw, "%Y-%m-%d").map_err(|_| {
          ConfigError::Invalid {
            var: "INTERVALS_OLDEST",
            value: oldest_raw.clone(),
            reason: "expected YYYY-MM-DD",
          }
        })?;
        Some(IntervalsConfig {
          athlete_id,
          api_key,
          oldest,
        })
      }
      (Some(_), None) => return Err(ConfigError::Missing("INTERVALS_API_KEY")),
      (None, Some(_)) => return Err(ConfigError::Missing("INTERVALS_ATHLETE_ID")),
      (None, None) => None,
    };

    let http_timeout = match get("HTTP_TIMEOUT_SECS") {
      Some(raw) => Duration::from_secs(parse_positive_int("HTTP_TIMEOUT_SECS", &raw)?),
      None => defaults.http_timeout,
    };

    let retry_backoff = match get("IMPORT_BACKOFF_MS") {
      Some(raw) => Duration::from_millis(parse_positive_int("IMPORT_BACKOFF_MS", &raw)?),
      None => defaults.retry_backoff,
    };

    Ok(Self {
      db_path: get("CASEY_DB_PATH").map(PathBuf::from).unwrap_or(defaults.db_path),
      ftp,
      intervals,
      drive_access_token: get("GOOGLE_DRIVE_ACCESS_TOKEN"),
      backup_filename: get("DRIVE_BACKUP_FILENAME").unwrap_or(defaults.backup_filename),
      http_timeout,
      retry_backoff,
    })
  }
}

fn parse_ftp(raw: &str) -> Result<f64, ConfigError> {
  match raw.parse::<f64>() {
    Ok(ftp) if ftp.is_finite() && ftp > 0.0 => Ok(ftp),
    _ => Err(ConfigError::Invalid {
      var: "CASEY_FTP",
      value: raw.to_string(),
      reason: "must be a positive number of watts",
    }),
  }
}

fn parse_positive_int(var: &'static str, raw: &str) -> Result<u64, ConfigError> {
  match raw.parse::<u64>() {
    Ok(value) if value > 0 => Ok(value),
    _ => Err(ConfigError::Invalid {
      var,
      value: raw.to_string(),
      reason: "must be a positive integer",
    }),
  }
}

/// ---------------------------------------------------------------------------
/// Tests
/// ---------------------------------------------------------------------------
