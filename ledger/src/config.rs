//! # Engine Configuration & Constants
//!
//! Fixed protocol constants live at the top of this file; everything an
//! operator may reasonably tune lives in [`MarketConfig`].
//!
//! `MarketConfig` deserializes from JSON with every field optional, so a
//! deployment file only needs to name what it changes.

use std::path::Path;

use anyhow::Context;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::telemetry::LogFormat;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// The first credit id handed out by a fresh registry. Ids are never reused.
pub const FIRST_CREDIT_ID: u64 = 1;

/// The first listing id handed out by a fresh marketplace.
pub const FIRST_LISTING_ID: u64 = 1;

// ---------------------------------------------------------------------------
// Snapshots
// ---------------------------------------------------------------------------

/// Version tag written into every snapshot. Bump on any layout change.
pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

// ---------------------------------------------------------------------------
// Input limits
// ---------------------------------------------------------------------------

/// Default maximum length, in bytes, of free-text credit metadata
/// (project type, location, standard, serial number, project name).
pub const DEFAULT_MAX_TEXT_FIELD_LENGTH: usize = 64;

/// Earliest vintage year accepted by default. Kyoto-era reductions are the
/// oldest still traded.
pub const DEFAULT_MIN_VINTAGE_YEAR: u16 = 1990;

/// Latest vintage year accepted by default.
pub const DEFAULT_MAX_VINTAGE_YEAR: u16 = 2100;

// ---------------------------------------------------------------------------
// Telemetry
// ---------------------------------------------------------------------------

/// Prometheus namespace used when none is configured.
pub const DEFAULT_METRICS_NAMESPACE: &str = "carbon";

/// Log filter used when none is configured and `RUST_LOG` is unset.
pub const DEFAULT_LOG_LEVEL: &str = "info";

// ---------------------------------------------------------------------------
// MarketConfig
// ---------------------------------------------------------------------------

/// Which developer approvals authorize a mint.
///
/// Approvals are per (developer, verifier) pair. A developer may hold
/// approvals from several verifiers, and a verifier may since have been
/// removed by the administrator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MintAuthorization {
    /// Any approved record counts, whether or not the approving verifier is
    /// still in the verifier set.
    AnyRecordedApproval,
    /// Only approvals from verifiers that are currently authorized count.
    #[default]
    ActiveVerifierOnly,
}

/// Configuration validation failures.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// The vintage window is empty.
    #[error("invalid vintage window: min {min} is after max {max}")]
    VintageWindow {
        /// Configured minimum.
        min: u16,
        /// Configured maximum.
        max: u16,
    },

    /// Text fields must allow at least one byte.
    #[error("max_text_field_length must be positive")]
    ZeroTextLimit,

    /// Prometheus rejects empty namespaces.
    #[error("metrics namespace must not be empty")]
    EmptyNamespace,
}

/// Runtime configuration of a market engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// Which approvals authorize a mint.
    pub mint_authorization: MintAuthorization,
    /// Reject a mint whose serial number is already registered.
    pub unique_serial_numbers: bool,
    /// Maximum byte length of free-text metadata fields.
    pub max_text_field_length: usize,
    /// Earliest accepted vintage year (inclusive).
    pub min_vintage_year: u16,
    /// Latest accepted vintage year (inclusive).
    pub max_vintage_year: u16,
    /// Prometheus namespace for [`crate::metrics::MarketMetrics`].
    pub metrics_namespace: String,
    /// Default log filter for [`crate::telemetry::init_logging`].
    pub log_level: String,
    /// Log output format.
    pub log_format: LogFormat,
}

impl Default for MarketConfig {
    fn default() -> Self {
        Self {
            mint_authorization: MintAuthorization::default(),
            unique_serial_numbers: true,
            max_text_field_length: DEFAULT_MAX_TEXT_FIELD_LENGTH,
            min_vintage_year: DEFAULT_MIN_VINTAGE_YEAR,
            max_vintage_year: DEFAULT_MAX_VINTAGE_YEAR,
            metrics_namespace: DEFAULT_METRICS_NAMESPACE.to_string(),
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            log_format: LogFormat::default(),
        }
    }
}

impl MarketConfig {
    /// Parses and validates a JSON configuration document.
    pub fn from_json_str(json: &str) -> anyhow::Result<Self> {
        let config: Self = serde_json::from_str(json).context("malformed market config")?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("reading market config {}", path.display()))?;
        Self::from_json_str(&raw).with_context(|| format!("loading {}", path.display()))
    }

    /// Checks internal consistency.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.min_vintage_year > self.max_vintage_year {
            return Err(ConfigError::VintageWindow {
                min: self.min_vintage_year,
                max: self.max_vintage_year,
            });
        }
        if self.max_text_field_length == 0 {
            return Err(ConfigError::ZeroTextLimit);
        }
        if self.metrics_namespace.trim().is_empty() {
            return Err(ConfigError::EmptyNamespace);
        }
        Ok(())
    }
}
