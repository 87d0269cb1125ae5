//! Engine and logging configuration
//!
//! Configuration is read from an optional TOML file; every field has a
//! default so a partial (or missing) file is fine. CLI flags are applied on
//! top by the binary.
//!
//! ```toml
//! escrow_ttl_secs = 1800
//! supported_currencies = ["IDR"]
//! notification_timeout_ms = 5000
//!
//! [audit]
//! attempt_timeout_ms = 2000
//! max_attempts = 3
//! backoff_ms = 100
//!
//! [logging]
//! level = "info"
//! json = false
//! ```

use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::audit::DeliveryPolicy;
use crate::types::TransferError;

/// One year
const MAX_ESCROW_TTL_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Lifetime of an escrow wallet
    pub escrow_ttl_secs: u64,
    pub supported_currencies: Vec<String>,
    /// Upper bound on a single counterparty notification
    pub notification_timeout_ms: u64,
    pub audit: AuditConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    pub attempt_timeout_ms: u64,
    pub max_attempts: u32,
    pub backoff_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            escrow_ttl_secs: 30 * 60,
            supported_currencies: vec!["IDR".to_string()],
            notification_timeout_ms: 5000,
            audit: AuditConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            attempt_timeout_ms: 2000,
            max_attempts: 3,
            backoff_ms: 100,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

impl EngineConfig {
    /// Load from a TOML file
    pub fn load(path: &Path) -> Result<Self, TransferError> {
        if !path.exists() {
            return Err(TransferError::FileNotFound {
                path: path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, TransferError> {
        let config: EngineConfig =
            toml::from_str(content).map_err(|e| TransferError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), TransferError> {
        if self.escrow_ttl_secs == 0 {
            return Err(TransferError::config("escrow_ttl_secs must be positive"));
        }
        if self.escrow_ttl_secs > MAX_ESCROW_TTL_SECS {
            return Err(TransferError::config(format!(
                "escrow_ttl_secs must not exceed {}",
                MAX_ESCROW_TTL_SECS
            )));
        }
        if self.supported_currencies.is_empty() {
            return Err(TransferError::config(
                "supported_currencies must not be empty",
            ));
        }
        if self.audit.max_attempts == 0 {
            return Err(TransferError::config("audit.max_attempts must be positive"));
        }
        Ok(())
    }

    pub fn escrow_ttl(&self) -> Duration {
        Duration::seconds(self.escrow_ttl_secs.min(MAX_ESCROW_TTL_SECS) as i64)
    }

    pub fn notification_timeout(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.notification_timeout_ms)
    }

    pub fn is_supported_currency(&self, currency: &str) -> bool {
        self.supported_currencies.iter().any(|c| c == currency)
    }

    pub fn delivery_policy(&self) -> DeliveryPolicy {
        DeliveryPolicy {
            attempt_timeout: std::time::Duration::from_millis(self.audit.attempt_timeout_ms),
            max_attempts: self.audit.max_attempts,
            backoff: std::time::Duration::from_millis(self.audit.backoff_ms),
        }
    }
}
