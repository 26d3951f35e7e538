//! Queue and client configuration.
//!
//! ```toml
//! utc_offset_minutes = 60
//! event_capacity = 100
//!
//! [queue]
//! capacity = 64
//! busy_backoff_ms = 250
//! max_busy_retries = 1
//! cancel_timeout_ms = 1500
//! settle_delay_ms = 150
//! command_timeout_ms = 5000
//! data_timeout_ms = 10000
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::UtcOffset;

use crate::error::{Error, Result};
use crate::timecodec;

/// Retry, cancel and timeout knobs of the command queue.
///
/// Every field has a default, so a partial TOML table is enough.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Depth of the bounded submission channel.
    pub capacity: usize,
    /// Backoff unit before a BUSY retry; attempt `n` waits `n` units.
    pub busy_backoff_ms: u64,
    /// BUSY retries allowed for busy-retryable operations.
    pub max_busy_retries: u32,
    /// Deadline for the cancel-pending recovery call.
    pub cancel_timeout_ms: u64,
    /// Pause after a successful cancel before the next attempt.
    pub settle_delay_ms: u64,
    /// Deadline for short commands.
    pub command_timeout_ms: u64,
    /// Deadline for paginated history fetches.
    pub data_timeout_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            capacity: 64,
            busy_backoff_ms: 250,
            max_busy_retries: 1,
            cancel_timeout_ms: 1500,
            settle_delay_ms: 150,
            command_timeout_ms: 5000,
            data_timeout_ms: 10_000,
        }
    }
}

impl QueueConfig {
    /// Validate the configuration.
    ///
    /// Checks that the channel capacity and all three deadlines are non-zero.
    pub fn validate(&self) -> Result<()> {
        if self.capacity == 0 {
            return Err(Error::invalid_config("capacity must be > 0"));
        }
        if self.command_timeout_ms == 0 {
            return Err(Error::invalid_config("command_timeout_ms must be > 0"));
        }
        if self.data_timeout_ms == 0 {
            return Err(Error::invalid_config("data_timeout_ms must be > 0"));
        }
        if self.cancel_timeout_ms == 0 {
            return Err(Error::invalid_config("cancel_timeout_ms must be > 0"));
        }
        Ok(())
    }

    /// Backoff before BUSY retry number `attempt` (1-based).
    pub fn busy_backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.busy_backoff_ms.saturating_mul(u64::from(attempt)))
    }

    pub fn cancel_timeout(&self) -> Duration {
        Duration::from_millis(self.cancel_timeout_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn data_timeout(&self) -> Duration {
        Duration::from_millis(self.data_timeout_ms)
    }

    /// Set the channel capacity.
    #[must_use]
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the BUSY backoff unit.
    #[must_use]
    pub fn busy_backoff_ms(mut self, ms: u64) -> Self {
        self.busy_backoff_ms = ms;
        self
    }

    /// Set how many BUSY retries a retryable operation gets.
    #[must_use]
    pub fn max_busy_retries(mut self, retries: u32) -> Self {
        self.max_busy_retries = retries;
        self
    }

    /// Set the cancel-pending deadline.
    #[must_use]
    pub fn cancel_timeout_ms(mut self, ms: u64) -> Self {
        self.cancel_timeout_ms = ms;
        self
    }

    /// Set the post-cancel settle delay.
    #[must_use]
    pub fn settle_delay_ms(mut self, ms: u64) -> Self {
        self.settle_delay_ms = ms;
        self
    }

    /// Set the short-command deadline.
    #[must_use]
    pub fn command_timeout_ms(mut self, ms: u64) -> Self {
        self.command_timeout_ms = ms;
        self
    }

    /// Set the history-fetch deadline.
    #[must_use]
    pub fn data_timeout_ms(mut self, ms: u64) -> Self {
        self.data_timeout_ms = ms;
        self
    }
}

/// Top-level configuration of a [`crate::RingClient`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RingConfig {
    pub queue: QueueConfig,
    /// Offset used to read the ring's local timestamps. `None` means the
    /// host's local offset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub utc_offset_minutes: Option<i32>,
    /// Buffer of the typed event channel.
    pub event_capacity: usize,
}

impl Default for RingConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            utc_offset_minutes: None,
            event_capacity: 100,
        }
    }
}

impl RingConfig {
    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: RingConfig =
            toml::from_str(content).map_err(|e| Error::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Serialize to pretty TOML.
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::invalid_config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        self.queue.validate()?;
        if self.event_capacity == 0 {
            return Err(Error::invalid_config("event_capacity must be > 0"));
        }
        if let Some(minutes) = self.utc_offset_minutes {
            if minutes.abs() >= 24 * 60 {
                return Err(Error::invalid_config(format!(
                    "utc_offset_minutes out of range: {}",
                    minutes
                )));
            }
        }
        Ok(())
    }

    /// The offset device timestamps are interpreted in.
    ///
    /// Falls back to the host's local offset, then to UTC.
    pub fn utc_offset(&self) -> UtcOffset {
        self.utc_offset_minutes
            .and_then(|minutes| UtcOffset::from_whole_seconds(minutes * 60).ok())
            .unwrap_or_else(timecodec::local_offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_ring_firmware_budgets() {
        let config = QueueConfig::default();
        assert_eq!(config.capacity, 64);
        assert_eq!(config.busy_backoff(1), Duration::from_millis(250));
        assert_eq!(config.busy_backoff(2), Duration::from_millis(500));
        assert_eq!(config.cancel_timeout(), Duration::from_millis(1500));
        assert_eq!(config.settle_delay(), Duration::from_millis(150));
        assert_eq!(config.command_timeout(), Duration::from_secs(5));
        assert_eq!(config.data_timeout(), Duration::from_secs(10));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        assert!(QueueConfig::default().capacity(0).validate().is_err());
        assert!(QueueConfig::default().command_timeout_ms(0).validate().is_err());
        assert!(QueueConfig::default().data_timeout_ms(0).validate().is_err());
        assert!(QueueConfig::default().cancel_timeout_ms(0).validate().is_err());
        // A zero backoff or settle delay is allowed.
        assert!(
            QueueConfig::default()
                .busy_backoff_ms(0)
                .settle_delay_ms(0)
                .validate()
                .is_ok()
        );
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = RingConfig::from_toml_str(
            r#"
            utc_offset_minutes = 120

            [queue]
            data_timeout_ms = 20000
            "#,
        )
        .unwrap();
        assert_eq!(config.queue.data_timeout_ms, 20_000);
        assert_eq!(config.queue.command_timeout_ms, 5000);
        assert_eq!(config.event_capacity, 100);
        assert_eq!(config.utc_offset().whole_minutes(), 120);
    }

    #[test]
    fn test_invalid_toml_is_config_error() {
        let err = RingConfig::from_toml_str("[queue]\ncapacity = 0\n").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));

        let err = RingConfig::from_toml_str("queue = 7").unwrap_err();
        assert!(matches!(err, Error::InvalidConfig(_)));

        let err = RingConfig::from_toml_str("utc_offset_minutes = 1440").unwrap_err();
        assert!(err.to_string().contains("utc_offset_minutes"));
    }

    #[test]
    fn test_toml_round_trip() {
        let config = RingConfig {
            utc_offset_minutes: Some(-300),
            ..Default::default()
        };
        let text = config.to_toml_string().unwrap();
        assert_eq!(RingConfig::from_toml_str(&text).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file_is_io_error() {
        let err = RingConfig::load("/nonexistent/smartring.toml").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
