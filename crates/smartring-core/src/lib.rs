//! Command queue and telemetry reconstruction for BLE smart rings.
//!
//! The ring's vendor SDK is reached through a [`NativeBridge`]. This crate
//! sits in front of it and provides:
//!
//! - **Serialized commands**: a single-worker FIFO [`CommandQueue`] with
//!   per-operation timeouts, BUSY retry with backoff, and explicit
//!   cancel-and-settle recovery for history reads
//! - **Error taxonomy**: every failure is one of BUSY, NOT_CONNECTED,
//!   TIMEOUT or UNKNOWN ([`ErrorKind`])
//! - **Sleep reconstruction**: raw hypnogram pages merged into one
//!   [`SleepSummary`](smartring_types::SleepSummary) per night
//! - **Heart-rate reconstruction**: timestamped samples, hourly ranges and
//!   overnight summaries
//! - **Vitals**: SpO2, temperature, HRV and blood-pressure normalization
//! - **Events**: typed push events with cancellable subscriptions
//! - **Testing**: a scriptable [`MockBridge`]
//!
//! # Quick Start
//!
//! ```
//! use std::sync::Arc;
//! use smartring_core::{MockBridge, RingClient, RingConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let bridge = Arc::new(MockBridge::with_sample_data());
//!     let client = RingClient::new(bridge, RingConfig::default())?;
//!
//!     let samples = client.heart_rate_samples().await?;
//!     println!("{} heart-rate samples", samples.len());
//!
//!     let hourly = client.hourly_heart_rate().await?;
//!     for hour in hourly.iter().filter(|h| h.has_data()) {
//!         println!("{:02}:00 {:?}", hour.hour, hour.range);
//!     }
//!     Ok(())
//! }
//! ```

pub mod activity;
pub mod bridge;
pub mod classify;
pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod guard;
pub mod heart_rate;
pub mod metrics;
pub mod mock;
pub mod operation;
pub mod payload;
pub mod queue;
pub mod sleep;
pub mod timecodec;
pub mod vitals;

pub use bridge::{NativeBridge, NativeError, NativeEvent};
pub use classify::classify;
pub use client::RingClient;
pub use config::{QueueConfig, RingConfig};
pub use error::{Error, ErrorKind, Result};
pub use events::{EventDispatcher, EventReceiver, HeartRateSource, RingEvent, Subscription};
pub use heart_rate::HeartRateTrace;
pub use metrics::{OperationMetrics, QueueMetrics, QueueMetricsSnapshot};
pub use mock::{MockBridge, MockBridgeBuilder, MockCancel, MockResponse};
pub use operation::{Command, CommandArgs, Operation, OperationPolicy, TimeoutClass};
pub use queue::CommandQueue;
pub use sleep::{SleepBlock, SleepRecord};

// Re-export from smartring-types
pub use smartring_types as types;
pub use smartring_types::{
    Battery, BloodPressureSample, DeviceInfo, FirmwareInfo, HeartRateSample, HeartRateSummary,
    HourRange, HourlyHeartRate, HrvSample, SleepScore, SleepStage, SleepSummary, Steps,
    UserProfile, VitalSample,
};
