//! High-level ring client.
//!
//! [`RingClient`] owns one [`CommandQueue`] and one [`EventDispatcher`]
//! for a ring. Every accessor goes through the queue and returns
//! normalized values; raw bridge payloads never leave this module.

use std::sync::Arc;

use serde_json::Value;
use time::UtcOffset;
use tokio::task::JoinHandle;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info, warn};

use smartring_types::{
    Battery, BloodPressureSample, DeviceInfo, FirmwareInfo, HeartRateSample, HeartRateSummary,
    HourlyHeartRate, HrvSample, SleepScore, SleepSummary, Steps, UserProfile, VitalSample,
};

use crate::activity;
use crate::bridge::NativeBridge;
use crate::config::RingConfig;
use crate::error::{Error, Result};
use crate::events::{EventDispatcher, EventReceiver, RingEvent, Subscription};
use crate::heart_rate;
use crate::metrics::QueueMetrics;
use crate::operation::{Command, CommandArgs, Operation};
use crate::payload::{self, RawAck};
use crate::queue::CommandQueue;
use crate::sleep;
use crate::timecodec::now_ms;
use crate::vitals;

/// Queued, typed access to one ring.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use smartring_core::{MockBridge, RingClient, RingConfig};
///
/// #[tokio::main]
/// async fn main() -> smartring_core::Result<()> {
///     let bridge = Arc::new(MockBridge::with_sample_data());
///     let client = RingClient::new(bridge, RingConfig::default())?;
///
///     let battery = client.battery().await?;
///     assert!(battery.level <= 100);
///
///     if let Some(night) = client.sleep().await? {
///         println!("slept {} min, score {}", night.total_minutes, night.score);
///     }
///     client.shutdown().await;
///     Ok(())
/// }
/// ```
pub struct RingClient {
    queue: CommandQueue,
    events: EventDispatcher,
    offset: UtcOffset,
    pump: JoinHandle<()>,
    pump_guard: DropGuard,
}

impl std::fmt::Debug for RingClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RingClient")
            .field("queue", &self.queue)
            .field("offset", &self.offset)
            .finish()
    }
}

impl RingClient {
    /// Start the queue worker and the event pump for `bridge`.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(bridge: Arc<dyn NativeBridge>, config: RingConfig) -> Result<Self> {
        config.validate()?;
        let offset = config.utc_offset();
        let native_events = bridge.subscribe();
        let queue = CommandQueue::new(bridge, config.queue)?;
        let events = EventDispatcher::new(config.event_capacity);
        let token = CancellationToken::new();
        let pump = events.forward(native_events, token.clone());
        debug!("Ring client started (offset {})", offset);
        Ok(Self {
            queue,
            events,
            offset,
            pump,
            pump_guard: token.drop_guard(),
        })
    }

    /// Offset used to read device-local timestamps.
    pub fn utc_offset(&self) -> UtcOffset {
        self.offset
    }

    pub fn metrics(&self) -> &QueueMetrics {
        self.queue.metrics()
    }

    /// Receive typed ring events.
    pub fn subscribe(&self) -> EventReceiver {
        self.events.subscribe()
    }

    /// Call `callback` for each ring event until the subscription is dropped.
    pub fn listen<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(RingEvent) + Send + 'static,
    {
        self.events.listen(callback)
    }

    /// Stop the event pump and drain the queue.
    pub async fn shutdown(self) {
        let Self {
            queue,
            pump,
            pump_guard,
            ..
        } = self;
        drop(pump_guard);
        join_pump(pump).await;
        queue.shutdown().await;
    }

    /// Run a command, returning its payload and the time it came back.
    async fn fetch(&self, command: impl Into<Command>) -> Result<(Value, i64)> {
        let payload = self.queue.enqueue(command).await?;
        Ok((payload, now_ms()))
    }

    /// Run a command whose reply is only an acknowledgement.
    async fn acknowledge(&self, command: impl Into<Command>) -> Result<()> {
        let command = command.into();
        let operation = command.operation;
        let payload = self.queue.enqueue(command).await?;
        let ack: RawAck = payload::object(payload);
        if ack.success == Some(false) {
            return Err(Error::unknown(
                operation.bridge_name(),
                ack.message
                    .unwrap_or_else(|| "device rejected the command".to_string()),
            ));
        }
        Ok(())
    }

    // Connection management

    pub async fn initialize(&self) -> Result<()> {
        self.acknowledge(Operation::Initialize).await
    }

    pub async fn start_scan(&self) -> Result<()> {
        self.acknowledge(Operation::StartScan).await
    }

    pub async fn stop_scan(&self) -> Result<()> {
        self.acknowledge(Operation::StopScan).await
    }

    /// Connect to the ring with peripheral id `id`.
    pub async fn connect(&self, id: impl Into<String>) -> Result<()> {
        let id = id.into();
        info!("Connecting to {}", id);
        self.acknowledge(
            Command::new(Operation::Connect).with_args(CommandArgs::PeripheralId(id)),
        )
        .await
    }

    pub async fn disconnect(&self) -> Result<()> {
        self.acknowledge(Operation::Disconnect).await
    }

    /// Reconnect to the last known ring.
    pub async fn auto_reconnect(&self) -> Result<()> {
        self.acknowledge(Operation::AutoReconnect).await
    }

    pub async fn connected_devices(&self) -> Result<Vec<DeviceInfo>> {
        let (payload, _) = self.fetch(Operation::ConnectedDevices).await?;
        Ok(activity::devices(payload))
    }

    // Settings

    pub async fn set_user_info(&self, profile: UserProfile) -> Result<()> {
        self.acknowledge(
            Command::new(Operation::SetUserInfo).with_args(CommandArgs::Profile(profile)),
        )
        .await
    }

    /// Set the ring clock to the host clock.
    pub async fn sync_time(&self) -> Result<()> {
        self.acknowledge(Operation::SyncTime).await
    }

    pub async fn set_step_goal(&self, goal: u32) -> Result<()> {
        self.acknowledge(Command::new(Operation::SetStepGoal).with_args(CommandArgs::StepGoal(goal)))
            .await
    }

    pub async fn factory_reset(&self) -> Result<()> {
        self.acknowledge(Operation::FactoryReset).await
    }

    // Device status

    pub async fn battery(&self) -> Result<Battery> {
        let (payload, _) = self.fetch(Operation::GetBatteryLevel).await?;
        Ok(activity::battery(payload))
    }

    pub async fn firmware(&self) -> Result<FirmwareInfo> {
        let (payload, _) = self.fetch(Operation::GetFirmwareVersion).await?;
        Ok(activity::firmware(payload))
    }

    /// The ring clock (epoch ms), if it reports a parseable time.
    pub async fn device_time(&self) -> Result<Option<i64>> {
        let (payload, _) = self.fetch(Operation::GetDeviceTime).await?;
        Ok(activity::device_time(payload, self.offset))
    }

    pub async fn mac_address(&self) -> Result<Option<String>> {
        let (payload, _) = self.fetch(Operation::GetMacAddress).await?;
        Ok(activity::mac_address(payload))
    }

    pub async fn step_goal(&self) -> Result<u32> {
        let (payload, _) = self.fetch(Operation::GetStepGoal).await?;
        Ok(activity::step_goal(payload))
    }

    // History

    /// Today's activity totals.
    pub async fn steps(&self) -> Result<Steps> {
        let (payload, received) = self.fetch(Operation::GetStepsData).await?;
        Ok(activity::steps_payload(payload, self.offset, received))
    }

    /// The most recent sleep block, or `None` without sleep history.
    pub async fn sleep(&self) -> Result<Option<SleepSummary>> {
        let (payload, _) = self.fetch(Operation::GetSleepData).await?;
        Ok(sleep::reconstruct_payload(payload, self.offset))
    }

    /// Composite quality score of the most recent sleep block.
    pub async fn sleep_quality(&self) -> Result<Option<SleepScore>> {
        Ok(self.sleep().await?.as_ref().map(sleep::evaluate_quality))
    }

    async fn heart_rate_traces(&self) -> Result<Vec<heart_rate::HeartRateTrace>> {
        let (payload, received) = self.fetch(Operation::GetHeartRateData).await?;
        Ok(heart_rate::normalize_payload(payload, self.offset, received))
    }

    pub async fn heart_rate_samples(&self) -> Result<Vec<HeartRateSample>> {
        Ok(heart_rate::samples(&self.heart_rate_traces().await?))
    }

    /// Per-hour min/max bpm over the day.
    pub async fn hourly_heart_rate(&self) -> Result<HourlyHeartRate> {
        Ok(heart_rate::hourly_ranges(
            &self.heart_rate_traces().await?,
            self.offset,
        ))
    }

    pub async fn heart_rate_summary(&self) -> Result<HeartRateSummary> {
        Ok(heart_rate::summarize(&self.heart_rate_samples().await?))
    }

    pub async fn hrv(&self) -> Result<Vec<HrvSample>> {
        let (payload, received) = self.fetch(Operation::GetHrvData).await?;
        Ok(vitals::hrv_payload(payload, self.offset, received))
    }

    /// Blood-pressure estimates, read from the HRV history.
    pub async fn blood_pressure(&self) -> Result<Vec<BloodPressureSample>> {
        let (payload, received) = self.fetch(Operation::GetHrvData).await?;
        Ok(vitals::blood_pressure_payload(payload, self.offset, received))
    }

    pub async fn spo2(&self) -> Result<Vec<VitalSample>> {
        let (payload, received) = self.fetch(Operation::GetSpO2Data).await?;
        Ok(vitals::spo2_payload(payload, self.offset, received))
    }

    pub async fn temperature(&self) -> Result<Vec<VitalSample>> {
        let (payload, received) = self.fetch(Operation::GetTemperatureData).await?;
        Ok(vitals::temperature_payload(payload, self.offset, received))
    }

    // Live measurement

    pub async fn start_heart_rate_measurement(&self) -> Result<()> {
        self.acknowledge(Operation::StartHeartRateMeasurement).await
    }

    pub async fn start_spo2_measurement(&self) -> Result<()> {
        self.acknowledge(Operation::StartSpO2Measurement).await
    }

    pub async fn stop_measurement(&self) -> Result<()> {
        self.acknowledge(Operation::StopMeasurement).await
    }

    pub async fn start_real_time_data(&self) -> Result<()> {
        self.acknowledge(Operation::StartRealTimeData).await
    }

    pub async fn stop_real_time_data(&self) -> Result<()> {
        self.acknowledge(Operation::StopRealTimeData).await
    }
}

/// Wait for the event pump, reporting whether it stopped cleanly.
async fn join_pump(pump: JoinHandle<()>) -> bool {
    match pump.await {
        Ok(()) => true,
        Err(e) => {
            warn!("Event pump ended abnormally: {}", e);
            false
        }
    }
}
