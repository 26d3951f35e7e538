//! Mock bridge implementation for testing.
//!
//! [`MockBridge`] implements [`NativeBridge`] without hardware, so the queue,
//! the reconstructors and the client facade can be exercised end to end.
//!
//! # Features
//!
//! - **Scripted replies**: queue per-operation responses, including BUSY
//!   and other native failures
//! - **Hangs and latency**: simulate a native call that never settles or
//!   settles late
//! - **Overlap detection**: records the highest number of concurrently
//!   executing commands
//! - **Call log**: every command and every cancel, in order
//! - **Event injection**: push native events to subscribers

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::sync::broadcast;

use crate::bridge::{NativeBridge, NativeError, NativeEvent};
use crate::operation::{Command, Operation};

/// Capacity of the mock's native event channel.
const EVENT_CAPACITY: usize = 64;

/// One scripted reply.
#[derive(Debug, Clone, PartialEq)]
pub enum MockResponse {
    /// Resolve with this payload.
    Payload(Value),
    /// Reject with this native error.
    Fail(NativeError),
    /// Resolve with this payload after a delay.
    Delayed(Duration, Value),
    /// Never settle.
    Hang,
}

/// How the mock answers `cancelPendingDataRequest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockCancel {
    #[default]
    Succeed,
    Fail,
    Hang,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Decrements the in-flight counter even when the call is abandoned.
struct InFlight<'a>(&'a AtomicUsize);

impl<'a> InFlight<'a> {
    fn enter(counter: &'a AtomicUsize, max: &AtomicUsize) -> Self {
        let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
        max.fetch_max(now, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// A scriptable in-memory ring.
///
/// # Example
///
/// ```
/// use smartring_core::{Command, MockBridge, MockResponse, NativeBridge, NativeError, Operation};
/// use serde_json::json;
///
/// #[tokio::main]
/// async fn main() {
///     let bridge = MockBridge::new();
///     bridge.push_response(Operation::GetBatteryLevel, MockResponse::Fail(NativeError::busy()));
///     bridge.set_payload(Operation::GetBatteryLevel, json!({"battery": 90}));
///
///     let first = bridge.execute(&Command::new(Operation::GetBatteryLevel)).await;
///     assert!(first.is_err());
///     let second = bridge.execute(&Command::new(Operation::GetBatteryLevel)).await;
///     assert_eq!(second.unwrap()["battery"], 90);
/// }
/// ```
pub struct MockBridge {
    connected: AtomicBool,
    scripts: Mutex<HashMap<Operation, VecDeque<MockResponse>>>,
    payloads: Mutex<HashMap<Operation, Value>>,
    calls: Mutex<Vec<Command>>,
    latency_ms: AtomicU64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    cancel_behavior: Mutex<MockCancel>,
    cancel_count: AtomicU32,
    events: broadcast::Sender<NativeEvent>,
}

impl std::fmt::Debug for MockBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockBridge")
            .field("connected", &self.connected.load(Ordering::Relaxed))
            .field("calls", &lock(&self.calls).len())
            .field("cancel_count", &self.cancel_count.load(Ordering::Relaxed))
            .finish()
    }
}

impl Default for MockBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl MockBridge {
    /// A connected ring that acknowledges every command with `{"success": true}`.
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            connected: AtomicBool::new(true),
            scripts: Mutex::new(HashMap::new()),
            payloads: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            latency_ms: AtomicU64::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            cancel_behavior: Mutex::new(MockCancel::Succeed),
            cancel_count: AtomicU32::new(0),
            events,
        }
    }

    /// A ring pre-loaded with one night of realistic history.
    pub fn with_sample_data() -> Self {
        let bridge = Self::new();
        for (operation, payload) in sample_payloads() {
            bridge.set_payload(operation, payload);
        }
        bridge
    }

    /// Create a builder.
    pub fn builder() -> MockBridgeBuilder {
        MockBridgeBuilder::default()
    }

    /// Queue a one-shot reply for `operation`. Replies are consumed in order.
    pub fn push_response(&self, operation: Operation, response: MockResponse) {
        lock(&self.scripts)
            .entry(operation)
            .or_default()
            .push_back(response);
    }

    /// Set the reply used once the script for `operation` is exhausted.
    pub fn set_payload(&self, operation: Operation, payload: Value) {
        lock(&self.payloads).insert(operation, payload);
    }

    /// Simulate link state. A disconnected mock rejects data commands.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Delay every reply by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.latency_ms
            .store(latency.as_millis() as u64, Ordering::Relaxed);
    }

    pub fn set_cancel_behavior(&self, behavior: MockCancel) {
        *lock(&self.cancel_behavior) = behavior;
    }

    /// Push a native event to all subscribers.
    pub fn emit(&self, event: NativeEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Operations executed so far, in order.
    pub fn calls(&self) -> Vec<Operation> {
        lock(&self.calls).iter().map(|c| c.operation).collect()
    }

    /// Commands executed so far, with arguments.
    pub fn commands(&self) -> Vec<Command> {
        lock(&self.calls).clone()
    }

    /// How many times `operation` was executed.
    pub fn call_count(&self, operation: Operation) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| c.operation == operation)
            .count()
    }

    /// How many cancel-pending requests were received.
    pub fn cancel_count(&self) -> u32 {
        self.cancel_count.load(Ordering::SeqCst)
    }

    /// Highest number of commands ever executing at once.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_response(&self, operation: Operation) -> MockResponse {
        if let Some(scripted) = lock(&self.scripts)
            .get_mut(&operation)
            .and_then(VecDeque::pop_front)
        {
            return scripted;
        }
        let payload = lock(&self.payloads)
            .get(&operation)
            .cloned()
            .unwrap_or_else(|| json!({"success": true}));
        MockResponse::Payload(payload)
    }

    fn apply_link_change(&self, operation: Operation) {
        let state = match operation {
            Operation::Connect | Operation::AutoReconnect => {
                self.set_connected(true);
                "connected"
            }
            Operation::Disconnect => {
                self.set_connected(false);
                "disconnected"
            }
            _ => return,
        };
        self.emit(NativeEvent::new(
            "onConnectionStateChanged",
            json!({"state": state}),
        ));
    }
}

fn needs_link(operation: Operation) -> bool {
    !matches!(
        operation,
        Operation::Initialize
            | Operation::StartScan
            | Operation::StopScan
            | Operation::Connect
            | Operation::AutoReconnect
            | Operation::ConnectedDevices
    )
}

#[async_trait]
impl NativeBridge for MockBridge {
    async fn execute(&self, command: &Command) -> Result<Value, NativeError> {
        let _guard = InFlight::enter(&self.in_flight, &self.max_in_flight);
        lock(&self.calls).push(command.clone());

        let latency = self.latency_ms.load(Ordering::Relaxed);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }

        if needs_link(command.operation) && !self.is_connected() {
            return Err(NativeError::not_connected());
        }

        let response = self.next_response(command.operation);
        let result = match response {
            MockResponse::Payload(value) => Ok(value),
            MockResponse::Fail(error) => Err(error),
            MockResponse::Delayed(delay, value) => {
                tokio::time::sleep(delay).await;
                Ok(value)
            }
            MockResponse::Hang => std::future::pending().await,
        };
        if result.is_ok() {
            self.apply_link_change(command.operation);
        }
        result
    }

    async fn cancel_pending_data_request(&self) -> Result<(), NativeError> {
        self.cancel_count.fetch_add(1, Ordering::SeqCst);
        let behavior = *lock(&self.cancel_behavior);
        match behavior {
            MockCancel::Succeed => Ok(()),
            MockCancel::Fail => Err(NativeError::new("No pending request")),
            MockCancel::Hang => std::future::pending().await,
        }
    }

    fn subscribe(&self) -> broadcast::Receiver<NativeEvent> {
        self.events.subscribe()
    }
}

/// Builder for [`MockBridge`].
#[derive(Debug, Default)]
pub struct MockBridgeBuilder {
    sample_data: bool,
    disconnected: bool,
    latency: Option<Duration>,
    cancel: MockCancel,
    payloads: Vec<(Operation, Value)>,
    scripts: Vec<(Operation, MockResponse)>,
}

impl MockBridgeBuilder {
    /// Start from [`MockBridge::with_sample_data`].
    #[must_use]
    pub fn sample_data(mut self) -> Self {
        self.sample_data = true;
        self
    }

    /// Start with no link.
    #[must_use]
    pub fn disconnected(mut self) -> Self {
        self.disconnected = true;
        self
    }

    #[must_use]
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    #[must_use]
    pub fn cancel_behavior(mut self, behavior: MockCancel) -> Self {
        self.cancel = behavior;
        self
    }

    #[must_use]
    pub fn payload(mut self, operation: Operation, payload: Value) -> Self {
        self.payloads.push((operation, payload));
        self
    }

    #[must_use]
    pub fn response(mut self, operation: Operation, response: MockResponse) -> Self {
        self.scripts.push((operation, response));
        self
    }

    pub fn build(self) -> MockBridge {
        let bridge = if self.sample_data {
            MockBridge::with_sample_data()
        } else {
            MockBridge::new()
        };
        bridge.set_connected(!self.disconnected);
        if let Some(latency) = self.latency {
            bridge.set_latency(latency);
        }
        bridge.set_cancel_behavior(self.cancel);
        for (operation, payload) in self.payloads {
            bridge.set_payload(operation, payload);
        }
        for (operation, response) in self.scripts {
            bridge.push_response(operation, response);
        }
        bridge
    }
}

/// Payloads shaped like the X3 bridge's replies for one night.
fn sample_payloads() -> Vec<(Operation, Value)> {
    vec![
        (Operation::GetBatteryLevel, json!({"battery": 82})),
        (Operation::GetFirmwareVersion, json!({"version": "X3_V1.2.5"})),
        (Operation::GetDeviceTime, json!({"time": "2024.01.02 07:30:00"})),
        (Operation::GetMacAddress, json!({"mac": "C4:7A:11:20:3B:9E"})),
        (Operation::GetStepGoal, json!({"goal": 8000})),
        (
            Operation::ConnectedDevices,
            json!([{"id": "ring-0001", "name": "X3 Ring", "mac": "C4:7A:11:20:3B:9E", "rssi": -58}]),
        ),
        (
            Operation::GetStepsData,
            json!({"data": [{"arrayTotalActivityData": [
                {"date": "2024.01.01", "step": 7421, "distance": 5.2, "calories": 310, "exerciseMinutes": 42}
            ]}]}),
        ),
        (
            Operation::GetSleepData,
            json!({"data": [
                {"startTime_SleepData": "2024.01.02 00:15:00", "sleepUnitLength": 5, "arraySleepQuality": [2, 3]},
                {"startTime_SleepData": "2024.01.01 23:00:00", "sleepUnitLength": 5, "arraySleepQuality": [1, 1, 2]},
                {"startTime_SleepData": "2024.01.01 14:00:00", "sleepUnitLength": 10, "arraySleepQuality": [2, 2]}
            ]}),
        ),
        (
            Operation::GetHeartRateData,
            json!({"data": [
                {"date": "2024.01.01 23:00:00", "arrayDynamicHR": [62, 60, 0, 58, 57]},
                {"arrayContinuousHR": [
                    {"date": "2024.01.02 03:00:00", "arrayHR": [52, 51, 53]},
                    {"date": "2024.01.02 06:59:00", "arrayHR": [64, 70]}
                ]}
            ]}),
        ),
        (
            Operation::GetHrvData,
            json!({"data": [
                {"arrayHrvData": [
                    {"hrv": 48, "heartRate": 58, "stress": 22, "date": "2024.01.02 02:00:00"},
                    {"hrv": 0, "heartRate": 0, "date": "2024.01.02 03:00:00"}
                ]},
                {"hrvValue": 41, "heartRate": 61, "stress": 30, "HighPressure": 118, "LowPressure": 76}
            ]}),
        ),
        (
            Operation::GetSpO2Data,
            json!({"data": [{"arrayAutomaticSpo2Data": [
                {"automaticSpo2Data": 97, "date": "2024.01.02 01:00:00"},
                {"automaticSpo2Data": 0, "date": "2024.01.02 02:00:00"},
                {"automaticSpo2Data": 95, "date": "2024.01.02 04:00:00"}
            ]}]}),
        ),
        (
            Operation::GetTemperatureData,
            json!({"data": [{"arrayemperatureData": [
                {"temperature": 36.4, "date": "2024.01.02 01:00:00"},
                {"temperature": 50.0, "date": "2024.01.02 02:00:00"},
                {"temperature": 36.6, "date": "2024.01.02 04:00:00"}
            ]}]}),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_default_reply_is_ack() {
        let bridge = MockBridge::new();
        let reply = bridge
            .execute(&Command::new(Operation::SyncTime))
            .await
            .unwrap();
        assert_eq!(reply, json!({"success": true}));
        assert_eq!(bridge.calls(), vec![Operation::SyncTime]);
    }

    #[tokio::test]
    async fn test_scripts_run_before_payload() {
        let bridge = MockBridge::builder()
            .payload(Operation::GetStepGoal, json!({"goal": 9000}))
            .response(
                Operation::GetStepGoal,
                MockResponse::Fail(NativeError::busy()),
            )
            .build();
        let cmd = Command::new(Operation::GetStepGoal);
        assert!(bridge.execute(&cmd).await.is_err());
        assert_eq!(bridge.execute(&cmd).await.unwrap()["goal"], 9000);
        assert_eq!(bridge.execute(&cmd).await.unwrap()["goal"], 9000);
    }

    #[tokio::test]
    async fn test_disconnected_rejects_data_commands() {
        let bridge = MockBridge::builder().disconnected().build();
        let err = bridge
            .execute(&Command::new(Operation::GetSleepData))
            .await
            .unwrap_err();
        assert_eq!(err.code.as_deref(), Some("NOT_CONNECTED"));

        bridge
            .execute(&Command::new(Operation::Connect))
            .await
            .unwrap();
        assert!(bridge.is_connected());
    }

    #[tokio::test]
    async fn test_connect_emits_state_event() {
        let bridge = MockBridge::builder().disconnected().build();
        let mut events = bridge.subscribe();
        bridge
            .execute(&Command::new(Operation::Connect))
            .await
            .unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(event.name, "onConnectionStateChanged");
        assert_eq!(event.body["state"], "connected");
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_call_leaves_no_in_flight() {
        let bridge = MockBridge::new();
        bridge.push_response(Operation::GetSleepData, MockResponse::Hang);
        let cmd = Command::new(Operation::GetSleepData);
        let result = tokio::time::timeout(Duration::from_secs(1), bridge.execute(&cmd)).await;
        assert!(result.is_err());
        assert_eq!(bridge.in_flight.load(Ordering::SeqCst), 0);
        assert_eq!(bridge.max_in_flight(), 1);
    }

    #[tokio::test]
    async fn test_cancel_behaviors() {
        let bridge = MockBridge::new();
        assert!(bridge.cancel_pending_data_request().await.is_ok());
        bridge.set_cancel_behavior(MockCancel::Fail);
        assert!(bridge.cancel_pending_data_request().await.is_err());
        assert_eq!(bridge.cancel_count(), 2);
    }

    #[test]
    fn test_sample_data_covers_history_fetches() {
        let bridge = MockBridge::with_sample_data();
        let payloads = lock(&bridge.payloads);
        for op in [
            Operation::GetSleepData,
            Operation::GetHeartRateData,
            Operation::GetHrvData,
            Operation::GetSpO2Data,
            Operation::GetTemperatureData,
            Operation::GetStepsData,
        ] {
            assert!(payloads.contains_key(&op), "{op}");
        }
    }
}
