//! Ring event system.
//!
//! The native layer pushes untyped [`NativeEvent`]s. [`normalize`] turns
//! each into zero or more typed [`RingEvent`]s and an [`EventDispatcher`]
//! fans them out to any number of subscribers over a broadcast channel.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use smartring_types::{BluetoothState, ConnectionState, DeviceInfo};

use crate::activity;
use crate::bridge::NativeEvent;
use crate::payload::{self, RawDevice, RawEventBody};
use crate::timecodec::now_ms;

/// Where a heart-rate event came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeartRateSource {
    /// Continuous real-time stream.
    RealTime,
    /// Result of an explicit measurement.
    Measurement,
}

/// Typed push events from the ring.
///
/// Native event names with no variant here are logged and dropped, so
/// matches need a wildcard arm.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
#[non_exhaustive]
pub enum RingEvent {
    HeartRate {
        bpm: u16,
        timestamp_ms: i64,
        source: HeartRateSource,
    },
    /// Live step counter. `distance` is passed through in the ring's unit.
    Steps {
        steps: u32,
        calories: f64,
        distance: f64,
    },
    Battery {
        level: u8,
    },
    #[serde(rename = "spo2")]
    SpO2 {
        value: f64,
        timestamp_ms: i64,
    },
    Temperature {
        value: f64,
        timestamp_ms: i64,
    },
    ConnectionStateChanged {
        state: ConnectionState,
    },
    BluetoothStateChanged {
        state: BluetoothState,
    },
    DeviceDiscovered {
        device: DeviceInfo,
    },
    Error {
        message: String,
    },
    DebugLog {
        message: String,
        timestamp_ms: i64,
    },
}

fn bpm(value: Option<f64>) -> Option<u16> {
    value
        .filter(|v| *v > 0.0)
        .map(|v| v.round().min(f64::from(u16::MAX)) as u16)
        .filter(|v| *v > 0)
}

fn error_message(body: &Value, raw: &RawEventBody) -> String {
    match (&raw.message, body) {
        (Some(message), _) => message.clone(),
        (None, Value::String(s)) => s.clone(),
        (None, other) => other.to_string(),
    }
}

/// Translate one native event.
///
/// One `onRealTimeData` push can carry heart rate, steps and temperature
/// together, so the result is a list. Unknown channels produce nothing.
pub fn normalize(event: NativeEvent, now_ms: i64) -> Vec<RingEvent> {
    let raw: RawEventBody = payload::object(event.body.clone());
    let timestamp_ms = raw.timestamp_or(now_ms);
    let mut out = Vec::new();

    match event.name.as_str() {
        "onRealTimeData" => {
            if let Some(bpm) = bpm(raw.heart_rate) {
                out.push(RingEvent::HeartRate {
                    bpm,
                    timestamp_ms,
                    source: HeartRateSource::RealTime,
                });
            }
            if let Some(steps) = raw.steps {
                out.push(RingEvent::Steps {
                    steps: steps.max(0.0).round() as u32,
                    calories: raw.calories.unwrap_or(0.0),
                    distance: raw.distance.unwrap_or(0.0),
                });
            }
            if let Some(value) = raw.temperature {
                out.push(RingEvent::Temperature {
                    value,
                    timestamp_ms,
                });
            }
        }
        "onMeasurementResult" => {
            if let Some(bpm) = bpm(raw.any_heart_rate()) {
                out.push(RingEvent::HeartRate {
                    bpm,
                    timestamp_ms,
                    source: HeartRateSource::Measurement,
                });
            }
            if let Some(level) = raw.battery {
                out.push(RingEvent::Battery {
                    level: level.round().clamp(0.0, 100.0) as u8,
                });
            }
            if let Some(value) = raw.spo2 {
                out.push(RingEvent::SpO2 {
                    value,
                    timestamp_ms,
                });
            }
        }
        "onConnectionStateChanged" => {
            let label = raw.state.as_deref().unwrap_or_default();
            out.push(RingEvent::ConnectionStateChanged {
                state: ConnectionState::from_label(label),
            });
        }
        "onBluetoothStateChanged" => {
            let label = raw.state.as_deref().unwrap_or_default();
            out.push(RingEvent::BluetoothStateChanged {
                state: BluetoothState::from_label(label),
            });
        }
        "onDeviceFound" | "onDeviceDiscovered" => {
            let device: RawDevice = payload::object(event.body);
            if let Some(device) = activity::device(device) {
                out.push(RingEvent::DeviceDiscovered { device });
            }
        }
        "onError" => out.push(RingEvent::Error {
            message: error_message(&event.body, &raw),
        }),
        "onDebugLog" => out.push(RingEvent::DebugLog {
            message: raw.message.unwrap_or_default(),
            timestamp_ms,
        }),
        other => debug!("Ignoring native event {}", other),
    }
    out
}

/// Sender for ring events.
pub type EventSender = broadcast::Sender<RingEvent>;

/// Receiver for ring events.
pub type EventReceiver = broadcast::Receiver<RingEvent>;

/// Fans typed events out to subscribers.
#[derive(Debug, Clone)]
pub struct EventDispatcher {
    sender: EventSender,
}

impl EventDispatcher {
    /// Create a dispatcher whose subscribers may lag by up to `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> EventReceiver {
        self.sender.subscribe()
    }

    pub fn send(&self, event: RingEvent) {
        // No subscribers yet: the event is dropped.
        let _ = self.sender.send(event);
    }

    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }

    /// Call `callback` for every event until the returned handle is dropped.
    pub fn listen<F>(&self, mut callback: F) -> Subscription
    where
        F: FnMut(RingEvent) + Send + 'static,
    {
        let mut receiver = self.subscribe();
        let token = CancellationToken::new();
        let task_token = token.clone();
        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    received = receiver.recv() => match received {
                        Ok(event) => callback(event),
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("Event listener lagged, skipped {} events", skipped);
                        }
                        Err(RecvError::Closed) => break,
                    },
                }
            }
        });
        Subscription { token, handle }
    }

    /// Normalize everything arriving on `native` and publish it.
    ///
    /// Runs until `token` is cancelled or the native channel closes.
    pub fn forward(
        &self,
        mut native: broadcast::Receiver<NativeEvent>,
        token: CancellationToken,
    ) -> JoinHandle<()> {
        let dispatcher = self.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Event pump cancelled, stopping");
                        break;
                    }
                    received = native.recv() => match received {
                        Ok(event) => {
                            for typed in normalize(event, now_ms()) {
                                dispatcher.send(typed);
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!("Native event stream lagged, skipped {} events", skipped);
                        }
                        Err(RecvError::Closed) => {
                            debug!("Native event stream closed");
                            break;
                        }
                    },
                }
            }
        })
    }
}

impl Default for EventDispatcher {
    fn default() -> Self {
        Self::new(100)
    }
}

/// Handle returned by [`EventDispatcher::listen`].
///
/// Delivery stops on [`unsubscribe`](Self::unsubscribe) or drop.
#[derive(Debug)]
pub struct Subscription {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl Subscription {
    pub fn unsubscribe(self) {
        self.token.cancel();
    }

    pub fn is_active(&self) -> bool {
        !self.token.is_cancelled() && !self.handle.is_finished()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use super::*;
    use serde_json::json;

    const NOW: i64 = 1_700_000_000_000;

    #[test]
    fn test_realtime_heart_rate() {
        let events = normalize(
            NativeEvent::new("onRealTimeData", json!({"heartRate": 72, "timestamp": 1234})),
            NOW,
        );
        assert_eq!(
            events,
            vec![RingEvent::HeartRate {
                bpm: 72,
                timestamp_ms: 1234,
                source: HeartRateSource::RealTime,
            }]
        );
    }

    #[test]
    fn test_zero_heart_rate_is_dropped() {
        let events = normalize(
            NativeEvent::new("onRealTimeData", json!({"heartRate": 0, "steps": 10})),
            NOW,
        );
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], RingEvent::Steps { steps: 10, .. }));
    }

    #[test]
    fn test_measurement_heart_rate_fallbacks() {
        let events = normalize(
            NativeEvent::new("onMeasurementResult", json!({"singleHR": "66"})),
            NOW,
        );
        assert_eq!(
            events,
            vec![RingEvent::HeartRate {
                bpm: 66,
                timestamp_ms: NOW,
                source: HeartRateSource::Measurement,
            }]
        );

        let events = normalize(
            NativeEvent::new("onMeasurementResult", json!({"hr": 80, "spo2": 97, "battery": 120})),
            NOW,
        );
        assert_eq!(events.len(), 3);
        assert!(events.contains(&RingEvent::Battery { level: 100 }));
        assert!(events.contains(&RingEvent::SpO2 {
            value: 97.0,
            timestamp_ms: NOW
        }));
    }

    #[test]
    fn test_state_and_discovery_events() {
        let events = normalize(
            NativeEvent::new("onConnectionStateChanged", json!({"state": "connected"})),
            NOW,
        );
        assert_eq!(
            events,
            vec![RingEvent::ConnectionStateChanged {
                state: ConnectionState::Connected
            }]
        );

        let events = normalize(
            NativeEvent::new("onBluetoothStateChanged", json!({"state": "poweredOff"})),
            NOW,
        );
        assert_eq!(
            events,
            vec![RingEvent::BluetoothStateChanged {
                state: BluetoothState::PoweredOff
            }]
        );

        let events = normalize(
            NativeEvent::new("onDeviceFound", json!({"id": "ring-1", "rssi": -70})),
            NOW,
        );
        assert!(matches!(
            &events[0],
            RingEvent::DeviceDiscovered { device } if device.id == "ring-1"
        ));
        assert!(normalize(NativeEvent::new("onDeviceFound", json!({})), NOW).is_empty());
    }

    #[test]
    fn test_error_and_debug_events() {
        let events = normalize(NativeEvent::new("onError", json!("link lost")), NOW);
        assert_eq!(
            events,
            vec![RingEvent::Error {
                message: "link lost".into()
            }]
        );
        let events = normalize(
            NativeEvent::new("onDebugLog", json!({"message": "scan", "timestamp": 5})),
            NOW,
        );
        assert_eq!(
            events,
            vec![RingEvent::DebugLog {
                message: "scan".into(),
                timestamp_ms: 5
            }]
        );
        assert!(normalize(NativeEvent::new("onFindPhone", json!({})), NOW).is_empty());
    }

    #[test]
    fn test_event_serialization() {
        let event = RingEvent::SpO2 {
            value: 98.0,
            timestamp_ms: 1,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "spo2");
    }

    #[test]
    fn test_unknown_native_event_is_dropped() {
        let events = normalize(NativeEvent::new("onFirmwareUpgradeProgress", json!({"p": 3})), NOW);
        assert!(events.is_empty());
    }

    #[tokio::test]
    async fn test_send_without_subscribers_is_dropped() {
        let dispatcher = EventDispatcher::new(4);
        dispatcher.send(RingEvent::Battery { level: 50 });

        let mut events = dispatcher.subscribe();
        dispatcher.send(RingEvent::Battery { level: 40 });
        assert_eq!(events.recv().await.unwrap(), RingEvent::Battery { level: 40 });
    }

    #[tokio::test]
    async fn test_listen_and_unsubscribe() {
        let dispatcher = EventDispatcher::new(16);
        let log = Arc::new(Mutex::new(Vec::new()));
        let sink = log.clone();
        let subscription = dispatcher.listen(move |event| sink.lock().unwrap().push(event));
        assert_eq!(dispatcher.receiver_count(), 1);

        dispatcher.send(RingEvent::Battery { level: 50 });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(log.lock().unwrap().len(), 1);

        subscription.unsubscribe();
        tokio::time::sleep(Duration::from_millis(20)).await;
        dispatcher.send(RingEvent::Battery { level: 40 });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(log.lock().unwrap().len(), 1);
        assert_eq!(dispatcher.receiver_count(), 0);
    }

    #[tokio::test]
    async fn test_forward_normalizes_native_events() {
        let dispatcher = EventDispatcher::new(16);
        let (native_tx, native_rx) = broadcast::channel(16);
        let token = CancellationToken::new();
        let pump = dispatcher.forward(native_rx, token.clone());
        let mut events = dispatcher.subscribe();

        native_tx
            .send(NativeEvent::new("onRealTimeData", json!({"heartRate": 61})))
            .unwrap();
        let event = events.recv().await.unwrap();
        assert!(matches!(event, RingEvent::HeartRate { bpm: 61, .. }));

        token.cancel();
        pump.await.unwrap();
    }
}
