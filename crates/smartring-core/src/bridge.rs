//! The seam to the native ring driver.
//!
//! [`NativeBridge`] abstracts the vendor SDK: a request/response surface
//! that answers each [`Command`] with a raw JSON payload, a recovery call
//! that abandons a pending data request, and a push-event stream. Only
//! the command queue calls [`NativeBridge::execute`]; everything else goes
//! through [`crate::CommandQueue`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tokio::sync::broadcast;

use crate::operation::Command;

/// A failure as reported by the native layer, before classification.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct NativeError {
    /// Optional machine-readable code such as `BUSY`.
    #[serde(default)]
    pub code: Option<String>,
    /// Human-readable message.
    #[serde(default)]
    pub message: String,
}

impl NativeError {
    /// A failure with only a message.
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    /// A failure with a code and a message.
    pub fn with_code(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            message: message.into(),
        }
    }

    /// The firmware's "link occupied" reply.
    pub fn busy() -> Self {
        Self::with_code("BUSY", "Device is busy with another request")
    }

    /// The driver's "no link" reply.
    pub fn not_connected() -> Self {
        Self::with_code("NOT_CONNECTED", "No device connected")
    }
}

/// A push notification from the native layer.
///
/// `name` is the emitter channel (`onRealTimeData`, `onMeasurementResult`,
/// `onConnectionStateChanged`, ...); `body` is its raw payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NativeEvent {
    pub name: String,
    #[serde(default)]
    pub body: Value,
}

impl NativeEvent {
    pub fn new(name: impl Into<String>, body: Value) -> Self {
        Self {
            name: name.into(),
            body,
        }
    }
}

/// Native ring driver.
///
/// Implementations must tolerate being called from the queue's worker task
/// and must not assume that a dropped `execute` future stopped the
/// hardware exchange.
///
/// # Example
///
/// ```ignore
/// use smartring_core::{Command, NativeBridge, Operation};
///
/// async fn raw_battery<B: NativeBridge>(bridge: &B) {
///     let payload = bridge.execute(&Command::new(Operation::GetBatteryLevel)).await;
///     println!("{:?}", payload);
/// }
/// ```
#[async_trait]
pub trait NativeBridge: Send + Sync {
    /// Run one command and return its raw payload.
    async fn execute(&self, command: &Command) -> Result<Value, NativeError>;

    /// Abandon whatever data request the native side is still waiting on.
    ///
    /// Drivers without such a call keep the default no-op.
    async fn cancel_pending_data_request(&self) -> Result<(), NativeError> {
        Ok(())
    }

    /// Subscribe to the push-event stream.
    fn subscribe(&self) -> broadcast::Receiver<NativeEvent>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_error_display() {
        assert_eq!(NativeError::new("boom").to_string(), "boom");
        assert_eq!(NativeError::busy().code.as_deref(), Some("BUSY"));
        assert_eq!(
            NativeError::not_connected().message,
            "No device connected"
        );
    }

    #[test]
    fn test_native_error_deserializes_without_code() {
        let err: NativeError = serde_json::from_str(r#"{"message":"link lost"}"#).unwrap();
        assert_eq!(err.code, None);
        assert_eq!(err.message, "link lost");
    }

    #[test]
    fn test_native_event_default_body() {
        let event: NativeEvent = serde_json::from_str(r#"{"name":"onDebugLog"}"#).unwrap();
        assert_eq!(event.name, "onDebugLog");
        assert!(event.body.is_null());
    }
}
