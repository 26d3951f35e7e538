//! Mapping of raw bridge failures onto the error taxonomy.

use crate::bridge::NativeError;
use crate::error::Error;

/// Message the native layer uses when no ring is linked.
const NO_DEVICE_MESSAGE: &str = "no device connected";

/// Classify a bridge failure for `operation`.
///
/// Rules are checked in order:
/// 1. code or message contains `BUSY` → [`Error::Busy`]
/// 2. code or message contains `NOT_CONNECTED`, or the message says no
///    device is connected → [`Error::NotConnected`]
/// 3. anything else → [`Error::Unknown`] with the original message
///
/// Timeouts never pass through here; [`crate::guard::race`] produces them
/// directly.
pub fn classify(operation: &str, failure: &NativeError) -> Error {
    let code = failure.code.as_deref().unwrap_or_default();
    let message = if failure.message.trim().is_empty() {
        format!("{} failed", operation)
    } else {
        failure.message.clone()
    };

    if code.contains("BUSY") || message.contains("BUSY") {
        return Error::busy(operation, message);
    }

    if code.contains("NOT_CONNECTED")
        || message.contains("NOT_CONNECTED")
        || message.to_ascii_lowercase().contains(NO_DEVICE_MESSAGE)
    {
        return Error::not_connected(operation, message);
    }

    Error::unknown(operation, message)
}
