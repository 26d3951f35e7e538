//! Serialized command queue.
//!
//! The ring's native layer cannot service two requests at once. Every
//! command therefore goes through one [`CommandQueue`], whose single worker
//! task executes commands strictly in submission order and never starts a
//! command before the previous one has settled.
//!
//! For each command the worker:
//!
//! 1. races the bridge call against the operation's timeout,
//! 2. classifies native failures into [`Error`] kinds,
//! 3. for history and settings operations that failed with BUSY or timed
//!    out, asks the ring to cancel its pending data request and, if that
//!    succeeded, waits a short settle delay,
//! 4. retries BUSY failures of retryable operations after a linear backoff.
//!
//! A failing command never blocks the commands queued behind it.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep};
use tracing::{debug, warn};

use crate::bridge::NativeBridge;
use crate::classify::classify;
use crate::config::QueueConfig;
use crate::error::{Error, Result};
use crate::guard::race;
use crate::metrics::QueueMetrics;
use crate::operation::Command;

const QUEUE_CLOSED: &str = "command queue closed";
const CANCEL_LABEL: &str = "cancelPendingDataRequest";

struct Job {
    command: Command,
    reply: oneshot::Sender<Result<Value>>,
}

/// FIFO queue in front of a [`NativeBridge`].
///
/// Must be created inside a Tokio runtime; the worker is spawned on it.
pub struct CommandQueue {
    sender: mpsc::Sender<Job>,
    config: QueueConfig,
    metrics: Arc<QueueMetrics>,
    worker: JoinHandle<()>,
}

impl std::fmt::Debug for CommandQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandQueue")
            .field("config", &self.config)
            .field("active", &self.is_active())
            .finish()
    }
}

impl CommandQueue {
    /// Validate `config` and start the worker.
    pub fn new(bridge: Arc<dyn NativeBridge>, config: QueueConfig) -> Result<Self> {
        config.validate()?;
        let (sender, receiver) = mpsc::channel(config.capacity);
        let metrics = Arc::new(QueueMetrics::new());
        let worker = tokio::spawn(run_worker(
            bridge,
            receiver,
            config.clone(),
            Arc::clone(&metrics),
        ));
        Ok(Self {
            sender,
            config,
            metrics,
            worker,
        })
    }

    /// Submit a command and wait for its outcome.
    ///
    /// Waits for room when the queue is full.
    pub async fn enqueue(&self, command: impl Into<Command>) -> Result<Value> {
        let command = command.into();
        let name = command.operation.bridge_name();
        let (reply, response) = oneshot::channel();
        self.sender
            .send(Job { command, reply })
            .await
            .map_err(|_| Error::unknown(name, QUEUE_CLOSED))?;
        response
            .await
            .map_err(|_| Error::unknown(name, QUEUE_CLOSED))?
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn metrics(&self) -> &QueueMetrics {
        &self.metrics
    }

    /// Whether the worker is still running.
    pub fn is_active(&self) -> bool {
        !self.worker.is_finished()
    }

    /// Stop accepting commands, drain what is queued and wait for the worker.
    pub async fn shutdown(self) {
        drop(self.sender);
        if let Err(e) = self.worker.await {
            warn!("Command queue worker ended abnormally: {}", e);
        }
    }
}

async fn run_worker(
    bridge: Arc<dyn NativeBridge>,
    mut receiver: mpsc::Receiver<Job>,
    config: QueueConfig,
    metrics: Arc<QueueMetrics>,
) {
    while let Some(Job { command, reply }) = receiver.recv().await {
        let result = dispatch(bridge.as_ref(), &command, &config, &metrics).await;
        if reply.send(result).is_err() {
            debug!("Caller of {} went away before the reply", command.operation);
        }
    }
    debug!("Command queue closed, worker stopping");
}

async fn dispatch(
    bridge: &dyn NativeBridge,
    command: &Command,
    config: &QueueConfig,
    metrics: &QueueMetrics,
) -> Result<Value> {
    let operation = command.operation;
    let name = operation.bridge_name();
    let policy = command.policy(config);
    let max_retries = if policy.busy_retryable {
        config.max_busy_retries
    } else {
        0
    };
    let started = Instant::now();
    let mut attempt = 0u32;

    let result = loop {
        debug!("Dispatching {} (attempt {})", name, attempt + 1);
        let error = match race(bridge.execute(command), policy.timeout, name).await {
            Ok(Ok(value)) => break Ok(value),
            Ok(Err(native)) => classify(name, &native),
            Err(timeout) => {
                metrics.record_timeout();
                timeout
            }
        };

        if policy.cancelable_on_failure && error.is_transient() {
            cancel_pending(bridge, config, metrics).await;
        }

        if matches!(error, Error::Busy { .. }) && attempt < max_retries {
            attempt += 1;
            metrics.record_busy_retry();
            let backoff = config.busy_backoff(attempt);
            warn!(
                "{} busy, retrying in {:?} (retry {}/{})",
                name, backoff, attempt, max_retries
            );
            sleep(backoff).await;
            continue;
        }

        break Err(error);
    };

    let elapsed = started.elapsed();
    match &result {
        Ok(_) => {
            metrics.operation(operation).record_success(elapsed);
            debug!("{} completed in {:?}", name, elapsed);
        }
        Err(e) => {
            metrics.operation(operation).record_failure(elapsed);
            debug!("{} failed after {:?}: {}", name, elapsed, e);
        }
    }
    result
}

/// Ask the ring to drop its pending data request.
///
/// Bounded by the cancel timeout. Failures are logged and never surfaced.
async fn cancel_pending(bridge: &dyn NativeBridge, config: &QueueConfig, metrics: &QueueMetrics) {
    match race(
        bridge.cancel_pending_data_request(),
        config.cancel_timeout(),
        CANCEL_LABEL,
    )
    .await
    {
        Ok(Ok(())) => {
            metrics.record_cancel(true);
            sleep(config.settle_delay()).await;
        }
        Ok(Err(e)) => {
            metrics.record_cancel(false);
            warn!("{} failed: {}", CANCEL_LABEL, e);
        }
        Err(e) => {
            metrics.record_cancel(false);
            warn!("{}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::future::join_all;
    use serde_json::json;

    use super::*;
    use crate::bridge::NativeError;
    use crate::error::ErrorKind;
    use crate::mock::{MockBridge, MockCancel, MockResponse};
    use crate::operation::Operation;

    fn queue_over(bridge: &Arc<MockBridge>) -> CommandQueue {
        CommandQueue::new(bridge.clone(), QueueConfig::default()).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_commands_run_in_submission_order_without_overlap() {
        let bridge = Arc::new(MockBridge::builder().latency(Duration::from_millis(50)).build());
        let queue = queue_over(&bridge);
        let order = [
            Operation::GetBatteryLevel,
            Operation::GetSleepData,
            Operation::SyncTime,
            Operation::GetHeartRateData,
            Operation::GetStepGoal,
        ];

        let results = join_all(order.iter().map(|op| queue.enqueue(*op))).await;

        assert!(results.iter().all(|r| r.is_ok()));
        assert_eq!(bridge.calls(), order.to_vec());
        assert_eq!(bridge.max_in_flight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_busy_retryable_operation_retries_once() {
        let bridge = Arc::new(MockBridge::new());
        bridge.push_response(
            Operation::GetBatteryLevel,
            MockResponse::Fail(NativeError::busy()),
        );
        bridge.set_payload(Operation::GetBatteryLevel, json!({"battery": 70}));
        let queue = queue_over(&bridge);

        let started = Instant::now();
        let value = queue.enqueue(Operation::GetBatteryLevel).await.unwrap();

        assert_eq!(value["battery"], 70);
        assert_eq!(bridge.call_count(Operation::GetBatteryLevel), 2);
        assert_eq!(bridge.cancel_count(), 1);
        // settle 150 ms + backoff 250 ms
        assert!(started.elapsed() >= Duration::from_millis(400));
        let snapshot = queue.metrics().snapshot();
        assert_eq!(snapshot.busy_retries, 1);
        assert_eq!(snapshot.operations["getBatteryLevel"].success_count, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_second_busy_surfaces() {
        let bridge = Arc::new(MockBridge::new());
        for _ in 0..2 {
            bridge.push_response(
                Operation::GetSleepData,
                MockResponse::Fail(NativeError::busy()),
            );
        }
        let queue = queue_over(&bridge);

        let err = queue.enqueue(Operation::GetSleepData).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Busy);
        assert_eq!(err.operation(), Some("getSleepData"));
        assert_eq!(bridge.call_count(Operation::GetSleepData), 2);
        assert_eq!(bridge.cancel_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelable_but_not_retryable_busy() {
        let bridge = Arc::new(MockBridge::new());
        bridge.push_response(Operation::SyncTime, MockResponse::Fail(NativeError::busy()));
        let queue = queue_over(&bridge);

        let err = queue.enqueue(Operation::SyncTime).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Busy);
        assert_eq!(bridge.call_count(Operation::SyncTime), 1);
        assert_eq!(bridge.cancel_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_plain_busy_neither_cancels_nor_retries() {
        let bridge = Arc::new(MockBridge::new());
        bridge.push_response(
            Operation::SetUserInfo,
            MockResponse::Fail(NativeError::busy()),
        );
        let queue = queue_over(&bridge);

        let err = queue.enqueue(Operation::SetUserInfo).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Busy);
        assert_eq!(bridge.call_count(Operation::SetUserInfo), 1);
        assert_eq!(bridge.cancel_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_not_connected_is_not_retried() {
        let bridge = Arc::new(MockBridge::builder().disconnected().build());
        let queue = queue_over(&bridge);

        let err = queue.enqueue(Operation::GetHrvData).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::NotConnected);
        assert_eq!(bridge.call_count(Operation::GetHrvData), 1);
        assert_eq!(bridge.cancel_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_reply_still_times_out() {
        let bridge = Arc::new(MockBridge::new());
        bridge.push_response(
            Operation::GetSleepData,
            MockResponse::Delayed(Duration::from_secs(11), json!({"data": []})),
        );
        let queue = queue_over(&bridge);

        let started = Instant::now();
        let err = queue.enqueue(Operation::GetSleepData).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(started.elapsed() >= Duration::from_secs(10));
        assert!(started.elapsed() < Duration::from_secs(11));
        assert_eq!(bridge.cancel_count(), 1);
        assert_eq!(queue.metrics().snapshot().timeouts, 1);

        // The queue moves on to the next command.
        queue.enqueue(Operation::GetBatteryLevel).await.unwrap();
        assert_eq!(bridge.max_in_flight(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_command_timeout_applies_to_settings() {
        let bridge = Arc::new(MockBridge::new());
        bridge.push_response(Operation::SetUserInfo, MockResponse::Hang);
        let queue = queue_over(&bridge);

        let started = Instant::now();
        let err = queue.enqueue(Operation::SetUserInfo).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(started.elapsed() < Duration::from_secs(6));
        assert_eq!(bridge.cancel_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_override() {
        let bridge = Arc::new(MockBridge::new());
        bridge.push_response(Operation::Connect, MockResponse::Hang);
        let queue = queue_over(&bridge);

        let started = Instant::now();
        let err = queue
            .enqueue(Command::new(Operation::Connect).with_timeout(Duration::from_secs(20)))
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        assert!(started.elapsed() >= Duration::from_secs(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_cancel_skips_settle_delay() {
        let bridge = Arc::new(
            MockBridge::builder()
                .cancel_behavior(MockCancel::Fail)
                .response(
                    Operation::FactoryReset,
                    MockResponse::Fail(NativeError::busy()),
                )
                .build(),
        );
        let queue = queue_over(&bridge);

        let started = Instant::now();
        let err = queue.enqueue(Operation::FactoryReset).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Busy);
        assert!(started.elapsed() < Duration::from_millis(150));
        let snapshot = queue.metrics().snapshot();
        assert_eq!(snapshot.cancels_issued, 1);
        assert_eq!(snapshot.cancel_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hanging_cancel_is_bounded() {
        let bridge = Arc::new(
            MockBridge::builder()
                .cancel_behavior(MockCancel::Hang)
                .response(Operation::GetSpO2Data, MockResponse::Hang)
                .build(),
        );
        let queue = queue_over(&bridge);

        let started = Instant::now();
        let err = queue.enqueue(Operation::GetSpO2Data).await.unwrap_err();

        assert_eq!(err.kind(), ErrorKind::Timeout);
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(11_500));
        assert!(elapsed < Duration::from_millis(11_650));
        assert_eq!(queue.metrics().snapshot().cancel_failures, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_does_not_block_following_commands() {
        let bridge = Arc::new(MockBridge::new());
        bridge.push_response(
            Operation::GetMacAddress,
            MockResponse::Fail(NativeError::new("GATT error 133")),
        );
        bridge.set_payload(Operation::GetStepGoal, json!({"goal": 6000}));
        let queue = queue_over(&bridge);

        let (first, second) = tokio::join!(
            queue.enqueue(Operation::GetMacAddress),
            queue.enqueue(Operation::GetStepGoal)
        );

        let err = first.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unknown);
        assert_eq!(err.to_string(), "getMacAddress failed: GATT error 133");
        assert_eq!(second.unwrap()["goal"], 6000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_drains_and_stops() {
        let bridge = Arc::new(MockBridge::new());
        let queue = queue_over(&bridge);
        queue.enqueue(Operation::Initialize).await.unwrap();
        assert!(queue.is_active());
        queue.shutdown().await;
        assert_eq!(bridge.calls(), vec![Operation::Initialize]);
    }

    #[tokio::test]
    async fn test_rejects_invalid_config() {
        let bridge = Arc::new(MockBridge::new());
        let result = CommandQueue::new(bridge, QueueConfig::default().capacity(0));
        assert!(matches!(result, Err(Error::InvalidConfig(_))));
    }
}
