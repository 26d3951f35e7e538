//! The catalogue of native commands and their queue policies.
//!
//! Every request that reaches the ring is an [`Operation`]. Each operation
//! carries an immutable [`OperationPolicy`] deciding its timeout budget,
//! whether a BUSY reply is retried, and whether a BUSY or TIMEOUT failure
//! is followed by a cancel of the pending native request.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use smartring_types::UserProfile;

use crate::config::QueueConfig;

/// Budget class of an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutClass {
    /// Short request/response commands.
    Command,
    /// Paginated history fetches.
    Data,
}

/// A native command understood by the ring bridge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Initialize,
    StartScan,
    StopScan,
    Connect,
    Disconnect,
    AutoReconnect,
    ConnectedDevices,
    SetUserInfo,
    SyncTime,
    SetStepGoal,
    FactoryReset,
    GetDeviceTime,
    GetStepGoal,
    GetBatteryLevel,
    GetFirmwareVersion,
    GetMacAddress,
    GetStepsData,
    GetSleepData,
    GetHeartRateData,
    GetHrvData,
    GetSpO2Data,
    GetTemperatureData,
    StartHeartRateMeasurement,
    StartSpO2Measurement,
    StopMeasurement,
    StartRealTimeData,
    StopRealTimeData,
}

impl Operation {
    /// Every operation, in declaration order.
    pub const ALL: [Operation; 27] = [
        Operation::Initialize,
        Operation::StartScan,
        Operation::StopScan,
        Operation::Connect,
        Operation::Disconnect,
        Operation::AutoReconnect,
        Operation::ConnectedDevices,
        Operation::SetUserInfo,
        Operation::SyncTime,
        Operation::SetStepGoal,
        Operation::FactoryReset,
        Operation::GetDeviceTime,
        Operation::GetStepGoal,
        Operation::GetBatteryLevel,
        Operation::GetFirmwareVersion,
        Operation::GetMacAddress,
        Operation::GetStepsData,
        Operation::GetSleepData,
        Operation::GetHeartRateData,
        Operation::GetHrvData,
        Operation::GetSpO2Data,
        Operation::GetTemperatureData,
        Operation::StartHeartRateMeasurement,
        Operation::StartSpO2Measurement,
        Operation::StopMeasurement,
        Operation::StartRealTimeData,
        Operation::StopRealTimeData,
    ];

    /// Method name on the native bridge.
    pub fn bridge_name(&self) -> &'static str {
        match self {
            Operation::Initialize => "initialize",
            Operation::StartScan => "startScan",
            Operation::StopScan => "stopScan",
            Operation::Connect => "connectToDevice",
            Operation::Disconnect => "disconnect",
            Operation::AutoReconnect => "autoReconnect",
            Operation::ConnectedDevices => "getConnectedDevices",
            Operation::SetUserInfo => "setUserInfo",
            Operation::SyncTime => "syncTime",
            Operation::SetStepGoal => "setStepGoal",
            Operation::FactoryReset => "factoryReset",
            Operation::GetDeviceTime => "getDeviceTime",
            Operation::GetStepGoal => "getStepGoal",
            Operation::GetBatteryLevel => "getBatteryLevel",
            Operation::GetFirmwareVersion => "getFirmwareVersion",
            Operation::GetMacAddress => "getMacAddress",
            Operation::GetStepsData => "getStepsData",
            Operation::GetSleepData => "getSleepData",
            Operation::GetHeartRateData => "getHeartRateData",
            Operation::GetHrvData => "getHRVData",
            Operation::GetSpO2Data => "getSpO2Data",
            Operation::GetTemperatureData => "getTemperatureData",
            Operation::StartHeartRateMeasurement => "startHeartRateMeasurement",
            Operation::StartSpO2Measurement => "startSpO2Measurement",
            Operation::StopMeasurement => "stopMeasurement",
            Operation::StartRealTimeData => "startRealTimeData",
            Operation::StopRealTimeData => "stopRealTimeData",
        }
    }

    /// Look up an operation by its bridge method name.
    pub fn from_bridge_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.bridge_name() == name)
    }

    /// Idempotent reads that may be re-issued once after BUSY.
    pub fn is_busy_retryable(&self) -> bool {
        matches!(
            self,
            Operation::GetDeviceTime
                | Operation::GetStepGoal
                | Operation::GetBatteryLevel
                | Operation::GetFirmwareVersion
                | Operation::GetMacAddress
                | Operation::GetStepsData
                | Operation::GetSleepData
                | Operation::GetHeartRateData
                | Operation::GetHrvData
                | Operation::GetSpO2Data
                | Operation::GetTemperatureData
        )
    }

    /// Operations whose native side can be left waiting on a reply.
    ///
    /// A BUSY or TIMEOUT failure on one of these is followed by a cancel of
    /// the pending native request.
    pub fn is_cancelable_on_failure(&self) -> bool {
        self.is_busy_retryable()
            || matches!(
                self,
                Operation::SyncTime | Operation::SetStepGoal | Operation::FactoryReset
            )
    }

    /// Whether this operation fetches paginated history.
    pub fn timeout_class(&self) -> TimeoutClass {
        match self {
            Operation::GetSleepData
            | Operation::GetHeartRateData
            | Operation::GetHrvData
            | Operation::GetSpO2Data
            | Operation::GetTemperatureData => TimeoutClass::Data,
            _ => TimeoutClass::Command,
        }
    }

    /// Resolve the full policy against a queue configuration.
    pub fn policy(&self, config: &QueueConfig) -> OperationPolicy {
        let timeout = match self.timeout_class() {
            TimeoutClass::Command => config.command_timeout(),
            TimeoutClass::Data => config.data_timeout(),
        };
        OperationPolicy {
            timeout,
            busy_retryable: self.is_busy_retryable(),
            cancelable_on_failure: self.is_cancelable_on_failure(),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.bridge_name())
    }
}

/// Resolved retry and timeout policy of one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationPolicy {
    pub timeout: Duration,
    pub busy_retryable: bool,
    pub cancelable_on_failure: bool,
}

/// Arguments carried by a [`Command`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum CommandArgs {
    #[default]
    None,
    /// Peripheral to connect to.
    PeripheralId(String),
    /// Daily step goal.
    StepGoal(u32),
    /// Wearer profile.
    Profile(UserProfile),
}

/// One request for the native bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub operation: Operation,
    pub args: CommandArgs,
    /// Replaces the policy timeout for this call only.
    pub timeout_override: Option<Duration>,
}

impl Command {
    /// A command without arguments.
    pub fn new(operation: Operation) -> Self {
        Self {
            operation,
            args: CommandArgs::None,
            timeout_override: None,
        }
    }

    /// Attach arguments.
    #[must_use]
    pub fn with_args(mut self, args: CommandArgs) -> Self {
        self.args = args;
        self
    }

    /// Use a custom timeout for this call.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout_override = Some(timeout);
        self
    }

    /// Policy for this command, honouring any timeout override.
    pub fn policy(&self, config: &QueueConfig) -> OperationPolicy {
        let mut policy = self.operation.policy(config);
        if let Some(timeout) = self.timeout_override {
            policy.timeout = timeout;
        }
        policy
    }
}

impl From<Operation> for Command {
    fn from(operation: Operation) -> Self {
        Command::new(operation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bridge_names_round_trip() {
        for op in Operation::ALL {
            assert_eq!(Operation::from_bridge_name(op.bridge_name()), Some(op));
        }
        assert_eq!(Operation::from_bridge_name("cancelPendingDataRequest"), None);
    }

    #[test]
    fn test_busy_retryable_set() {
        let retryable: Vec<_> = Operation::ALL
            .into_iter()
            .filter(|op| op.is_busy_retryable())
            .collect();
        assert_eq!(retryable.len(), 11);
        assert!(!Operation::SyncTime.is_busy_retryable());
        assert!(!Operation::SetStepGoal.is_busy_retryable());
        assert!(!Operation::Connect.is_busy_retryable());
    }

    #[test]
    fn test_pending_resolver_set() {
        let cancelable: Vec<_> = Operation::ALL
            .into_iter()
            .filter(|op| op.is_cancelable_on_failure())
            .collect();
        assert_eq!(cancelable.len(), 14);
        assert!(Operation::FactoryReset.is_cancelable_on_failure());
        assert!(!Operation::StartRealTimeData.is_cancelable_on_failure());
        assert!(!Operation::SetUserInfo.is_cancelable_on_failure());
    }

    #[test]
    fn test_timeout_classes() {
        let config = QueueConfig::default();
        assert_eq!(
            Operation::GetSleepData.policy(&config).timeout,
            Duration::from_millis(10_000)
        );
        assert_eq!(
            Operation::GetStepsData.policy(&config).timeout,
            Duration::from_millis(5_000)
        );
        assert_eq!(
            Operation::GetBatteryLevel.policy(&config).timeout,
            Duration::from_millis(5_000)
        );
    }

    #[test]
    fn test_command_timeout_override() {
        let config = QueueConfig::default();
        let command = Command::new(Operation::GetSleepData).with_timeout(Duration::from_secs(30));
        let policy = command.policy(&config);
        assert_eq!(policy.timeout, Duration::from_secs(30));
        assert!(policy.busy_retryable);
    }

    #[test]
    fn test_display_uses_bridge_name() {
        assert_eq!(Operation::GetHrvData.to_string(), "getHRVData");
        assert_eq!(Operation::Connect.to_string(), "connectToDevice");
    }
}
