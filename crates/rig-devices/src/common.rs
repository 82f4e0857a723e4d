//! Device trait and shared call helpers.

use std::collections::BTreeMap;

use rig_core::Value;
use rig_proto::{CapabilitySet, DeviceInfo, SignalValue, StatusCode};
use thiserror::Error;

/// Error surface of a device function call, mapped onto response status.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum CallError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    FailedPrecondition(String),
}

impl CallError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidArgument(_) => StatusCode::InvalidArgument,
            Self::NotFound(_) => StatusCode::NotFound,
            Self::FailedPrecondition(_) => StatusCode::FailedPrecondition,
        }
    }
}

pub type CallResult = Result<(), CallError>;

/// A simulated device instance.
///
/// Implementations keep their state behind an internal mutex so that the
/// request thread and the physics ticker can both touch them.
pub trait Device: Send + Sync {
    fn info(&self) -> DeviceInfo;

    fn capabilities(&self) -> CapabilitySet;

    /// Read the given signals; an empty list selects the device's default
    /// set. Unknown ids are omitted, not errors.
    fn read_signals(&self, signal_ids: &[String]) -> Vec<SignalValue>;

    fn call_function(&self, function_id: u32, args: &BTreeMap<String, Value>) -> CallResult;

    /// Advance device-local physics (non-interacting mode).
    fn update_physics(&self, dt: f64);

    /// Run one control step before actuator collection (e.g. a bang-bang
    /// loop). Default: nothing.
    fn update_control(&self) {}

    /// Signals whose authoritative value this device holds and physics reads
    /// as inputs each tick.
    fn actuator_signals(&self) -> &'static [&'static str] {
        &[]
    }
}

pub fn arg_bool(args: &BTreeMap<String, Value>, key: &str) -> Result<bool, CallError> {
    args.get(key)
        .and_then(Value::as_bool)
        .ok_or_else(|| CallError::InvalidArgument(format!("missing/invalid arg: {key} (bool)")))
}

pub fn arg_int64(args: &BTreeMap<String, Value>, key: &str) -> Result<i64, CallError> {
    args.get(key)
        .and_then(Value::as_int64)
        .ok_or_else(|| CallError::InvalidArgument(format!("missing/invalid arg: {key} (int64)")))
}

pub fn arg_double(args: &BTreeMap<String, Value>, key: &str) -> Result<f64, CallError> {
    args.get(key)
        .and_then(Value::as_double)
        .ok_or_else(|| CallError::InvalidArgument(format!("missing/invalid arg: {key} (double)")))
}

pub fn arg_string<'a>(
    args: &'a BTreeMap<String, Value>,
    key: &str,
) -> Result<&'a str, CallError> {
    args.get(key)
        .and_then(Value::as_str)
        .ok_or_else(|| CallError::InvalidArgument(format!("missing/invalid arg: {key} (string)")))
}
