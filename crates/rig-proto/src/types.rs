//! Protocol support types: status, device descriptions, capabilities, signal
//! readings, health records.

use std::collections::BTreeMap;

use rig_core::Value;
use serde::{Deserialize, Serialize};

/// Response status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Ok,
    InvalidArgument,
    NotFound,
    FailedPrecondition,
    Unimplemented,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub code: StatusCode,
    pub message: String,
}

impl Status {
    pub fn ok() -> Self {
        Self {
            code: StatusCode::Ok,
            message: "ok".to_string(),
        }
    }

    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }
}

/// Signal reading quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Quality {
    Ok,
    Fault,
}

/// One signal reading returned by `read_signals`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalValue {
    pub signal_id: String,
    pub value: Value,
    pub quality: Quality,
}

impl SignalValue {
    pub fn new(signal_id: impl Into<String>, value: Value) -> Self {
        Self {
            signal_id: signal_id.into(),
            value,
            quality: Quality::Ok,
        }
    }
}

/// Device identity and addressing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub device_id: String,
    pub provider_name: String,
    pub type_id: String,
    pub type_version: String,
    pub label: String,
    pub address: String,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// Declared signal on a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalSpec {
    pub signal_id: String,
    pub name: String,
    pub description: String,
    pub value_type: String,
    #[serde(default)]
    pub unit: String,
    pub poll_hint_hz: f64,
    pub stale_after_ms: u64,
}

/// Declared argument on a device function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArgSpec {
    pub name: String,
    pub value_type: String,
    pub required: bool,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_double: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_double: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_int64: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_int64: Option<i64>,
}

impl ArgSpec {
    pub fn new(
        name: impl Into<String>,
        value_type: impl Into<String>,
        required: bool,
        description: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            value_type: value_type.into(),
            required,
            description: description.into(),
            unit: String::new(),
            min_double: None,
            max_double: None,
            min_int64: None,
            max_int64: None,
        }
    }
}

/// Function call policy category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyCategory {
    Config,
    Actuate,
}

/// Declared function on a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionSpec {
    pub function_id: u32,
    pub name: String,
    pub description: String,
    pub category: PolicyCategory,
    #[serde(default)]
    pub args: Vec<ArgSpec>,
}

/// Capability set: every signal and function a device exposes.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CapabilitySet {
    #[serde(default)]
    pub signals: Vec<SignalSpec>,
    #[serde(default)]
    pub functions: Vec<FunctionSpec>,
}

/// Provider-level health record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderHealth {
    pub state: String,
    pub message: String,
}

impl ProviderHealth {
    pub fn ok() -> Self {
        Self {
            state: "OK".to_string(),
            message: "ok".to_string(),
        }
    }
}

/// Per-device health record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceHealth {
    pub device_id: String,
    pub state: String,
    pub message: String,
    #[serde(default)]
    pub metrics: BTreeMap<String, String>,
}
