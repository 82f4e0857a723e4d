//! RPC message set for the simulation server.
//!
//! Requests and responses are JSON documents tagged by an `rpc` field,
//! carried in the same u32-LE frames as the provider's own protocol.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rpc", rename_all = "snake_case")]
pub enum RpcRequest {
    LoadConfig {
        config_content: String,
        format: String,
        /// FNV-1a of `"yaml\n" + content`, hex; lets the server short-circuit
        /// identical configs.
        config_hash: String,
    },
    RegisterProvider {
        provider_id: String,
        device_ids: Vec<String>,
    },
    UpdateSignals {
        session_id: String,
        signals: Vec<SignalUpdate>,
    },
    ReadSignals {
        paths: Vec<String>,
    },
    Reset,
    UnregisterProvider {
        session_id: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalUpdate {
    pub path: String,
    pub value: f64,
    pub unit: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "rpc", rename_all = "snake_case")]
pub enum RpcResponse {
    LoadConfig {
        success: bool,
        #[serde(default)]
        error_message: String,
        #[serde(default)]
        config_changed: bool,
    },
    RegisterProvider {
        success: bool,
        #[serde(default)]
        error_message: String,
        #[serde(default)]
        session_id: String,
    },
    UpdateSignals {
        tick_occurred: bool,
        sim_time_sec: f64,
        #[serde(default)]
        commands: Vec<RemoteCommand>,
    },
    ReadSignals {
        signals: Vec<SignalReading>,
    },
    Reset {
        success: bool,
        #[serde(default)]
        error_message: String,
    },
    UnregisterProvider,
    /// Server-side failure with a canonical status code.
    Error {
        code: RpcCode,
        message: String,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignalReading {
    pub path: String,
    pub value: f64,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub physics_driven: bool,
}

/// Canonical RPC status codes the server can return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RpcCode {
    Unavailable,
    DeadlineExceeded,
    ResourceExhausted,
    Aborted,
    Unauthenticated,
    InvalidArgument,
    NotFound,
    Internal,
}

/// Command queued by the simulator for the provider to execute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteCommand {
    pub device: String,
    pub function: String,
    #[serde(default)]
    pub args: std::collections::BTreeMap<String, RemoteArg>,
}

/// Tagged scalar argument on a remote command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RemoteArg {
    #[serde(rename = "double_val")]
    Double(f64),
    #[serde(rename = "int_val")]
    Int(i64),
    #[serde(rename = "bool_val")]
    Bool(bool),
    #[serde(rename = "string_val")]
    String(String),
}

impl RemoteArg {
    pub fn to_value(&self) -> rig_core::Value {
        match self {
            Self::Double(v) => rig_core::Value::Double(*v),
            Self::Int(v) => rig_core::Value::Int64(*v),
            Self::Bool(v) => rig_core::Value::Bool(*v),
            Self::String(v) => rig_core::Value::String(v.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_wire_shape() {
        let req = RpcRequest::UpdateSignals {
            session_id: "s-1".to_string(),
            signals: vec![SignalUpdate {
                path: "tc1/relay1_state".to_string(),
                value: 1.0,
                unit: "dimensionless".to_string(),
            }],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["rpc"], "update_signals");
        assert_eq!(json["signals"][0]["path"], "tc1/relay1_state");
    }

    #[test]
    fn command_args_tagged_by_type() {
        let json = r#"{
            "device": "relay0",
            "function": "set_relay_ch1",
            "args": {"enabled": {"bool_val": true}, "level": {"double_val": 0.5}}
        }"#;
        let cmd: RemoteCommand = serde_json::from_str(json).unwrap();
        assert_eq!(
            cmd.args["enabled"].to_value(),
            rig_core::Value::Bool(true)
        );
        assert_eq!(
            cmd.args["level"].to_value(),
            rig_core::Value::Double(0.5)
        );
    }

    #[test]
    fn error_response_round_trips() {
        let resp = RpcResponse::Error {
            code: RpcCode::Unauthenticated,
            message: "session expired".to_string(),
        };
        let json = serde_json::to_string(&resp).unwrap();
        let back: RpcResponse = serde_json::from_str(&json).unwrap();
        assert_eq!(resp, back);
    }
}
