//! Request and response envelopes.
//!
//! Bodies are internally tagged by a `kind` field that is flattened into the
//! envelope, so one frame reads as a single flat JSON object:
//! `{"request_id": 1, "kind": "hello", "protocol_version": "v1"}`.

use std::collections::BTreeMap;

use rig_core::Value;
use serde::{Deserialize, Serialize};

use crate::types::{
    CapabilitySet, DeviceHealth, DeviceInfo, ProviderHealth, SignalValue, Status,
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub request_id: u64,
    #[serde(flatten)]
    pub body: RequestBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequestBody {
    Hello {
        protocol_version: String,
    },
    WaitReady,
    ListDevices {
        #[serde(default)]
        include_health: bool,
    },
    DescribeDevice {
        device_id: String,
    },
    ReadSignals {
        device_id: String,
        #[serde(default)]
        signal_ids: Vec<String>,
    },
    Call {
        device_id: String,
        #[serde(default)]
        function_id: u32,
        #[serde(default)]
        function_name: String,
        #[serde(default)]
        args: BTreeMap<String, Value>,
    },
    GetHealth,
    /// Any request kind this provider does not know about.
    #[serde(other)]
    Unknown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub request_id: u64,
    pub status: Status,
    #[serde(flatten)]
    pub body: ResponseBody,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ResponseBody {
    Hello {
        protocol_version: String,
        provider_name: String,
        provider_version: String,
        metadata: BTreeMap<String, String>,
    },
    WaitReady {
        diagnostics: BTreeMap<String, String>,
    },
    ListDevices {
        devices: Vec<DeviceInfo>,
    },
    DescribeDevice {
        device: DeviceInfo,
        capabilities: CapabilitySet,
    },
    ReadSignals {
        device_id: String,
        values: Vec<SignalValue>,
    },
    Call {
        device_id: String,
    },
    GetHealth {
        provider: ProviderHealth,
        devices: Vec<DeviceHealth>,
    },
    /// Status-only response (errors, unimplemented kinds).
    Empty,
}

impl Response {
    /// Status-only response carrying the request's id.
    pub fn empty(request_id: u64, status: Status) -> Self {
        Self {
            request_id,
            status,
            body: ResponseBody::Empty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StatusCode;

    #[test]
    fn call_request_defaults() {
        let payload = br#"{"request_id":9,"kind":"call","device_id":"relay0"}"#;
        let req: Request = serde_json::from_slice(payload).unwrap();
        match req.body {
            RequestBody::Call {
                device_id,
                function_id,
                function_name,
                args,
            } => {
                assert_eq!(device_id, "relay0");
                assert_eq!(function_id, 0);
                assert!(function_name.is_empty());
                assert!(args.is_empty());
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }

    #[test]
    fn empty_response_serializes_flat() {
        let resp = Response::empty(2, Status::new(StatusCode::Unimplemented, "nope"));
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["kind"], "empty");
        assert_eq!(value["status"]["code"], "UNIMPLEMENTED");
    }

    #[test]
    fn read_signals_with_ids() {
        let payload =
            br#"{"request_id":4,"kind":"read_signals","device_id":"tc1","signal_ids":["tc1_temp"]}"#;
        let req: Request = serde_json::from_slice(payload).unwrap();
        match req.body {
            RequestBody::ReadSignals {
                device_id,
                signal_ids,
            } => {
                assert_eq!(device_id, "tc1");
                assert_eq!(signal_ids, vec!["tc1_temp".to_string()]);
            }
            other => panic!("unexpected body: {other:?}"),
        }
    }
}
