//! rig-proto: typed messages for the framed device-provider protocol.
//!
//! Payloads are JSON documents inside the length-prefixed frames of
//! `rig-transport`. The dispatcher treats them as opaque typed values: decode
//! one `Request`, produce one `Response`.

pub mod message;
pub mod types;

pub use message::{Request, RequestBody, Response, ResponseBody};
pub use types::{
    ArgSpec, CapabilitySet, DeviceHealth, DeviceInfo, FunctionSpec, PolicyCategory, ProviderHealth,
    Quality, SignalSpec, SignalValue, Status, StatusCode,
};

pub type ProtoResult<T> = Result<T, ProtoError>;

#[derive(thiserror::Error, Debug)]
pub enum ProtoError {
    #[error("failed to decode request: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("failed to encode response: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Decode one request payload.
pub fn decode_request(payload: &[u8]) -> ProtoResult<Request> {
    serde_json::from_slice(payload).map_err(ProtoError::Decode)
}

/// Encode one response payload.
pub fn encode_response(response: &Response) -> ProtoResult<Vec<u8>> {
    serde_json::to_vec(response).map_err(ProtoError::Encode)
}
