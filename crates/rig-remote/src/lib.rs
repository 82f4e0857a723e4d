//! rig-remote: client side of the external simulation server.
//!
//! The server owns the physics; this crate owns the session. [`SimClient`]
//! implements the retry policy, transparent re-registration, and the
//! read-through signal cache over an [`RpcTransport`]; [`SimServerAdapter`]
//! exposes it to the engine as a [`rig_engine::ProtocolAdapter`].

pub mod adapter;
pub mod client;
pub mod messages;
pub mod transport;

pub use adapter::SimServerAdapter;
pub use client::{fnv1a_64_hex, SimClient};
pub use messages::{RemoteArg, RemoteCommand, RpcCode, RpcRequest, RpcResponse, SignalReading};
pub use transport::{RpcError, RpcTransport, TcpTransport};
