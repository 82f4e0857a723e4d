//! Provider runtime: process context, request dispatch, handlers.
//!
//! Split out of the binary so integration tests can drive the dispatcher
//! over in-memory streams.

pub mod context;
pub mod dispatch;
pub mod handlers;

pub use context::{startup, ProcessContext, StartupError};

pub const PROVIDER_NAME: &str = "simrig-provider";
pub const PROVIDER_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const PROTOCOL_VERSION: &str = "v1";
