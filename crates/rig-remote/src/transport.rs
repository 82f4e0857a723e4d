//! RPC transport: one request frame out, one response frame back.
//!
//! The trait keeps the client policy testable against a scripted fake; the
//! TCP implementation reuses the repo's frame codec with per-call deadlines.

use std::io::ErrorKind;
use std::net::TcpStream;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use crate::messages::{RpcCode, RpcRequest, RpcResponse};

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("rpc {code:?}: {message}")]
    Status { code: RpcCode, message: String },

    #[error("rpc transport error: {0}")]
    Io(#[from] std::io::Error),

    #[error("rpc frame error: {0}")]
    Frame(#[from] rig_transport::FrameError),

    #[error("rpc codec error: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("server closed connection")]
    Disconnected,

    #[error("unexpected response kind for {0}")]
    UnexpectedResponse(&'static str),

    #[error("{0}")]
    Failed(String),

    #[error("provider session not registered")]
    NotRegistered,
}

impl RpcError {
    /// Transient failures worth a bounded retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Status { code, .. } => matches!(
                code,
                RpcCode::Unavailable
                    | RpcCode::DeadlineExceeded
                    | RpcCode::ResourceExhausted
                    | RpcCode::Aborted
            ),
            Self::Io(err) => matches!(
                err.kind(),
                ErrorKind::TimedOut | ErrorKind::WouldBlock | ErrorKind::ConnectionReset
            ),
            Self::Disconnected => true,
            _ => false,
        }
    }

    pub fn is_unauthenticated(&self) -> bool {
        matches!(
            self,
            Self::Status {
                code: RpcCode::Unauthenticated,
                ..
            }
        )
    }
}

/// Blocking call transport with an absolute per-call deadline.
pub trait RpcTransport: Send {
    fn call(&mut self, request: &RpcRequest, deadline: Duration) -> Result<RpcResponse, RpcError>;
}

/// Framed JSON over TCP. Reconnects lazily after a connection failure.
pub struct TcpTransport {
    address: String,
    stream: Option<TcpStream>,
}

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

impl TcpTransport {
    /// Connect to the simulation server.
    pub fn connect(address: &str) -> Result<Self, RpcError> {
        let mut transport = Self {
            address: address.to_string(),
            stream: None,
        };
        transport.ensure_connected()?;
        Ok(transport)
    }

    fn ensure_connected(&mut self) -> Result<&mut TcpStream, RpcError> {
        if self.stream.is_none() {
            debug!(address = %self.address, "connecting to simulation server");
            let addrs: Vec<_> = std::net::ToSocketAddrs::to_socket_addrs(&self.address)?.collect();
            let addr = addrs.first().ok_or_else(|| {
                RpcError::Io(std::io::Error::new(
                    ErrorKind::AddrNotAvailable,
                    format!("no address resolved for {}", self.address),
                ))
            })?;
            let stream = TcpStream::connect_timeout(addr, CONNECT_TIMEOUT)?;
            stream.set_nodelay(true)?;
            self.stream = Some(stream);
        }
        self.stream.as_mut().ok_or(RpcError::Disconnected)
    }
}

impl RpcTransport for TcpTransport {
    fn call(&mut self, request: &RpcRequest, deadline: Duration) -> Result<RpcResponse, RpcError> {
        let payload = serde_json::to_vec(request)?;

        let result = (|| -> Result<RpcResponse, RpcError> {
            let stream = self.ensure_connected()?;
            stream.set_write_timeout(Some(deadline))?;
            stream.set_read_timeout(Some(deadline))?;

            rig_transport::write_frame(stream, &payload)?;
            match rig_transport::read_frame(stream)? {
                Some(frame) => Ok(serde_json::from_slice::<RpcResponse>(&frame)?),
                None => Err(RpcError::Disconnected),
            }
        })();

        match result {
            Ok(RpcResponse::Error { code, message }) => {
                // Surface server-side status as an error; keep the stream.
                Err(RpcError::Status { code, message })
            }
            Ok(response) => Ok(response),
            Err(err) => {
                // Drop the stream so the next call reconnects cleanly.
                self.stream = None;
                Err(err)
            }
        }
    }
}
