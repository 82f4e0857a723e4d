//! Session-aware RPC client for the simulation server.
//!
//! Policy, per spec of the server:
//! - deadlines: 5 s for LoadConfig, 2 s default, caller-supplied for
//!   UpdateSignals (multi-provider barriers need ~20 tick periods);
//! - up to 2 attempts on retryable statuses;
//! - UNAUTHENTICATED on UpdateSignals/ReadSignals clears the session and
//!   transparently re-registers once, then retries the original call once;
//! - per-path read cache invalidated on config change, on a server tick, and
//!   on reset.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::{debug, warn};

use crate::messages::{
    RemoteCommand, RpcRequest, RpcResponse, SignalReading, SignalUpdate,
};
use crate::transport::{RpcError, RpcTransport};

const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(2);
const CONFIG_RPC_TIMEOUT: Duration = Duration::from_secs(5);
const MAX_RPC_ATTEMPTS: usize = 2;

/// 64-bit FNV-1a, hex-encoded.
pub fn fnv1a_64_hex(data: &str) -> String {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in data.bytes() {
        hash ^= u64::from(byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
    }
    format!("{hash:016x}")
}

#[derive(Debug, Clone, PartialEq)]
struct CachedSignal {
    value: f64,
    unit: String,
    physics_driven: bool,
}

pub struct SimClient {
    transport: Box<dyn RpcTransport>,
    provider_id: String,
    device_ids: Vec<String>,
    session_id: String,
    registered: bool,
    sim_time_sec: f64,
    last_tick_occurred: bool,
    pending_commands: Vec<RemoteCommand>,
    cache: BTreeMap<String, CachedSignal>,
}

impl SimClient {
    pub fn new(transport: Box<dyn RpcTransport>) -> Self {
        Self {
            transport,
            provider_id: String::new(),
            device_ids: Vec::new(),
            session_id: String::new(),
            registered: false,
            sim_time_sec: 0.0,
            last_tick_occurred: false,
            pending_commands: Vec::new(),
            cache: BTreeMap::new(),
        }
    }

    pub fn sim_time_sec(&self) -> f64 {
        self.sim_time_sec
    }

    pub fn is_registered(&self) -> bool {
        self.registered
    }

    /// Bounded retry on transient failures.
    fn call_with_retry(
        &mut self,
        request: &RpcRequest,
        deadline: Duration,
    ) -> Result<RpcResponse, RpcError> {
        let mut attempt = 0;
        loop {
            match self.transport.call(request, deadline) {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && attempt + 1 < MAX_RPC_ATTEMPTS => {
                    debug!(attempt, error = %err, "retrying rpc");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Push config content to the server. A changed config invalidates the
    /// session and all cached reads.
    pub fn load_config_content(&mut self, yaml_content: &str) -> Result<(), RpcError> {
        let hash_input = format!("yaml\n{yaml_content}");
        let request = RpcRequest::LoadConfig {
            config_content: yaml_content.to_string(),
            format: "yaml".to_string(),
            config_hash: fnv1a_64_hex(&hash_input),
        };

        match self.call_with_retry(&request, CONFIG_RPC_TIMEOUT)? {
            RpcResponse::LoadConfig {
                success,
                error_message,
                config_changed,
            } => {
                if !success {
                    return Err(RpcError::Failed(format!("LoadConfig failed: {error_message}")));
                }
                if config_changed {
                    self.registered = false;
                    self.session_id.clear();
                    self.sim_time_sec = 0.0;
                    self.last_tick_occurred = false;
                    self.pending_commands.clear();
                    self.cache.clear();
                }
                Ok(())
            }
            _ => Err(RpcError::UnexpectedResponse("LoadConfig")),
        }
    }

    pub fn register_provider(
        &mut self,
        provider_id: &str,
        device_ids: &[String],
    ) -> Result<(), RpcError> {
        let request = RpcRequest::RegisterProvider {
            provider_id: provider_id.to_string(),
            device_ids: device_ids.to_vec(),
        };

        match self.call_with_retry(&request, DEFAULT_RPC_TIMEOUT)? {
            RpcResponse::RegisterProvider {
                success,
                error_message,
                session_id,
            } => {
                if !success {
                    return Err(RpcError::Failed(format!(
                        "RegisterProvider failed: {error_message}"
                    )));
                }
                self.provider_id = provider_id.to_string();
                self.device_ids = device_ids.to_vec();
                self.session_id = session_id;
                self.registered = true;
                Ok(())
            }
            _ => Err(RpcError::UnexpectedResponse("RegisterProvider")),
        }
    }

    /// Push this tick's actuator snapshot. Returns whether a server tick
    /// occurred. Re-registers once on UNAUTHENTICATED.
    pub fn update_signals(
        &mut self,
        signals: &BTreeMap<String, f64>,
        default_unit: &str,
        timeout: Duration,
    ) -> Result<bool, RpcError> {
        if !self.registered {
            return Err(RpcError::NotRegistered);
        }

        let updates: Vec<SignalUpdate> = signals
            .iter()
            .map(|(path, value)| SignalUpdate {
                path: path.clone(),
                value: *value,
                unit: default_unit.to_string(),
            })
            .collect();
        let timeout = if timeout.is_zero() {
            DEFAULT_RPC_TIMEOUT
        } else {
            timeout
        };

        let mut retried_after_unauth = false;
        let mut attempt = 0;
        loop {
            let request = RpcRequest::UpdateSignals {
                session_id: self.session_id.clone(),
                signals: updates.clone(),
            };

            match self.transport.call(&request, timeout) {
                Ok(RpcResponse::UpdateSignals {
                    tick_occurred,
                    sim_time_sec,
                    commands,
                }) => {
                    self.last_tick_occurred = tick_occurred;
                    self.sim_time_sec = sim_time_sec;
                    self.pending_commands = commands;
                    if tick_occurred {
                        self.cache.clear();
                    }
                    return Ok(tick_occurred);
                }
                Ok(_) => return Err(RpcError::UnexpectedResponse("UpdateSignals")),
                Err(err) if err.is_unauthenticated() && !retried_after_unauth => {
                    self.registered = false;
                    self.session_id.clear();
                    retried_after_unauth = true;
                    if !self.try_reregister_session() {
                        return Err(err);
                    }
                    // Session refreshed; retry the original call once.
                }
                Err(err) if err.is_retryable() && attempt + 1 < MAX_RPC_ATTEMPTS => {
                    debug!(attempt, error = %err, "retrying UpdateSignals");
                    attempt += 1;
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Read one signal through the per-path cache.
    pub fn read_signal(&mut self, path: &str) -> Option<SignalReading> {
        if let Some(cached) = self.cache.get(path) {
            return Some(SignalReading {
                path: path.to_string(),
                value: cached.value,
                unit: cached.unit.clone(),
                physics_driven: cached.physics_driven,
            });
        }

        let request = RpcRequest::ReadSignals {
            paths: vec![path.to_string()],
        };

        let mut retried_after_unauth = false;
        let mut attempt = 0;
        let response = loop {
            match self.transport.call(&request, DEFAULT_RPC_TIMEOUT) {
                Ok(response) => break response,
                Err(err) if err.is_unauthenticated() && !retried_after_unauth && self.registered => {
                    retried_after_unauth = true;
                    if !self.try_reregister_session() {
                        return None;
                    }
                }
                Err(err) if err.is_retryable() && attempt + 1 < MAX_RPC_ATTEMPTS => {
                    attempt += 1;
                }
                Err(err) => {
                    debug!(path, error = %err, "ReadSignals failed");
                    return None;
                }
            }
        };

        let RpcResponse::ReadSignals { signals } = response else {
            return None;
        };
        if signals.len() != 1 {
            return None;
        }
        let reading = signals.into_iter().next()?;
        self.cache.insert(
            reading.path.clone(),
            CachedSignal {
                value: reading.value,
                unit: reading.unit.clone(),
                physics_driven: reading.physics_driven,
            },
        );
        Some(reading)
    }

    pub fn read_signal_value(&mut self, path: &str) -> Option<f64> {
        self.read_signal(path).map(|reading| reading.value)
    }

    /// Commands received from the last successful UpdateSignals, in order.
    pub fn drain_commands(&mut self) -> Vec<RemoteCommand> {
        std::mem::take(&mut self.pending_commands)
    }

    pub fn reset(&mut self) -> Result<(), RpcError> {
        match self.call_with_retry(&RpcRequest::Reset, DEFAULT_RPC_TIMEOUT)? {
            RpcResponse::Reset {
                success,
                error_message,
            } => {
                if !success {
                    return Err(RpcError::Failed(format!("Reset failed: {error_message}")));
                }
                self.sim_time_sec = 0.0;
                self.last_tick_occurred = false;
                self.pending_commands.clear();
                self.cache.clear();
                Ok(())
            }
            _ => Err(RpcError::UnexpectedResponse("Reset")),
        }
    }

    fn try_reregister_session(&mut self) -> bool {
        if self.provider_id.is_empty() {
            return false;
        }
        let provider_id = self.provider_id.clone();
        let device_ids = self.device_ids.clone();
        match self.register_provider(&provider_id, &device_ids) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "session re-registration failed");
                false
            }
        }
    }

    fn unregister_best_effort(&mut self) {
        if !self.registered || self.session_id.is_empty() {
            return;
        }
        let request = RpcRequest::UnregisterProvider {
            session_id: self.session_id.clone(),
        };
        let _ = self.transport.call(&request, DEFAULT_RPC_TIMEOUT);
        self.registered = false;
        self.session_id.clear();
    }
}

impl Drop for SimClient {
    fn drop(&mut self) {
        self.unregister_best_effort();
    }
}
