//! Simulation engine backends.
//!
//! The engine set is closed and small, so it is a tagged variant rather than
//! a trait object. The remote backend stays open behind [`ProtocolAdapter`]:
//! the RPC client crate implements it without this crate depending on any
//! transport.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rig_core::Value;
use rig_devices::DeviceManager;
use rig_physics::{PhysicsCore, SignalRegistry};
use thiserror::Error;
use tracing::warn;

/// Command emitted by a simulation backend; the provider executes it through
/// the device manager before the next tick collects actuators.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub device_id: String,
    pub function_name: String,
    pub args: BTreeMap<String, Value>,
}

/// Unified tick output for all backends.
#[derive(Debug, Default, PartialEq)]
pub struct TickResult {
    pub success: bool,
    pub sensors: BTreeMap<String, f64>,
    pub commands: Vec<Command>,
}

impl TickResult {
    pub fn failed() -> Self {
        Self::default()
    }
}

/// Error surfaced by a remote protocol adapter.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct AdapterError(pub String);

/// Seam between the remote engine and the RPC client that talks to the
/// external simulator.
pub trait ProtocolAdapter: Send {
    fn load_config(&mut self, content: &str) -> Result<(), AdapterError>;

    fn register_provider(
        &mut self,
        provider_id: &str,
        device_ids: &[String],
    ) -> Result<(), AdapterError>;

    /// Push this tick's actuator snapshot. Returns whether a simulation tick
    /// occurred on the server.
    fn update_signals(
        &mut self,
        actuators: &BTreeMap<String, f64>,
        unit: &str,
        timeout: Duration,
    ) -> Result<bool, AdapterError>;

    /// Read sensor paths; an empty list selects every output path owned by a
    /// registered device.
    fn read_signals(&mut self, paths: &[String]) -> BTreeMap<String, f64>;

    /// Commands queued by the simulator since the last drain, in order.
    fn drain_commands(&mut self) -> Vec<Command>;

    /// Output signal paths declared by the simulator's config.
    fn list_signals(&self) -> Vec<String>;
}

/// Simulation backend, selected once at startup.
pub enum Engine {
    /// Inert: no ticker is spawned; `tick` reports failure.
    Null,
    /// Non-interacting: each device advances its own physics.
    Local(LocalEngine),
    /// Physics mode with the in-process graph core.
    Physics(PhysicsEngine),
    /// Physics mode delegated to an external simulator.
    Remote(RemoteEngine),
}

impl Engine {
    pub fn register_devices(&mut self, device_ids: &[String]) -> Result<(), AdapterError> {
        match self {
            Self::Null | Self::Local(_) | Self::Physics(_) => Ok(()),
            Self::Remote(remote) => remote.register_devices(device_ids),
        }
    }

    pub fn tick(&mut self, actuators: &BTreeMap<String, f64>) -> TickResult {
        match self {
            Self::Null => TickResult::failed(),
            Self::Local(local) => local.tick(),
            Self::Physics(physics) => physics.tick(actuators),
            Self::Remote(remote) => remote.tick(actuators),
        }
    }

    /// Output signal paths this backend will drive.
    pub fn list_signals(&self) -> Vec<String> {
        match self {
            Self::Null | Self::Local(_) => Vec::new(),
            Self::Physics(physics) => physics.list_signals(),
            Self::Remote(remote) => remote.adapter_signals(),
        }
    }
}

/// Device-local physics: dt from the monotonic clock, clamped against
/// debugger pauses.
pub struct LocalEngine {
    manager: Arc<DeviceManager>,
    last_update: Instant,
}

const MAX_LOCAL_DT_S: f64 = 0.25;

impl LocalEngine {
    pub fn new(manager: Arc<DeviceManager>) -> Self {
        Self {
            manager,
            last_update: Instant::now(),
        }
    }

    fn tick(&mut self) -> TickResult {
        let now = Instant::now();
        let dt = now.duration_since(self.last_update).as_secs_f64();
        if dt <= 0.0 {
            return TickResult::failed();
        }
        let dt = dt.min(MAX_LOCAL_DT_S);
        self.last_update = now;

        self.manager.update_all_physics(dt);
        TickResult {
            success: true,
            sensors: BTreeMap::new(),
            commands: Vec::new(),
        }
    }
}

/// In-process physics: signal graph plus models, stepped at the fixed tick
/// period.
pub struct PhysicsEngine {
    /// The physics mutex. Held while computing a step, released before the
    /// caller commits writes to the signal registry.
    core: Mutex<PhysicsCore>,
    registry: Arc<SignalRegistry>,
    dt: f64,
}

impl PhysicsEngine {
    pub fn new(core: PhysicsCore, registry: Arc<SignalRegistry>, tick_rate_hz: f64) -> Self {
        Self {
            core: Mutex::new(core),
            registry,
            dt: 1.0 / tick_rate_hz,
        }
    }

    fn lock(&self) -> MutexGuard<'_, PhysicsCore> {
        self.core.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn tick(&mut self, actuators: &BTreeMap<String, f64>) -> TickResult {
        let step = {
            let registry = self.registry.clone();
            let reader = move |path: &str| registry.read(path);
            let mut core = self.lock();
            core.step(self.dt, actuators, &reader)
            // Physics mutex released here; writes are committed by the
            // ticker without it.
        };
        TickResult {
            success: true,
            sensors: step.writes,
            commands: Vec::new(),
        }
    }

    fn list_signals(&self) -> Vec<String> {
        self.lock().device_target_paths()
    }
}

/// External simulator behind a protocol adapter.
pub struct RemoteEngine {
    adapter: Box<dyn ProtocolAdapter>,
    provider_id: String,
    tick_rate_hz: f64,
}

impl RemoteEngine {
    pub fn new(adapter: Box<dyn ProtocolAdapter>, provider_id: &str, tick_rate_hz: f64) -> Self {
        Self {
            adapter,
            provider_id: provider_id.to_string(),
            tick_rate_hz,
        }
    }

    pub fn initialize(&mut self, physics_content: &str) -> Result<(), AdapterError> {
        self.adapter.load_config(physics_content)
    }

    fn register_devices(&mut self, device_ids: &[String]) -> Result<(), AdapterError> {
        self.adapter.register_provider(&self.provider_id, device_ids)
    }

    fn tick(&mut self, actuators: &BTreeMap<String, f64>) -> TickResult {
        // Multi-provider servers run a barrier per tick; allow ~20 periods
        // for stragglers before giving up on this tick.
        let timeout = if self.tick_rate_hz > 0.0 {
            Duration::from_secs_f64(20.0 / self.tick_rate_hz)
        } else {
            Duration::from_secs(2)
        };

        match self.adapter.update_signals(actuators, "dimensionless", timeout) {
            Ok(true) => {}
            Ok(false) => {
                warn!("remote tick did not occur; maintaining schedule");
                return TickResult::failed();
            }
            Err(err) => {
                warn!(error = %err, "remote tick failed; maintaining schedule");
                return TickResult::failed();
            }
        }

        let sensors = self.adapter.read_signals(&[]);
        let commands = self.adapter.drain_commands();
        TickResult {
            success: true,
            sensors,
            commands,
        }
    }

    fn adapter_signals(&self) -> Vec<String> {
        self.adapter.list_signals()
    }
}
