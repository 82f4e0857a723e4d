//! Process-wide context: configuration, registry, device fleet, and the
//! physics runtime, built once at startup and handed to every handler.

use std::path::Path;
use std::sync::Arc;

use rig_config::{ConfigError, PhysicsDef, ProviderConfig, SimulationMode};
use rig_devices::{DeviceInitError, DeviceManager};
use rig_engine::{
    AdapterError, Engine, LocalEngine, PhysicsEngine, PhysicsRuntime, RemoteEngine,
};
use rig_physics::{PhysicsCore, PhysicsError, SignalRegistry};
use rig_remote::SimServerAdapter;
use thiserror::Error;
use tracing::{info, warn};

const DEFAULT_AMBIENT_PATH: &str = "environment/ambient_temp";

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("devices: {0}")]
    Devices(#[from] DeviceInitError),

    #[error("physics: {0}")]
    Physics(#[from] PhysicsError),

    #[error("simulation server: {0}")]
    Remote(#[from] AdapterError),

    #[error("{0}")]
    Invalid(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub struct ProcessContext {
    pub config: ProviderConfig,
    pub registry: Arc<SignalRegistry>,
    pub manager: Arc<DeviceManager>,
    pub runtime: PhysicsRuntime,
}

/// Load configuration, build the fleet, choose the engine, and (for
/// non-interacting mode) start the ticker. No partial initialization: any
/// failure aborts startup.
pub fn startup(config_path: &Path, sim_server: Option<&str>) -> Result<ProcessContext, StartupError> {
    info!(path = %config_path.display(), "loading configuration");
    let config = rig_config::load_provider_config(config_path)?;
    let mode = config.simulation.mode;

    let physics: Option<PhysicsDef> = match &config.simulation.physics_config {
        Some(relative) => {
            let path = rig_config::resolve_physics_path(config_path, relative);
            info!(path = %path.display(), "loading physics configuration");
            Some(rig_config::load_physics_config(&path)?)
        }
        None => None,
    };

    let registry = Arc::new(SignalRegistry::new());
    let manager = Arc::new(DeviceManager::from_config(&config, registry.clone())?);
    info!(devices = manager.device_ids().len(), "initialized devices");

    // Non-physics reads delegate to current device state. Weak: the closure
    // lives inside the registry the manager's devices also point at.
    {
        let weak = Arc::downgrade(&manager);
        registry.set_device_reader(Arc::new(move |path| {
            weak.upgrade().and_then(|manager| manager.read_signal_numeric(path))
        }));
    }

    if mode != SimulationMode::Physics && sim_server.is_some() {
        warn!("--sim-server ignored for mode={}", mode.as_str());
    }

    let provider_id = config
        .provider_name
        .clone()
        .unwrap_or_else(|| crate::PROVIDER_NAME.to_string());
    let device_ids = manager.device_ids();

    let ambient = match mode {
        SimulationMode::Physics => config.simulation.ambient_temp_c.map(|value| {
            let path = config
                .simulation
                .ambient_signal_path
                .clone()
                .unwrap_or_else(|| DEFAULT_AMBIENT_PATH.to_string());
            info!(%path, value, "configured ambient input");
            (path, value)
        }),
        _ => None,
    };

    let mut rules = Vec::new();
    let engine = match mode {
        SimulationMode::Inert => {
            info!("mode=inert (no simulation)");
            Engine::Null
        }

        SimulationMode::NonInteracting => {
            info!("mode=non_interacting (device-local physics)");
            Engine::Local(LocalEngine::new(manager.clone()))
        }

        SimulationMode::Physics => {
            let def = physics.ok_or_else(|| {
                // Unreachable after validation; keep the invariant explicit.
                StartupError::Invalid("mode=physics requires a physics config".to_string())
            })?;
            let tick_rate_hz = config.simulation.tick_rate_hz.unwrap_or(10.0);

            match sim_server {
                Some(address) => {
                    // Rules run on the local physics path only; configs that
                    // carry them must not be silently ignored here.
                    if !def.rules.is_empty() {
                        return Err(StartupError::Invalid(
                            "physics rules are not supported with an external simulation server"
                                .to_string(),
                        ));
                    }
                    info!(address, "mode=physics (external simulation)");
                    let adapter = SimServerAdapter::connect(address)?;
                    let mut remote =
                        RemoteEngine::new(Box::new(adapter), &provider_id, tick_rate_hz);
                    let relative = config.simulation.physics_config.as_deref().unwrap_or("");
                    let path = rig_config::resolve_physics_path(config_path, relative);
                    let content = std::fs::read_to_string(&path)?;
                    remote.initialize(&content)?;
                    Engine::Remote(remote)
                }
                None => {
                    info!("mode=physics (local graph physics)");
                    let core = PhysicsCore::new(&def)?;
                    core.check_bindings(
                        &def.signal_graph,
                        &device_ids,
                        ambient.as_ref().map(|(path, _)| path.as_str()),
                    )
                    .map_err(StartupError::Invalid)?;
                    rules = def.rules.clone();
                    Engine::Physics(PhysicsEngine::new(core, registry.clone(), tick_rate_hz))
                }
            }
        }
    };

    let mut engine = engine;
    engine.register_devices(&device_ids)?;

    // Pre-claim graph targets owned by our devices so actuator collection
    // skips them from the first tick.
    for path in engine.list_signals() {
        if let Some(parts) = rig_core::split_path(&path) {
            if device_ids.iter().any(|id| id == parts.object_id) {
                registry.mark_physics_driven(&path);
            }
        }
    }

    let runtime = PhysicsRuntime::new(
        mode,
        config.simulation.tick_rate_hz,
        engine,
        rules,
        ambient,
        registry.clone(),
        manager.clone(),
    );

    // Physics mode defers the ticker to the client's readiness barrier
    // (wait_ready); non-interacting starts immediately.
    match mode {
        SimulationMode::NonInteracting => {
            info!("mode=non_interacting: auto-starting physics ticker");
            runtime.start_physics();
        }
        _ => info!(
            "mode={}: deferring physics ticker until wait_ready",
            mode.as_str()
        ),
    }

    Ok(ProcessContext {
        config,
        registry,
        manager,
        runtime,
    })
}
