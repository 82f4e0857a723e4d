//! Physics runtime lifecycle.
//!
//! Owns the engine between startup and `start_physics`, the ticker between
//! `start_physics` and `stop_physics`. Start is idempotent; stop joins the
//! thread and clears the registry's physics claims.

use std::sync::{Arc, Mutex, MutexGuard};

use rig_config::{RuleDef, SimulationMode};
use rig_devices::DeviceManager;
use rig_physics::SignalRegistry;
use tracing::{info, warn};

use crate::engine::Engine;
use crate::rules::RuleEngine;
use crate::ticker::{Ticker, TickerSetup};

struct RuntimeState {
    /// Present until the ticker consumes it.
    engine: Option<Engine>,
    ticker: Option<Ticker>,
    rules: Vec<RuleDef>,
    ambient: Option<(String, f64)>,
}

pub struct PhysicsRuntime {
    mode: SimulationMode,
    tick_rate_hz: Option<f64>,
    registry: Arc<SignalRegistry>,
    manager: Arc<DeviceManager>,
    state: Mutex<RuntimeState>,
}

impl PhysicsRuntime {
    pub fn new(
        mode: SimulationMode,
        tick_rate_hz: Option<f64>,
        engine: Engine,
        rules: Vec<RuleDef>,
        ambient: Option<(String, f64)>,
        registry: Arc<SignalRegistry>,
        manager: Arc<DeviceManager>,
    ) -> Self {
        Self {
            mode,
            tick_rate_hz,
            registry,
            manager,
            state: Mutex::new(RuntimeState {
                engine: Some(engine),
                ticker: None,
                rules,
                ambient,
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, RuntimeState> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    pub fn mode(&self) -> SimulationMode {
        self.mode
    }

    /// Spawn the ticker. No-op in inert mode, when already running, or after
    /// a stop.
    pub fn start_physics(&self) {
        if self.mode == SimulationMode::Inert {
            info!("start_physics: inert mode, no ticker");
            return;
        }
        let Some(tick_rate_hz) = self.tick_rate_hz else {
            warn!("start_physics: no tick rate configured; ticker not started");
            return;
        };

        let mut state = self.lock();
        if state.ticker.is_some() {
            info!("start_physics: already running");
            return;
        }
        let Some(engine) = state.engine.take() else {
            warn!("start_physics: engine already consumed; ticker not restarted");
            return;
        };

        let rules = if state.rules.is_empty() {
            None
        } else {
            Some(RuleEngine::new(
                state.rules.clone(),
                self.registry.clone(),
                self.manager.clone(),
            ))
        };

        let setup = TickerSetup {
            engine,
            manager: self.manager.clone(),
            registry: self.registry.clone(),
            rules,
            ambient: state.ambient.clone(),
            tick_rate_hz,
        };
        match Ticker::spawn(setup) {
            Ok(ticker) => {
                info!(tick_rate_hz, "start_physics: ticker thread started");
                state.ticker = Some(ticker);
            }
            Err(err) => warn!(error = %err, "start_physics: failed to spawn ticker"),
        }
    }

    /// Stop and join the ticker, then drop all physics claims so reads fall
    /// back to device state.
    pub fn stop_physics(&self) {
        let ticker = self.lock().ticker.take();
        if let Some(ticker) = ticker {
            info!("stop_physics: joining ticker thread");
            ticker.stop();
        }
        self.registry.clear_overrides();
    }
}

impl Drop for PhysicsRuntime {
    fn drop(&mut self) {
        self.stop_physics();
    }
}
