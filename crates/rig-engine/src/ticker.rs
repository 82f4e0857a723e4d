//! The physics ticker thread.
//!
//! One thread per `start_physics`, joined on `stop_physics`. Each tick:
//! device control updates, actuator collection, engine tick, sensor commit,
//! command execution, rule hook. Commands from tick `k` finish before tick
//! `k+1` collects actuators.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use rig_devices::DeviceManager;
use rig_physics::SignalRegistry;
use tracing::{debug, info, warn};

use crate::engine::Engine;
use crate::rules::RuleEngine;
use crate::schedule::TickSchedule;

/// Everything the ticker thread owns while running.
pub struct TickerSetup {
    pub engine: Engine,
    pub manager: Arc<DeviceManager>,
    pub registry: Arc<SignalRegistry>,
    pub rules: Option<RuleEngine>,
    /// Constant simulation input (e.g. ambient temperature), applied to
    /// every tick's actuator snapshot.
    pub ambient: Option<(String, f64)>,
    pub tick_rate_hz: f64,
}

pub struct Ticker {
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl Ticker {
    /// Spawn the ticker thread.
    pub fn spawn(mut setup: TickerSetup) -> std::io::Result<Self> {
        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = stop.clone();

        let handle = std::thread::Builder::new()
            .name("physics-ticker".to_string())
            .spawn(move || {
                let period = Duration::from_secs_f64(1.0 / setup.tick_rate_hz);
                let thread_start = Instant::now();
                let mut schedule = TickSchedule::new(period, thread_start);
                info!(
                    tick_rate_hz = setup.tick_rate_hz,
                    period_ms = period.as_millis() as u64,
                    "ticker thread started"
                );

                while !stop_flag.load(Ordering::Relaxed) {
                    run_tick(&mut setup);

                    schedule.advance(Instant::now());
                    let deadline = schedule.next_deadline();
                    let now = Instant::now();
                    if deadline > now {
                        std::thread::sleep(deadline - now);
                    }
                }

                info!("ticker thread exiting");
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Signal the thread to stop and join it.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("ticker thread panicked before join");
            }
        }
    }
}

impl Drop for Ticker {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn run_tick(setup: &mut TickerSetup) {
    // Control loops run first so actuator collection sees their output.
    setup.manager.update_all_control();

    let mut actuators: BTreeMap<String, f64> = BTreeMap::new();
    for path in setup.manager.actuator_paths() {
        // Physics owns claimed paths; the provider must not feed them back.
        if setup.registry.is_physics_driven(&path) {
            continue;
        }
        if let Some(value) = setup.registry.read(&path) {
            actuators.insert(path, value);
        }
    }
    if let Some((path, value)) = &setup.ambient {
        actuators.insert(path.clone(), *value);
    }

    let result = setup.engine.tick(&actuators);

    if result.success {
        for (path, value) in &result.sensors {
            setup.registry.write(path, *value);
        }
        for command in &result.commands {
            setup
                .manager
                .execute_named(&command.device_id, &command.function_name, &command.args);
        }
    } else {
        // Failed ticks keep their slot; the schedule still advances.
        debug!("tick reported failure; continuing with stale data");
    }

    if let Some(rules) = &setup.rules {
        rules.evaluate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rig_config::ProviderConfig;
    use rig_physics::PhysicsCore;

    fn fleet() -> (Arc<DeviceManager>, Arc<SignalRegistry>) {
        let config: ProviderConfig = serde_yaml::from_str(
            r#"
devices:
  - id: tc1
    type: tempctl
  - id: heater
    type: relayio
simulation:
  mode: inert
"#,
        )
        .unwrap();
        let registry = Arc::new(SignalRegistry::new());
        let manager = Arc::new(DeviceManager::from_config(&config, registry.clone()).unwrap());
        {
            let weak = Arc::downgrade(&manager);
            registry.set_device_reader(Arc::new(move |path| {
                weak.upgrade().and_then(|m| m.read_signal_numeric(path))
            }));
        }
        (manager, registry)
    }

    fn physics_engine(yaml: &str, registry: Arc<SignalRegistry>) -> Engine {
        let def = rig_config::parse_physics_config(yaml).unwrap();
        let core = PhysicsCore::new(&def).unwrap();
        Engine::Physics(crate::engine::PhysicsEngine::new(core, registry, 10.0))
    }

    #[test]
    fn tick_commits_sensors_to_registry() {
        let (manager, registry) = fleet();
        let engine = physics_engine(
            r#"
physics:
  models:
    - id: chamber
      type: thermal_mass
      params:
        initial_temp: 50.0
  signal_graph:
    - source: chamber/temperature
      target: tc1/tc1_temp
"#,
            registry.clone(),
        );
        let mut setup = TickerSetup {
            engine,
            manager,
            registry: registry.clone(),
            rules: None,
            ambient: None,
            tick_rate_hz: 10.0,
        };

        run_tick(&mut setup);
        run_tick(&mut setup);

        // Model output published under its path, device target driven.
        assert!(registry.cached("chamber/temperature").is_some());
        assert!(registry.is_physics_driven("tc1/tc1_temp"));
        let t = registry.read("tc1/tc1_temp").unwrap();
        assert!((t - 50.0).abs() < 1.0, "temperature {t}");
    }

    #[test]
    fn actuator_collection_skips_physics_driven_paths() {
        let (manager, registry) = fleet();
        registry.write("tc1/relay1_state", 1.0);

        let mut collected = BTreeMap::new();
        for path in manager.actuator_paths() {
            if registry.is_physics_driven(&path) {
                continue;
            }
            if let Some(value) = registry.read(&path) {
                collected.insert(path, value);
            }
        }
        assert!(!collected.contains_key("tc1/relay1_state"));
        assert_eq!(collected.get("tc1/relay2_state"), Some(&0.0));
    }

    #[test]
    fn ambient_constant_included_in_tick_inputs() {
        let (manager, registry) = fleet();
        let engine = physics_engine(
            r#"
physics:
  models:
    - id: chamber
      type: thermal_mass
      params:
        initial_temp: 20.0
        thermal_mass: 10.0
  signal_graph:
    - source: environment/ambient_temp
      target: chamber/ambient_temp
"#,
            registry.clone(),
        );
        let mut setup = TickerSetup {
            engine,
            manager,
            registry: registry.clone(),
            rules: None,
            ambient: Some(("environment/ambient_temp".to_string(), 100.0)),
            tick_rate_hz: 10.0,
        };

        for _ in 0..100 {
            run_tick(&mut setup);
        }
        // Pulled toward the 100 degree ambient, so well above the start.
        let t = registry.cached("chamber/temperature").unwrap();
        assert!(t > 30.0, "temperature {t}");
    }

    #[test]
    fn rule_triggered_relay_visible_after_tick() {
        let (manager, registry) = fleet();
        let engine = physics_engine(
            r#"
physics:
  models:
    - id: chamber
      type: thermal_mass
      params:
        initial_temp: 90.0
"#,
            registry.clone(),
        );
        let rules: Vec<rig_config::RuleDef> = serde_yaml::from_str(
            r#"
- id: r1
  condition: "chamber/temperature > 80"
  actions:
    - device: heater
      function: set_relay_ch1
      args:
        enabled: true
"#,
        )
        .unwrap();
        let rule_engine = RuleEngine::new(rules, registry.clone(), manager.clone());
        let mut setup = TickerSetup {
            engine,
            manager: manager.clone(),
            registry,
            rules: Some(rule_engine),
            ambient: None,
            tick_rate_hz: 10.0,
        };

        run_tick(&mut setup);

        let values = manager.read_signals("heater", &["relay_ch1_state".to_string()]);
        assert_eq!(values[0].value, rig_core::Value::Bool(true));
    }

    #[test]
    fn commands_executed_before_next_collection() {
        struct CommandOnce {
            sent: bool,
        }
        impl crate::engine::ProtocolAdapter for CommandOnce {
            fn load_config(&mut self, _c: &str) -> Result<(), crate::engine::AdapterError> {
                Ok(())
            }
            fn register_provider(
                &mut self,
                _p: &str,
                _d: &[String],
            ) -> Result<(), crate::engine::AdapterError> {
                Ok(())
            }
            fn update_signals(
                &mut self,
                _a: &BTreeMap<String, f64>,
                _u: &str,
                _t: Duration,
            ) -> Result<bool, crate::engine::AdapterError> {
                Ok(true)
            }
            fn read_signals(&mut self, _p: &[String]) -> BTreeMap<String, f64> {
                BTreeMap::new()
            }
            fn drain_commands(&mut self) -> Vec<crate::engine::Command> {
                if self.sent {
                    return Vec::new();
                }
                self.sent = true;
                vec![crate::engine::Command {
                    device_id: "heater".to_string(),
                    function_name: "set_relay_ch2".to_string(),
                    args: BTreeMap::from([(
                        "enabled".to_string(),
                        rig_core::Value::Bool(true),
                    )]),
                }]
            }
            fn list_signals(&self) -> Vec<String> {
                Vec::new()
            }
        }

        let (manager, registry) = fleet();
        let engine = Engine::Remote(crate::engine::RemoteEngine::new(
            Box::new(CommandOnce { sent: false }),
            "p1",
            10.0,
        ));
        let mut setup = TickerSetup {
            engine,
            manager: manager.clone(),
            registry: registry.clone(),
            rules: None,
            ambient: None,
            tick_rate_hz: 10.0,
        };

        // Tick k executes the command...
        run_tick(&mut setup);
        // ...so tick k+1's collection sees the relay on.
        let mut collected = BTreeMap::new();
        for path in manager.actuator_paths() {
            if let Some(value) = registry.read(&path) {
                collected.insert(path, value);
            }
        }
        assert_eq!(collected.get("heater/relay_ch2_state"), Some(&1.0));
    }

    #[test]
    fn ticker_spawns_and_joins() {
        let (manager, registry) = fleet();
        let setup = TickerSetup {
            engine: Engine::Local(crate::engine::LocalEngine::new(manager.clone())),
            manager,
            registry,
            rules: None,
            ambient: None,
            tick_rate_hz: 100.0,
        };
        let ticker = Ticker::spawn(setup).unwrap();
        std::thread::sleep(Duration::from_millis(50));
        ticker.stop();
    }
}
