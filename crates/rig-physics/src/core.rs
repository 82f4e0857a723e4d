//! One tick of signal-graph evaluation and model updates.
//!
//! `PhysicsCore` owns the models and per-edge transform state. It reads the
//! outside world only through the caller-supplied reader and returns the
//! writes it computed; the caller commits them to the signal registry after
//! releasing the physics lock.

use std::collections::BTreeMap;

use rig_config::{GraphEdgeDef, PhysicsDef};
use rig_core::split_path;

use crate::model::{create_model, PhysicsModel};
use crate::transform::TransformState;
use crate::PhysicsResult;

/// Reader for signal paths outside the physics core (devices, constants).
pub type SignalReader<'a> = dyn Fn(&str) -> Option<f64> + 'a;

struct EdgeRuntime {
    source: String,
    target: String,
    transform: Option<TransformState>,
}

/// Writes computed by one physics step, to be committed by the caller.
#[derive(Debug, Default, PartialEq)]
pub struct StepOutput {
    /// Full signal paths (device targets and model outputs) to their values.
    pub writes: BTreeMap<String, f64>,
}

pub struct PhysicsCore {
    edges: Vec<EdgeRuntime>,
    models: BTreeMap<String, Box<dyn PhysicsModel>>,
    model_outputs: BTreeMap<String, BTreeMap<String, f64>>,
}

impl PhysicsCore {
    /// Build models and transform state from a validated physics config.
    pub fn new(def: &PhysicsDef) -> PhysicsResult<Self> {
        let mut models = BTreeMap::new();
        let mut model_outputs = BTreeMap::new();
        for spec in &def.models {
            let model = create_model(&spec.id, &spec.kind, &spec.params)?;
            model_outputs.insert(spec.id.clone(), BTreeMap::new());
            models.insert(spec.id.clone(), model);
        }

        let edges = def
            .signal_graph
            .iter()
            .map(|edge| EdgeRuntime {
                source: edge.source.clone(),
                target: edge.target.clone(),
                transform: edge.transform.as_ref().map(TransformState::from_def),
            })
            .collect();

        Ok(Self {
            edges,
            models,
            model_outputs,
        })
    }

    /// Whether an object id names a model (vs. a device).
    pub fn is_model(&self, object_id: &str) -> bool {
        self.models.contains_key(object_id)
    }

    /// Device-owned edge targets, deduplicated, in declared order.
    pub fn device_target_paths(&self) -> Vec<String> {
        let mut seen = std::collections::BTreeSet::new();
        let mut out = Vec::new();
        for edge in &self.edges {
            let Some(parts) = split_path(&edge.target) else {
                continue;
            };
            if self.models.contains_key(parts.object_id) {
                continue;
            }
            if seen.insert(edge.target.clone()) {
                out.push(edge.target.clone());
            }
        }
        out
    }

    /// Latest output of a model signal, if any.
    pub fn model_output(&self, model_id: &str, signal_id: &str) -> Option<f64> {
        self.model_outputs.get(model_id)?.get(signal_id).copied()
    }

    /// Advance one tick.
    ///
    /// `inputs` carries this tick's actuator snapshot plus any constant
    /// simulation inputs; `reader` resolves anything else (device state via
    /// the registry). Evaluation order is the declared edge order; later
    /// edges observe earlier edges' uncommitted outputs.
    pub fn step(&mut self, dt: f64, inputs: &BTreeMap<String, f64>, reader: &SignalReader<'_>) -> StepOutput {
        let mut pending: BTreeMap<String, f64> = BTreeMap::new();
        let mut model_inputs: BTreeMap<String, f64> = BTreeMap::new();

        for edge in &mut self.edges {
            let source_value = read_source(
                &self.models,
                &self.model_outputs,
                &pending,
                inputs,
                reader,
                &edge.source,
            );
            let Some(mut value) = source_value else {
                continue;
            };

            if let Some(transform) = &mut edge.transform {
                value = transform.apply(value, dt);
            }

            let Some(parts) = split_path(&edge.target) else {
                continue;
            };
            if self.models.contains_key(parts.object_id) {
                model_inputs.insert(edge.target.clone(), value);
            } else {
                pending.insert(edge.target.clone(), value);
            }
        }

        for (model_id, model) in &mut self.models {
            let mut inputs_by_name = BTreeMap::new();
            for input_name in model.input_names() {
                let target = format!("{model_id}/{input_name}");
                if let Some(value) = model_inputs.get(&target) {
                    inputs_by_name.insert(input_name.to_string(), *value);
                }
            }
            let outputs = model.update(dt, &inputs_by_name);
            self.model_outputs.insert(model_id.clone(), outputs);
        }

        let mut writes = pending;
        for (model_id, outputs) in &self.model_outputs {
            for (signal_id, value) in outputs {
                writes.insert(format!("{model_id}/{signal_id}"), *value);
            }
        }

        StepOutput { writes }
    }

    /// Startup check: every edge endpoint must name a model, a registered
    /// device, or the configured constant-input path.
    pub fn check_bindings(
        &self,
        edges: &[GraphEdgeDef],
        device_ids: &[String],
        ambient_path: Option<&str>,
    ) -> Result<(), String> {
        let is_known = |path: &str, allow_ambient: bool| -> bool {
            if allow_ambient && Some(path) == ambient_path {
                return true;
            }
            match split_path(path) {
                Some(parts) => {
                    self.models.contains_key(parts.object_id)
                        || device_ids.iter().any(|id| id == parts.object_id)
                }
                None => false,
            }
        };

        for edge in edges {
            if !is_known(&edge.source, true) {
                return Err(format!(
                    "graph edge source '{}' references no model, device, or simulation input",
                    edge.source
                ));
            }
            if !is_known(&edge.target, false) {
                return Err(format!(
                    "graph edge target '{}' references no model or device",
                    edge.target
                ));
            }
        }
        Ok(())
    }
}

fn read_source(
    models: &BTreeMap<String, Box<dyn PhysicsModel>>,
    model_outputs: &BTreeMap<String, BTreeMap<String, f64>>,
    pending: &BTreeMap<String, f64>,
    inputs: &BTreeMap<String, f64>,
    reader: &SignalReader<'_>,
    path: &str,
) -> Option<f64> {
    if let Some(parts) = split_path(path) {
        if models.contains_key(parts.object_id) {
            if let Some(value) = model_outputs
                .get(parts.object_id)
                .and_then(|outputs| outputs.get(parts.signal_id))
            {
                return Some(*value);
            }
        }
    }
    if let Some(value) = pending.get(path) {
        return Some(*value);
    }
    if let Some(value) = inputs.get(path) {
        return Some(*value);
    }
    reader(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rig_config::parse_physics_config;

    fn core_from_yaml(yaml: &str) -> PhysicsCore {
        PhysicsCore::new(&parse_physics_config(yaml).unwrap()).unwrap()
    }

    #[test]
    fn ambient_drives_thermal_model_to_steady_state() {
        // One thermal mass heated at 100 W with constant 25 degC ambient:
        // after 100 s at 10 Hz the temperature is past one time constant and
        // eventually settles at 35 +/- 1.
        let mut core = core_from_yaml(
            r#"
physics:
  models:
    - id: chamber
      type: thermal_mass
      params:
        thermal_mass: 1000.0
        heat_transfer_coeff: 10.0
        initial_temp: 25.0
  signal_graph:
    - source: environment/ambient_temp
      target: chamber/ambient_temp
    - source: heater/power
      target: chamber/heating_power
"#,
        );

        let inputs = BTreeMap::from([
            ("environment/ambient_temp".to_string(), 25.0),
            ("heater/power".to_string(), 100.0),
        ]);
        let reader = |_: &str| None;
        let dt = 0.1;
        let mut last = StepOutput::default();
        for _ in 0..(600.0_f64 / dt) as usize {
            last = core.step(dt, &inputs, &reader);
        }
        let temp = last.writes.get("chamber/temperature").copied().unwrap();
        assert!((temp - 35.0).abs() < 1.0, "temperature {temp}");
    }

    #[test]
    fn later_edges_observe_pending_writes() {
        // First edge writes dev_b/in from dev_a/out; second edge chains from
        // dev_b/in within the same tick.
        let mut core = core_from_yaml(
            r#"
physics:
  signal_graph:
    - source: dev_a/out
      target: dev_b/in
    - source: dev_b/in
      target: dev_c/in
"#,
        );
        let inputs = BTreeMap::from([("dev_a/out".to_string(), 4.5)]);
        let out = core.step(0.1, &inputs, &|_| None);
        assert_eq!(out.writes.get("dev_b/in"), Some(&4.5));
        assert_eq!(out.writes.get("dev_c/in"), Some(&4.5));
    }

    #[test]
    fn missing_source_skips_edge() {
        let mut core = core_from_yaml(
            r#"
physics:
  signal_graph:
    - source: ghost/out
      target: dev_b/in
"#,
        );
        let out = core.step(0.1, &BTreeMap::new(), &|_| None);
        assert!(out.writes.is_empty());
    }

    #[test]
    fn transform_applies_on_edge() {
        let mut core = core_from_yaml(
            r#"
physics:
  signal_graph:
    - source: dev_a/out
      target: dev_b/in
      transform:
        type: linear
        scale: 2.0
        offset: 1.0
"#,
        );
        let inputs = BTreeMap::from([("dev_a/out".to_string(), 3.0)]);
        let out = core.step(0.1, &inputs, &|_| None);
        assert_eq!(out.writes.get("dev_b/in"), Some(&7.0));
    }

    #[test]
    fn reader_supplies_unlisted_sources() {
        let mut core = core_from_yaml(
            r#"
physics:
  signal_graph:
    - source: dev_a/out
      target: dev_b/in
"#,
        );
        let out = core.step(0.1, &BTreeMap::new(), &|path| {
            (path == "dev_a/out").then_some(9.0)
        });
        assert_eq!(out.writes.get("dev_b/in"), Some(&9.0));
    }

    #[test]
    fn device_target_paths_excludes_models() {
        let core = core_from_yaml(
            r#"
physics:
  models:
    - id: chamber
      type: thermal_mass
  signal_graph:
    - source: heater/power
      target: chamber/heating_power
    - source: chamber/temperature
      target: tc1/tc1_temp
    - source: chamber/temperature
      target: tc1/tc2_temp
"#,
        );
        assert_eq!(
            core.device_target_paths(),
            vec!["tc1/tc1_temp".to_string(), "tc1/tc2_temp".to_string()]
        );
    }

    #[test]
    fn binding_check_flags_unknown_endpoints() {
        let def = parse_physics_config(
            r#"
physics:
  models:
    - id: chamber
      type: thermal_mass
  signal_graph:
    - source: environment/ambient_temp
      target: chamber/ambient_temp
    - source: chamber/temperature
      target: tc1/tc1_temp
"#,
        )
        .unwrap();
        let core = PhysicsCore::new(&def).unwrap();

        let devices = vec!["tc1".to_string()];
        core.check_bindings(&def.signal_graph, &devices, Some("environment/ambient_temp"))
            .unwrap();

        // Without the ambient path, the environment source is unknown.
        assert!(core
            .check_bindings(&def.signal_graph, &devices, None)
            .is_err());

        // Without the device, the target is unknown.
        assert!(core
            .check_bindings(&def.signal_graph, &[], Some("environment/ambient_temp"))
            .is_err());
    }
}
