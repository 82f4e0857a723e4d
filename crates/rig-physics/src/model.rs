//! Physics model interface and factory.

use std::collections::BTreeMap;

use crate::{PhysicsError, PhysicsResult, ThermalMassModel};

/// A lumped physical model driven by the signal graph.
///
/// Models declare their input and output signal names; the graph routes edge
/// values onto inputs by name, and outputs are published as
/// `"<model_id>/<output_name>"` paths after each update.
pub trait PhysicsModel: Send {
    /// Advance the model by `dt` seconds. Missing inputs take model-specific
    /// defaults.
    fn update(&mut self, dt: f64, inputs: &BTreeMap<String, f64>) -> BTreeMap<String, f64>;

    fn input_names(&self) -> &'static [&'static str];

    fn output_names(&self) -> &'static [&'static str];
}

/// Create a model of the given type from its config parameters.
///
/// The set of model types is a fixed, compile-time enumeration.
pub fn create_model(
    model_id: &str,
    kind: &str,
    params: &BTreeMap<String, serde_yaml::Value>,
) -> PhysicsResult<Box<dyn PhysicsModel>> {
    match kind {
        "thermal_mass" => Ok(Box::new(ThermalMassModel::from_params(model_id, params)?)),
        _ => Err(PhysicsError::UnknownModelType {
            kind: kind.to_string(),
        }),
    }
}

/// Read an f64 parameter, if present.
pub(crate) fn param_f64(
    model_id: &str,
    params: &BTreeMap<String, serde_yaml::Value>,
    name: &str,
) -> PhysicsResult<Option<f64>> {
    match params.get(name) {
        None => Ok(None),
        Some(value) => value.as_f64().map(Some).ok_or_else(|| PhysicsError::ModelParam {
            model: model_id.to_string(),
            what: format!("{name} must be numeric"),
        }),
    }
}
