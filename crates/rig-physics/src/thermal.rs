//! Lumped thermal-capacity model with ambient exchange.

use std::collections::BTreeMap;

use crate::model::{param_f64, PhysicsModel};
use crate::{PhysicsError, PhysicsResult};

const DEFAULT_THERMAL_MASS: f64 = 1000.0; // J/K
const DEFAULT_HEAT_TRANSFER_COEFF: f64 = 10.0; // W/K
const DEFAULT_INITIAL_TEMP: f64 = 25.0; // degC
const DEFAULT_AMBIENT_TEMP: f64 = 25.0; // degC

/// `dT/dt = (P_heat - h * (T - T_ambient)) / C`, explicit Euler.
#[derive(Debug, Clone)]
pub struct ThermalMassModel {
    thermal_mass: f64,
    heat_transfer_coeff: f64,
    temperature: f64,
}

impl ThermalMassModel {
    pub fn from_params(
        model_id: &str,
        params: &BTreeMap<String, serde_yaml::Value>,
    ) -> PhysicsResult<Self> {
        let thermal_mass =
            param_f64(model_id, params, "thermal_mass")?.unwrap_or(DEFAULT_THERMAL_MASS);
        if thermal_mass <= 0.0 {
            return Err(PhysicsError::ModelParam {
                model: model_id.to_string(),
                what: format!("thermal_mass must be > 0.0, got {thermal_mass}"),
            });
        }

        let heat_transfer_coeff = param_f64(model_id, params, "heat_transfer_coeff")?
            .unwrap_or(DEFAULT_HEAT_TRANSFER_COEFF);
        if heat_transfer_coeff <= 0.0 {
            return Err(PhysicsError::ModelParam {
                model: model_id.to_string(),
                what: format!("heat_transfer_coeff must be > 0.0, got {heat_transfer_coeff}"),
            });
        }

        let initial_temp =
            param_f64(model_id, params, "initial_temp")?.unwrap_or(DEFAULT_INITIAL_TEMP);

        Ok(Self {
            thermal_mass,
            heat_transfer_coeff,
            temperature: initial_temp,
        })
    }

    pub fn temperature(&self) -> f64 {
        self.temperature
    }
}

impl PhysicsModel for ThermalMassModel {
    fn update(&mut self, dt: f64, inputs: &BTreeMap<String, f64>) -> BTreeMap<String, f64> {
        let heating_power = inputs.get("heating_power").copied().unwrap_or(0.0);
        let ambient_temp = inputs
            .get("ambient_temp")
            .copied()
            .unwrap_or(DEFAULT_AMBIENT_TEMP);

        let q_ambient = self.heat_transfer_coeff * (self.temperature - ambient_temp);
        let dt_dt = (heating_power - q_ambient) / self.thermal_mass;
        self.temperature += dt_dt * dt;

        let mut outputs = BTreeMap::new();
        outputs.insert("temperature".to_string(), self.temperature);
        outputs
    }

    fn input_names(&self) -> &'static [&'static str] {
        &["heating_power", "ambient_temp"]
    }

    fn output_names(&self) -> &'static [&'static str] {
        &["temperature"]
    }
}
