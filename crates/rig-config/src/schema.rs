//! Configuration schema definitions.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Top-level provider configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProviderConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider_name: Option<String>,
    #[serde(default)]
    pub devices: Vec<DeviceSpec>,
    pub simulation: SimulationDef,
}

/// One configured device: id, type, and type-specific options.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DeviceSpec {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    /// Everything else on the device entry; validated by the device at init.
    #[serde(flatten, default)]
    pub options: BTreeMap<String, serde_yaml::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SimulationDef {
    pub mode: SimulationMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tick_rate_hz: Option<f64>,
    /// Path to the physics YAML, relative to the provider config file.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub physics_config: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ambient_temp_c: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ambient_signal_path: Option<String>,
}

/// Simulation mode, fixed at startup. `sim` is accepted as an alias for
/// `physics` (the two names denote the same mode).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimulationMode {
    Inert,
    NonInteracting,
    #[serde(alias = "sim")]
    Physics,
}

impl SimulationMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Inert => "inert",
            Self::NonInteracting => "non_interacting",
            Self::Physics => "physics",
        }
    }
}

/// Physics file root: `physics: { models, signal_graph, rules }`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PhysicsFile {
    pub physics: PhysicsDef,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PhysicsDef {
    #[serde(default)]
    pub models: Vec<ModelDef>,
    #[serde(default)]
    pub signal_graph: Vec<GraphEdgeDef>,
    #[serde(default)]
    pub rules: Vec<RuleDef>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ModelDef {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub params: BTreeMap<String, serde_yaml::Value>,
}

/// One edge of the signal graph: `source -> [transform] -> target`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GraphEdgeDef {
    pub source: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transform: Option<TransformDef>,
}

/// Transform primitive, tagged by `type`. Unknown types fail at load.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TransformDef {
    FirstOrderLag {
        tau_s: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        initial_value: Option<f64>,
    },
    Noise {
        amplitude: f64,
        seed: i64,
    },
    Saturation {
        min: f64,
        max: f64,
    },
    Linear {
        scale: f64,
        #[serde(default)]
        offset: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        clamp_min: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        clamp_max: Option<f64>,
    },
    Deadband {
        threshold: f64,
    },
    RateLimiter {
        max_rate_per_sec: f64,
    },
    Delay {
        delay_sec: f64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        buffer_size: Option<usize>,
    },
    MovingAverage {
        window_size: usize,
    },
}

impl TransformDef {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::FirstOrderLag { .. } => "first_order_lag",
            Self::Noise { .. } => "noise",
            Self::Saturation { .. } => "saturation",
            Self::Linear { .. } => "linear",
            Self::Deadband { .. } => "deadband",
            Self::RateLimiter { .. } => "rate_limiter",
            Self::Delay { .. } => "delay",
            Self::MovingAverage { .. } => "moving_average",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleDef {
    pub id: String,
    /// `"<object_id>/<signal_id> <cmp> <number>"`.
    pub condition: String,
    pub actions: Vec<RuleActionDef>,
    #[serde(default = "default_on_error")]
    pub on_error: String,
}

fn default_on_error() -> String {
    "log_and_continue".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RuleActionDef {
    pub device: String,
    pub function: String,
    #[serde(default)]
    pub args: BTreeMap<String, serde_yaml::Value>,
}
