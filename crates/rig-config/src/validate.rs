//! Startup validation for provider and physics configuration.
//!
//! Everything here runs at load time; a failure aborts startup with no
//! partial initialization.

use std::collections::BTreeSet;

use regex::Regex;
use thiserror::Error;

use crate::schema::{PhysicsDef, ProviderConfig, SimulationMode, TransformDef};

pub const TICK_RATE_MIN_HZ: f64 = 0.1;
pub const TICK_RATE_MAX_HZ: f64 = 1000.0;

#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("mode={mode} requires simulation.tick_rate_hz")]
    TickRateRequired { mode: &'static str },

    #[error("mode={mode} cannot have simulation.tick_rate_hz")]
    TickRateForbidden { mode: &'static str },

    #[error("simulation.tick_rate_hz must be in range [{TICK_RATE_MIN_HZ}, {TICK_RATE_MAX_HZ}], got {value}")]
    TickRateOutOfRange { value: f64 },

    #[error("mode={mode} requires simulation.physics_config")]
    PhysicsConfigRequired { mode: &'static str },

    #[error("mode={mode} cannot have simulation.physics_config")]
    PhysicsConfigForbidden { mode: &'static str },

    #[error("device '{device}' has physics_bindings but mode={mode}")]
    PhysicsBindingsForbidden { device: String, mode: &'static str },

    #[error("duplicate device id: {id}")]
    DuplicateDevice { id: String },

    #[error("duplicate model id: {id}")]
    DuplicateModel { id: String },

    #[error("duplicate rule id: {id}")]
    DuplicateRule { id: String },

    #[error("duplicate graph edge: {src} -> {target}")]
    DuplicateEdge { src: String, target: String },

    #[error("{transform}: {what}")]
    TransformParam {
        transform: &'static str,
        what: String,
    },

    #[error("invalid rule condition '{condition}': expected '<object_id>/<signal_id> <cmp> <number>'")]
    RuleCondition { condition: String },

    #[error("rule '{rule}': unsupported on_error policy '{policy}' (only log_and_continue)")]
    RuleOnError { rule: String, policy: String },

    #[error("rule '{rule}' has no actions")]
    RuleWithoutActions { rule: String },
}

pub type ValidationResult = Result<(), ValidationError>;

/// Validate the provider configuration (mode x field matrix, bounds,
/// duplicate device ids).
pub fn validate_provider(config: &ProviderConfig) -> ValidationResult {
    let mode = config.simulation.mode;
    let mode_str = mode.as_str();

    match mode {
        SimulationMode::NonInteracting => {
            if config.simulation.tick_rate_hz.is_none() {
                return Err(ValidationError::TickRateRequired { mode: mode_str });
            }
            if config.simulation.physics_config.is_some() {
                return Err(ValidationError::PhysicsConfigForbidden { mode: mode_str });
            }
        }
        SimulationMode::Inert => {
            if config.simulation.tick_rate_hz.is_some() {
                return Err(ValidationError::TickRateForbidden { mode: mode_str });
            }
            if config.simulation.physics_config.is_some() {
                return Err(ValidationError::PhysicsConfigForbidden { mode: mode_str });
            }
        }
        SimulationMode::Physics => {
            if config.simulation.tick_rate_hz.is_none() {
                return Err(ValidationError::TickRateRequired { mode: mode_str });
            }
            if config.simulation.physics_config.is_none() {
                return Err(ValidationError::PhysicsConfigRequired { mode: mode_str });
            }
        }
    }

    if let Some(rate) = config.simulation.tick_rate_hz {
        if !(TICK_RATE_MIN_HZ..=TICK_RATE_MAX_HZ).contains(&rate) {
            return Err(ValidationError::TickRateOutOfRange { value: rate });
        }
    }

    let mut seen = BTreeSet::new();
    for device in &config.devices {
        if !seen.insert(device.id.as_str()) {
            return Err(ValidationError::DuplicateDevice {
                id: device.id.clone(),
            });
        }
        if mode != SimulationMode::Physics && device.options.contains_key("physics_bindings") {
            return Err(ValidationError::PhysicsBindingsForbidden {
                device: device.id.clone(),
                mode: mode_str,
            });
        }
    }

    Ok(())
}

/// Validate the physics configuration: duplicate ids and edges, transform
/// parameter constraints, rule grammar and policy.
pub fn validate_physics(physics: &PhysicsDef) -> ValidationResult {
    let mut model_ids = BTreeSet::new();
    for model in &physics.models {
        if !model_ids.insert(model.id.as_str()) {
            return Err(ValidationError::DuplicateModel {
                id: model.id.clone(),
            });
        }
    }

    let mut edges = BTreeSet::new();
    for edge in &physics.signal_graph {
        if !edges.insert((edge.source.as_str(), edge.target.as_str())) {
            return Err(ValidationError::DuplicateEdge {
                src: edge.source.clone(),
                target: edge.target.clone(),
            });
        }
        if let Some(transform) = &edge.transform {
            validate_transform(transform)?;
        }
    }

    let condition = condition_pattern();
    let mut rule_ids = BTreeSet::new();
    for rule in &physics.rules {
        if !rule_ids.insert(rule.id.as_str()) {
            return Err(ValidationError::DuplicateRule {
                id: rule.id.clone(),
            });
        }
        if !condition.is_match(&rule.condition) {
            return Err(ValidationError::RuleCondition {
                condition: rule.condition.clone(),
            });
        }
        if rule.on_error != "log_and_continue" {
            return Err(ValidationError::RuleOnError {
                rule: rule.id.clone(),
                policy: rule.on_error.clone(),
            });
        }
        if rule.actions.is_empty() {
            return Err(ValidationError::RuleWithoutActions {
                rule: rule.id.clone(),
            });
        }
    }

    Ok(())
}

/// Grammar for rule conditions: `IDENT "/" IDENT ws CMP ws NUMBER`.
pub fn condition_pattern() -> Regex {
    // The pattern is a compile-time constant; a bad literal is a programmer
    // error caught by the unit tests below.
    Regex::new(
        r"^\s*([A-Za-z_][A-Za-z0-9_]*)/([A-Za-z_][A-Za-z0-9_]*)\s*(<=|>=|==|!=|<|>)\s*([-+]?\d+(?:\.\d+)?(?:[eE][+-]?\d+)?)\s*$",
    )
    .expect("condition pattern is a valid regex")
}

fn validate_transform(transform: &TransformDef) -> ValidationResult {
    let err = |what: String| ValidationError::TransformParam {
        transform: transform.type_name(),
        what,
    };

    match transform {
        TransformDef::FirstOrderLag { tau_s, .. } => {
            if *tau_s <= 0.0 {
                return Err(err(format!("tau_s must be > 0.0, got {tau_s}")));
            }
        }
        TransformDef::Noise { amplitude, .. } => {
            if *amplitude <= 0.0 {
                return Err(err(format!("amplitude must be > 0.0, got {amplitude}")));
            }
        }
        TransformDef::Saturation { min, max } => {
            if min > max {
                return Err(err(format!("min must be <= max, got [{min}, {max}]")));
            }
        }
        TransformDef::Linear {
            clamp_min,
            clamp_max,
            ..
        } => {
            if let (Some(lo), Some(hi)) = (clamp_min, clamp_max) {
                if lo > hi {
                    return Err(err(format!(
                        "clamp_min must be <= clamp_max, got [{lo}, {hi}]"
                    )));
                }
            }
        }
        TransformDef::Deadband { threshold } => {
            if *threshold < 0.0 {
                return Err(err(format!("threshold must be >= 0.0, got {threshold}")));
            }
        }
        TransformDef::RateLimiter { max_rate_per_sec } => {
            if *max_rate_per_sec <= 0.0 {
                return Err(err(format!(
                    "max_rate_per_sec must be > 0.0, got {max_rate_per_sec}"
                )));
            }
        }
        TransformDef::Delay {
            delay_sec,
            buffer_size,
        } => {
            if *delay_sec < 0.0 {
                return Err(err(format!("delay_sec must be >= 0.0, got {delay_sec}")));
            }
            if let Some(size) = buffer_size {
                if *size == 0 {
                    return Err(err("buffer_size must be > 0".to_string()));
                }
            }
        }
        TransformDef::MovingAverage { window_size } => {
            if *window_size == 0 {
                return Err(err("window_size must be > 0".to_string()));
            }
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn condition_grammar_accepts_all_comparators() {
        let pattern = condition_pattern();
        for cmp in ["<", ">", "<=", ">=", "==", "!="] {
            let condition = format!("chamber_thermal/temperature {cmp} 85.0");
            assert!(pattern.is_match(&condition), "rejected: {condition}");
        }
    }

    #[test]
    fn condition_grammar_accepts_numeric_shapes() {
        let pattern = condition_pattern();
        for num in ["85", "-2", "+3.5", "1e3", "2.5E-2"] {
            let condition = format!("m/t > {num}");
            assert!(pattern.is_match(&condition), "rejected: {condition}");
        }
    }

    #[test]
    fn condition_grammar_rejects_malformed() {
        let pattern = condition_pattern();
        for condition in [
            "temperature > 85.0",
            "m/t >> 1",
            "m/t > abc",
            "m/t >",
            "1m/t > 5",
        ] {
            assert!(!pattern.is_match(condition), "accepted: {condition}");
        }
    }
}
