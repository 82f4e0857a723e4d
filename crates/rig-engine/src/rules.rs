//! Rule engine: threshold conditions on signal paths that trigger device
//! function calls.
//!
//! Runs from the ticker hook after each model update. Every failure is
//! logged and the next rule runs (`log_and_continue` is the only policy).

use std::collections::BTreeMap;
use std::sync::Arc;

use regex::Regex;
use rig_config::{condition_pattern, RuleActionDef, RuleDef};
use rig_core::{join_path, Value};
use rig_devices::DeviceManager;
use rig_physics::SignalRegistry;
use thiserror::Error;
use tracing::warn;

const EQ_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Error)]
enum RuleError {
    #[error("invalid condition syntax: {0}")]
    BadCondition(String),

    #[error("unknown function '{function}' on device '{device}'")]
    UnknownFunction { device: String, function: String },
}

pub struct RuleEngine {
    rules: Vec<RuleDef>,
    pattern: Regex,
    registry: Arc<SignalRegistry>,
    manager: Arc<DeviceManager>,
}

impl RuleEngine {
    pub fn new(
        rules: Vec<RuleDef>,
        registry: Arc<SignalRegistry>,
        manager: Arc<DeviceManager>,
    ) -> Self {
        Self {
            rules,
            pattern: condition_pattern(),
            registry,
            manager,
        }
    }

    /// Evaluate every rule in declared order.
    pub fn evaluate(&self) {
        for rule in &self.rules {
            if let Err(err) = self.evaluate_rule(rule) {
                warn!(rule = %rule.id, error = %err, "rule failed");
            }
        }
    }

    fn evaluate_rule(&self, rule: &RuleDef) -> Result<(), RuleError> {
        if !self.condition_met(&rule.condition)? {
            return Ok(());
        }
        for action in &rule.actions {
            self.execute_action(action)?;
        }
        Ok(())
    }

    fn condition_met(&self, condition: &str) -> Result<bool, RuleError> {
        let captures = self
            .pattern
            .captures(condition)
            .ok_or_else(|| RuleError::BadCondition(condition.to_string()))?;

        let object_id = &captures[1];
        let signal_id = &captures[2];
        let comparator = &captures[3];
        let threshold: f64 = captures[4]
            .parse()
            .map_err(|_| RuleError::BadCondition(condition.to_string()))?;

        let path = join_path(object_id, signal_id);
        // Missing value: the condition is quietly false.
        let Some(value) = self.registry.read(&path) else {
            return Ok(false);
        };

        Ok(match comparator {
            "<" => value < threshold,
            ">" => value > threshold,
            "<=" => value <= threshold,
            ">=" => value >= threshold,
            "==" => (value - threshold).abs() < EQ_TOLERANCE,
            "!=" => (value - threshold).abs() >= EQ_TOLERANCE,
            _ => return Err(RuleError::BadCondition(condition.to_string())),
        })
    }

    fn execute_action(&self, action: &RuleActionDef) -> Result<(), RuleError> {
        let function_id = self
            .manager
            .function_id(&action.device, &action.function)
            .ok_or_else(|| RuleError::UnknownFunction {
                device: action.device.clone(),
                function: action.function.clone(),
            })?;

        let args: BTreeMap<String, Value> = action
            .args
            .iter()
            .map(|(key, value)| (key.clone(), yaml_to_value(value)))
            .collect();

        if let Err(err) = self.manager.call_function(&action.device, function_id, &args) {
            // log_and_continue: a failed call does not abort the action list.
            warn!(
                device = %action.device,
                function = %action.function,
                error = %err,
                "rule action call failed"
            );
        }
        Ok(())
    }
}

/// Coerce a YAML scalar to a protocol value: bool, then int, then double,
/// then string. Non-scalar values collapse to a placeholder string.
pub fn yaml_to_value(value: &serde_yaml::Value) -> Value {
    match value {
        serde_yaml::Value::Bool(b) => Value::Bool(*b),
        serde_yaml::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Int64(i)
            } else {
                Value::Double(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        serde_yaml::Value::String(s) => Value::String(s.clone()),
        _ => Value::String("[complex]".to_string()),
    }
}
