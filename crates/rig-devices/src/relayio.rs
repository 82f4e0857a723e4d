//! Relay/IO module: four relay channels plus two GPIO inputs.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use rig_core::{join_path, Value};
use rig_physics::SignalRegistry;
use rig_proto::{
    ArgSpec, CapabilitySet, DeviceInfo, FunctionSpec, PolicyCategory, SignalSpec, SignalValue,
};

use crate::common::{arg_bool, CallError, CallResult, Device};
use crate::manager::DeviceInitError;
use crate::PROVIDER_NAME;

pub const FN_SET_RELAY_CH1: u32 = 1;
pub const FN_SET_RELAY_CH2: u32 = 2;
pub const FN_SET_RELAY_CH3: u32 = 3;
pub const FN_SET_RELAY_CH4: u32 = 4;

pub const SIG_RELAY_STATES: [&str; 4] = [
    "relay_ch1_state",
    "relay_ch2_state",
    "relay_ch3_state",
    "relay_ch4_state",
];
pub const SIG_GPIO_INPUT_1: &str = "gpio_input_1";
pub const SIG_GPIO_INPUT_2: &str = "gpio_input_2";

#[derive(Debug, Default)]
struct State {
    relays: [bool; 4],
    gpio_input_1: bool,
    gpio_input_2: bool,
}

pub struct RelayIoDevice {
    device_id: String,
    registry: Arc<SignalRegistry>,
    state: Mutex<State>,
}

impl RelayIoDevice {
    pub fn new(
        device_id: &str,
        _options: &BTreeMap<String, serde_yaml::Value>,
        registry: Arc<SignalRegistry>,
    ) -> Result<Self, DeviceInitError> {
        Ok(Self {
            device_id: device_id.to_string(),
            registry,
            state: Mutex::new(State::default()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    fn physics_value(&self, signal_id: &str) -> Option<f64> {
        let path = join_path(&self.device_id, signal_id);
        if !self.registry.is_physics_driven(&path) {
            return None;
        }
        self.registry.read(&path)
    }
}

impl Device for RelayIoDevice {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            device_id: self.device_id.clone(),
            provider_name: PROVIDER_NAME.to_string(),
            type_id: "sim.relay_io".to_string(),
            type_version: "1.0".to_string(),
            label: "Sim Relay/IO Module (4Relay + 2GPIO)".to_string(),
            address: format!("sim://{}", self.device_id),
            tags: BTreeMap::from([
                ("family".to_string(), "sim".to_string()),
                ("kind".to_string(), "relay_io".to_string()),
            ]),
        }
    }

    fn capabilities(&self) -> CapabilitySet {
        let mut signals: Vec<SignalSpec> = SIG_RELAY_STATES
            .iter()
            .enumerate()
            .map(|(i, id)| SignalSpec {
                signal_id: id.to_string(),
                name: format!("Relay Channel {} State", i + 1),
                description: format!("Relay output channel {}", i + 1),
                value_type: "bool".to_string(),
                unit: String::new(),
                poll_hint_hz: 2.0,
                stale_after_ms: 1500,
            })
            .collect();
        for (id, n) in [(SIG_GPIO_INPUT_1, 1), (SIG_GPIO_INPUT_2, 2)] {
            signals.push(SignalSpec {
                signal_id: id.to_string(),
                name: format!("GPIO Input {n}"),
                description: format!("Digital input channel {n}"),
                value_type: "bool".to_string(),
                unit: String::new(),
                poll_hint_hz: 2.0,
                stale_after_ms: 1500,
            });
        }

        let functions = (1u32..=4)
            .map(|ch| FunctionSpec {
                function_id: ch,
                name: format!("set_relay_ch{ch}"),
                description: format!("Set relay channel {ch} state"),
                category: PolicyCategory::Actuate,
                args: vec![ArgSpec::new("enabled", "bool", true, "true=on false=off")],
            })
            .collect();

        CapabilitySet { signals, functions }
    }

    fn read_signals(&self, signal_ids: &[String]) -> Vec<SignalValue> {
        let state = self.lock();

        let default_ids: Vec<String> = SIG_RELAY_STATES
            .iter()
            .map(|s| s.to_string())
            .chain([SIG_GPIO_INPUT_1.to_string(), SIG_GPIO_INPUT_2.to_string()])
            .collect();
        let ids: &[String] = if signal_ids.is_empty() {
            &default_ids
        } else {
            signal_ids
        };

        let mut out = Vec::new();
        for id in ids {
            let local = if let Some(channel) = SIG_RELAY_STATES.iter().position(|s| s == id) {
                state.relays[channel]
            } else if id == SIG_GPIO_INPUT_1 {
                state.gpio_input_1
            } else if id == SIG_GPIO_INPUT_2 {
                state.gpio_input_2
            } else {
                continue;
            };
            let value = match self.physics_value(id) {
                Some(v) => v != 0.0,
                None => local,
            };
            out.push(SignalValue::new(id.clone(), Value::Bool(value)));
        }
        out
    }

    fn call_function(&self, function_id: u32, args: &BTreeMap<String, Value>) -> CallResult {
        let mut state = self.lock();

        match function_id {
            FN_SET_RELAY_CH1 | FN_SET_RELAY_CH2 | FN_SET_RELAY_CH3 | FN_SET_RELAY_CH4 => {
                let enabled = arg_bool(args, "enabled")?;
                state.relays[(function_id - 1) as usize] = enabled;
                Ok(())
            }
            _ => Err(CallError::NotFound(format!(
                "unknown function_id for {}",
                self.device_id
            ))),
        }
    }

    fn update_physics(&self, _dt: f64) {
        let mut state = self.lock();
        // GPIO inputs mirror relay states (ch2 inverted for variety).
        state.gpio_input_1 = state.relays[0];
        state.gpio_input_2 = !state.relays[1];
    }

    fn actuator_signals(&self) -> &'static [&'static str] {
        &[
            "relay_ch1_state",
            "relay_ch2_state",
            "relay_ch3_state",
            "relay_ch4_state",
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> RelayIoDevice {
        RelayIoDevice::new("relay0", &BTreeMap::new(), Arc::new(SignalRegistry::new())).unwrap()
    }

    #[test]
    fn set_each_channel() {
        let dev = device();
        for ch in 1u32..=4 {
            dev.call_function(
                ch,
                &BTreeMap::from([("enabled".to_string(), Value::Bool(true))]),
            )
            .unwrap();
        }
        let values = dev.read_signals(&[]);
        for id in SIG_RELAY_STATES {
            let v = values.iter().find(|s| s.signal_id == id).unwrap();
            assert_eq!(v.value, Value::Bool(true));
        }
    }

    #[test]
    fn gpio_mirrors_relays() {
        let dev = device();
        dev.call_function(
            FN_SET_RELAY_CH1,
            &BTreeMap::from([("enabled".to_string(), Value::Bool(true))]),
        )
        .unwrap();
        dev.update_physics(0.1);
        let values = dev.read_signals(&[]);
        let gpio1 = values.iter().find(|s| s.signal_id == SIG_GPIO_INPUT_1).unwrap();
        let gpio2 = values.iter().find(|s| s.signal_id == SIG_GPIO_INPUT_2).unwrap();
        assert_eq!(gpio1.value, Value::Bool(true));
        // Channel 2 is off, so its mirrored input reads inverted.
        assert_eq!(gpio2.value, Value::Bool(true));
    }

    #[test]
    fn unknown_function_not_found() {
        let dev = device();
        assert!(matches!(
            dev.call_function(99, &BTreeMap::new()),
            Err(CallError::NotFound(_))
        ));
    }
}
