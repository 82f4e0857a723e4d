//! Temperature control card: two thermocouples, two heater relays.
//!
//! Open-loop mode lets clients drive the relays directly; closed-loop mode
//! runs a bang-bang controller toward the setpoint each tick.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use rig_core::{join_path, Value};
use rig_physics::SignalRegistry;
use rig_proto::{
    ArgSpec, CapabilitySet, DeviceInfo, FunctionSpec, PolicyCategory, SignalSpec, SignalValue,
};
use serde::Deserialize;

use crate::common::{arg_bool, arg_double, arg_int64, arg_string, CallError, CallResult, Device};
use crate::manager::{options_value, DeviceInitError};
use crate::PROVIDER_NAME;

pub const FN_SET_MODE: u32 = 1;
pub const FN_SET_SETPOINT: u32 = 2;
pub const FN_SET_RELAY: u32 = 3;

pub const SIG_TC1_TEMP: &str = "tc1_temp";
pub const SIG_TC2_TEMP: &str = "tc2_temp";
pub const SIG_RELAY1_STATE: &str = "relay1_state";
pub const SIG_RELAY2_STATE: &str = "relay2_state";
pub const SIG_CONTROL_MODE: &str = "control_mode";
pub const SIG_SETPOINT: &str = "setpoint";

const KNOWN_SIGNALS: &[&str] = &[
    SIG_TC1_TEMP,
    SIG_TC2_TEMP,
    SIG_RELAY1_STATE,
    SIG_RELAY2_STATE,
    SIG_CONTROL_MODE,
    SIG_SETPOINT,
];

const DEFAULT_SIGNALS: &[&str] = &[
    SIG_TC1_TEMP,
    SIG_TC2_TEMP,
    SIG_RELAY1_STATE,
    SIG_RELAY2_STATE,
];

const AMBIENT_C: f64 = 23.0;
const THERMAL_TAU_S: f64 = 6.0;
const SETPOINT_MIN_C: f64 = -50.0;
const SETPOINT_MAX_C: f64 = 400.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ControlMode {
    Open,
    Closed,
}

impl ControlMode {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Closed => "closed",
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct Options {
    #[serde(default)]
    initial_temp: Option<f64>,
    #[serde(default)]
    temp_range: Option<(f64, f64)>,
}

#[derive(Debug)]
struct State {
    tc1_c: f64,
    tc2_c: f64,
    relay1: bool,
    relay2: bool,
    mode: ControlMode,
    setpoint_c: f64,
}

impl Default for State {
    fn default() -> Self {
        Self {
            tc1_c: 25.0,
            tc2_c: 25.0,
            relay1: false,
            relay2: false,
            mode: ControlMode::Open,
            setpoint_c: 60.0,
        }
    }
}

pub struct TempCtlDevice {
    device_id: String,
    registry: Arc<SignalRegistry>,
    state: Mutex<State>,
}

impl TempCtlDevice {
    pub fn new(
        device_id: &str,
        options: &BTreeMap<String, serde_yaml::Value>,
        registry: Arc<SignalRegistry>,
    ) -> Result<Self, DeviceInitError> {
        let options: Options = serde_yaml::from_value(options_value(options)).map_err(|err| {
            DeviceInitError::InvalidOption {
                device: device_id.to_string(),
                what: err.to_string(),
            }
        })?;

        let mut state = State::default();
        if let Some(temp) = options.initial_temp {
            if let Some((min, max)) = options.temp_range {
                if temp < min || temp > max {
                    return Err(DeviceInitError::InvalidOption {
                        device: device_id.to_string(),
                        what: format!("initial_temp {temp} out of valid range [{min}, {max}]"),
                    });
                }
            }
            state.tc1_c = temp;
            state.tc2_c = temp;
        }

        Ok(Self {
            device_id: device_id.to_string(),
            registry,
            state: Mutex::new(state),
        })
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Physics-driven value for one of our signals, if the registry has
    /// claimed the path.
    fn physics_value(&self, signal_id: &str) -> Option<f64> {
        let path = join_path(&self.device_id, signal_id);
        if !self.registry.is_physics_driven(&path) {
            return None;
        }
        self.registry.read(&path)
    }
}

impl Device for TempCtlDevice {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            device_id: self.device_id.clone(),
            provider_name: PROVIDER_NAME.to_string(),
            type_id: "sim.temp_control_card".to_string(),
            type_version: "1.0".to_string(),
            label: "Sim Temp Control Card (2TC + 2Relay)".to_string(),
            address: format!("sim://{}", self.device_id),
            tags: BTreeMap::from([
                ("family".to_string(), "sim".to_string()),
                ("kind".to_string(), "temp_control".to_string()),
            ]),
        }
    }

    fn capabilities(&self) -> CapabilitySet {
        let signal = |id: &str, name: &str, desc: &str, value_type: &str, unit: &str,
                      poll_hz: f64, stale_ms: u64| SignalSpec {
            signal_id: id.to_string(),
            name: name.to_string(),
            description: desc.to_string(),
            value_type: value_type.to_string(),
            unit: unit.to_string(),
            poll_hint_hz: poll_hz,
            stale_after_ms: stale_ms,
        };

        let mut set_setpoint_value = ArgSpec::new(
            "value",
            "double",
            true,
            "Temperature setpoint",
        );
        set_setpoint_value.unit = "C".to_string();
        set_setpoint_value.min_double = Some(SETPOINT_MIN_C);
        set_setpoint_value.max_double = Some(SETPOINT_MAX_C);

        let mut relay_index = ArgSpec::new("relay_index", "int64", true, "1 or 2");
        relay_index.min_int64 = Some(1);
        relay_index.max_int64 = Some(2);

        CapabilitySet {
            signals: vec![
                signal(SIG_TC1_TEMP, "TC1 Temperature", "Thermocouple channel 1", "double", "C", 2.0, 1500),
                signal(SIG_TC2_TEMP, "TC2 Temperature", "Thermocouple channel 2", "double", "C", 2.0, 1500),
                signal(SIG_RELAY1_STATE, "Relay 1 State", "Relay output channel 1", "bool", "", 2.0, 1500),
                signal(SIG_RELAY2_STATE, "Relay 2 State", "Relay output channel 2", "bool", "", 2.0, 1500),
                signal(SIG_CONTROL_MODE, "Control Mode", "open or closed", "string", "", 0.5, 3000),
                signal(SIG_SETPOINT, "Setpoint", "Closed-loop temperature setpoint", "double", "C", 0.5, 3000),
            ],
            functions: vec![
                FunctionSpec {
                    function_id: FN_SET_MODE,
                    name: "set_mode".to_string(),
                    description: "Set control mode: open or closed".to_string(),
                    category: PolicyCategory::Config,
                    args: vec![ArgSpec::new("mode", "string", true, "open or closed")],
                },
                FunctionSpec {
                    function_id: FN_SET_SETPOINT,
                    name: "set_setpoint".to_string(),
                    description: "Set closed-loop setpoint (C)".to_string(),
                    category: PolicyCategory::Config,
                    args: vec![set_setpoint_value],
                },
                FunctionSpec {
                    function_id: FN_SET_RELAY,
                    name: "set_relay".to_string(),
                    description: "Set relay state in open-loop mode".to_string(),
                    category: PolicyCategory::Actuate,
                    args: vec![
                        relay_index,
                        ArgSpec::new("state", "bool", true, "true=on false=off"),
                    ],
                },
            ],
        }
    }

    fn read_signals(&self, signal_ids: &[String]) -> Vec<SignalValue> {
        let state = self.lock();

        let ids: Vec<&str> = if signal_ids.is_empty() {
            DEFAULT_SIGNALS.to_vec()
        } else {
            signal_ids.iter().map(String::as_str).collect()
        };

        let mut out = Vec::new();
        for id in ids {
            if !KNOWN_SIGNALS.contains(&id) {
                continue;
            }
            let value = match id {
                SIG_TC1_TEMP => Value::Double(self.physics_value(id).unwrap_or(state.tc1_c)),
                SIG_TC2_TEMP => Value::Double(self.physics_value(id).unwrap_or(state.tc2_c)),
                SIG_RELAY1_STATE => Value::Bool(state.relay1),
                SIG_RELAY2_STATE => Value::Bool(state.relay2),
                SIG_CONTROL_MODE => Value::String(state.mode.as_str().to_string()),
                SIG_SETPOINT => Value::Double(state.setpoint_c),
                _ => continue,
            };
            out.push(SignalValue::new(id, value));
        }
        out
    }

    fn call_function(&self, function_id: u32, args: &BTreeMap<String, Value>) -> CallResult {
        let mut state = self.lock();

        match function_id {
            FN_SET_MODE => {
                let mode = arg_string(args, "mode")?;
                state.mode = match mode {
                    "open" => ControlMode::Open,
                    "closed" => ControlMode::Closed,
                    _ => {
                        return Err(CallError::InvalidArgument(
                            "mode must be 'open' or 'closed'".to_string(),
                        ))
                    }
                };
                Ok(())
            }

            FN_SET_SETPOINT => {
                let setpoint = arg_double(args, "value")?;
                if !(SETPOINT_MIN_C..=SETPOINT_MAX_C).contains(&setpoint) {
                    return Err(CallError::InvalidArgument("setpoint out of range".to_string()));
                }
                state.setpoint_c = setpoint;
                Ok(())
            }

            FN_SET_RELAY => {
                if state.mode != ControlMode::Open {
                    return Err(CallError::FailedPrecondition(
                        "set_relay only allowed in open mode".to_string(),
                    ));
                }
                let index = arg_int64(args, "relay_index")?;
                if index != 1 && index != 2 {
                    return Err(CallError::InvalidArgument(
                        "relay_index must be 1 or 2".to_string(),
                    ));
                }
                let enabled = arg_bool(args, "state")?;
                if index == 1 {
                    state.relay1 = enabled;
                } else {
                    state.relay2 = enabled;
                }
                Ok(())
            }

            _ => Err(CallError::NotFound(format!(
                "unknown function_id for {}",
                self.device_id
            ))),
        }
    }

    fn update_physics(&self, dt: f64) {
        let mut state = self.lock();

        let relays_on = state.relay1 as u32 + state.relay2 as u32;
        let target = match state.mode {
            // Closed loop: effective heating is modulated toward the setpoint.
            ControlMode::Closed => state.setpoint_c,
            // Open loop: 0 relays ambient, 1 relay +45C, 2 relays +75C.
            ControlMode::Open => {
                AMBIENT_C
                    + match relays_on {
                        0 => 0.0,
                        1 => 45.0,
                        _ => 75.0,
                    }
            }
        };

        let alpha = 1.0 - (-dt / THERMAL_TAU_S).exp();
        state.tc1_c += alpha * (target - state.tc1_c);
        // Slight offset keeps the two channels distinct.
        state.tc2_c += alpha * ((target - 1.5) - state.tc2_c);
    }

    fn update_control(&self) {
        let mut state = self.lock();
        if state.mode != ControlMode::Closed {
            return;
        }

        // Bang-bang with hysteresis; the temperature comes from the registry
        // when physics drives it, otherwise from local state.
        let temp = self.physics_value(SIG_TC1_TEMP).unwrap_or(state.tc1_c);
        let error = state.setpoint_c - temp;

        if error > 10.0 {
            state.relay1 = true;
            state.relay2 = true;
        } else if error > 2.0 {
            state.relay1 = true;
            state.relay2 = false;
        } else if error < -2.0 {
            state.relay1 = false;
            state.relay2 = false;
        }
        // Inside the dead band both relays hold their previous state.
    }

    fn actuator_signals(&self) -> &'static [&'static str] {
        &[SIG_RELAY1_STATE, SIG_RELAY2_STATE]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> TempCtlDevice {
        TempCtlDevice::new("tc1", &BTreeMap::new(), Arc::new(SignalRegistry::new())).unwrap()
    }

    fn call(
        dev: &TempCtlDevice,
        function_id: u32,
        args: &[(&str, Value)],
    ) -> CallResult {
        let args: BTreeMap<String, Value> = args
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect();
        dev.call_function(function_id, &args)
    }

    fn read_one(dev: &TempCtlDevice, id: &str) -> Value {
        dev.read_signals(&[id.to_string()])[0].value.clone()
    }

    #[test]
    fn set_mode_round_trips() {
        let dev = device();
        call(&dev, FN_SET_MODE, &[("mode", Value::String("closed".into()))]).unwrap();
        assert_eq!(read_one(&dev, SIG_CONTROL_MODE), Value::String("closed".into()));
    }

    #[test]
    fn set_relay_requires_open_mode() {
        let dev = device();
        call(&dev, FN_SET_MODE, &[("mode", Value::String("closed".into()))]).unwrap();
        let result = call(
            &dev,
            FN_SET_RELAY,
            &[("relay_index", Value::Int64(1)), ("state", Value::Bool(true))],
        );
        assert!(matches!(result, Err(CallError::FailedPrecondition(_))));
    }

    #[test]
    fn setpoint_range_enforced() {
        let dev = device();
        assert!(call(&dev, FN_SET_SETPOINT, &[("value", Value::Double(500.0))]).is_err());
        assert!(call(&dev, FN_SET_SETPOINT, &[("value", Value::Double(80.0))]).is_ok());
    }

    #[test]
    fn open_loop_heats_toward_ambient_plus_relays() {
        let dev = device();
        call(
            &dev,
            FN_SET_RELAY,
            &[("relay_index", Value::Int64(1)), ("state", Value::Bool(true))],
        )
        .unwrap();
        call(
            &dev,
            FN_SET_RELAY,
            &[("relay_index", Value::Int64(2)), ("state", Value::Bool(true))],
        )
        .unwrap();

        // Both relays on: target is 23 + 75 = 98. Step 60 s at 10 Hz; the
        // temperature rises monotonically from 25 toward 98.
        let mut last = match read_one(&dev, SIG_TC1_TEMP) {
            Value::Double(v) => v,
            other => panic!("unexpected {other:?}"),
        };
        for _ in 0..600 {
            dev.update_physics(0.1);
            let now = match read_one(&dev, SIG_TC1_TEMP) {
                Value::Double(v) => v,
                other => panic!("unexpected {other:?}"),
            };
            assert!(now >= last, "temperature regressed: {now} < {last}");
            last = now;
        }
        assert!(last > 90.0, "expected near 98, got {last}");
    }

    #[test]
    fn bang_bang_hysteresis_holds_in_dead_band() {
        let registry = Arc::new(SignalRegistry::new());
        let dev =
            TempCtlDevice::new("tc1", &BTreeMap::new(), registry.clone()).unwrap();
        call(&dev, FN_SET_MODE, &[("mode", Value::String("closed".into()))]).unwrap();
        call(&dev, FN_SET_SETPOINT, &[("value", Value::Double(60.0))]).unwrap();

        // Far below setpoint: both relays on.
        registry.write("tc1/tc1_temp", 40.0);
        dev.update_control();
        assert_eq!(read_one(&dev, SIG_RELAY1_STATE), Value::Bool(true));
        assert_eq!(read_one(&dev, SIG_RELAY2_STATE), Value::Bool(true));

        // Moderately below: relay1 only.
        registry.write("tc1/tc1_temp", 55.0);
        dev.update_control();
        assert_eq!(read_one(&dev, SIG_RELAY1_STATE), Value::Bool(true));
        assert_eq!(read_one(&dev, SIG_RELAY2_STATE), Value::Bool(false));

        // Inside the dead band [58, 62]: hold previous state.
        registry.write("tc1/tc1_temp", 61.0);
        dev.update_control();
        assert_eq!(read_one(&dev, SIG_RELAY1_STATE), Value::Bool(true));
        assert_eq!(read_one(&dev, SIG_RELAY2_STATE), Value::Bool(false));

        // Above: both off.
        registry.write("tc1/tc1_temp", 63.0);
        dev.update_control();
        assert_eq!(read_one(&dev, SIG_RELAY1_STATE), Value::Bool(false));
        assert_eq!(read_one(&dev, SIG_RELAY2_STATE), Value::Bool(false));
    }

    #[test]
    fn physics_driven_temp_wins_over_state() {
        let registry = Arc::new(SignalRegistry::new());
        let dev =
            TempCtlDevice::new("tc1", &BTreeMap::new(), registry.clone()).unwrap();
        registry.write("tc1/tc1_temp", 77.7);
        assert_eq!(read_one(&dev, SIG_TC1_TEMP), Value::Double(77.7));
        // tc2 stays device-authoritative.
        assert_eq!(read_one(&dev, SIG_TC2_TEMP), Value::Double(25.0));
    }

    #[test]
    fn initial_temp_option_validated() {
        let options = BTreeMap::from([
            ("initial_temp".to_string(), serde_yaml::Value::from(500.0)),
            (
                "temp_range".to_string(),
                serde_yaml::from_str("[0.0, 100.0]").unwrap(),
            ),
        ]);
        let result = TempCtlDevice::new("tc1", &options, Arc::new(SignalRegistry::new()));
        assert!(result.is_err());
    }

    #[test]
    fn unknown_signals_omitted() {
        let dev = device();
        let out = dev.read_signals(&["bogus".to_string(), SIG_SETPOINT.to_string()]);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].signal_id, SIG_SETPOINT);
    }
}
