//! Dual DC motor controller: two PWM channels with first-order speed lag.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use rig_core::{join_path, Value};
use rig_physics::SignalRegistry;
use rig_proto::{
    ArgSpec, CapabilitySet, DeviceInfo, FunctionSpec, PolicyCategory, SignalSpec, SignalValue,
};
use serde::Deserialize;

use crate::common::{arg_double, arg_int64, CallError, CallResult, Device};
use crate::manager::{options_value, DeviceInitError};
use crate::PROVIDER_NAME;

pub const FN_SET_MOTOR_DUTY: u32 = 10;

pub const SIG_MOTOR1_SPEED: &str = "motor1_speed";
pub const SIG_MOTOR2_SPEED: &str = "motor2_speed";
pub const SIG_MOTOR1_DUTY: &str = "motor1_duty";
pub const SIG_MOTOR2_DUTY: &str = "motor2_duty";

const KNOWN_SIGNALS: &[&str] = &[
    SIG_MOTOR1_SPEED,
    SIG_MOTOR2_SPEED,
    SIG_MOTOR1_DUTY,
    SIG_MOTOR2_DUTY,
];

const DEFAULT_SIGNALS: &[&str] = &[SIG_MOTOR1_SPEED, SIG_MOTOR2_SPEED];

const MOTOR_TAU_S: f64 = 0.8;
const DEFAULT_MAX_RPM: f64 = 3200.0;
const MAX_SPEED_LIMIT_RPM: f64 = 10_000.0;

#[derive(Debug, Default, Deserialize)]
struct Options {
    #[serde(default)]
    max_speed: Option<f64>,
}

#[derive(Debug)]
struct State {
    duty1: f64,
    duty2: f64,
    speed1: f64,
    speed2: f64,
    max_rpm: f64,
}

impl Default for State {
    fn default() -> Self {
        Self {
            duty1: 0.0,
            duty2: 0.0,
            speed1: 0.0,
            speed2: 0.0,
            max_rpm: DEFAULT_MAX_RPM,
        }
    }
}

pub struct MotorCtlDevice {
    device_id: String,
    registry: Arc<SignalRegistry>,
    state: Mutex<State>,
}

impl MotorCtlDevice {
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
        if let Some(max_speed) = options.max_speed {
            if max_speed <= 0.0 || max_speed > MAX_SPEED_LIMIT_RPM {
                return Err(DeviceInitError::InvalidOption {
                    device: device_id.to_string(),
                    what: format!(
                        "max_speed {max_speed} out of valid range (0, {MAX_SPEED_LIMIT_RPM}] RPM"
                    ),
                });
            }
            state.max_rpm = max_speed;
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

    fn physics_value(&self, signal_id: &str) -> Option<f64> {
        let path = join_path(&self.device_id, signal_id);
        if !self.registry.is_physics_driven(&path) {
            return None;
        }
        self.registry.read(&path)
    }
}

impl Device for MotorCtlDevice {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            device_id: self.device_id.clone(),
            provider_name: PROVIDER_NAME.to_string(),
            type_id: "sim.dual_dc_motor".to_string(),
            type_version: "1.0".to_string(),
            label: "Sim Dual DC Motor Controller".to_string(),
            address: format!("sim://{}", self.device_id),
            tags: BTreeMap::from([
                ("family".to_string(), "sim".to_string()),
                ("kind".to_string(), "motor_control".to_string()),
            ]),
        }
    }

    fn capabilities(&self) -> CapabilitySet {
        let signal = |id: &str, name: &str, desc: &str, unit: &str, poll_hz: f64, stale_ms: u64| {
            SignalSpec {
                signal_id: id.to_string(),
                name: name.to_string(),
                description: desc.to_string(),
                value_type: "double".to_string(),
                unit: unit.to_string(),
                poll_hint_hz: poll_hz,
                stale_after_ms: stale_ms,
            }
        };

        let mut motor_index = ArgSpec::new("motor_index", "int64", true, "1 or 2");
        motor_index.min_int64 = Some(1);
        motor_index.max_int64 = Some(2);

        let mut duty = ArgSpec::new("duty", "double", true, "Duty 0..1");
        duty.min_double = Some(0.0);
        duty.max_double = Some(1.0);

        CapabilitySet {
            signals: vec![
                signal(SIG_MOTOR1_SPEED, "Motor 1 Speed", "Estimated speed", "rpm", 5.0, 800),
                signal(SIG_MOTOR2_SPEED, "Motor 2 Speed", "Estimated speed", "rpm", 5.0, 800),
                signal(SIG_MOTOR1_DUTY, "Motor 1 Duty", "PWM duty 0..1", "", 2.0, 1500),
                signal(SIG_MOTOR2_DUTY, "Motor 2 Duty", "PWM duty 0..1", "", 2.0, 1500),
            ],
            functions: vec![FunctionSpec {
                function_id: FN_SET_MOTOR_DUTY,
                name: "set_motor_duty".to_string(),
                description: "Set PWM duty for a motor channel".to_string(),
                category: PolicyCategory::Actuate,
                args: vec![motor_index, duty],
            }],
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
            let local = match id {
                SIG_MOTOR1_SPEED => state.speed1,
                SIG_MOTOR2_SPEED => state.speed2,
                SIG_MOTOR1_DUTY => state.duty1,
                SIG_MOTOR2_DUTY => state.duty2,
                _ => continue,
            };
            let value = self.physics_value(id).unwrap_or(local);
            out.push(SignalValue::new(id, Value::Double(value)));
        }
        out
    }

    fn call_function(&self, function_id: u32, args: &BTreeMap<String, Value>) -> CallResult {
        let mut state = self.lock();

        match function_id {
            FN_SET_MOTOR_DUTY => {
                let index = arg_int64(args, "motor_index")?;
                if index != 1 && index != 2 {
                    return Err(CallError::InvalidArgument(
                        "motor_index must be 1 or 2".to_string(),
                    ));
                }
                let duty = arg_double(args, "duty")?;
                if !(0.0..=1.0).contains(&duty) {
                    return Err(CallError::InvalidArgument(
                        "duty must be in [0, 1]".to_string(),
                    ));
                }
                if index == 1 {
                    state.duty1 = duty;
                } else {
                    state.duty2 = duty;
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

        // Speed approaches duty * max_rpm with a first-order lag.
        let alpha = 1.0 - (-dt / MOTOR_TAU_S).exp();
        let target1 = state.duty1.clamp(0.0, 1.0) * state.max_rpm;
        let target2 = state.duty2.clamp(0.0, 1.0) * state.max_rpm;
        state.speed1 += alpha * (target1 - state.speed1);
        state.speed2 += alpha * (target2 - state.speed2);
    }

    fn actuator_signals(&self) -> &'static [&'static str] {
        &[SIG_MOTOR1_DUTY, SIG_MOTOR2_DUTY]
    }
}
