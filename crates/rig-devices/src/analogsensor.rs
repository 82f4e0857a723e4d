//! Analog sensor: two voltage channels with drift, noise, and a quality
//! state machine.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use rand::rngs::StdRng;
use rand::SeedableRng;
use rig_core::{join_path, Value};
use rig_physics::{sample_standard_normal, SignalRegistry};
use rig_proto::{
    ArgSpec, CapabilitySet, DeviceInfo, FunctionSpec, PolicyCategory, SignalSpec, SignalValue,
};

use crate::common::{arg_bool, arg_int64, CallError, CallResult, Device};
use crate::manager::DeviceInitError;
use crate::PROVIDER_NAME;

pub const FN_CALIBRATE_CHANNEL: u32 = 1;
pub const FN_INJECT_NOISE: u32 = 2;

pub const SIG_VOLTAGE_CH1: &str = "voltage_ch1";
pub const SIG_VOLTAGE_CH2: &str = "voltage_ch2";
pub const SIG_SENSOR_QUALITY: &str = "sensor_quality";

const KNOWN_SIGNALS: &[&str] = &[SIG_VOLTAGE_CH1, SIG_VOLTAGE_CH2, SIG_SENSOR_QUALITY];

const CH1_BASE_V: f64 = 2.5;
const CH2_BASE_V: f64 = 5.0;
const DRIFT_PER_SEC_V: f64 = 0.002;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SensorQuality {
    Good,
    Noisy,
    Fault,
}

impl SensorQuality {
    fn as_str(&self) -> &'static str {
        match self {
            Self::Good => "GOOD",
            Self::Noisy => "NOISY",
            Self::Fault => "FAULT",
        }
    }

    fn noise_level(&self) -> f64 {
        match self {
            Self::Good => 0.01,
            Self::Noisy => 0.05,
            Self::Fault => 0.2,
        }
    }
}

struct State {
    drift_accumulator: f64,
    noise_enabled: bool,
    quality: SensorQuality,
    quality_timer: f64,
    rng: StdRng,
}

pub struct AnalogSensorDevice {
    device_id: String,
    registry: Arc<SignalRegistry>,
    state: Mutex<State>,
}

impl AnalogSensorDevice {
    pub fn new(
        device_id: &str,
        _options: &BTreeMap<String, serde_yaml::Value>,
        registry: Arc<SignalRegistry>,
    ) -> Result<Self, DeviceInitError> {
        Ok(Self {
            device_id: device_id.to_string(),
            registry,
            state: Mutex::new(State {
                drift_accumulator: 0.0,
                noise_enabled: false,
                quality: SensorQuality::Good,
                quality_timer: 0.0,
                rng: StdRng::from_entropy(),
            }),
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

fn noisy_reading(state: &mut State, base: f64) -> f64 {
    let noise = if state.noise_enabled {
        state.quality.noise_level() * sample_standard_normal(&mut state.rng)
    } else {
        0.0
    };
    base + state.drift_accumulator + noise
}

impl Device for AnalogSensorDevice {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            device_id: self.device_id.clone(),
            provider_name: PROVIDER_NAME.to_string(),
            type_id: "sim.analog_sensor".to_string(),
            type_version: "1.0".to_string(),
            label: "Sim Analog Sensor (2ch)".to_string(),
            address: format!("sim://{}", self.device_id),
            tags: BTreeMap::from([
                ("family".to_string(), "sim".to_string()),
                ("kind".to_string(), "analog_sensor".to_string()),
            ]),
        }
    }

    fn capabilities(&self) -> CapabilitySet {
        let voltage = |id: &str, n: u32| SignalSpec {
            signal_id: id.to_string(),
            name: format!("Voltage Channel {n}"),
            description: format!("Analog input channel {n}"),
            value_type: "double".to_string(),
            unit: "V".to_string(),
            poll_hint_hz: 5.0,
            stale_after_ms: 800,
        };

        let mut channel = ArgSpec::new("channel", "int64", true, "1 or 2");
        channel.min_int64 = Some(1);
        channel.max_int64 = Some(2);

        CapabilitySet {
            signals: vec![
                voltage(SIG_VOLTAGE_CH1, 1),
                voltage(SIG_VOLTAGE_CH2, 2),
                SignalSpec {
                    signal_id: SIG_SENSOR_QUALITY.to_string(),
                    name: "Sensor Quality".to_string(),
                    description: "GOOD, NOISY, or FAULT".to_string(),
                    value_type: "string".to_string(),
                    unit: String::new(),
                    poll_hint_hz: 0.5,
                    stale_after_ms: 3000,
                },
            ],
            functions: vec![
                FunctionSpec {
                    function_id: FN_CALIBRATE_CHANNEL,
                    name: "calibrate_channel".to_string(),
                    description: "Reset accumulated drift for a channel".to_string(),
                    category: PolicyCategory::Config,
                    args: vec![channel],
                },
                FunctionSpec {
                    function_id: FN_INJECT_NOISE,
                    name: "inject_noise".to_string(),
                    description: "Enable or disable simulated sensor noise".to_string(),
                    category: PolicyCategory::Actuate,
                    args: vec![ArgSpec::new("enabled", "bool", true, "true=noisy")],
                },
            ],
        }
    }

    fn read_signals(&self, signal_ids: &[String]) -> Vec<SignalValue> {
        let mut state = self.lock();

        let ids: Vec<&str> = if signal_ids.is_empty() {
            KNOWN_SIGNALS.to_vec()
        } else {
            signal_ids.iter().map(String::as_str).collect()
        };

        let mut out = Vec::new();
        for id in ids {
            if !KNOWN_SIGNALS.contains(&id) {
                continue;
            }
            let value = match id {
                SIG_VOLTAGE_CH1 => Value::Double(
                    self.physics_value(id)
                        .unwrap_or_else(|| noisy_reading(&mut state, CH1_BASE_V)),
                ),
                SIG_VOLTAGE_CH2 => Value::Double(
                    self.physics_value(id)
                        .unwrap_or_else(|| noisy_reading(&mut state, CH2_BASE_V)),
                ),
                SIG_SENSOR_QUALITY => Value::String(state.quality.as_str().to_string()),
                _ => continue,
            };
            out.push(SignalValue::new(id, value));
        }
        out
    }

    fn call_function(&self, function_id: u32, args: &BTreeMap<String, Value>) -> CallResult {
        let mut state = self.lock();

        match function_id {
            FN_CALIBRATE_CHANNEL => {
                if state.quality != SensorQuality::Good {
                    return Err(CallError::FailedPrecondition(
                        "calibrate_channel requires sensor_quality == GOOD".to_string(),
                    ));
                }
                let channel = arg_int64(args, "channel")?;
                if channel != 1 && channel != 2 {
                    return Err(CallError::InvalidArgument(
                        "channel must be 1 or 2".to_string(),
                    ));
                }
                // Both channels share one drift accumulator.
                state.drift_accumulator = 0.0;
                Ok(())
            }

            FN_INJECT_NOISE => {
                let enabled = arg_bool(args, "enabled")?;
                state.noise_enabled = enabled;
                state.quality_timer = 0.0;
                if !enabled {
                    state.drift_accumulator = 0.0;
                    state.quality = SensorQuality::Good;
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

        if state.noise_enabled {
            state.drift_accumulator += dt * DRIFT_PER_SEC_V;
        }

        state.quality_timer += dt;
        if state.noise_enabled {
            if state.quality == SensorQuality::Good && state.quality_timer > 30.0 {
                state.quality = SensorQuality::Noisy;
            } else if state.quality == SensorQuality::Noisy && state.quality_timer > 60.0 {
                state.quality = SensorQuality::Fault;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device() -> AnalogSensorDevice {
        AnalogSensorDevice::new("as1", &BTreeMap::new(), Arc::new(SignalRegistry::new())).unwrap()
    }

    fn quality(dev: &AnalogSensorDevice) -> String {
        dev.read_signals(&[SIG_SENSOR_QUALITY.to_string()])[0]
            .value
            .as_str()
            .unwrap()
            .to_string()
    }

    #[test]
    fn clean_readings_without_noise() {
        let dev = device();
        let values = dev.read_signals(&[]);
        let ch1 = values.iter().find(|s| s.signal_id == SIG_VOLTAGE_CH1).unwrap();
        assert_eq!(ch1.value, Value::Double(CH1_BASE_V));
        assert_eq!(quality(&dev), "GOOD");
    }

    #[test]
    fn noise_degrades_quality_over_time() {
        let dev = device();
        dev.call_function(
            FN_INJECT_NOISE,
            &BTreeMap::from([("enabled".to_string(), Value::Bool(true))]),
        )
        .unwrap();

        for _ in 0..350 {
            dev.update_physics(0.1);
        }
        assert_eq!(quality(&dev), "NOISY");

        for _ in 0..300 {
            dev.update_physics(0.1);
        }
        assert_eq!(quality(&dev), "FAULT");
    }

    #[test]
    fn calibrate_requires_good_quality() {
        let dev = device();
        dev.call_function(
            FN_INJECT_NOISE,
            &BTreeMap::from([("enabled".to_string(), Value::Bool(true))]),
        )
        .unwrap();
        for _ in 0..350 {
            dev.update_physics(0.1);
        }
        let result = dev.call_function(
            FN_CALIBRATE_CHANNEL,
            &BTreeMap::from([("channel".to_string(), Value::Int64(1))]),
        );
        assert!(matches!(result, Err(CallError::FailedPrecondition(_))));
    }

    #[test]
    fn calibrate_resets_drift() {
        let dev = device();
        dev.call_function(
            FN_INJECT_NOISE,
            &BTreeMap::from([("enabled".to_string(), Value::Bool(true))]),
        )
        .unwrap();
        for _ in 0..100 {
            dev.update_physics(0.1);
        }
        // 10 s of drift at 2 mV/s.
        {
            let state = dev.lock();
            assert!((state.drift_accumulator - 0.02).abs() < 1e-9);
        }
        dev.call_function(
            FN_CALIBRATE_CHANNEL,
            &BTreeMap::from([("channel".to_string(), Value::Int64(1))]),
        )
        .unwrap();
        let state = dev.lock();
        assert_eq!(state.drift_accumulator, 0.0);
    }
}
