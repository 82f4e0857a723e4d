//! Fault-injection control device.
//!
//! A virtual device exposed alongside the configured fleet; its five
//! functions write the fault tables that every other request consults.

use std::collections::BTreeMap;
use std::sync::Arc;

use rig_core::Value;
use rig_proto::{ArgSpec, CapabilitySet, DeviceInfo, FunctionSpec, PolicyCategory, SignalValue};

use crate::common::{arg_double, arg_int64, arg_string, CallError, CallResult, Device};
use crate::fault::FaultInjection;
use crate::PROVIDER_NAME;

pub const CONTROL_DEVICE_ID: &str = "sim_control";

pub const FN_INJECT_DEVICE_UNAVAILABLE: u32 = 1;
pub const FN_INJECT_SIGNAL_FAULT: u32 = 2;
pub const FN_INJECT_CALL_LATENCY: u32 = 3;
pub const FN_INJECT_CALL_FAILURE: u32 = 4;
pub const FN_CLEAR_FAULTS: u32 = 5;

pub struct SimControlDevice {
    faults: Arc<FaultInjection>,
}

impl SimControlDevice {
    pub fn new(faults: Arc<FaultInjection>) -> Self {
        Self { faults }
    }
}

impl Device for SimControlDevice {
    fn info(&self) -> DeviceInfo {
        DeviceInfo {
            device_id: CONTROL_DEVICE_ID.to_string(),
            provider_name: PROVIDER_NAME.to_string(),
            type_id: "sim.control".to_string(),
            type_version: "1.0".to_string(),
            label: "Sim Fault Injection Control".to_string(),
            address: "sim://control".to_string(),
            tags: BTreeMap::from([
                ("family".to_string(), "sim".to_string()),
                ("kind".to_string(), "control".to_string()),
            ]),
        }
    }

    fn capabilities(&self) -> CapabilitySet {
        let device_id = || ArgSpec::new("device_id", "string", true, "Target device ID");
        let duration = || {
            let mut a = ArgSpec::new("duration_ms", "int64", true, "Duration in milliseconds");
            a.unit = "ms".to_string();
            a
        };

        let mut latency = ArgSpec::new("latency_ms", "int64", true, "Latency in milliseconds");
        latency.unit = "ms".to_string();

        let mut failure_rate =
            ArgSpec::new("failure_rate", "double", true, "Failure probability (0.0-1.0)");
        failure_rate.min_double = Some(0.0);
        failure_rate.max_double = Some(1.0);

        CapabilitySet {
            // No signals on the control device.
            signals: Vec::new(),
            functions: vec![
                FunctionSpec {
                    function_id: FN_INJECT_DEVICE_UNAVAILABLE,
                    name: "inject_device_unavailable".to_string(),
                    description: "Make a device appear unavailable for specified duration"
                        .to_string(),
                    category: PolicyCategory::Actuate,
                    args: vec![device_id(), duration()],
                },
                FunctionSpec {
                    function_id: FN_INJECT_SIGNAL_FAULT,
                    name: "inject_signal_fault".to_string(),
                    description: "Make a signal report FAULT quality for specified duration"
                        .to_string(),
                    category: PolicyCategory::Actuate,
                    args: vec![
                        device_id(),
                        ArgSpec::new("signal_id", "string", true, "Target signal ID"),
                        duration(),
                    ],
                },
                FunctionSpec {
                    function_id: FN_INJECT_CALL_LATENCY,
                    name: "inject_call_latency".to_string(),
                    description: "Add artificial latency to all function calls on a device"
                        .to_string(),
                    category: PolicyCategory::Actuate,
                    args: vec![device_id(), latency],
                },
                FunctionSpec {
                    function_id: FN_INJECT_CALL_FAILURE,
                    name: "inject_call_failure".to_string(),
                    description: "Make a function fail probabilistically".to_string(),
                    category: PolicyCategory::Actuate,
                    args: vec![
                        device_id(),
                        ArgSpec::new("function_id", "string", true, "Target function ID"),
                        failure_rate,
                    ],
                },
                FunctionSpec {
                    function_id: FN_CLEAR_FAULTS,
                    name: "clear_faults".to_string(),
                    description: "Clear all injected faults".to_string(),
                    category: PolicyCategory::Actuate,
                    args: Vec::new(),
                },
            ],
        }
    }

    fn read_signals(&self, _signal_ids: &[String]) -> Vec<SignalValue> {
        Vec::new()
    }

    fn call_function(&self, function_id: u32, args: &BTreeMap<String, Value>) -> CallResult {
        match function_id {
            FN_INJECT_DEVICE_UNAVAILABLE => {
                let device_id = arg_string(args, "device_id")?;
                let duration_ms = arg_int64(args, "duration_ms")?;
                self.faults.inject_device_unavailable(device_id, duration_ms);
                Ok(())
            }

            FN_INJECT_SIGNAL_FAULT => {
                let device_id = arg_string(args, "device_id")?;
                let signal_id = arg_string(args, "signal_id")?;
                let duration_ms = arg_int64(args, "duration_ms")?;
                self.faults
                    .inject_signal_fault(device_id, signal_id, duration_ms);
                Ok(())
            }

            FN_INJECT_CALL_LATENCY => {
                let device_id = arg_string(args, "device_id")?;
                let latency_ms = arg_int64(args, "latency_ms")?;
                self.faults.inject_call_latency(device_id, latency_ms);
                Ok(())
            }

            FN_INJECT_CALL_FAILURE => {
                let device_id = arg_string(args, "device_id")?;
                let function_id = arg_string(args, "function_id")?;
                let failure_rate = arg_double(args, "failure_rate")?;
                self.faults
                    .inject_call_failure(device_id, function_id, failure_rate);
                Ok(())
            }

            FN_CLEAR_FAULTS => {
                self.faults.clear_all();
                Ok(())
            }

            _ => Err(CallError::NotFound("unknown function_id".to_string())),
        }
    }

    fn update_physics(&self, _dt: f64) {}
}
