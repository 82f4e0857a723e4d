//! Device manager: the single dispatch point over the configured fleet.
//!
//! Owns the devices, the fault-injection tables, and the function-name cache.
//! Request handlers and the physics ticker both go through here; fault checks
//! happen on every path.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard};

use rig_config::ProviderConfig;
use rig_core::{join_path, split_path, Value};
use rig_physics::SignalRegistry;
use rig_proto::{CapabilitySet, DeviceInfo, Quality, SignalValue};
use thiserror::Error;
use tracing::warn;

use crate::analogsensor::AnalogSensorDevice;
use crate::common::{CallError, CallResult, Device};
use crate::control::{SimControlDevice, CONTROL_DEVICE_ID};
use crate::fault::FaultInjection;
use crate::motorctl::MotorCtlDevice;
use crate::relayio::RelayIoDevice;
use crate::tempctl::TempCtlDevice;

#[derive(Debug, Error)]
pub enum DeviceInitError {
    #[error("device '{id}': unknown type '{kind}'")]
    UnknownType { id: String, kind: String },

    #[error("device '{device}': {what}")]
    InvalidOption { device: String, what: String },
}

/// Convert a device's flattened option map into a YAML mapping for typed
/// option structs.
pub(crate) fn options_value(options: &BTreeMap<String, serde_yaml::Value>) -> serde_yaml::Value {
    let mapping: serde_yaml::Mapping = options
        .iter()
        .map(|(key, value)| (serde_yaml::Value::String(key.clone()), value.clone()))
        .collect();
    serde_yaml::Value::Mapping(mapping)
}

struct DeviceEntry {
    device: Box<dyn Device>,
}

pub struct DeviceManager {
    /// Configured devices in declaration order.
    order: Vec<String>,
    devices: BTreeMap<String, DeviceEntry>,
    control: SimControlDevice,
    faults: Arc<FaultInjection>,
    /// device_id -> function name -> function id. Built once at init.
    function_ids: BTreeMap<String, BTreeMap<String, u32>>,
    /// Last good value per (device, signal), served while the signal is
    /// faulted.
    frozen: Mutex<BTreeMap<(String, String), Value>>,
}

impl DeviceManager {
    pub fn from_config(
        config: &ProviderConfig,
        registry: Arc<SignalRegistry>,
    ) -> Result<Self, DeviceInitError> {
        let faults = Arc::new(FaultInjection::new());

        let mut order = Vec::new();
        let mut devices: BTreeMap<String, DeviceEntry> = BTreeMap::new();
        for spec in &config.devices {
            let device: Box<dyn Device> = match spec.kind.as_str() {
                "tempctl" => Box::new(TempCtlDevice::new(
                    &spec.id,
                    &spec.options,
                    registry.clone(),
                )?),
                "motorctl" => Box::new(MotorCtlDevice::new(
                    &spec.id,
                    &spec.options,
                    registry.clone(),
                )?),
                "relayio" => Box::new(RelayIoDevice::new(
                    &spec.id,
                    &spec.options,
                    registry.clone(),
                )?),
                "analogsensor" => Box::new(AnalogSensorDevice::new(
                    &spec.id,
                    &spec.options,
                    registry.clone(),
                )?),
                _ => {
                    return Err(DeviceInitError::UnknownType {
                        id: spec.id.clone(),
                        kind: spec.kind.clone(),
                    })
                }
            };
            order.push(spec.id.clone());
            devices.insert(spec.id.clone(), DeviceEntry { device });
        }

        let control = SimControlDevice::new(faults.clone());

        // Function-name cache: immutable after init; the rule engine and
        // remote command execution resolve names through it.
        let mut function_ids = BTreeMap::new();
        for (id, entry) in &devices {
            let map: BTreeMap<String, u32> = entry
                .device
                .capabilities()
                .functions
                .iter()
                .map(|f| (f.name.clone(), f.function_id))
                .collect();
            function_ids.insert(id.clone(), map);
        }
        let control_map: BTreeMap<String, u32> = control
            .capabilities()
            .functions
            .iter()
            .map(|f| (f.name.clone(), f.function_id))
            .collect();
        function_ids.insert(CONTROL_DEVICE_ID.to_string(), control_map);

        Ok(Self {
            order,
            devices,
            control,
            faults,
            function_ids,
            frozen: Mutex::new(BTreeMap::new()),
        })
    }

    fn frozen_lock(&self) -> MutexGuard<'_, BTreeMap<(String, String), Value>> {
        self.frozen.lock().unwrap_or_else(|err| err.into_inner())
    }

    pub fn faults(&self) -> &FaultInjection {
        &self.faults
    }

    /// Configured device ids in declaration order.
    pub fn device_ids(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn is_registered(&self, device_id: &str) -> bool {
        self.devices.contains_key(device_id) || device_id == CONTROL_DEVICE_ID
    }

    /// All registered devices plus the control device, skipping any device
    /// currently under an unavailability fault.
    pub fn list_devices(&self) -> Vec<DeviceInfo> {
        let mut out = Vec::new();
        for id in &self.order {
            if self.faults.is_device_unavailable(id) {
                continue;
            }
            if let Some(entry) = self.devices.get(id) {
                out.push(entry.device.info());
            }
        }
        out.push(self.control.info());
        out
    }

    /// Identity record for a device. Available even while the device is
    /// under an unavailability fault (describe keeps working; capabilities
    /// go empty instead).
    pub fn device_info(&self, device_id: &str) -> Option<DeviceInfo> {
        if device_id == CONTROL_DEVICE_ID {
            return Some(self.control.info());
        }
        self.devices.get(device_id).map(|e| e.device.info())
    }

    /// Capability set for a device. `None` for unknown ids; empty for
    /// faulted devices.
    pub fn describe_device(&self, device_id: &str) -> Option<CapabilitySet> {
        if device_id == CONTROL_DEVICE_ID {
            return Some(self.control.capabilities());
        }
        let entry = self.devices.get(device_id)?;
        if self.faults.is_device_unavailable(device_id) {
            return Some(CapabilitySet::default());
        }
        Some(entry.device.capabilities())
    }

    /// Read signals with fault handling: faulted signals come back with
    /// quality FAULT and their last good value frozen.
    pub fn read_signals(&self, device_id: &str, signal_ids: &[String]) -> Vec<SignalValue> {
        if self.faults.is_device_unavailable(device_id) {
            return Vec::new();
        }

        let values = if device_id == CONTROL_DEVICE_ID {
            self.control.read_signals(signal_ids)
        } else {
            match self.devices.get(device_id) {
                Some(entry) => entry.device.read_signals(signal_ids),
                None => return Vec::new(),
            }
        };

        let mut frozen = self.frozen_lock();
        values
            .into_iter()
            .map(|mut sv| {
                let key = (device_id.to_string(), sv.signal_id.clone());
                if self.faults.is_signal_faulted(device_id, &sv.signal_id) {
                    sv.quality = Quality::Fault;
                    if let Some(last_good) = frozen.get(&key) {
                        sv.value = last_good.clone();
                    }
                } else {
                    frozen.insert(key, sv.value.clone());
                }
                sv
            })
            .collect()
    }

    /// Call a device function: unavailability check, injected latency,
    /// injected failure dice, then dispatch.
    pub fn call_function(
        &self,
        device_id: &str,
        function_id: u32,
        args: &BTreeMap<String, Value>,
    ) -> CallResult {
        if self.faults.is_device_unavailable(device_id) {
            return Err(CallError::InvalidArgument(
                "(injected fault) device unavailable".to_string(),
            ));
        }

        if let Some(latency) = self.faults.call_latency(device_id) {
            std::thread::sleep(latency);
        }

        if self
            .faults
            .should_call_fail(device_id, &function_id.to_string())
        {
            return Err(CallError::InvalidArgument(
                "(injected fault) function call failed".to_string(),
            ));
        }

        if device_id == CONTROL_DEVICE_ID {
            return self.control.call_function(function_id, args);
        }

        match self.devices.get(device_id) {
            Some(entry) => entry.device.call_function(function_id, args),
            None => Err(CallError::NotFound(format!(
                "unknown device_id: {device_id}"
            ))),
        }
    }

    /// Resolve a function name through the init-time cache.
    pub fn function_id(&self, device_id: &str, function_name: &str) -> Option<u32> {
        self.function_ids
            .get(device_id)?
            .get(function_name)
            .copied()
    }

    /// Full actuator paths for every registered device, in declaration
    /// order.
    pub fn actuator_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        for id in &self.order {
            if let Some(entry) = self.devices.get(id) {
                for signal in entry.device.actuator_signals() {
                    out.push(join_path(id, signal));
                }
            }
        }
        out
    }

    /// Numeric read-through for the signal registry's device reader.
    pub fn read_signal_numeric(&self, path: &str) -> Option<f64> {
        let parts = split_path(path)?;
        let values = self.read_signals(parts.object_id, &[parts.signal_id.to_string()]);
        values.first().and_then(|sv| sv.value.as_numeric())
    }

    /// Advance device-local physics on every device.
    pub fn update_all_physics(&self, dt: f64) {
        for id in &self.order {
            if let Some(entry) = self.devices.get(id) {
                entry.device.update_physics(dt);
            }
        }
    }

    /// Run per-device control updates (before actuator collection).
    pub fn update_all_control(&self) {
        for id in &self.order {
            if let Some(entry) = self.devices.get(id) {
                entry.device.update_control();
            }
        }
    }

    /// Execute a command by function name, logging failures.
    pub fn execute_named(
        &self,
        device_id: &str,
        function_name: &str,
        args: &BTreeMap<String, Value>,
    ) {
        let Some(function_id) = self.function_id(device_id, function_name) else {
            warn!(device_id, function_name, "unknown command function");
            return;
        };
        if let Err(err) = self.call_function(device_id, function_id, args) {
            warn!(device_id, function_name, error = %err, "command failed");
        }
    }
}
