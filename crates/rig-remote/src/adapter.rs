//! Protocol adapter wiring [`SimClient`] into the engine.

use std::collections::{BTreeMap, BTreeSet};
use std::time::Duration;

use rig_core::split_path;
use rig_engine::{AdapterError, Command, ProtocolAdapter};
use tracing::warn;

use crate::client::SimClient;
use crate::transport::{RpcTransport, TcpTransport};

pub struct SimServerAdapter {
    client: SimClient,
    /// Edge targets declared by the loaded physics config, deduplicated.
    output_paths: Vec<String>,
    registered_devices: BTreeSet<String>,
}

impl SimServerAdapter {
    /// Connect to the simulation server over framed TCP.
    pub fn connect(address: &str) -> Result<Self, AdapterError> {
        let transport =
            TcpTransport::connect(address).map_err(|err| AdapterError(err.to_string()))?;
        Ok(Self::with_transport(Box::new(transport)))
    }

    pub fn with_transport(transport: Box<dyn RpcTransport>) -> Self {
        Self {
            client: SimClient::new(transport),
            output_paths: Vec::new(),
            registered_devices: BTreeSet::new(),
        }
    }
}

impl ProtocolAdapter for SimServerAdapter {
    fn load_config(&mut self, content: &str) -> Result<(), AdapterError> {
        self.client
            .load_config_content(content)
            .map_err(|err| AdapterError(err.to_string()))?;

        // The server's config is our own physics format; its edge targets
        // are the output paths we will read back each tick.
        let physics = rig_config::parse_physics_config(content)
            .map_err(|err| AdapterError(format!("physics config parse: {err}")))?;
        let mut seen = BTreeSet::new();
        self.output_paths = physics
            .signal_graph
            .iter()
            .filter(|edge| seen.insert(edge.target.clone()))
            .map(|edge| edge.target.clone())
            .collect();
        Ok(())
    }

    fn register_provider(
        &mut self,
        provider_id: &str,
        device_ids: &[String],
    ) -> Result<(), AdapterError> {
        self.registered_devices = device_ids.iter().cloned().collect();
        self.client
            .register_provider(provider_id, device_ids)
            .map_err(|err| AdapterError(err.to_string()))
    }

    fn update_signals(
        &mut self,
        actuators: &BTreeMap<String, f64>,
        unit: &str,
        timeout: Duration,
    ) -> Result<bool, AdapterError> {
        self.client
            .update_signals(actuators, unit, timeout)
            .map_err(|err| AdapterError(err.to_string()))
    }

    fn read_signals(&mut self, paths: &[String]) -> BTreeMap<String, f64> {
        let owned_defaults: Vec<String>;
        let to_read: &[String] = if paths.is_empty() {
            // Default to config-declared outputs owned by our devices.
            owned_defaults = self
                .output_paths
                .iter()
                .filter(|path| {
                    split_path(path)
                        .is_some_and(|parts| self.registered_devices.contains(parts.object_id))
                })
                .cloned()
                .collect();
            &owned_defaults
        } else {
            paths
        };

        let mut sensors = BTreeMap::new();
        for path in to_read {
            if let Some(value) = self.client.read_signal_value(path) {
                sensors.insert(path.clone(), value);
            }
        }
        sensors
    }

    fn drain_commands(&mut self) -> Vec<Command> {
        self.client
            .drain_commands()
            .into_iter()
            .map(|cmd| Command {
                device_id: cmd.device,
                function_name: cmd.function,
                args: cmd
                    .args
                    .iter()
                    .map(|(key, arg)| (key.clone(), arg.to_value()))
                    .collect(),
            })
            .collect()
    }

    fn list_signals(&self) -> Vec<String> {
        if self.output_paths.is_empty() {
            warn!("list_signals before load_config; no output paths known");
        }
        self.output_paths.clone()
    }
}
