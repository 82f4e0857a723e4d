//! Thread-safe signal registry.
//!
//! The registry is the sole mediator between physics and devices. Physics
//! writes claim a path; reads for claimed paths come from the cache, reads
//! for everything else delegate to the device reader callback.
//!
//! The device reader may re-enter the registry (e.g. a device checking
//! `is_physics_driven` for a different path), so `read` is two-phase: inspect
//! under the lock, then drop the lock before invoking the callback.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

/// Read-through callback used for non-physics paths.
pub type DeviceReader = dyn Fn(&str) -> Option<f64> + Send + Sync;

#[derive(Default)]
struct RegistryState {
    cache: BTreeMap<String, f64>,
    physics_driven: BTreeSet<String>,
    device_reader: Option<Arc<DeviceReader>>,
}

#[derive(Default)]
pub struct SignalRegistry {
    state: Mutex<RegistryState>,
}

impl SignalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // A poisoned lock means a tick panicked mid-update; the maps are
        // still structurally sound and the provider must stay responsive.
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    /// Read a signal value.
    ///
    /// Physics-driven paths return the cached value (or `None` if physics has
    /// claimed the path but not written yet). Other paths delegate to the
    /// device reader. Absent path or absent reader is "no value", not an
    /// error.
    pub fn read(&self, path: &str) -> Option<f64> {
        let reader = {
            let state = self.lock();
            if state.physics_driven.contains(path) {
                return state.cache.get(path).copied();
            }
            state.device_reader.clone()
        };
        // Lock released: the reader may call back into this registry.
        reader.and_then(|reader| reader(path))
    }

    /// Write a physics-computed value, claiming the path.
    pub fn write(&self, path: &str, value: f64) {
        let mut state = self.lock();
        state.physics_driven.insert(path.to_string());
        state.cache.insert(path.to_string(), value);
    }

    /// Whether physics has claimed this path.
    pub fn is_physics_driven(&self, path: &str) -> bool {
        self.lock().physics_driven.contains(path)
    }

    /// Claim a path for physics without writing a value yet.
    ///
    /// Used during initialization to pre-claim graph targets before the
    /// ticker starts writing.
    pub fn mark_physics_driven(&self, path: &str) {
        self.lock().physics_driven.insert(path.to_string());
    }

    /// Drop all physics claims and cached values.
    pub fn clear_overrides(&self) {
        let mut state = self.lock();
        state.physics_driven.clear();
        state.cache.clear();
    }

    /// Install the read-through callback for non-physics paths.
    pub fn set_device_reader(&self, reader: Arc<DeviceReader>) {
        self.lock().device_reader = Some(reader);
    }

    /// Cached value for a path, regardless of the device reader.
    pub fn cached(&self, path: &str) -> Option<f64> {
        self.lock().cache.get(path).copied()
    }

    /// All currently claimed paths.
    pub fn physics_driven_paths(&self) -> Vec<String> {
        self.lock().physics_driven.iter().cloned().collect()
    }
}
