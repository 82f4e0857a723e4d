//! Fault-injection tables.
//!
//! All faults are checked on every request and expire against the monotonic
//! clock. Expired entries are pruned as they are encountered.

use std::collections::BTreeMap;
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

#[derive(Debug)]
struct SignalFault {
    signal_id: String,
    expires_at: Instant,
}

#[derive(Debug)]
struct CallFailure {
    function_id: String,
    failure_rate: f64,
}

struct FaultState {
    unavailable: BTreeMap<String, Instant>,
    signal_faults: BTreeMap<String, Vec<SignalFault>>,
    call_latency: BTreeMap<String, u64>,
    call_failures: BTreeMap<String, Vec<CallFailure>>,
    rng: StdRng,
}

#[derive(Default)]
pub struct FaultInjection {
    state: Mutex<FaultState>,
}

impl Default for FaultState {
    fn default() -> Self {
        Self {
            unavailable: BTreeMap::new(),
            signal_faults: BTreeMap::new(),
            call_latency: BTreeMap::new(),
            call_failures: BTreeMap::new(),
            rng: StdRng::from_entropy(),
        }
    }
}

impl FaultInjection {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FaultState> {
        self.state.lock().unwrap_or_else(|err| err.into_inner())
    }

    pub fn clear_all(&self) {
        let mut state = self.lock();
        state.unavailable.clear();
        state.signal_faults.clear();
        state.call_latency.clear();
        state.call_failures.clear();
    }

    pub fn inject_device_unavailable(&self, device_id: &str, duration_ms: i64) {
        let expires_at = Instant::now() + Duration::from_millis(duration_ms.max(0) as u64);
        self.lock()
            .unavailable
            .insert(device_id.to_string(), expires_at);
    }

    pub fn is_device_unavailable(&self, device_id: &str) -> bool {
        let mut state = self.lock();
        match state.unavailable.get(device_id) {
            None => false,
            Some(expires_at) if Instant::now() >= *expires_at => {
                state.unavailable.remove(device_id);
                false
            }
            Some(_) => true,
        }
    }

    pub fn inject_signal_fault(&self, device_id: &str, signal_id: &str, duration_ms: i64) {
        let expires_at = Instant::now() + Duration::from_millis(duration_ms.max(0) as u64);
        self.lock()
            .signal_faults
            .entry(device_id.to_string())
            .or_default()
            .push(SignalFault {
                signal_id: signal_id.to_string(),
                expires_at,
            });
    }

    pub fn is_signal_faulted(&self, device_id: &str, signal_id: &str) -> bool {
        let mut state = self.lock();
        let Some(faults) = state.signal_faults.get_mut(device_id) else {
            return false;
        };
        let now = Instant::now();
        faults.retain(|fault| now < fault.expires_at);
        faults.iter().any(|fault| fault.signal_id == signal_id)
    }

    pub fn inject_call_latency(&self, device_id: &str, latency_ms: i64) {
        self.lock()
            .call_latency
            .insert(device_id.to_string(), latency_ms.max(0) as u64);
    }

    /// Artificial latency for calls on this device, if any.
    pub fn call_latency(&self, device_id: &str) -> Option<Duration> {
        let state = self.lock();
        state
            .call_latency
            .get(device_id)
            .filter(|ms| **ms > 0)
            .map(|ms| Duration::from_millis(*ms))
    }

    pub fn inject_call_failure(&self, device_id: &str, function_id: &str, failure_rate: f64) {
        let failure_rate = failure_rate.clamp(0.0, 1.0);
        let mut state = self.lock();
        let faults = state.call_failures.entry(device_id.to_string()).or_default();
        match faults.iter_mut().find(|f| f.function_id == function_id) {
            Some(existing) => existing.failure_rate = failure_rate,
            None => faults.push(CallFailure {
                function_id: function_id.to_string(),
                failure_rate,
            }),
        }
    }

    /// Roll the dice for a call on this device/function.
    pub fn should_call_fail(&self, device_id: &str, function_id: &str) -> bool {
        let mut state = self.lock();
        let Some(rate) = state
            .call_failures
            .get(device_id)
            .and_then(|faults| faults.iter().find(|f| f.function_id == function_id))
            .map(|f| f.failure_rate)
        else {
            return false;
        };
        state.rng.gen::<f64>() < rate
    }
}
