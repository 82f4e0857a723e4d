//! Per-edge transform primitives.
//!
//! Each graph edge carries at most one transform; its state lives in a single
//! tagged variant keyed by the edge. `dt` is the tick period.

use std::collections::VecDeque;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rig_config::TransformDef;

/// Draw one standard normal sample (Box-Muller).
pub fn sample_standard_normal(rng: &mut StdRng) -> f64 {
    let u1: f64 = rng.gen::<f64>().max(f64::MIN_POSITIVE);
    let u2: f64 = rng.gen();
    (-2.0 * u1.ln()).sqrt() * (std::f64::consts::TAU * u2).cos()
}

/// Transform state, one value per edge.
#[derive(Debug)]
pub enum TransformState {
    FirstOrderLag {
        tau_s: f64,
        value: f64,
        initialized: bool,
    },
    Noise {
        amplitude: f64,
        rng: StdRng,
    },
    Saturation {
        min: f64,
        max: f64,
    },
    Linear {
        scale: f64,
        offset: f64,
        clamp_min: Option<f64>,
        clamp_max: Option<f64>,
    },
    Deadband {
        threshold: f64,
        last_output: f64,
        initialized: bool,
    },
    RateLimiter {
        max_rate_per_sec: f64,
        last_value: f64,
        initialized: bool,
    },
    Delay {
        delay_sec: f64,
        /// Simulated clock for this edge; advances by dt per sample.
        clock: f64,
        buffer: VecDeque<(f64, f64)>,
        buffer_size: Option<usize>,
    },
    MovingAverage {
        window_size: usize,
        buffer: Vec<f64>,
        index: usize,
        sum: f64,
    },
}

impl TransformState {
    /// Build initial state from a validated config definition.
    pub fn from_def(def: &TransformDef) -> Self {
        match def {
            TransformDef::FirstOrderLag {
                tau_s,
                initial_value,
            } => Self::FirstOrderLag {
                tau_s: *tau_s,
                value: initial_value.unwrap_or(0.0),
                initialized: initial_value.is_some(),
            },
            TransformDef::Noise { amplitude, seed } => Self::Noise {
                amplitude: *amplitude,
                rng: StdRng::seed_from_u64(*seed as u64),
            },
            TransformDef::Saturation { min, max } => Self::Saturation {
                min: *min,
                max: *max,
            },
            TransformDef::Linear {
                scale,
                offset,
                clamp_min,
                clamp_max,
            } => Self::Linear {
                scale: *scale,
                offset: *offset,
                clamp_min: *clamp_min,
                clamp_max: *clamp_max,
            },
            TransformDef::Deadband { threshold } => Self::Deadband {
                threshold: *threshold,
                last_output: 0.0,
                initialized: false,
            },
            TransformDef::RateLimiter { max_rate_per_sec } => Self::RateLimiter {
                max_rate_per_sec: *max_rate_per_sec,
                last_value: 0.0,
                initialized: false,
            },
            TransformDef::Delay {
                delay_sec,
                buffer_size,
            } => Self::Delay {
                delay_sec: *delay_sec,
                clock: 0.0,
                buffer: VecDeque::new(),
                buffer_size: *buffer_size,
            },
            TransformDef::MovingAverage { window_size } => Self::MovingAverage {
                window_size: *window_size,
                buffer: Vec::new(),
                index: 0,
                sum: 0.0,
            },
        }
    }

    /// Apply one sample.
    pub fn apply(&mut self, input: f64, dt: f64) -> f64 {
        match self {
            Self::FirstOrderLag {
                tau_s,
                value,
                initialized,
            } => {
                if !*initialized {
                    *value = input;
                    *initialized = true;
                }
                let alpha = dt / (*tau_s + dt);
                *value += alpha * (input - *value);
                *value
            }

            Self::Noise { amplitude, rng } => input + *amplitude * sample_standard_normal(rng),

            Self::Saturation { min, max } => input.clamp(*min, *max),

            Self::Linear {
                scale,
                offset,
                clamp_min,
                clamp_max,
            } => {
                let value = input * *scale + *offset;
                match (clamp_min, clamp_max) {
                    (Some(lo), Some(hi)) => value.clamp(*lo, *hi),
                    _ => value,
                }
            }

            Self::Deadband {
                threshold,
                last_output,
                initialized,
            } => {
                if !*initialized {
                    *last_output = input;
                    *initialized = true;
                    return input;
                }
                if (input - *last_output).abs() > *threshold {
                    *last_output = input;
                }
                *last_output
            }

            Self::RateLimiter {
                max_rate_per_sec,
                last_value,
                initialized,
            } => {
                if !*initialized {
                    *last_value = input;
                    *initialized = true;
                    return input;
                }
                let max_delta = *max_rate_per_sec * dt;
                let delta = input - *last_value;
                if delta > max_delta {
                    *last_value += max_delta;
                } else if delta < -max_delta {
                    *last_value -= max_delta;
                } else {
                    *last_value = input;
                }
                *last_value
            }

            Self::Delay {
                delay_sec,
                clock,
                buffer,
                buffer_size,
            } => {
                *clock += dt;
                buffer.push_back((*clock, input));

                let target_time = *clock - *delay_sec;

                // Drop samples too old to ever be the answer again.
                while buffer
                    .front()
                    .is_some_and(|(time, _)| *time < target_time - dt)
                {
                    buffer.pop_front();
                }
                if let Some(cap) = buffer_size {
                    while buffer.len() > *cap {
                        buffer.pop_front();
                    }
                }

                // Oldest sample at or after the target time; latest if none.
                for (time, value) in buffer.iter() {
                    if *time >= target_time {
                        return *value;
                    }
                }
                buffer.back().map(|(_, value)| *value).unwrap_or(input)
            }

            Self::MovingAverage {
                window_size,
                buffer,
                index,
                sum,
            } => {
                if buffer.is_empty() {
                    // Prime the window with the first sample.
                    buffer.resize(*window_size, input);
                    *sum = input * *window_size as f64;
                    *index = 0;
                    return input;
                }
                *sum -= buffer[*index];
                buffer[*index] = input;
                *sum += input;
                *index = (*index + 1) % *window_size;
                *sum / *window_size as f64
            }
        }
    }
}
