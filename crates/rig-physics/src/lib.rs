//! rig-physics: the simulation core.
//!
//! - [`SignalRegistry`]: thread-safe arbiter between physics-computed and
//!   device-authoritative signal values.
//! - [`TransformState`]: the eight per-edge transform primitives.
//! - [`PhysicsModel`] / [`ThermalMassModel`]: lumped physical models.
//! - [`PhysicsCore`]: one tick of signal-graph evaluation and model updates.

pub mod core;
pub mod model;
pub mod registry;
pub mod thermal;
pub mod transform;

pub use crate::core::{PhysicsCore, StepOutput};
pub use model::{create_model, PhysicsModel};
pub use registry::SignalRegistry;
pub use thermal::ThermalMassModel;
pub use transform::{sample_standard_normal, TransformState};

pub type PhysicsResult<T> = Result<T, PhysicsError>;

#[derive(thiserror::Error, Debug)]
pub enum PhysicsError {
    #[error("unknown model type: {kind}")]
    UnknownModelType { kind: String },

    #[error("model '{model}': {what}")]
    ModelParam { model: String, what: String },
}
