//! rig-engine: simulation backends and the fixed-rate physics ticker.
//!
//! The [`Engine`] is a closed set of backends behind one tick interface; the
//! [`Ticker`] drives it on a phase-stable schedule; the [`RuleEngine`]
//! translates threshold crossings into device function calls; the
//! [`PhysicsRuntime`] owns the start/stop lifecycle.

pub mod engine;
pub mod rules;
pub mod runtime;
pub mod schedule;
pub mod ticker;

pub use engine::{
    AdapterError, Command, Engine, LocalEngine, PhysicsEngine, ProtocolAdapter, RemoteEngine,
    TickResult,
};
pub use rules::RuleEngine;
pub use runtime::PhysicsRuntime;
pub use schedule::TickSchedule;
pub use ticker::Ticker;
