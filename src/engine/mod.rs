// 8.0: risk core engine. wires the position store, adl queue and funding book together
// behind role checks and pause/circuit gates. deterministic, the clock is set by the caller.

mod admin;
mod config;
mod core;
mod deleverage;
mod funding;
mod positions;
mod pricing;
mod results;

pub use config::EngineConfig;
pub use core::Engine;
pub use results::{EngineError, ErrorKind, RefreshResult};
