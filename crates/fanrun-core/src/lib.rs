//! `fanrun` Core Library
//!
//! Bounded-concurrency subprocess execution:
//! - Launching argv vectors directly (no shell) up to an in-flight cap
//! - Multiplexing child stdout/stderr pipes with a single `poll(2)` wait
//! - Per-process and aggregate timeouts with forced termination
//! - Non-blocking reaping with a final output drain
//! - Structured per-command results
//!
//! The engine is single-threaded: one [`Engine::run`] call drives one
//! cooperative loop, and parallelism comes from the child processes.

pub mod batch;
pub mod config;
pub mod engine;
pub mod error;
pub mod hooks;
mod launch;
mod multiplex;
mod reap;
pub mod result;
mod state;
pub mod subprocess;
mod timeout;
pub mod tracing_init;

pub use config::EngineConfig;
pub use engine::Engine;
pub use error::{Error, Result};
pub use result::{CommandResult, ExitState};
pub use subprocess::{Stream, Subprocess};
