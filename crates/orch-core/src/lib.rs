//! Facade (C10): the one stateful entry point that wires the Schema
//! Registry, Session Store, Artifact Repositories, Scheduler, Dispatcher,
//! Gate DSL, and Evidence Linker into a single session-bound API.

mod config;
mod error;
mod facade;

pub use config::OrchConfig;
pub use error::FacadeError;
pub use facade::{AdvanceOutcome, Facade};
