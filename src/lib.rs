//! workshed library crate — re-exports for integration tests.
//!
//! The primary interface is the `workshed` binary. This lib.rs exposes the
//! store, capture engine, and model types so that integration tests can
//! exercise them directly without going through the CLI.

pub mod capture;
pub mod cli;
pub mod config;
pub mod deadline;
pub mod error;
pub mod exec;
pub mod executions;
pub mod format;
pub mod git;
pub mod handle;
pub mod model;
pub mod store;
pub mod telemetry;


pub use error::{Result, WorkshedError};
