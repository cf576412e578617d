//! CLI commands for the pairmaker engine.

pub mod preflight;
pub mod run;

pub use preflight::{run as run_preflight, PreflightArgs};
pub use run::{run as run_live, RunArgs};
