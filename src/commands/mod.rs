//! Top-level workflows invoked from the CLI.

pub mod up;

pub use up::{GcpUp, GcpUpDeps, UpConfig};
