//! Small helpers shared by the workspace binaries.

pub mod config;

pub use config::{ConfigError, get_env_var};
