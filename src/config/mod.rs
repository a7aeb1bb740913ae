// src/config/mod.rs

//! Run configuration.
//!
//! - [`model`] is the TOML-backed data model.
//! - [`loader`] reads a file and applies command-line overrides.
//! - [`validate`] turns a `RawConfigFile` into a checked `ConfigFile`.

pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{ConfigOverrides, default_config_path, load_and_validate, load_from_path};
pub use model::{
    ConfigFile, ConfigSection, InputSpec, JobTemplate, NotifySection, RawConfigFile, SgeSection,
    TaskTemplate, ThreadConfig, Timing,
};
