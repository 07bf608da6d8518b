// src/config/mod.rs

//! Configuration loading.
//!
//! - [`model`] holds the raw TOML mapping and the validated `ConfigFile`.
//! - [`validate`] turns one into the other and builds isolation chains.
//! - [`loader`] reads files from disk.
//! - [`duration`] parses `"5s"`-style duration strings.

pub mod duration;
pub mod loader;
pub mod model;
pub mod validate;

pub use loader::{default_config_path, load_and_validate, load_from_path, load_or_default};
pub use model::{ConfigFile, IsolationSection, RawConfigFile};
