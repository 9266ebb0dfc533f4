//! Data structures shared by the registry, secure store, and converter.

pub mod backend;
pub mod config_doc;
pub mod conversion;
pub mod legacy;
pub mod settings;
