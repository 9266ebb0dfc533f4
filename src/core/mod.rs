//! Core business logic modules.

pub mod config;
pub mod convert;
pub mod default_vault;
pub mod factory;
pub mod file_lock;
pub mod invalid_vault;
pub mod legacy_read;
pub mod os_store;
pub mod overrides;
pub mod paths;
pub mod registry;
pub mod schema;
pub mod secure;
pub mod vault;
