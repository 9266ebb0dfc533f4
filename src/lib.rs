//! Secure credential storage for a layered-configuration CLI.
//!
//! Secure profile properties are kept out of the configuration files and
//! stored through a pluggable credential manager, by default the operating
//! system keychain. Legacy per-type profile trees can be converted into the
//! layered format, moving their secrets along.
//!
//! ## Modules
//! - `cli`: Command-line handlers
//! - `core`: Credential managers, configuration layers, conversion
//! - `models`: Data structures
//! - `util`: Filesystem helpers

pub mod cli;
pub mod constants;
pub mod core;
pub mod error;
pub mod models;
pub mod util;
