//! Configuration module for modelpull
//!
//! Loads config from `$XDG_CONFIG_HOME/modelpull/config.toml` or `~/.config/modelpull/config.toml`.
//! Falls back to built-in defaults if the file doesn't exist.
//! Partial configs are merged with defaults using serde's default attributes.
//!
//! # Example
//!
//! ```no_run
//! use modelpull::config::Config;
//!
//! let config = Config::load().expect("Failed to load config");
//! println!("Models dir: {}", config.models_dir().unwrap().display());
//! println!("Hub revision: {}", config.hub.revision);
//! ```

pub mod schema;

pub use schema::Config;
