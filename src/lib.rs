#![allow(clippy::multiple_crate_versions)]

pub mod config;
pub mod error;
pub mod models;
pub mod quant;

pub use error::{PullError, Result};
