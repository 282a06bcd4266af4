//! Configuration, errors and logging shared by every module

pub mod config;
pub mod error;
pub mod logging;
pub mod paths;

pub use error::{Error, Result};
