//! # Core Runtime Module
//!
//! Foundational runtime infrastructure shared by the download and playback core:
//! - Logging and tracing bootstrap
//! - Configuration with fail-fast bridge validation
//! - Typed event bus

pub mod config;
pub mod error;
pub mod events;
pub mod logging;

pub use error::{Error, Result};
