//! Core utilities for the frameloop renderer.
//!
//! This crate provides foundational types used across the workspace:
//! - Error types and result aliases
//! - Logging initialization
//! - Frame timing statistics
//! - Configuration loading

pub mod config;
mod error;
mod logging;
mod timer;

pub use config::{AppConfig, ConfigSource};
pub use error::{Error, Result};
pub use logging::{DEFAULT_LOG_FILTER, init_logging};
pub use timer::{FrameStats, FrameTimer};
