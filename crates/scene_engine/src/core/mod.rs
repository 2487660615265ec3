//! # Core Module
//!
//! Shared configuration types used by the renderer and the binaries that
//! drive it.

pub mod config;

pub use config::{
    RendererConfig,
    ShaderPrecision,
    ClearMask,
};
pub use crate::config::{Config, ConfigError};
