//! Foundation module - Core utilities and types
//!
//! - Math types and the TRS/projection helpers the scene graph relies on
//! - Logging setup

pub mod math;
pub mod logging;
