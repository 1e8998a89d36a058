//! Foundation module - Core utilities and types
//!
//! - Math types and fixed-size transform helpers
//! - Logging setup

pub mod math;
pub mod logging;
