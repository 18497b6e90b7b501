//! Foundation module - Core utilities shared by every subsystem
//!
//! - Content hashing with a fixed seed
//! - Logging setup

pub mod hash;
pub mod logging;
