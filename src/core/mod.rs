//! Core types: errors, configuration, target paths.

pub mod config;
pub mod errors;
pub mod paths;
