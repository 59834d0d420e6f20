//! Core types and constants for the block positioning engine

pub mod types;
pub mod constants;

pub use types::*;
pub use constants::*;
