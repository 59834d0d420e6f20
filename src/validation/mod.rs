//! Error types and topology validation

pub mod error;
pub mod topology;

pub use error::{PositioningError, TopologyError};
pub use topology::{Block, BlockConfig, TopologyRegistry};
