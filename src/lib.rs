//! Block Positioning Engine
//!
//! Locates Bluetooth devices inside square blocks that carry a fixed scanner
//! (anchor) at each corner. Anchors report batches of signal-strength
//! readings; each reading becomes a range estimate through a log-distance
//! path-loss model, and a device seen by exactly one block's four corners is
//! positioned by minimising the circle-equation residuals.

pub mod core;
pub mod algorithms;
pub mod processing;
pub mod validation;
pub mod utils;
pub mod api;

// Re-export commonly used types
pub use core::{AnchorId, Corner, DerivedDistance, DeviceId, PositionEstimate, ScanReading};
pub use algorithms::{BlockSolver, PathLossModel};
pub use processing::{ScanAggregator, ScanEntry};
pub use validation::{BlockConfig, PositioningError, TopologyError, TopologyRegistry};
pub use utils::SystemConfig;
pub use api::{OutputFormat, PositionPipeline, PositioningPass, PositioningService};
