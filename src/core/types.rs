//! Core data types for the positioning engine

use nalgebra::Vector2;
use serde::{Deserialize, Serialize};

/// Identifier of a fixed scanner (anchor)
pub type AnchorId = u32;

/// Identifier of a scanned device, usually its MAC address
pub type DeviceId = String;

/// One validated signal-strength measurement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanReading {
    pub anchor_id: AnchorId,
    pub device_id: DeviceId,
    /// Received power in dBm
    pub signal_strength: f64,
}

/// Distance derived from a [`ScanReading`] through the path-loss model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DerivedDistance {
    pub anchor_id: AnchorId,
    pub device_id: DeviceId,
    pub signal_strength: f64,
    /// Estimated range in meters
    pub distance: f64,
    /// Set when the raw estimate exceeded the plausible range and was capped
    pub clamped: bool,
}

/// Corner of a block, in the canonical order used to index distances
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Corner {
    TopLeft,
    TopRight,
    BottomLeft,
    BottomRight,
}

impl Corner {
    /// Canonical order: A = top left, B = top right, C = bottom left, D = bottom right
    pub const ALL: [Corner; 4] = [
        Corner::TopLeft,
        Corner::TopRight,
        Corner::BottomLeft,
        Corner::BottomRight,
    ];

    pub fn index(self) -> usize {
        match self {
            Corner::TopLeft => 0,
            Corner::TopRight => 1,
            Corner::BottomLeft => 2,
            Corner::BottomRight => 3,
        }
    }

    /// Block-local coordinates of this corner for a block of side `side_length`.
    /// The bottom-left corner is the local origin.
    pub fn local_position(self, side_length: f64) -> Vector2<f64> {
        match self {
            Corner::TopLeft => Vector2::new(0.0, side_length),
            Corner::TopRight => Vector2::new(side_length, side_length),
            Corner::BottomLeft => Vector2::new(0.0, 0.0),
            Corner::BottomRight => Vector2::new(side_length, 0.0),
        }
    }
}

/// Position of a device inside a block
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionEstimate {
    pub device_id: DeviceId,
    pub block_name: String,
    /// Block-local coordinates (meters, bottom-left corner at origin)
    pub x: f64,
    pub y: f64,
    /// Local coordinates shifted by the block origin
    pub world_x: f64,
    pub world_y: f64,
    /// Minimised objective value; near zero for consistent distances
    pub residual: f64,
    pub iterations: usize,
}
