//! Radio model and solver defaults

/// Transmit power assumed for scanned devices (dBm)
pub const DEFAULT_TX_POWER_DBM: f64 = -20.0;

/// Path-loss exponent for indoor environments
pub const DEFAULT_PATH_LOSS_EXPONENT: f64 = 4.0;

/// Fixed losses (cabling, antenna, body shadowing) in dB
pub const DEFAULT_FIXED_LOSS_DB: f64 = 3.0;

/// Distances above this ceiling are treated as implausible (meters)
pub const DEFAULT_MAX_DISTANCE_M: f64 = 100.0;

/// Number of corner anchors in every block
pub const CORNERS_PER_BLOCK: usize = 4;
