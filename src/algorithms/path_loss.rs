//! Log-distance path-loss model
//!
//! Converts a received signal strength into a range estimate:
//!
//! `d = 10 ^ ((P_t - P_r - L_f) / (10 * n))`
//!
//! where `P_t` is the transmit power, `P_r` the measured power, `L_f` the fixed
//! losses and `n` the path-loss exponent.

use crate::core::{
    DEFAULT_FIXED_LOSS_DB, DEFAULT_MAX_DISTANCE_M, DEFAULT_PATH_LOSS_EXPONENT,
    DEFAULT_TX_POWER_DBM,
};
use serde::{Deserialize, Serialize};

/// Path-loss model parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PathLossModel {
    /// Transmit power (dBm)
    pub tx_power_dbm: f64,
    /// Path-loss exponent
    pub path_loss_exponent: f64,
    /// Fixed losses (dB)
    pub fixed_loss_db: f64,
    /// Ceiling above which estimates are clamped and flagged (meters)
    pub max_distance_m: f64,
}

/// Range estimate with a data-quality flag
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeEstimate {
    pub distance: f64,
    pub clamped: bool,
}

impl Default for PathLossModel {
    fn default() -> Self {
        Self {
            tx_power_dbm: DEFAULT_TX_POWER_DBM,
            path_loss_exponent: DEFAULT_PATH_LOSS_EXPONENT,
            fixed_loss_db: DEFAULT_FIXED_LOSS_DB,
            max_distance_m: DEFAULT_MAX_DISTANCE_M,
        }
    }
}

impl PathLossModel {
    pub fn new(tx_power_dbm: f64, path_loss_exponent: f64, fixed_loss_db: f64) -> Self {
        Self {
            tx_power_dbm,
            path_loss_exponent,
            fixed_loss_db,
            ..Self::default()
        }
    }

    pub fn with_max_distance(mut self, max_distance_m: f64) -> Self {
        self.max_distance_m = max_distance_m;
        self
    }

    /// Unclamped distance for a signal strength in dBm
    pub fn distance(&self, signal_strength: f64) -> f64 {
        let exponent =
            (self.tx_power_dbm - signal_strength - self.fixed_loss_db) / (10.0 * self.path_loss_exponent);
        10f64.powf(exponent)
    }

    /// Distance capped at `max_distance_m`, flagged when the cap applied
    pub fn estimate(&self, signal_strength: f64) -> RangeEstimate {
        let distance = self.distance(signal_strength);
        if distance > self.max_distance_m || !distance.is_finite() {
            RangeEstimate {
                distance: self.max_distance_m,
                clamped: true,
            }
        } else {
            RangeEstimate {
                distance,
                clamped: false,
            }
        }
    }

    /// Signal strength the model predicts at `distance` meters
    pub fn signal_strength_at(&self, distance: f64) -> f64 {
        self.tx_power_dbm - self.fixed_loss_db - 10.0 * self.path_loss_exponent * distance.log10()
    }

    /// Parameter problems that make the model unusable
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        if !self.path_loss_exponent.is_finite() || self.path_loss_exponent <= 0.0 {
            problems.push(format!(
                "path_loss_exponent must be positive, got {}",
                self.path_loss_exponent
            ));
        }
        if !self.tx_power_dbm.is_finite() {
            problems.push("tx_power_dbm must be finite".to_string());
        }
        if !self.fixed_loss_db.is_finite() {
            problems.push("fixed_loss_db must be finite".to_string());
        }
        if !self.max_distance_m.is_finite() || self.max_distance_m <= 0.0 {
            problems.push(format!(
                "max_distance_m must be positive, got {}",
                self.max_distance_m
            ));
        }
        problems
    }
}
