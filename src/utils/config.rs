use crate::algorithms::multilateration::BlockSolver;
use crate::algorithms::path_loss::PathLossModel;
use crate::validation::error::TopologyError;
use crate::validation::topology::{BlockConfig, TopologyRegistry};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;

/// System-wide configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SystemConfig {
    /// RSSI to distance conversion
    pub path_loss: PathLossModel,
    /// Minimiser budget and tolerances
    pub solver: BlockSolver,
    /// Blocks and their corner anchors
    pub blocks: Vec<BlockConfig>,
    /// Default tracing filter when RUST_LOG is unset
    pub log_filter: String,
}

/// Configuration errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("Invalid parameter '{parameter}' = '{value}': {reason}")]
    InvalidParameter {
        parameter: String,
        value: String,
        reason: String,
    },
    #[error("I/O error: {message}")]
    IoError { message: String },
    #[error("Serialization error: {message}")]
    SerializationError { message: String },
    #[error(transparent)]
    Topology(#[from] TopologyError),
}

/// Configuration validation result
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<ConfigError>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            path_loss: PathLossModel::default(),
            solver: BlockSolver::default(),
            blocks: vec![
                BlockConfig {
                    name: "A".to_string(),
                    side_length: 10.0,
                    origin_x: 0.0,
                    origin_y: 0.0,
                    anchors: vec![1001, 1002, 1003, 1004],
                },
                BlockConfig {
                    name: "B".to_string(),
                    side_length: 10.0,
                    origin_x: 10.0,
                    origin_y: 10.0,
                    anchors: vec![1005, 1006, 1007, 1008],
                },
            ],
            log_filter: "info".to_string(),
        }
    }
}

impl SystemConfig {
    /// Load and validate a JSON configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let content = fs::read_to_string(&path).map_err(|e| ConfigError::IoError {
            message: format!("Failed to read config file '{}': {}", path_str, e),
        })?;

        let config: SystemConfig = serde_json::from_str(&content).map_err(|e| ConfigError::SerializationError {
            message: format!("Failed to parse config file '{}': {}", path_str, e),
        })?;

        let report = config.validate();
        if let Some(error) = report.errors.into_iter().next() {
            return Err(error);
        }
        for warning in &report.warnings {
            tracing::warn!(config = %path_str, "{}", warning);
        }

        Ok(config)
    }

    /// Save configuration as pretty-printed JSON
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), ConfigError> {
        let path_str = path.as_ref().to_string_lossy().to_string();

        let content = serde_json::to_string_pretty(self).map_err(|e| ConfigError::SerializationError {
            message: format!("Failed to serialize config: {}", e),
        })?;

        fs::write(&path, content).map_err(|e| ConfigError::IoError {
            message: format!("Failed to write config file '{}': {}", path_str, e),
        })
    }

    /// Build the block registry; topology errors are fatal
    pub fn topology(&self) -> Result<TopologyRegistry, ConfigError> {
        Ok(TopologyRegistry::new(&self.blocks)?)
    }

    pub fn validate(&self) -> ValidationReport {
        let mut report = ValidationReport::default();

        for problem in self.path_loss.validate() {
            report.errors.push(ConfigError::InvalidParameter {
                parameter: "path_loss".to_string(),
                value: format!("{:?}", self.path_loss),
                reason: problem,
            });
        }
        if self.path_loss.path_loss_exponent.is_finite()
            && !(1.5..=6.0).contains(&self.path_loss.path_loss_exponent)
        {
            report.warnings.push(format!(
                "Path-loss exponent {} is outside the usual indoor range 1.5-6.0",
                self.path_loss.path_loss_exponent
            ));
        }

        if self.solver.max_iterations == 0 {
            report.errors.push(ConfigError::InvalidParameter {
                parameter: "solver.max_iterations".to_string(),
                value: "0".to_string(),
                reason: "At least one iteration is required".to_string(),
            });
        } else if self.solver.max_iterations > 10_000 {
            report
                .warnings
                .push("Very large iteration budget may stall a positioning pass".to_string());
        }
        if !(self.solver.gradient_tolerance > 0.0) {
            report.errors.push(ConfigError::InvalidParameter {
                parameter: "solver.gradient_tolerance".to_string(),
                value: self.solver.gradient_tolerance.to_string(),
                reason: "Tolerance must be positive".to_string(),
            });
        }
        if !(self.solver.min_step > 0.0 && self.solver.min_step < 1.0) {
            report.errors.push(ConfigError::InvalidParameter {
                parameter: "solver.min_step".to_string(),
                value: self.solver.min_step.to_string(),
                reason: "Minimum step must lie in (0, 1)".to_string(),
            });
        }
        if !(self.solver.armijo_constant > 0.0 && self.solver.armijo_constant < 1.0) {
            report.errors.push(ConfigError::InvalidParameter {
                parameter: "solver.armijo_constant".to_string(),
                value: self.solver.armijo_constant.to_string(),
                reason: "Armijo constant must lie in (0, 1)".to_string(),
            });
        }

        if let Err(e) = TopologyRegistry::new(&self.blocks) {
            report.errors.push(ConfigError::Topology(e));
        }
        if self.blocks.is_empty() {
            report
                .warnings
                .push("No blocks configured; no device can be positioned".to_string());
        }
        for block in &self.blocks {
            let diagonal = block.side_length * std::f64::consts::SQRT_2;
            if diagonal > self.path_loss.max_distance_m {
                report.warnings.push(format!(
                    "Block '{}' diagonal {:.1} m exceeds the distance ceiling {:.1} m",
                    block.name, diagonal, self.path_loss.max_distance_m
                ));
            }
        }

        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_matches_site() {
        let config = SystemConfig::default();
        assert_eq!(config.path_loss.tx_power_dbm, -20.0);
        assert_eq!(config.path_loss.path_loss_exponent, 4.0);
        assert_eq!(config.path_loss.fixed_loss_db, 3.0);
        assert_eq!(config.blocks.len(), 2);
        assert_eq!(config.blocks[1].anchors, vec![1005, 1006, 1007, 1008]);

        let report = config.validate();
        assert!(report.is_valid(), "{:?}", report.errors);
        assert!(report.warnings.is_empty());
        assert_eq!(config.topology().unwrap().len(), 2);
    }

    #[test]
    fn test_config_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("positioning.json");

        let mut config = SystemConfig::default();
        config.path_loss.path_loss_exponent = 3.2;
        config.solver.max_iterations = 75;
        config.save_to_file(&path).unwrap();

        let loaded = SystemConfig::from_file(&path).unwrap();
        assert_eq!(loaded, config);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("partial.json");
        fs::write(
            &path,
            r#"{"blocks": [{"name": "Hall", "side_length": 8.0, "anchors": [1, 2, 3, 4]}]}"#,
        )
        .unwrap();

        let config = SystemConfig::from_file(&path).unwrap();
        assert_eq!(config.path_loss, PathLossModel::default());
        assert_eq!(config.blocks[0].origin_x, 0.0);
        assert_eq!(config.topology().unwrap().block("Hall").unwrap().side_length(), 8.0);
    }

    #[test]
    fn test_overlapping_topology_is_fatal_at_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overlap.json");
        fs::write(
            &path,
            r#"{"blocks": [
                {"name": "A", "side_length": 10.0, "anchors": [1, 2, 3, 4]},
                {"name": "B", "side_length": 10.0, "anchors": [4, 5, 6, 7]}
            ]}"#,
        )
        .unwrap();

        let err = SystemConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Topology(TopologyError::SharedAnchor { anchor_id: 4, .. })));
    }

    #[test]
    fn test_invalid_parameters_reported() {
        let mut config = SystemConfig::default();
        config.path_loss.path_loss_exponent = -1.0;
        config.solver.max_iterations = 0;
        config.solver.gradient_tolerance = 0.0;

        let report = config.validate();
        assert!(!report.is_valid());
        assert_eq!(report.errors.len(), 3);
    }

    #[test]
    fn test_small_distance_ceiling_warns() {
        let mut config = SystemConfig::default();
        config.path_loss.max_distance_m = 12.0;

        let report = config.validate();
        assert!(report.is_valid());
        assert_eq!(report.warnings.len(), 2);
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = SystemConfig::from_file("/nonexistent/positioning.json").unwrap_err();
        assert!(matches!(err, ConfigError::IoError { .. }));
    }
}
