//! Error classification for the positioning engine

use crate::core::{AnchorId, DeviceId};
use thiserror::Error;

/// Result alias used across the engine
pub type Result<T> = std::result::Result<T, PositioningError>;

/// Errors raised by ingestion, lookup, solving and topology loading
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PositioningError {
    /// A batch entry could not be turned into a reading; the entry is skipped
    #[error("malformed reading at batch index {index}: {reason}")]
    MalformedReading { index: usize, reason: MalformedReason },

    /// The device's reporting anchors do not form any configured block
    #[error("device {device_id} seen by anchors {anchors:?} matches no block")]
    AnchorMismatch {
        device_id: DeviceId,
        anchors: Vec<AnchorId>,
    },

    /// No current reading from this anchor for this device
    #[error("anchor {anchor_id} has no reading for device {device_id}")]
    NotFound {
        device_id: DeviceId,
        anchor_id: AnchorId,
    },

    /// The minimiser exhausted its budget or produced a non-finite objective
    #[error(
        "solver did not converge after {iterations} iterations \
         (gradient norm {gradient_norm:.3e}, objective {objective:.3e}): {cause}"
    )]
    SolverDivergence {
        iterations: usize,
        gradient_norm: f64,
        objective: f64,
        cause: DivergenceCause,
    },

    /// Solver inputs rejected before iterating
    #[error("invalid solver input: {reason}")]
    InvalidSolverInput { reason: String },

    /// Configuration-time topology error; fatal
    #[error("invalid topology: {0}")]
    InvalidTopology(#[from] TopologyError),
}

/// Why a batch entry was rejected
#[derive(Debug, Clone, PartialEq, Error)]
pub enum MalformedReason {
    #[error("missing device id")]
    MissingDeviceId,
    #[error("empty device id")]
    EmptyDeviceId,
    #[error("device id {0} is not a string or number")]
    InvalidDeviceId(String),
    #[error("missing signal strength")]
    MissingSignalStrength,
    #[error("non-numeric signal strength {0}")]
    NonNumericSignalStrength(String),
    #[error("non-finite signal strength")]
    NonFiniteSignalStrength,
    #[error("entry declares scanner {declared} inside a batch from anchor {batch}")]
    ScannerConflict { declared: String, batch: AnchorId },
}

/// How the minimiser failed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DivergenceCause {
    IterationBudget,
    LineSearchFailed,
    NonFiniteObjective,
}

impl std::fmt::Display for DivergenceCause {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DivergenceCause::IterationBudget => write!(f, "iteration budget exhausted"),
            DivergenceCause::LineSearchFailed => write!(f, "line search failed"),
            DivergenceCause::NonFiniteObjective => write!(f, "objective became non-finite"),
        }
    }
}

/// Block topology validation failures
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TopologyError {
    #[error("block name must not be empty")]
    EmptyName,
    #[error("block '{0}' is defined more than once")]
    DuplicateBlockName(String),
    #[error("block '{block}' has side length {side_length}, must be positive and finite")]
    InvalidSideLength { block: String, side_length: f64 },
    #[error("block '{block}' has a non-finite origin offset")]
    InvalidOrigin { block: String },
    #[error("block '{block}' lists {found} corner anchors, exactly 4 required")]
    CornerCount { block: String, found: usize },
    #[error("block '{block}' lists anchor {anchor_id} for more than one corner")]
    DuplicateCorner { block: String, anchor_id: AnchorId },
    #[error("anchor {anchor_id} is a corner of both '{first}' and '{second}'")]
    SharedAnchor {
        anchor_id: AnchorId,
        first: String,
        second: String,
    },
}

impl PositioningError {
    /// Short stable name for log fields and skip statistics
    pub fn kind(&self) -> &'static str {
        match self {
            PositioningError::MalformedReading { .. } => "MalformedReading",
            PositioningError::AnchorMismatch { .. } => "AnchorMismatch",
            PositioningError::NotFound { .. } => "NotFound",
            PositioningError::SolverDivergence { .. } => "SolverDivergence",
            PositioningError::InvalidSolverInput { .. } => "InvalidSolverInput",
            PositioningError::InvalidTopology(_) => "InvalidTopology",
        }
    }

    /// Whether the error must stop the engine from serving
    pub fn is_fatal(&self) -> bool {
        matches!(self, PositioningError::InvalidTopology(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_topology_errors_are_fatal() {
        let topology = PositioningError::from(TopologyError::EmptyName);
        assert!(topology.is_fatal());
        assert_eq!(topology.kind(), "InvalidTopology");

        let skipped = PositioningError::MalformedReading {
            index: 2,
            reason: MalformedReason::MissingDeviceId,
        };
        assert!(!skipped.is_fatal());

        let divergence = PositioningError::SolverDivergence {
            iterations: 10,
            gradient_norm: 1.0,
            objective: 2.0,
            cause: DivergenceCause::IterationBudget,
        };
        assert!(!divergence.is_fatal());
    }

    #[test]
    fn test_error_messages_name_the_offender() {
        let err = PositioningError::NotFound {
            device_id: "aa:bb".to_string(),
            anchor_id: 1003,
        };
        assert_eq!(err.to_string(), "anchor 1003 has no reading for device aa:bb");

        let err = PositioningError::MalformedReading {
            index: 1,
            reason: MalformedReason::NonNumericSignalStrength("\"strong\"".to_string()),
        };
        assert!(err.to_string().contains("index 1"));
        assert!(err.to_string().contains("strong"));

        let err = TopologyError::SharedAnchor {
            anchor_id: 1002,
            first: "A".to_string(),
            second: "B".to_string(),
        };
        assert_eq!(err.to_string(), "anchor 1002 is a corner of both 'A' and 'B'");
    }
}
