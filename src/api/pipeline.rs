//! Positioning pass over every known device
//!
//! For each block in configuration order, every device whose reporting
//! anchors equal that block's corners exactly is solved. Devices that match no
//! block, lack a distance or fail to converge are skipped, never fatal.

use crate::algorithms::multilateration::BlockSolver;
use crate::core::{AnchorId, Corner, DeviceId, PositionEstimate, CORNERS_PER_BLOCK};
use crate::processing::aggregator::AggregatorState;
use crate::validation::error::{PositioningError, Result};
use crate::validation::topology::{Block, TopologyRegistry};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Why a device produced no estimate in a pass
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// Reporting anchors are not exactly one block's corners
    AnchorMismatch { anchors: Vec<AnchorId> },
    /// A corner distance was missing from the snapshot
    MissingDistance(PositioningError),
    /// A corner distance was clamped by the path-loss model
    ImplausibleDistance { anchor_id: AnchorId, distance: f64 },
    /// The solver rejected the inputs or did not converge
    SolverDivergence(PositioningError),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedDevice {
    pub device_id: DeviceId,
    pub block_name: Option<String>,
    pub reason: SkipReason,
}

/// Result of one positioning pass
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositioningPass {
    /// Block-major, device-minor order
    pub estimates: Vec<PositionEstimate>,
    pub skipped: Vec<SkippedDevice>,
    /// Aggregator generation the pass was computed from
    pub generation: u64,
}

impl PositioningPass {
    /// Devices whose anchor set matched no block
    pub fn unlocatable(&self) -> impl Iterator<Item = &SkippedDevice> {
        self.skipped
            .iter()
            .filter(|s| matches!(s.reason, SkipReason::AnchorMismatch { .. }))
    }

    /// Devices that matched a block but could not be solved
    pub fn failures(&self) -> impl Iterator<Item = &SkippedDevice> {
        self.skipped
            .iter()
            .filter(|s| !matches!(s.reason, SkipReason::AnchorMismatch { .. }))
    }
}

/// Orchestrates block attribution, distance lookup and solving
#[derive(Debug, Clone)]
pub struct PositionPipeline {
    registry: Arc<TopologyRegistry>,
    solver: BlockSolver,
}

impl PositionPipeline {
    pub fn new(registry: Arc<TopologyRegistry>, solver: BlockSolver) -> Self {
        Self { registry, solver }
    }

    pub fn registry(&self) -> &TopologyRegistry {
        &self.registry
    }

    pub fn solver(&self) -> &BlockSolver {
        &self.solver
    }

    /// Estimates only; skipped devices are dropped
    pub fn compute_positions(&self, state: &AggregatorState) -> Vec<PositionEstimate> {
        self.run(state).estimates
    }

    /// Full pass with skip diagnostics
    pub fn run(&self, state: &AggregatorState) -> PositioningPass {
        let start = Instant::now();
        let mut pass = PositioningPass {
            generation: state.generation(),
            ..PositioningPass::default()
        };

        // Devices sorted by id, grouped under the block they belong to
        let mut per_block: Vec<Vec<DeviceId>> = vec![Vec::new(); self.registry.len()];
        let reporting: BTreeMap<DeviceId, _> = state.reporting_index().into_iter().collect();

        for (device_id, anchors) in reporting {
            match self.block_index(&anchors) {
                Some(index) => per_block[index].push(device_id),
                None => {
                    debug!(device = %device_id, ?anchors, "device matches no block");
                    pass.skipped.push(SkippedDevice {
                        device_id,
                        block_name: None,
                        reason: SkipReason::AnchorMismatch {
                            anchors: anchors.into_iter().collect(),
                        },
                    });
                }
            }
        }

        for (block, devices) in self.registry.blocks().iter().zip(per_block) {
            for device_id in devices {
                match self.locate(block, &device_id, state) {
                    Ok(estimate) => pass.estimates.push(estimate),
                    Err(reason) => {
                        warn!(device = %device_id, block = block.name(), ?reason, "device not positioned");
                        pass.skipped.push(SkippedDevice {
                            device_id,
                            block_name: Some(block.name().to_string()),
                            reason,
                        });
                    }
                }
            }
        }

        info!(
            generation = pass.generation,
            positioned = pass.estimates.len(),
            skipped = pass.skipped.len(),
            elapsed_us = start.elapsed().as_micros() as u64,
            "positioning pass complete"
        );
        pass
    }

    /// Solve one device already attributed to `block`
    pub fn locate(
        &self,
        block: &Block,
        device_id: &str,
        state: &AggregatorState,
    ) -> std::result::Result<PositionEstimate, SkipReason> {
        let distances = Self::corner_distances(block, device_id, state)?;

        let solution = self
            .solver
            .solve(block.side_length(), distances)
            .map_err(SkipReason::SolverDivergence)?;
        let (world_x, world_y) = block.to_world(solution.x, solution.y);

        Ok(PositionEstimate {
            device_id: device_id.to_string(),
            block_name: block.name().to_string(),
            x: solution.x,
            y: solution.y,
            world_x,
            world_y,
            residual: solution.residual,
            iterations: solution.iterations,
        })
    }

    /// Distances to the block corners in canonical order
    fn corner_distances(
        block: &Block,
        device_id: &str,
        state: &AggregatorState,
    ) -> std::result::Result<[f64; CORNERS_PER_BLOCK], SkipReason> {
        let mut distances = [0.0; CORNERS_PER_BLOCK];
        for corner in Corner::ALL {
            let anchor_id = block.corner(corner);
            let reading = state
                .reading_for(device_id, anchor_id)
                .map_err(SkipReason::MissingDistance)?;
            if reading.clamped {
                return Err(SkipReason::ImplausibleDistance {
                    anchor_id,
                    distance: reading.distance,
                });
            }
            distances[corner.index()] = reading.distance;
        }
        Ok(distances)
    }

    fn block_index(&self, anchors: &std::collections::BTreeSet<AnchorId>) -> Option<usize> {
        let block = self.registry.block_for(anchors)?;
        self.registry
            .blocks()
            .iter()
            .position(|candidate| candidate.name() == block.name())
    }
}

/// Convenience for callers that want a hard error when a specific device
/// cannot be positioned
pub fn require_estimate(pass: &PositioningPass, device_id: &str) -> Result<PositionEstimate> {
    if let Some(estimate) = pass.estimates.iter().find(|e| e.device_id == device_id) {
        return Ok(estimate.clone());
    }
    match pass.skipped.iter().find(|s| s.device_id == device_id) {
        Some(SkippedDevice {
            reason: SkipReason::MissingDistance(err) | SkipReason::SolverDivergence(err),
            ..
        }) => Err(err.clone()),
        Some(SkippedDevice {
            reason: SkipReason::AnchorMismatch { anchors },
            ..
        }) => Err(PositioningError::AnchorMismatch {
            device_id: device_id.to_string(),
            anchors: anchors.clone(),
        }),
        Some(SkippedDevice {
            reason: SkipReason::ImplausibleDistance { anchor_id, distance },
            ..
        }) => Err(PositioningError::InvalidSolverInput {
            reason: format!(
                "distance {:.1} m from anchor {} exceeds the plausible range",
                distance, anchor_id
            ),
        }),
        None => Err(PositioningError::AnchorMismatch {
            device_id: device_id.to_string(),
            anchors: Vec::new(),
        }),
    }
}
