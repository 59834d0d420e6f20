//! Block and corner-anchor topology
//!
//! Blocks are loaded once from configuration and never change. A device is
//! attributed to a block only when the set of anchors reporting it equals the
//! block's four corner anchors exactly.

use crate::core::{AnchorId, Corner, CORNERS_PER_BLOCK};
use crate::validation::error::TopologyError;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::info;

/// Block definition as it appears in configuration files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockConfig {
    pub name: String,
    /// Side length of the square block (meters)
    pub side_length: f64,
    /// Offset of the block's bottom-left corner in site coordinates
    #[serde(default)]
    pub origin_x: f64,
    #[serde(default)]
    pub origin_y: f64,
    /// Corner anchors: top left, top right, bottom left, bottom right
    pub anchors: Vec<AnchorId>,
}

/// Validated block
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    name: String,
    side_length: f64,
    origin: (f64, f64),
    corners: [AnchorId; CORNERS_PER_BLOCK],
}

impl Block {
    /// Validate a single block definition
    pub fn from_config(config: &BlockConfig) -> Result<Self, TopologyError> {
        if config.name.trim().is_empty() {
            return Err(TopologyError::EmptyName);
        }
        if !config.side_length.is_finite() || config.side_length <= 0.0 {
            return Err(TopologyError::InvalidSideLength {
                block: config.name.clone(),
                side_length: config.side_length,
            });
        }
        if !config.origin_x.is_finite() || !config.origin_y.is_finite() {
            return Err(TopologyError::InvalidOrigin {
                block: config.name.clone(),
            });
        }

        let corners: [AnchorId; CORNERS_PER_BLOCK] =
            config
                .anchors
                .as_slice()
                .try_into()
                .map_err(|_| TopologyError::CornerCount {
                    block: config.name.clone(),
                    found: config.anchors.len(),
                })?;

        let mut seen = BTreeSet::new();
        for anchor_id in corners {
            if !seen.insert(anchor_id) {
                return Err(TopologyError::DuplicateCorner {
                    block: config.name.clone(),
                    anchor_id,
                });
            }
        }

        Ok(Self {
            name: config.name.clone(),
            side_length: config.side_length,
            origin: (config.origin_x, config.origin_y),
            corners,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn side_length(&self) -> f64 {
        self.side_length
    }

    pub fn origin(&self) -> (f64, f64) {
        self.origin
    }

    /// Corner anchors in canonical order
    pub fn corners(&self) -> &[AnchorId; CORNERS_PER_BLOCK] {
        &self.corners
    }

    pub fn corner(&self, corner: Corner) -> AnchorId {
        self.corners[corner.index()]
    }

    pub fn corner_set(&self) -> BTreeSet<AnchorId> {
        self.corners.iter().copied().collect()
    }

    pub fn has_anchor(&self, anchor_id: AnchorId) -> bool {
        self.corners.contains(&anchor_id)
    }

    /// Site coordinates of a block-local point
    pub fn to_world(&self, x: f64, y: f64) -> (f64, f64) {
        (self.origin.0 + x, self.origin.1 + y)
    }

    pub fn to_config(&self) -> BlockConfig {
        BlockConfig {
            name: self.name.clone(),
            side_length: self.side_length,
            origin_x: self.origin.0,
            origin_y: self.origin.1,
            anchors: self.corners.to_vec(),
        }
    }
}

/// Static lookup of blocks by name, anchor and exact corner set
#[derive(Debug, Clone, Default)]
pub struct TopologyRegistry {
    blocks: Vec<Block>,
    by_corner_set: HashMap<BTreeSet<AnchorId>, usize>,
    by_anchor: HashMap<AnchorId, usize>,
}

impl TopologyRegistry {
    /// Validate and index a set of blocks. Any error is fatal.
    pub fn new(configs: &[BlockConfig]) -> Result<Self, TopologyError> {
        let mut registry = Self::default();
        let mut names = BTreeSet::new();

        for config in configs {
            let block = Block::from_config(config)?;
            if !names.insert(block.name.clone()) {
                return Err(TopologyError::DuplicateBlockName(block.name));
            }

            let index = registry.blocks.len();
            for &anchor_id in block.corners() {
                if let Some(&other) = registry.by_anchor.get(&anchor_id) {
                    return Err(TopologyError::SharedAnchor {
                        anchor_id,
                        first: registry.blocks[other].name.clone(),
                        second: block.name.clone(),
                    });
                }
                registry.by_anchor.insert(anchor_id, index);
            }
            registry.by_corner_set.insert(block.corner_set(), index);
            registry.blocks.push(block);
        }

        info!(
            blocks = registry.blocks.len(),
            anchors = registry.by_anchor.len(),
            "topology loaded"
        );
        Ok(registry)
    }

    /// Blocks in configuration order
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn block(&self, name: &str) -> Option<&Block> {
        self.blocks.iter().find(|block| block.name == name)
    }

    /// Block whose corner anchors equal `anchors` as a set
    pub fn block_for(&self, anchors: &BTreeSet<AnchorId>) -> Option<&Block> {
        if anchors.len() != CORNERS_PER_BLOCK {
            return None;
        }
        self.by_corner_set.get(anchors).map(|&index| &self.blocks[index])
    }

    /// Block that has `anchor_id` as one of its corners
    pub fn block_of_anchor(&self, anchor_id: AnchorId) -> Option<&Block> {
        self.by_anchor.get(&anchor_id).map(|&index| &self.blocks[index])
    }

    pub fn is_known_anchor(&self, anchor_id: AnchorId) -> bool {
        self.by_anchor.contains_key(&anchor_id)
    }

    pub fn to_configs(&self) -> Vec<BlockConfig> {
        self.blocks.iter().map(Block::to_config).collect()
    }
}
