//! Positioning service
//!
//! Owns the scan aggregator and the positioning pipeline. Scanner callbacks
//! call [`PositioningService::ingest`] from any thread; a positioning pass works
//! on a snapshot, so ingestion is never blocked by solving.

use crate::algorithms::multilateration::BlockSolver;
use crate::algorithms::path_loss::PathLossModel;
use crate::api::formatting::{render, OutputFormat, PositionFormatter};
use crate::api::pipeline::{PositionPipeline, PositioningPass};
use crate::core::{AnchorId, PositionEstimate};
use crate::processing::aggregator::{IngestReport, ScanAggregator};
use crate::processing::parser::{parse_batch, ParseError, ScanBatch, ScanEntry};
use crate::utils::config::{ConfigError, SystemConfig};
use crate::validation::topology::TopologyRegistry;
use std::sync::Arc;
use tracing::warn;

/// Ingestion and positioning behind one handle
#[derive(Debug, Clone)]
pub struct PositioningService {
    aggregator: Arc<ScanAggregator>,
    pipeline: PositionPipeline,
}

impl PositioningService {
    pub fn new(registry: TopologyRegistry, model: PathLossModel, solver: BlockSolver) -> Self {
        Self {
            aggregator: Arc::new(ScanAggregator::new(model)),
            pipeline: PositionPipeline::new(Arc::new(registry), solver),
        }
    }

    /// Build from a validated configuration; topology errors are fatal
    pub fn from_config(config: &SystemConfig) -> Result<Self, ConfigError> {
        let report = config.validate();
        if let Some(error) = report.errors.into_iter().next() {
            return Err(error);
        }
        Ok(Self::new(config.topology()?, config.path_loss, config.solver))
    }

    /// Replace `anchor_id`'s batch. Anchors outside every block are still
    /// stored; devices they see simply never match a block.
    pub fn ingest(&self, anchor_id: AnchorId, batch: &[ScanEntry]) -> IngestReport {
        if !self.pipeline.registry().is_known_anchor(anchor_id) {
            warn!(anchor_id, "batch from anchor outside every configured block");
        }
        self.aggregator.ingest(anchor_id, batch)
    }

    /// Parse and ingest a raw JSON batch. Only an unparseable payload is an
    /// error; bad entries are reported per entry.
    pub fn ingest_json(&self, anchor_id: AnchorId, json: &str) -> Result<IngestReport, ParseError> {
        let entries = parse_batch(json)?;
        Ok(self.ingest(anchor_id, &entries))
    }

    /// Ingest recorded batches in order
    pub fn ingest_batches(&self, batches: &[ScanBatch]) -> Vec<IngestReport> {
        batches
            .iter()
            .map(|batch| self.ingest(batch.anchor_id, &batch.readings))
            .collect()
    }

    /// Positions for every locatable device
    pub fn compute_positions(&self) -> Vec<PositionEstimate> {
        self.run_pass().estimates
    }

    pub fn run_pass(&self) -> PositioningPass {
        let snapshot = self.aggregator.snapshot();
        self.pipeline.run(&snapshot)
    }

    /// Run a pass and render its estimates
    pub fn positions_as(&self, format: OutputFormat) -> Result<String, serde_json::Error> {
        let records = PositionFormatter::new().records(&self.compute_positions());
        render(format, &records)
    }

    pub fn registry(&self) -> &TopologyRegistry {
        self.pipeline.registry()
    }

    pub fn aggregator(&self) -> &ScanAggregator {
        &self.aggregator
    }

    pub fn pipeline(&self) -> &PositionPipeline {
        &self.pipeline
    }
}
