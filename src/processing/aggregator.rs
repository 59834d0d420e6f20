//! Latest-batch-wins store of derived distances
//!
//! Each anchor reports complete snapshots, so an ingest replaces everything
//! previously stored for that anchor. Batches from different anchors coexist.
//! The state sits behind one lock; conversion happens before the lock is
//! taken, and the swap is a single write so readers never see half a batch.

use crate::algorithms::path_loss::PathLossModel;
use crate::core::{AnchorId, DerivedDistance, DeviceId};
use crate::processing::parser::{validate_entry, ScanEntry};
use crate::validation::error::{PositioningError, Result};
use parking_lot::RwLock;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::{debug, info};

/// Readings from one anchor's most recent batch
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnchorBatch {
    pub readings: Vec<DerivedDistance>,
    /// Global ingest sequence number at which this batch was stored
    pub generation: u64,
}

/// Current derived distances for every anchor that has reported
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AggregatorState {
    batches: HashMap<AnchorId, AnchorBatch>,
    generation: u64,
}

/// Outcome of one ingest call
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub anchor_id: AnchorId,
    pub accepted: usize,
    /// Entries that could not be turned into readings
    pub skipped: Vec<PositioningError>,
    /// Repeat entries for a device already in this batch
    pub duplicates: usize,
    /// Readings whose distance hit the plausibility ceiling
    pub clamped: usize,
    /// Readings dropped from this anchor's previous batch
    pub replaced: usize,
    pub generation: u64,
}

impl IngestReport {
    pub fn skipped_count(&self) -> usize {
        self.skipped.len()
    }
}

impl AggregatorState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of ingests applied so far
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Replace the batch for `anchor_id`, returning the number of readings dropped
    pub fn replace(&mut self, anchor_id: AnchorId, readings: Vec<DerivedDistance>) -> usize {
        self.generation += 1;
        let batch = AnchorBatch {
            readings,
            generation: self.generation,
        };
        self.batches
            .insert(anchor_id, batch)
            .map_or(0, |previous| previous.readings.len())
    }

    /// Anchors with a stored batch, sorted
    pub fn anchors(&self) -> BTreeSet<AnchorId> {
        self.batches.keys().copied().collect()
    }

    pub fn batch(&self, anchor_id: AnchorId) -> Option<&AnchorBatch> {
        self.batches.get(&anchor_id)
    }

    pub fn reading_count(&self) -> usize {
        self.batches.values().map(|batch| batch.readings.len()).sum()
    }

    /// Every device id present in any stored batch
    pub fn known_devices(&self) -> BTreeSet<DeviceId> {
        self.batches
            .values()
            .flat_map(|batch| batch.readings.iter())
            .map(|reading| reading.device_id.clone())
            .collect()
    }

    /// Stored reading of `device_id` from `anchor_id`
    pub fn reading_for(&self, device_id: &str, anchor_id: AnchorId) -> Result<&DerivedDistance> {
        self.batches
            .get(&anchor_id)
            .and_then(|batch| batch.readings.iter().find(|r| r.device_id == device_id))
            .ok_or_else(|| PositioningError::NotFound {
                device_id: device_id.to_string(),
                anchor_id,
            })
    }

    pub fn distance_for(&self, device_id: &str, anchor_id: AnchorId) -> Result<f64> {
        self.reading_for(device_id, anchor_id).map(|reading| reading.distance)
    }

    /// Anchors whose current batch contains `device_id`
    pub fn anchors_reporting(&self, device_id: &str) -> BTreeSet<AnchorId> {
        self.batches
            .iter()
            .filter(|(_, batch)| batch.readings.iter().any(|r| r.device_id == device_id))
            .map(|(&anchor_id, _)| anchor_id)
            .collect()
    }

    /// Reporting anchors for every known device, in one pass over the state
    pub fn reporting_index(&self) -> HashMap<DeviceId, BTreeSet<AnchorId>> {
        let mut index: HashMap<DeviceId, BTreeSet<AnchorId>> = HashMap::new();
        for (&anchor_id, batch) in &self.batches {
            for reading in &batch.readings {
                index
                    .entry(reading.device_id.clone())
                    .or_default()
                    .insert(anchor_id);
            }
        }
        index
    }
}

/// Thread-safe scan aggregator; the only writer of [`AggregatorState`]
#[derive(Debug, Default)]
pub struct ScanAggregator {
    model: PathLossModel,
    state: RwLock<AggregatorState>,
}

impl ScanAggregator {
    pub fn new(model: PathLossModel) -> Self {
        Self {
            model,
            state: RwLock::new(AggregatorState::new()),
        }
    }

    pub fn model(&self) -> &PathLossModel {
        &self.model
    }

    /// Convert a batch from `anchor_id` and atomically replace that anchor's
    /// previous batch. Bad entries are skipped and listed in the report.
    pub fn ingest(&self, anchor_id: AnchorId, batch: &[ScanEntry]) -> IngestReport {
        let mut readings = Vec::with_capacity(batch.len());
        let mut skipped = Vec::new();
        let mut seen = HashSet::new();
        let mut duplicates = 0;
        let mut clamped = 0;

        for (index, entry) in batch.iter().enumerate() {
            let reading = match validate_entry(index, entry, anchor_id) {
                Ok(reading) => reading,
                Err(err) => {
                    debug!(anchor_id, index, error = %err, "skipping scan entry");
                    skipped.push(err);
                    continue;
                }
            };
            if !seen.insert(reading.device_id.clone()) {
                duplicates += 1;
                continue;
            }

            let range = self.model.estimate(reading.signal_strength);
            if range.clamped {
                clamped += 1;
            }
            readings.push(DerivedDistance {
                anchor_id,
                device_id: reading.device_id,
                signal_strength: reading.signal_strength,
                distance: range.distance,
                clamped: range.clamped,
            });
        }

        let accepted = readings.len();
        let (replaced, generation, devices) = {
            let mut state = self.state.write();
            let replaced = state.replace(anchor_id, readings);
            (replaced, state.generation(), state.known_devices().len())
        };

        info!(
            anchor_id,
            accepted,
            skipped = skipped.len(),
            duplicates,
            clamped,
            known_devices = devices,
            "ingested scan batch"
        );

        IngestReport {
            anchor_id,
            accepted,
            skipped,
            duplicates,
            clamped,
            replaced,
            generation,
        }
    }

    /// Consistent copy of the current state
    pub fn snapshot(&self) -> AggregatorState {
        self.state.read().clone()
    }

    pub fn known_devices(&self) -> BTreeSet<DeviceId> {
        self.state.read().known_devices()
    }

    pub fn distance_for(&self, device_id: &str, anchor_id: AnchorId) -> Result<f64> {
        self.state.read().distance_for(device_id, anchor_id)
    }

    pub fn anchors_reporting(&self, device_id: &str) -> BTreeSet<AnchorId> {
        self.state.read().anchors_reporting(device_id)
    }

    pub fn generation(&self) -> u64 {
        self.state.read().generation()
    }
}
