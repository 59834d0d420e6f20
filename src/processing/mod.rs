//! Scan batch parsing and aggregation

pub mod parser;
pub mod aggregator;

pub use parser::{parse_batch, parse_scan_file, ScanBatch, ScanEntry};
pub use aggregator::{AggregatorState, IngestReport, ScanAggregator};
