//! Positioning passes, the service facade and output formatting
//!
//! This module ties the aggregator and the block solver together and renders
//! the resulting estimates for publication.

pub mod pipeline;
pub mod service;
pub mod formatting;

pub use pipeline::{PositionPipeline, PositioningPass, SkipReason, SkippedDevice};
pub use service::PositioningService;
pub use formatting::{
    OutputFormat, PositionRecord, PositionFormatter, JsonFormatter, CsvFormatter, TextFormatter,
};
