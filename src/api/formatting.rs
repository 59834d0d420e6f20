//! Position output formatting and serialization
//!
//! Estimates are published as flat records keyed by device and block, in
//! JSON, CSV or human-readable text.

use crate::api::pipeline::{PositioningPass, SkipReason};
use crate::core::PositionEstimate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Output format selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Json,
    Csv,
    Text,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(OutputFormat::Json),
            "csv" => Ok(OutputFormat::Csv),
            "text" | "txt" => Ok(OutputFormat::Text),
            other => Err(format!("unknown output format '{}'", other)),
        }
    }
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Csv => write!(f, "csv"),
            OutputFormat::Text => write!(f, "text"),
        }
    }
}

/// Published form of one estimate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PositionRecord {
    pub device_id: String,
    pub block_name: String,
    pub x: f64,
    pub y: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub world_x: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub world_y: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub residual: Option<f64>,
}

/// Converts estimates into [`PositionRecord`]s
#[derive(Debug, Clone)]
pub struct PositionFormatter {
    /// Decimal places kept for coordinates
    pub precision: u8,
    /// Include site coordinates
    pub include_world: bool,
    /// Include the solver residual
    pub include_residual: bool,
}

impl Default for PositionFormatter {
    fn default() -> Self {
        Self {
            precision: 3,
            include_world: false,
            include_residual: false,
        }
    }
}

impl PositionFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Formatter that keeps every field
    pub fn with_diagnostics() -> Self {
        Self {
            include_world: true,
            include_residual: true,
            ..Default::default()
        }
    }

    pub fn with_precision(mut self, precision: u8) -> Self {
        self.precision = precision;
        self
    }

    pub fn record(&self, estimate: &PositionEstimate) -> PositionRecord {
        PositionRecord {
            device_id: estimate.device_id.clone(),
            block_name: estimate.block_name.clone(),
            x: self.round_to_precision(estimate.x),
            y: self.round_to_precision(estimate.y),
            world_x: self.include_world.then(|| self.round_to_precision(estimate.world_x)),
            world_y: self.include_world.then(|| self.round_to_precision(estimate.world_y)),
            residual: self.include_residual.then_some(estimate.residual),
        }
    }

    pub fn records(&self, estimates: &[PositionEstimate]) -> Vec<PositionRecord> {
        estimates.iter().map(|estimate| self.record(estimate)).collect()
    }

    fn round_to_precision(&self, value: f64) -> f64 {
        let multiplier = 10_f64.powi(self.precision as i32);
        (value * multiplier).round() / multiplier
    }
}

/// JSON array output
#[derive(Debug, Clone, Default)]
pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pretty() -> Self {
        Self { pretty: true }
    }

    pub fn format_json(&self, records: &[PositionRecord]) -> Result<String, serde_json::Error> {
        if self.pretty {
            serde_json::to_string_pretty(records)
        } else {
            serde_json::to_string(records)
        }
    }
}

/// CSV output for data logging
#[derive(Debug, Clone)]
pub struct CsvFormatter {
    pub include_header: bool,
}

impl Default for CsvFormatter {
    fn default() -> Self {
        Self { include_header: true }
    }
}

impl CsvFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn header(&self) -> String {
        "device_id,block_name,x,y,world_x,world_y,residual".to_string()
    }

    /// One row; absent optional fields are left empty
    pub fn format_csv(&self, record: &PositionRecord) -> String {
        let optional = |value: Option<f64>| value.map(|v| v.to_string()).unwrap_or_default();
        format!(
            "{},{},{},{},{},{},{}",
            escape_csv(&record.device_id),
            escape_csv(&record.block_name),
            record.x,
            record.y,
            optional(record.world_x),
            optional(record.world_y),
            optional(record.residual)
        )
    }

    pub fn format_all(&self, records: &[PositionRecord]) -> String {
        let mut output = String::new();
        if self.include_header {
            output.push_str(&self.header());
            output.push('\n');
        }
        for record in records {
            output.push_str(&self.format_csv(record));
            output.push('\n');
        }
        output
    }
}

fn escape_csv(field: &str) -> String {
    if field.contains(|c: char| matches!(c, ',' | '"' | '\n')) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

/// Human-readable output
#[derive(Debug, Clone, Default)]
pub struct TextFormatter {
    /// One line per device
    pub compact: bool,
}

impl TextFormatter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn format_text(&self, record: &PositionRecord) -> String {
        let mut output = String::new();
        if self.compact {
            output.push_str(&format!(
                "{} [{}] x={:.2} y={:.2}",
                record.device_id, record.block_name, record.x, record.y
            ));
            if let Some(residual) = record.residual {
                output.push_str(&format!(" res={:.3e}", residual));
            }
        } else {
            output.push_str(&format!("Device {}\n", record.device_id));
            output.push_str(&format!("  Block:    {}\n", record.block_name));
            output.push_str(&format!("  Local:    ({:.2}, {:.2}) m\n", record.x, record.y));
            if let (Some(wx), Some(wy)) = (record.world_x, record.world_y) {
                output.push_str(&format!("  Site:     ({:.2}, {:.2}) m\n", wx, wy));
            }
            if let Some(residual) = record.residual {
                output.push_str(&format!("  Residual: {:.3e} m^4\n", residual));
            }
        }
        output
    }

    /// Pass summary followed by every positioned device and every skip
    pub fn format_pass(&self, pass: &PositioningPass, records: &[PositionRecord]) -> String {
        let mut output = format!(
            "Positioning pass (generation {}): {} positioned, {} skipped\n",
            pass.generation,
            records.len(),
            pass.skipped.len()
        );
        for record in records {
            output.push_str(&self.format_text(record));
            output.push('\n');
        }
        for skipped in &pass.skipped {
            let reason = match &skipped.reason {
                SkipReason::AnchorMismatch { anchors } => format!("seen by anchors {:?}, no matching block", anchors),
                SkipReason::MissingDistance(err) | SkipReason::SolverDivergence(err) => err.to_string(),
                SkipReason::ImplausibleDistance { anchor_id, distance } => {
                    format!("anchor {} range {:.1} m is implausible", anchor_id, distance)
                }
            };
            output.push_str(&format!("Skipped {}: {}\n", skipped.device_id, reason));
        }
        output
    }
}

/// Render records in the requested format
pub fn render(format: OutputFormat, records: &[PositionRecord]) -> Result<String, serde_json::Error> {
    match format {
        OutputFormat::Json => JsonFormatter::pretty().format_json(records),
        OutputFormat::Csv => Ok(CsvFormatter::new().format_all(records)),
        OutputFormat::Text => Ok(records
            .iter()
            .map(|record| TextFormatter::new().format_text(record))
            .collect::<Vec<_>>()
            .join("\n")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn estimate() -> PositionEstimate {
        PositionEstimate {
            device_id: "aa:bb:cc:dd:ee:ff".to_string(),
            block_name: "B".to_string(),
            x: 2.000_04,
            y: 7.499_96,
            world_x: 12.000_04,
            world_y: 17.499_96,
            residual: 1.5e-9,
            iterations: 6,
        }
    }

    #[test]
    fn test_record_uses_wire_field_names() {
        let record = PositionFormatter::new().record(&estimate());
        let json = serde_json::to_value(&record).unwrap();

        assert_eq!(json["deviceId"], "aa:bb:cc:dd:ee:ff");
        assert_eq!(json["blockName"], "B");
        assert_eq!(json["x"], 2.0);
        assert_eq!(json["y"], 7.5);
        assert!(json.get("residual").is_none());
        assert!(json.get("worldX").is_none());
    }

    #[test]
    fn test_diagnostic_record_keeps_everything() {
        let record = PositionFormatter::with_diagnostics().record(&estimate());
        assert_eq!(record.world_x, Some(12.0));
        assert_eq!(record.world_y, Some(17.5));
        assert_eq!(record.residual, Some(1.5e-9));

        let json = JsonFormatter::new().format_json(&[record.clone()]).unwrap();
        let parsed: Vec<PositionRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, vec![record]);
    }

    #[test]
    fn test_csv_output() {
        let record = PositionFormatter::new().record(&estimate());
        let csv = CsvFormatter::new().format_all(&[record]);
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines[0], "device_id,block_name,x,y,world_x,world_y,residual");
        assert_eq!(lines[1], "aa:bb:cc:dd:ee:ff,B,2,7.5,,,");
        assert_eq!(escape_csv("a,b"), "\"a,b\"");
    }

    #[test]
    fn test_text_output() {
        let record = PositionFormatter::with_diagnostics().record(&estimate());
        let compact = TextFormatter { compact: true }.format_text(&record);
        assert!(compact.starts_with("aa:bb:cc:dd:ee:ff [B] x=2.00 y=7.50"));

        let full = TextFormatter::new().format_text(&record);
        assert!(full.contains("Site:     (12.00, 17.50) m"));
    }

    #[test]
    fn test_output_format_parsing() {
        assert_eq!("CSV".parse::<OutputFormat>().unwrap(), OutputFormat::Csv);
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert!("xml".parse::<OutputFormat>().is_err());
        assert_eq!(OutputFormat::default().to_string(), "json");
    }
}
