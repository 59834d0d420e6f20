//! Scan batch parsing and per-entry validation
//!
//! Scanners post JSON arrays of loosely typed records. Field names from the
//! sensor firmware (`mac`, `rssi`, `scannerID`) are accepted alongside the
//! engine's own names. A record that cannot be turned into a reading is
//! reported as malformed without failing the rest of the batch.

use crate::core::{AnchorId, ScanReading};
use crate::validation::error::{MalformedReason, PositioningError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// One record of an incoming batch, before validation
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScanEntry {
    #[serde(default, alias = "mac", alias = "deviceId")]
    pub device_id: Option<Value>,
    #[serde(default, alias = "rssi", alias = "signalStrength")]
    pub signal_strength: Option<Value>,
    /// Scanner the record claims to come from, if the sender includes it
    #[serde(default, alias = "scannerID", alias = "anchorId", skip_serializing_if = "Option::is_none")]
    pub scanner_id: Option<Value>,
}

impl ScanEntry {
    pub fn new(device_id: impl Into<String>, signal_strength: f64) -> Self {
        Self {
            device_id: Some(Value::String(device_id.into())),
            signal_strength: Some(Value::from(signal_strength)),
            scanner_id: None,
        }
    }

    pub fn with_scanner(mut self, scanner_id: AnchorId) -> Self {
        self.scanner_id = Some(Value::from(scanner_id));
        self
    }
}

/// Recorded batch from one anchor, as stored in scan files
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanBatch {
    #[serde(alias = "scannerID", alias = "anchorId")]
    pub anchor_id: AnchorId,
    pub readings: Vec<ScanEntry>,
}

/// Errors that reject a whole payload
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    #[error("Invalid batch JSON: {details}")]
    InvalidJson { details: String },
    #[error("Batch payload must be a JSON array")]
    NotAnArray,
}

/// Parse a batch payload. Elements that are not objects become empty entries
/// so they are counted as malformed rather than rejecting the payload.
pub fn parse_batch(json: &str) -> Result<Vec<ScanEntry>, ParseError> {
    let payload: Value = serde_json::from_str(json).map_err(|e| ParseError::InvalidJson {
        details: e.to_string(),
    })?;
    let items = match payload {
        Value::Array(items) => items,
        _ => return Err(ParseError::NotAnArray),
    };

    Ok(items
        .into_iter()
        .map(|item| serde_json::from_value(item).unwrap_or_default())
        .collect())
}

/// Parse a scan file: a JSON array of [`ScanBatch`]
pub fn parse_scan_file(json: &str) -> Result<Vec<ScanBatch>, ParseError> {
    serde_json::from_str(json).map_err(|e| ParseError::InvalidJson {
        details: e.to_string(),
    })
}

/// Turn the entry at `index` of a batch from `anchor_id` into a reading
pub fn validate_entry(
    index: usize,
    entry: &ScanEntry,
    anchor_id: AnchorId,
) -> Result<ScanReading, PositioningError> {
    let malformed = |reason| PositioningError::MalformedReading { index, reason };

    let device_id = match &entry.device_id {
        None | Some(Value::Null) => return Err(malformed(MalformedReason::MissingDeviceId)),
        Some(Value::String(s)) => s.trim().to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(other) => return Err(malformed(MalformedReason::InvalidDeviceId(other.to_string()))),
    };
    if device_id.is_empty() {
        return Err(malformed(MalformedReason::EmptyDeviceId));
    }

    let signal_strength = match &entry.signal_strength {
        None | Some(Value::Null) => return Err(malformed(MalformedReason::MissingSignalStrength)),
        Some(value) => numeric(value)
            .ok_or_else(|| malformed(MalformedReason::NonNumericSignalStrength(value.to_string())))?,
    };
    if !signal_strength.is_finite() {
        return Err(malformed(MalformedReason::NonFiniteSignalStrength));
    }

    if let Some(declared) = &entry.scanner_id {
        if !declared.is_null() && numeric(declared) != Some(anchor_id as f64) {
            return Err(malformed(MalformedReason::ScannerConflict {
                declared: declared.to_string(),
                batch: anchor_id,
            }));
        }
    }

    Ok(ScanReading {
        anchor_id,
        device_id,
        signal_strength,
    })
}

/// Numeric value of a JSON number or numeric string
fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_firmware_field_names() {
        let json = r#"[
            {"mac": "aa:bb:cc:dd:ee:01", "rssi": -61, "scannerID": 1001},
            {"deviceId": "aa:bb:cc:dd:ee:02", "signalStrength": "-70.5"}
        ]"#;
        let entries = parse_batch(json).unwrap();
        assert_eq!(entries.len(), 2);

        let first = validate_entry(0, &entries[0], 1001).unwrap();
        assert_eq!(first.device_id, "aa:bb:cc:dd:ee:01");
        assert_eq!(first.signal_strength, -61.0);

        let second = validate_entry(1, &entries[1], 1001).unwrap();
        assert_eq!(second.signal_strength, -70.5);
        assert_eq!(second.anchor_id, 1001);
    }

    #[test]
    fn test_non_numeric_signal_is_malformed() {
        let entries = parse_batch(r#"[{"mac": "x", "rssi": "strong"}]"#).unwrap();
        let err = validate_entry(0, &entries[0], 7).unwrap_err();
        assert!(matches!(
            err,
            PositioningError::MalformedReading {
                index: 0,
                reason: MalformedReason::NonNumericSignalStrength(_)
            }
        ));
    }

    #[test]
    fn test_missing_fields_are_malformed() {
        let entries = parse_batch(r#"[{"rssi": -50}, {"mac": "x"}, {"mac": "  ", "rssi": -50}, 42]"#).unwrap();
        let reasons: Vec<MalformedReason> = entries
            .iter()
            .enumerate()
            .map(|(i, e)| match validate_entry(i, e, 1).unwrap_err() {
                PositioningError::MalformedReading { reason, .. } => reason,
                other => panic!("unexpected error: {other:?}"),
            })
            .collect();

        assert_eq!(
            reasons,
            vec![
                MalformedReason::MissingDeviceId,
                MalformedReason::MissingSignalStrength,
                MalformedReason::EmptyDeviceId,
                MalformedReason::MissingDeviceId,
            ]
        );
    }

    #[test]
    fn test_conflicting_scanner_rejected() {
        let entry = ScanEntry::new("dev", -55.0).with_scanner(1002);
        assert!(validate_entry(0, &entry, 1002).is_ok());
        let err = validate_entry(0, &entry, 1001).unwrap_err();
        assert!(matches!(
            err,
            PositioningError::MalformedReading {
                reason: MalformedReason::ScannerConflict { batch: 1001, .. },
                ..
            }
        ));
    }

    #[test]
    fn test_payload_errors() {
        assert_eq!(parse_batch(r#"{"mac": "x"}"#).unwrap_err(), ParseError::NotAnArray);
        assert!(matches!(parse_batch("[{"), Err(ParseError::InvalidJson { .. })));
    }

    #[test]
    fn test_scan_file_batches() {
        let json = r#"[
            {"anchorId": 1001, "readings": [{"mac": "a", "rssi": -60}]},
            {"scannerID": 1002, "readings": []}
        ]"#;
        let batches = parse_scan_file(json).unwrap();
        assert_eq!(batches.len(), 2);
        assert_eq!(batches[0].anchor_id, 1001);
        assert_eq!(batches[1].anchor_id, 1002);
        assert!(batches[1].readings.is_empty());
    }
}
