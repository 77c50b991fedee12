//! GPS point extraction from navigation-fix records

use crate::config::ExtractConfig;
use crate::extractor::extract;
use crate::sources::RecordSource;
use crate::types::{Composite, ExtractedRecord, Result, TelemetryError};
use serde::Serialize;
use std::path::Path;

/// Fix status; both fields are absent when the record carries no status
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GpsStatus {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub service: Option<i64>,
}

impl GpsStatus {
    /// Read `{status, service}` from a fix record, defaulting to -1 / 0
    pub fn from_fix(fields: &Composite) -> Self {
        match fields.get_composite("status") {
            Some(status) => Self {
                status: Some(status.get("status").and_then(|v| v.as_i64()).unwrap_or(-1)),
                service: Some(status.get("service").and_then(|v| v.as_i64()).unwrap_or(0)),
            },
            None => Self::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpsPoint {
    pub timestamp: i64,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub status: GpsStatus,
}

impl GpsPoint {
    /// Convert an extracted fix record; `None` without latitude and longitude
    pub fn from_record(record: &ExtractedRecord) -> Option<Self> {
        let fields = record.message.as_composite()?;
        Some(Self {
            timestamp: record.timestamp,
            latitude: fields.get_f64("latitude")?,
            longitude: fields.get_f64("longitude")?,
            altitude: fields.get_f64("altitude").unwrap_or(0.0),
            status: GpsStatus::from_fix(fields),
        })
    }
}

/// Collect GPS points from every fix record on `topic`
pub fn extract_gps_points<S: RecordSource>(source: &S, topic: &str) -> Result<Vec<GpsPoint>> {
    let config = ExtractConfig::new().with_topics([topic]);
    let mut points = Vec::new();

    for item in extract(source, &config)? {
        let record = match item {
            Ok(record) => record,
            Err(TelemetryError::DecodeFailed(reason)) => {
                log::warn!("Skipping undecodable record: {}", reason);
                continue;
            }
            Err(e) => return Err(e),
        };
        match GpsPoint::from_record(&record) {
            Some(point) => points.push(point),
            None => log::debug!("Record at {} ms has no latitude/longitude", record.timestamp),
        }
    }

    log::info!("Extracted {} GPS points from {}", points.len(), topic);
    Ok(points)
}

/// Write GPS points as a pretty-printed JSON array
pub fn write_gps_points(points: &[GpsPoint], path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, serde_json::to_string_pretty(points)?)?;
    Ok(())
}
