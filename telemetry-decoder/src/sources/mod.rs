//! Ordered record sources
//!
//! A record source is an ordered, replayable sequence of `(topic, record, time)`
//! triples that can also report its time bounds and per-topic metadata.
//! Each call to `records()` opens a fresh single-pass iterator; the iterator
//! owns whatever handle it reads from and releases it when dropped.

use crate::record::Record;
use crate::types::{Result, SourceTime};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

pub mod jsonl;
pub mod memory;

pub use jsonl::{JsonlRecording, JsonlRecords};
pub use memory::MemorySource;

/// One raw record pulled from a source
#[derive(Debug, Clone, PartialEq)]
pub struct SourceRecord {
    pub topic: String,
    /// Message type name (e.g. "sensor_msgs/NavSatFix"), if the source knows it
    pub message_type: Option<String>,
    pub time: SourceTime,
    pub record: Record,
}

impl SourceRecord {
    pub fn new(topic: impl Into<String>, time: SourceTime, record: Record) -> Self {
        Self {
            topic: topic.into(),
            message_type: None,
            time,
            record,
        }
    }

    pub fn with_type(mut self, message_type: impl Into<String>) -> Self {
        self.message_type = Some(message_type.into());
        self
    }
}

/// Per-topic metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct TopicInfo {
    pub message_type: String,
    pub message_count: u64,
    pub connection_count: usize,
}

/// Summary of a record source
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceInfo {
    pub path: Option<PathBuf>,
    pub size_bytes: u64,
    pub message_count: u64,
    /// First record time in seconds since the epoch
    pub start_time: Option<f64>,
    /// Last record time in seconds since the epoch
    pub end_time: Option<f64>,
    /// First record time in milliseconds
    pub start_ms: Option<i64>,
    /// Last record time in milliseconds
    pub end_ms: Option<i64>,
    pub topics: BTreeMap<String, TopicInfo>,
}

impl SourceInfo {
    /// Seconds between the first and last record
    pub fn duration(&self) -> f64 {
        match (self.start_time, self.end_time) {
            (Some(start), Some(end)) => end - start,
            _ => 0.0,
        }
    }

    pub fn start_datetime(&self) -> Option<DateTime<Utc>> {
        self.start_ms.and_then(DateTime::from_timestamp_millis)
    }

    pub fn end_datetime(&self) -> Option<DateTime<Utc>> {
        self.end_ms.and_then(DateTime::from_timestamp_millis)
    }

    pub fn topic_names(&self) -> Vec<String> {
        self.topics.keys().cloned().collect()
    }
}

/// Accumulates `SourceInfo` while scanning a source
#[derive(Debug, Default)]
pub(crate) struct InfoCollector {
    info: SourceInfo,
    connections: HashMap<String, HashSet<String>>,
}

impl InfoCollector {
    pub(crate) fn observe(&mut self, topic: &str, message_type: Option<&str>, connection: Option<&str>, time: SourceTime) {
        let secs = time.as_secs_f64();
        let millis = time.to_millis();
        let info = &mut self.info;

        info.message_count += 1;
        info.start_time = Some(info.start_time.map_or(secs, |s| s.min(secs)));
        info.end_time = Some(info.end_time.map_or(secs, |e| e.max(secs)));
        info.start_ms = Some(info.start_ms.map_or(millis, |s| s.min(millis)));
        info.end_ms = Some(info.end_ms.map_or(millis, |e| e.max(millis)));

        let entry = info.topics.entry(topic.to_string()).or_default();
        entry.message_count += 1;
        if entry.message_type.is_empty() {
            if let Some(t) = message_type {
                entry.message_type = t.to_string();
            }
        }

        let connections = self.connections.entry(topic.to_string()).or_default();
        connections.insert(connection.unwrap_or_default().to_string());
        entry.connection_count = connections.len();
    }

    pub(crate) fn finish(self, path: Option<PathBuf>, size_bytes: u64) -> SourceInfo {
        SourceInfo {
            path,
            size_bytes,
            ..self.info
        }
    }
}

/// Common trait for all record sources
pub trait RecordSource {
    /// Single-pass iterator over the source's records, in source order
    type Records: Iterator<Item = Result<SourceRecord>>;

    /// Time bounds and per-topic metadata
    fn info(&self) -> &SourceInfo;

    /// Open a fresh pass over the records
    fn records(&self) -> Result<Self::Records>;
}
