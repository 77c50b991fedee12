//! Time-windowed extraction
//!
//! Pulls records from a source, keeps the ones whose topic and timestamp match
//! the configuration, and converts each into a canonical tree. The extraction
//! is a lazy iterator; callers may stop pulling at any record boundary.

use crate::config::ExtractConfig;
use crate::serializer::serialize;
use crate::sources::{RecordSource, SourceRecord};
use crate::types::{CanonicalValue, ExtractedRecord, Result, TelemetryError};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

/// Start a lazy extraction pass over a source
pub fn extract<S: RecordSource>(source: &S, config: &ExtractConfig) -> Result<Extraction<S::Records>> {
    config.validate()?;
    let (start_ms, end_ms) = config.window(source.info());
    log::debug!(
        "Extracting window [{}, {}] ms, topics: {:?}",
        start_ms,
        end_ms,
        config.topic_filter
    );

    Ok(Extraction {
        records: source.records()?,
        config: config.clone(),
        start_ms,
        end_ms,
        last_timestamp: None,
    })
}

/// Iterator that filters source records and converts them into canonical trees
///
/// For each source record:
/// 1. Check the topic filter
/// 2. Normalize the timestamp to milliseconds and check the window
/// 3. Serialize the record into its canonical tree
pub struct Extraction<I>
where
    I: Iterator<Item = Result<SourceRecord>>,
{
    records: I,
    config: ExtractConfig,
    start_ms: i64,
    end_ms: i64,
    last_timestamp: Option<i64>,
}

impl<I> Extraction<I>
where
    I: Iterator<Item = Result<SourceRecord>>,
{
    /// Resolved inclusive window in milliseconds
    pub fn window(&self) -> (i64, i64) {
        (self.start_ms, self.end_ms)
    }

    fn process_record(&mut self, record: SourceRecord) -> Option<ExtractedRecord> {
        if !self.config.should_process_topic(&record.topic) {
            return None;
        }

        let timestamp = record.time.to_millis();
        if timestamp < self.start_ms || timestamp > self.end_ms {
            return None;
        }

        if let Some(last) = self.last_timestamp {
            if timestamp < last {
                log::warn!(
                    "Record on {} at {} ms precedes previous record at {} ms",
                    record.topic,
                    timestamp,
                    last
                );
            }
        }
        self.last_timestamp = Some(timestamp);

        log::trace!("Extracting {} at {} ms", record.topic, timestamp);
        Some(ExtractedRecord {
            timestamp,
            message: serialize(&record.record),
            topic: record.topic,
        })
    }
}

impl<I> Iterator for Extraction<I>
where
    I: Iterator<Item = Result<SourceRecord>>,
{
    type Item = Result<ExtractedRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            match self.records.next()? {
                Ok(record) => {
                    if let Some(extracted) = self.process_record(record) {
                        return Some(Ok(extracted));
                    }
                }
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Filesystem-safe file stem for a topic name
pub fn safe_topic_name(topic: &str) -> String {
    topic.replace(['/', '~'], "_")
}

/// Outcome for one topic of a multi-output extraction
#[derive(Debug, Clone, PartialEq)]
pub enum TopicStatus {
    /// Matched records were written to `path`
    Written { path: PathBuf, count: usize },
    /// Nothing matched; no file was created
    Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TopicReport {
    pub topic: String,
    pub status: TopicStatus,
}

/// Result of a multi-output extraction
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExtractionSummary {
    pub topics: Vec<TopicReport>,
    /// Source records that could not be decoded
    pub failed_records: usize,
}

impl ExtractionSummary {
    /// True when no topic produced any output
    pub fn is_empty(&self) -> bool {
        self.topics.iter().all(|t| t.status == TopicStatus::Empty)
    }

    pub fn written_count(&self) -> usize {
        self.topics
            .iter()
            .map(|t| match t.status {
                TopicStatus::Written { count, .. } => count,
                TopicStatus::Empty => 0,
            })
            .sum()
    }
}

/// Per-topic file entry (the topic is implied by the file)
#[derive(Serialize)]
struct TimedMessage<'a> {
    timestamp: i64,
    message: &'a CanonicalValue,
}

fn write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer_pretty(&mut writer, value)?;
    writer.flush()?;
    Ok(())
}

/// Run one extraction, skipping records the source could not decode
///
/// Decode failures are logged and counted; any other error ends the pass.
fn collect_records<S: RecordSource>(source: &S, config: &ExtractConfig) -> Result<(Vec<ExtractedRecord>, usize)> {
    let mut records = Vec::new();
    let mut failed = 0;

    for item in extract(source, config)? {
        match item {
            Ok(record) => records.push(record),
            Err(TelemetryError::DecodeFailed(reason)) => {
                log::warn!("Skipping undecodable record: {}", reason);
                failed += 1;
            }
            Err(e) => return Err(e),
        }
    }

    Ok((records, failed))
}

/// Extract one topic into a JSON array of `{timestamp, topic, message}`
///
/// Returns the number of records written. When nothing matches, no file is
/// created and 0 is returned.
pub fn extract_topic_to_file<S: RecordSource>(
    source: &S,
    topic: &str,
    config: &ExtractConfig,
    output: &Path,
) -> Result<usize> {
    let config = config.clone().with_topics([topic]);
    let (records, _) = collect_records(source, &config)?;

    if records.is_empty() {
        log::info!("No messages found on {}", topic);
        return Ok(0);
    }

    if let Some(parent) = output.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    write_json(output, &records)?;
    log::info!("Extracted {} messages from {} to {:?}", records.len(), topic, output);
    Ok(records.len())
}

/// Extract every selected topic into `<output_dir>/<safe topic>.json`
///
/// Topics come from the configured filter, or from the source metadata when
/// no filter is set. Each file holds `{timestamp, message}` entries. A topic
/// with no matching records gets no file and is reported as `Empty`.
pub fn write_topic_files<S: RecordSource>(
    source: &S,
    config: &ExtractConfig,
    output_dir: &Path,
) -> Result<ExtractionSummary> {
    let topics = config
        .topic_filter
        .clone()
        .unwrap_or_else(|| source.info().topic_names());

    let (records, failed_records) = collect_records(source, config)?;

    let mut grouped: HashMap<&str, Vec<TimedMessage<'_>>> = HashMap::new();
    for record in &records {
        grouped.entry(record.topic.as_str()).or_default().push(TimedMessage {
            timestamp: record.timestamp,
            message: &record.message,
        });
    }

    std::fs::create_dir_all(output_dir)?;

    let mut summary = ExtractionSummary {
        topics: Vec::with_capacity(topics.len()),
        failed_records,
    };

    for topic in topics {
        log::info!("Processing topic: {}", topic);
        let status = match grouped.get(topic.as_str()) {
            Some(entries) if !entries.is_empty() => {
                let path = output_dir.join(format!("{}.json", safe_topic_name(&topic)));
                write_json(&path, entries)?;
                log::info!("  -> Extracted {} messages to {:?}", entries.len(), path);
                TopicStatus::Written {
                    path,
                    count: entries.len(),
                }
            }
            _ => {
                log::info!("  -> No messages found");
                TopicStatus::Empty
            }
        };
        summary.topics.push(TopicReport { topic, status });
    }

    Ok(summary)
}
