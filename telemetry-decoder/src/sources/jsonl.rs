//! JSON-lines recording reader
//!
//! Each non-blank line of a recording is one record:
//!
//! ```text
//! {"topic": "/chcnav/devpvt", "type": "chcnav/hcinspvatzcb", "stamp": {"secs": 1700000000, "nsecs": 500000000}, "message": {...}}
//! {"topic": "/chcnav_fix_demo/fix", "stamp": 1700000000.75, "connection": "gps_node", "message": {...}}
//! ```
//!
//! `stamp` is either float seconds or a `{secs, nsecs}` pair. Binary payloads
//! inside `message` use `{"_type": "bytes", "_data": "<base64>"}`.

use crate::record::Record;
use crate::sources::{InfoCollector, RecordSource, SourceInfo, SourceRecord};
use crate::types::{Result, SourceTime, TelemetryError};
use serde::Deserialize;
use std::fs::File;
use std::io::{BufRead, BufReader, Lines};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
enum StampRepr {
    Seconds(f64),
    SecNsec {
        secs: i64,
        #[serde(default)]
        nsecs: u32,
    },
}

impl From<StampRepr> for SourceTime {
    fn from(stamp: StampRepr) -> Self {
        match stamp {
            StampRepr::Seconds(secs) => SourceTime::Seconds(secs),
            StampRepr::SecNsec { secs, nsecs } => SourceTime::SecNsec { secs, nsecs },
        }
    }
}

#[derive(Debug, Deserialize)]
struct LineEntry {
    topic: String,
    #[serde(rename = "type", default)]
    message_type: Option<String>,
    stamp: StampRepr,
    #[serde(default)]
    connection: Option<String>,
    message: serde_json::Value,
}

fn parse_line(line: &str, line_no: usize) -> Result<LineEntry> {
    let entry: LineEntry = serde_json::from_str(line)
        .map_err(|e| TelemetryError::DecodeFailed(format!("line {}: {}", line_no, e)))?;

    // Stamps must normalize to i64 milliseconds
    if SourceTime::from(entry.stamp).checked_millis().is_none() {
        return Err(TelemetryError::DecodeFailed(format!(
            "line {}: timestamp out of range",
            line_no
        )));
    }
    Ok(entry)
}

/// A recording stored as JSON lines
#[derive(Debug, Clone)]
pub struct JsonlRecording {
    path: PathBuf,
    info: SourceInfo,
}

impl JsonlRecording {
    /// Open a recording and scan it once for time bounds and topic metadata
    ///
    /// Lines that fail to parse are left out of the summary with a warning;
    /// iteration reports them as `DecodeFailed`.
    pub fn open(path: &Path) -> Result<Self> {
        log::info!("Opening recording: {:?}", path);

        if !path.exists() {
            return Err(TelemetryError::SourceNotFound(path.to_path_buf()));
        }

        let size_bytes = std::fs::metadata(path)?.len();
        let reader = BufReader::new(File::open(path)?);
        let mut collector = InfoCollector::default();
        let mut bad_lines = 0usize;

        for (idx, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match parse_line(&line, idx + 1) {
                Ok(entry) => collector.observe(
                    &entry.topic,
                    entry.message_type.as_deref(),
                    entry.connection.as_deref(),
                    entry.stamp.into(),
                ),
                Err(e) => {
                    bad_lines += 1;
                    log::warn!("{}", e);
                }
            }
        }

        let info = collector.finish(Some(path.to_path_buf()), size_bytes);
        log::info!(
            "Recording scanned: {} messages on {} topics ({} unreadable lines)",
            info.message_count,
            info.topics.len(),
            bad_lines
        );

        Ok(Self {
            path: path.to_path_buf(),
            info,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordSource for JsonlRecording {
    type Records = JsonlRecords;

    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn records(&self) -> Result<JsonlRecords> {
        let file = File::open(&self.path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                TelemetryError::SourceNotFound(self.path.clone())
            } else {
                TelemetryError::IoError(e)
            }
        })?;

        Ok(JsonlRecords {
            lines: BufReader::new(file).lines(),
            line_no: 0,
        })
    }
}

/// Iterator over the records of a JSON-lines recording
pub struct JsonlRecords {
    lines: Lines<BufReader<File>>,
    line_no: usize,
}

impl Iterator for JsonlRecords {
    type Item = Result<SourceRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let line = match self.lines.next()? {
                Ok(line) => line,
                Err(e) => return Some(Err(e.into())),
            };
            self.line_no += 1;

            if line.trim().is_empty() {
                continue;
            }

            return Some(parse_line(&line, self.line_no).map(|entry| SourceRecord {
                topic: entry.topic,
                message_type: entry.message_type,
                time: entry.stamp.into(),
                record: Record::from_json(entry.message),
            }));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn recording(lines: &[&str]) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        for line in lines {
            writeln!(file, "{}", line).unwrap();
        }
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_open_and_iterate() {
        let file = recording(&[
            r#"{"topic": "/a", "type": "std_msgs/Int32", "stamp": {"secs": 100, "nsecs": 250000000}, "message": {"data": 1}}"#,
            "",
            r#"{"topic": "/b", "stamp": 100.5, "message": {"data": 2}}"#,
        ]);

        let source = JsonlRecording::open(file.path()).unwrap();
        let info = source.info();
        assert_eq!(info.message_count, 2);
        assert_eq!(info.start_ms, Some(100_250));
        assert_eq!(info.end_ms, Some(100_500));
        assert_eq!(info.topics["/a"].message_type, "std_msgs/Int32");

        let records: Vec<SourceRecord> = source.records().unwrap().map(|r| r.unwrap()).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].topic, "/a");
        assert_eq!(records[0].time, SourceTime::SecNsec { secs: 100, nsecs: 250_000_000 });
        assert_eq!(records[1].time, SourceTime::Seconds(100.5));
    }

    #[test]
    fn test_bad_line_reported_and_iteration_continues() {
        let file = recording(&[
            r#"{"topic": "/a", "stamp": 1.0, "message": {}}"#,
            "{not json",
            r#"{"topic": "/a", "stamp": 2.0, "message": {}}"#,
        ]);

        let source = JsonlRecording::open(file.path()).unwrap();
        assert_eq!(source.info().message_count, 2);

        let results: Vec<_> = source.records().unwrap().collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok());
        assert!(matches!(results[1], Err(TelemetryError::DecodeFailed(_))));
        assert!(results[2].is_ok());
    }

    #[test]
    fn test_out_of_range_stamp_is_a_bad_line() {
        let file = recording(&[
            r#"{"topic": "/a", "stamp": {"secs": 9223372036854775807, "nsecs": 0}, "message": {}}"#,
            r#"{"topic": "/a", "stamp": 1e300, "message": {}}"#,
            r#"{"topic": "/a", "stamp": {"secs": 5}, "message": {}}"#,
        ]);

        let source = JsonlRecording::open(file.path()).unwrap();
        assert_eq!(source.info().message_count, 1);
        assert_eq!(source.info().start_ms, Some(5_000));

        let results: Vec<_> = source.records().unwrap().collect();
        assert_eq!(results.len(), 3);
        match &results[0] {
            Err(TelemetryError::DecodeFailed(msg)) => assert!(msg.contains("line 1")),
            other => panic!("expected DecodeFailed, got {:?}", other),
        }
        assert!(matches!(results[1], Err(TelemetryError::DecodeFailed(_))));
        assert!(results[2].is_ok());
    }

    #[test]
    fn test_missing_recording() {
        let result = JsonlRecording::open(Path::new("nowhere/recording.jsonl"));
        assert!(matches!(result, Err(TelemetryError::SourceNotFound(_))));
    }
}
