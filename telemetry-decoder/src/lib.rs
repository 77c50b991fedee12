//! Telemetry Decoder Library
//!
//! Converts vehicle telemetry into portable, JSON-friendly data:
//! - Parses DBC files into a frame-layout document and decodes CAN payloads
//! - Normalizes recorded messages into a uniform canonical tree
//! - Extracts time-windowed slices of a recording per topic
//! - Synthesizes pose and path records from raw navigation records
//!
//! The library does NOT:
//! - Read proprietary recording containers (sources implement [`RecordSource`])
//! - Pace replay against the wall clock
//! - Project coordinates geodetically
//!
//! The command line front end lives in the `telemetry-cli` crate.
//!
//! # Example Usage
//!
//! ```no_run
//! use telemetry_decoder::{extract, ExtractConfig, JsonlRecording};
//! use std::path::Path;
//!
//! let recording = JsonlRecording::open(Path::new("drive.jsonl")).unwrap();
//! let config = ExtractConfig::new()
//!     .with_topics(["/chcnav/devpvt"])
//!     .with_window_secs(Some(1_700_000_000.0), None);
//!
//! for record in extract(&recording, &config).unwrap() {
//!     match record {
//!         Ok(r) => println!("{} {}", r.timestamp, r.topic),
//!         Err(e) => eprintln!("Decode error: {}", e),
//!     }
//! }
//! ```

pub mod config;
pub mod extractor;
pub mod frame_decoder;
pub mod gps;
pub mod record;
pub mod replay;
pub mod serializer;
pub mod signals;
pub mod sources;
pub mod synthesizer;
pub mod types;

pub use config::{ExtractConfig, ReplayConfig, SynthesizerConfig};
pub use extractor::{
    extract, extract_topic_to_file, safe_topic_name, write_topic_files, Extraction, ExtractionSummary,
    TopicReport, TopicStatus,
};
pub use frame_decoder::{DecodedFrame, FrameDecoder, SignalDescriptor};
pub use gps::{extract_gps_points, write_gps_points, GpsPoint, GpsStatus};
pub use record::{Field, FieldAccessError, Record};
pub use replay::{GpsFix, JsonLinesPublisher, MemoryPublisher, OutboundMessage, Publisher, ReplayStats, Replayer};
pub use serializer::serialize;
pub use signals::dbc::{parse_dbc_file, parse_dbc_str};
pub use signals::{Endianness, FrameLayout, LayoutDocument, SignalField, ValueTable};
pub use sources::{JsonlRecording, MemorySource, RecordSource, SourceInfo, SourceRecord, TopicInfo};
pub use synthesizer::{
    quaternion_from_euler, PathRecord, PoseRecord, PoseSynthesizer, Quaternion, TrajectoryHistory, TrajectoryPoint, Vector3,
};
pub use types::{
    CanonicalValue, Composite, DecodedSignal, ExtractedRecord, Result, Scalar, SignalValue, SourceTime,
    TelemetryError,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_basics() {
        // Smoke test: an empty source extracts nothing
        let source = MemorySource::new(Vec::new());
        let mut extraction = extract(&source, &ExtractConfig::new()).unwrap();
        assert!(extraction.next().is_none());
        assert!(!VERSION.is_empty());
    }
}
