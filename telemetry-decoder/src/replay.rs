//! Replay router
//!
//! Drives the pose synthesizer from an extraction and hands every outgoing
//! record to a [`Publisher`]. Routes:
//! - navigation topic -> pose on the state channel, plus path batches
//! - GPS topic -> [`GpsFix`] on the GPS channel
//! - terrain topic (optional) -> forwarded unchanged on the terrain channel

use crate::config::{ExtractConfig, ReplayConfig};
use crate::extractor::extract;
use crate::gps::GpsStatus;
use crate::sources::RecordSource;
use crate::synthesizer::{Header, PathRecord, PoseRecord, PoseSynthesizer};
use crate::types::{CanonicalValue, ExtractedRecord, Result, TelemetryError};
use serde::Serialize;
use std::io::Write;

/// Frame id used when a fix record carries no header frame
pub const GPS_FRAME: &str = "gps";

/// Status of a forwarded fix that carries none: NavSatFix's zero default
const UNREPORTED_STATUS: GpsStatus = GpsStatus {
    status: Some(0),
    service: Some(0),
};

/// Navigation-fix record forwarded on the GPS channel
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GpsFix {
    pub header: Header,
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub status: GpsStatus,
}

impl GpsFix {
    /// Build a fix from a canonical record; missing coordinates read as 0.0
    /// and a missing status as 0 / 0
    pub fn from_record(record: &ExtractedRecord) -> Result<Self> {
        let fields = record.message.as_composite().ok_or_else(|| {
            TelemetryError::DecodeFailed(format!("fix on {} is not a composite record", record.topic))
        })?;

        let frame_id = fields
            .get_composite("header")
            .and_then(|h| h.get("frame_id"))
            .and_then(|f| f.as_str())
            .filter(|f| !f.is_empty())
            .unwrap_or(GPS_FRAME);

        Ok(Self {
            header: Header {
                stamp: record.timestamp,
                frame_id: frame_id.to_string(),
            },
            latitude: fields.get_f64("latitude").unwrap_or(0.0),
            longitude: fields.get_f64("longitude").unwrap_or(0.0),
            altitude: fields.get_f64("altitude").unwrap_or(0.0),
            status: if fields.get_composite("status").is_some() {
                GpsStatus::from_fix(fields)
            } else {
                UNREPORTED_STATUS
            },
        })
    }
}

/// A record handed to a publisher
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum OutboundMessage {
    Pose(PoseRecord),
    Path(PathRecord),
    Fix(GpsFix),
    Forward(CanonicalValue),
}

/// Destination for replayed records
pub trait Publisher {
    fn publish(&mut self, channel: &str, message: &OutboundMessage) -> Result<()>;
}

/// Publisher that keeps everything in memory
#[derive(Debug, Clone, Default)]
pub struct MemoryPublisher {
    pub published: Vec<(String, OutboundMessage)>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages published on one channel, in order
    pub fn on_channel<'a>(&'a self, channel: &'a str) -> impl Iterator<Item = &'a OutboundMessage> + 'a {
        self.published
            .iter()
            .filter(move |(c, _)| c == channel)
            .map(|(_, m)| m)
    }
}

impl Publisher for MemoryPublisher {
    fn publish(&mut self, channel: &str, message: &OutboundMessage) -> Result<()> {
        self.published.push((channel.to_string(), message.clone()));
        Ok(())
    }
}

/// Publisher writing one `{"channel", "message"}` JSON object per line
pub struct JsonLinesPublisher<W: Write> {
    writer: W,
}

#[derive(Serialize)]
struct Envelope<'a> {
    channel: &'a str,
    message: &'a OutboundMessage,
}

impl<W: Write> JsonLinesPublisher<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Publisher for JsonLinesPublisher<W> {
    fn publish(&mut self, channel: &str, message: &OutboundMessage) -> Result<()> {
        serde_json::to_writer(&mut self.writer, &Envelope { channel, message })?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

/// Counters for one replay run
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReplayStats {
    pub records: usize,
    pub poses: usize,
    pub paths: usize,
    pub fixes: usize,
    pub forwarded: usize,
    /// Records on topics with no route
    pub ignored: usize,
    /// Records that could not be decoded or converted
    pub failed: usize,
}

pub struct Replayer {
    config: ReplayConfig,
    synthesizer: PoseSynthesizer,
}

impl Replayer {
    pub fn new(config: ReplayConfig) -> Result<Self> {
        let synthesizer = PoseSynthesizer::from_config(&config.synthesizer)?;
        Ok(Self { config, synthesizer })
    }

    pub fn config(&self) -> &ReplayConfig {
        &self.config
    }

    pub fn synthesizer(&self) -> &PoseSynthesizer {
        &self.synthesizer
    }

    /// Extraction settings selecting only the routed topics
    pub fn extract_config(&self) -> ExtractConfig {
        ExtractConfig::new().with_topics(self.config.input_topics())
    }

    /// Extract the routed topics from `source` and replay them
    pub fn replay_source<S: RecordSource, P: Publisher>(
        &mut self,
        source: &S,
        window: &ExtractConfig,
        publisher: &mut P,
    ) -> Result<ReplayStats> {
        let mut config = window.clone();
        config.topic_filter = Some(self.config.input_topics());
        let extraction = extract(source, &config)?;
        self.run(extraction, publisher)
    }

    /// Route every record of an extraction to `publisher`
    ///
    /// Undecodable or unconvertible records are logged and counted. Source I/O
    /// errors and publisher errors end the run.
    pub fn run<I, P>(&mut self, extraction: I, publisher: &mut P) -> Result<ReplayStats>
    where
        I: IntoIterator<Item = Result<ExtractedRecord>>,
        P: Publisher,
    {
        let mut stats = ReplayStats::default();

        for item in extraction {
            stats.records += 1;
            let record = match item {
                Ok(record) => record,
                Err(TelemetryError::DecodeFailed(reason)) => {
                    log::warn!("Skipping undecodable record: {}", reason);
                    stats.failed += 1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            match self.route(&record, publisher, &mut stats) {
                Ok(()) => {}
                Err(TelemetryError::DecodeFailed(reason)) => {
                    log::warn!("Error replaying {} at {} ms: {}", record.topic, record.timestamp, reason);
                    stats.failed += 1;
                }
                Err(e) => return Err(e),
            }
        }

        log::info!(
            "Replayed {} records: {} poses, {} paths, {} fixes, {} forwarded, {} failed",
            stats.records,
            stats.poses,
            stats.paths,
            stats.fixes,
            stats.forwarded,
            stats.failed
        );
        Ok(stats)
    }

    fn route<P: Publisher>(&mut self, record: &ExtractedRecord, publisher: &mut P, stats: &mut ReplayStats) -> Result<()> {
        let topic = record.topic.as_str();

        if topic == self.config.navigation_topic {
            let fields = record.message.as_composite().ok_or_else(|| {
                TelemetryError::DecodeFailed("navigation record is not a composite record".to_string())
            })?;
            let out = self.synthesizer.on_navigation_record(record.timestamp, fields);

            publisher.publish(&self.config.state_channel, &OutboundMessage::Pose(out.pose))?;
            stats.poses += 1;
            if let Some(path) = out.path {
                publisher.publish(&self.config.path_channel, &OutboundMessage::Path(path))?;
                stats.paths += 1;
            }
        } else if topic == self.config.gps_topic {
            let fix = GpsFix::from_record(record)?;
            publisher.publish(&self.config.gps_channel, &OutboundMessage::Fix(fix))?;
            stats.fixes += 1;
        } else if self.config.terrain_topic.as_deref() == Some(topic) {
            publisher.publish(
                &self.config.terrain_channel,
                &OutboundMessage::Forward(record.message.clone()),
            )?;
            stats.forwarded += 1;
        } else {
            log::trace!("No route for {}", topic);
            stats.ignored += 1;
        }

        Ok(())
    }
}
