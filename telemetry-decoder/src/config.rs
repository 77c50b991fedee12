//! Extraction and replay configuration types
//!
//! Plain serde structs with defaults and builder methods, so the CLI can load
//! them from TOML and library users can build them in code.

use crate::sources::SourceInfo;
use crate::types::{Result, SourceTime, TelemetryError};
use serde::{Deserialize, Serialize};

/// Configuration for one extraction pass
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExtractConfig {
    /// Optional: only extract these topics (None = all topics)
    #[serde(default)]
    pub topic_filter: Option<Vec<String>>,

    /// Optional: window start in milliseconds (None = first record)
    #[serde(default)]
    pub start_ms: Option<i64>,

    /// Optional: window end in milliseconds (None = last record)
    #[serde(default)]
    pub end_ms: Option<i64>,
}

impl ExtractConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: set topic filter
    pub fn with_topics<I, S>(mut self, topics: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.topic_filter = Some(topics.into_iter().map(Into::into).collect());
        self
    }

    /// Builder method: add one topic to the filter
    pub fn add_topic(mut self, topic: impl Into<String>) -> Self {
        self.topic_filter.get_or_insert_with(Vec::new).push(topic.into());
        self
    }

    pub fn with_start_ms(mut self, start_ms: i64) -> Self {
        self.start_ms = Some(start_ms);
        self
    }

    pub fn with_end_ms(mut self, end_ms: i64) -> Self {
        self.end_ms = Some(end_ms);
        self
    }

    /// Builder method: set the window from float seconds since the epoch
    pub fn with_window_secs(mut self, start: Option<f64>, end: Option<f64>) -> Self {
        self.start_ms = start.map(|s| SourceTime::Seconds(s).to_millis());
        self.end_ms = end.map(|e| SourceTime::Seconds(e).to_millis());
        self
    }

    /// Check if a topic should be extracted
    pub fn should_process_topic(&self, topic: &str) -> bool {
        match &self.topic_filter {
            Some(topics) => topics.iter().any(|t| t == topic),
            None => true,
        }
    }

    /// Resolve the inclusive `[start, end]` window against a source's bounds
    pub fn window(&self, info: &SourceInfo) -> (i64, i64) {
        let start = self.start_ms.or(info.start_ms).unwrap_or(i64::MIN);
        let end = self.end_ms.or(info.end_ms).unwrap_or(i64::MAX);
        (start, end)
    }

    pub fn validate(&self) -> Result<()> {
        if let (Some(start), Some(end)) = (self.start_ms, self.end_ms) {
            if start > end {
                return Err(TelemetryError::Config(format!(
                    "window start {} ms is after end {} ms",
                    start, end
                )));
            }
        }
        Ok(())
    }
}

/// Trajectory synthesis settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizerConfig {
    /// Maximum points kept in the trajectory history
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Emit a path every N accepted navigation records
    #[serde(default = "default_batch_every")]
    pub batch_every: usize,

    /// Maximum points in an emitted path
    #[serde(default = "default_path_limit")]
    pub path_limit: usize,
}

fn default_history_capacity() -> usize {
    1000
}

fn default_batch_every() -> usize {
    10
}

fn default_path_limit() -> usize {
    100
}

impl Default for SynthesizerConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            batch_every: default_batch_every(),
            path_limit: default_path_limit(),
        }
    }
}

impl SynthesizerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.history_capacity == 0 || self.batch_every == 0 || self.path_limit == 0 {
            return Err(TelemetryError::Config(
                "history_capacity, batch_every and path_limit must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Topic routing for the replay router
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayConfig {
    /// Raw navigation topic converted to pose and path
    #[serde(default = "default_navigation_topic")]
    pub navigation_topic: String,

    /// Navigation-fix topic forwarded as GPS fixes
    #[serde(default = "default_gps_topic")]
    pub gps_topic: String,

    /// Optional: point-cloud topic forwarded unchanged as the terrain map
    #[serde(default)]
    pub terrain_topic: Option<String>,

    #[serde(default = "default_state_channel")]
    pub state_channel: String,

    #[serde(default = "default_path_channel")]
    pub path_channel: String,

    #[serde(default = "default_gps_topic")]
    pub gps_channel: String,

    #[serde(default = "default_terrain_channel")]
    pub terrain_channel: String,

    #[serde(default)]
    pub synthesizer: SynthesizerConfig,
}

fn default_navigation_topic() -> String {
    "/chcnav/devpvt".to_string()
}

fn default_gps_topic() -> String {
    "/chcnav_fix_demo/fix".to_string()
}

fn default_state_channel() -> String {
    "/state_estimation".to_string()
}

fn default_path_channel() -> String {
    "/path".to_string()
}

fn default_terrain_channel() -> String {
    "/terrain_map".to_string()
}

impl Default for ReplayConfig {
    fn default() -> Self {
        Self {
            navigation_topic: default_navigation_topic(),
            gps_topic: default_gps_topic(),
            terrain_topic: None,
            state_channel: default_state_channel(),
            path_channel: default_path_channel(),
            gps_channel: default_gps_topic(),
            terrain_channel: default_terrain_channel(),
            synthesizer: SynthesizerConfig::default(),
        }
    }
}

impl ReplayConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder method: forward a point-cloud topic as the terrain map
    pub fn with_terrain_topic(mut self, topic: impl Into<String>) -> Self {
        self.terrain_topic = Some(topic.into());
        self
    }

    pub fn with_navigation_topic(mut self, topic: impl Into<String>) -> Self {
        self.navigation_topic = topic.into();
        self
    }

    pub fn with_gps_topic(mut self, topic: impl Into<String>) -> Self {
        self.gps_topic = topic.into();
        self
    }

    pub fn with_synthesizer(mut self, synthesizer: SynthesizerConfig) -> Self {
        self.synthesizer = synthesizer;
        self
    }

    /// Topics the replay needs from the source
    pub fn input_topics(&self) -> Vec<String> {
        let mut topics = vec![self.navigation_topic.clone(), self.gps_topic.clone()];
        if let Some(terrain) = &self.terrain_topic {
            topics.push(terrain.clone());
        }
        topics
    }
}
