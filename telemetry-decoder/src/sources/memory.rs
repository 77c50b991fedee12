//! In-memory record source

use crate::sources::{InfoCollector, RecordSource, SourceInfo, SourceRecord};
use crate::types::Result;

/// A record source backed by a vector, for embedding and tests
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    records: Vec<SourceRecord>,
    info: SourceInfo,
}

impl MemorySource {
    pub fn new(records: Vec<SourceRecord>) -> Self {
        let mut collector = InfoCollector::default();
        for r in &records {
            collector.observe(&r.topic, r.message_type.as_deref(), None, r.time);
        }
        Self {
            info: collector.finish(None, 0),
            records,
        }
    }
}

impl RecordSource for MemorySource {
    type Records = std::vec::IntoIter<Result<SourceRecord>>;

    fn info(&self) -> &SourceInfo {
        &self.info
    }

    fn records(&self) -> Result<Self::Records> {
        Ok(self.records.iter().cloned().map(Ok).collect::<Vec<_>>().into_iter())
    }
}
