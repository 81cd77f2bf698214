//! Per-message processing: filter, then dedup and store

use tracing::warn;

use crate::{
    dedup::{DedupGate, PersistOutcome},
    filter::MessageFilter,
};

/// What became of one feed message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Filtered out: other type, untracked vessel, or incomplete position
    Ignored,
    /// Could not be parsed
    Malformed,
    Persist(PersistOutcome),
}

pub struct MessagePipeline {
    filter: MessageFilter,
    gate: DedupGate,
}

impl MessagePipeline {
    pub fn new(filter: MessageFilter, gate: DedupGate) -> Self {
        Self { filter, gate }
    }

    /// Handle one raw payload
    ///
    /// Never fails: parse and storage errors are logged here and the
    /// message is dropped, so the feed keeps flowing.
    pub async fn handle(&self, payload: &[u8]) -> MessageOutcome {
        match self.filter.filter(payload) {
            Ok(Some(report)) => MessageOutcome::Persist(self.gate.process(&report).await),
            Ok(None) => MessageOutcome::Ignored,
            Err(e) => {
                warn!("Parsing error, dropping message: {}", e);
                MessageOutcome::Malformed
            }
        }
    }
}
