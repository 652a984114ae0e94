//! Journal replay: a registry of handlers keyed by record tag.
//!
//! Handlers are plain functions over an explicit context (the engine core in
//! production, anything in tests). Dispatch is strictly sequential in journal
//! order. A record that cannot be applied (unknown tag, bad payload, missing
//! brush or layer) is logged and skipped; replay always runs to the end.

#[cfg(test)]
#[path = "replay_test.rs"]
mod replay_test;

use std::collections::HashMap;

use journal::RecordedEvent;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::chain_recorder::SampleError;
use crate::document::DocumentError;

#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("no handler for `{0}`")]
    UnknownType(String),
    #[error("bad `{kind}` payload: {source}")]
    Payload {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("bad draw sample: {0}")]
    Sample(#[from] SampleError),
    #[error("missing resource: {0}")]
    MissingResource(String),
    #[error("document rejected edit: {0}")]
    Document(#[from] DocumentError),
}

/// Handler for one record tag.
pub type ReplayHandler<C> = Box<dyn Fn(&mut C, &Value) -> Result<(), ReplayError> + Send + Sync>;

/// Outcome of replaying a journal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub applied: usize,
    pub skipped: usize,
}

pub struct Replayer<C> {
    handlers: HashMap<String, ReplayHandler<C>>,
}

impl<C> Default for Replayer<C> {
    fn default() -> Self {
        Self { handlers: HashMap::new() }
    }
}

impl<C> Replayer<C> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for `kind`, replacing any earlier one.
    pub fn add_replay_handler(
        &mut self,
        kind: impl Into<String>,
        handler: impl Fn(&mut C, &Value) -> Result<(), ReplayError> + Send + Sync + 'static,
    ) {
        self.handlers.insert(kind.into(), Box::new(handler));
    }

    #[must_use]
    pub fn has_handler(&self, kind: &str) -> bool {
        self.handlers.contains_key(kind)
    }

    /// Registered tags, sorted.
    #[must_use]
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<_> = self.handlers.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }

    /// Apply one record.
    ///
    /// # Errors
    ///
    /// [`ReplayError::UnknownType`] without a handler, otherwise whatever the
    /// handler reports.
    pub fn dispatch(&self, context: &mut C, event: &RecordedEvent) -> Result<(), ReplayError> {
        let handler = self
            .handlers
            .get(&event.kind)
            .ok_or_else(|| ReplayError::UnknownType(event.kind.clone()))?;
        handler(context, &event.data)
    }

    /// Apply every record in order, skipping the ones that fail.
    pub fn replay(&self, context: &mut C, events: &[RecordedEvent]) -> ReplaySummary {
        let mut summary = ReplaySummary::default();
        for (index, event) in events.iter().enumerate() {
            match self.dispatch(context, event) {
                Ok(()) => {
                    summary.applied += 1;
                    debug!(index, kind = %event.kind, "replayed");
                }
                Err(e) => {
                    summary.skipped += 1;
                    warn!(error = %e, index, kind = %event.kind, "replay record skipped");
                }
            }
        }
        info!(applied = summary.applied, skipped = summary.skipped, "replay finished");
        summary
    }
}

/// Decode a handler's typed payload.
///
/// # Errors
///
/// [`ReplayError::Payload`] naming `kind` when `data` does not fit `T`.
pub fn decode_payload<T: DeserializeOwned>(kind: &str, data: &Value) -> Result<T, ReplayError> {
    T::deserialize(data).map_err(|source| ReplayError::Payload { kind: kind.to_owned(), source })
}
