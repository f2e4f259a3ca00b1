use std::collections::HashMap;
use std::sync::RwLock;

use dentledger_core::AggregateId;

use super::r#trait::{EventStore, EventStoreError, StoredEvent, StreamAppend};

#[derive(Debug, Default)]
struct Inner {
    streams: HashMap<AggregateId, Vec<StoredEvent>>,
    /// Stream ids in creation order, with their aggregate type.
    order: Vec<(AggregateId, String)>,
    /// Global log, in position order.
    log: Vec<StoredEvent>,
}

/// In-memory append-only event store.
///
/// Intended for tests/dev and single-process deployments. A single write
/// lock covers the whole batch, so multi-stream appends are atomic.
#[derive(Debug, Default)]
pub struct InMemoryEventStore {
    inner: RwLock<Inner>,
}

impl InMemoryEventStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_version(stream: &[StoredEvent]) -> u64 {
        stream.last().map(|e| e.stream_version).unwrap_or(0)
    }
}

impl EventStore for InMemoryEventStore {
    fn append(&self, batch: Vec<StreamAppend>) -> Result<Vec<StoredEvent>, EventStoreError> {
        let mut inner = self.inner.write().map_err(|_| EventStoreError::Poisoned)?;

        // 1) Validate everything before writing anything.
        for (idx, append) in batch.iter().enumerate() {
            if batch[..idx]
                .iter()
                .any(|prev| prev.aggregate_id == append.aggregate_id)
            {
                return Err(EventStoreError::InvalidAppend(format!(
                    "batch contains stream {} twice",
                    append.aggregate_id
                )));
            }
            if let Some(e) = append.events.iter().find(|e| {
                e.aggregate_id != append.aggregate_id || e.aggregate_type != append.aggregate_type
            }) {
                return Err(EventStoreError::InvalidAppend(format!(
                    "event {} does not belong to stream {}",
                    e.event_id, append.aggregate_id
                )));
            }

            let stream = inner
                .streams
                .get(&append.aggregate_id)
                .map(Vec::as_slice)
                .unwrap_or_default();
            let current = Self::current_version(stream);
            if !append.expected_version.matches(current) {
                return Err(EventStoreError::Concurrency(format!(
                    "stream {}: expected {:?}, found {current}",
                    append.aggregate_id, append.expected_version
                )));
            }
            if let Some(existing) = stream.first() {
                if existing.aggregate_type != append.aggregate_type {
                    return Err(EventStoreError::AggregateTypeMismatch(format!(
                        "stream aggregate_type is '{}', attempted append with '{}'",
                        existing.aggregate_type, append.aggregate_type
                    )));
                }
            }
        }

        // 2) Assign versions/positions and append.
        let mut position = inner.log.last().map(|e| e.position).unwrap_or(0);
        let mut committed = Vec::new();

        for append in batch {
            if append.events.is_empty() {
                continue;
            }
            if !inner.streams.contains_key(&append.aggregate_id) {
                inner
                    .order
                    .push((append.aggregate_id, append.aggregate_type.clone()));
            }
            let stream = inner.streams.entry(append.aggregate_id).or_default();
            let mut version = Self::current_version(stream);

            for e in append.events {
                version += 1;
                position += 1;
                let stored = StoredEvent {
                    event_id: e.event_id,
                    aggregate_id: e.aggregate_id,
                    aggregate_type: e.aggregate_type,
                    stream_version: version,
                    position,
                    event_type: e.event_type,
                    event_version: e.event_version,
                    occurred_at: e.occurred_at,
                    payload: e.payload,
                };
                stream.push(stored.clone());
                committed.push(stored);
            }
        }

        inner.log.extend(committed.iter().cloned());
        Ok(committed)
    }

    fn load_stream(&self, aggregate_id: AggregateId) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self.inner.read().map_err(|_| EventStoreError::Poisoned)?;
        Ok(inner.streams.get(&aggregate_id).cloned().unwrap_or_default())
    }

    fn stream_ids(&self, aggregate_type: &str) -> Result<Vec<AggregateId>, EventStoreError> {
        let inner = self.inner.read().map_err(|_| EventStoreError::Poisoned)?;
        Ok(inner
            .order
            .iter()
            .filter(|(_, t)| t == aggregate_type)
            .map(|(id, _)| *id)
            .collect())
    }

    fn read_all(&self, after: u64) -> Result<Vec<StoredEvent>, EventStoreError> {
        let inner = self.inner.read().map_err(|_| EventStoreError::Poisoned)?;
        // Positions are gap-free and start at 1.
        let start = usize::try_from(after).unwrap_or(usize::MAX).min(inner.log.len());
        Ok(inner.log[start..].to_vec())
    }
}
