//! Projection runner: replay with cursor tracking.
//!
//! The runner does no IO; it only enforces that envelopes reach the
//! projection in strictly increasing feed order.

use thiserror::Error;

use crate::{EventEnvelope, Projection};

/// Tracks how far a projection has read the feed.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct ProjectionCursor {
    last_sequence_number: u64,
    applied: u64,
}

impl ProjectionCursor {
    pub fn last_sequence_number(&self) -> u64 {
        self.last_sequence_number
    }

    /// Number of envelopes the projection actually applied.
    pub fn applied(&self) -> u64 {
        self.applied
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProjectionError {
    #[error("non-monotonic sequence number (last={last}, found={found})")]
    NonMonotonicSequence { last: u64, found: u64 },
}

/// Runs envelopes through a projection and tracks progress.
#[derive(Debug)]
pub struct ProjectionRunner<P>
where
    P: Projection,
{
    projection: P,
    cursor: ProjectionCursor,
}

impl<P> ProjectionRunner<P>
where
    P: Projection,
{
    pub fn new(projection: P) -> Self {
        Self {
            projection,
            cursor: ProjectionCursor::default(),
        }
    }

    pub fn projection(&self) -> &P {
        &self.projection
    }

    pub fn cursor(&self) -> ProjectionCursor {
        self.cursor
    }

    /// Apply a single envelope, rejecting anything at or behind the cursor.
    pub fn apply(&mut self, envelope: &EventEnvelope<P::Payload>) -> Result<(), ProjectionError> {
        let found = envelope.sequence_number();
        if found <= self.cursor.last_sequence_number {
            return Err(ProjectionError::NonMonotonicSequence {
                last: self.cursor.last_sequence_number,
                found,
            });
        }

        self.projection.apply(envelope);
        self.cursor.last_sequence_number = found;
        self.cursor.applied += 1;
        Ok(())
    }

    /// Replay a batch, skipping envelopes that were already applied
    /// (at-least-once redelivery). Returns how many were applied.
    pub fn replay<'a, I>(&mut self, envelopes: I) -> usize
    where
        I: IntoIterator<Item = &'a EventEnvelope<P::Payload>>,
        P::Payload: 'a,
    {
        let mut sorted: Vec<&EventEnvelope<P::Payload>> = envelopes.into_iter().collect();
        sorted.sort_by_key(|e| e.sequence_number());

        sorted
            .into_iter()
            .filter(|e| self.apply(e).is_ok())
            .count()
    }
}
