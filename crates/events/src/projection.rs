use crate::EventEnvelope;

/// A projection builds a read model from the change feed.
///
/// Read models are disposable: they can be dropped and rebuilt by replaying
/// the feed (or by re-reading the ledger store). `apply` must be idempotent
/// at the domain level; the [`ProjectionRunner`](crate::ProjectionRunner)
/// additionally filters out envelopes it has already seen.
///
/// Envelopes that are irrelevant to the projection are ignored, not errors.
pub trait Projection {
    type Payload;

    /// Apply a single envelope, updating the read model.
    fn apply(&mut self, envelope: &EventEnvelope<Self::Payload>);
}
