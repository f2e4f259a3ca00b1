//! Command execution pipeline shared by the service records and the ledger.
//!
//! ```text
//! lock records → load streams → rehydrate → handle (+ apply in memory)
//!   → append all streams atomically → publish committed events
//! ```
//!
//! A [`Transaction`] stages the decided events of one operation. Several
//! commands may hit the same record inside one transaction (two allocations
//! to the same service); they run against the in-memory state left by the
//! previous one and are committed under the version read at load time.
//!
//! Commits are serialized through the dispatcher so the feed publishes in
//! store position order.

use std::sync::Mutex;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use thiserror::Error;

use dentledger_consulting::{
    ConsultedService, ConsultedServiceEvent, ConsultedServiceId, SERVICE_AGGREGATE_TYPE,
};
use dentledger_core::{Aggregate, AggregateId, DomainError, ErrorKind, ExpectedVersion};
use dentledger_events::{EventBus, EventEnvelope};
use dentledger_payments::{
    PaymentVoucher, PaymentVoucherEvent, PaymentVoucherId, VOUCHER_AGGREGATE_TYPE, VoucherNumber,
};

use crate::event_store::{EventStore, EventStoreError, StoredEvent, StreamAppend, UncommittedEvent};
use crate::locks::{RecordLockGuard, RecordLocks};

/// Failure of a ledger operation. Every variant aborts the whole operation.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error(transparent)]
    Domain(#[from] DomainError),

    #[error(transparent)]
    Store(#[from] EventStoreError),

    /// A stored payload no longer decodes into its aggregate's event type.
    #[error("failed to decode stored event: {0}")]
    Deserialize(String),

    /// Publication failed after a successful commit; the change is durable.
    #[error("event publication failed: {0}")]
    Publish(String),
}

impl LedgerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LedgerError::Domain(e) => e.kind(),
            LedgerError::Store(EventStoreError::Concurrency(_)) => ErrorKind::Conflict,
            LedgerError::Store(_) | LedgerError::Deserialize(_) | LedgerError::Publish(_) => {
                ErrorKind::Internal
            }
        }
    }
}

pub type LedgerResult<T> = Result<T, LedgerError>;

#[derive(Debug)]
struct Staged {
    aggregate_id: AggregateId,
    aggregate_type: &'static str,
    expected_version: u64,
    events: Vec<UncommittedEvent>,
}

/// Events decided by one operation, waiting for commit.
#[derive(Debug, Default)]
pub struct Transaction {
    staged: Vec<Staged>,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `command` against `aggregate`, apply the resulting events to it
    /// and stage them for commit.
    pub fn execute<A>(
        &mut self,
        aggregate: &mut A,
        aggregate_id: AggregateId,
        aggregate_type: &'static str,
        command: &A::Command,
    ) -> LedgerResult<Vec<A::Event>>
    where
        A: Aggregate<Error = DomainError>,
        A::Event: dentledger_events::Event + Serialize,
    {
        let version_before = aggregate.version();
        let events = aggregate.handle(command)?;
        if events.is_empty() {
            return Ok(events);
        }

        let uncommitted = events
            .iter()
            .map(|e| UncommittedEvent::from_typed(aggregate_id, aggregate_type, e))
            .collect::<Result<Vec<_>, _>>()?;
        for e in &events {
            aggregate.apply(e);
        }

        match self
            .staged
            .iter_mut()
            .find(|s| s.aggregate_id == aggregate_id)
        {
            Some(staged) => staged.events.extend(uncommitted),
            None => self.staged.push(Staged {
                aggregate_id,
                aggregate_type,
                expected_version: version_before,
                events: uncommitted,
            }),
        }

        Ok(events)
    }

    pub fn is_empty(&self) -> bool {
        self.staged.iter().all(|s| s.events.is_empty())
    }

    fn into_batch(self) -> Vec<StreamAppend> {
        self.staged
            .into_iter()
            .map(|s| StreamAppend {
                aggregate_id: s.aggregate_id,
                aggregate_type: s.aggregate_type.to_string(),
                expected_version: ExpectedVersion::Exact(s.expected_version),
                events: s.events,
            })
            .collect()
    }
}

/// Shared execution engine: store, change feed and record locks.
#[derive(Debug)]
pub struct CommandDispatcher<S, B> {
    store: S,
    bus: B,
    locks: RecordLocks,
    commit_order: Mutex<()>,
}

impl<S, B> CommandDispatcher<S, B> {
    pub fn new(store: S, bus: B) -> Self {
        Self {
            store,
            bus,
            locks: RecordLocks::new(),
            commit_order: Mutex::new(()),
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn bus(&self) -> &B {
        &self.bus
    }

    /// Take the locks for every record an operation will touch.
    pub fn lock<I>(&self, ids: I) -> LedgerResult<RecordLockGuard<'_>>
    where
        I: IntoIterator<Item = AggregateId>,
    {
        Ok(self.locks.acquire(ids)?)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
{
    /// Commit all staged streams as one unit, then publish.
    ///
    /// Append and publication happen under one guard: a subscriber sees
    /// strictly increasing sequence numbers.
    pub fn commit(&self, tx: Transaction) -> LedgerResult<Vec<StoredEvent>> {
        if tx.is_empty() {
            return Ok(vec![]);
        }

        let _ordered = self
            .commit_order
            .lock()
            .map_err(|_| LedgerError::Store(EventStoreError::Poisoned))?;

        let committed = self.store.append(tx.into_batch())?;

        for stored in &committed {
            self.bus
                .publish(stored.to_envelope())
                .map_err(|e| LedgerError::Publish(format!("{e:?}")))?;
        }

        Ok(committed)
    }
}

impl<S, B> CommandDispatcher<S, B>
where
    S: EventStore,
{
    /// Current state of a service, including deleted ones (check
    /// `is_deleted`). A never-created id yields an empty aggregate.
    pub fn load_service(&self, id: ConsultedServiceId) -> LedgerResult<ConsultedService> {
        let mut service = ConsultedService::empty(id);
        self.rehydrate::<_, ConsultedServiceEvent>(&mut service, id.0, SERVICE_AGGREGATE_TYPE)?;
        Ok(service)
    }

    pub fn load_voucher(&self, id: PaymentVoucherId) -> LedgerResult<PaymentVoucher> {
        let mut voucher = PaymentVoucher::empty(id);
        self.rehydrate::<_, PaymentVoucherEvent>(&mut voucher, id.0, VOUCHER_AGGREGATE_TYPE)?;
        Ok(voucher)
    }

    /// Every live service, in creation order.
    pub fn all_services(&self) -> LedgerResult<Vec<ConsultedService>> {
        let mut out = Vec::new();
        for id in self.store.stream_ids(SERVICE_AGGREGATE_TYPE)? {
            let service = self.load_service(ConsultedServiceId::new(id))?;
            if service.is_created() && !service.is_deleted() {
                out.push(service);
            }
        }
        Ok(out)
    }

    /// Every live voucher, in creation order.
    pub fn all_vouchers(&self) -> LedgerResult<Vec<PaymentVoucher>> {
        let mut out = Vec::new();
        for id in self.store.stream_ids(VOUCHER_AGGREGATE_TYPE)? {
            let voucher = self.load_voucher(PaymentVoucherId::new(id))?;
            if voucher.is_created() && !voucher.is_deleted() {
                out.push(voucher);
            }
        }
        Ok(out)
    }

    /// Highest voucher number ever committed, deleted vouchers included.
    pub fn highest_voucher_number(&self) -> LedgerResult<Option<VoucherNumber>> {
        let mut highest = None;
        for id in self.store.stream_ids(VOUCHER_AGGREGATE_TYPE)? {
            let number = self.load_voucher(PaymentVoucherId::new(id))?.number();
            highest = highest.max(number);
        }
        Ok(highest)
    }

    fn rehydrate<A, E>(
        &self,
        aggregate: &mut A,
        aggregate_id: AggregateId,
        aggregate_type: &str,
    ) -> LedgerResult<()>
    where
        A: Aggregate<Event = E>,
        E: DeserializeOwned,
    {
        let history = self.store.load_stream(aggregate_id)?;

        let mut last = 0u64;
        for stored in history {
            if stored.aggregate_type != aggregate_type {
                // Asking for a voucher by a service id (or the reverse).
                return Err(DomainError::not_found(format!(
                    "{aggregate_type} {aggregate_id}"
                ))
                .into());
            }
            if stored.stream_version <= last {
                return Err(LedgerError::Deserialize(format!(
                    "non-monotonic stream version in {aggregate_id} (last={last}, found={})",
                    stored.stream_version
                )));
            }
            last = stored.stream_version;

            let event: E = serde_json::from_value(stored.payload)
                .map_err(|e| LedgerError::Deserialize(e.to_string()))?;
            aggregate.apply(&event);
        }

        Ok(())
    }
}
