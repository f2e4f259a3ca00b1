//! Payment ledger: voucher creation and deletion.
//!
//! Both operations touch one voucher and every service it allocates to, and
//! commit all of those streams in one append. `amount_paid` on a service is
//! therefore always the sum of the live voucher details that point at it.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::{info, warn};

use dentledger_auth::{Actor, AdminAction, require_admin};
use dentledger_consulting::{
    ApplyPayment, ConsultedService, ConsultedServiceCommand, ConsultedServiceEvent,
    ConsultedServiceId, ReversePayment, SERVICE_AGGREGATE_TYPE,
};
use dentledger_core::{AggregateId, CustomerId, DomainError, EmployeeId};
use dentledger_events::{EventBus, EventEnvelope};
use dentledger_payments::{
    CreateVoucher, DeleteVoucher, PaymentAllocation, PaymentVoucher, PaymentVoucherCommand,
    PaymentVoucherId, VOUCHER_AGGREGATE_TYPE, validate_allocations,
};

use crate::command_dispatcher::{CommandDispatcher, LedgerResult, Transaction};
use crate::event_store::EventStore;
use crate::numbering::VoucherNumberAllocator;

/// Input for a new payment voucher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewVoucher {
    pub customer_id: CustomerId,
    pub cashier_id: EmployeeId,
    pub created_by: EmployeeId,
    pub payment_date: DateTime<Utc>,
    pub allocations: Vec<PaymentAllocation>,
    pub notes: Option<String>,
}

pub struct PaymentLedger<S, B, N> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
    numbers: N,
}

impl<S, B, N> PaymentLedger<S, B, N>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    N: VoucherNumberAllocator,
{
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>, numbers: N) -> Self {
        Self {
            dispatcher,
            numbers,
        }
    }

    /// Create a voucher and raise `amount_paid` on every target service.
    ///
    /// Checks, in order: allocations present and non-zero; per allocation the
    /// service exists, belongs to the customer, is confirmed and has enough
    /// remaining debt (cumulative across allocations to the same service).
    /// A number is drawn only after every check passed.
    pub fn create_voucher(
        &self,
        request: NewVoucher,
        now: DateTime<Utc>,
    ) -> LedgerResult<PaymentVoucher> {
        validate_allocations(&request.allocations)?;

        let voucher_id = PaymentVoucherId::new(AggregateId::new());
        let locked = std::iter::once(voucher_id.0)
            .chain(request.allocations.iter().map(|a| a.service_id.0));
        let _guard = self.dispatcher.lock(locked)?;

        let mut tx = Transaction::new();
        let mut services = Loaded::default();

        for allocation in &request.allocations {
            let service = services.get(&self.dispatcher, allocation.service_id)?;
            if service.customer_id() != Some(request.customer_id) {
                return Err(DomainError::validation(format!(
                    "service {} does not belong to customer {}",
                    allocation.service_id, request.customer_id
                ))
                .into());
            }

            let command = ConsultedServiceCommand::ApplyPayment(ApplyPayment {
                service_id: allocation.service_id,
                voucher_id: voucher_id.0,
                amount: allocation.amount,
                occurred_at: now,
            });
            tx.execute(service, allocation.service_id.0, SERVICE_AGGREGATE_TYPE, &command)?;
        }

        let number = self.numbers.generate_next();
        let mut voucher = PaymentVoucher::empty(voucher_id);
        let command = PaymentVoucherCommand::CreateVoucher(CreateVoucher {
            voucher_id,
            number,
            customer_id: request.customer_id,
            cashier_id: request.cashier_id,
            created_by: request.created_by,
            payment_date: request.payment_date,
            allocations: request.allocations,
            notes: request.notes,
            occurred_at: now,
        });
        tx.execute(&mut voucher, voucher_id.0, VOUCHER_AGGREGATE_TYPE, &command)?;

        self.dispatcher.commit(tx)?;

        info!(
            voucher = %number,
            voucher_id = %voucher_id,
            customer_id = %request.customer_id,
            total = voucher.total_amount().amount(),
            details = voucher.details().len(),
            "payment voucher created"
        );
        Ok(voucher)
    }

    /// Delete a voucher and reverse each of its allocations. Admin only.
    ///
    /// Returns the voucher as it was before deletion.
    pub fn delete_voucher(
        &self,
        actor: Actor,
        voucher_id: PaymentVoucherId,
        now: DateTime<Utc>,
    ) -> LedgerResult<PaymentVoucher> {
        if let Err(denied) = require_admin(actor.role, AdminAction::DeletePaymentVoucher) {
            warn!(
                voucher_id = %voucher_id,
                employee_id = %actor.employee_id,
                role = %actor.role,
                "voucher deletion denied"
            );
            return Err(DomainError::from(denied).into());
        }

        // Details never change after creation, so the unlocked read tells us
        // which services to lock.
        let preview = self.live_voucher(voucher_id)?;
        let locked = std::iter::once(voucher_id.0)
            .chain(preview.service_ids().into_iter().map(|id| id.0));
        let _guard = self.dispatcher.lock(locked)?;

        let mut voucher = self.live_voucher(voucher_id)?;
        let before = voucher.clone();

        let mut tx = Transaction::new();
        let mut services = Loaded::default();

        for detail in before.details() {
            let service = services.get(&self.dispatcher, detail.service_id)?;
            let command = ConsultedServiceCommand::ReversePayment(ReversePayment {
                service_id: detail.service_id,
                voucher_id: voucher_id.0,
                amount: detail.amount,
                occurred_at: now,
            });
            let events = tx.execute(service, detail.service_id.0, SERVICE_AGGREGATE_TYPE, &command)?;

            for event in &events {
                if let ConsultedServiceEvent::PaymentReversed(e) = event {
                    if e.clamped {
                        warn!(
                            service_id = %e.service_id,
                            voucher_id = %voucher_id,
                            requested = e.requested.amount(),
                            reversed = e.amount.amount(),
                            "payment reversal clamped at zero"
                        );
                    }
                }
            }
        }

        let command = PaymentVoucherCommand::DeleteVoucher(DeleteVoucher {
            voucher_id,
            actor,
            occurred_at: now,
        });
        tx.execute(&mut voucher, voucher_id.0, VOUCHER_AGGREGATE_TYPE, &command)?;

        self.dispatcher.commit(tx)?;

        info!(
            voucher_id = %voucher_id,
            voucher = ?before.number().map(|n| n.to_string()),
            deleted_by = %actor.employee_id,
            total = before.total_amount().amount(),
            "payment voucher deleted"
        );
        Ok(before)
    }

    /// Live voucher by id.
    pub fn get(&self, voucher_id: PaymentVoucherId) -> LedgerResult<PaymentVoucher> {
        self.live_voucher(voucher_id)
    }

    pub fn list_for_customer(&self, customer_id: CustomerId) -> LedgerResult<Vec<PaymentVoucher>> {
        Ok(self
            .dispatcher
            .all_vouchers()?
            .into_iter()
            .filter(|v| v.customer_id() == Some(customer_id))
            .collect())
    }

    fn live_voucher(&self, voucher_id: PaymentVoucherId) -> LedgerResult<PaymentVoucher> {
        let voucher = self.dispatcher.load_voucher(voucher_id)?;
        if !voucher.is_created() || voucher.is_deleted() {
            return Err(DomainError::not_found(format!("payment voucher {voucher_id}")).into());
        }
        Ok(voucher)
    }
}

/// Services loaded under the current lock, reused across allocations so that
/// repeated allocations see each other's effect.
#[derive(Default)]
struct Loaded {
    services: Vec<ConsultedService>,
}

impl Loaded {
    fn get<S, B>(
        &mut self,
        dispatcher: &CommandDispatcher<S, B>,
        id: ConsultedServiceId,
    ) -> LedgerResult<&mut ConsultedService>
    where
        S: EventStore,
    {
        let idx = match self.services.iter().position(|s| s.id_typed() == id) {
            Some(idx) => idx,
            None => {
                let service = dispatcher.load_service(id)?;
                if !service.is_created() || service.is_deleted() {
                    return Err(DomainError::not_found(format!("consulted service {id}")).into());
                }
                self.services.push(service);
                self.services.len() - 1
            }
        };
        Ok(&mut self.services[idx])
    }
}
