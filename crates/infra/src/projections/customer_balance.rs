//! Customer balances projection.
//!
//! Tracks, per customer, the total of confirmed service prices, the total
//! paid against them and the remaining debt. Built from the service events on
//! the change feed; voucher events carry no extra money information since
//! every allocation is mirrored by a `payment_applied` on its service.

use std::collections::HashMap;

use serde::Serialize;
use serde_json::Value as JsonValue;
use tracing::warn;

use dentledger_consulting::{ConsultedServiceEvent, ConsultedServiceId, SERVICE_AGGREGATE_TYPE};
use dentledger_core::{CustomerId, Money};
use dentledger_events::{EventEnvelope, Projection};

/// Read model: money position of one customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CustomerBalance {
    pub customer_id: CustomerId,
    pub confirmed_total: Money,
    pub paid_total: Money,
    pub debt: Money,
    pub open_service_count: u32,
}

impl CustomerBalance {
    pub fn new(customer_id: CustomerId) -> Self {
        Self {
            customer_id,
            confirmed_total: Money::ZERO,
            paid_total: Money::ZERO,
            debt: Money::ZERO,
            open_service_count: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct ServiceLine {
    customer_id: CustomerId,
    confirmed: bool,
    final_price: Money,
    amount_paid: Money,
}

/// Per-service state is kept with absolute values (`new_amount_paid`,
/// `final_price`) so replaying an envelope twice changes nothing.
#[derive(Debug, Default)]
pub struct CustomerBalanceProjection {
    lines: HashMap<ConsultedServiceId, ServiceLine>,
    skipped: u64,
}

impl CustomerBalanceProjection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Balance of one customer; all zeros when nothing is known about them.
    pub fn get(&self, customer_id: CustomerId) -> CustomerBalance {
        let mut balance = CustomerBalance::new(customer_id);
        for line in self
            .lines
            .values()
            .filter(|l| l.customer_id == customer_id && l.confirmed)
        {
            balance.confirmed_total = balance.confirmed_total.saturating_add(line.final_price);
            balance.paid_total = balance.paid_total.saturating_add(line.amount_paid);
            let debt = line.final_price.saturating_sub(line.amount_paid);
            balance.debt = balance.debt.saturating_add(debt);
            if !debt.is_zero() {
                balance.open_service_count += 1;
            }
        }
        balance
    }

    /// Customers that still owe money.
    pub fn list_with_debt(&self) -> Vec<CustomerBalance> {
        let mut customers: Vec<CustomerId> = self.lines.values().map(|l| l.customer_id).collect();
        customers.sort_by_key(|c| *c.as_uuid());
        customers.dedup();
        customers
            .into_iter()
            .map(|c| self.get(c))
            .filter(|b| !b.debt.is_zero())
            .collect()
    }

    /// Envelopes that looked like service events but did not decode.
    pub fn skipped(&self) -> u64 {
        self.skipped
    }

    fn apply_event(&mut self, event: ConsultedServiceEvent) {
        match event {
            ConsultedServiceEvent::ServiceProposed(e) => {
                self.lines.insert(
                    e.service_id,
                    ServiceLine {
                        customer_id: e.customer_id,
                        confirmed: false,
                        final_price: e.final_price,
                        amount_paid: Money::ZERO,
                    },
                );
            }
            ConsultedServiceEvent::ServiceFieldsUpdated(e) => {
                if let Some(line) = self.lines.get_mut(&e.service_id) {
                    line.final_price = e.final_price;
                }
            }
            ConsultedServiceEvent::ServiceConfirmed(e) => {
                if let Some(line) = self.lines.get_mut(&e.service_id) {
                    line.confirmed = true;
                    line.final_price = e.final_price;
                }
            }
            ConsultedServiceEvent::PaymentApplied(e) => {
                if let Some(line) = self.lines.get_mut(&e.service_id) {
                    line.amount_paid = e.new_amount_paid;
                }
            }
            ConsultedServiceEvent::PaymentReversed(e) => {
                if let Some(line) = self.lines.get_mut(&e.service_id) {
                    line.amount_paid = e.new_amount_paid;
                }
            }
            ConsultedServiceEvent::ServiceDeleted(e) => {
                self.lines.remove(&e.service_id);
            }
            ConsultedServiceEvent::TreatmentStatusChanged(_) => {}
        }
    }
}

impl Projection for CustomerBalanceProjection {
    type Payload = JsonValue;

    fn apply(&mut self, envelope: &EventEnvelope<JsonValue>) {
        if envelope.aggregate_type() != SERVICE_AGGREGATE_TYPE {
            return;
        }

        match serde_json::from_value::<ConsultedServiceEvent>(envelope.payload().clone()) {
            Ok(event) => self.apply_event(event),
            Err(e) => {
                self.skipped += 1;
                warn!(
                    event_type = envelope.event_type(),
                    sequence_number = envelope.sequence_number(),
                    error = %e,
                    "customer balance projection skipped an undecodable event"
                );
            }
        }
    }
}
