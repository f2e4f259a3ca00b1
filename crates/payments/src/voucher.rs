use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dentledger_auth::{Actor, AdminAction, require_admin};
use dentledger_consulting::ConsultedServiceId;
use dentledger_core::{
    Aggregate, AggregateId, AggregateRoot, CustomerId, DomainError, DomainResult, EmployeeId, Entity,
    Money,
};
use dentledger_events::Event;

use crate::{PaymentMethod, VoucherNumber};

/// Record kind carried on change-feed envelopes.
pub const VOUCHER_AGGREGATE_TYPE: &str = "payments.voucher";

/// Payment voucher identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PaymentVoucherId(pub AggregateId);

impl PaymentVoucherId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for PaymentVoucherId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Requested allocation of part of a payment to one service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentAllocation {
    pub service_id: ConsultedServiceId,
    pub amount: Money,
    pub method: PaymentMethod,
}

/// Allocation line owned by a voucher.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentVoucherDetail {
    pub voucher_id: PaymentVoucherId,
    /// 1-based position within the voucher.
    pub line_no: u32,
    pub service_id: ConsultedServiceId,
    pub amount: Money,
    pub method: PaymentMethod,
}

impl PaymentVoucherDetail {
    pub fn new(
        voucher_id: PaymentVoucherId,
        line_no: u32,
        allocation: &PaymentAllocation,
    ) -> Self {
        Self {
            voucher_id,
            line_no,
            service_id: allocation.service_id,
            amount: allocation.amount,
            method: allocation.method,
        }
    }
}

/// Details are identified by their line number within the owning voucher.
impl Entity for PaymentVoucherDetail {
    type Id = u32;

    fn id(&self) -> &Self::Id {
        &self.line_no
    }
}

/// Aggregate root: PaymentVoucher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentVoucher {
    id: PaymentVoucherId,
    number: Option<VoucherNumber>,
    customer_id: Option<CustomerId>,
    cashier_id: Option<EmployeeId>,
    created_by: Option<EmployeeId>,
    payment_date: Option<DateTime<Utc>>,
    total_amount: Money,
    details: Vec<PaymentVoucherDetail>,
    notes: Option<String>,
    created_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
    deleted: bool,
}

impl PaymentVoucher {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: PaymentVoucherId) -> Self {
        Self {
            id,
            number: None,
            customer_id: None,
            cashier_id: None,
            created_by: None,
            payment_date: None,
            total_amount: Money::ZERO,
            details: Vec::new(),
            notes: None,
            created_at: None,
            version: 0,
            created: false,
            deleted: false,
        }
    }

    pub fn id_typed(&self) -> PaymentVoucherId {
        self.id
    }

    pub fn number(&self) -> Option<VoucherNumber> {
        self.number
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    pub fn cashier_id(&self) -> Option<EmployeeId> {
        self.cashier_id
    }

    pub fn created_by(&self) -> Option<EmployeeId> {
        self.created_by
    }

    pub fn payment_date(&self) -> Option<DateTime<Utc>> {
        self.payment_date
    }

    pub fn total_amount(&self) -> Money {
        self.total_amount
    }

    pub fn details(&self) -> &[PaymentVoucherDetail] {
        &self.details
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Distinct target services, in first-allocation order.
    pub fn service_ids(&self) -> Vec<ConsultedServiceId> {
        let mut ids = Vec::with_capacity(self.details.len());
        for d in &self.details {
            if !ids.contains(&d.service_id) {
                ids.push(d.service_id);
            }
        }
        ids
    }
}

impl AggregateRoot for PaymentVoucher {
    type Id = PaymentVoucherId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: CreateVoucher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateVoucher {
    pub voucher_id: PaymentVoucherId,
    pub number: VoucherNumber,
    pub customer_id: CustomerId,
    pub cashier_id: EmployeeId,
    pub created_by: EmployeeId,
    pub payment_date: DateTime<Utc>,
    pub allocations: Vec<PaymentAllocation>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteVoucher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteVoucher {
    pub voucher_id: PaymentVoucherId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentVoucherCommand {
    CreateVoucher(CreateVoucher),
    DeleteVoucher(DeleteVoucher),
}

/// Event: VoucherCreated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherCreated {
    pub voucher_id: PaymentVoucherId,
    pub number: VoucherNumber,
    pub customer_id: CustomerId,
    pub cashier_id: EmployeeId,
    pub created_by: EmployeeId,
    pub payment_date: DateTime<Utc>,
    pub total_amount: Money,
    pub details: Vec<PaymentVoucherDetail>,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: VoucherDeleted. Carries the details whose effect was reversed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VoucherDeleted {
    pub voucher_id: PaymentVoucherId,
    pub number: VoucherNumber,
    pub customer_id: CustomerId,
    pub total_amount: Money,
    pub details: Vec<PaymentVoucherDetail>,
    pub deleted_by: EmployeeId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PaymentVoucherEvent {
    VoucherCreated(VoucherCreated),
    VoucherDeleted(VoucherDeleted),
}

impl Event for PaymentVoucherEvent {
    fn event_type(&self) -> &'static str {
        match self {
            PaymentVoucherEvent::VoucherCreated(_) => "payments.voucher.created",
            PaymentVoucherEvent::VoucherDeleted(_) => "payments.voucher.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            PaymentVoucherEvent::VoucherCreated(e) => e.occurred_at,
            PaymentVoucherEvent::VoucherDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for PaymentVoucher {
    type Command = PaymentVoucherCommand;
    type Event = PaymentVoucherEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            PaymentVoucherEvent::VoucherCreated(e) => {
                self.id = e.voucher_id;
                self.number = Some(e.number);
                self.customer_id = Some(e.customer_id);
                self.cashier_id = Some(e.cashier_id);
                self.created_by = Some(e.created_by);
                self.payment_date = Some(e.payment_date);
                self.total_amount = e.total_amount;
                self.details = e.details.clone();
                self.notes = e.notes.clone();
                self.created_at = Some(e.occurred_at);
                self.created = true;
            }
            PaymentVoucherEvent::VoucherDeleted(_) => {
                self.details.clear();
                self.deleted = true;
            }
        }

        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            PaymentVoucherCommand::CreateVoucher(cmd) => self.handle_create(cmd),
            PaymentVoucherCommand::DeleteVoucher(cmd) => self.handle_delete(cmd),
        }
    }
}

/// Shape checks shared by voucher creation and the ledger's pre-checks:
/// at least one allocation, no zero amounts. Returns the voucher total.
pub fn validate_allocations(allocations: &[PaymentAllocation]) -> DomainResult<Money> {
    if allocations.is_empty() {
        return Err(DomainError::EmptyAllocation);
    }
    if let Some(pos) = allocations.iter().position(|a| a.amount.is_zero()) {
        return Err(DomainError::validation(format!(
            "allocation #{} has a zero amount",
            pos + 1
        )));
    }
    Money::try_sum(allocations.iter().map(|a| a.amount))
}

impl PaymentVoucher {
    fn handle_create(&self, cmd: &CreateVoucher) -> Result<Vec<PaymentVoucherEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("payment voucher already exists"));
        }
        let total_amount = validate_allocations(&cmd.allocations)?;
        let details = cmd
            .allocations
            .iter()
            .zip(1u32..)
            .map(|(a, line_no)| PaymentVoucherDetail::new(cmd.voucher_id, line_no, a))
            .collect();

        Ok(vec![PaymentVoucherEvent::VoucherCreated(VoucherCreated {
            voucher_id: cmd.voucher_id,
            number: cmd.number,
            customer_id: cmd.customer_id,
            cashier_id: cmd.cashier_id,
            created_by: cmd.created_by,
            payment_date: cmd.payment_date,
            total_amount,
            details,
            notes: cmd.notes.clone().filter(|n| !n.is_empty()),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteVoucher) -> Result<Vec<PaymentVoucherEvent>, DomainError> {
        require_admin(cmd.actor.role, AdminAction::DeletePaymentVoucher)?;

        if self.id != cmd.voucher_id {
            return Err(DomainError::invariant("voucher_id mismatch"));
        }
        let (Some(number), Some(customer_id)) = (self.number, self.customer_id) else {
            return Err(DomainError::not_found(format!("payment voucher {}", cmd.voucher_id)));
        };
        if self.deleted {
            return Err(DomainError::not_found(format!("payment voucher {}", cmd.voucher_id)));
        }

        Ok(vec![PaymentVoucherEvent::VoucherDeleted(VoucherDeleted {
            voucher_id: cmd.voucher_id,
            number,
            customer_id,
            total_amount: self.total_amount,
            details: self.details.clone(),
            deleted_by: cmd.actor.employee_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}
