use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dentledger_auth::{Actor, AdminAction, StaffEditPolicy, require_admin, require_staff_edit};
use dentledger_core::{
    Aggregate, AggregateId, AggregateRoot, CustomerId, DentalServiceId, DomainError, DomainResult,
    EmployeeId, Money,
};
use dentledger_events::Event;

use crate::catalog::DentalServiceTemplate;
use crate::patch::ServicePatch;

/// Record kind carried on change-feed envelopes.
pub const SERVICE_AGGREGATE_TYPE: &str = "consulting.service";

/// Consulted service identifier.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConsultedServiceId(pub AggregateId);

impl ConsultedServiceId {
    pub fn new(id: AggregateId) -> Self {
        Self(id)
    }
}

impl core::fmt::Display for ConsultedServiceId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

/// Billing status. `Confirmed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ServiceStatus {
    Proposed,
    Confirmed,
}

/// Treatment progress, tracked independently of billing status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreatmentStatus {
    #[default]
    NotStarted,
    InProgress,
    Completed,
}

/// Staff credited on a service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StaffAssignment {
    pub consulting_doctor_id: Option<EmployeeId>,
    pub treating_doctor_id: Option<EmployeeId>,
    pub consulting_sale_id: Option<EmployeeId>,
}

/// Derived money view of a service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceBalance {
    pub final_price: Money,
    pub amount_paid: Money,
    pub debt: Money,
}

/// The one place that computes `final_price` and `debt`.
///
/// Fails when the line total overflows or when `amount_paid` exceeds the
/// final price (a debt can never go negative).
pub fn derive(
    quantity: u32,
    negotiated_unit_price: Money,
    amount_paid: Money,
) -> DomainResult<ServiceBalance> {
    let final_price = negotiated_unit_price.times(quantity)?;
    let debt = final_price.checked_sub(amount_paid)?;
    Ok(ServiceBalance {
        final_price,
        amount_paid,
        debt,
    })
}

/// Aggregate root: ConsultedService.
///
/// A billable line item proposed to a customer. Base fields freeze on
/// confirmation; staff credits stay editable under the staff edit policy;
/// `amount_paid` only moves through voucher allocations and their reversal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsultedService {
    id: ConsultedServiceId,
    customer_id: Option<CustomerId>,
    dental_service_id: Option<DentalServiceId>,
    service_name: String,
    unit: String,
    quantity: u32,
    unit_price: Money,
    negotiated_unit_price: Money,
    final_price: Money,
    amount_paid: Money,
    status: ServiceStatus,
    confirmed_at: Option<DateTime<Utc>>,
    treatment_status: TreatmentStatus,
    staff: StaffAssignment,
    tooth_positions: Vec<String>,
    notes: Option<String>,
    created_by: Option<EmployeeId>,
    updated_by: Option<EmployeeId>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    version: u64,
    created: bool,
    deleted: bool,
}

impl ConsultedService {
    /// Create an empty, not-yet-created aggregate instance for rehydration.
    pub fn empty(id: ConsultedServiceId) -> Self {
        Self {
            id,
            customer_id: None,
            dental_service_id: None,
            service_name: String::new(),
            unit: String::new(),
            quantity: 0,
            unit_price: Money::ZERO,
            negotiated_unit_price: Money::ZERO,
            final_price: Money::ZERO,
            amount_paid: Money::ZERO,
            status: ServiceStatus::Proposed,
            confirmed_at: None,
            treatment_status: TreatmentStatus::NotStarted,
            staff: StaffAssignment::default(),
            tooth_positions: Vec::new(),
            notes: None,
            created_by: None,
            updated_by: None,
            created_at: None,
            updated_at: None,
            version: 0,
            created: false,
            deleted: false,
        }
    }

    /// Rebuild a service from its event history.
    pub fn from_events<'a, I>(id: ConsultedServiceId, events: I) -> Self
    where
        I: IntoIterator<Item = &'a ConsultedServiceEvent>,
    {
        let mut service = Self::empty(id);
        for event in events {
            service.apply(event);
        }
        service
    }

    pub fn id_typed(&self) -> ConsultedServiceId {
        self.id
    }

    pub fn customer_id(&self) -> Option<CustomerId> {
        self.customer_id
    }

    pub fn dental_service_id(&self) -> Option<DentalServiceId> {
        self.dental_service_id
    }

    pub fn service_name(&self) -> &str {
        &self.service_name
    }

    pub fn unit(&self) -> &str {
        &self.unit
    }

    pub fn quantity(&self) -> u32 {
        self.quantity
    }

    pub fn unit_price(&self) -> Money {
        self.unit_price
    }

    pub fn negotiated_unit_price(&self) -> Money {
        self.negotiated_unit_price
    }

    pub fn final_price(&self) -> Money {
        self.final_price
    }

    pub fn amount_paid(&self) -> Money {
        self.amount_paid
    }

    pub fn debt(&self) -> Money {
        self.final_price.saturating_sub(self.amount_paid)
    }

    pub fn balance(&self) -> ServiceBalance {
        ServiceBalance {
            final_price: self.final_price,
            amount_paid: self.amount_paid,
            debt: self.debt(),
        }
    }

    pub fn status(&self) -> ServiceStatus {
        self.status
    }

    pub fn confirmed_at(&self) -> Option<DateTime<Utc>> {
        self.confirmed_at
    }

    pub fn treatment_status(&self) -> TreatmentStatus {
        self.treatment_status
    }

    pub fn staff(&self) -> &StaffAssignment {
        &self.staff
    }

    pub fn tooth_positions(&self) -> &[String] {
        &self.tooth_positions
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn created_by(&self) -> Option<EmployeeId> {
        self.created_by
    }

    pub fn updated_by(&self) -> Option<EmployeeId> {
        self.updated_by
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    pub fn is_created(&self) -> bool {
        self.created
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn is_confirmed(&self) -> bool {
        self.status == ServiceStatus::Confirmed
    }

    /// Treatment may only be logged against a confirmed service.
    pub fn is_treatable(&self) -> bool {
        self.created && !self.deleted && self.is_confirmed()
    }
}

impl AggregateRoot for ConsultedService {
    type Id = ConsultedServiceId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Command: ProposeService.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProposeService {
    pub service_id: ConsultedServiceId,
    pub customer_id: CustomerId,
    pub template: DentalServiceTemplate,
    pub quantity: u32,
    /// Defaults to the template's price.
    pub negotiated_unit_price: Option<Money>,
    pub tooth_positions: Vec<String>,
    pub notes: Option<String>,
    pub staff: StaffAssignment,
    pub proposed_by: EmployeeId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: UpdateServiceFields.
///
/// A catalog-reference change must already be expanded with
/// [`ServicePatch::with_template`]; the aggregate never reads the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateServiceFields {
    pub service_id: ConsultedServiceId,
    pub actor: Actor,
    pub patch: ServicePatch,
    pub policy: StaffEditPolicy,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ConfirmService.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmService {
    pub service_id: ConsultedServiceId,
    pub confirmed_by: EmployeeId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: SetTreatmentStatus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetTreatmentStatus {
    pub service_id: ConsultedServiceId,
    pub status: TreatmentStatus,
    pub updated_by: EmployeeId,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ApplyPayment (one voucher allocation).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplyPayment {
    pub service_id: ConsultedServiceId,
    pub voucher_id: AggregateId,
    pub amount: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Command: ReversePayment (voucher deletion).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReversePayment {
    pub service_id: ConsultedServiceId,
    pub voucher_id: AggregateId,
    pub amount: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DeleteService.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeleteService {
    pub service_id: ConsultedServiceId,
    pub actor: Actor,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConsultedServiceCommand {
    ProposeService(ProposeService),
    UpdateServiceFields(UpdateServiceFields),
    ConfirmService(ConfirmService),
    SetTreatmentStatus(SetTreatmentStatus),
    ApplyPayment(ApplyPayment),
    ReversePayment(ReversePayment),
    DeleteService(DeleteService),
}

/// Event: ServiceProposed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceProposed {
    pub service_id: ConsultedServiceId,
    pub customer_id: CustomerId,
    pub dental_service_id: DentalServiceId,
    pub service_name: String,
    pub unit: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub negotiated_unit_price: Money,
    pub final_price: Money,
    pub tooth_positions: Vec<String>,
    pub notes: Option<String>,
    pub staff: StaffAssignment,
    pub proposed_by: EmployeeId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ServiceFieldsUpdated. `changes` holds only effective differences.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceFieldsUpdated {
    pub service_id: ConsultedServiceId,
    pub customer_id: CustomerId,
    pub changes: ServicePatch,
    pub final_price: Money,
    pub updated_by: EmployeeId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ServiceConfirmed. `occurred_at` is the confirmation date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceConfirmed {
    pub service_id: ConsultedServiceId,
    pub customer_id: CustomerId,
    pub final_price: Money,
    pub confirmed_by: EmployeeId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: TreatmentStatusChanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreatmentStatusChanged {
    pub service_id: ConsultedServiceId,
    pub from: TreatmentStatus,
    pub to: TreatmentStatus,
    pub updated_by: EmployeeId,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentApplied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentApplied {
    pub service_id: ConsultedServiceId,
    pub customer_id: CustomerId,
    pub voucher_id: AggregateId,
    pub amount: Money,
    pub new_amount_paid: Money,
    pub occurred_at: DateTime<Utc>,
}

/// Event: PaymentReversed.
///
/// `amount` is what was actually taken off; it is lower than `requested`
/// only when the reversal was clamped at zero.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentReversed {
    pub service_id: ConsultedServiceId,
    pub customer_id: CustomerId,
    pub voucher_id: AggregateId,
    pub requested: Money,
    pub amount: Money,
    pub new_amount_paid: Money,
    pub clamped: bool,
    pub occurred_at: DateTime<Utc>,
}

/// Event: ServiceDeleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDeleted {
    pub service_id: ConsultedServiceId,
    pub customer_id: CustomerId,
    pub was_confirmed: bool,
    pub final_price: Money,
    pub deleted_by: EmployeeId,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConsultedServiceEvent {
    ServiceProposed(ServiceProposed),
    ServiceFieldsUpdated(ServiceFieldsUpdated),
    ServiceConfirmed(ServiceConfirmed),
    TreatmentStatusChanged(TreatmentStatusChanged),
    PaymentApplied(PaymentApplied),
    PaymentReversed(PaymentReversed),
    ServiceDeleted(ServiceDeleted),
}

impl Event for ConsultedServiceEvent {
    fn event_type(&self) -> &'static str {
        match self {
            ConsultedServiceEvent::ServiceProposed(_) => "consulting.service.proposed",
            ConsultedServiceEvent::ServiceFieldsUpdated(_) => "consulting.service.fields_updated",
            ConsultedServiceEvent::ServiceConfirmed(_) => "consulting.service.confirmed",
            ConsultedServiceEvent::TreatmentStatusChanged(_) => {
                "consulting.service.treatment_status_changed"
            }
            ConsultedServiceEvent::PaymentApplied(_) => "consulting.service.payment_applied",
            ConsultedServiceEvent::PaymentReversed(_) => "consulting.service.payment_reversed",
            ConsultedServiceEvent::ServiceDeleted(_) => "consulting.service.deleted",
        }
    }

    fn version(&self) -> u32 {
        1
    }

    fn occurred_at(&self) -> DateTime<Utc> {
        match self {
            ConsultedServiceEvent::ServiceProposed(e) => e.occurred_at,
            ConsultedServiceEvent::ServiceFieldsUpdated(e) => e.occurred_at,
            ConsultedServiceEvent::ServiceConfirmed(e) => e.occurred_at,
            ConsultedServiceEvent::TreatmentStatusChanged(e) => e.occurred_at,
            ConsultedServiceEvent::PaymentApplied(e) => e.occurred_at,
            ConsultedServiceEvent::PaymentReversed(e) => e.occurred_at,
            ConsultedServiceEvent::ServiceDeleted(e) => e.occurred_at,
        }
    }
}

impl Aggregate for ConsultedService {
    type Command = ConsultedServiceCommand;
    type Event = ConsultedServiceEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ConsultedServiceEvent::ServiceProposed(e) => {
                self.id = e.service_id;
                self.customer_id = Some(e.customer_id);
                self.dental_service_id = Some(e.dental_service_id);
                self.service_name = e.service_name.clone();
                self.unit = e.unit.clone();
                self.quantity = e.quantity;
                self.unit_price = e.unit_price;
                self.negotiated_unit_price = e.negotiated_unit_price;
                self.final_price = e.final_price;
                self.amount_paid = Money::ZERO;
                self.status = ServiceStatus::Proposed;
                self.confirmed_at = None;
                self.treatment_status = TreatmentStatus::NotStarted;
                self.staff = e.staff;
                self.tooth_positions = e.tooth_positions.clone();
                self.notes = e.notes.clone();
                self.created_by = Some(e.proposed_by);
                self.updated_by = Some(e.proposed_by);
                self.created_at = Some(e.occurred_at);
                self.updated_at = Some(e.occurred_at);
                self.created = true;
            }
            ConsultedServiceEvent::ServiceFieldsUpdated(e) => {
                let c = &e.changes;
                if let Some(name) = &c.service_name {
                    self.service_name = name.clone();
                }
                if let Some(unit) = &c.unit {
                    self.unit = unit.clone();
                }
                if let Some(id) = c.dental_service_id {
                    self.dental_service_id = Some(id);
                }
                if let Some(price) = c.unit_price {
                    self.unit_price = price;
                }
                if let Some(quantity) = c.quantity {
                    self.quantity = quantity;
                }
                if let Some(price) = c.negotiated_unit_price {
                    self.negotiated_unit_price = price;
                }
                if let Some(teeth) = &c.tooth_positions {
                    self.tooth_positions = teeth.clone();
                }
                if let Some(notes) = &c.notes {
                    self.notes = (!notes.is_empty()).then(|| notes.clone());
                }
                if let Some(change) = c.consulting_doctor_id {
                    self.staff.consulting_doctor_id = change.resolve();
                }
                if let Some(change) = c.treating_doctor_id {
                    self.staff.treating_doctor_id = change.resolve();
                }
                if let Some(change) = c.consulting_sale_id {
                    self.staff.consulting_sale_id = change.resolve();
                }
                self.final_price = e.final_price;
                self.touch(e.updated_by, e.occurred_at);
            }
            ConsultedServiceEvent::ServiceConfirmed(e) => {
                self.status = ServiceStatus::Confirmed;
                self.confirmed_at = Some(e.occurred_at);
                self.touch(e.confirmed_by, e.occurred_at);
            }
            ConsultedServiceEvent::TreatmentStatusChanged(e) => {
                self.treatment_status = e.to;
                self.touch(e.updated_by, e.occurred_at);
            }
            ConsultedServiceEvent::PaymentApplied(e) => {
                self.amount_paid = e.new_amount_paid;
                self.updated_at = Some(e.occurred_at);
            }
            ConsultedServiceEvent::PaymentReversed(e) => {
                self.amount_paid = e.new_amount_paid;
                self.updated_at = Some(e.occurred_at);
            }
            ConsultedServiceEvent::ServiceDeleted(e) => {
                self.deleted = true;
                self.touch(e.deleted_by, e.occurred_at);
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ConsultedServiceCommand::ProposeService(cmd) => self.handle_propose(cmd),
            ConsultedServiceCommand::UpdateServiceFields(cmd) => self.handle_update(cmd),
            ConsultedServiceCommand::ConfirmService(cmd) => self.handle_confirm(cmd),
            ConsultedServiceCommand::SetTreatmentStatus(cmd) => self.handle_treatment(cmd),
            ConsultedServiceCommand::ApplyPayment(cmd) => self.handle_apply_payment(cmd),
            ConsultedServiceCommand::ReversePayment(cmd) => self.handle_reverse_payment(cmd),
            ConsultedServiceCommand::DeleteService(cmd) => self.handle_delete(cmd),
        }
    }
}

impl ConsultedService {
    fn touch(&mut self, by: EmployeeId, at: DateTime<Utc>) {
        self.updated_by = Some(by);
        self.updated_at = Some(at);
    }

    /// Live means created and not deleted; anything else reads as missing.
    fn ensure_live(&self, service_id: ConsultedServiceId) -> Result<CustomerId, DomainError> {
        if self.id != service_id {
            return Err(DomainError::invariant("service_id mismatch"));
        }
        match self.customer_id {
            Some(customer_id) if self.created && !self.deleted => Ok(customer_id),
            _ => Err(DomainError::not_found(format!("consulted service {service_id}"))),
        }
    }

    fn ensure_confirmed(&self) -> Result<DateTime<Utc>, DomainError> {
        match (self.status, self.confirmed_at) {
            (ServiceStatus::Confirmed, Some(at)) => Ok(at),
            _ => Err(DomainError::NotConfirmed(self.id.to_string())),
        }
    }

    fn handle_propose(&self, cmd: &ProposeService) -> Result<Vec<ConsultedServiceEvent>, DomainError> {
        if self.created {
            return Err(DomainError::conflict("consulted service already exists"));
        }
        if cmd.quantity == 0 {
            return Err(DomainError::validation("quantity must be at least 1"));
        }
        if cmd.template.name.trim().is_empty() {
            return Err(DomainError::validation("service name must not be empty"));
        }

        let negotiated = cmd
            .negotiated_unit_price
            .unwrap_or(cmd.template.default_price);
        let balance = derive(cmd.quantity, negotiated, Money::ZERO)?;

        Ok(vec![ConsultedServiceEvent::ServiceProposed(ServiceProposed {
            service_id: cmd.service_id,
            customer_id: cmd.customer_id,
            dental_service_id: cmd.template.id,
            service_name: cmd.template.name.clone(),
            unit: cmd.template.unit.clone(),
            quantity: cmd.quantity,
            unit_price: cmd.template.default_price,
            negotiated_unit_price: negotiated,
            final_price: balance.final_price,
            tooth_positions: cmd.tooth_positions.clone(),
            notes: cmd.notes.clone().filter(|n| !n.is_empty()),
            staff: cmd.staff,
            proposed_by: cmd.proposed_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_update(
        &self,
        cmd: &UpdateServiceFields,
    ) -> Result<Vec<ConsultedServiceEvent>, DomainError> {
        let customer_id = self.ensure_live(cmd.service_id)?;

        if cmd.patch.is_empty() {
            return Err(DomainError::validation("update must set at least one field"));
        }

        let changes = cmd.patch.changes_against(self);
        if changes.is_empty() {
            return Ok(vec![]);
        }

        if self.is_confirmed() {
            if changes.touches_base_fields() {
                return Err(DomainError::locked(format!(
                    "cannot change {} on a confirmed service",
                    changes.base_field_names().join(", ")
                )));
            }
            let confirmed_at = self.ensure_confirmed()?;
            let decision = cmd
                .policy
                .explain(cmd.actor.role, confirmed_at, cmd.occurred_at);
            require_staff_edit(decision)?;
        }

        if changes.quantity == Some(0) {
            return Err(DomainError::validation("quantity must be at least 1"));
        }
        if changes
            .service_name
            .as_deref()
            .is_some_and(|n| n.trim().is_empty())
        {
            return Err(DomainError::validation("service name must not be empty"));
        }

        let balance = derive(
            changes.quantity.unwrap_or(self.quantity),
            changes
                .negotiated_unit_price
                .unwrap_or(self.negotiated_unit_price),
            self.amount_paid,
        )?;

        Ok(vec![ConsultedServiceEvent::ServiceFieldsUpdated(
            ServiceFieldsUpdated {
                service_id: cmd.service_id,
                customer_id,
                changes,
                final_price: balance.final_price,
                updated_by: cmd.actor.employee_id,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_confirm(&self, cmd: &ConfirmService) -> Result<Vec<ConsultedServiceEvent>, DomainError> {
        let customer_id = self.ensure_live(cmd.service_id)?;

        if self.is_confirmed() {
            return Err(DomainError::AlreadyConfirmed);
        }

        Ok(vec![ConsultedServiceEvent::ServiceConfirmed(ServiceConfirmed {
            service_id: cmd.service_id,
            customer_id,
            final_price: self.final_price,
            confirmed_by: cmd.confirmed_by,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_treatment(
        &self,
        cmd: &SetTreatmentStatus,
    ) -> Result<Vec<ConsultedServiceEvent>, DomainError> {
        self.ensure_live(cmd.service_id)?;
        self.ensure_confirmed()?;

        if self.treatment_status == cmd.status {
            return Ok(vec![]);
        }

        Ok(vec![ConsultedServiceEvent::TreatmentStatusChanged(
            TreatmentStatusChanged {
                service_id: cmd.service_id,
                from: self.treatment_status,
                to: cmd.status,
                updated_by: cmd.updated_by,
                occurred_at: cmd.occurred_at,
            },
        )])
    }

    fn handle_apply_payment(
        &self,
        cmd: &ApplyPayment,
    ) -> Result<Vec<ConsultedServiceEvent>, DomainError> {
        let customer_id = self.ensure_live(cmd.service_id)?;
        self.ensure_confirmed()?;

        if cmd.amount.is_zero() {
            return Err(DomainError::validation("allocation amount must be positive"));
        }

        let remaining = self.debt();
        if cmd.amount > remaining {
            return Err(DomainError::OverAllocation {
                service: cmd.service_id.to_string(),
                requested: cmd.amount,
                remaining,
            });
        }

        let new_amount_paid = self.amount_paid.checked_add(cmd.amount)?;

        Ok(vec![ConsultedServiceEvent::PaymentApplied(PaymentApplied {
            service_id: cmd.service_id,
            customer_id,
            voucher_id: cmd.voucher_id,
            amount: cmd.amount,
            new_amount_paid,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_reverse_payment(
        &self,
        cmd: &ReversePayment,
    ) -> Result<Vec<ConsultedServiceEvent>, DomainError> {
        let customer_id = self.ensure_live(cmd.service_id)?;

        let clamped = cmd.amount > self.amount_paid;
        let amount = cmd.amount.min(self.amount_paid);

        Ok(vec![ConsultedServiceEvent::PaymentReversed(PaymentReversed {
            service_id: cmd.service_id,
            customer_id,
            voucher_id: cmd.voucher_id,
            requested: cmd.amount,
            amount,
            new_amount_paid: self.amount_paid.saturating_sub(cmd.amount),
            clamped,
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_delete(&self, cmd: &DeleteService) -> Result<Vec<ConsultedServiceEvent>, DomainError> {
        let customer_id = self.ensure_live(cmd.service_id)?;

        if self.is_confirmed() {
            require_admin(cmd.actor.role, AdminAction::DeleteConfirmedService)?;

            if !self.amount_paid.is_zero() {
                return Err(DomainError::conflict(format!(
                    "service {} still has {} paid through vouchers; delete those vouchers first",
                    cmd.service_id, self.amount_paid
                )));
            }
        }

        Ok(vec![ConsultedServiceEvent::ServiceDeleted(ServiceDeleted {
            service_id: cmd.service_id,
            customer_id,
            was_confirmed: self.is_confirmed(),
            final_price: self.final_price,
            deleted_by: cmd.actor.employee_id,
            occurred_at: cmd.occurred_at,
        })])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::patch::StaffChange;
    use chrono::{Duration, TimeZone};
    use dentledger_auth::Role;
    use proptest::prelude::*;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, 10, 0, 0).unwrap()
    }

    fn template(price: u64) -> DentalServiceTemplate {
        DentalServiceTemplate {
            id: DentalServiceId::new(),
            name: "Porcelain crown".to_string(),
            unit: "tooth".to_string(),
            default_price: Money::new(price),
        }
    }

    fn actor(role: Role) -> Actor {
        Actor::new(EmployeeId::new(), role)
    }

    fn run(service: &mut ConsultedService, cmd: ConsultedServiceCommand) -> DomainResult<()> {
        let events = service.handle(&cmd)?;
        for e in &events {
            service.apply(e);
        }
        Ok(())
    }

    fn proposed(quantity: u32, negotiated: u64) -> ConsultedService {
        let id = ConsultedServiceId::new(AggregateId::new());
        let mut service = ConsultedService::empty(id);
        run(
            &mut service,
            ConsultedServiceCommand::ProposeService(ProposeService {
                service_id: id,
                customer_id: CustomerId::new(),
                template: template(negotiated),
                quantity,
                negotiated_unit_price: Some(Money::new(negotiated)),
                tooth_positions: vec!["16".to_string()],
                notes: None,
                staff: StaffAssignment::default(),
                proposed_by: EmployeeId::new(),
                occurred_at: t0(),
            }),
        )
        .unwrap();
        service
    }

    fn confirmed(quantity: u32, negotiated: u64) -> ConsultedService {
        let mut service = proposed(quantity, negotiated);
        confirm(&mut service, t0()).unwrap();
        service
    }

    fn confirm(service: &mut ConsultedService, at: DateTime<Utc>) -> DomainResult<()> {
        let cmd = ConfirmService {
            service_id: service.id_typed(),
            confirmed_by: EmployeeId::new(),
            occurred_at: at,
        };
        run(service, ConsultedServiceCommand::ConfirmService(cmd))
    }

    fn update(
        service: &mut ConsultedService,
        role: Role,
        patch: ServicePatch,
        at: DateTime<Utc>,
    ) -> DomainResult<()> {
        let cmd = UpdateServiceFields {
            service_id: service.id_typed(),
            actor: actor(role),
            patch,
            policy: StaffEditPolicy::default(),
            occurred_at: at,
        };
        run(service, ConsultedServiceCommand::UpdateServiceFields(cmd))
    }

    fn pay(service: &mut ConsultedService, amount: u64) -> DomainResult<()> {
        let cmd = ApplyPayment {
            service_id: service.id_typed(),
            voucher_id: AggregateId::new(),
            amount: Money::new(amount),
            occurred_at: t0(),
        };
        run(service, ConsultedServiceCommand::ApplyPayment(cmd))
    }

    #[test]
    fn propose_copies_template_and_derives_final_price() {
        let service = proposed(2, 150_000);
        assert_eq!(service.status(), ServiceStatus::Proposed);
        assert_eq!(service.service_name(), "Porcelain crown");
        assert_eq!(service.unit(), "tooth");
        assert_eq!(service.final_price(), Money::new(300_000));
        assert_eq!(service.debt(), Money::new(300_000));
        assert_eq!(service.confirmed_at(), None);
        assert_eq!(service.version(), 1);
        assert!(!service.is_treatable());
    }

    #[test]
    fn propose_rejects_zero_quantity() {
        let id = ConsultedServiceId::new(AggregateId::new());
        let err = ConsultedService::empty(id)
            .handle(&ConsultedServiceCommand::ProposeService(ProposeService {
                service_id: id,
                customer_id: CustomerId::new(),
                template: template(100),
                quantity: 0,
                negotiated_unit_price: None,
                tooth_positions: vec![],
                notes: None,
                staff: StaffAssignment::default(),
                proposed_by: EmployeeId::new(),
                occurred_at: t0(),
            }))
            .unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn price_change_is_free_while_proposed_and_locked_after_confirm() {
        let mut service = proposed(1, 300_000);

        let cheaper = ServicePatch {
            negotiated_unit_price: Some(Money::new(250_000)),
            ..ServicePatch::default()
        };
        update(&mut service, Role::Receptionist, cheaper, t0()).unwrap();
        assert_eq!(service.final_price(), Money::new(250_000));

        confirm(&mut service, t0()).unwrap();

        let again = ServicePatch {
            negotiated_unit_price: Some(Money::new(200_000)),
            ..ServicePatch::default()
        };
        let err = update(&mut service, Role::Admin, again, t0()).unwrap_err();
        match err {
            DomainError::ServiceLocked(msg) => assert!(msg.contains("negotiated_unit_price")),
            other => panic!("expected ServiceLocked, got {other:?}"),
        }
        assert_eq!(service.final_price(), Money::new(250_000));
    }

    #[test]
    fn confirming_twice_keeps_the_first_confirmation_date() {
        let mut service = proposed(1, 100_000);
        confirm(&mut service, t0()).unwrap();

        let err = confirm(&mut service, t0() + Duration::days(3)).unwrap_err();
        assert!(matches!(err, DomainError::AlreadyConfirmed));
        assert_eq!(service.confirmed_at(), Some(t0()));
        assert!(service.is_treatable());
    }

    #[test]
    fn staff_edit_after_window_needs_admin() {
        let mut service = confirmed(1, 100_000);
        let doctor = EmployeeId::new();
        let patch = ServicePatch {
            consulting_doctor_id: Some(StaffChange::Assign(doctor)),
            ..ServicePatch::default()
        };
        let later = t0() + Duration::days(40);

        let err = update(&mut service, Role::Sale, patch.clone(), later).unwrap_err();
        assert!(matches!(err, DomainError::Forbidden(_)));
        assert_eq!(service.staff().consulting_doctor_id, None);

        update(&mut service, Role::Admin, patch, later).unwrap();
        assert_eq!(service.staff().consulting_doctor_id, Some(doctor));
    }

    #[test]
    fn staff_edit_inside_window_is_allowed_for_anyone() {
        let mut service = confirmed(1, 100_000);
        let patch = ServicePatch {
            treating_doctor_id: Some(StaffChange::Assign(EmployeeId::new())),
            ..ServicePatch::default()
        };
        update(&mut service, Role::Doctor, patch, t0() + Duration::days(33)).unwrap();
        assert!(service.staff().treating_doctor_id.is_some());
    }

    #[test]
    fn resubmitting_unchanged_base_fields_on_confirmed_service_is_not_a_change() {
        let mut service = confirmed(2, 100_000);
        let doctor = EmployeeId::new();
        let patch = ServicePatch {
            quantity: Some(2),
            negotiated_unit_price: Some(Money::new(100_000)),
            tooth_positions: Some(vec!["16".to_string()]),
            consulting_doctor_id: Some(StaffChange::Assign(doctor)),
            ..ServicePatch::default()
        };
        update(&mut service, Role::Receptionist, patch, t0()).unwrap();
        assert_eq!(service.staff().consulting_doctor_id, Some(doctor));

        let version = service.version();
        let same = ServicePatch {
            quantity: Some(2),
            ..ServicePatch::default()
        };
        update(&mut service, Role::Receptionist, same, t0()).unwrap();
        assert_eq!(service.version(), version);
    }

    #[test]
    fn empty_patch_is_rejected() {
        let mut service = proposed(1, 100_000);
        let err = update(&mut service, Role::Admin, ServicePatch::default(), t0()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
    }

    #[test]
    fn quantity_cannot_drop_to_zero() {
        let mut service = proposed(3, 100_000);
        let patch = ServicePatch {
            quantity: Some(0),
            ..ServicePatch::default()
        };
        let err = update(&mut service, Role::Admin, patch, t0()).unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert_eq!(service.final_price(), Money::new(300_000));
    }

    #[test]
    fn notes_can_be_cleared_with_an_empty_string() {
        let mut service = proposed(1, 100);
        let set = ServicePatch {
            notes: Some("sensitive gums".to_string()),
            ..ServicePatch::default()
        };
        update(&mut service, Role::Receptionist, set, t0()).unwrap();
        assert_eq!(service.notes(), Some("sensitive gums"));

        let clear = ServicePatch {
            notes: Some(String::new()),
            ..ServicePatch::default()
        };
        update(&mut service, Role::Receptionist, clear, t0()).unwrap();
        assert_eq!(service.notes(), None);
    }

    #[test]
    fn allocation_beyond_remaining_debt_is_rejected() {
        let mut service = confirmed(2, 150_000);
        pay(&mut service, 180_000).unwrap();
        assert_eq!(service.amount_paid(), Money::new(180_000));
        assert_eq!(service.debt(), Money::new(120_000));

        let err = pay(&mut service, 150_000).unwrap_err();
        match err {
            DomainError::OverAllocation {
                requested,
                remaining,
                ..
            } => {
                assert_eq!(requested, Money::new(150_000));
                assert_eq!(remaining, Money::new(120_000));
            }
            other => panic!("expected OverAllocation, got {other:?}"),
        }
        assert_eq!(service.amount_paid(), Money::new(180_000));
    }

    #[test]
    fn proposed_service_cannot_take_payment_or_treatment() {
        let mut service = proposed(1, 100_000);
        assert!(matches!(pay(&mut service, 10), Err(DomainError::NotConfirmed(_))));

        let cmd = SetTreatmentStatus {
            service_id: service.id_typed(),
            status: TreatmentStatus::InProgress,
            updated_by: EmployeeId::new(),
            occurred_at: t0(),
        };
        let err = service
            .handle(&ConsultedServiceCommand::SetTreatmentStatus(cmd))
            .unwrap_err();
        assert!(matches!(err, DomainError::NotConfirmed(_)));
    }

    #[test]
    fn treatment_status_moves_independently_of_billing() {
        let mut service = confirmed(1, 100_000);
        let cmd = SetTreatmentStatus {
            service_id: service.id_typed(),
            status: TreatmentStatus::Completed,
            updated_by: EmployeeId::new(),
            occurred_at: t0(),
        };
        run(&mut service, ConsultedServiceCommand::SetTreatmentStatus(cmd)).unwrap();
        assert_eq!(service.treatment_status(), TreatmentStatus::Completed);
        assert_eq!(service.status(), ServiceStatus::Confirmed);
    }

    #[test]
    fn reversal_is_clamped_at_zero() {
        let mut service = confirmed(1, 100_000);
        pay(&mut service, 40_000).unwrap();

        let cmd = ReversePayment {
            service_id: service.id_typed(),
            voucher_id: AggregateId::new(),
            amount: Money::new(50_000),
            occurred_at: t0(),
        };
        let events = service
            .handle(&ConsultedServiceCommand::ReversePayment(cmd))
            .unwrap();
        match &events[0] {
            ConsultedServiceEvent::PaymentReversed(e) => {
                assert!(e.clamped);
                assert_eq!(e.amount, Money::new(40_000));
                assert_eq!(e.new_amount_paid, Money::ZERO);
            }
            other => panic!("expected PaymentReversed, got {other:?}"),
        }
    }

    #[test]
    fn delete_rules_follow_status_role_and_payments() {
        let mut draft = proposed(1, 100);
        let cmd = DeleteService {
            service_id: draft.id_typed(),
            actor: actor(Role::Receptionist),
            occurred_at: t0(),
        };
        run(&mut draft, ConsultedServiceCommand::DeleteService(cmd)).unwrap();
        assert!(draft.is_deleted());
        assert!(matches!(confirm(&mut draft, t0()), Err(DomainError::NotFound(_))));

        let mut service = confirmed(1, 100_000);
        let by = |role| {
            ConsultedServiceCommand::DeleteService(DeleteService {
                service_id: service.id_typed(),
                actor: actor(role),
                occurred_at: t0(),
            })
        };
        assert!(matches!(service.handle(&by(Role::Cashier)), Err(DomainError::Forbidden(_))));

        pay(&mut service, 1).unwrap();
        let by = |role| {
            ConsultedServiceCommand::DeleteService(DeleteService {
                service_id: service.id_typed(),
                actor: actor(role),
                occurred_at: t0(),
            })
        };
        assert!(matches!(service.handle(&by(Role::Admin)), Err(DomainError::Conflict(_))));
    }

    #[test]
    fn admin_deletes_unpaid_confirmed_service() {
        let mut service = confirmed(1, 100_000);
        let cmd = DeleteService {
            service_id: service.id_typed(),
            actor: actor(Role::Admin),
            occurred_at: t0(),
        };
        run(&mut service, ConsultedServiceCommand::DeleteService(cmd)).unwrap();
        assert!(service.is_deleted());
        assert!(!service.is_treatable());
    }

    #[test]
    fn rehydration_replays_to_the_same_state() {
        let id = ConsultedServiceId::new(AggregateId::new());
        let mut live = ConsultedService::empty(id);
        let mut history = Vec::new();
        let cmds = vec![
            ConsultedServiceCommand::ProposeService(ProposeService {
                service_id: id,
                customer_id: CustomerId::new(),
                template: template(90_000),
                quantity: 2,
                negotiated_unit_price: None,
                tooth_positions: vec![],
                notes: Some("first visit".to_string()),
                staff: StaffAssignment::default(),
                proposed_by: EmployeeId::new(),
                occurred_at: t0(),
            }),
            ConsultedServiceCommand::ConfirmService(ConfirmService {
                service_id: id,
                confirmed_by: EmployeeId::new(),
                occurred_at: t0(),
            }),
        ];
        for cmd in cmds {
            for e in live.handle(&cmd).unwrap() {
                live.apply(&e);
                history.push(e);
            }
        }

        let rebuilt = ConsultedService::from_events(id, &history);
        assert_eq!(rebuilt, live);
        assert_eq!(rebuilt.final_price(), Money::new(180_000));
    }

    #[test]
    fn event_types_are_namespaced() {
        let service = confirmed(1, 10);
        let cmd = ApplyPayment {
            service_id: service.id_typed(),
            voucher_id: AggregateId::new(),
            amount: Money::new(10),
            occurred_at: t0(),
        };
        let events = service
            .handle(&ConsultedServiceCommand::ApplyPayment(cmd))
            .unwrap();
        assert_eq!(events[0].event_type(), "consulting.service.payment_applied");
    }

    proptest! {
        #![proptest_config(ProptestConfig { cases: 256, .. ProptestConfig::default() })]

        #[test]
        fn final_price_tracks_quantity_times_negotiated_price(
            steps in prop::collection::vec((1u32..50, 0u64..5_000_000), 1..12)
        ) {
            let mut service = proposed(1, 1_000);
            for (quantity, price) in steps {
                let patch = ServicePatch {
                    quantity: Some(quantity),
                    negotiated_unit_price: Some(Money::new(price)),
                    ..ServicePatch::default()
                };
                update(&mut service, Role::Receptionist, patch, t0()).unwrap();
                prop_assert_eq!(
                    service.final_price(),
                    Money::new(price).times(service.quantity()).unwrap()
                );
                prop_assert_eq!(service.quantity(), quantity);
            }
            confirm(&mut service, t0()).unwrap();
            prop_assert_eq!(
                service.final_price(),
                service.negotiated_unit_price().times(service.quantity()).unwrap()
            );
        }

        #[test]
        fn payments_never_exceed_final_price(amounts in prop::collection::vec(1u64..200_000, 1..20)) {
            let mut service = confirmed(3, 100_000);
            let mut accepted = 0u64;
            for amount in amounts {
                if pay(&mut service, amount).is_ok() {
                    accepted += amount;
                }
                prop_assert!(service.amount_paid() <= service.final_price());
            }
            prop_assert_eq!(service.amount_paid(), Money::new(accepted));
            prop_assert_eq!(
                service.balance(),
                derive(3, Money::new(100_000), Money::new(accepted)).unwrap()
            );
        }
    }
}
