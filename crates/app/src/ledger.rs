//! `ClinicLedger`: wiring plus the public operations.

use std::sync::{Arc, Mutex};

use serde_json::Value as JsonValue;
use tracing::{info, warn};

use dentledger_auth::{Actor, EmployeeDirectory};
use dentledger_consulting::{
    ConsultedService, ConsultedServiceId, ServiceCatalog, ServicePatch, TreatmentStatus,
};
use dentledger_core::{CustomerId, EmployeeId};
use dentledger_events::{EventBus, EventEnvelope, InMemoryEventBus, ProjectionRunner, Subscription};
use dentledger_infra::{
    AtomicVoucherNumberAllocator, Clock, CommandDispatcher, CustomerBalance,
    CustomerBalanceProjection, EventStore, InMemoryEventStore, LedgerConfig, LedgerError,
    NewVoucher, PaymentLedger, ServiceRecords,
};
use dentledger_payments::{PaymentVoucher, PaymentVoucherId};

use crate::dto::{CreateVoucherRequest, ProposeServiceRequest};
use crate::errors::{AppError, AppResult};

type Bus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;
type Catalog = Arc<dyn ServiceCatalog>;

/// Initialize tracing from the ledger config. Safe to call more than once.
pub fn init_observability(config: &LedgerConfig) {
    dentledger_observability::init_with(config.log_format, &config.log_filter);
}

/// The clinic's consulted-service and payment ledger.
///
/// `D` resolves actor ids to roles, `K` supplies `now` for every operation.
pub struct ClinicLedger<D, K> {
    config: LedgerConfig,
    dispatcher: Arc<CommandDispatcher<InMemoryEventStore, Bus>>,
    services: ServiceRecords<InMemoryEventStore, Bus, Catalog>,
    payments: PaymentLedger<InMemoryEventStore, Bus, Arc<AtomicVoucherNumberAllocator>>,
    directory: D,
    clock: K,
    balances: Mutex<ProjectionRunner<CustomerBalanceProjection>>,
}

impl<D, K> ClinicLedger<D, K>
where
    D: EmployeeDirectory,
    K: Clock,
{
    /// Ledger over an empty store.
    pub fn new(config: LedgerConfig, directory: D, catalog: Catalog, clock: K) -> AppResult<Self> {
        Self::open(InMemoryEventStore::new(), config, directory, catalog, clock)
    }

    /// Ledger over an existing store; voucher numbering continues after the
    /// highest number already in it.
    pub fn open(
        store: InMemoryEventStore,
        config: LedgerConfig,
        directory: D,
        catalog: Catalog,
        clock: K,
    ) -> AppResult<Self> {
        let policy = config.staff_edit_policy()?;
        let bus: Bus = Arc::new(InMemoryEventBus::new());
        let dispatcher = Arc::new(CommandDispatcher::new(store, bus));

        let highest = dispatcher.highest_voucher_number()?;
        let numbers = Arc::new(AtomicVoucherNumberAllocator::starting_after(highest));
        info!(
            last_voucher = ?highest.map(|n| n.to_string()),
            staff_edit_window_days = policy.window_days(),
            "clinic ledger opened"
        );

        Ok(Self {
            services: ServiceRecords::new(dispatcher.clone(), catalog, policy),
            payments: PaymentLedger::new(dispatcher.clone(), numbers),
            dispatcher,
            directory,
            clock,
            config,
            balances: Mutex::new(ProjectionRunner::new(CustomerBalanceProjection::new())),
        })
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    /// Committed changes from now on.
    pub fn subscribe(&self) -> Subscription<EventEnvelope<JsonValue>> {
        self.dispatcher.bus().subscribe()
    }

    /// Committed changes after feed position `after`, oldest first.
    pub fn changes_since(&self, after: u64) -> AppResult<Vec<EventEnvelope<JsonValue>>> {
        let stored = self
            .dispatcher
            .store()
            .read_all(after)
            .map_err(LedgerError::from)?;
        Ok(stored.iter().map(|e| e.to_envelope()).collect())
    }

    /// Look up the acting employee and their role.
    pub fn resolve_actor(&self, employee_id: EmployeeId) -> AppResult<Actor> {
        self.directory
            .find(employee_id)
            .map(|e| e.actor())
            .ok_or(AppError::UnknownEmployee(employee_id))
    }

    // -------------------------
    // Consulted services
    // -------------------------

    pub fn propose_service(
        &self,
        request: ProposeServiceRequest,
        proposed_by: EmployeeId,
    ) -> AppResult<ConsultedService> {
        self.resolve_actor(proposed_by)?;
        Ok(self
            .services
            .propose(request.into(), proposed_by, self.clock.now())?)
    }

    /// Proposed → Confirmed. Fails with `already_confirmed` on a second call.
    pub fn confirm_service(
        &self,
        service_id: ConsultedServiceId,
        actor_id: EmployeeId,
    ) -> AppResult<ConsultedService> {
        self.resolve_actor(actor_id)?;
        Ok(self.services.confirm(service_id, actor_id, self.clock.now())?)
    }

    /// Apply a partial update as `actor`.
    ///
    /// Base fields are frozen once confirmed; staff credits follow the staff
    /// edit window for non-admins.
    pub fn update_service(
        &self,
        service_id: ConsultedServiceId,
        actor: Actor,
        patch: ServicePatch,
    ) -> AppResult<ConsultedService> {
        let result = self.services.update(service_id, actor, patch, self.clock.now());
        if let Err(e) = &result {
            if e.kind() == dentledger_core::ErrorKind::Forbidden {
                warn!(
                    service_id = %service_id,
                    employee_id = %actor.employee_id,
                    role = %actor.role,
                    error = %e,
                    "service update denied"
                );
            }
        }
        Ok(result?)
    }

    pub fn set_treatment_status(
        &self,
        service_id: ConsultedServiceId,
        status: TreatmentStatus,
        actor_id: EmployeeId,
    ) -> AppResult<ConsultedService> {
        self.resolve_actor(actor_id)?;
        Ok(self
            .services
            .set_treatment_status(service_id, status, actor_id, self.clock.now())?)
    }

    /// Delete a service. A confirmed one needs an admin and no payments.
    pub fn delete_service(&self, service_id: ConsultedServiceId, actor: Actor) -> AppResult<()> {
        Ok(self.services.delete(service_id, actor, self.clock.now())?)
    }

    pub fn get_service(&self, service_id: ConsultedServiceId) -> AppResult<ConsultedService> {
        Ok(self.services.get(service_id)?)
    }

    pub fn list_customer_services(&self, customer_id: CustomerId) -> AppResult<Vec<ConsultedService>> {
        Ok(self.services.list_for_customer(customer_id)?)
    }

    // -------------------------
    // Payment vouchers
    // -------------------------

    /// Create a voucher on behalf of `created_by` (usually the cashier).
    pub fn create_payment_voucher(
        &self,
        request: CreateVoucherRequest,
        created_by: EmployeeId,
    ) -> AppResult<PaymentVoucher> {
        self.resolve_actor(request.cashier_id)?;
        self.resolve_actor(created_by)?;

        let voucher = NewVoucher {
            customer_id: request.customer_id,
            cashier_id: request.cashier_id,
            created_by,
            payment_date: request.payment_date,
            allocations: request.allocations,
            notes: request.notes,
        };
        Ok(self.payments.create_voucher(voucher, self.clock.now())?)
    }

    /// Admin-only. Reverses every allocation of the voucher.
    pub fn delete_payment_voucher(&self, actor: Actor, voucher_id: PaymentVoucherId) -> AppResult<()> {
        self.payments.delete_voucher(actor, voucher_id, self.clock.now())?;
        Ok(())
    }

    pub fn get_voucher(&self, voucher_id: PaymentVoucherId) -> AppResult<PaymentVoucher> {
        Ok(self.payments.get(voucher_id)?)
    }

    pub fn list_customer_vouchers(&self, customer_id: CustomerId) -> AppResult<Vec<PaymentVoucher>> {
        Ok(self.payments.list_for_customer(customer_id)?)
    }

    // -------------------------
    // Read models
    // -------------------------

    /// Confirmed total, paid total and debt of a customer.
    ///
    /// Catches the projection up with the store before answering.
    pub fn customer_balance(&self, customer_id: CustomerId) -> AppResult<CustomerBalance> {
        let mut runner = self
            .balances
            .lock()
            .map_err(|_| AppError::ReadModel("customer balance projection poisoned".to_string()))?;

        let after = runner.cursor().last_sequence_number();
        for stored in self
            .dispatcher
            .store()
            .read_all(after)
            .map_err(LedgerError::from)?
        {
            runner
                .apply(&stored.to_envelope())
                .map_err(|e| AppError::ReadModel(e.to_string()))?;
        }

        Ok(runner.projection().get(customer_id))
    }
}
