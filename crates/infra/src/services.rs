//! Consulted-service record operations.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;
use tracing::{debug, info};

use dentledger_auth::{Actor, StaffEditPolicy};
use dentledger_consulting::{
    ConfirmService, ConsultedService, ConsultedServiceCommand, ConsultedServiceId, DeleteService,
    ProposeService, SERVICE_AGGREGATE_TYPE, ServiceCatalog, ServicePatch, SetTreatmentStatus,
    StaffAssignment, TreatmentStatus, UpdateServiceFields,
};
use dentledger_core::{AggregateId, AggregateRoot, CustomerId, DentalServiceId, DomainError, EmployeeId, Money};
use dentledger_events::{EventBus, EventEnvelope};

use crate::command_dispatcher::{CommandDispatcher, LedgerResult, Transaction};
use crate::event_store::EventStore;

/// Input for proposing a service from the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewService {
    pub customer_id: CustomerId,
    pub dental_service_id: DentalServiceId,
    pub quantity: u32,
    pub negotiated_unit_price: Option<Money>,
    pub tooth_positions: Vec<String>,
    pub notes: Option<String>,
    pub staff: StaffAssignment,
}

/// Operations on consulted-service records.
///
/// Each mutating call locks the one record it touches for its
/// read-validate-commit window. Catalog lookups happen before the lock.
pub struct ServiceRecords<S, B, C> {
    dispatcher: Arc<CommandDispatcher<S, B>>,
    catalog: C,
    policy: StaffEditPolicy,
}

impl<S, B, C> ServiceRecords<S, B, C>
where
    S: EventStore,
    B: EventBus<EventEnvelope<JsonValue>>,
    C: ServiceCatalog,
{
    pub fn new(dispatcher: Arc<CommandDispatcher<S, B>>, catalog: C, policy: StaffEditPolicy) -> Self {
        Self {
            dispatcher,
            catalog,
            policy,
        }
    }

    pub fn policy(&self) -> StaffEditPolicy {
        self.policy
    }

    pub fn propose(
        &self,
        request: NewService,
        proposed_by: EmployeeId,
        now: DateTime<Utc>,
    ) -> LedgerResult<ConsultedService> {
        let template = self.catalog.lookup(request.dental_service_id).ok_or_else(|| {
            DomainError::not_found(format!("dental service {}", request.dental_service_id))
        })?;

        let service_id = ConsultedServiceId::new(AggregateId::new());
        let command = ConsultedServiceCommand::ProposeService(ProposeService {
            service_id,
            customer_id: request.customer_id,
            template,
            quantity: request.quantity,
            negotiated_unit_price: request.negotiated_unit_price,
            tooth_positions: request.tooth_positions,
            notes: request.notes,
            staff: request.staff,
            proposed_by,
            occurred_at: now,
        });

        let service = self.run(service_id, command)?;
        debug!(service_id = %service_id, customer_id = %request.customer_id, "service proposed");
        Ok(service)
    }

    pub fn confirm(
        &self,
        service_id: ConsultedServiceId,
        confirmed_by: EmployeeId,
        now: DateTime<Utc>,
    ) -> LedgerResult<ConsultedService> {
        let command = ConsultedServiceCommand::ConfirmService(ConfirmService {
            service_id,
            confirmed_by,
            occurred_at: now,
        });

        let service = self.run(service_id, command)?;
        info!(
            service_id = %service_id,
            final_price = service.final_price().amount(),
            "service confirmed"
        );
        Ok(service)
    }

    pub fn update(
        &self,
        service_id: ConsultedServiceId,
        actor: Actor,
        patch: ServicePatch,
        now: DateTime<Utc>,
    ) -> LedgerResult<ConsultedService> {
        let patch = self.expand_catalog_change(service_id, patch)?;

        let command = ConsultedServiceCommand::UpdateServiceFields(UpdateServiceFields {
            service_id,
            actor,
            patch,
            policy: self.policy,
            occurred_at: now,
        });

        let service = self.run(service_id, command)?;
        debug!(service_id = %service_id, version = service.version(), "service updated");
        Ok(service)
    }

    pub fn set_treatment_status(
        &self,
        service_id: ConsultedServiceId,
        status: TreatmentStatus,
        updated_by: EmployeeId,
        now: DateTime<Utc>,
    ) -> LedgerResult<ConsultedService> {
        let command = ConsultedServiceCommand::SetTreatmentStatus(SetTreatmentStatus {
            service_id,
            status,
            updated_by,
            occurred_at: now,
        });
        self.run(service_id, command)
    }

    pub fn delete(
        &self,
        service_id: ConsultedServiceId,
        actor: Actor,
        now: DateTime<Utc>,
    ) -> LedgerResult<()> {
        let command = ConsultedServiceCommand::DeleteService(DeleteService {
            service_id,
            actor,
            occurred_at: now,
        });

        let service = self.run(service_id, command)?;
        info!(
            service_id = %service_id,
            deleted_by = %actor.employee_id,
            was_confirmed = service.is_confirmed(),
            "service deleted"
        );
        Ok(())
    }

    /// Live service by id.
    pub fn get(&self, service_id: ConsultedServiceId) -> LedgerResult<ConsultedService> {
        let service = self.dispatcher.load_service(service_id)?;
        if !service.is_created() || service.is_deleted() {
            return Err(DomainError::not_found(format!("consulted service {service_id}")).into());
        }
        Ok(service)
    }

    pub fn list_for_customer(&self, customer_id: CustomerId) -> LedgerResult<Vec<ConsultedService>> {
        Ok(self
            .dispatcher
            .all_services()?
            .into_iter()
            .filter(|s| s.customer_id() == Some(customer_id))
            .collect())
    }

    /// A new catalog reference pulls name, unit and default price from the
    /// template. Read before the record lock is taken.
    fn expand_catalog_change(
        &self,
        service_id: ConsultedServiceId,
        patch: ServicePatch,
    ) -> LedgerResult<ServicePatch> {
        let Some(new_ref) = patch.dental_service_id else {
            return Ok(patch);
        };
        let current = self.dispatcher.load_service(service_id)?;
        if current.dental_service_id() == Some(new_ref) {
            return Ok(patch);
        }

        let template = self
            .catalog
            .lookup(new_ref)
            .ok_or_else(|| DomainError::not_found(format!("dental service {new_ref}")))?;
        Ok(patch.with_template(&template))
    }

    fn run(
        &self,
        service_id: ConsultedServiceId,
        command: ConsultedServiceCommand,
    ) -> LedgerResult<ConsultedService> {
        let _guard = self.dispatcher.lock([service_id.0])?;

        let mut service = self.dispatcher.load_service(service_id)?;
        let mut tx = Transaction::new();
        tx.execute(&mut service, service_id.0, SERVICE_AGGREGATE_TYPE, &command)?;
        self.dispatcher.commit(tx)?;

        Ok(service)
    }
}
