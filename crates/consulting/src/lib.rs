//! Consulted services: the billable line items proposed to a customer.
//!
//! This crate contains the state machine (Proposed → Confirmed), field-lock
//! rules and paid/debt bookkeeping of a single consulted service,
//! implemented purely as deterministic domain logic (no IO, no clock, no
//! storage).

pub mod catalog;
pub mod consulted_service;
pub mod patch;

pub use catalog::{DentalServiceTemplate, ServiceCatalog};
pub use consulted_service::{
    ApplyPayment, ConfirmService, ConsultedService, ConsultedServiceCommand, ConsultedServiceEvent,
    ConsultedServiceId, DeleteService, PaymentApplied, PaymentReversed, ProposeService,
    ReversePayment, SERVICE_AGGREGATE_TYPE, ServiceBalance, ServiceConfirmed, ServiceDeleted,
    ServiceFieldsUpdated, ServiceProposed, ServiceStatus, SetTreatmentStatus, StaffAssignment,
    TreatmentStatus, TreatmentStatusChanged, UpdateServiceFields, derive,
};
pub use patch::{ServicePatch, StaffChange};
