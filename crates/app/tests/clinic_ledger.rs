//! Black-box tests of the clinic ledger facade.

use std::sync::Arc;

use chrono::{DateTime, Duration, TimeZone, Utc};
use proptest::prelude::*;

use dentledger_app::{
    AppError, ClinicLedger, CreateVoucherRequest, ErrorResponse, ProposeServiceRequest,
    ServiceView, VoucherView,
};
use dentledger_auth::{Actor, Employee, Role};
use dentledger_consulting::{
    ConsultedServiceId, DentalServiceTemplate, ServicePatch, ServiceStatus, StaffAssignment,
    StaffChange, TreatmentStatus,
};
use dentledger_core::{AggregateId, CustomerId, DentalServiceId, EmployeeId, ErrorKind, ExpectedVersion, Money};
use dentledger_infra::event_store::{EventStore, StreamAppend, UncommittedEvent};
use dentledger_infra::{FixedClock, InMemoryEmployeeDirectory, InMemoryEventStore, InMemoryServiceCatalog, LedgerConfig};
use dentledger_payments::{
    PaymentAllocation, PaymentMethod, PaymentVoucherEvent, PaymentVoucherId, VOUCHER_AGGREGATE_TYPE,
    VoucherCreated, VoucherNumber,
};

type Ledger = ClinicLedger<Arc<InMemoryEmployeeDirectory>, Arc<FixedClock>>;

struct Harness {
    ledger: Ledger,
    clock: Arc<FixedClock>,
    template: DentalServiceId,
    customer: CustomerId,
    admin: Actor,
    cashier: Actor,
    doctor: Actor,
}

fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap()
}

fn staff() -> (Actor, Actor, Actor, Arc<InMemoryEmployeeDirectory>) {
    let admin = Actor::new(EmployeeId::new(), Role::Admin);
    let cashier = Actor::new(EmployeeId::new(), Role::Cashier);
    let doctor = Actor::new(EmployeeId::new(), Role::Doctor);
    let directory: InMemoryEmployeeDirectory = [
        (admin, "Admin"),
        (cashier, "Cashier"),
        (doctor, "Dr. Minh"),
    ]
    .into_iter()
    .map(|(a, name)| Employee {
        id: a.employee_id,
        full_name: name.to_string(),
        role: a.role,
    })
    .collect();
    (admin, cashier, doctor, Arc::new(directory))
}

fn catalog() -> (DentalServiceId, Arc<InMemoryServiceCatalog>) {
    let template = DentalServiceId::new();
    let catalog: InMemoryServiceCatalog = [DentalServiceTemplate {
        id: template,
        name: "Porcelain crown".to_string(),
        unit: "tooth".to_string(),
        default_price: Money::new(150_000),
    }]
    .into_iter()
    .collect();
    (template, Arc::new(catalog))
}

fn harness_on(store: InMemoryEventStore) -> Harness {
    let (admin, cashier, doctor, directory) = staff();
    let (template, catalog) = catalog();
    let clock = Arc::new(FixedClock::new(t0()));
    let ledger = ClinicLedger::open(store, LedgerConfig::default(), directory, catalog, clock.clone()).unwrap();
    Harness {
        ledger,
        clock,
        template,
        customer: CustomerId::new(),
        admin,
        cashier,
        doctor,
    }
}

fn harness() -> Harness {
    harness_on(InMemoryEventStore::new())
}

impl Harness {
    /// Two crowns at the default price: final price 300 000.
    fn proposed(&self) -> ConsultedServiceId {
        self.ledger
            .propose_service(
                ProposeServiceRequest {
                    customer_id: self.customer,
                    dental_service_id: self.template,
                    quantity: 2,
                    negotiated_unit_price: None,
                    tooth_positions: vec!["11".to_string(), "21".to_string()],
                    notes: None,
                    staff: StaffAssignment {
                        consulting_doctor_id: Some(self.doctor.employee_id),
                        ..StaffAssignment::default()
                    },
                },
                self.cashier.employee_id,
            )
            .unwrap()
            .id_typed()
    }

    fn confirmed(&self) -> ConsultedServiceId {
        let id = self.proposed();
        self.ledger.confirm_service(id, self.cashier.employee_id).unwrap();
        id
    }

    fn pay(&self, allocations: &[(ConsultedServiceId, u64)]) -> Result<dentledger_payments::PaymentVoucher, AppError> {
        self.ledger.create_payment_voucher(
            CreateVoucherRequest {
                customer_id: self.customer,
                cashier_id: self.cashier.employee_id,
                payment_date: self.clock_now(),
                allocations: allocations
                    .iter()
                    .map(|(service_id, amount)| PaymentAllocation {
                        service_id: *service_id,
                        amount: Money::new(*amount),
                        method: PaymentMethod::Card,
                    })
                    .collect(),
                notes: Some("front desk".to_string()),
            },
            self.cashier.employee_id,
        )
    }

    fn clock_now(&self) -> DateTime<Utc> {
        use dentledger_infra::Clock;
        self.clock.now()
    }
}

#[test]
fn scenario_a_allocation_and_over_allocation() {
    let h = harness();
    let service = h.confirmed();
    assert_eq!(h.ledger.get_service(service).unwrap().final_price(), Money::new(300_000));

    h.pay(&[(service, 180_000)]).unwrap();
    let s = h.ledger.get_service(service).unwrap();
    assert_eq!(s.amount_paid(), Money::new(180_000));
    assert_eq!(s.debt(), Money::new(120_000));

    let err = h.pay(&[(service, 150_000)]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::OverAllocation);
    let body = ErrorResponse::from(&err);
    assert_eq!(body.error, "over_allocation");
    assert_eq!(h.ledger.get_service(service).unwrap().amount_paid(), Money::new(180_000));
}

#[test]
fn scenario_b_price_change_before_and_after_confirmation() {
    let h = harness();
    let service = h.proposed();

    let cheaper = ServicePatch {
        negotiated_unit_price: Some(Money::new(120_000)),
        ..ServicePatch::default()
    };
    let updated = h.ledger.update_service(service, h.cashier, cheaper).unwrap();
    assert_eq!(updated.final_price(), Money::new(240_000));

    h.ledger.confirm_service(service, h.cashier.employee_id).unwrap();
    let again = ServicePatch {
        negotiated_unit_price: Some(Money::new(100_000)),
        ..ServicePatch::default()
    };
    for actor in [h.cashier, h.admin] {
        let err = h.ledger.update_service(service, actor, again.clone()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ServiceLocked);
    }
    assert_eq!(h.ledger.get_service(service).unwrap().final_price(), Money::new(240_000));
}

#[test]
fn scenario_c_staff_credit_after_the_window() {
    let h = harness();
    let service = h.confirmed();
    let other_doctor = EmployeeId::new();
    let patch = ServicePatch {
        consulting_doctor_id: Some(StaffChange::Assign(other_doctor)),
        ..ServicePatch::default()
    };

    h.clock.advance(Duration::days(40));
    let err = h.ledger.update_service(service, h.doctor, patch.clone()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);

    let updated = h.ledger.update_service(service, h.admin, patch).unwrap();
    assert_eq!(updated.staff().consulting_doctor_id, Some(other_doctor));
}

#[test]
fn staff_credit_window_closes_after_day_33() {
    let h = harness();
    let service = h.confirmed();
    let patch = |id| ServicePatch {
        treating_doctor_id: Some(StaffChange::Assign(id)),
        ..ServicePatch::default()
    };

    h.clock.set(t0() + Duration::days(33));
    h.ledger
        .update_service(service, h.doctor, patch(h.doctor.employee_id))
        .unwrap();

    h.clock.set(t0() + Duration::days(34));
    let err = h
        .ledger
        .update_service(service, h.doctor, patch(EmployeeId::new()))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
}

#[test]
fn scenario_d_non_admin_cannot_delete_a_voucher() {
    let h = harness();
    let service = h.confirmed();
    let voucher = h.pay(&[(service, 100_000)]).unwrap();

    let err = h
        .ledger
        .delete_payment_voucher(h.cashier, voucher.id_typed())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    assert_eq!(ErrorResponse::status_code(err.kind()), 403);
    assert!(h.ledger.get_voucher(voucher.id_typed()).is_ok());
    assert_eq!(h.ledger.get_service(service).unwrap().amount_paid(), Money::new(100_000));
}

#[test]
fn confirm_twice_keeps_the_first_confirmation_date() {
    let h = harness();
    let service = h.confirmed();
    let first = h.ledger.get_service(service).unwrap().confirmed_at();

    h.clock.advance(Duration::days(2));
    let err = h
        .ledger
        .confirm_service(service, h.admin.employee_id)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AlreadyConfirmed);
    assert_eq!(h.ledger.get_service(service).unwrap().confirmed_at(), first);
    assert_eq!(first, Some(t0()));
}

#[test]
fn treatment_needs_a_confirmed_service() {
    let h = harness();
    let service = h.proposed();
    let err = h
        .ledger
        .set_treatment_status(service, TreatmentStatus::InProgress, h.doctor.employee_id)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotConfirmed);

    h.ledger.confirm_service(service, h.cashier.employee_id).unwrap();
    let s = h
        .ledger
        .set_treatment_status(service, TreatmentStatus::InProgress, h.doctor.employee_id)
        .unwrap();
    assert!(s.is_treatable());
    assert_eq!(s.treatment_status(), TreatmentStatus::InProgress);
}

#[test]
fn unknown_employees_are_rejected_before_anything_happens() {
    let h = harness();
    let stranger = EmployeeId::new();
    let err = h.ledger.confirm_service(h.proposed(), stranger).unwrap_err();
    assert!(matches!(err, AppError::UnknownEmployee(id) if id == stranger));
    assert_eq!(err.code(), "not_found");

    assert_eq!(h.ledger.resolve_actor(h.doctor.employee_id).unwrap(), h.doctor);
}

#[test]
fn customer_views_and_balance() {
    let h = harness();
    let a = h.confirmed();
    let b = h.confirmed();
    h.proposed();
    h.pay(&[(a, 300_000), (b, 50_000)]).unwrap();

    let services = h.ledger.list_customer_services(h.customer).unwrap();
    assert_eq!(services.len(), 3);
    let views: Vec<ServiceView> = services.iter().map(ServiceView::from).collect();
    assert_eq!(
        views.iter().filter(|v| v.status == ServiceStatus::Confirmed).count(),
        2
    );

    let vouchers = h.ledger.list_customer_vouchers(h.customer).unwrap();
    assert_eq!(vouchers.len(), 1);
    let view = VoucherView::from(&vouchers[0]);
    assert_eq!(view.number.as_deref(), Some("PT000001"));
    assert_eq!(view.details.len(), 2);
    let json = serde_json::to_value(&view).unwrap();
    assert_eq!(json["details"][0]["method"], "card");

    let balance = h.ledger.customer_balance(h.customer).unwrap();
    assert_eq!(balance.confirmed_total, Money::new(600_000));
    assert_eq!(balance.paid_total, Money::new(350_000));
    assert_eq!(balance.debt, Money::new(250_000));

    // The projection catches up incrementally.
    h.pay(&[(b, 250_000)]).unwrap();
    assert!(h.ledger.customer_balance(h.customer).unwrap().debt.is_zero());
}

#[test]
fn admin_deletes_proposed_and_confirmed_services() {
    let h = harness();
    let proposed = h.proposed();
    h.ledger.delete_service(proposed, h.cashier).unwrap();
    assert_eq!(h.ledger.get_service(proposed).unwrap_err().kind(), ErrorKind::NotFound);

    let confirmed = h.confirmed();
    let err = h.ledger.delete_service(confirmed, h.cashier).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Forbidden);
    h.ledger.delete_service(confirmed, h.admin).unwrap();
}

#[test]
fn change_feed_reports_commits_in_order() {
    let h = harness();
    let subscription = h.ledger.subscribe();
    let service = h.confirmed();
    h.pay(&[(service, 1_000)]).unwrap();

    let received = subscription.drain();
    let stored = h.ledger.changes_since(0).unwrap();
    assert_eq!(received, stored);
    assert_eq!(
        received.iter().map(|e| e.event_type()).collect::<Vec<_>>(),
        vec![
            "consulting.service.proposed",
            "consulting.service.confirmed",
            "consulting.service.payment_applied",
            "payments.voucher.created",
        ]
    );
    assert_eq!(h.ledger.changes_since(3).unwrap().len(), 1);
}

#[test]
fn numbering_continues_after_the_highest_stored_voucher() {
    let store = InMemoryEventStore::new();
    let voucher_id = PaymentVoucherId::new(AggregateId::new());
    let event = PaymentVoucherEvent::VoucherCreated(VoucherCreated {
        voucher_id,
        number: VoucherNumber::new(41),
        customer_id: CustomerId::new(),
        cashier_id: EmployeeId::new(),
        created_by: EmployeeId::new(),
        payment_date: t0(),
        total_amount: Money::ZERO,
        details: vec![],
        notes: None,
        occurred_at: t0(),
    });
    store
        .append(vec![StreamAppend {
            aggregate_id: voucher_id.0,
            aggregate_type: VOUCHER_AGGREGATE_TYPE.to_string(),
            expected_version: ExpectedVersion::Exact(0),
            events: vec![UncommittedEvent::from_typed(voucher_id.0, VOUCHER_AGGREGATE_TYPE, &event).unwrap()],
        }])
        .unwrap();

    let h = harness_on(store);
    let service = h.confirmed();
    let voucher = h.pay(&[(service, 10_000)]).unwrap();
    assert_eq!(voucher.number().map(|n| n.to_string()).as_deref(), Some("PT000042"));
}

proptest! {
    #![proptest_config(ProptestConfig { cases: 32, .. ProptestConfig::default() })]

    #[test]
    fn voucher_create_then_delete_is_an_inverse(first in 1u64..=300_000, second in 1u64..=300_000) {
        let h = harness();
        let a = h.confirmed();
        let b = h.confirmed();
        let before = [
            h.ledger.get_service(a).unwrap().balance(),
            h.ledger.get_service(b).unwrap().balance(),
        ];

        let voucher = h.pay(&[(a, first), (b, second)]).unwrap();
        prop_assert_eq!(voucher.total_amount(), Money::new(first + second));
        h.ledger.delete_payment_voucher(h.admin, voucher.id_typed()).unwrap();

        let after = [
            h.ledger.get_service(a).unwrap().balance(),
            h.ledger.get_service(b).unwrap().balance(),
        ];
        prop_assert_eq!(before, after);
        prop_assert!(h.ledger.list_customer_vouchers(h.customer).unwrap().is_empty());
    }
}
