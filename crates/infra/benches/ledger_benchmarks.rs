use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use chrono::Utc;
use dentledger_auth::{Actor, Role, StaffEditPolicy};
use dentledger_consulting::{ConsultedServiceId, DentalServiceTemplate, StaffAssignment};
use dentledger_core::{CustomerId, DentalServiceId, EmployeeId, Money};
use dentledger_events::{EventEnvelope, InMemoryEventBus};
use dentledger_infra::{
    AtomicVoucherNumberAllocator, CommandDispatcher, InMemoryEventStore, InMemoryServiceCatalog,
    NewService, NewVoucher, PaymentLedger, ServiceRecords,
};
use dentledger_payments::{PaymentAllocation, PaymentMethod};
use std::sync::Arc;

type Bus = Arc<InMemoryEventBus<EventEnvelope<serde_json::Value>>>;

struct Fixture {
    services: ServiceRecords<InMemoryEventStore, Bus, Arc<InMemoryServiceCatalog>>,
    ledger: PaymentLedger<InMemoryEventStore, Bus, AtomicVoucherNumberAllocator>,
    template: DentalServiceId,
    customer: CustomerId,
    admin: Actor,
}

fn fixture() -> Fixture {
    let bus: Bus = Arc::new(InMemoryEventBus::new());
    let dispatcher = Arc::new(CommandDispatcher::new(InMemoryEventStore::new(), bus));
    let template = DentalServiceId::new();
    let catalog: Arc<InMemoryServiceCatalog> = Arc::new(
        [DentalServiceTemplate {
            id: template,
            name: "Scaling".to_string(),
            unit: "session".to_string(),
            // Large enough that no benchmark run exhausts the debt.
            default_price: Money::new(u64::MAX / 4),
        }]
        .into_iter()
        .collect(),
    );

    Fixture {
        services: ServiceRecords::new(dispatcher.clone(), catalog, StaffEditPolicy::default()),
        ledger: PaymentLedger::new(dispatcher, AtomicVoucherNumberAllocator::new()),
        template,
        customer: CustomerId::new(),
        admin: Actor::new(EmployeeId::new(), Role::Admin),
    }
}

fn confirmed_services(f: &Fixture, n: usize) -> Vec<ConsultedServiceId> {
    (0..n)
        .map(|_| {
            let proposed = f
                .services
                .propose(
                    NewService {
                        customer_id: f.customer,
                        dental_service_id: f.template,
                        quantity: 1,
                        negotiated_unit_price: None,
                        tooth_positions: vec![],
                        notes: None,
                        staff: StaffAssignment::default(),
                    },
                    f.admin.employee_id,
                    Utc::now(),
                )
                .unwrap();
            f.services
                .confirm(proposed.id_typed(), f.admin.employee_id, Utc::now())
                .unwrap()
                .id_typed()
        })
        .collect()
}

fn voucher(f: &Fixture, services: &[ConsultedServiceId]) -> NewVoucher {
    NewVoucher {
        customer_id: f.customer,
        cashier_id: f.admin.employee_id,
        created_by: f.admin.employee_id,
        payment_date: Utc::now(),
        allocations: services
            .iter()
            .map(|id| PaymentAllocation {
                service_id: *id,
                amount: Money::new(1_000),
                method: PaymentMethod::Cash,
            })
            .collect(),
        notes: None,
    }
}

fn bench_create_voucher(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_voucher");

    for allocations in [1usize, 5, 20] {
        group.throughput(Throughput::Elements(allocations as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(allocations),
            &allocations,
            |b, &allocations| {
                let f = fixture();
                let services = confirmed_services(&f, allocations);
                b.iter(|| {
                    let v = f
                        .ledger
                        .create_voucher(voucher(&f, &services), Utc::now())
                        .unwrap();
                    black_box(v);
                });
            },
        );
    }

    group.finish();
}

fn bench_create_then_delete(c: &mut Criterion) {
    let mut group = c.benchmark_group("voucher_round_trip");
    group.sample_size(200);

    group.bench_function("create_and_delete_5_allocations", |b| {
        let f = fixture();
        let services = confirmed_services(&f, 5);
        b.iter(|| {
            let v = f
                .ledger
                .create_voucher(voucher(&f, &services), Utc::now())
                .unwrap();
            let deleted = f.ledger.delete_voucher(f.admin, v.id_typed(), Utc::now()).unwrap();
            black_box(deleted);
        });
    });

    group.finish();
}

criterion_group!(benches, bench_create_voucher, bench_create_then_delete);
criterion_main!(benches);
