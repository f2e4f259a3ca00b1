//! Infrastructure layer: event store, record locks, voucher numbering,
//! orchestration of service and voucher operations, config and read models.

pub mod clock;
pub mod collaborators;
pub mod command_dispatcher;
pub mod config;
pub mod event_store;
pub mod ledger;
pub mod locks;
pub mod numbering;
pub mod projections;
pub mod services;


pub use clock::{Clock, FixedClock, SystemClock};
pub use collaborators::{InMemoryEmployeeDirectory, InMemoryServiceCatalog};
pub use command_dispatcher::{CommandDispatcher, LedgerError, LedgerResult, Transaction};
pub use config::{ConfigError, LedgerConfig};
pub use event_store::{EventStore, EventStoreError, InMemoryEventStore};
pub use ledger::{NewVoucher, PaymentLedger};
pub use locks::{RecordLockGuard, RecordLocks};
pub use numbering::{AtomicVoucherNumberAllocator, VoucherNumberAllocator};
pub use projections::{CustomerBalance, CustomerBalanceProjection};
pub use services::{NewService, ServiceRecords};
