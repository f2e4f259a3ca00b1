//! Payment vouchers: receipts that allocate money to confirmed services.
//!
//! A voucher is created in one step with all of its allocation details and is
//! immutable afterwards; the only other transition is full deletion by an
//! admin. Moving `amount_paid` on the target services is the ledger's job
//! (see `dentledger-infra`); this crate only decides what a valid voucher is.

pub mod method;
pub mod number;
pub mod voucher;

pub use method::PaymentMethod;
pub use number::VoucherNumber;
pub use voucher::{
    CreateVoucher, DeleteVoucher, PaymentAllocation, PaymentVoucher, PaymentVoucherCommand,
    PaymentVoucherDetail, PaymentVoucherEvent, PaymentVoucherId, VOUCHER_AGGREGATE_TYPE,
    VoucherCreated, VoucherDeleted, validate_allocations,
};
