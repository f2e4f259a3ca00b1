//! Clinic ledger facade: the operations the surrounding application calls.
//!
//! Transport (HTTP, RPC) is out of scope; callers get typed results and can
//! turn any failure into an [`ErrorResponse`] body.

pub mod dto;
pub mod errors;
pub mod ledger;

pub use dto::{CreateVoucherRequest, ProposeServiceRequest, ServiceView, VoucherDetailView, VoucherView};
pub use errors::{AppError, AppResult, ErrorResponse};
pub use ledger::{ClinicLedger, init_observability};
