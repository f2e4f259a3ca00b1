//! `dentledger-auth`: pure authorization boundary for clinic staff.
//!
//! Authentication is out of scope: callers arrive with an already resolved
//! [`Actor`]. This crate answers "may this actor do that, now?" without IO and
//! without reading the clock.

pub mod authorize;
pub mod directory;
pub mod policy;
pub mod principal;
pub mod roles;

pub use authorize::{AdminAction, AuthzError, require_admin, require_staff_edit};
pub use directory::{Employee, EmployeeDirectory};
pub use policy::{STAFF_EDIT_WINDOW_DAYS, StaffEditDecision, StaffEditPolicy, can_edit_staff_fields};
pub use principal::Actor;
pub use roles::Role;
