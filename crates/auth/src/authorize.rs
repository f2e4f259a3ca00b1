use thiserror::Error;

use dentledger_core::DomainError;

use crate::{Role, StaffEditDecision};

/// Operations reserved for administrators.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum AdminAction {
    DeleteConfirmedService,
    DeletePaymentVoucher,
}

impl AdminAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AdminAction::DeleteConfirmedService => "delete a confirmed service",
            AdminAction::DeletePaymentVoucher => "delete a payment voucher",
        }
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AuthzError {
    #[error("forbidden: role '{role}' may not {}", .action.as_str())]
    AdminOnly { role: Role, action: AdminAction },

    #[error("forbidden: {}", .decision.reason)]
    StaffEditWindowClosed { decision: StaffEditDecision },
}

impl From<AuthzError> for DomainError {
    fn from(value: AuthzError) -> Self {
        let detail = match value {
            AuthzError::AdminOnly { role, action } => {
                format!("role '{role}' may not {}", action.as_str())
            }
            AuthzError::StaffEditWindowClosed { decision } => decision.reason,
        };
        DomainError::Forbidden(detail)
    }
}

/// Require the admin role for `action`.
///
/// - No IO
/// - No panics
pub fn require_admin(role: Role, action: AdminAction) -> Result<(), AuthzError> {
    if role.is_admin() {
        Ok(())
    } else {
        Err(AuthzError::AdminOnly { role, action })
    }
}

/// Turn a staff-edit decision into an authorization result.
pub fn require_staff_edit(decision: StaffEditDecision) -> Result<(), AuthzError> {
    if decision.granted {
        Ok(())
    } else {
        Err(AuthzError::StaffEditWindowClosed { decision })
    }
}
