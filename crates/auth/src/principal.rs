use serde::{Deserialize, Serialize};

use dentledger_core::EmployeeId;

use crate::Role;

/// The employee performing an operation, with the role resolved from the
/// employee directory before the operation starts.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub employee_id: EmployeeId,
    pub role: Role,
}

impl Actor {
    pub fn new(employee_id: EmployeeId, role: Role) -> Self {
        Self { employee_id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role.is_admin()
    }
}
