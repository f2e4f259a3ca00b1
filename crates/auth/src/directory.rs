use serde::{Deserialize, Serialize};

use dentledger_core::EmployeeId;

use crate::{Actor, Role};

/// Directory entry for a clinic employee.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub full_name: String,
    pub role: Role,
}

impl Employee {
    pub fn actor(&self) -> Actor {
        Actor::new(self.id, self.role)
    }
}

/// Read-only employee directory (external collaborator).
///
/// Used for permission checks and display names only. Lookups happen before
/// any ledger lock is taken.
pub trait EmployeeDirectory: Send + Sync {
    fn find(&self, id: EmployeeId) -> Option<Employee>;
}

impl<D> EmployeeDirectory for std::sync::Arc<D>
where
    D: EmployeeDirectory + ?Sized,
{
    fn find(&self, id: EmployeeId) -> Option<Employee> {
        (**self).find(id)
    }
}
