//! In-memory employee directory and service catalog.
//!
//! Stand-ins for the clinic's HR and catalog systems. Read-only from the
//! ledger's point of view; `insert` exists for seeding.

use std::collections::HashMap;
use std::sync::RwLock;

use dentledger_auth::{Employee, EmployeeDirectory};
use dentledger_consulting::{DentalServiceTemplate, ServiceCatalog};
use dentledger_core::{DentalServiceId, EmployeeId};

#[derive(Debug, Default)]
pub struct InMemoryEmployeeDirectory {
    employees: RwLock<HashMap<EmployeeId, Employee>>,
}

impl InMemoryEmployeeDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, employee: Employee) {
        if let Ok(mut employees) = self.employees.write() {
            employees.insert(employee.id, employee);
        }
    }
}

impl FromIterator<Employee> for InMemoryEmployeeDirectory {
    fn from_iter<T: IntoIterator<Item = Employee>>(iter: T) -> Self {
        Self {
            employees: RwLock::new(iter.into_iter().map(|e| (e.id, e)).collect()),
        }
    }
}

impl EmployeeDirectory for InMemoryEmployeeDirectory {
    fn find(&self, id: EmployeeId) -> Option<Employee> {
        self.employees.read().ok()?.get(&id).cloned()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryServiceCatalog {
    templates: RwLock<HashMap<DentalServiceId, DentalServiceTemplate>>,
}

impl InMemoryServiceCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, template: DentalServiceTemplate) {
        if let Ok(mut templates) = self.templates.write() {
            templates.insert(template.id, template);
        }
    }
}

impl FromIterator<DentalServiceTemplate> for InMemoryServiceCatalog {
    fn from_iter<T: IntoIterator<Item = DentalServiceTemplate>>(iter: T) -> Self {
        Self {
            templates: RwLock::new(iter.into_iter().map(|t| (t.id, t)).collect()),
        }
    }
}

impl ServiceCatalog for InMemoryServiceCatalog {
    fn lookup(&self, id: DentalServiceId) -> Option<DentalServiceTemplate> {
        self.templates.read().ok()?.get(&id).cloned()
    }
}
