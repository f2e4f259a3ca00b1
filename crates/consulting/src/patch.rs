//! Partial updates to a consulted service.
//!
//! Fields fall into two groups with different lock rules:
//! - **base fields** (name, unit, catalog reference, prices, quantity, tooth
//!   positions, notes) freeze when the service is confirmed;
//! - **staff fields** (consulting doctor, treating doctor, consulting sale)
//!   stay editable after confirmation, subject to the staff edit policy.

use serde::{Deserialize, Serialize};

use dentledger_core::{DentalServiceId, EmployeeId, Money};

use crate::catalog::DentalServiceTemplate;
use crate::consulted_service::ConsultedService;

/// Assignment change for one staff credit.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", content = "employee_id", rename_all = "snake_case")]
pub enum StaffChange {
    Assign(EmployeeId),
    Unassign,
}

impl StaffChange {
    pub fn resolve(self) -> Option<EmployeeId> {
        match self {
            StaffChange::Assign(id) => Some(id),
            StaffChange::Unassign => None,
        }
    }
}

/// Set of field changes; `None` means "leave as is".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServicePatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dental_service_id: Option<DentalServiceId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit_price: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negotiated_unit_price: Option<Money>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tooth_positions: Option<Vec<String>>,
    /// An empty string clears the notes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consulting_doctor_id: Option<StaffChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treating_doctor_id: Option<StaffChange>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub consulting_sale_id: Option<StaffChange>,
}

impl ServicePatch {
    pub fn is_empty(&self) -> bool {
        !self.touches_base_fields() && !self.touches_staff_fields()
    }

    pub fn touches_base_fields(&self) -> bool {
        self.service_name.is_some()
            || self.unit.is_some()
            || self.dental_service_id.is_some()
            || self.unit_price.is_some()
            || self.quantity.is_some()
            || self.negotiated_unit_price.is_some()
            || self.tooth_positions.is_some()
            || self.notes.is_some()
    }

    pub fn touches_staff_fields(&self) -> bool {
        self.consulting_doctor_id.is_some()
            || self.treating_doctor_id.is_some()
            || self.consulting_sale_id.is_some()
    }

    /// Names of the base fields this patch sets (for error messages).
    pub fn base_field_names(&self) -> Vec<&'static str> {
        let mut names = Vec::new();
        if self.service_name.is_some() {
            names.push("service_name");
        }
        if self.unit.is_some() {
            names.push("unit");
        }
        if self.dental_service_id.is_some() {
            names.push("dental_service_id");
        }
        if self.unit_price.is_some() {
            names.push("unit_price");
        }
        if self.quantity.is_some() {
            names.push("quantity");
        }
        if self.negotiated_unit_price.is_some() {
            names.push("negotiated_unit_price");
        }
        if self.tooth_positions.is_some() {
            names.push("tooth_positions");
        }
        if self.notes.is_some() {
            names.push("notes");
        }
        names
    }

    /// Re-point the service at another catalog template: copies the
    /// template's name, unit and default price unless the patch already sets
    /// them. The negotiated price follows the default price unless given.
    pub fn with_template(mut self, template: &DentalServiceTemplate) -> Self {
        self.dental_service_id = Some(template.id);
        self.service_name.get_or_insert_with(|| template.name.clone());
        self.unit.get_or_insert_with(|| template.unit.clone());
        self.unit_price.get_or_insert(template.default_price);
        self.negotiated_unit_price.get_or_insert(template.default_price);
        self
    }

    /// Drop entries that would not change `current`.
    ///
    /// Clients typically send the whole form back; only real differences
    /// count as changes for the lock rules.
    pub fn changes_against(&self, current: &ConsultedService) -> ServicePatch {
        let notes_now = current.notes().unwrap_or("");

        ServicePatch {
            service_name: self
                .service_name
                .clone()
                .filter(|v| v != current.service_name()),
            unit: self.unit.clone().filter(|v| v != current.unit()),
            dental_service_id: self
                .dental_service_id
                .filter(|v| Some(*v) != current.dental_service_id()),
            unit_price: self.unit_price.filter(|v| *v != current.unit_price()),
            quantity: self.quantity.filter(|v| *v != current.quantity()),
            negotiated_unit_price: self
                .negotiated_unit_price
                .filter(|v| *v != current.negotiated_unit_price()),
            tooth_positions: self
                .tooth_positions
                .clone()
                .filter(|v| v.as_slice() != current.tooth_positions()),
            notes: self.notes.clone().filter(|v| v.as_str() != notes_now),
            consulting_doctor_id: self
                .consulting_doctor_id
                .filter(|c| c.resolve() != current.staff().consulting_doctor_id),
            treating_doctor_id: self
                .treating_doctor_id
                .filter(|c| c.resolve() != current.staff().treating_doctor_id),
            consulting_sale_id: self
                .consulting_sale_id
                .filter(|c| c.resolve() != current.staff().consulting_sale_id),
        }
    }
}
