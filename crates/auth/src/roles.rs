use core::str::FromStr;

use serde::{Deserialize, Serialize};

use dentledger_core::DomainError;

/// Clinic staff role.
///
/// Only `Admin` carries special powers in this core (deleting confirmed
/// services and payment vouchers, editing staff credits after the window).
/// The other roles exist so the employee directory can be mapped 1:1.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Receptionist,
    Sale,
    Doctor,
    Cashier,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Receptionist => "receptionist",
            Role::Sale => "sale",
            Role::Doctor => "doctor",
            Role::Cashier => "cashier",
        }
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, Role::Admin)
    }
}

impl core::fmt::Display for Role {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "receptionist" | "front_desk" => Ok(Role::Receptionist),
            "sale" | "sales" => Ok(Role::Sale),
            "doctor" => Ok(Role::Doctor),
            "cashier" => Ok(Role::Cashier),
            other => Err(DomainError::validation(format!("unknown role '{other}'"))),
        }
    }
}
