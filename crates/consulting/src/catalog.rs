use serde::{Deserialize, Serialize};

use dentledger_core::{DentalServiceId, Money};

/// Catalog template a consulted service is proposed from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DentalServiceTemplate {
    pub id: DentalServiceId,
    pub name: String,
    /// Billing unit shown on receipts ("tooth", "jaw", "session", ...).
    pub unit: String,
    pub default_price: Money,
}

/// Read-only service catalog (external collaborator).
///
/// Consulted only while a service is being proposed or, while still
/// Proposed, re-pointed at another template. Never re-read after
/// confirmation.
pub trait ServiceCatalog: Send + Sync {
    fn lookup(&self, id: DentalServiceId) -> Option<DentalServiceTemplate>;
}

impl<C> ServiceCatalog for std::sync::Arc<C>
where
    C: ServiceCatalog + ?Sized,
{
    fn lookup(&self, id: DentalServiceId) -> Option<DentalServiceTemplate> {
        (**self).lookup(id)
    }
}
