use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use dentledger_consulting::{
    ConsultedService, ConsultedServiceId, ServiceStatus, StaffAssignment, TreatmentStatus,
};
use dentledger_core::{CustomerId, DentalServiceId, EmployeeId, Money};
use dentledger_infra::NewService;
use dentledger_payments::{PaymentAllocation, PaymentMethod, PaymentVoucher, PaymentVoucherId};

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Clone, Deserialize)]
pub struct ProposeServiceRequest {
    pub customer_id: CustomerId,
    pub dental_service_id: DentalServiceId,
    #[serde(default = "one")]
    pub quantity: u32,
    #[serde(default)]
    pub negotiated_unit_price: Option<Money>,
    #[serde(default)]
    pub tooth_positions: Vec<String>,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub staff: StaffAssignment,
}

fn one() -> u32 {
    1
}

impl From<ProposeServiceRequest> for NewService {
    fn from(r: ProposeServiceRequest) -> Self {
        NewService {
            customer_id: r.customer_id,
            dental_service_id: r.dental_service_id,
            quantity: r.quantity,
            negotiated_unit_price: r.negotiated_unit_price,
            tooth_positions: r.tooth_positions,
            notes: r.notes,
            staff: r.staff,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateVoucherRequest {
    pub customer_id: CustomerId,
    pub cashier_id: EmployeeId,
    pub payment_date: DateTime<Utc>,
    pub allocations: Vec<PaymentAllocation>,
    #[serde(default)]
    pub notes: Option<String>,
}

// -------------------------
// Response views
// -------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceView {
    pub id: ConsultedServiceId,
    pub customer_id: Option<CustomerId>,
    pub dental_service_id: Option<DentalServiceId>,
    pub service_name: String,
    pub unit: String,
    pub quantity: u32,
    pub unit_price: Money,
    pub negotiated_unit_price: Money,
    pub final_price: Money,
    pub amount_paid: Money,
    pub debt: Money,
    pub status: ServiceStatus,
    pub confirmed_at: Option<DateTime<Utc>>,
    pub treatment_status: TreatmentStatus,
    pub staff: StaffAssignment,
    pub tooth_positions: Vec<String>,
    pub notes: Option<String>,
    pub created_by: Option<EmployeeId>,
    pub updated_by: Option<EmployeeId>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl From<&ConsultedService> for ServiceView {
    fn from(s: &ConsultedService) -> Self {
        Self {
            id: s.id_typed(),
            customer_id: s.customer_id(),
            dental_service_id: s.dental_service_id(),
            service_name: s.service_name().to_string(),
            unit: s.unit().to_string(),
            quantity: s.quantity(),
            unit_price: s.unit_price(),
            negotiated_unit_price: s.negotiated_unit_price(),
            final_price: s.final_price(),
            amount_paid: s.amount_paid(),
            debt: s.debt(),
            status: s.status(),
            confirmed_at: s.confirmed_at(),
            treatment_status: s.treatment_status(),
            staff: *s.staff(),
            tooth_positions: s.tooth_positions().to_vec(),
            notes: s.notes().map(str::to_string),
            created_by: s.created_by(),
            updated_by: s.updated_by(),
            created_at: s.created_at(),
            updated_at: s.updated_at(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoucherDetailView {
    pub line_no: u32,
    pub service_id: ConsultedServiceId,
    pub amount: Money,
    pub method: PaymentMethod,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VoucherView {
    pub id: PaymentVoucherId,
    /// Display form, e.g. `PT000042`.
    pub number: Option<String>,
    pub customer_id: Option<CustomerId>,
    pub cashier_id: Option<EmployeeId>,
    pub created_by: Option<EmployeeId>,
    pub payment_date: Option<DateTime<Utc>>,
    pub total_amount: Money,
    pub notes: Option<String>,
    pub details: Vec<VoucherDetailView>,
}

impl From<&PaymentVoucher> for VoucherView {
    fn from(v: &PaymentVoucher) -> Self {
        Self {
            id: v.id_typed(),
            number: v.number().map(|n| n.to_string()),
            customer_id: v.customer_id(),
            cashier_id: v.cashier_id(),
            created_by: v.created_by(),
            payment_date: v.payment_date(),
            total_amount: v.total_amount(),
            notes: v.notes().map(str::to_string),
            details: v
                .details()
                .iter()
                .map(|d| VoucherDetailView {
                    line_no: d.line_no,
                    service_id: d.service_id,
                    amount: d.amount,
                    method: d.method,
                })
                .collect(),
        }
    }
}
