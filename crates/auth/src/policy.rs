//! Time-gated permission for editing staff credits on a confirmed service.
//!
//! "Within 33 days" is measured in **calendar days in the clinic's local
//! time zone**: both instants are shifted to the clinic's fixed UTC offset,
//! their dates are compared, and the difference must not exceed the window.
//! A service confirmed at 23:50 on March 1st stays editable until the end of
//! April 3rd (local), regardless of the hour of confirmation.

use chrono::{DateTime, FixedOffset, Offset, Utc};
use serde::Serialize;

use dentledger_core::{DomainError, DomainResult};

use crate::Role;

/// Length of the staff-edit window after confirmation, in calendar days.
pub const STAFF_EDIT_WINDOW_DAYS: i64 = 33;

/// Staff-field edit policy: window length plus the clinic's day boundary.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct StaffEditPolicy {
    window_days: i64,
    clinic_offset: FixedOffset,
}

impl Default for StaffEditPolicy {
    fn default() -> Self {
        Self {
            window_days: STAFF_EDIT_WINDOW_DAYS,
            clinic_offset: Utc.fix(),
        }
    }
}

impl StaffEditPolicy {
    /// Build a policy for a clinic at `utc_offset_minutes` (e.g. 420 for UTC+7).
    pub fn new(window_days: i64, utc_offset_minutes: i32) -> DomainResult<Self> {
        if window_days < 0 {
            return Err(DomainError::validation("staff edit window must not be negative"));
        }
        let clinic_offset = utc_offset_minutes
            .checked_mul(60)
            .and_then(FixedOffset::east_opt)
            .ok_or_else(|| {
                DomainError::validation(format!(
                    "clinic UTC offset out of range: {utc_offset_minutes} minutes"
                ))
            })?;
        Ok(Self {
            window_days,
            clinic_offset,
        })
    }

    pub fn window_days(&self) -> i64 {
        self.window_days
    }

    pub fn clinic_offset(&self) -> FixedOffset {
        self.clinic_offset
    }

    /// Calendar days between confirmation and `now` in clinic-local dates.
    /// A `now` before `confirmed_at` counts as day zero.
    pub fn days_since(&self, confirmed_at: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
        let confirmed = confirmed_at.with_timezone(&self.clinic_offset).date_naive();
        let today = now.with_timezone(&self.clinic_offset).date_naive();
        (today - confirmed).num_days().max(0)
    }

    pub fn can_edit_staff_fields(
        &self,
        role: Role,
        confirmed_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> bool {
        self.explain(role, confirmed_at, now).granted
    }

    /// Same decision as [`Self::can_edit_staff_fields`], with the numbers
    /// behind it for audit logs and error messages.
    pub fn explain(
        &self,
        role: Role,
        confirmed_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StaffEditDecision {
        let days = self.days_since(confirmed_at, now);

        if role.is_admin() {
            return StaffEditDecision {
                granted: true,
                role,
                days_since_confirmation: days,
                window_days: self.window_days,
                reason: "admin bypasses the staff edit window".to_string(),
            };
        }

        let granted = days <= self.window_days;
        let reason = if granted {
            format!(
                "confirmed {days} day(s) ago, within the {} day window",
                self.window_days
            )
        } else {
            format!(
                "confirmed {days} day(s) ago; staff credits lock after {} days for role '{role}'",
                self.window_days
            )
        };

        StaffEditDecision {
            granted,
            role,
            days_since_confirmation: days,
            window_days: self.window_days,
            reason,
        }
    }
}

/// Outcome of a staff-edit check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StaffEditDecision {
    pub granted: bool,
    pub role: Role,
    pub days_since_confirmation: i64,
    pub window_days: i64,
    pub reason: String,
}

/// Pure check with the default policy (33 calendar days, UTC day boundary).
pub fn can_edit_staff_fields(role: Role, confirmed_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
    StaffEditPolicy::default().can_edit_staff_fields(role, confirmed_at, now)
}
