use core::str::FromStr;

use serde::{Deserialize, Serialize};

use dentledger_core::DomainError;

const PREFIX: &str = "PT";

/// Sequential receipt number, displayed as `PT000042`.
///
/// Sequences beyond six digits keep printing in full (`PT1234567`).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VoucherNumber(u64);

impl VoucherNumber {
    pub const fn new(sequence: u64) -> Self {
        Self(sequence)
    }

    pub const fn sequence(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for VoucherNumber {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{PREFIX}{:06}", self.0)
    }
}

impl FromStr for VoucherNumber {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s
            .strip_prefix(PREFIX)
            .filter(|d| !d.is_empty() && d.bytes().all(|b| b.is_ascii_digit()))
            .ok_or_else(|| DomainError::validation(format!("malformed voucher number '{s}'")))?;
        digits
            .parse::<u64>()
            .map(Self)
            .map_err(|e| DomainError::validation(format!("voucher number '{s}': {e}")))
    }
}
