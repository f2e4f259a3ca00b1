//! Tracing and logging setup shared by every binary that embeds the ledger.

/// Initialize process-wide tracing with JSON output and an `info` default.
///
/// This is safe to call multiple times; subsequent calls become no-ops.
pub fn init() {
    self::tracing::init_with(LogFormat::Json, "info");
}

/// Tracing configuration (filters, output format).
pub mod tracing;

pub use self::tracing::{LogFormat, ParseLogFormatError, init_with};
