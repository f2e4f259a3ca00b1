//! Voucher number allocation.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dentledger_payments::VoucherNumber;

/// Issues receipt numbers.
///
/// Every number is strictly greater than any number issued before it by the
/// same allocator, and concurrent callers never receive the same number.
/// The ledger draws a number only after every check has passed, so a
/// rejected voucher takes none. A store failure at commit leaves a gap;
/// that number is never reissued.
pub trait VoucherNumberAllocator: Send + Sync {
    fn generate_next(&self) -> VoucherNumber;
}

impl<A> VoucherNumberAllocator for Arc<A>
where
    A: VoucherNumberAllocator + ?Sized,
{
    fn generate_next(&self) -> VoucherNumber {
        (**self).generate_next()
    }
}

/// Lock-free counter, seeded from the highest number already persisted.
#[derive(Debug, Default)]
pub struct AtomicVoucherNumberAllocator {
    last: AtomicU64,
}

impl AtomicVoucherNumberAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue after `last` (e.g. the highest number found in the store).
    pub fn starting_after(last: Option<VoucherNumber>) -> Self {
        Self {
            last: AtomicU64::new(last.map(VoucherNumber::sequence).unwrap_or(0)),
        }
    }

    pub fn last_issued(&self) -> Option<VoucherNumber> {
        match self.last.load(Ordering::SeqCst) {
            0 => None,
            n => Some(VoucherNumber::new(n)),
        }
    }
}

impl VoucherNumberAllocator for AtomicVoucherNumberAllocator {
    fn generate_next(&self) -> VoucherNumber {
        VoucherNumber::new(self.last.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::thread;

    #[test]
    fn continues_after_the_seed() {
        let alloc = AtomicVoucherNumberAllocator::starting_after(Some(VoucherNumber::new(41)));
        assert_eq!(alloc.generate_next().to_string(), "PT000042");
        assert_eq!(alloc.generate_next().sequence(), 43);
        assert_eq!(alloc.last_issued(), Some(VoucherNumber::new(43)));
    }

    #[test]
    fn fresh_allocator_starts_at_one() {
        let alloc = AtomicVoucherNumberAllocator::new();
        assert_eq!(alloc.last_issued(), None);
        assert_eq!(alloc.generate_next().sequence(), 1);
    }

    #[test]
    fn concurrent_numbers_are_unique() {
        let alloc = Arc::new(AtomicVoucherNumberAllocator::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let alloc = Arc::clone(&alloc);
                thread::spawn(move || (0..500).map(|_| alloc.generate_next()).collect::<Vec<_>>())
            })
            .collect();

        let mut seen = HashSet::new();
        for h in handles {
            let numbers = h.join().unwrap();
            // Strictly increasing within each caller.
            assert!(numbers.windows(2).all(|w| w[0] < w[1]));
            for n in numbers {
                assert!(seen.insert(n));
            }
        }
        assert_eq!(seen.len(), 4_000);
    }
}
