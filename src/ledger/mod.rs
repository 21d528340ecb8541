use serde_derive::{Deserialize, Serialize};

use crate::TOTAL_SEATS;

/// Running seat and revenue totals for one train run.
///
/// The caller owns the ledger and hands it to every allocation and
/// cancellation call.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    capacity_total: u32,
    seats_remaining: u32,
    revenue_total: f64,
}

impl Default for Ledger {
    fn default() -> Self {
        Self::with_capacity(TOTAL_SEATS)
    }
}

impl Ledger {
    pub fn with_capacity(capacity_total: u32) -> Self {
        Self {
            capacity_total,
            seats_remaining: capacity_total,
            revenue_total: 0.0,
        }
    }

    pub fn capacity_total(&self) -> u32 {
        self.capacity_total
    }

    pub fn seats_remaining(&self) -> u32 {
        self.seats_remaining
    }

    pub fn revenue_total(&self) -> f64 {
        self.revenue_total
    }

    pub fn seats_occupied(&self) -> u32 {
        self.capacity_total.saturating_sub(self.seats_remaining)
    }

    /// Empty train, no revenue.
    pub fn reset(&mut self) {
        self.seats_remaining = self.capacity_total;
        self.revenue_total = 0.0;
    }

    /// Takes `members` seats and books `fare` if they fit. Leaves the ledger
    /// untouched otherwise.
    pub(crate) fn try_reserve(&mut self, members: u32, fare: f64) -> bool {
        if members > self.seats_remaining {
            return false;
        }
        self.seats_remaining -= members;
        self.revenue_total += fare;
        true
    }

    /// Gives `members` seats back and pays out `refund`.
    pub(crate) fn release(&mut self, members: u32, refund: f64) {
        self.seats_remaining = self.seats_remaining.saturating_add(members);
        self.revenue_total -= refund;
    }
}

#[cfg(test)]
#[test]
fn test_reserve_and_release() {
    let mut ledger = Ledger::with_capacity(10);
    assert!(ledger.try_reserve(6, 60.0));
    assert_eq!(ledger.seats_remaining(), 4);
    assert_eq!(ledger.seats_occupied(), 6);

    // Does not fit: nothing changes
    assert!(!ledger.try_reserve(5, 50.0));
    assert_eq!(ledger.seats_remaining(), 4);
    assert!((ledger.revenue_total() - 60.0).abs() < 1e-9);

    // Exactly fits
    assert!(ledger.try_reserve(4, 8.0));
    assert_eq!(ledger.seats_remaining(), 0);

    ledger.release(6, 48.0);
    assert_eq!(ledger.seats_remaining(), 6);
    assert!((ledger.revenue_total() - 20.0).abs() < 1e-9);

    ledger.reset();
    assert_eq!(ledger.seats_remaining(), 10);
    assert_eq!(ledger.revenue_total(), 0.0);
}

#[cfg(test)]
#[test]
fn test_default_capacity() {
    let ledger = Ledger::default();
    assert_eq!(ledger.capacity_total(), TOTAL_SEATS);
    assert_eq!(ledger.seats_remaining(), TOTAL_SEATS);
}
