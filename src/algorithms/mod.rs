use crate::{BookingRequest, Ledger};

use self::greedy_allocator::AllocationOutcome;

pub mod greedy_allocator;

/// Decides which requests get seats.
///
/// An implementation must rebuild the booking state from scratch on every
/// call: it resets `ledger`, clears every `is_booked` flag it does not set, and
/// reports the partition it produced.
pub trait AllocationAlgorithm {
    fn allocate(
        &self,
        requests: &mut [BookingRequest],
        ledger: &mut Ledger,
        fare_per_section: f64,
    ) -> AllocationOutcome;
}
