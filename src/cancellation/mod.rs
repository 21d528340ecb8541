use std::fmt;

use serde_derive::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{BookingRequest, Ledger, RequestId, CANCELLATION_FEE_FRACTION};

/// Money and seats moved by a successful cancellation, plus the ledger totals
/// right after it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CancellationReceipt {
    pub id: RequestId,
    pub members: u32,
    pub fare: f64,
    pub fee: f64,
    pub refund: f64,
    pub seats_remaining: u32,
    pub revenue_total: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum CancellationOutcome {
    /// No request carries this id. Nothing changed.
    NotFound(RequestId),
    /// The request holds no seat, either because it is waiting or because it
    /// was already cancelled. Nothing changed.
    NotBooked(RequestId),
    Cancelled(CancellationReceipt),
}

impl CancellationOutcome {
    /// Id of the request that gave up its seats, if any did.
    pub fn cancelled_id(&self) -> Option<RequestId> {
        match self {
            CancellationOutcome::Cancelled(receipt) => Some(receipt.id),
            _ => None,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, CancellationOutcome::NotFound(_))
    }

    pub fn message(&self) -> String {
        self.to_string()
    }

    /// `(message, cancelled_id)`
    pub fn into_parts(self) -> (String, Option<RequestId>) {
        (self.message(), self.cancelled_id())
    }
}

impl fmt::Display for CancellationOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CancellationOutcome::NotFound(id) => write!(f, "Error: Group ID {} not found.", id),
            CancellationOutcome::NotBooked(id) => {
                write!(f, "Group {} is already unbooked or on the waiting list.", id)
            }
            CancellationOutcome::Cancelled(receipt) => {
                writeln!(
                    f,
                    "Cancellation successful for Group {} ({} members).",
                    receipt.id, receipt.members
                )?;
                writeln!(
                    f,
                    "Fare: ${:.2} | Fee Kept: ${:.2} | Refund Paid: ${:.2}",
                    receipt.fare, receipt.fee, receipt.refund
                )?;
                writeln!(
                    f,
                    "Seats Freed: {} | New Available Seats: {}",
                    receipt.members, receipt.seats_remaining
                )?;
                write!(f, "New Total Revenue: ${:.2}", receipt.revenue_total)
            }
        }
    }
}

/// Gives a booked group's seats back, refunding the fare minus a fee.
///
/// The fee stays in the ledger's revenue. Only the booked flag of the request
/// outlives the next allocation run, which rebuilds the ledger from scratch.
#[derive(Clone, Copy, Debug)]
pub struct CancellationHandler {
    fee_fraction: f64,
}

impl Default for CancellationHandler {
    fn default() -> Self {
        Self::with_fee_fraction(CANCELLATION_FEE_FRACTION)
    }
}

impl CancellationHandler {
    pub fn with_fee_fraction(fee_fraction: f64) -> Self {
        Self { fee_fraction }
    }

    pub fn fee_fraction(&self) -> f64 {
        self.fee_fraction
    }

    pub fn cancel(
        &self,
        requests: &mut [BookingRequest],
        ledger: &mut Ledger,
        id: RequestId,
    ) -> CancellationOutcome {
        let Some(request) = requests.iter_mut().find(|request| request.id() == id) else {
            warn!(request_id = id, "Cancellation target not found");
            return CancellationOutcome::NotFound(id);
        };

        if !request.is_booked() {
            info!(request_id = id, "Cancellation ignored, group holds no seats");
            return CancellationOutcome::NotBooked(id);
        }

        let fare = request.total_fare();
        let fee = fare * self.fee_fraction;
        let refund = fare - fee;

        request.set_booked(false);
        ledger.release(request.members(), refund);

        info!(
            request_id = id,
            members = request.members(),
            fee,
            refund,
            seats_remaining = ledger.seats_remaining(),
            revenue = ledger.revenue_total(),
            "Booking cancelled"
        );

        CancellationOutcome::Cancelled(CancellationReceipt {
            id,
            members: request.members(),
            fare,
            fee,
            refund,
            seats_remaining: ledger.seats_remaining(),
            revenue_total: ledger.revenue_total(),
        })
    }
}

#[cfg(test)]
fn worked_example() -> (Vec<BookingRequest>, Ledger) {
    use crate::{AllocationAlgorithm, GreedyAllocator, Route, StationLine};

    let line = StationLine::default();
    let mut requests = vec![
        BookingRequest::new(1, Route::new("A", "D"), 20, 5.0, &line),
        BookingRequest::new(2, Route::new("A", "B"), 90, 5.0, &line),
        BookingRequest::new(3, Route::new("A", "C"), 15, 5.0, &line),
    ];
    let mut ledger = Ledger::default();
    GreedyAllocator.allocate(&mut requests, &mut ledger, 5.0);
    (requests, ledger)
}

#[cfg(test)]
#[test]
fn test_cancel_booked_group() {
    let (mut requests, mut ledger) = worked_example();

    let outcome = CancellationHandler::default().cancel(&mut requests, &mut ledger, 2);
    let CancellationOutcome::Cancelled(receipt) = &outcome else {
        panic!("expected a cancellation, got {:?}", outcome);
    };

    assert!((receipt.fee - 90.0).abs() < 1e-9);
    assert!((receipt.refund - 360.0).abs() < 1e-9);
    assert!((ledger.revenue_total() - 90.0).abs() < 1e-9);
    assert_eq!(ledger.seats_remaining(), 100);
    assert_eq!(receipt.seats_remaining, 100);
    assert_eq!(outcome.cancelled_id(), Some(2));
    assert!(!outcome.is_error());

    let cancelled = requests.iter().find(|r| r.id() == 2).unwrap();
    assert!(!cancelled.is_booked());
}

#[cfg(test)]
#[test]
fn test_cancel_message() {
    let (mut requests, mut ledger) = worked_example();
    let (message, id) = CancellationHandler::default()
        .cancel(&mut requests, &mut ledger, 2)
        .into_parts();

    assert_eq!(id, Some(2));
    assert_eq!(
        message,
        "Cancellation successful for Group 2 (90 members).\n\
         Fare: $450.00 | Fee Kept: $90.00 | Refund Paid: $360.00\n\
         Seats Freed: 90 | New Available Seats: 100\n\
         New Total Revenue: $90.00"
    );
}

#[cfg(test)]
#[test]
fn test_cancel_unknown_id() {
    let (mut requests, mut ledger) = worked_example();
    let before = ledger;

    let outcome = CancellationHandler::default().cancel(&mut requests, &mut ledger, 99);
    assert_eq!(outcome, CancellationOutcome::NotFound(99));
    assert!(outcome.is_error());
    assert_eq!(outcome.cancelled_id(), None);
    assert_eq!(outcome.message(), "Error: Group ID 99 not found.");
    assert_eq!(ledger, before);
}

#[cfg(test)]
#[test]
fn test_cancel_waiting_or_cancelled_group() {
    let (mut requests, mut ledger) = worked_example();
    let handler = CancellationHandler::default();
    let before = ledger;

    // Group 1 is on the waiting list
    let outcome = handler.cancel(&mut requests, &mut ledger, 1);
    assert_eq!(outcome, CancellationOutcome::NotBooked(1));
    assert!(!outcome.is_error());
    assert_eq!(
        outcome.message(),
        "Group 1 is already unbooked or on the waiting list."
    );
    assert_eq!(ledger, before);

    // Cancelling twice only refunds once
    handler.cancel(&mut requests, &mut ledger, 2);
    let after_first = ledger;
    let outcome = handler.cancel(&mut requests, &mut ledger, 2);
    assert_eq!(outcome, CancellationOutcome::NotBooked(2));
    assert_eq!(ledger, after_first);
}

#[cfg(test)]
#[test]
fn test_reallocation_after_cancellation() {
    use crate::{AllocationAlgorithm, GreedyAllocator};

    let (mut requests, mut ledger) = worked_example();
    CancellationHandler::default().cancel(&mut requests, &mut ledger, 2);

    // The cancelled group is offered seats again on the next run
    let outcome = GreedyAllocator.allocate(&mut requests, &mut ledger, 5.0);
    assert_eq!(outcome.booked_ids(), vec![2]);
    assert!((outcome.revenue_total() - 450.0).abs() < 1e-9);
    assert_eq!(outcome.seats_remaining(), 10);
}

#[cfg(test)]
#[test]
fn test_custom_fee() {
    let (mut requests, mut ledger) = worked_example();
    let handler = CancellationHandler::with_fee_fraction(0.5);

    handler.cancel(&mut requests, &mut ledger, 2);
    assert!((ledger.revenue_total() - 225.0).abs() < 1e-9);
    assert_eq!(handler.fee_fraction(), 0.5);
}
