use std::fmt;

use fnv::FnvHashSet;
use itertools::Itertools;
use serde_derive::{Deserialize, Serialize};
use term_table::{row::Row, table_cell::TableCell, Table};
use tracing::{debug, info};

use crate::{BookingError, BookingRequest, Ledger, RequestId, Result};

use super::AllocationAlgorithm;

/// Books groups in order of fare, largest first, skipping any group that
/// no longer fits. There is no backtracking: a group that was accepted is
/// never displaced by a later one, even when that would pack the train better.
#[derive(Clone, Copy, Debug, Default)]
pub struct GreedyAllocator;

impl GreedyAllocator {
    /// Same as [`AllocationAlgorithm::allocate`] but refuses to run on a
    /// collection where two requests share an id.
    pub fn try_allocate(
        &self,
        requests: &mut [BookingRequest],
        ledger: &mut Ledger,
        fare_per_section: f64,
    ) -> Result<AllocationOutcome> {
        let mut seen = FnvHashSet::default();
        for request in requests.iter() {
            if !seen.insert(request.id()) {
                return Err(BookingError::DuplicateRequestId(request.id()));
            }
        }
        Ok(self.allocate(requests, ledger, fare_per_section))
    }
}

impl AllocationAlgorithm for GreedyAllocator {
    fn allocate(
        &self,
        requests: &mut [BookingRequest],
        ledger: &mut Ledger,
        fare_per_section: f64,
    ) -> AllocationOutcome {
        // Fares were fixed when each request was created. The rate is not
        // used to re-price anything here.
        ledger.reset();

        // Stable, so equal keys keep their insertion order.
        requests.sort_by(BookingRequest::allocation_order);

        let mut booked = vec![];
        let mut waiting = vec![];
        for request in requests.iter_mut() {
            request.set_booked(false);

            if request.fare_per_section() != fare_per_section {
                debug!(
                    request_id = request.id(),
                    priced_at = request.fare_per_section(),
                    fare_per_section,
                    "Keeping fare priced at a different rate"
                );
            }

            if ledger.try_reserve(request.members(), request.total_fare()) {
                request.set_booked(true);
                debug!(
                    request_id = request.id(),
                    members = request.members(),
                    fare = request.total_fare(),
                    seats_remaining = ledger.seats_remaining(),
                    "Booked group"
                );
                booked.push(request.clone());
            } else {
                debug!(
                    request_id = request.id(),
                    members = request.members(),
                    seats_remaining = ledger.seats_remaining(),
                    "Group does not fit, placed on waiting list"
                );
                waiting.push(request.clone());
            }
        }

        info!(
            booked = booked.len(),
            waiting = waiting.len(),
            revenue = ledger.revenue_total(),
            seats_remaining = ledger.seats_remaining(),
            fare_per_section,
            "Allocation complete"
        );

        AllocationOutcome {
            booked,
            waiting,
            ledger: *ledger,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BookingStatus {
    Booked,
    Waiting,
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BookingStatus::Booked => write!(f, "BOOKED"),
            BookingStatus::Waiting => write!(f, "WAITING"),
        }
    }
}

/// One line of an allocation listing.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusRow {
    pub id: RequestId,
    pub route: String,
    pub members: u32,
    pub total_fare: f64,
    pub status: BookingStatus,
}

/// Result of one allocation run. Both lists are in the order the allocator
/// considered the requests.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AllocationOutcome {
    booked: Vec<BookingRequest>,
    waiting: Vec<BookingRequest>,
    ledger: Ledger,
}

impl AllocationOutcome {
    pub fn booked(&self) -> &[BookingRequest] {
        &self.booked
    }

    pub fn waiting(&self) -> &[BookingRequest] {
        &self.waiting
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn revenue_total(&self) -> f64 {
        self.ledger.revenue_total()
    }

    pub fn seats_remaining(&self) -> u32 {
        self.ledger.seats_remaining()
    }

    pub fn booked_ids(&self) -> Vec<RequestId> {
        self.booked.iter().map(BookingRequest::id).collect()
    }

    pub fn waiting_ids(&self) -> Vec<RequestId> {
        self.waiting.iter().map(BookingRequest::id).collect()
    }

    /// `(booked, waiting, revenue_total, seats_remaining)`
    pub fn into_parts(self) -> (Vec<BookingRequest>, Vec<BookingRequest>, f64, u32) {
        let revenue = self.ledger.revenue_total();
        let seats = self.ledger.seats_remaining();
        (self.booked, self.waiting, revenue, seats)
    }

    /// Every request with its status, ordered by id for display.
    pub fn rows_by_id(&self) -> Vec<StatusRow> {
        self.booked
            .iter()
            .chain(self.waiting.iter())
            .sorted_by_key(|request| request.id())
            .map(|request| StatusRow {
                id: request.id(),
                route: request.route().to_string(),
                members: request.members(),
                total_fare: request.total_fare(),
                status: if request.is_booked() {
                    BookingStatus::Booked
                } else {
                    BookingStatus::Waiting
                },
            })
            .collect()
    }

    pub fn debug_table(&self) -> String {
        let mut table = Table::new();
        table.add_row(Row::new(vec![
            TableCell::new("ID"),
            TableCell::new("Route"),
            TableCell::new("Members"),
            TableCell::new("Fare"),
            TableCell::new("Status"),
        ]));

        for row in self.rows_by_id() {
            table.add_row(Row::new(vec![
                TableCell::new(row.id),
                TableCell::new(&row.route),
                TableCell::new(row.members),
                TableCell::new(format!("{:.2}", row.total_fare)),
                TableCell::new(row.status),
            ]));
        }

        format!(
            "{}\nAllocation Capacity: {}.\nTotal Revenue: ${:.2} | Remaining Capacity: {}",
            table.render(),
            self.ledger.capacity_total(),
            self.revenue_total(),
            self.seats_remaining()
        )
    }
}

#[cfg(test)]
fn build(line: &crate::StationLine, groups: &[(RequestId, &str, u32)], rate: f64) -> Vec<BookingRequest> {
    groups
        .iter()
        .map(|(id, code, members)| {
            BookingRequest::new(*id, crate::Route::from_code(code).unwrap(), *members, rate, line)
        })
        .collect()
}

#[cfg(test)]
#[test]
fn test_worked_example() {
    let line = crate::StationLine::default();
    let mut requests = build(&line, &[(1, "AD", 20), (2, "AB", 90), (3, "AC", 15)], 5.0);
    let mut ledger = Ledger::default();

    let outcome = GreedyAllocator.allocate(&mut requests, &mut ledger, 5.0);

    assert_eq!(outcome.booked_ids(), vec![2]);
    assert_eq!(outcome.waiting_ids(), vec![1, 3]);
    assert!((outcome.revenue_total() - 450.0).abs() < 1e-9);
    assert_eq!(outcome.seats_remaining(), 10);
    assert_eq!(ledger, *outcome.ledger());

    // The working collection is left in processed order
    let order: Vec<_> = requests.iter().map(|r| r.id()).collect();
    assert_eq!(order, vec![2, 1, 3]);
    assert!(requests[0].is_booked());
    assert!(!requests[1].is_booked());
    assert!(!requests[2].is_booked());
}

#[cfg(test)]
#[test]
fn test_tie_break_and_stability() {
    let line = crate::StationLine::default();
    // 4 and 2 both pay 100, 4 is smaller. 1 and 3 are indistinguishable.
    let mut requests = build(
        &line,
        &[(1, "AB", 10), (2, "AB", 20), (3, "AB", 10), (4, "AC", 10)],
        5.0,
    );
    let mut ledger = Ledger::default();

    let outcome = GreedyAllocator.allocate(&mut requests, &mut ledger, 5.0);
    assert_eq!(outcome.booked_ids(), vec![4, 2, 1, 3]);
    assert!(outcome.waiting().is_empty());
    assert_eq!(outcome.seats_remaining(), 50);
}

#[cfg(test)]
#[test]
fn test_greedy_does_not_backtrack() {
    let line = crate::StationLine::default();
    // Booking 2 and 3 would earn 1000, greedy takes 1 and stops at 600.
    let mut requests = build(&line, &[(1, "AB", 60), (2, "AB", 50), (3, "AB", 50)], 10.0);
    let mut ledger = Ledger::default();

    let outcome = GreedyAllocator.allocate(&mut requests, &mut ledger, 10.0);
    assert_eq!(outcome.booked_ids(), vec![1]);
    assert_eq!(outcome.waiting_ids(), vec![2, 3]);
    assert!((outcome.revenue_total() - 600.0).abs() < 1e-9);
    assert_eq!(outcome.seats_remaining(), 40);
}

#[cfg(test)]
#[test]
fn test_later_small_group_fills_gap() {
    let line = crate::StationLine::default();
    let mut requests = build(&line, &[(1, "AB", 90), (2, "AD", 20), (3, "AB", 5), (4, "DA", 5)], 5.0);
    let mut ledger = Ledger::default();

    let outcome = GreedyAllocator.allocate(&mut requests, &mut ledger, 5.0);
    // The free reversed route still gets seats when there is room
    assert_eq!(outcome.booked_ids(), vec![1, 3, 4]);
    assert_eq!(outcome.waiting_ids(), vec![2]);
    assert_eq!(outcome.seats_remaining(), 0);
}

#[cfg(test)]
#[test]
fn test_idempotent() {
    let line = crate::StationLine::default();
    let mut requests = build(
        &line,
        &[(1, "AD", 20), (2, "AB", 90), (3, "AC", 15), (4, "BD", 15), (5, "CD", 40)],
        5.0,
    );
    let mut ledger = Ledger::default();

    let first = GreedyAllocator.allocate(&mut requests, &mut ledger, 5.0);
    let second = GreedyAllocator.allocate(&mut requests, &mut ledger, 5.0);
    assert_eq!(first, second);
}

#[cfg(test)]
#[test]
fn test_fare_rate_does_not_reprice() {
    let line = crate::StationLine::default();
    let mut requests = build(&line, &[(1, "AD", 20), (2, "AB", 90)], 5.0);
    let mut ledger = Ledger::default();

    let at_five = GreedyAllocator.allocate(&mut requests, &mut ledger, 5.0);
    let at_fifty = GreedyAllocator.allocate(&mut requests, &mut ledger, 50.0);
    assert_eq!(at_five, at_fifty);
    assert!((at_fifty.revenue_total() - 450.0).abs() < 1e-9);

    // Each request still carries the rate it was priced at
    assert!(at_fifty.booked().iter().all(|r| r.fare_per_section() == 5.0));
    assert!(requests.iter().all(|r| r.fare_per_section() == 5.0));
}

#[cfg(test)]
#[test]
fn test_prior_booking_state_is_cleared() {
    let line = crate::StationLine::default();
    let mut requests = build(&line, &[(1, "AB", 80), (2, "AD", 80)], 5.0);
    requests[0].set_booked(true);
    let mut ledger = Ledger::default();

    let outcome = GreedyAllocator.allocate(&mut requests, &mut ledger, 5.0);
    assert_eq!(outcome.booked_ids(), vec![2]);
    let stale = requests.iter().find(|r| r.id() == 1).unwrap();
    assert!(!stale.is_booked());
}

#[cfg(test)]
#[test]
fn test_ledger_reset_between_runs() {
    let line = crate::StationLine::default();
    let mut requests = build(&line, &[(1, "AB", 30)], 5.0);
    let mut ledger = Ledger::default();
    ledger.release(0, -1234.0);

    let outcome = GreedyAllocator.allocate(&mut requests, &mut ledger, 5.0);
    assert!((outcome.revenue_total() - 150.0).abs() < 1e-9);
    assert_eq!(outcome.seats_remaining(), 70);
}

#[cfg(test)]
#[test]
fn test_duplicate_ids_rejected() {
    let line = crate::StationLine::default();
    let mut requests = build(&line, &[(1, "AB", 30), (2, "AC", 10), (1, "BD", 5)], 5.0);
    let mut ledger = Ledger::default();

    let result = GreedyAllocator.try_allocate(&mut requests, &mut ledger, 5.0);
    assert!(matches!(result, Err(BookingError::DuplicateRequestId(1))));
    // Nothing was booked
    assert!(requests.iter().all(|r| !r.is_booked()));
}

#[cfg(test)]
#[test]
fn test_capacity_respected_on_generated_scenarios() {
    use crate::scenario_generation::{generate_group_requests, ScenarioParameters};

    let line = crate::StationLine::default();
    for seed in ["alpha", "bravo", "charlie", "delta", "echo"] {
        let params = ScenarioParameters {
            num_groups: 40,
            max_members: 35,
            fare_per_section: 5.0,
        };
        let mut requests = generate_group_requests(seed, &params, &line);
        let mut ledger = Ledger::default();
        let outcome = GreedyAllocator.allocate(&mut requests, &mut ledger, 5.0);

        let seats_booked: u32 = outcome.booked().iter().map(|r| r.members()).sum();
        assert!(seats_booked <= ledger.capacity_total());
        assert_eq!(outcome.seats_remaining(), ledger.capacity_total() - seats_booked);

        let revenue: f64 = outcome.booked().iter().map(|r| r.total_fare()).sum();
        assert!((outcome.revenue_total() - revenue).abs() < 1e-6);

        assert_eq!(outcome.booked().len() + outcome.waiting().len(), requests.len());
        assert!(outcome.booked().iter().all(|r| r.is_booked()));
        assert!(outcome.waiting().iter().all(|r| !r.is_booked()));

        for list in [outcome.booked(), outcome.waiting()] {
            for pair in list.windows(2) {
                assert_ne!(pair[0].allocation_order(&pair[1]), std::cmp::Ordering::Greater);
            }
        }

        // Every waiting group was too big for what was left when it was reached
        for waiting in outcome.waiting() {
            assert!(waiting.members() > outcome.seats_remaining());
        }
    }
}

#[cfg(test)]
#[test]
fn test_rows_by_id() {
    let line = crate::StationLine::default();
    let mut requests = build(&line, &[(1, "AD", 20), (2, "AB", 90), (3, "AC", 15)], 5.0);
    let mut ledger = Ledger::default();
    let outcome = GreedyAllocator.allocate(&mut requests, &mut ledger, 5.0);

    let rows = outcome.rows_by_id();
    let ids: Vec<_> = rows.iter().map(|row| row.id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert_eq!(rows[0].status, BookingStatus::Waiting);
    assert_eq!(rows[1].status, BookingStatus::Booked);
    assert_eq!(rows[1].route, "AB");

    let table = outcome.debug_table();
    assert!(table.contains("BOOKED"));
    assert!(table.contains("WAITING"));
    assert!(table.contains(
        "Allocation Capacity: 100.\nTotal Revenue: $450.00 | Remaining Capacity: 10"
    ));

    let (booked, waiting, revenue, seats) = outcome.into_parts();
    assert_eq!(booked.len(), 1);
    assert_eq!(waiting.len(), 2);
    assert!((revenue - 450.0).abs() < 1e-9);
    assert_eq!(seats, 10);
}
