//! Group seat allocation for a single train run.
//!
//! Groups ask for seats between two stations on a line. Each request is priced
//! once, when it is created, from the number of sections travelled. The
//! [`GreedyAllocator`] then fills the train highest fare first, and the
//! [`CancellationHandler`] gives seats back while keeping a cancellation fee.
//! The [`BookingSystem`] wraps both behind a small session API.

use std::cmp::Ordering;
use std::fmt;

use ordered_float::OrderedFloat;
use serde_derive::{Deserialize, Serialize};

pub mod algorithms;
pub mod cancellation;
pub mod config;
pub mod database;
pub mod error;
pub mod ledger;
pub mod scenario_generation;

pub use algorithms::greedy_allocator::{AllocationOutcome, BookingStatus, GreedyAllocator, StatusRow};
pub use algorithms::AllocationAlgorithm;
pub use cancellation::{CancellationHandler, CancellationOutcome, CancellationReceipt};
pub use config::TrainConfig;
pub use database::{BookingSystem, SharedBookingSystem};
pub use error::{BookingError, Result};
pub use ledger::Ledger;

/// Number of seats on the train.
pub const TOTAL_SEATS: u32 = 100;

/// Share of the fare kept when a booked group cancels.
pub const CANCELLATION_FEE_FRACTION: f64 = 0.20;

/// Stations served by the default line, in travel order.
pub const DEFAULT_STATIONS: [&str; 4] = ["A", "B", "C", "D"];

pub type RequestId = u64;

/// Ordered list of station codes. Travel is only priced in the forward direction.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct StationLine {
    stations: Vec<String>,
}

impl StationLine {
    pub fn new<S: Into<String>>(stations: impl IntoIterator<Item = S>) -> Self {
        Self {
            stations: stations.into_iter().map(Into::into).collect(),
        }
    }

    pub fn stations(&self) -> &[String] {
        &self.stations
    }

    pub fn len(&self) -> usize {
        self.stations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stations.is_empty()
    }

    pub fn index_of(&self, code: &str) -> Option<usize> {
        self.stations.iter().position(|station| station == code)
    }

    pub fn contains(&self, code: &str) -> bool {
        self.index_of(code).is_some()
    }

    /// Number of station-to-station hops covered by `route`.
    ///
    /// Unknown stations and routes that do not move forward along the line
    /// cover zero sections.
    pub fn sections(&self, route: &Route) -> u32 {
        let (Some(from), Some(to)) = (self.index_of(&route.origin), self.index_of(&route.destination))
        else {
            return 0;
        };

        if from >= to {
            return 0;
        }
        (to - from) as u32
    }
}

impl Default for StationLine {
    fn default() -> Self {
        Self::new(DEFAULT_STATIONS)
    }
}

/// Origin and destination station of a group.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Route {
    pub origin: String,
    pub destination: String,
}

impl Route {
    pub fn new(origin: impl Into<String>, destination: impl Into<String>) -> Self {
        Self {
            origin: origin.into(),
            destination: destination.into(),
        }
    }

    /// Splits a two station code such as `"AD"` into a route.
    pub fn from_code(code: &str) -> Result<Self> {
        let mut chars = code.chars();
        match (chars.next(), chars.next(), chars.next()) {
            (Some(origin), Some(destination), None) => {
                Ok(Self::new(origin.to_string(), destination.to_string()))
            }
            _ => Err(BookingError::MalformedRouteCode(code.to_string())),
        }
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.origin, self.destination)
    }
}

/// A group asking for seats on one route.
///
/// The fare is fixed when the request is built. Later allocation runs never
/// re-price it, even when they are given a different fare rate.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BookingRequest {
    id: RequestId,
    route: Route,
    members: u32,
    sections: u32,
    fare_per_section: f64,
    total_fare: f64,
    is_booked: bool,
}

impl BookingRequest {
    /// Prices a request against `stations`. Never fails: a route the line
    /// cannot price gets a zero fare and so sorts behind every paying group.
    pub fn new(
        id: RequestId,
        route: Route,
        members: u32,
        fare_per_section: f64,
        stations: &StationLine,
    ) -> Self {
        let sections = stations.sections(&route);
        let total_fare = fare_per_section * sections as f64 * members as f64;
        Self {
            id,
            route,
            members,
            sections,
            fare_per_section,
            total_fare,
            is_booked: false,
        }
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn route(&self) -> &Route {
        &self.route
    }

    pub fn members(&self) -> u32 {
        self.members
    }

    pub fn sections(&self) -> u32 {
        self.sections
    }

    /// Rate the fare was computed with.
    pub fn fare_per_section(&self) -> f64 {
        self.fare_per_section
    }

    pub fn total_fare(&self) -> f64 {
        self.total_fare
    }

    pub fn is_booked(&self) -> bool {
        self.is_booked
    }

    pub(crate) fn set_booked(&mut self, booked: bool) {
        self.is_booked = booked;
    }

    /// Order in which the allocator considers requests: higher fare first,
    /// then the smaller group.
    pub fn allocation_order(&self, other: &Self) -> Ordering {
        OrderedFloat(other.total_fare)
            .cmp(&OrderedFloat(self.total_fare))
            .then_with(|| self.members.cmp(&other.members))
    }
}

/// Hands out request ids. Owned by whoever builds requests, so separate
/// sessions and test runs never share a counter.
#[derive(Clone, Debug)]
pub struct RequestIdIssuer {
    next_id: RequestId,
}

impl Default for RequestIdIssuer {
    fn default() -> Self {
        Self { next_id: 1 }
    }
}

impl RequestIdIssuer {
    pub fn starting_at(next_id: RequestId) -> Self {
        Self { next_id }
    }

    pub fn peek(&self) -> RequestId {
        self.next_id
    }

    pub fn issue(&mut self) -> Result<RequestId> {
        let id = self.next_id;
        self.next_id = id.checked_add(1).ok_or(BookingError::RequestIdsExhausted)?;
        Ok(id)
    }

    /// Builds a request, drawing a fresh id only when none is supplied.
    pub fn create_request(
        &mut self,
        route: Route,
        members: u32,
        fare_per_section: f64,
        id: Option<RequestId>,
        stations: &StationLine,
    ) -> Result<BookingRequest> {
        let id = match id {
            Some(id) => id,
            None => self.issue()?,
        };
        Ok(BookingRequest::new(id, route, members, fare_per_section, stations))
    }

    /// Moves the counter past an id that was supplied by the caller. Fails
    /// without touching the counter when no id would be left after it.
    pub fn observe(&mut self, id: RequestId) -> Result<()> {
        if id >= self.next_id {
            self.next_id = id.checked_add(1).ok_or(BookingError::RequestIdsExhausted)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[test]
fn test_sections_and_fare() {
    let line = StationLine::default();

    let request = BookingRequest::new(1, Route::new("A", "D"), 20, 5.0, &line);
    assert_eq!(request.sections(), 3);
    assert_eq!(request.fare_per_section(), 5.0);
    assert!((request.total_fare() - 300.0).abs() < 1e-9);
    assert!(!request.is_booked());

    let request = BookingRequest::new(2, Route::new("B", "C"), 7, 2.5, &line);
    assert_eq!(request.sections(), 1);
    assert!((request.total_fare() - 17.5).abs() < 1e-9);
}

#[cfg(test)]
#[test]
fn test_unpriceable_routes_are_free() {
    let line = StationLine::default();

    // Reversed
    let reversed = BookingRequest::new(1, Route::new("D", "A"), 10, 5.0, &line);
    assert_eq!(reversed.sections(), 0);
    assert_eq!(reversed.total_fare(), 0.0);

    // Zero length
    let same = BookingRequest::new(2, Route::new("B", "B"), 10, 5.0, &line);
    assert_eq!(same.sections(), 0);

    // Unknown station
    let unknown = BookingRequest::new(3, Route::new("A", "Z"), 10, 5.0, &line);
    assert_eq!(unknown.sections(), 0);
    assert_eq!(unknown.total_fare(), 0.0);
}

#[cfg(test)]
#[test]
fn test_longer_lines() {
    let line = StationLine::new(["P", "Q", "R", "S", "T", "U"]);
    assert_eq!(line.sections(&Route::new("Q", "U")), 4);
    assert_eq!(line.sections(&Route::new("U", "Q")), 0);
    assert!(line.contains("T"));
    assert!(!line.contains("A"));
}

#[cfg(test)]
#[test]
fn test_allocation_order() {
    let line = StationLine::default();
    let rich = BookingRequest::new(1, Route::new("A", "B"), 90, 5.0, &line);
    let poor = BookingRequest::new(2, Route::new("A", "D"), 20, 5.0, &line);
    assert_eq!(rich.allocation_order(&poor), Ordering::Less);
    assert_eq!(poor.allocation_order(&rich), Ordering::Greater);

    // Same fare: the smaller group goes first
    let small = BookingRequest::new(3, Route::new("A", "C"), 10, 5.0, &line);
    let large = BookingRequest::new(4, Route::new("A", "B"), 20, 5.0, &line);
    assert!((small.total_fare() - large.total_fare()).abs() < 1e-9);
    assert_eq!(small.allocation_order(&large), Ordering::Less);

    let twin = BookingRequest::new(5, Route::new("A", "C"), 10, 5.0, &line);
    assert_eq!(small.allocation_order(&twin), Ordering::Equal);
}

#[cfg(test)]
#[test]
fn test_route_code() {
    let route = Route::from_code("AD").unwrap();
    assert_eq!(route, Route::new("A", "D"));
    assert_eq!(route.to_string(), "AD");

    assert!(matches!(
        Route::from_code("A"),
        Err(BookingError::MalformedRouteCode(_))
    ));
    assert!(matches!(
        Route::from_code("ABC"),
        Err(BookingError::MalformedRouteCode(_))
    ));
}

#[cfg(test)]
#[test]
fn test_id_issuer() {
    let line = StationLine::default();
    let mut issuer = RequestIdIssuer::default();

    let first = issuer.create_request(Route::new("A", "B"), 1, 5.0, None, &line).unwrap();
    let explicit = issuer.create_request(Route::new("A", "B"), 1, 5.0, Some(42), &line).unwrap();
    let second = issuer.create_request(Route::new("A", "B"), 1, 5.0, None, &line).unwrap();

    assert_eq!(first.id(), 1);
    assert_eq!(explicit.id(), 42);
    // A supplied id does not consume the counter
    assert_eq!(second.id(), 2);

    issuer.observe(42).unwrap();
    assert_eq!(issuer.peek(), 43);
    issuer.observe(10).unwrap();
    assert_eq!(issuer.peek(), 43);
}

#[cfg(test)]
#[test]
fn test_id_issuer_exhaustion() {
    let line = StationLine::default();
    let mut issuer = RequestIdIssuer::default();

    assert!(matches!(
        issuer.observe(RequestId::MAX),
        Err(BookingError::RequestIdsExhausted)
    ));
    assert_eq!(issuer.peek(), 1);

    let mut issuer = RequestIdIssuer::starting_at(RequestId::MAX - 1);
    assert_eq!(issuer.issue().unwrap(), RequestId::MAX - 1);
    assert!(matches!(issuer.issue(), Err(BookingError::RequestIdsExhausted)));
    assert!(matches!(
        issuer.create_request(Route::new("A", "B"), 1, 5.0, None, &line),
        Err(BookingError::RequestIdsExhausted)
    ));
    // A supplied id still works
    let request = issuer
        .create_request(Route::new("A", "B"), 1, 5.0, Some(3), &line)
        .unwrap();
    assert_eq!(request.id(), 3);
}
