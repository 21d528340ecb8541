use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info};

use crate::{
    AllocationAlgorithm, AllocationOutcome, BookingError, BookingRequest, CancellationHandler,
    CancellationOutcome, GreedyAllocator, Ledger, RequestId, RequestIdIssuer, Result, Route,
    StationLine, TrainConfig,
};

/// Working set of group requests for one train run, together with the
/// ledger and the allocator and cancellation policy that act on it.
///
/// Requests added through [`BookingSystem::add_group`] are validated the way
/// an input form would. Requests built elsewhere can be handed over with
/// [`BookingSystem::insert_request`].
pub struct BookingSystem {
    config: TrainConfig,
    stations: StationLine,
    issuer: RequestIdIssuer,
    requests: Vec<BookingRequest>,
    ledger: Ledger,
    allocator: GreedyAllocator,
    cancellation: CancellationHandler,
    last_fare_per_section: f64,
    last_outcome: Option<AllocationOutcome>,
}

impl Default for BookingSystem {
    fn default() -> Self {
        Self::build(TrainConfig::default())
    }
}

impl BookingSystem {
    pub fn create_with_config(config: TrainConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: TrainConfig) -> Self {
        Self {
            stations: config.station_line(),
            ledger: Ledger::with_capacity(config.capacity),
            cancellation: CancellationHandler::with_fee_fraction(config.cancellation_fee_fraction),
            last_fare_per_section: config.default_fare_per_section,
            issuer: RequestIdIssuer::default(),
            requests: vec![],
            allocator: GreedyAllocator,
            last_outcome: None,
            config,
        }
    }

    pub fn config(&self) -> &TrainConfig {
        &self.config
    }

    pub fn stations(&self) -> &StationLine {
        &self.stations
    }

    pub fn requests(&self) -> &[BookingRequest] {
        &self.requests
    }

    pub fn request(&self, id: RequestId) -> Option<&BookingRequest> {
        self.requests.iter().find(|request| request.id() == id)
    }

    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    pub fn last_outcome(&self) -> Option<&AllocationOutcome> {
        self.last_outcome.as_ref()
    }

    /// Validates and adds a group. `route_code` is case insensitive.
    ///
    /// Both stations must exist, but a reversed route is accepted and simply
    /// priced at zero.
    pub fn add_group(
        &mut self,
        route_code: &str,
        members: i64,
        fare_per_section: f64,
    ) -> Result<&BookingRequest> {
        let route = Route::from_code(&route_code.to_uppercase())?;
        for station in [&route.origin, &route.destination] {
            if !self.stations.contains(station) {
                return Err(BookingError::UnknownStation(station.clone()));
            }
        }

        let members = u32::try_from(members)
            .ok()
            .filter(|members| *members > 0)
            .ok_or(BookingError::InvalidMembers(members))?;

        if !(fare_per_section > 0.0) {
            return Err(BookingError::InvalidFareRate(fare_per_section));
        }

        let request = self
            .issuer
            .create_request(route, members, fare_per_section, None, &self.stations)?;

        debug!(
            request_id = request.id(),
            route = %request.route(),
            members,
            fare = request.total_fare(),
            "Group added"
        );
        self.requests.push(request);
        Ok(&self.requests[self.requests.len() - 1])
    }

    /// Adds a request built by the caller. Its id must not be in use.
    pub fn insert_request(&mut self, request: BookingRequest) -> Result<()> {
        if self.request(request.id()).is_some() {
            return Err(BookingError::DuplicateRequestId(request.id()));
        }
        self.issuer.observe(request.id())?;
        self.requests.push(request);
        Ok(())
    }

    /// Drops a request from the working set.
    ///
    /// The ledger is left alone until the next allocation run.
    pub fn remove_request(&mut self, id: RequestId) -> Option<BookingRequest> {
        let index = self.requests.iter().position(|request| request.id() == id)?;
        Some(self.requests.remove(index))
    }

    pub fn run_allocation(&mut self, fare_per_section: f64) -> Result<&AllocationOutcome> {
        if self.requests.is_empty() {
            return Err(BookingError::NoRequests);
        }
        if !(fare_per_section > 0.0) {
            return Err(BookingError::InvalidFareRate(fare_per_section));
        }

        self.last_fare_per_section = fare_per_section;
        let outcome = self
            .allocator
            .try_allocate(&mut self.requests, &mut self.ledger, fare_per_section)?;
        let outcome = self.last_outcome.insert(outcome);
        Ok(&*outcome)
    }

    /// Cancels a booking and, when seats were freed, allocates again so that
    /// waiting groups can take them.
    ///
    /// The returned outcome reports the ledger as the cancellation left it,
    /// before the new allocation run.
    pub fn cancel(&mut self, id: RequestId) -> CancellationOutcome {
        let outcome = self
            .cancellation
            .cancel(&mut self.requests, &mut self.ledger, id);

        if outcome.cancelled_id().is_some() {
            info!(request_id = id, "Re-running allocation after cancellation");
            let rerun = self.allocator.allocate(
                &mut self.requests,
                &mut self.ledger,
                self.last_fare_per_section,
            );
            self.last_outcome = Some(rerun);
        }
        outcome
    }
}

/// A [`BookingSystem`] behind one lock, so that an allocation pass or a
/// cancellation is never observed half done.
#[derive(Clone, Default)]
pub struct SharedBookingSystem {
    inner: Arc<Mutex<BookingSystem>>,
}

impl SharedBookingSystem {
    pub fn new(system: BookingSystem) -> Self {
        Self {
            inner: Arc::new(Mutex::new(system)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, BookingSystem> {
        // Every operation leaves the system consistent before it can panic,
        // so a poisoned lock is still usable.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_group(
        &self,
        route_code: &str,
        members: i64,
        fare_per_section: f64,
    ) -> Result<BookingRequest> {
        self.lock()
            .add_group(route_code, members, fare_per_section)
            .cloned()
    }

    pub fn run_allocation(&self, fare_per_section: f64) -> Result<AllocationOutcome> {
        self.lock().run_allocation(fare_per_section).cloned()
    }

    pub fn cancel(&self, id: RequestId) -> CancellationOutcome {
        self.lock().cancel(id)
    }

    pub fn ledger(&self) -> Ledger {
        *self.lock().ledger()
    }

    /// Runs `f` with exclusive access to the whole system.
    pub fn with_system<T>(&self, f: impl FnOnce(&mut BookingSystem) -> T) -> T {
        f(&mut self.lock())
    }
}

#[cfg(test)]
fn worked_example_system() -> BookingSystem {
    let mut system = BookingSystem::default();
    system.add_group("AD", 20, 5.0).unwrap();
    system.add_group("ab", 90, 5.0).unwrap();
    system.add_group("AC", 15, 5.0).unwrap();
    system
}

#[cfg(test)]
#[test]
fn test_add_group_validation() {
    let mut system = BookingSystem::default();

    let request = system.add_group("ad", 20, 5.0).unwrap();
    assert_eq!(request.id(), 1);
    assert_eq!(request.route(), &Route::new("A", "D"));
    assert!((request.total_fare() - 300.0).abs() < 1e-9);

    assert!(matches!(
        system.add_group("A", 5, 5.0),
        Err(BookingError::MalformedRouteCode(_))
    ));
    assert!(matches!(
        system.add_group("AZ", 5, 5.0),
        Err(BookingError::UnknownStation(s)) if s == "Z"
    ));
    assert!(matches!(
        system.add_group("AB", 0, 5.0),
        Err(BookingError::InvalidMembers(0))
    ));
    assert!(matches!(
        system.add_group("AB", -3, 5.0),
        Err(BookingError::InvalidMembers(-3))
    ));
    assert!(matches!(
        system.add_group("AB", 3, 0.0),
        Err(BookingError::InvalidFareRate(_))
    ));

    // Reversed routes are accepted with no fare
    let reversed = system.add_group("DA", 5, 5.0).unwrap();
    assert_eq!(reversed.id(), 2);
    assert_eq!(reversed.total_fare(), 0.0);
    assert_eq!(system.requests().len(), 2);
}

#[cfg(test)]
#[test]
fn test_run_allocation_guards() {
    let mut system = BookingSystem::default();
    assert!(matches!(
        system.run_allocation(5.0),
        Err(BookingError::NoRequests)
    ));

    system.add_group("AB", 10, 5.0).unwrap();
    assert!(matches!(
        system.run_allocation(-1.0),
        Err(BookingError::InvalidFareRate(_))
    ));
    assert!(system.last_outcome().is_none());

    let outcome = system.run_allocation(5.0).unwrap();
    assert_eq!(outcome.booked_ids(), vec![1]);
}

#[cfg(test)]
#[test]
fn test_session_worked_example() {
    let mut system = worked_example_system();

    let outcome = system.run_allocation(5.0).unwrap();
    assert_eq!(outcome.booked_ids(), vec![2]);
    assert_eq!(outcome.waiting_ids(), vec![1, 3]);
    assert_eq!(system.ledger().seats_remaining(), 10);

    let cancellation = system.cancel(2);
    let crate::CancellationOutcome::Cancelled(receipt) = &cancellation else {
        panic!("expected a cancellation, got {:?}", cancellation);
    };
    assert!((receipt.revenue_total - 90.0).abs() < 1e-9);
    assert_eq!(receipt.seats_remaining, 100);

    // The facade re-allocated straight away, group 2 is back on board
    let outcome = system.last_outcome().unwrap();
    assert_eq!(outcome.booked_ids(), vec![2]);
    assert!((system.ledger().revenue_total() - 450.0).abs() < 1e-9);
}

#[cfg(test)]
#[test]
fn test_cancel_without_effect_does_not_reallocate() {
    let mut system = worked_example_system();
    system.run_allocation(5.0).unwrap();
    let before = system.last_outcome().cloned();

    assert!(system.cancel(42).is_error());
    assert_eq!(system.cancel(1), CancellationOutcome::NotBooked(1));
    assert_eq!(system.last_outcome().cloned(), before);
}

#[cfg(test)]
#[test]
fn test_cancellation_frees_seats_for_waiting_groups() {
    let mut system = BookingSystem::default();
    system.add_group("AD", 60, 5.0).unwrap();
    system.add_group("AD", 50, 5.0).unwrap();
    system.run_allocation(5.0).unwrap();
    assert_eq!(system.last_outcome().unwrap().waiting_ids(), vec![2]);

    system.cancel(1);
    // Group 1 is offered its seats again and wins them back on fare
    assert_eq!(system.last_outcome().unwrap().booked_ids(), vec![1]);

    system.remove_request(1).unwrap();
    let outcome = system.run_allocation(5.0).unwrap();
    assert_eq!(outcome.booked_ids(), vec![2]);
    assert_eq!(outcome.seats_remaining(), 50);
}

#[cfg(test)]
#[test]
fn test_insert_request() {
    let mut system = BookingSystem::default();
    let line = system.stations().clone();

    system
        .insert_request(BookingRequest::new(7, Route::new("A", "C"), 4, 5.0, &line))
        .unwrap();
    assert!(matches!(
        system.insert_request(BookingRequest::new(7, Route::new("B", "C"), 4, 5.0, &line)),
        Err(BookingError::DuplicateRequestId(7))
    ));

    // Auto ids continue after the supplied one
    let next = system.add_group("AB", 1, 5.0).unwrap();
    assert_eq!(next.id(), 8);
}

#[cfg(test)]
#[test]
fn test_insert_request_with_last_id() {
    let mut system = BookingSystem::default();
    let line = system.stations().clone();

    assert!(matches!(
        system.insert_request(BookingRequest::new(RequestId::MAX, Route::new("A", "B"), 4, 5.0, &line)),
        Err(BookingError::RequestIdsExhausted)
    ));
    assert!(system.requests().is_empty());

    // The counter was left alone, so auto ids keep working
    let request = system.add_group("AB", 4, 5.0).unwrap();
    assert_eq!(request.id(), 1);

    // Right below the limit is accepted, after which nothing is left to issue
    system
        .insert_request(BookingRequest::new(RequestId::MAX - 1, Route::new("A", "C"), 4, 5.0, &line))
        .unwrap();
    assert!(matches!(
        system.add_group("AB", 4, 5.0),
        Err(BookingError::RequestIdsExhausted)
    ));
    assert_eq!(system.requests().len(), 2);
}

#[cfg(test)]
#[test]
fn test_custom_config() {
    let config = TrainConfig::from_toml_str(
        r#"
        capacity = 30
        cancellation_fee_fraction = 0.5
        stations = ["W", "X", "Y", "Z"]
        "#,
    )
    .unwrap();
    let mut system = BookingSystem::create_with_config(config).unwrap();
    assert!(matches!(
        system.add_group("AB", 1, 5.0),
        Err(BookingError::UnknownStation(_))
    ));

    system.add_group("WZ", 20, 2.0).unwrap();
    system.add_group("WX", 20, 2.0).unwrap();
    let outcome = system.run_allocation(2.0).unwrap();
    assert_eq!(outcome.booked_ids(), vec![1]);
    assert_eq!(outcome.seats_remaining(), 10);

    let CancellationOutcome::Cancelled(receipt) = system.cancel(1) else {
        panic!("expected a cancellation");
    };
    assert!((receipt.fee - 60.0).abs() < 1e-9);
    assert!((receipt.revenue_total - 60.0).abs() < 1e-9);
}

#[cfg(test)]
#[test]
fn test_shared_system() {
    use std::thread;

    let shared = SharedBookingSystem::new(worked_example_system());
    shared.run_allocation(5.0).unwrap();

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let shared = shared.clone();
            thread::spawn(move || {
                shared.cancel(2);
                shared.run_allocation(5.0).unwrap()
            })
        })
        .collect();

    for handle in handles {
        let outcome = handle.join().unwrap();
        // Each pass is atomic, so every observer sees a complete allocation
        assert_eq!(outcome.booked_ids(), vec![2]);
        assert_eq!(outcome.seats_remaining(), 10);
    }

    assert_eq!(shared.ledger().seats_remaining(), 10);
    let count = shared.with_system(|system| system.requests().len());
    assert_eq!(count, 3);
}
