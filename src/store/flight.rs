//! Per-key single-flight locking.
//!
//! Two renders that miss on the same derivative at the same time must not both
//! resample it. The first caller to [`SingleFlight::acquire`] a key becomes its
//! leader; later callers block until the leader's guard drops.
//!
//! If the leader succeeded, waiters retry and normally find the derivative it
//! just stored. If it failed inside [`FlightGuard::run`], every waiter gets
//! the same error back instead of repeating the work. Callers arriving after
//! the flight has ended start a fresh attempt.

use super::StoreError;
use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, PoisonError};

#[derive(Default)]
struct State {
    done: bool,
    failure: Option<StoreError>,
}

#[derive(Default)]
struct Flight {
    state: Mutex<State>,
    finished: Condvar,
}

impl Flight {
    /// Block until the leader is done. `Err` is the leader's own failure.
    fn wait(&self) -> Result<(), StoreError> {
        let mut state = self.state.lock().map_err(|_| poisoned())?;
        while !state.done {
            state = self.finished.wait(state).map_err(|_| poisoned())?;
        }
        match &state.failure {
            Some(failure) => Err(failure.clone()),
            None => Ok(()),
        }
    }
}

fn poisoned() -> StoreError {
    StoreError::Storage("single-flight lock poisoned".into())
}

#[derive(Default)]
pub struct SingleFlight {
    flights: Mutex<HashMap<String, Arc<Flight>>>,
}

/// Held by the leader of a key. Dropping it wakes every waiter.
pub struct FlightGuard<'a> {
    owner: &'a SingleFlight,
    key: String,
    flight: Arc<Flight>,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Become the leader for `key`, waiting out any current leader first.
    /// Fails with the current leader's error if it fails.
    pub fn acquire(&self, key: &str) -> Result<FlightGuard<'_>, StoreError> {
        loop {
            let current = {
                let mut flights = self.flights.lock().map_err(|_| poisoned())?;
                match flights.get(key) {
                    Some(flight) => Arc::clone(flight),
                    None => {
                        let flight = Arc::new(Flight::default());
                        flights.insert(key.to_string(), Arc::clone(&flight));
                        return Ok(FlightGuard {
                            owner: self,
                            key: key.to_string(),
                            flight,
                        });
                    }
                }
            };
            current.wait()?;
        }
    }

    /// Number of keys with a leader right now.
    pub fn in_flight(&self) -> usize {
        self.flights
            .lock()
            .map(|f| f.len())
            .unwrap_or_else(|p| p.into_inner().len())
    }
}

impl FlightGuard<'_> {
    /// Run the leader's work, then release the key. A failure is handed to
    /// everyone waiting on this flight.
    pub fn run<T>(self, work: impl FnOnce() -> Result<T, StoreError>) -> Result<T, StoreError> {
        let result = work();
        if let Err(e) = &result {
            self.flight
                .state
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .failure = Some(e.clone());
        }
        result
    }
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.owner
            .flights
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
        self.flight
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .done = true;
        self.flight.finished.notify_all();
    }
}
