use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

use crate::allocator::SeatAllocator;
use crate::error::ClaimError;
use crate::model::{Requester, Seat};
use crate::repository::SeatStore;

/// Result of one requester's claim attempt.
#[derive(Debug)]
pub struct ClaimOutcome {
    pub requester: Requester,
    pub result: Result<Seat, ClaimError>,
}

/// Everything a dispatch run produced, in completion order.
#[derive(Debug)]
pub struct DispatchReport {
    pub outcomes: Vec<ClaimOutcome>,
    pub elapsed: Duration,
}

impl DispatchReport {
    /// Successful (requester, seat) pairs.
    pub fn claimed(&self) -> impl Iterator<Item = (&Requester, &Seat)> {
        self.outcomes
            .iter()
            .filter_map(|o| o.result.as_ref().ok().map(|seat| (&o.requester, seat)))
    }

    /// Requesters turned away because the trip had no unclaimed seat.
    pub fn unavailable(&self) -> impl Iterator<Item = &Requester> {
        self.outcomes
            .iter()
            .filter(|o| matches!(&o.result, Err(e) if e.is_not_available()))
            .map(|o| &o.requester)
    }

    /// Claims that failed with a storage fault.
    pub fn failed(&self) -> impl Iterator<Item = (&Requester, &ClaimError)> {
        self.outcomes.iter().filter_map(|o| match &o.result {
            Err(e) if !e.is_not_available() => Some((&o.requester, e)),
            _ => None,
        })
    }
}

/// Runs one claim per requester concurrently and waits for all of them.
pub struct Dispatcher<S> {
    allocator: Arc<SeatAllocator<S>>,
    max_in_flight: Option<usize>,
}

impl<S> Dispatcher<S>
where
    S: SeatStore + 'static,
{
    pub fn new(allocator: Arc<SeatAllocator<S>>) -> Self {
        Self { allocator, max_in_flight: None }
    }

    /// Caps the number of claims in flight. `None` starts every claim at once.
    pub fn with_max_in_flight(mut self, max_in_flight: Option<usize>) -> Self {
        self.max_in_flight = max_in_flight.filter(|n| *n > 0);
        self
    }

    pub async fn run(&self, requesters: Vec<Requester>) -> DispatchReport {
        let started = Instant::now();
        let permits = self.max_in_flight.map(|n| Arc::new(Semaphore::new(n)));
        let total = requesters.len();

        info!(
            requesters = total,
            trip_id = self.allocator.trip_id(),
            max_in_flight = ?self.max_in_flight,
            "Dispatching seat claims"
        );

        let mut tasks = JoinSet::new();
        // Lets an outcome be built for a task that never returned one.
        let mut pending = HashMap::with_capacity(total);
        for requester in requesters {
            let allocator = self.allocator.clone();
            let permits = permits.clone();
            let task_requester = requester.clone();
            let handle = tasks.spawn(async move {
                let requester = task_requester;
                // Held for the whole claim; the semaphore is never closed.
                let _permit = match permits {
                    Some(sem) => sem.acquire_owned().await.ok(),
                    None => None,
                };
                let result = allocator.claim(&requester).await;
                ClaimOutcome { requester, result }
            });
            pending.insert(handle.id(), requester);
        }

        let mut outcomes = Vec::with_capacity(total);
        while let Some(joined) = tasks.join_next_with_id().await {
            let outcome = match joined {
                Ok((id, outcome)) => {
                    pending.remove(&id);
                    outcome
                }
                Err(e) => match pending.remove(&e.id()) {
                    Some(requester) => ClaimOutcome {
                        requester,
                        result: Err(ClaimError::Interrupted { reason: e.to_string() }),
                    },
                    None => {
                        error!("Claim task for unknown requester did not complete: {}", e);
                        continue;
                    }
                },
            };
            log_outcome(&outcome);
            outcomes.push(outcome);
        }

        let elapsed = started.elapsed();
        info!(
            completed = outcomes.len(),
            elapsed_ms = elapsed.as_millis() as u64,
            "All seat claims finished"
        );

        DispatchReport { outcomes, elapsed }
    }
}

fn log_outcome(outcome: &ClaimOutcome) {
    let requester = &outcome.requester;
    match &outcome.result {
        Ok(seat) => info!(
            requester_id = requester.id,
            seat_id = seat.id,
            "Seat {} assigned to {}",
            seat.name,
            requester.name
        ),
        Err(e) if e.is_not_available() => {
            warn!(requester_id = requester.id, "No seat for {}: {}", requester.name, e)
        }
        Err(e) => error!(requester_id = requester.id, "Claim failed for {}: {}", requester.name, e),
    }
}
