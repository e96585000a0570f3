//! In-process seat store with PostgreSQL row-lock semantics.
//!
//! Rows are locked exclusively by the transaction that selects them and stay
//! locked until that transaction commits, rolls back or is dropped. Writes are
//! buffered in the transaction and become visible only at commit.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;

use crate::error::StoreError;
use crate::model::{LockStrategy, Requester, Seat, TripId};
use crate::repository::{RequesterDirectory, SeatStore, SeatTransaction};

#[derive(Default)]
struct State {
    seats: BTreeMap<i64, Seat>,
    // seat id -> id of the transaction holding its row lock
    locks: HashMap<i64, u64>,
    fail_commits: HashSet<i64>,
    next_seat_id: i64,
    next_tx_id: u64,
}

#[derive(Default)]
struct Shared {
    state: Mutex<State>,
    released: Notify,
    unavailable: AtomicBool,
}

impl Shared {
    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Seat table kept in memory. Clones share the same table.
#[derive(Clone, Default)]
pub struct InMemorySeatStore {
    shared: Arc<Shared>,
    latency: Duration,
}

impl InMemorySeatStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay applied to every storage round trip (begin, select, update, commit).
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Inserts unclaimed seats for `trip_id` and returns their ids.
    pub fn provision<I, N>(&self, trip_id: TripId, names: I) -> Vec<i64>
    where
        I: IntoIterator<Item = N>,
        N: Into<String>,
    {
        let mut state = self.shared.state();
        names
            .into_iter()
            .map(|name| {
                state.next_seat_id += 1;
                let id = state.next_seat_id;
                state.seats.insert(
                    id,
                    Seat { id, name: name.into(), trip_id, user_id: None },
                );
                id
            })
            .collect()
    }

    /// Makes `begin` fail as if the database could not be reached.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.shared.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Aborts at commit time any transaction that assigns a seat to `user_id`.
    pub fn fail_commit_for(&self, user_id: i64) {
        self.shared.state().fail_commits.insert(user_id);
    }

    pub fn seat(&self, seat_id: i64) -> Option<Seat> {
        self.shared.state().seats.get(&seat_id).cloned()
    }

    pub fn seats(&self, trip_id: TripId) -> Vec<Seat> {
        self.shared
            .state()
            .seats
            .values()
            .filter(|s| s.trip_id == trip_id)
            .cloned()
            .collect()
    }

    pub fn unclaimed(&self, trip_id: TripId) -> usize {
        self.seats(trip_id).iter().filter(|s| !s.is_claimed()).count()
    }

    /// Number of row locks currently held by open transactions.
    pub fn locked_count(&self) -> usize {
        self.shared.state().locks.len()
    }
}

#[async_trait]
impl SeatStore for InMemorySeatStore {
    type Tx = InMemoryTransaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        if self.shared.unavailable.load(Ordering::SeqCst) {
            return Err("storage unavailable".into());
        }
        pause(self.latency).await;

        let id = {
            let mut state = self.shared.state();
            state.next_tx_id += 1;
            state.next_tx_id
        };

        Ok(InMemoryTransaction {
            shared: self.shared.clone(),
            id,
            latency: self.latency,
            writes: Vec::new(),
            finished: false,
        })
    }
}

pub struct InMemoryTransaction {
    shared: Arc<Shared>,
    id: u64,
    latency: Duration,
    // (seat id, user id) applied at commit
    writes: Vec<(i64, i64)>,
    finished: bool,
}

impl InMemoryTransaction {
    fn has_written(&self, seat_id: i64) -> bool {
        self.writes.iter().any(|(id, _)| *id == seat_id)
    }

    /// Selects the next candidate under `strategy`. `None` means the caller
    /// must wait for another transaction to release its lock.
    fn try_lock_next(&self, trip_id: TripId, strategy: LockStrategy) -> Option<Option<Seat>> {
        let mut state = self.shared.state();

        let next = state
            .seats
            .values()
            .filter(|s| s.trip_id == trip_id && s.user_id.is_none() && !self.has_written(s.id))
            .find(|s| match strategy {
                LockStrategy::SkipLocked => state.locks.get(&s.id).map_or(true, |h| *h == self.id),
                LockStrategy::Exclusive => true,
            })
            .cloned();

        let Some(seat) = next else {
            return Some(None);
        };
        if state.locks.get(&seat.id).is_some_and(|h| *h != self.id) {
            return None;
        }
        state.locks.insert(seat.id, self.id);
        Some(Some(seat))
    }

    fn release(&mut self) {
        self.finished = true;
        self.shared.state().locks.retain(|_, holder| *holder != self.id);
        self.shared.released.notify_waiters();
    }
}

#[async_trait]
impl SeatTransaction for InMemoryTransaction {
    async fn lock_next_unclaimed(
        &mut self,
        trip_id: TripId,
        strategy: LockStrategy,
    ) -> Result<Option<Seat>, StoreError> {
        pause(self.latency).await;

        loop {
            // Registered before inspecting state so a release in between is not missed.
            let notified = self.shared.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(found) = self.try_lock_next(trip_id, strategy) {
                return Ok(found);
            }
            notified.await;
        }
    }

    async fn assign(&mut self, seat_id: i64, user_id: i64) -> Result<u64, StoreError> {
        pause(self.latency).await;

        let mut state = self.shared.state();
        if state.locks.get(&seat_id).is_some_and(|h| *h != self.id) {
            return Err(format!("seat {} is locked by another transaction", seat_id).into());
        }
        state.locks.insert(seat_id, self.id);

        let unclaimed = state.seats.get(&seat_id).is_some_and(|s| s.user_id.is_none());
        drop(state);

        if !unclaimed || self.has_written(seat_id) {
            return Ok(0);
        }
        self.writes.push((seat_id, user_id));
        Ok(1)
    }

    async fn commit(mut self) -> Result<(), StoreError> {
        pause(self.latency).await;

        let aborted = {
            let mut state = self.shared.state();
            let aborted = self.writes.iter().any(|(_, user)| state.fail_commits.contains(user));
            if !aborted {
                for (seat_id, user_id) in &self.writes {
                    if let Some(seat) = state.seats.get_mut(seat_id) {
                        seat.user_id.get_or_insert(*user_id);
                    }
                }
            }
            aborted
        };
        self.release();

        if aborted {
            return Err("transaction aborted at commit".into());
        }
        Ok(())
    }

    async fn rollback(mut self) -> Result<(), StoreError> {
        self.release();
        Ok(())
    }
}

impl Drop for InMemoryTransaction {
    fn drop(&mut self) {
        if !self.finished {
            self.release();
        }
    }
}

async fn pause(latency: Duration) {
    if !latency.is_zero() {
        tokio::time::sleep(latency).await;
    }
}

/// Fixed list of requesters.
#[derive(Debug, Clone, Default)]
pub struct InMemoryDirectory {
    requesters: Vec<Requester>,
}

impl InMemoryDirectory {
    pub fn new(requesters: Vec<Requester>) -> Self {
        Self { requesters }
    }
}

#[async_trait]
impl RequesterDirectory for InMemoryDirectory {
    async fn list_requesters(&self) -> Result<Vec<Requester>, StoreError> {
        let mut requesters = self.requesters.clone();
        requesters.sort_by_key(|r| r.id);
        Ok(requesters)
    }
}
