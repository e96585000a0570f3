use tracing::{debug, info_span, warn, Instrument};

use crate::error::{ClaimError, ClaimResult};
use crate::model::{LockStrategy, Requester, Seat, TripId};
use crate::repository::{SeatStore, SeatTransaction};

/// Claims seats of a single trip, one transaction per call.
///
/// Holds no seat state of its own: every claim re-reads the live table inside
/// its own transaction, and mutual exclusion comes entirely from the row lock
/// taken by the selection.
pub struct SeatAllocator<S> {
    store: S,
    trip_id: TripId,
    strategy: LockStrategy,
}

impl<S: SeatStore> SeatAllocator<S> {
    pub fn new(store: S, trip_id: TripId) -> Self {
        Self {
            store,
            trip_id,
            strategy: LockStrategy::default(),
        }
    }

    pub fn with_strategy(mut self, strategy: LockStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn trip_id(&self) -> TripId {
        self.trip_id
    }

    pub fn strategy(&self) -> LockStrategy {
        self.strategy
    }

    /// Claims one unclaimed seat for `requester`.
    ///
    /// On success the seat is durably owned by the requester. On any error no
    /// row has changed.
    pub async fn claim(&self, requester: &Requester) -> ClaimResult<Seat> {
        let span = info_span!(
            "claim",
            requester_id = requester.id,
            trip_id = self.trip_id,
            strategy = %self.strategy
        );
        self.claim_in_transaction(requester).instrument(span).await
    }

    async fn claim_in_transaction(&self, requester: &Requester) -> ClaimResult<Seat> {
        let mut tx = self.store.begin().await.map_err(ClaimError::Begin)?;

        let selected = match tx.lock_next_unclaimed(self.trip_id, self.strategy).await {
            Ok(selected) => selected,
            Err(e) => {
                abandon(tx).await;
                return Err(ClaimError::Select(e));
            }
        };

        let Some(mut seat) = selected else {
            abandon(tx).await;
            return Err(ClaimError::NotAvailable { trip_id: self.trip_id });
        };
        debug!(seat_id = seat.id, seat = %seat.name, "Locked candidate seat");

        match tx.assign(seat.id, requester.id).await {
            Ok(1) => {}
            Ok(_) => {
                abandon(tx).await;
                return Err(ClaimError::SeatLost { seat_id: seat.id });
            }
            Err(source) => {
                abandon(tx).await;
                return Err(ClaimError::Update { seat_id: seat.id, source });
            }
        }

        tx.commit()
            .await
            .map_err(|source| ClaimError::Commit { seat_id: seat.id, source })?;

        seat.user_id = Some(requester.id);
        Ok(seat)
    }
}

/// Rolls back a transaction that must not commit. A failed rollback still
/// releases the locks once the connection drops the transaction.
async fn abandon<T: SeatTransaction>(tx: T) {
    if let Err(e) = tx.rollback().await {
        warn!("Rollback failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::StoreError;
    use crate::memory::InMemorySeatStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Where a scripted claim transaction goes wrong.
    #[derive(Clone, Copy)]
    enum Fault {
        Select,
        Assign,
        NothingAssigned,
    }

    #[derive(Default)]
    struct Calls {
        commits: AtomicUsize,
        rollbacks: AtomicUsize,
    }

    struct ScriptedStore {
        fault: Fault,
        calls: Arc<Calls>,
    }

    struct ScriptedTx {
        fault: Fault,
        calls: Arc<Calls>,
    }

    #[async_trait]
    impl SeatStore for ScriptedStore {
        type Tx = ScriptedTx;

        async fn begin(&self) -> Result<Self::Tx, StoreError> {
            Ok(ScriptedTx { fault: self.fault, calls: self.calls.clone() })
        }
    }

    #[async_trait]
    impl SeatTransaction for ScriptedTx {
        async fn lock_next_unclaimed(
            &mut self,
            trip_id: TripId,
            _strategy: LockStrategy,
        ) -> Result<Option<Seat>, StoreError> {
            match self.fault {
                Fault::Select => Err("select failed".into()),
                _ => Ok(Some(Seat { id: 1, name: "1A".to_string(), trip_id, user_id: None })),
            }
        }

        async fn assign(&mut self, _seat_id: i64, _user_id: i64) -> Result<u64, StoreError> {
            match self.fault {
                Fault::Assign => Err("update failed".into()),
                _ => Ok(0),
            }
        }

        async fn commit(self) -> Result<(), StoreError> {
            self.calls.commits.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn rollback(self) -> Result<(), StoreError> {
            self.calls.rollbacks.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    async fn claim_with_fault(fault: Fault) -> (ClaimError, Arc<Calls>) {
        let calls = Arc::new(Calls::default());
        let allocator = SeatAllocator::new(ScriptedStore { fault, calls: calls.clone() }, 1);
        let err = allocator.claim(&requester(1)).await.unwrap_err();
        (err, calls)
    }

    fn requester(id: i64) -> Requester {
        Requester::new(id, format!("user-{}", id))
    }

    #[tokio::test]
    async fn test_claims_lowest_unclaimed_seat() {
        let store = InMemorySeatStore::new();
        store.provision(1, ["1A", "1B"]);
        let allocator = SeatAllocator::new(store.clone(), 1);

        let seat = allocator.claim(&requester(10)).await.unwrap();
        assert_eq!(seat.name, "1A");
        assert_eq!(seat.user_id, Some(10));
        assert_eq!(store.seat(seat.id).unwrap().user_id, Some(10));

        let seat = allocator.claim(&requester(11)).await.unwrap();
        assert_eq!(seat.name, "1B");
    }

    #[tokio::test]
    async fn test_not_available_when_trip_is_full() {
        let store = InMemorySeatStore::new();
        store.provision(1, ["1A"]);
        let allocator = SeatAllocator::new(store.clone(), 1);

        allocator.claim(&requester(1)).await.unwrap();
        let err = allocator.claim(&requester(2)).await.unwrap_err();
        assert!(err.is_not_available());
        assert!(matches!(err, ClaimError::NotAvailable { trip_id: 1 }));
        assert_eq!(store.locked_count(), 0);
    }

    #[tokio::test]
    async fn test_trips_are_independent_pools() {
        let store = InMemorySeatStore::new();
        store.provision(1, ["1A"]);
        store.provision(2, ["1A", "1B"]);
        let allocator = SeatAllocator::new(store.clone(), 2);

        allocator.claim(&requester(1)).await.unwrap();
        allocator.claim(&requester(2)).await.unwrap();
        assert!(allocator.claim(&requester(3)).await.unwrap_err().is_not_available());

        // Trip 1 untouched
        assert_eq!(store.unclaimed(1), 1);
    }

    #[tokio::test]
    async fn test_claimed_seat_is_never_selected_again() {
        let store = InMemorySeatStore::new();
        store.provision(1, ["1A", "1B", "1C"]);
        let allocator = SeatAllocator::new(store.clone(), 1);

        let first = allocator.claim(&requester(1)).await.unwrap();
        for id in 2..=3 {
            let seat = allocator.claim(&requester(id)).await.unwrap();
            assert_ne!(seat.id, first.id);
        }
        assert_eq!(store.seat(first.id).unwrap().user_id, Some(1));
    }

    #[tokio::test]
    async fn test_begin_failure_is_surfaced() {
        let store = InMemorySeatStore::new();
        store.provision(1, ["1A"]);
        store.set_unavailable(true);
        let allocator = SeatAllocator::new(store.clone(), 1);

        let err = allocator.claim(&requester(1)).await.unwrap_err();
        assert!(matches!(err, ClaimError::Begin(_)));
        assert!(!err.is_not_available());
        assert_eq!(store.unclaimed(1), 1);
    }

    #[tokio::test]
    async fn test_commit_failure_leaves_seat_unclaimed() {
        let store = InMemorySeatStore::new();
        store.provision(1, ["1A"]);
        store.fail_commit_for(5);
        let allocator = SeatAllocator::new(store.clone(), 1);

        let err = allocator.claim(&requester(5)).await.unwrap_err();
        assert!(matches!(err, ClaimError::Commit { .. }));
        assert_eq!(store.unclaimed(1), 1);
        assert_eq!(store.locked_count(), 0);

        // The seat is free for the next claimant.
        let seat = allocator.claim(&requester(6)).await.unwrap();
        assert_eq!(seat.user_id, Some(6));
    }

    #[tokio::test]
    async fn test_select_failure_rolls_back() {
        let (err, calls) = claim_with_fault(Fault::Select).await;
        assert!(matches!(err, ClaimError::Select(_)));
        assert_eq!(calls.commits.load(Ordering::SeqCst), 0);
        assert_eq!(calls.rollbacks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_update_failure_is_never_committed() {
        let (err, calls) = claim_with_fault(Fault::Assign).await;
        assert!(matches!(err, ClaimError::Update { seat_id: 1, .. }));
        assert!(err.to_string().contains("update failed"));
        assert_eq!(calls.commits.load(Ordering::SeqCst), 0);
        assert_eq!(calls.rollbacks.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_update_matching_no_row_is_seat_lost() {
        let (err, calls) = claim_with_fault(Fault::NothingAssigned).await;
        assert!(matches!(err, ClaimError::SeatLost { seat_id: 1 }));
        assert_eq!(calls.commits.load(Ordering::SeqCst), 0);
        assert_eq!(calls.rollbacks.load(Ordering::SeqCst), 1);
    }
}
