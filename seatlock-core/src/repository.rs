use async_trait::async_trait;

use crate::error::StoreError;
use crate::model::{LockStrategy, Requester, Seat, TripId};

/// Source of the requesters that need a seat.
#[async_trait]
pub trait RequesterDirectory: Send + Sync {
    /// One-shot listing, ordered by requester id.
    async fn list_requesters(&self) -> Result<Vec<Requester>, StoreError>;
}

/// Transactional access to the seat table.
#[async_trait]
pub trait SeatStore: Send + Sync {
    type Tx: SeatTransaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError>;
}

/// One open transaction against the seat table.
///
/// Dropping a transaction without calling `commit` rolls it back and releases
/// every row lock it holds.
#[async_trait]
pub trait SeatTransaction: Send + Sized + 'static {
    /// Selects and exclusively locks the lowest-id unclaimed seat of `trip_id`.
    async fn lock_next_unclaimed(
        &mut self,
        trip_id: TripId,
        strategy: LockStrategy,
    ) -> Result<Option<Seat>, StoreError>;

    /// Sets the owner of an unclaimed seat. Returns the number of rows changed.
    async fn assign(&mut self, seat_id: i64, user_id: i64) -> Result<u64, StoreError>;

    async fn commit(self) -> Result<(), StoreError>;

    async fn rollback(self) -> Result<(), StoreError>;
}
