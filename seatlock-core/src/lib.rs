//! Conflict-free seat allocation on top of a transactional row store.
//!
//! A [`SeatAllocator`] claims one seat per call inside its own transaction,
//! using a locking select that skips rows other transactions already hold.
//! A [`Dispatcher`] fans claims out over many requesters and joins them.

pub mod allocator;
pub mod dispatcher;
pub mod error;
pub mod memory;
pub mod model;
pub mod repository;

pub use allocator::SeatAllocator;
pub use dispatcher::{ClaimOutcome, DispatchReport, Dispatcher};
pub use error::{ClaimError, ClaimResult, StoreError};
pub use memory::{InMemoryDirectory, InMemorySeatStore};
pub use model::{LockStrategy, Requester, Seat, TripId};
pub use repository::{RequesterDirectory, SeatStore, SeatTransaction};
