use crate::model::TripId;

/// Boxed error returned by storage implementations.
pub type StoreError = Box<dyn std::error::Error + Send + Sync>;

/// Why a single claim attempt did not produce a seat.
///
/// Only `NotAvailable` is an expected outcome; every other variant is a fault
/// local to the one requester whose claim failed.
#[derive(Debug, thiserror::Error)]
pub enum ClaimError {
    #[error("No unclaimed seat available on trip {trip_id}")]
    NotAvailable { trip_id: TripId },

    #[error("Failed to begin claim transaction: {0}")]
    Begin(#[source] StoreError),

    #[error("Seat selection failed: {0}")]
    Select(#[source] StoreError),

    #[error("Failed to assign seat {seat_id}: {source}")]
    Update {
        seat_id: i64,
        #[source]
        source: StoreError,
    },

    #[error("Seat {seat_id} was no longer unclaimed at update time")]
    SeatLost { seat_id: i64 },

    #[error("Failed to commit claim of seat {seat_id}: {source}")]
    Commit {
        seat_id: i64,
        #[source]
        source: StoreError,
    },

    /// The claim task panicked or was cancelled before producing a result.
    #[error("Claim task did not complete: {reason}")]
    Interrupted { reason: String },
}

impl ClaimError {
    pub fn is_not_available(&self) -> bool {
        matches!(self, ClaimError::NotAvailable { .. })
    }
}

pub type ClaimResult<T> = Result<T, ClaimError>;
