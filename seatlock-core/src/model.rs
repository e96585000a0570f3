use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of the trip a seat belongs to. Each trip is its own allocation pool.
pub type TripId = i64;

/// Someone who needs a seat. Read once from the directory, never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Requester {
    pub id: i64,
    pub name: String,
}

impl Requester {
    pub fn new(id: i64, name: impl Into<String>) -> Self {
        Self { id, name: name.into() }
    }
}

/// A seat row as stored. `user_id` is `None` until the seat is claimed and
/// never changes afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Seat {
    pub id: i64,
    pub name: String,
    pub trip_id: TripId,
    pub user_id: Option<i64>,
}

impl Seat {
    pub fn is_claimed(&self) -> bool {
        self.user_id.is_some()
    }
}

/// How the claim transaction locks its candidate row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockStrategy {
    /// `FOR UPDATE SKIP LOCKED`: concurrent claimants land on different rows.
    #[default]
    SkipLocked,
    /// `FOR UPDATE`: claimants queue on the first unclaimed row.
    Exclusive,
}

impl fmt::Display for LockStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LockStrategy::SkipLocked => write!(f, "skip_locked"),
            LockStrategy::Exclusive => write!(f, "exclusive"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_strategy_from_config_value() {
        let strategy: LockStrategy = serde_json::from_str("\"exclusive\"").unwrap();
        assert_eq!(strategy, LockStrategy::Exclusive);
        assert_eq!(LockStrategy::default(), LockStrategy::SkipLocked);
        assert_eq!(LockStrategy::Exclusive.to_string(), "exclusive");
    }

    #[test]
    fn test_seat_claimed_state() {
        let mut seat = Seat { id: 1, name: "1A".to_string(), trip_id: 1, user_id: None };
        assert!(!seat.is_claimed());
        seat.user_id = Some(7);
        assert!(seat.is_claimed());
    }
}
