use async_trait::async_trait;
use seatlock_core::{LockStrategy, Seat, SeatStore, SeatTransaction, StoreError, TripId};
use sqlx::{PgPool, Postgres, Transaction};

// The row lock taken here is what keeps two claimants off the same seat.
const SELECT_NEXT_SKIP_LOCKED: &str = r#"
    SELECT id, name, trip_id, user_id
    FROM seats
    WHERE trip_id = $1 AND user_id IS NULL
    ORDER BY id
    LIMIT 1
    FOR UPDATE SKIP LOCKED
"#;

const SELECT_NEXT_EXCLUSIVE: &str = r#"
    SELECT id, name, trip_id, user_id
    FROM seats
    WHERE trip_id = $1 AND user_id IS NULL
    ORDER BY id
    LIMIT 1
    FOR UPDATE
"#;

const ASSIGN_SEAT: &str = "UPDATE seats SET user_id = $1 WHERE id = $2 AND user_id IS NULL";

#[derive(sqlx::FromRow)]
struct SeatRow {
    id: i64,
    name: String,
    trip_id: i64,
    user_id: Option<i64>,
}

impl From<SeatRow> for Seat {
    fn from(row: SeatRow) -> Self {
        Seat {
            id: row.id,
            name: row.name,
            trip_id: row.trip_id,
            user_id: row.user_id,
        }
    }
}

/// Seat counts of one trip.
#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::FromRow)]
pub struct Availability {
    pub total: i64,
    pub unclaimed: i64,
}

#[derive(Clone)]
pub struct PgSeatStore {
    pool: PgPool,
}

impl PgSeatStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn availability(&self, trip_id: TripId) -> Result<Availability, sqlx::Error> {
        sqlx::query_as::<_, Availability>(
            r#"
            SELECT COUNT(*) AS total, COUNT(*) FILTER (WHERE user_id IS NULL) AS unclaimed
            FROM seats
            WHERE trip_id = $1
            "#,
        )
        .bind(trip_id)
        .fetch_one(&self.pool)
        .await
    }

    /// Every seat of a trip, claimed or not, ordered by id.
    pub async fn seats(&self, trip_id: TripId) -> Result<Vec<Seat>, sqlx::Error> {
        let rows = sqlx::query_as::<_, SeatRow>(
            "SELECT id, name, trip_id, user_id FROM seats WHERE trip_id = $1 ORDER BY id",
        )
        .bind(trip_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Seat::from).collect())
    }
}

#[async_trait]
impl SeatStore for PgSeatStore {
    type Tx = PgSeatTransaction;

    async fn begin(&self) -> Result<Self::Tx, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(PgSeatTransaction { tx })
    }
}

/// Claim transaction on a pooled connection. Dropping it rolls back.
pub struct PgSeatTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl SeatTransaction for PgSeatTransaction {
    async fn lock_next_unclaimed(
        &mut self,
        trip_id: TripId,
        strategy: LockStrategy,
    ) -> Result<Option<Seat>, StoreError> {
        let query = match strategy {
            LockStrategy::SkipLocked => SELECT_NEXT_SKIP_LOCKED,
            LockStrategy::Exclusive => SELECT_NEXT_EXCLUSIVE,
        };

        let row = sqlx::query_as::<_, SeatRow>(query)
            .bind(trip_id)
            .fetch_optional(&mut *self.tx)
            .await?;

        Ok(row.map(Seat::from))
    }

    async fn assign(&mut self, seat_id: i64, user_id: i64) -> Result<u64, StoreError> {
        let result = sqlx::query(ASSIGN_SEAT)
            .bind(user_id)
            .bind(seat_id)
            .execute(&mut *self.tx)
            .await?;

        Ok(result.rows_affected())
    }

    async fn commit(self) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}
