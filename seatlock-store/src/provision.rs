//! Out-of-band provisioning of users and seats.
//!
//! Only ever inserts rows; existing seats, claimed or not, are left alone.

use seatlock_core::{Requester, TripId};
use sqlx::PgPool;
use tracing::info;

const SEATS_PER_ROW: usize = 6;

/// Cabin label of the `index`-th seat (0-based): `1A`..`1F`, `2A`, ...
pub fn seat_label(index: usize) -> String {
    let row = index / SEATS_PER_ROW + 1;
    let letter = (b'A' + (index % SEATS_PER_ROW) as u8) as char;
    format!("{}{}", row, letter)
}

pub struct Provisioner {
    pool: PgPool,
}

impl Provisioner {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn provision_requesters(&self, names: &[String]) -> Result<Vec<Requester>, sqlx::Error> {
        let rows: Vec<(i64, String)> = sqlx::query_as(
            r#"
            INSERT INTO users (name)
            SELECT name FROM UNNEST($1::text[]) WITH ORDINALITY AS t(name, ord)
            ORDER BY ord
            RETURNING id, name
            "#,
        )
        .bind(names)
        .fetch_all(&self.pool)
        .await?;

        info!(count = rows.len(), "Provisioned requesters");
        Ok(rows
            .into_iter()
            .map(|(id, name)| Requester { id, name })
            .collect())
    }

    /// Appends `count` unclaimed seats to `trip_id`, labelled after the
    /// seats the trip already has.
    pub async fn provision_seats(&self, trip_id: TripId, count: usize) -> Result<u64, sqlx::Error> {
        let mut tx = self.pool.begin().await?;

        let (existing,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM seats WHERE trip_id = $1")
            .bind(trip_id)
            .fetch_one(&mut *tx)
            .await?;

        let start = existing as usize;
        let labels: Vec<String> = (start..start + count).map(seat_label).collect();

        let inserted = sqlx::query(
            r#"
            INSERT INTO seats (name, trip_id)
            SELECT name, $1 FROM UNNEST($2::text[]) WITH ORDINALITY AS t(name, ord)
            ORDER BY ord
            "#,
        )
        .bind(trip_id)
        .bind(&labels)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        tx.commit().await?;

        info!(trip_id, count = inserted, "Provisioned seats");
        Ok(inserted)
    }
}
