use async_trait::async_trait;
use seatlock_core::{Requester, RequesterDirectory, StoreError};
use sqlx::PgPool;

#[derive(sqlx::FromRow)]
struct RequesterRow {
    id: i64,
    name: String,
}

pub struct PgRequesterDirectory {
    pool: PgPool,
}

impl PgRequesterDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RequesterDirectory for PgRequesterDirectory {
    async fn list_requesters(&self) -> Result<Vec<Requester>, StoreError> {
        let rows = sqlx::query_as::<_, RequesterRow>("SELECT id, name FROM users ORDER BY id")
            .fetch_all(&self.pool)
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| Requester { id: row.id, name: row.name })
            .collect())
    }
}
