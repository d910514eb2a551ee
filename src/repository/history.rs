//! Checkout history repository

use async_trait::async_trait;
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use super::HistoryRepository;
use crate::{
    error::AppResult,
    models::{history::NewHistory, CheckoutHistory},
};

#[derive(Clone)]
pub struct PgHistoryRepository {
    pool: Pool<Postgres>,
}

impl PgHistoryRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl HistoryRepository for PgHistoryRepository {
    async fn append(&self, entry: &NewHistory) -> AppResult<CheckoutHistory> {
        let record = sqlx::query_as::<_, CheckoutHistory>(
            r#"
            INSERT INTO checkout_history (id, component_id, user_id, action, notes, timestamp)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(entry.component_id)
        .bind(entry.user_id)
        .bind(entry.action)
        .bind(&entry.notes)
        .bind(entry.timestamp)
        .fetch_one(&self.pool)
        .await?;
        Ok(record)
    }

    async fn by_component(&self, component_id: Uuid) -> AppResult<Vec<CheckoutHistory>> {
        let rows = sqlx::query_as::<_, CheckoutHistory>(
            "SELECT * FROM checkout_history WHERE component_id = $1 ORDER BY timestamp DESC",
        )
        .bind(component_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn by_user(&self, user_id: Uuid) -> AppResult<Vec<CheckoutHistory>> {
        let rows = sqlx::query_as::<_, CheckoutHistory>(
            "SELECT * FROM checkout_history WHERE user_id = $1 ORDER BY timestamp DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn recent(&self, limit: i64) -> AppResult<Vec<CheckoutHistory>> {
        let rows = sqlx::query_as::<_, CheckoutHistory>(
            "SELECT * FROM checkout_history ORDER BY timestamp DESC LIMIT $1",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn top_borrowers(&self, limit: i64) -> AppResult<Vec<(Uuid, i64)>> {
        let rows = sqlx::query_as::<_, (Uuid, i64)>(
            r#"
            SELECT user_id, COUNT(*) AS checkouts
            FROM checkout_history
            WHERE action = 'checkout'
            GROUP BY user_id
            ORDER BY checkouts DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn delete_all(&self) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM checkout_history")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
