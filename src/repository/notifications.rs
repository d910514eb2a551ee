//! Notification log repository

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use super::NotificationLogsRepository;
use crate::{
    error::AppResult,
    models::{notification::NewNotificationLog, NotificationLog, NotificationStatus},
};

#[derive(Clone)]
pub struct PgNotificationLogsRepository {
    pool: Pool<Postgres>,
}

impl PgNotificationLogsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl NotificationLogsRepository for PgNotificationLogsRepository {
    async fn create(&self, data: &NewNotificationLog) -> AppResult<NotificationLog> {
        let log = sqlx::query_as::<_, NotificationLog>(
            r#"
            INSERT INTO notification_logs (
                id, user_id, component_id, type, channel, status, attempts,
                error_message, payload, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, 0, '', $7, $8)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(data.user_id)
        .bind(data.component_id)
        .bind(data.notification_type)
        .bind(data.channel)
        .bind(NotificationStatus::Pending)
        .bind(&data.payload)
        .bind(data.created_at)
        .fetch_one(&self.pool)
        .await?;
        Ok(log)
    }

    async fn mark_sent(&self, id: Uuid, sent_at: DateTime<Utc>, attempts: i32) -> AppResult<()> {
        sqlx::query(
            "UPDATE notification_logs SET status = 'sent', sent_at = $2, attempts = $3 WHERE id = $1",
        )
        .bind(id)
        .bind(sent_at)
        .bind(attempts)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, attempts: i32, error: &str) -> AppResult<()> {
        sqlx::query(
            r#"
            UPDATE notification_logs
            SET status = 'failed', attempts = $2, error_message = $3
            WHERE id = $1
            "#,
        )
        .bind(id)
        .bind(attempts)
        .bind(error)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn list_retryable(&self, max_attempts: i32, limit: i64) -> AppResult<Vec<NotificationLog>> {
        let rows = sqlx::query_as::<_, NotificationLog>(
            r#"
            SELECT * FROM notification_logs
            WHERE status = 'failed' AND attempts < $1
            ORDER BY created_at
            LIMIT $2
            "#,
        )
        .bind(max_attempts)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }

    async fn by_user(&self, user_id: Uuid) -> AppResult<Vec<NotificationLog>> {
        let rows = sqlx::query_as::<_, NotificationLog>(
            "SELECT * FROM notification_logs WHERE user_id = $1 ORDER BY created_at DESC",
        )
        .bind(user_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows)
    }
}
