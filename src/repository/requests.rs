//! Component requests repository

use async_trait::async_trait;
use sqlx::{Pool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::RequestsRepository;
use crate::{
    error::{conflict_on_unique, AppResult},
    models::{
        request::{NewRequest, RequestDecision, RequestFilter},
        ComponentRequest, RequestStatus,
    },
};

#[derive(Clone)]
pub struct PgRequestsRepository {
    pool: Pool<Postgres>,
}

impl PgRequestsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl RequestsRepository for PgRequestsRepository {
    async fn create(&self, data: &NewRequest) -> AppResult<ComponentRequest> {
        sqlx::query_as::<_, ComponentRequest>(
            r#"
            INSERT INTO component_requests (
                id, user_id, component_id, notes, requested_days, status, requested_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(data.user_id)
        .bind(data.component_id)
        .bind(&data.notes)
        .bind(data.requested_days)
        .bind(RequestStatus::Pending)
        .bind(data.requested_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "You already have a pending request for this component"))
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<ComponentRequest>> {
        let request =
            sqlx::query_as::<_, ComponentRequest>("SELECT * FROM component_requests WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;
        Ok(request)
    }

    async fn list(&self, filter: &RequestFilter) -> AppResult<Vec<ComponentRequest>> {
        let mut builder =
            QueryBuilder::<Postgres>::new("SELECT * FROM component_requests WHERE TRUE");

        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status);
        }
        if let Some(user_id) = filter.user_id {
            builder.push(" AND user_id = ").push_bind(user_id);
        }
        if let Some(component_id) = filter.component_id {
            builder.push(" AND component_id = ").push_bind(component_id);
        }
        builder.push(" ORDER BY requested_at DESC");

        let rows = builder
            .build_query_as::<ComponentRequest>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn decide(&self, id: Uuid, decision: &RequestDecision) -> AppResult<Option<ComponentRequest>> {
        let request = sqlx::query_as::<_, ComponentRequest>(
            r#"
            UPDATE component_requests
            SET status = $2, responded_at = $3, responded_by = $4, rejection_reason = $5
            WHERE id = $1 AND status = 'pending'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(decision.status)
        .bind(decision.responded_at)
        .bind(decision.responded_by)
        .bind(&decision.rejection_reason)
        .fetch_optional(&self.pool)
        .await?;
        Ok(request)
    }

    async fn reopen(&self, id: Uuid) -> AppResult<bool> {
        let result = sqlx::query(
            r#"
            UPDATE component_requests
            SET status = 'pending', responded_at = NULL, responded_by = NULL, rejection_reason = NULL
            WHERE id = $1 AND status = 'approved'
            "#,
        )
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            conflict_on_unique(e, "You already have a pending request for this component")
        })?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_pending(&self, id: Uuid) -> AppResult<bool> {
        let result =
            sqlx::query("DELETE FROM component_requests WHERE id = $1 AND status = 'pending'")
                .bind(id)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_pending(&self) -> AppResult<i64> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM component_requests WHERE status = 'pending'")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn delete_all(&self) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM component_requests")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
