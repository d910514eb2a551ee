//! Components repository for database operations

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres, QueryBuilder};
use uuid::Uuid;

use super::ComponentsRepository;
use crate::{
    error::{conflict_on_unique, AppResult},
    models::{
        component::{CheckoutFields, ComponentFilter, NewComponent, UpdateComponent},
        Component, ComponentStatus,
    },
};

#[derive(Clone)]
pub struct PgComponentsRepository {
    pool: Pool<Postgres>,
}

impl PgComponentsRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ComponentsRepository for PgComponentsRepository {
    async fn create(&self, data: &NewComponent, created_at: DateTime<Utc>) -> AppResult<Component> {
        sqlx::query_as::<_, Component>(
            r#"
            INSERT INTO components (
                id, component_code, name, category, description, image_url,
                checkout_duration, status, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&data.component_code)
        .bind(&data.name)
        .bind(&data.category)
        .bind(&data.description)
        .bind(&data.image_url)
        .bind(data.checkout_duration)
        .bind(ComponentStatus::Available)
        .bind(created_at)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "Component ID already exists"))
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Component>> {
        let component = sqlx::query_as::<_, Component>("SELECT * FROM components WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(component)
    }

    async fn find_by_code(&self, code: &str) -> AppResult<Option<Component>> {
        let component =
            sqlx::query_as::<_, Component>("SELECT * FROM components WHERE component_code = $1")
                .bind(code)
                .fetch_optional(&self.pool)
                .await?;
        Ok(component)
    }

    async fn list(&self, filter: &ComponentFilter) -> AppResult<Vec<Component>> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT * FROM components WHERE TRUE");

        if let Some(status) = filter.status {
            builder.push(" AND status = ").push_bind(status);
        }
        if let Some(ref category) = filter.category {
            builder.push(" AND category = ").push_bind(category.clone());
        }
        if let Some(borrower) = filter.current_borrower {
            builder.push(" AND current_borrower = ").push_bind(borrower);
        }
        builder.push(" ORDER BY component_code");

        let rows = builder
            .build_query_as::<Component>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }

    async fn update(&self, id: Uuid, data: &UpdateComponent) -> AppResult<Option<Component>> {
        let mut sets: Vec<String> = Vec::new();
        let mut idx = 2;

        macro_rules! add_field {
            ($field:expr, $name:expr) => {
                if $field.is_some() {
                    sets.push(format!("{} = ${}", $name, idx));
                    idx += 1;
                }
            };
        }

        add_field!(data.name, "name");
        add_field!(data.category, "category");
        add_field!(data.description, "description");
        add_field!(data.image_url, "image_url");
        add_field!(data.checkout_duration, "checkout_duration");

        if sets.is_empty() {
            return self.get_by_id(id).await;
        }

        let query = format!(
            "UPDATE components SET {} WHERE id = $1 RETURNING *",
            sets.join(", ")
        );

        let mut builder = sqlx::query_as::<_, Component>(&query).bind(id);

        macro_rules! bind_field {
            ($field:expr) => {
                if let Some(ref val) = $field {
                    builder = builder.bind(val);
                }
            };
        }

        bind_field!(data.name);
        bind_field!(data.category);
        bind_field!(data.description);
        bind_field!(data.image_url);
        bind_field!(data.checkout_duration);

        let component = builder.fetch_optional(&self.pool).await?;
        Ok(component)
    }

    async fn mark_checked_out(&self, id: Uuid, fields: CheckoutFields) -> AppResult<Option<Component>> {
        let component = sqlx::query_as::<_, Component>(
            r#"
            UPDATE components
            SET status = 'taken', current_borrower = $2, checked_out_at = $3, due_date = $4
            WHERE id = $1 AND status = 'available'
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(fields.borrower)
        .bind(fields.checked_out_at)
        .bind(fields.due_date)
        .fetch_optional(&self.pool)
        .await?;
        Ok(component)
    }

    async fn mark_returned(&self, id: Uuid, borrower: Uuid) -> AppResult<Option<Component>> {
        let component = sqlx::query_as::<_, Component>(
            r#"
            UPDATE components
            SET status = 'available', current_borrower = NULL, checked_out_at = NULL, due_date = NULL
            WHERE id = $1 AND status <> 'available' AND current_borrower = $2
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(borrower)
        .fetch_optional(&self.pool)
        .await?;
        Ok(component)
    }

    async fn mark_overdue(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<bool> {
        let result = sqlx::query(
            "UPDATE components SET status = 'overdue' WHERE id = $1 AND status = 'taken' AND due_date < $2",
        )
        .bind(id)
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn delete_all(&self) -> AppResult<u64> {
        let result = sqlx::query("DELETE FROM components")
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    async fn ping(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
