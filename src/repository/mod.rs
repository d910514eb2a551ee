//! Repository layer for storage operations
//!
//! Each entity has a storage trait. `Repository` bundles one implementation of
//! each; PostgreSQL in production, the in-memory store in tests.

pub mod components;
pub mod history;
pub mod memory;
pub mod notifications;
pub mod requests;
pub mod users;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Pool, Postgres};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        component::{CheckoutFields, ComponentFilter, NewComponent, UpdateComponent},
        history::NewHistory,
        notification::NewNotificationLog,
        request::{NewRequest, RequestDecision, RequestFilter},
        user::{NewUser, NotificationPreferences},
        CheckoutHistory, Component, ComponentRequest, NotificationLog, Role, User,
    },
};

#[async_trait]
pub trait ComponentsRepository: Send + Sync {
    async fn create(&self, data: &NewComponent, created_at: DateTime<Utc>) -> AppResult<Component>;

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Component>>;

    /// Lookup by human code; `code` must already be normalized
    async fn find_by_code(&self, code: &str) -> AppResult<Option<Component>>;

    async fn list(&self, filter: &ComponentFilter) -> AppResult<Vec<Component>>;

    /// Merge descriptive fields; `None` when the component does not exist
    async fn update(&self, id: Uuid, data: &UpdateComponent) -> AppResult<Option<Component>>;

    /// available -> taken, only if the component is still available
    async fn mark_checked_out(&self, id: Uuid, fields: CheckoutFields) -> AppResult<Option<Component>>;

    /// taken/overdue -> available, only if `borrower` still holds it
    async fn mark_returned(&self, id: Uuid, borrower: Uuid) -> AppResult<Option<Component>>;

    /// taken -> overdue, only if still taken and due before `now`
    async fn mark_overdue(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<bool>;

    async fn delete_all(&self) -> AppResult<u64>;

    /// Round trip to the backing store
    async fn ping(&self) -> AppResult<()>;
}

#[async_trait]
pub trait HistoryRepository: Send + Sync {
    async fn append(&self, entry: &NewHistory) -> AppResult<CheckoutHistory>;

    /// Newest first
    async fn by_component(&self, component_id: Uuid) -> AppResult<Vec<CheckoutHistory>>;

    /// Newest first
    async fn by_user(&self, user_id: Uuid) -> AppResult<Vec<CheckoutHistory>>;

    /// Newest first, at most `limit`
    async fn recent(&self, limit: i64) -> AppResult<Vec<CheckoutHistory>>;

    /// Users with the most checkouts, descending
    async fn top_borrowers(&self, limit: i64) -> AppResult<Vec<(Uuid, i64)>>;

    async fn delete_all(&self) -> AppResult<u64>;
}

#[async_trait]
pub trait RequestsRepository: Send + Sync {
    /// Fails with `Conflict` if the user already has a pending request for the component
    async fn create(&self, data: &NewRequest) -> AppResult<ComponentRequest>;

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<ComponentRequest>>;

    /// Newest first
    async fn list(&self, filter: &RequestFilter) -> AppResult<Vec<ComponentRequest>>;

    /// Write a decision, only if the request is still pending
    async fn decide(&self, id: Uuid, decision: &RequestDecision) -> AppResult<Option<ComponentRequest>>;

    /// approved -> pending, clearing the responder. Undoes an approval whose
    /// checkout failed; false when the request is no longer approved.
    async fn reopen(&self, id: Uuid) -> AppResult<bool>;

    /// Delete, only if the request is still pending
    async fn delete_pending(&self, id: Uuid) -> AppResult<bool>;

    async fn count_pending(&self) -> AppResult<i64>;

    async fn delete_all(&self) -> AppResult<u64>;
}

#[async_trait]
pub trait NotificationLogsRepository: Send + Sync {
    async fn create(&self, data: &NewNotificationLog) -> AppResult<NotificationLog>;

    async fn mark_sent(&self, id: Uuid, sent_at: DateTime<Utc>, attempts: i32) -> AppResult<()>;

    async fn mark_failed(&self, id: Uuid, attempts: i32, error: &str) -> AppResult<()>;

    /// Failed logs with `attempts < max_attempts`, oldest first, at most `limit`
    async fn list_retryable(&self, max_attempts: i32, limit: i64) -> AppResult<Vec<NotificationLog>>;

    /// Newest first
    async fn by_user(&self, user_id: Uuid) -> AppResult<Vec<NotificationLog>>;
}

#[async_trait]
pub trait UsersRepository: Send + Sync {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<User>>;

    async fn get_by_username(&self, username: &str) -> AppResult<Option<User>>;

    async fn list_admins(&self) -> AppResult<Vec<User>>;

    async fn create(&self, data: &NewUser, created_at: DateTime<Utc>) -> AppResult<User>;

    /// All users, ordered by username
    async fn list(&self) -> AppResult<Vec<User>>;

    async fn update_preferences(
        &self,
        id: Uuid,
        preferences: NotificationPreferences,
    ) -> AppResult<Option<User>>;

    async fn update_role(&self, id: Uuid, role: Role) -> AppResult<Option<User>>;

    /// Removes the user and their requests. History keeps the user id.
    async fn delete(&self, id: Uuid) -> AppResult<bool>;
}

/// Main repository struct holding one store per entity
#[derive(Clone)]
pub struct Repository {
    pub components: Arc<dyn ComponentsRepository>,
    pub history: Arc<dyn HistoryRepository>,
    pub requests: Arc<dyn RequestsRepository>,
    pub notifications: Arc<dyn NotificationLogsRepository>,
    pub users: Arc<dyn UsersRepository>,
}

impl Repository {
    /// Create a PostgreSQL backed repository with the given pool
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self {
            components: Arc::new(components::PgComponentsRepository::new(pool.clone())),
            history: Arc::new(history::PgHistoryRepository::new(pool.clone())),
            requests: Arc::new(requests::PgRequestsRepository::new(pool.clone())),
            notifications: Arc::new(notifications::PgNotificationLogsRepository::new(pool.clone())),
            users: Arc::new(users::PgUsersRepository::new(pool)),
        }
    }

    /// Create a repository backed by a single in-memory store
    pub fn in_memory() -> Self {
        Self::from_store(Arc::new(memory::MemoryStore::default()))
    }

    pub fn from_store(store: Arc<memory::MemoryStore>) -> Self {
        Self {
            components: store.clone(),
            history: store.clone(),
            requests: store.clone(),
            notifications: store.clone(),
            users: store,
        }
    }
}
