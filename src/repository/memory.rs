//! In-memory store implementing every repository trait
//!
//! Used by the test suites. Conditional writes are evaluated under a single
//! lock so they behave like the SQL `WHERE status = ...` guards.

use std::cmp::Reverse;
use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{
    ComponentsRepository, HistoryRepository, NotificationLogsRepository, RequestsRepository,
    UsersRepository,
};
use crate::{
    error::{AppError, AppResult},
    models::{
        component::{CheckoutFields, ComponentFilter, NewComponent, UpdateComponent},
        history::NewHistory,
        notification::NewNotificationLog,
        request::{NewRequest, RequestDecision, RequestFilter},
        user::{NewUser, NotificationPreferences},
        CheckoutHistory, Component, ComponentRequest, ComponentStatus, HistoryAction,
        NotificationLog, NotificationStatus, RequestStatus, Role, User,
    },
};

#[derive(Default)]
struct Tables {
    components: Vec<Component>,
    history: Vec<CheckoutHistory>,
    requests: Vec<ComponentRequest>,
    logs: Vec<NotificationLog>,
    users: Vec<User>,
}

#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
}

/// Newest first; ties keep the most recent insert first
fn newest_first<T: Clone>(rows: impl DoubleEndedIterator<Item = T>, key: impl Fn(&T) -> DateTime<Utc>) -> Vec<T> {
    let mut rows: Vec<T> = rows.rev().collect();
    rows.sort_by_key(|row| Reverse(key(row)));
    rows
}

#[async_trait]
impl ComponentsRepository for MemoryStore {
    async fn create(&self, data: &NewComponent, created_at: DateTime<Utc>) -> AppResult<Component> {
        let mut tables = self.tables.lock().await;
        if tables
            .components
            .iter()
            .any(|c| c.component_code == data.component_code)
        {
            return Err(AppError::Conflict("Component ID already exists".to_string()));
        }

        let component = Component {
            id: Uuid::new_v4(),
            component_code: data.component_code.clone(),
            name: data.name.clone(),
            category: data.category.clone(),
            description: data.description.clone(),
            image_url: data.image_url.clone(),
            checkout_duration: data.checkout_duration,
            status: ComponentStatus::Available,
            current_borrower: None,
            checked_out_at: None,
            due_date: None,
            created_at,
        };
        tables.components.push(component.clone());
        Ok(component)
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<Component>> {
        let tables = self.tables.lock().await;
        Ok(tables.components.iter().find(|c| c.id == id).cloned())
    }

    async fn find_by_code(&self, code: &str) -> AppResult<Option<Component>> {
        let tables = self.tables.lock().await;
        Ok(tables
            .components
            .iter()
            .find(|c| c.component_code == code)
            .cloned())
    }

    async fn list(&self, filter: &ComponentFilter) -> AppResult<Vec<Component>> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<Component> = tables
            .components
            .iter()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect();
        rows.sort_by(|a, b| a.component_code.cmp(&b.component_code));
        Ok(rows)
    }

    async fn update(&self, id: Uuid, data: &UpdateComponent) -> AppResult<Option<Component>> {
        let mut tables = self.tables.lock().await;
        let Some(component) = tables.components.iter_mut().find(|c| c.id == id) else {
            return Ok(None);
        };

        if let Some(ref name) = data.name {
            component.name = name.clone();
        }
        if let Some(ref category) = data.category {
            component.category = category.clone();
        }
        if let Some(ref description) = data.description {
            component.description = description.clone();
        }
        if let Some(ref image_url) = data.image_url {
            component.image_url = image_url.clone();
        }
        if let Some(duration) = data.checkout_duration {
            component.checkout_duration = duration;
        }
        Ok(Some(component.clone()))
    }

    async fn mark_checked_out(&self, id: Uuid, fields: CheckoutFields) -> AppResult<Option<Component>> {
        let mut tables = self.tables.lock().await;
        let Some(component) = tables
            .components
            .iter_mut()
            .find(|c| c.id == id && c.status == ComponentStatus::Available)
        else {
            return Ok(None);
        };

        component.status = ComponentStatus::Taken;
        component.current_borrower = Some(fields.borrower);
        component.checked_out_at = Some(fields.checked_out_at);
        component.due_date = Some(fields.due_date);
        Ok(Some(component.clone()))
    }

    async fn mark_returned(&self, id: Uuid, borrower: Uuid) -> AppResult<Option<Component>> {
        let mut tables = self.tables.lock().await;
        let Some(component) = tables.components.iter_mut().find(|c| {
            c.id == id
                && c.status != ComponentStatus::Available
                && c.current_borrower == Some(borrower)
        }) else {
            return Ok(None);
        };

        component.status = ComponentStatus::Available;
        component.current_borrower = None;
        component.checked_out_at = None;
        component.due_date = None;
        Ok(Some(component.clone()))
    }

    async fn mark_overdue(&self, id: Uuid, now: DateTime<Utc>) -> AppResult<bool> {
        let mut tables = self.tables.lock().await;
        match tables.components.iter_mut().find(|c| {
            c.id == id
                && c.status == ComponentStatus::Taken
                && c.due_date.map_or(false, |due| due < now)
        })
        {
            Some(component) => {
                component.status = ComponentStatus::Overdue;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn delete_all(&self) -> AppResult<u64> {
        let mut tables = self.tables.lock().await;
        let removed = tables.components.len() as u64;
        tables.components.clear();
        Ok(removed)
    }

    async fn ping(&self) -> AppResult<()> {
        Ok(())
    }
}

#[async_trait]
impl HistoryRepository for MemoryStore {
    async fn append(&self, entry: &NewHistory) -> AppResult<CheckoutHistory> {
        let mut tables = self.tables.lock().await;
        let record = CheckoutHistory {
            id: Uuid::new_v4(),
            component_id: entry.component_id,
            user_id: entry.user_id,
            action: entry.action,
            notes: entry.notes.clone(),
            timestamp: entry.timestamp,
        };
        tables.history.push(record.clone());
        Ok(record)
    }

    async fn by_component(&self, component_id: Uuid) -> AppResult<Vec<CheckoutHistory>> {
        let tables = self.tables.lock().await;
        let rows = tables
            .history
            .iter()
            .filter(|h| h.component_id == component_id)
            .cloned()
            .collect::<Vec<_>>();
        Ok(newest_first(rows.into_iter(), |h| h.timestamp))
    }

    async fn by_user(&self, user_id: Uuid) -> AppResult<Vec<CheckoutHistory>> {
        let tables = self.tables.lock().await;
        let rows = tables
            .history
            .iter()
            .filter(|h| h.user_id == user_id)
            .cloned()
            .collect::<Vec<_>>();
        Ok(newest_first(rows.into_iter(), |h| h.timestamp))
    }

    async fn recent(&self, limit: i64) -> AppResult<Vec<CheckoutHistory>> {
        let tables = self.tables.lock().await;
        let mut rows = newest_first(tables.history.iter().cloned(), |h| h.timestamp);
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn top_borrowers(&self, limit: i64) -> AppResult<Vec<(Uuid, i64)>> {
        let tables = self.tables.lock().await;
        let mut counts: HashMap<Uuid, i64> = HashMap::new();
        for record in tables
            .history
            .iter()
            .filter(|h| h.action == HistoryAction::Checkout)
        {
            *counts.entry(record.user_id).or_default() += 1;
        }

        let mut rows: Vec<(Uuid, i64)> = counts.into_iter().collect();
        rows.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn delete_all(&self) -> AppResult<u64> {
        let mut tables = self.tables.lock().await;
        let removed = tables.history.len() as u64;
        tables.history.clear();
        Ok(removed)
    }
}

#[async_trait]
impl RequestsRepository for MemoryStore {
    async fn create(&self, data: &NewRequest) -> AppResult<ComponentRequest> {
        let mut tables = self.tables.lock().await;
        if tables.requests.iter().any(|r| {
            r.user_id == data.user_id && r.component_id == data.component_id && r.is_pending()
        }) {
            return Err(AppError::Conflict(
                "You already have a pending request for this component".to_string(),
            ));
        }

        let request = ComponentRequest {
            id: Uuid::new_v4(),
            user_id: data.user_id,
            component_id: data.component_id,
            notes: data.notes.clone(),
            requested_days: data.requested_days,
            status: RequestStatus::Pending,
            requested_at: data.requested_at,
            responded_at: None,
            responded_by: None,
            rejection_reason: None,
        };
        tables.requests.push(request.clone());
        Ok(request)
    }

    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<ComponentRequest>> {
        let tables = self.tables.lock().await;
        Ok(tables.requests.iter().find(|r| r.id == id).cloned())
    }

    async fn list(&self, filter: &RequestFilter) -> AppResult<Vec<ComponentRequest>> {
        let tables = self.tables.lock().await;
        let rows = tables
            .requests
            .iter()
            .filter(|r| filter.matches(r))
            .cloned()
            .collect::<Vec<_>>();
        Ok(newest_first(rows.into_iter(), |r| r.requested_at))
    }

    async fn decide(&self, id: Uuid, decision: &RequestDecision) -> AppResult<Option<ComponentRequest>> {
        let mut tables = self.tables.lock().await;
        let Some(request) = tables
            .requests
            .iter_mut()
            .find(|r| r.id == id && r.is_pending())
        else {
            return Ok(None);
        };

        request.status = decision.status;
        request.responded_at = Some(decision.responded_at);
        request.responded_by = Some(decision.responded_by);
        request.rejection_reason = decision.rejection_reason.clone();
        Ok(Some(request.clone()))
    }

    async fn reopen(&self, id: Uuid) -> AppResult<bool> {
        let mut tables = self.tables.lock().await;
        let Some(index) = tables
            .requests
            .iter()
            .position(|r| r.id == id && r.status == RequestStatus::Approved)
        else {
            return Ok(false);
        };

        let (user_id, component_id) = (tables.requests[index].user_id, tables.requests[index].component_id);
        if tables
            .requests
            .iter()
            .any(|r| r.is_pending() && r.user_id == user_id && r.component_id == component_id)
        {
            return Err(AppError::Conflict(
                "You already have a pending request for this component".to_string(),
            ));
        }

        let request = &mut tables.requests[index];
        request.status = RequestStatus::Pending;
        request.responded_at = None;
        request.responded_by = None;
        request.rejection_reason = None;
        Ok(true)
    }

    async fn delete_pending(&self, id: Uuid) -> AppResult<bool> {
        let mut tables = self.tables.lock().await;
        let before = tables.requests.len();
        tables.requests.retain(|r| !(r.id == id && r.is_pending()));
        Ok(tables.requests.len() < before)
    }

    async fn count_pending(&self) -> AppResult<i64> {
        let tables = self.tables.lock().await;
        Ok(tables.requests.iter().filter(|r| r.is_pending()).count() as i64)
    }

    async fn delete_all(&self) -> AppResult<u64> {
        let mut tables = self.tables.lock().await;
        let removed = tables.requests.len() as u64;
        tables.requests.clear();
        Ok(removed)
    }
}

#[async_trait]
impl NotificationLogsRepository for MemoryStore {
    async fn create(&self, data: &NewNotificationLog) -> AppResult<NotificationLog> {
        let mut tables = self.tables.lock().await;
        let log = NotificationLog {
            id: Uuid::new_v4(),
            user_id: data.user_id,
            component_id: data.component_id,
            notification_type: data.notification_type,
            channel: data.channel,
            status: NotificationStatus::Pending,
            attempts: 0,
            error_message: String::new(),
            payload: data.payload.clone(),
            sent_at: None,
            created_at: data.created_at,
        };
        tables.logs.push(log.clone());
        Ok(log)
    }

    async fn mark_sent(&self, id: Uuid, sent_at: DateTime<Utc>, attempts: i32) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        if let Some(log) = tables.logs.iter_mut().find(|l| l.id == id) {
            log.status = NotificationStatus::Sent;
            log.sent_at = Some(sent_at);
            log.attempts = attempts;
        }
        Ok(())
    }

    async fn mark_failed(&self, id: Uuid, attempts: i32, error: &str) -> AppResult<()> {
        let mut tables = self.tables.lock().await;
        if let Some(log) = tables.logs.iter_mut().find(|l| l.id == id) {
            log.status = NotificationStatus::Failed;
            log.attempts = attempts;
            log.error_message = error.to_string();
        }
        Ok(())
    }

    async fn list_retryable(&self, max_attempts: i32, limit: i64) -> AppResult<Vec<NotificationLog>> {
        let tables = self.tables.lock().await;
        let mut rows: Vec<NotificationLog> = tables
            .logs
            .iter()
            .filter(|l| l.status == NotificationStatus::Failed && l.attempts < max_attempts)
            .cloned()
            .collect();
        rows.sort_by_key(|l| l.created_at);
        rows.truncate(limit.max(0) as usize);
        Ok(rows)
    }

    async fn by_user(&self, user_id: Uuid) -> AppResult<Vec<NotificationLog>> {
        let tables = self.tables.lock().await;
        let rows = tables
            .logs
            .iter()
            .filter(|l| l.user_id == user_id)
            .cloned()
            .collect::<Vec<_>>();
        Ok(newest_first(rows.into_iter(), |l| l.created_at))
    }
}

#[async_trait]
impl UsersRepository for MemoryStore {
    async fn get_by_id(&self, id: Uuid) -> AppResult<Option<User>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|u| u.id == id).cloned())
    }

    async fn get_by_username(&self, username: &str) -> AppResult<Option<User>> {
        let username = username.to_lowercase();
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().find(|u| u.username == username).cloned())
    }

    async fn list_admins(&self) -> AppResult<Vec<User>> {
        let tables = self.tables.lock().await;
        Ok(tables.users.iter().filter(|u| u.is_admin()).cloned().collect())
    }

    async fn create(&self, data: &NewUser, created_at: DateTime<Utc>) -> AppResult<User> {
        let mut tables = self.tables.lock().await;
        let username = data.username.to_lowercase();
        if tables.users.iter().any(|u| u.username == username) {
            return Err(AppError::Conflict("Username already exists".to_string()));
        }

        let user = User {
            id: Uuid::new_v4(),
            username,
            name: data.name.clone(),
            email: data.email.to_lowercase(),
            phone: data.phone.clone(),
            role: data.role,
            notification_preferences: NotificationPreferences {
                email: data.email_notifications,
            },
            password_hash: data.password_hash.clone(),
            created_at,
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn list(&self) -> AppResult<Vec<User>> {
        let tables = self.tables.lock().await;
        let mut users = tables.users.clone();
        users.sort_by(|a, b| a.username.cmp(&b.username));
        Ok(users)
    }

    async fn update_preferences(
        &self,
        id: Uuid,
        preferences: NotificationPreferences,
    ) -> AppResult<Option<User>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.users.iter_mut().find(|u| u.id == id).map(|user| {
            user.notification_preferences = preferences;
            user.clone()
        }))
    }

    async fn update_role(&self, id: Uuid, role: Role) -> AppResult<Option<User>> {
        let mut tables = self.tables.lock().await;
        Ok(tables.users.iter_mut().find(|u| u.id == id).map(|user| {
            user.role = role;
            user.clone()
        }))
    }

    async fn delete(&self, id: Uuid) -> AppResult<bool> {
        let mut tables = self.tables.lock().await;
        let before = tables.users.len();
        tables.users.retain(|u| u.id != id);
        if tables.users.len() == before {
            return Ok(false);
        }

        tables.requests.retain(|r| r.user_id != id);
        for request in tables.requests.iter_mut() {
            if request.responded_by == Some(id) {
                request.responded_by = None;
            }
        }
        Ok(true)
    }
}
