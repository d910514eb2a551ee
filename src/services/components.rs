//! Component registry and the checkout/return state machine

use std::{collections::HashMap, sync::Arc};

use chrono::Duration;
use uuid::Uuid;
use validator::Validate;

use crate::{
    clock::{ceil_days, Clock},
    error::{AppError, AppResult},
    models::{
        component::{
            normalize_code, BorrowerDetails, CheckoutFields, ComponentFilter, ComponentQuery,
            CreateComponent, NewComponent, ReturnedComponent, UpdateComponent,
        },
        history::{HistoryDetails, NewHistory},
        Actor, CheckoutHistory, Component, ComponentDetails, ComponentStatus, HistoryAction,
        NotificationKind, User,
    },
    repository::Repository,
};

use super::notifications::NotificationQueue;

#[derive(Clone)]
pub struct ComponentsService {
    repository: Repository,
    clock: Arc<dyn Clock>,
    queue: NotificationQueue,
}

impl ComponentsService {
    pub fn new(repository: Repository, clock: Arc<dyn Clock>, queue: NotificationQueue) -> Self {
        Self {
            repository,
            clock,
            queue,
        }
    }

    /// Register a new component (always starts available)
    pub async fn create(&self, data: CreateComponent) -> AppResult<Component> {
        data.validate()?;
        let new_component = NewComponent::from(data);

        if self
            .repository
            .components
            .find_by_code(&new_component.component_code)
            .await?
            .is_some()
        {
            return Err(AppError::Conflict("Component ID already exists".to_string()));
        }

        let component = self
            .repository
            .components
            .create(&new_component, self.clock.now())
            .await?;

        tracing::info!(code = %component.component_code, "Component created");
        Ok(component)
    }

    /// Get a component with full borrower contact details
    pub async fn get(&self, id: Uuid) -> AppResult<ComponentDetails> {
        let component = self.load(id).await?;
        self.with_contact_details(component).await
    }

    /// Get a component by its human code
    pub async fn get_by_code(&self, code: &str) -> AppResult<ComponentDetails> {
        let component = self
            .repository
            .components
            .find_by_code(&normalize_code(code))
            .await?
            .ok_or_else(|| AppError::NotFound("Component not found".to_string()))?;
        self.with_contact_details(component).await
    }

    /// List components. Status and category are matched by storage, `search` in memory.
    pub async fn list(&self, query: ComponentQuery) -> AppResult<Vec<ComponentDetails>> {
        let filter = ComponentFilter {
            status: query.status,
            category: query.category.filter(|c| !c.is_empty()),
            current_borrower: None,
        };
        let mut components = self.repository.components.list(&filter).await?;

        if let Some(search) = query.search.map(|s| s.trim().to_lowercase()) {
            if !search.is_empty() {
                components.retain(|c| c.matches_search(&search));
            }
        }

        let mut borrowers: HashMap<Uuid, Option<User>> = HashMap::new();
        let mut result = Vec::with_capacity(components.len());
        for component in components {
            let details = match component.current_borrower {
                Some(borrower_id) => {
                    if !borrowers.contains_key(&borrower_id) {
                        let user = self.repository.users.get_by_id(borrower_id).await?;
                        borrowers.insert(borrower_id, user);
                    }
                    borrowers
                        .get(&borrower_id)
                        .and_then(|user| user.as_ref())
                        .map(BorrowerDetails::summary)
                }
                None => None,
            };
            result.push(ComponentDetails {
                component,
                current_borrower_details: details,
            });
        }

        Ok(result)
    }

    /// Edit descriptive fields; status and borrower fields are not touched
    pub async fn update(&self, id: Uuid, data: UpdateComponent) -> AppResult<Component> {
        data.validate()?;
        self.repository
            .components
            .update(id, &data)
            .await?
            .ok_or_else(|| AppError::NotFound("Component not found".to_string()))
    }

    /// Components past their due date, reclassified to overdue
    pub async fn overdue(&self) -> AppResult<Vec<ComponentDetails>> {
        let now = self.clock.now();
        let components = self
            .repository
            .components
            .list(&ComponentFilter::default())
            .await?;

        let mut result = Vec::new();
        for mut component in components.into_iter().filter(|c| c.is_past_due(now)) {
            if component.status == ComponentStatus::Taken
                && self.repository.components.mark_overdue(component.id, now).await?
            {
                component.status = ComponentStatus::Overdue;
            }
            result.push(self.with_contact_details(component).await?);
        }

        result.sort_by_key(|d| d.component.due_date);
        Ok(result)
    }

    /// Components currently held by one user
    pub async fn borrowed_by(&self, user_id: Uuid) -> AppResult<Vec<Component>> {
        self.repository
            .components
            .list(&ComponentFilter {
                current_borrower: Some(user_id),
                ..ComponentFilter::default()
            })
            .await
    }

    /// History of one component, newest first
    pub async fn history(&self, id: Uuid) -> AppResult<Vec<HistoryDetails>> {
        self.load(id).await?;
        let records = self.repository.history.by_component(id).await?;
        self.history_details(records, false).await
    }

    /// History of one user, newest first, with component summaries
    pub async fn history_by_user(&self, user_id: Uuid) -> AppResult<Vec<HistoryDetails>> {
        let records = self.repository.history.by_user(user_id).await?;
        self.history_details(records, true).await
    }

    /// Resolve user (and optionally component) summaries for history records
    pub(crate) async fn history_details(
        &self,
        records: Vec<CheckoutHistory>,
        with_component: bool,
    ) -> AppResult<Vec<HistoryDetails>> {
        let mut users: HashMap<Uuid, Option<User>> = HashMap::new();
        let mut components: HashMap<Uuid, Option<Component>> = HashMap::new();
        let mut result = Vec::with_capacity(records.len());

        for record in records {
            if !users.contains_key(&record.user_id) {
                let user = self.repository.users.get_by_id(record.user_id).await?;
                users.insert(record.user_id, user);
            }
            let user_details = users
                .get(&record.user_id)
                .and_then(|u| u.as_ref())
                .map(User::short);

            let component_details = if with_component {
                if !components.contains_key(&record.component_id) {
                    let component = self
                        .repository
                        .components
                        .get_by_id(record.component_id)
                        .await?;
                    components.insert(record.component_id, component);
                }
                components
                    .get(&record.component_id)
                    .and_then(|c| c.as_ref())
                    .map(Component::short)
            } else {
                None
            };

            result.push(HistoryDetails {
                record,
                user_details,
                component_details,
            });
        }

        Ok(result)
    }

    /// Check a component out to the acting user for its default duration
    pub async fn checkout(
        &self,
        id: Uuid,
        actor: Actor,
        notes: Option<String>,
    ) -> AppResult<ComponentDetails> {
        let component = self.load(id).await?;
        if !component.is_available() {
            return Err(AppError::InvalidState("Component is not available".to_string()));
        }

        let borrower = self
            .repository
            .users
            .get_by_id(actor.id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let days = component.checkout_duration;
        let component = self
            .perform_checkout(&component, &borrower, days, notes.unwrap_or_default())
            .await?;

        Ok(ComponentDetails {
            component,
            current_borrower_details: Some(BorrowerDetails::summary(&borrower)),
        })
    }

    /// available -> taken for `borrower`, with history and a checkout notification.
    ///
    /// Losing a concurrent checkout returns `InvalidState` and writes nothing.
    pub(crate) async fn perform_checkout(
        &self,
        component: &Component,
        borrower: &User,
        days: i32,
        notes: String,
    ) -> AppResult<Component> {
        let now = self.clock.now();
        let fields = CheckoutFields {
            borrower: borrower.id,
            checked_out_at: now,
            due_date: now + Duration::days(i64::from(days)),
        };

        let updated = self
            .repository
            .components
            .mark_checked_out(component.id, fields)
            .await?
            .ok_or_else(|| AppError::InvalidState("Component is not available".to_string()))?;

        self.repository
            .history
            .append(&NewHistory {
                component_id: updated.id,
                user_id: borrower.id,
                action: HistoryAction::Checkout,
                notes,
                timestamp: now,
            })
            .await?;

        tracing::info!(
            code = %updated.component_code,
            borrower = %borrower.username,
            due = %fields.due_date,
            "Component checked out"
        );

        self.queue
            .enqueue(borrower.clone(), updated.clone(), NotificationKind::Checkout);

        Ok(updated)
    }

    /// Return a component. Only the borrower or an admin may return it.
    pub async fn return_component(
        &self,
        id: Uuid,
        actor: Actor,
        notes: Option<String>,
    ) -> AppResult<ReturnedComponent> {
        let component = self.load(id).await?;
        if component.is_available() {
            return Err(AppError::InvalidState(
                "Component is already available".to_string(),
            ));
        }

        let previous_borrower = component
            .current_borrower
            .ok_or_else(|| AppError::Internal("Taken component has no borrower".to_string()))?;
        if previous_borrower != actor.id && !actor.is_admin() {
            return Err(AppError::Forbidden(
                "You did not borrow this component".to_string(),
            ));
        }

        let now = self.clock.now();
        let duration_days = component
            .checked_out_at
            .map(|at| ceil_days(now - at))
            .unwrap_or(0);

        let updated = self
            .repository
            .components
            .mark_returned(component.id, previous_borrower)
            .await?
            .ok_or_else(|| {
                AppError::InvalidState("Component is already available".to_string())
            })?;

        self.repository
            .history
            .append(&NewHistory {
                component_id: updated.id,
                user_id: previous_borrower,
                action: HistoryAction::Return,
                notes: notes.unwrap_or_default(),
                timestamp: now,
            })
            .await?;

        tracing::info!(
            code = %updated.component_code,
            duration_days,
            "Component returned"
        );

        match self.repository.users.get_by_id(previous_borrower).await {
            Ok(Some(borrower)) => self.queue.enqueue(
                borrower,
                updated.clone(),
                NotificationKind::Return { duration_days },
            ),
            Ok(None) => tracing::warn!(user_id = %previous_borrower, "Borrower no longer exists"),
            Err(e) => tracing::warn!("Failed to load borrower for return notification: {}", e),
        }

        Ok(ReturnedComponent {
            component: updated,
            previous_borrower,
            duration_days,
        })
    }

    pub(crate) async fn load(&self, id: Uuid) -> AppResult<Component> {
        self.repository
            .components
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Component not found".to_string()))
    }

    async fn with_contact_details(&self, component: Component) -> AppResult<ComponentDetails> {
        let details = match component.current_borrower {
            Some(borrower_id) => self
                .repository
                .users
                .get_by_id(borrower_id)
                .await?
                .as_ref()
                .map(BorrowerDetails::with_contact),
            None => None,
        };

        Ok(ComponentDetails {
            component,
            current_borrower_details: details,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{NotificationStatus, NotificationType},
        services::{email::MockEmailTransport, testing::Fixture},
    };

    fn ok_transport() -> MockEmailTransport {
        let mut transport = MockEmailTransport::new();
        transport.expect_send().returning(|_, _, _| Ok(()));
        transport
    }

    #[tokio::test]
    async fn test_create_normalizes_and_rejects_duplicates() {
        let fx = Fixture::new(ok_transport()).await;
        let data = CreateComponent {
            component_id: "sens-010".to_string(),
            name: "PIR Sensor".to_string(),
            category: "Sensor".to_string(),
            description: None,
            image_url: None,
            checkout_duration: None,
        };

        let created = fx.services.components.create(data.clone()).await.unwrap();
        assert_eq!(created.component_code, "SENS-010");
        assert_eq!(created.checkout_duration, 7);
        assert_eq!(created.status, ComponentStatus::Available);
        assert!(created.current_borrower.is_none());

        let duplicate = CreateComponent {
            component_id: "Sens-010".to_string(),
            ..data
        };
        let result = fx.services.components.create(duplicate).await;
        assert!(matches!(result, Err(AppError::Conflict(_))));
    }

    #[tokio::test]
    async fn test_checkout_sets_borrower_and_due_date() {
        let mut fx = Fixture::new(ok_transport()).await;
        let component = fx.component("ARD-001").await;

        let details = fx
            .services
            .components
            .checkout(component.id, fx.member1.actor(), Some("robot arm".to_string()))
            .await
            .unwrap();

        assert_eq!(details.component.status, ComponentStatus::Taken);
        assert_eq!(details.component.current_borrower, Some(fx.member1.id));
        assert_eq!(details.component.checked_out_at, Some(fx.clock.now()));
        assert_eq!(
            details.component.due_date,
            Some(fx.clock.now() + Duration::days(7))
        );
        let borrower = details.current_borrower_details.unwrap();
        assert_eq!(borrower.username, "member1");
        assert!(borrower.email.is_none());

        let history = fx.services.components.history(component.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].record.action, HistoryAction::Checkout);
        assert_eq!(history[0].record.notes, "robot arm");

        assert_eq!(fx.drain().await, 1);
        let logs = fx.logs(fx.member1.id).await;
        assert_eq!(logs[0].notification_type, NotificationType::Checkout);
        assert_eq!(logs[0].status, NotificationStatus::Sent);
    }

    #[tokio::test]
    async fn test_checkout_unavailable_fails_without_history() {
        let fx = Fixture::new(ok_transport()).await;
        let component = fx.component("ARD-001").await;
        fx.services
            .components
            .checkout(component.id, fx.member1.actor(), None)
            .await
            .unwrap();

        let result = fx
            .services
            .components
            .checkout(component.id, fx.member2.actor(), None)
            .await;
        assert!(matches!(result, Err(AppError::InvalidState(msg)) if msg == "Component is not available"));

        let history = fx.services.components.history(component.id).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_checkout_unknown_component() {
        let fx = Fixture::new(ok_transport()).await;
        let result = fx
            .services
            .components
            .checkout(Uuid::new_v4(), fx.member1.actor(), None)
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_return_rules() {
        let fx = Fixture::new(ok_transport()).await;
        let component = fx.component("ARD-001").await;

        let result = fx
            .services
            .components
            .return_component(component.id, fx.member1.actor(), None)
            .await;
        assert!(matches!(result, Err(AppError::InvalidState(_))));

        fx.services
            .components
            .checkout(component.id, fx.member1.actor(), None)
            .await
            .unwrap();

        let result = fx
            .services
            .components
            .return_component(component.id, fx.member2.actor(), None)
            .await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));

        // Admins may return on behalf of the borrower; history stays with the borrower
        fx.clock.advance(Duration::hours(30));
        let returned = fx
            .services
            .components
            .return_component(component.id, fx.admin.actor(), None)
            .await
            .unwrap();
        assert_eq!(returned.duration_days, 2);
        assert_eq!(returned.previous_borrower, fx.member1.id);
        assert_eq!(returned.component.status, ComponentStatus::Available);
        assert!(returned.component.due_date.is_none());
        assert!(returned.component.checked_out_at.is_none());

        let history = fx.services.components.history(component.id).await.unwrap();
        assert_eq!(history[0].record.action, HistoryAction::Return);
        assert_eq!(history[0].record.user_id, fx.member1.id);
    }

    #[tokio::test]
    async fn test_list_filters_and_search() {
        let fx = Fixture::new(ok_transport()).await;
        let uno = fx.component("ARD-001").await;
        fx.component("SENS-001").await;
        fx.services
            .components
            .checkout(uno.id, fx.member1.actor(), None)
            .await
            .unwrap();

        let taken = fx
            .services
            .components
            .list(ComponentQuery {
                status: Some(ComponentStatus::Taken),
                ..ComponentQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(taken.len(), 1);
        assert_eq!(
            taken[0].current_borrower_details.as_ref().map(|b| b.id),
            Some(fx.member1.id)
        );

        let found = fx
            .services
            .components
            .list(ComponentQuery {
                search: Some("sens".to_string()),
                ..ComponentQuery::default()
            })
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].component.component_code, "SENS-001");
    }

    #[tokio::test]
    async fn test_overdue_listing_reclassifies() {
        let fx = Fixture::new(ok_transport()).await;
        let component = fx.component("ARD-001").await;
        fx.services
            .components
            .checkout(component.id, fx.member1.actor(), None)
            .await
            .unwrap();

        assert!(fx.services.components.overdue().await.unwrap().is_empty());

        fx.clock.advance(Duration::days(8));
        let overdue = fx.services.components.overdue().await.unwrap();
        assert_eq!(overdue.len(), 1);
        assert_eq!(overdue[0].component.status, ComponentStatus::Overdue);
        let borrower = overdue[0].current_borrower_details.as_ref().unwrap();
        assert_eq!(borrower.email.as_deref(), Some("member1@challengers.local"));
    }

    #[tokio::test]
    async fn test_update_keeps_state_fields() {
        let fx = Fixture::new(ok_transport()).await;
        let component = fx.component("ARD-001").await;

        let updated = fx
            .services
            .components
            .update(
                component.id,
                UpdateComponent {
                    name: Some("Arduino Uno R4".to_string()),
                    checkout_duration: Some(14),
                    ..UpdateComponent::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.name, "Arduino Uno R4");
        assert_eq!(updated.checkout_duration, 14);
        assert_eq!(updated.status, ComponentStatus::Available);

        let result = fx
            .services
            .components
            .update(Uuid::new_v4(), UpdateComponent::default())
            .await;
        assert!(matches!(result, Err(AppError::NotFound(_))));
    }
}
