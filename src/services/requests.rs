//! Component request workflow: members ask, admins approve or reject

use std::{collections::HashMap, sync::Arc};

use uuid::Uuid;
use validator::Validate;

use crate::{
    clock::Clock,
    error::{AppError, AppResult},
    models::{
        component::BorrowerDetails,
        request::{
            CreateRequest, NewRequest, RequestDecision, RequestDetails, RequestFilter,
            RequestQuery, DEFAULT_REJECTION_REASON,
        },
        Actor, Component, ComponentDetails, ComponentRequest, NotificationKind, RequestStatus,
        User,
    },
    repository::Repository,
};

use super::{components::ComponentsService, notifications::NotificationQueue};

#[derive(Clone)]
pub struct RequestsService {
    repository: Repository,
    clock: Arc<dyn Clock>,
    queue: NotificationQueue,
    components: ComponentsService,
}

/// Result of an approval: the decided request and the component now checked out
#[derive(Debug, Clone, serde::Serialize, utoipa::ToSchema)]
pub struct ApprovedRequest {
    pub request: ComponentRequest,
    pub component: ComponentDetails,
}

impl RequestsService {
    pub fn new(
        repository: Repository,
        clock: Arc<dyn Clock>,
        queue: NotificationQueue,
        components: ComponentsService,
    ) -> Self {
        Self {
            repository,
            clock,
            queue,
            components,
        }
    }

    /// Ask for an available component. Every admin is notified.
    pub async fn create(&self, actor: Actor, data: CreateRequest) -> AppResult<ComponentRequest> {
        data.validate()?;

        let component = self.components.load(data.component_id).await?;
        if !component.is_available() {
            return Err(AppError::InvalidState(format!(
                "Component is not available. Current status: {}",
                component.status
            )));
        }

        let existing = self
            .repository
            .requests
            .list(&RequestFilter {
                status: Some(RequestStatus::Pending),
                user_id: Some(actor.id),
                component_id: Some(component.id),
            })
            .await?;
        if !existing.is_empty() {
            return Err(AppError::Conflict(
                "You already have a pending request for this component".to_string(),
            ));
        }

        let member = self
            .repository
            .users
            .get_by_id(actor.id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let request = self
            .repository
            .requests
            .create(&NewRequest {
                user_id: member.id,
                component_id: component.id,
                notes: data.notes.unwrap_or_default(),
                requested_days: data.requested_days.unwrap_or(component.checkout_duration),
                requested_at: self.clock.now(),
            })
            .await?;

        tracing::info!(
            code = %component.component_code,
            member = %member.username,
            "Component requested"
        );

        self.notify_admins(&member, &component, &request).await;
        Ok(request)
    }

    async fn notify_admins(&self, member: &User, component: &Component, request: &ComponentRequest) {
        let admins = match self.repository.users.list_admins().await {
            Ok(admins) => admins,
            Err(e) => {
                tracing::warn!("Failed to load admins for request notification: {}", e);
                return;
            }
        };

        if admins.is_empty() {
            tracing::warn!("No admin users found to notify");
            return;
        }

        for admin in admins {
            self.queue.enqueue(
                admin,
                component.clone(),
                NotificationKind::ComponentRequest {
                    member: member.short(),
                    notes: request.notes.clone(),
                    requested_days: request.requested_days,
                },
            );
        }
    }

    /// Admins see every request, members only their own; newest first
    pub async fn list(&self, actor: Actor, query: RequestQuery) -> AppResult<Vec<RequestDetails>> {
        let filter = RequestFilter {
            status: query.status,
            user_id: if actor.is_admin() { None } else { Some(actor.id) },
            component_id: None,
        };
        let requests = self.repository.requests.list(&filter).await?;

        let mut users: HashMap<Uuid, Option<User>> = HashMap::new();
        let mut components: HashMap<Uuid, Option<Component>> = HashMap::new();
        let mut result = Vec::with_capacity(requests.len());

        for request in requests {
            let mut user_ids = vec![request.user_id];
            user_ids.extend(request.responded_by);
            for id in user_ids {
                if !users.contains_key(&id) {
                    let user = self.repository.users.get_by_id(id).await?;
                    users.insert(id, user);
                }
            }
            if !components.contains_key(&request.component_id) {
                let component = self
                    .repository
                    .components
                    .get_by_id(request.component_id)
                    .await?;
                components.insert(request.component_id, component);
            }

            let short_user = |id: &Uuid| users.get(id).and_then(|u| u.as_ref()).map(User::short);
            result.push(RequestDetails {
                user: short_user(&request.user_id),
                component: components
                    .get(&request.component_id)
                    .and_then(|c| c.as_ref())
                    .map(Component::short),
                responded_by_user: request.responded_by.as_ref().and_then(short_user),
                request,
            });
        }

        Ok(result)
    }

    /// Approve a pending request and check the component out to the requester
    pub async fn approve(&self, id: Uuid, admin: Actor) -> AppResult<ApprovedRequest> {
        let request = self.load_pending(id).await?;

        let component = self.components.load(request.component_id).await?;
        if !component.is_available() {
            return Err(AppError::InvalidState(format!(
                "Component is no longer available. Current status: {}",
                component.status
            )));
        }

        let requester = self
            .repository
            .users
            .get_by_id(request.user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;

        let days = if request.requested_days > 0 {
            request.requested_days
        } else {
            component.checkout_duration
        };

        // Claimed before the checkout; a failed checkout reopens it
        let request = self
            .repository
            .requests
            .decide(
                id,
                &RequestDecision {
                    status: RequestStatus::Approved,
                    responded_at: self.clock.now(),
                    responded_by: admin.id,
                    rejection_reason: None,
                },
            )
            .await?
            .ok_or_else(|| AppError::InvalidState("Request already processed".to_string()))?;

        let component = match self
            .components
            .perform_checkout(&component, &requester, days, request.notes.clone())
            .await
        {
            Ok(component) => component,
            Err(e) => {
                self.reopen(id).await;
                if let AppError::InvalidState(_) = e {
                    let current = self.components.load(request.component_id).await?;
                    return Err(AppError::InvalidState(format!(
                        "Component is no longer available. Current status: {}",
                        current.status
                    )));
                }
                return Err(e);
            }
        };

        tracing::info!(
            request_id = %request.id,
            code = %component.component_code,
            borrower = %requester.username,
            "Request approved"
        );

        Ok(ApprovedRequest {
            request,
            component: ComponentDetails {
                component,
                current_borrower_details: Some(BorrowerDetails::summary(&requester)),
            },
        })
    }

    /// Reject a pending request, notifying the requester
    pub async fn reject(
        &self,
        id: Uuid,
        admin: Actor,
        reason: Option<String>,
    ) -> AppResult<ComponentRequest> {
        self.load_pending(id).await?;

        let reason = reason
            .map(|r| r.trim().to_string())
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| DEFAULT_REJECTION_REASON.to_string());

        let request = self
            .repository
            .requests
            .decide(
                id,
                &RequestDecision {
                    status: RequestStatus::Rejected,
                    responded_at: self.clock.now(),
                    responded_by: admin.id,
                    rejection_reason: Some(reason.clone()),
                },
            )
            .await?
            .ok_or_else(|| AppError::InvalidState("Request already processed".to_string()))?;

        tracing::info!(request_id = %request.id, "Request rejected");

        let requester = self.repository.users.get_by_id(request.user_id).await;
        let component = self.repository.components.get_by_id(request.component_id).await;
        match (requester, component) {
            (Ok(Some(requester)), Ok(Some(component))) => self.queue.enqueue(
                requester,
                component,
                NotificationKind::RequestRejected { reason },
            ),
            _ => tracing::warn!(request_id = %request.id, "Skipping rejection notification"),
        }

        Ok(request)
    }

    /// Withdraw a pending request. Owner or admin only.
    pub async fn cancel(&self, id: Uuid, actor: Actor) -> AppResult<()> {
        let request = self
            .repository
            .requests
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Request not found".to_string()))?;

        if request.user_id != actor.id && !actor.is_admin() {
            return Err(AppError::Forbidden("Access denied".to_string()));
        }
        if !request.is_pending() {
            return Err(AppError::InvalidState(
                "Can only cancel pending requests".to_string(),
            ));
        }

        if !self.repository.requests.delete_pending(id).await? {
            return Err(AppError::InvalidState(
                "Can only cancel pending requests".to_string(),
            ));
        }

        tracing::info!(request_id = %id, "Request cancelled");
        Ok(())
    }

    /// Put a claimed request back to pending after its checkout failed
    async fn reopen(&self, id: Uuid) {
        match self.repository.requests.reopen(id).await {
            Ok(true) => tracing::info!(request_id = %id, "Approval rolled back"),
            Ok(false) => tracing::warn!(request_id = %id, "Approved request changed before rollback"),
            Err(e) => tracing::error!(request_id = %id, "Failed to roll back approval: {}", e),
        }
    }

    async fn load_pending(&self, id: Uuid) -> AppResult<ComponentRequest> {
        let request = self
            .repository
            .requests
            .get_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound("Request not found".to_string()))?;

        if !request.is_pending() {
            return Err(AppError::InvalidState("Request already processed".to_string()));
        }
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::{
            component::CheckoutFields, ComponentStatus, HistoryAction, NotificationStatus,
            NotificationType,
        },
        repository::{memory::MemoryStore, ComponentsRepository, RequestsRepository},
        services::{email::MockEmailTransport, testing::Fixture},
    };
    use async_trait::async_trait;
    use chrono::Duration;
    use std::sync::Mutex;

    /// What happens concurrently when the next request decision is written
    enum Race {
        Cancel,
        CheckoutTo(Uuid),
    }

    struct RacingRequests {
        store: Arc<MemoryStore>,
        race: Mutex<Option<Race>>,
    }

    #[async_trait]
    impl RequestsRepository for RacingRequests {
        async fn create(&self, data: &NewRequest) -> AppResult<ComponentRequest> {
            RequestsRepository::create(&*self.store, data).await
        }

        async fn get_by_id(&self, id: Uuid) -> AppResult<Option<ComponentRequest>> {
            RequestsRepository::get_by_id(&*self.store, id).await
        }

        async fn list(&self, filter: &RequestFilter) -> AppResult<Vec<ComponentRequest>> {
            RequestsRepository::list(&*self.store, filter).await
        }

        async fn decide(
            &self,
            id: Uuid,
            decision: &RequestDecision,
        ) -> AppResult<Option<ComponentRequest>> {
            let race = self.race.lock().unwrap().take();
            match race {
                Some(Race::Cancel) => {
                    self.store.delete_pending(id).await?;
                    self.store.decide(id, decision).await
                }
                Some(Race::CheckoutTo(borrower)) => {
                    let decided = self.store.decide(id, decision).await?;
                    if let Some(request) = &decided {
                        let now = decision.responded_at;
                        self.store
                            .mark_checked_out(
                                request.component_id,
                                CheckoutFields {
                                    borrower,
                                    checked_out_at: now,
                                    due_date: now + Duration::days(7),
                                },
                            )
                            .await?;
                    }
                    Ok(decided)
                }
                None => self.store.decide(id, decision).await,
            }
        }

        async fn reopen(&self, id: Uuid) -> AppResult<bool> {
            self.store.reopen(id).await
        }

        async fn delete_pending(&self, id: Uuid) -> AppResult<bool> {
            self.store.delete_pending(id).await
        }

        async fn count_pending(&self) -> AppResult<i64> {
            self.store.count_pending().await
        }

        async fn delete_all(&self) -> AppResult<u64> {
            RequestsRepository::delete_all(&*self.store).await
        }
    }

    async fn racing_fixture() -> (Fixture, Arc<RacingRequests>) {
        let store = Arc::new(MemoryStore::default());
        let racing = Arc::new(RacingRequests {
            store: store.clone(),
            race: Mutex::new(None),
        });
        let mut repository = Repository::from_store(store);
        repository.requests = racing.clone() as Arc<dyn RequestsRepository>;
        (Fixture::with_repository(ok_transport(), repository).await, racing)
    }

    fn ok_transport() -> MockEmailTransport {
        let mut transport = MockEmailTransport::new();
        transport.expect_send().returning(|_, _, _| Ok(()));
        transport
    }

    fn ask(component_id: Uuid, days: Option<i32>) -> CreateRequest {
        CreateRequest {
            component_id,
            notes: Some("line follower".to_string()),
            requested_days: days,
        }
    }

    #[tokio::test]
    async fn test_create_notifies_every_admin() {
        let mut fx = Fixture::new(ok_transport()).await;
        let component = fx.component("SENS-001").await;

        let request = fx
            .services
            .requests
            .create(fx.member1.actor(), ask(component.id, None))
            .await
            .unwrap();
        assert_eq!(request.status, RequestStatus::Pending);
        assert_eq!(request.requested_days, 7);

        assert_eq!(fx.drain().await, 2);
        for admin in [&fx.admin, &fx.admin2] {
            let logs = fx.logs(admin.id).await;
            assert_eq!(logs.len(), 1);
            assert_eq!(logs[0].notification_type, NotificationType::ComponentRequest);
        }
    }

    #[tokio::test]
    async fn test_duplicate_pending_request_conflicts() {
        let fx = Fixture::new(ok_transport()).await;
        let component = fx.component("SENS-001").await;

        fx.services
            .requests
            .create(fx.member1.actor(), ask(component.id, Some(3)))
            .await
            .unwrap();
        let result = fx
            .services
            .requests
            .create(fx.member1.actor(), ask(component.id, Some(3)))
            .await;
        assert!(matches!(result, Err(AppError::Conflict(_))));

        // A different member may still ask
        assert!(fx
            .services
            .requests
            .create(fx.member2.actor(), ask(component.id, None))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_request_for_taken_component_is_rejected() {
        let fx = Fixture::new(ok_transport()).await;
        let component = fx.component("SENS-001").await;
        fx.services
            .components
            .checkout(component.id, fx.member2.actor(), None)
            .await
            .unwrap();

        let result = fx
            .services
            .requests
            .create(fx.member1.actor(), ask(component.id, None))
            .await;
        assert!(
            matches!(result, Err(AppError::InvalidState(msg)) if msg == "Component is not available. Current status: taken")
        );
    }

    #[tokio::test]
    async fn test_approve_checks_out_with_requested_days() {
        let mut fx = Fixture::new(ok_transport()).await;
        let component = fx.component("SENS-001").await;
        let request = fx
            .services
            .requests
            .create(fx.member1.actor(), ask(component.id, Some(3)))
            .await
            .unwrap();

        let approved = fx
            .services
            .requests
            .approve(request.id, fx.admin.actor())
            .await
            .unwrap();
        assert_eq!(approved.request.status, RequestStatus::Approved);
        assert_eq!(approved.request.responded_by, Some(fx.admin.id));
        assert_eq!(approved.component.component.status, ComponentStatus::Taken);
        assert_eq!(
            approved.component.component.due_date,
            Some(fx.clock.now() + chrono::Duration::days(3))
        );

        let history = fx.services.components.history(component.id).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].record.action, HistoryAction::Checkout);
        assert_eq!(history[0].record.user_id, fx.member1.id);

        fx.drain().await;
        let logs = fx.logs(fx.member1.id).await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].notification_type, NotificationType::Checkout);
        assert_eq!(logs[0].status, NotificationStatus::Sent);

        let again = fx.services.requests.approve(request.id, fx.admin.actor()).await;
        assert!(matches!(again, Err(AppError::InvalidState(msg)) if msg == "Request already processed"));
    }

    #[tokio::test]
    async fn test_approve_unavailable_component_keeps_request_pending() {
        let fx = Fixture::new(ok_transport()).await;
        let component = fx.component("SENS-001").await;
        let request = fx
            .services
            .requests
            .create(fx.member1.actor(), ask(component.id, None))
            .await
            .unwrap();
        fx.services
            .components
            .checkout(component.id, fx.member2.actor(), None)
            .await
            .unwrap();

        let result = fx.services.requests.approve(request.id, fx.admin.actor()).await;
        assert!(matches!(
            result,
            Err(AppError::InvalidState(msg)) if msg == "Component is no longer available. Current status: taken"
        ));

        let stored = fx.repository.requests.get_by_id(request.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Pending);
        let history = fx.services.components.history(component.id).await.unwrap();
        assert_eq!(history.len(), 1);
    }

    #[tokio::test]
    async fn test_reject_defaults_reason_and_notifies() {
        let mut fx = Fixture::new(ok_transport()).await;
        let component = fx.component("SENS-001").await;
        let request = fx
            .services
            .requests
            .create(fx.member1.actor(), ask(component.id, None))
            .await
            .unwrap();
        fx.drain().await;

        let rejected = fx
            .services
            .requests
            .reject(request.id, fx.admin.actor(), Some("  ".to_string()))
            .await
            .unwrap();
        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("No reason provided"));

        fx.drain().await;
        let logs = fx.logs(fx.member1.id).await;
        assert_eq!(logs[0].notification_type, NotificationType::RequestRejected);

        let component = fx.services.components.get(component.id).await.unwrap();
        assert_eq!(component.component.status, ComponentStatus::Available);
    }

    #[tokio::test]
    async fn test_cancel_rules() {
        let fx = Fixture::new(ok_transport()).await;
        let component = fx.component("SENS-001").await;
        let request = fx
            .services
            .requests
            .create(fx.member1.actor(), ask(component.id, None))
            .await
            .unwrap();

        let result = fx.services.requests.cancel(request.id, fx.member2.actor()).await;
        assert!(matches!(result, Err(AppError::Forbidden(_))));

        fx.services
            .requests
            .cancel(request.id, fx.member1.actor())
            .await
            .unwrap();
        let result = fx.services.requests.cancel(request.id, fx.member1.actor()).await;
        assert!(matches!(result, Err(AppError::NotFound(_))));

        let decided = fx
            .services
            .requests
            .create(fx.member1.actor(), ask(component.id, None))
            .await
            .unwrap();
        fx.services
            .requests
            .reject(decided.id, fx.admin.actor(), None)
            .await
            .unwrap();
        let result = fx.services.requests.cancel(decided.id, fx.member1.actor()).await;
        assert!(matches!(result, Err(AppError::InvalidState(_))));
    }

    #[tokio::test]
    async fn test_members_only_list_their_own() {
        let fx = Fixture::new(ok_transport()).await;
        let first = fx.component("SENS-001").await;
        let second = fx.component("SENS-002").await;
        fx.services
            .requests
            .create(fx.member1.actor(), ask(first.id, None))
            .await
            .unwrap();
        fx.clock.advance(chrono::Duration::minutes(5));
        fx.services
            .requests
            .create(fx.member2.actor(), ask(second.id, None))
            .await
            .unwrap();

        let mine = fx
            .services
            .requests
            .list(fx.member1.actor(), RequestQuery::default())
            .await
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].user.as_ref().map(|u| u.id), Some(fx.member1.id));

        let all = fx
            .services
            .requests
            .list(fx.admin.actor(), RequestQuery::default())
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].request.user_id, fx.member2.id);
        assert_eq!(
            all[0].component.as_ref().map(|c| c.component_code.as_str()),
            Some("SENS-002")
        );
    }

    #[tokio::test]
    async fn test_approve_losing_to_cancel_leaves_component_alone() {
        let (mut fx, racing) = racing_fixture().await;
        let component = fx.component("SENS-001").await;
        let request = fx
            .services
            .requests
            .create(fx.member1.actor(), ask(component.id, None))
            .await
            .unwrap();

        *racing.race.lock().unwrap() = Some(Race::Cancel);
        let result = fx.services.requests.approve(request.id, fx.admin.actor()).await;
        assert!(matches!(
            result,
            Err(AppError::InvalidState(msg)) if msg == "Request already processed"
        ));

        let stored = fx.services.components.get(component.id).await.unwrap().component;
        assert_eq!(stored.status, ComponentStatus::Available);
        assert_eq!(stored.current_borrower, None);
        assert!(fx.services.components.history(component.id).await.unwrap().is_empty());

        // Only the two admin notifications from the request itself
        assert_eq!(fx.drain().await, 2);
        assert!(fx.logs(fx.member1.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_approve_losing_checkout_reopens_request() {
        let (fx, racing) = racing_fixture().await;
        let component = fx.component("SENS-001").await;
        let request = fx
            .services
            .requests
            .create(fx.member1.actor(), ask(component.id, None))
            .await
            .unwrap();

        *racing.race.lock().unwrap() = Some(Race::CheckoutTo(fx.member2.id));
        let result = fx.services.requests.approve(request.id, fx.admin.actor()).await;
        assert!(matches!(
            result,
            Err(AppError::InvalidState(msg)) if msg == "Component is no longer available. Current status: taken"
        ));

        let stored = fx.repository.requests.get_by_id(request.id).await.unwrap().unwrap();
        assert_eq!(stored.status, RequestStatus::Pending);
        assert_eq!(stored.responded_at, None);
        assert_eq!(stored.responded_by, None);

        let component = fx.services.components.get(component.id).await.unwrap().component;
        assert_eq!(component.current_borrower, Some(fx.member2.id));
        assert!(fx.services.components.history(component.id).await.unwrap().is_empty());
    }
}
