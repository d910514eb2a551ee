//! Dashboard statistics

use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    clock::Clock,
    error::AppResult,
    models::{
        component::{BorrowerDetails, ComponentFilter},
        history::HistoryDetails,
        Actor, ComponentDetails, ComponentStatus, User, UserShort,
    },
    repository::Repository,
};

use super::components::ComponentsService;

const RECENT_ACTIVITY: i64 = 10;
const TOP_BORROWERS: i64 = 5;

#[derive(Debug, Clone, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentCounts {
    pub total: usize,
    pub available: usize,
    pub taken: usize,
    pub overdue: usize,
    /// Always 0 for members
    pub pending_requests: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct TopBorrower {
    pub user: Option<UserShort>,
    pub checkout_count: i64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub stats: ComponentCounts,
    pub recent_activity: Vec<HistoryDetails>,
    pub due_soon_components: Vec<ComponentDetails>,
    /// Empty for members
    pub top_borrowers: Vec<TopBorrower>,
}

#[derive(Clone)]
pub struct DashboardService {
    repository: Repository,
    clock: Arc<dyn Clock>,
    components: ComponentsService,
}

impl DashboardService {
    pub fn new(repository: Repository, clock: Arc<dyn Clock>, components: ComponentsService) -> Self {
        Self {
            repository,
            clock,
            components,
        }
    }

    pub async fn stats(&self, actor: Actor) -> AppResult<DashboardStats> {
        let now = self.clock.now();
        let all = self
            .repository
            .components
            .list(&ComponentFilter::default())
            .await?;

        let count = |status: ComponentStatus| all.iter().filter(|c| c.status == status).count();
        let mut counts = ComponentCounts {
            total: all.len(),
            available: count(ComponentStatus::Available),
            taken: count(ComponentStatus::Taken),
            overdue: count(ComponentStatus::Overdue),
            pending_requests: 0,
        };

        let recent = self.repository.history.recent(RECENT_ACTIVITY).await?;
        let recent_activity = self.components.history_details(recent, true).await?;

        let mut due_soon: Vec<_> = all
            .into_iter()
            .filter(|c| c.is_due_within(now, Duration::days(2)))
            .collect();
        due_soon.sort_by_key(|c| c.due_date);

        let mut due_soon_components = Vec::with_capacity(due_soon.len());
        for component in due_soon {
            let borrower = match component.current_borrower {
                Some(id) => self.repository.users.get_by_id(id).await?,
                None => None,
            };
            due_soon_components.push(ComponentDetails {
                current_borrower_details: borrower.as_ref().map(BorrowerDetails::summary),
                component,
            });
        }

        let mut top_borrowers = Vec::new();
        if actor.is_admin() {
            counts.pending_requests = self.repository.requests.count_pending().await?;
            for (user_id, checkout_count) in
                self.repository.history.top_borrowers(TOP_BORROWERS).await?
            {
                let user = self.repository.users.get_by_id(user_id).await?;
                top_borrowers.push(TopBorrower {
                    user: user.as_ref().map(User::short),
                    checkout_count,
                });
            }
        }

        Ok(DashboardStats {
            stats: counts,
            recent_activity,
            due_soon_components,
            top_borrowers,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        models::request::CreateRequest,
        services::{email::MockEmailTransport, testing::Fixture},
    };

    #[tokio::test]
    async fn test_stats_for_admin_and_member() {
        let mut transport = MockEmailTransport::new();
        transport.expect_send().returning(|_, _, _| Ok(()));
        let fx = Fixture::new(transport).await;

        let uno = fx.component("ARD-001").await;
        let mega = fx.component("ARD-002").await;
        let sensor = fx.component("SENS-001").await;

        fx.services
            .components
            .checkout(uno.id, fx.member1.actor(), None)
            .await
            .unwrap();
        fx.services
            .components
            .return_component(uno.id, fx.member1.actor(), None)
            .await
            .unwrap();
        fx.services
            .components
            .checkout(mega.id, fx.member1.actor(), None)
            .await
            .unwrap();
        fx.services
            .requests
            .create(
                fx.member2.actor(),
                CreateRequest {
                    component_id: sensor.id,
                    notes: None,
                    requested_days: None,
                },
            )
            .await
            .unwrap();

        fx.clock.advance(Duration::days(6));

        let admin = fx.services.dashboard.stats(fx.admin.actor()).await.unwrap();
        assert_eq!(admin.stats.total, 3);
        assert_eq!(admin.stats.available, 2);
        assert_eq!(admin.stats.taken, 1);
        assert_eq!(admin.stats.pending_requests, 1);
        assert_eq!(admin.recent_activity.len(), 3);
        assert_eq!(admin.due_soon_components.len(), 1);
        assert_eq!(admin.due_soon_components[0].component.id, mega.id);
        assert_eq!(admin.top_borrowers.len(), 1);
        assert_eq!(admin.top_borrowers[0].checkout_count, 2);

        let member = fx.services.dashboard.stats(fx.member2.actor()).await.unwrap();
        assert_eq!(member.stats.pending_requests, 0);
        assert!(member.top_borrowers.is_empty());
    }
}
