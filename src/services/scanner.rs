//! Overdue scanner: due-soon reminders and overdue reclassification

use std::sync::Arc;

use chrono::Duration;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    clock::{ceil_days, Clock},
    error::AppResult,
    models::{
        component::ComponentFilter, notification::DispatchOutcome, Component, ComponentStatus,
        NotificationKind,
    },
    repository::Repository,
};

use super::notifications::NotificationService;

/// Summary of one scan
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    /// Taken components due within the next day
    pub due_soon: usize,
    /// Components past their due date
    pub overdue: usize,
    /// Components moved from taken to overdue by this scan
    pub newly_overdue: usize,
    pub notifications_sent: usize,
    pub notifications_failed: usize,
}

impl ScanReport {
    fn count(&mut self, outcome: &DispatchOutcome) {
        match outcome {
            DispatchOutcome::Sent { .. } => self.notifications_sent += 1,
            DispatchOutcome::Failed { .. } => self.notifications_failed += 1,
            DispatchOutcome::Skipped => {}
        }
    }
}

#[derive(Clone)]
pub struct OverdueScanner {
    repository: Repository,
    clock: Arc<dyn Clock>,
    notifications: NotificationService,
}

impl OverdueScanner {
    pub fn new(
        repository: Repository,
        clock: Arc<dyn Clock>,
        notifications: NotificationService,
    ) -> Self {
        Self {
            repository,
            clock,
            notifications,
        }
    }

    /// Run one sweep over every component.
    ///
    /// A failure on one component is logged and the sweep moves on.
    pub async fn run(&self) -> AppResult<ScanReport> {
        let now = self.clock.now();
        let components = self
            .repository
            .components
            .list(&ComponentFilter::default())
            .await?;

        let mut report = ScanReport::default();

        for component in components.iter().filter(|c| c.is_due_within(now, Duration::days(1))) {
            report.due_soon += 1;
            if let Some(outcome) = self.notify(component, NotificationKind::DueSoon).await {
                report.count(&outcome);
            }
        }

        for component in components.iter().filter(|c| c.is_past_due(now)) {
            report.overdue += 1;

            let mut component = component.clone();
            if component.status == ComponentStatus::Taken {
                match self.repository.components.mark_overdue(component.id, now).await {
                    Ok(true) => {
                        component.status = ComponentStatus::Overdue;
                        report.newly_overdue += 1;
                    }
                    Ok(false) => {}
                    Err(e) => {
                        tracing::error!(
                            code = %component.component_code,
                            "Failed to mark component overdue: {}",
                            e
                        );
                        continue;
                    }
                }
            }

            let days_overdue = component
                .due_date
                .map(|due| ceil_days(now - due))
                .unwrap_or(0);
            if let Some(outcome) = self
                .notify(&component, NotificationKind::OverdueReminder { days_overdue })
                .await
            {
                report.count(&outcome);
            }
        }

        tracing::info!(
            due_soon = report.due_soon,
            overdue = report.overdue,
            newly_overdue = report.newly_overdue,
            sent = report.notifications_sent,
            failed = report.notifications_failed,
            "Overdue scan finished"
        );

        Ok(report)
    }

    async fn notify(&self, component: &Component, kind: NotificationKind) -> Option<DispatchOutcome> {
        let borrower_id = component.current_borrower?;
        match self.repository.users.get_by_id(borrower_id).await {
            Ok(Some(borrower)) => Some(self.notifications.dispatch(&borrower, component, &kind).await),
            Ok(None) => {
                tracing::warn!(code = %component.component_code, "Borrower no longer exists");
                None
            }
            Err(e) => {
                tracing::error!(
                    code = %component.component_code,
                    "Failed to load borrower: {}",
                    e
                );
                None
            }
        }
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
    async fn test_due_soon_leaves_state_alone() {
        let mut fx = Fixture::new(ok_transport()).await;
        let component = fx.component("ARD-001").await;
        fx.services
            .components
            .checkout(component.id, fx.member1.actor(), None)
            .await
            .unwrap();
        fx.drain().await;

        fx.clock.advance(Duration::days(6) + Duration::hours(12));
        let report = fx.services.scanner.run().await.unwrap();
        assert_eq!(report.due_soon, 1);
        assert_eq!(report.overdue, 0);

        let stored = fx.services.components.get(component.id).await.unwrap();
        assert_eq!(stored.component.status, ComponentStatus::Taken);

        let logs = fx.logs(fx.member1.id).await;
        assert_eq!(logs[0].notification_type, NotificationType::DueSoon);
    }

    #[tokio::test]
    async fn test_overdue_reclassified_once_but_reminded_each_scan() {
        let mut fx = Fixture::new(ok_transport()).await;
        let component = fx.component("ARD-001").await;
        fx.services
            .components
            .checkout(component.id, fx.member1.actor(), None)
            .await
            .unwrap();
        fx.drain().await;

        fx.clock.advance(Duration::days(9));
        let first = fx.services.scanner.run().await.unwrap();
        assert_eq!(first.overdue, 1);
        assert_eq!(first.newly_overdue, 1);
        assert_eq!(first.notifications_sent, 1);

        let stored = fx.services.components.get(component.id).await.unwrap();
        assert_eq!(stored.component.status, ComponentStatus::Overdue);
        assert_eq!(stored.component.current_borrower, Some(fx.member1.id));
        assert!(stored.component.due_date.is_some());

        let second = fx.services.scanner.run().await.unwrap();
        assert_eq!(second.overdue, 1);
        assert_eq!(second.newly_overdue, 0);

        let reminders: Vec<_> = fx
            .logs(fx.member1.id)
            .await
            .into_iter()
            .filter(|l| l.notification_type == NotificationType::OverdueReminder)
            .collect();
        assert_eq!(reminders.len(), 2);
        assert!(reminders.iter().all(|l| l.status == NotificationStatus::Sent));
        assert_eq!(reminders[0].payload["days_overdue"], 2);
    }

    #[tokio::test]
    async fn test_failed_sends_do_not_stop_the_scan() {
        let mut transport = MockEmailTransport::new();
        transport.expect_send().returning(|to, _, _| {
            if to.starts_with("member1") {
                Err(crate::error::AppError::External("mailbox full".to_string()))
            } else {
                Ok(())
            }
        });
        let fx = Fixture::new(transport).await;
        let first = fx.component("ARD-001").await;
        let second = fx.component("ARD-002").await;
        fx.services
            .components
            .checkout(first.id, fx.member1.actor(), None)
            .await
            .unwrap();
        fx.services
            .components
            .checkout(second.id, fx.member2.actor(), None)
            .await
            .unwrap();

        fx.clock.advance(Duration::days(10));
        let report = fx.services.scanner.run().await.unwrap();
        assert_eq!(report.overdue, 2);
        assert_eq!(report.newly_overdue, 2);
        assert_eq!(report.notifications_sent, 1);
        assert_eq!(report.notifications_failed, 1);
    }

    #[tokio::test]
    async fn test_overdue_write_skips_a_fresh_loan() {
        let mut fx = Fixture::new(ok_transport()).await;
        let component = fx.component("ARD-001").await;
        fx.services
            .components
            .checkout(component.id, fx.member1.actor(), None)
            .await
            .unwrap();

        fx.clock.advance(Duration::days(9));
        let snapshot = fx
            .repository
            .components
            .list(&ComponentFilter::default())
            .await
            .unwrap();
        assert!(snapshot[0].is_past_due(fx.clock.now()));

        // Returned and borrowed again after the scan listed it
        fx.services
            .components
            .return_component(component.id, fx.member1.actor(), None)
            .await
            .unwrap();
        fx.services
            .components
            .checkout(component.id, fx.member2.actor(), None)
            .await
            .unwrap();
        fx.drain().await;

        let marked = fx
            .repository
            .components
            .mark_overdue(component.id, fx.clock.now())
            .await
            .unwrap();
        assert!(!marked);

        let stored = fx.services.components.get(component.id).await.unwrap();
        assert_eq!(stored.component.status, ComponentStatus::Taken);
        assert_eq!(stored.component.current_borrower, Some(fx.member2.id));
    }
}
