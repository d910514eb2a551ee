//! Notification dispatcher, background queue and retry sweep

use std::sync::Arc;

use tokio::sync::mpsc;
use uuid::Uuid;

use crate::{
    clock::Clock,
    config::NotificationsConfig,
    error::AppResult,
    models::{
        notification::{
            DispatchOutcome, NewNotificationLog, NotificationChannel, NotificationJob, RetryReport,
        },
        Component, NotificationKind, NotificationLog, User,
    },
    repository::Repository,
};

use super::email::{render, EmailTransport};

#[derive(Clone)]
pub struct NotificationService {
    repository: Repository,
    transport: Arc<dyn EmailTransport>,
    clock: Arc<dyn Clock>,
    config: NotificationsConfig,
}

impl NotificationService {
    pub fn new(
        repository: Repository,
        transport: Arc<dyn EmailTransport>,
        clock: Arc<dyn Clock>,
        config: NotificationsConfig,
    ) -> Self {
        Self {
            repository,
            transport,
            clock,
            config,
        }
    }

    /// Deliver one notification and record the attempt.
    ///
    /// Never fails: storage and transport errors are logged and reported in the outcome.
    pub async fn dispatch(
        &self,
        recipient: &User,
        component: &Component,
        kind: &NotificationKind,
    ) -> DispatchOutcome {
        if !recipient.notification_preferences.email {
            tracing::debug!(
                user = %recipient.username,
                kind = %kind.notification_type(),
                "Email notifications disabled for user, skipping"
            );
            return DispatchOutcome::Skipped;
        }

        let payload = match serde_json::to_value(kind) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::error!("Failed to serialize notification payload: {}", e);
                return DispatchOutcome::Failed {
                    log_id: None,
                    error: e.to_string(),
                };
            }
        };

        let log = match self
            .repository
            .notifications
            .create(&NewNotificationLog {
                user_id: recipient.id,
                component_id: component.id,
                notification_type: kind.notification_type(),
                channel: NotificationChannel::Email,
                payload,
                created_at: self.clock.now(),
            })
            .await
        {
            Ok(log) => log,
            Err(e) => {
                tracing::error!("Failed to create notification log: {}", e);
                return DispatchOutcome::Failed {
                    log_id: None,
                    error: e.to_string(),
                };
            }
        };

        match self.deliver(recipient, component, kind).await {
            Ok(()) => {
                self.record_sent(log.id, log.attempts).await;
                tracing::info!(
                    to = %recipient.email,
                    kind = %log.notification_type,
                    "Notification sent"
                );
                DispatchOutcome::Sent { log_id: log.id }
            }
            Err(error) => {
                self.record_failed(log.id, log.attempts + 1, &error).await;
                tracing::warn!(
                    to = %recipient.email,
                    kind = %log.notification_type,
                    "Notification failed: {}",
                    error
                );
                DispatchOutcome::Failed {
                    log_id: Some(log.id),
                    error,
                }
            }
        }
    }

    /// Re-attempt failed deliveries that are still under the attempt cap
    pub async fn retry_failed(&self) -> AppResult<RetryReport> {
        let logs = self
            .repository
            .notifications
            .list_retryable(self.config.max_attempts, self.config.retry_batch_size)
            .await?;

        let mut report = RetryReport {
            selected: logs.len(),
            ..RetryReport::default()
        };

        for log in logs {
            match self.retry_one(&log).await {
                Some(true) => report.sent += 1,
                Some(false) => report.failed += 1,
                None => report.skipped += 1,
            }
        }

        if report.selected > 0 {
            tracing::info!(
                selected = report.selected,
                sent = report.sent,
                failed = report.failed,
                skipped = report.skipped,
                "Notification retry sweep finished"
            );
        }

        Ok(report)
    }

    /// `None` when the log cannot be retried, otherwise whether delivery succeeded
    async fn retry_one(&self, log: &NotificationLog) -> Option<bool> {
        let user = match self.repository.users.get_by_id(log.user_id).await {
            Ok(user) => user?,
            Err(e) => {
                tracing::warn!(log_id = %log.id, "Failed to load notification recipient: {}", e);
                return None;
            }
        };
        let component = match self.repository.components.get_by_id(log.component_id).await {
            Ok(component) => component?,
            Err(e) => {
                tracing::warn!(log_id = %log.id, "Failed to load notification component: {}", e);
                return None;
            }
        };

        if log.channel != NotificationChannel::Email {
            return None;
        }

        let kind: NotificationKind = match serde_json::from_value(log.payload.clone()) {
            Ok(kind) => kind,
            Err(e) => {
                tracing::warn!(log_id = %log.id, "Unreadable notification payload: {}", e);
                return None;
            }
        };

        let attempts = log.attempts + 1;
        match self.deliver(&user, &component, &kind).await {
            Ok(()) => {
                self.record_sent(log.id, attempts).await;
                Some(true)
            }
            Err(error) => {
                self.record_failed(log.id, attempts, &error).await;
                Some(false)
            }
        }
    }

    async fn deliver(
        &self,
        recipient: &User,
        component: &Component,
        kind: &NotificationKind,
    ) -> Result<(), String> {
        let message = render(recipient, component, kind);
        self.transport
            .send(&recipient.email, &message.subject, &message.body)
            .await
            .map_err(|e| e.to_string())
    }

    async fn record_sent(&self, id: Uuid, attempts: i32) {
        if let Err(e) = self
            .repository
            .notifications
            .mark_sent(id, self.clock.now(), attempts)
            .await
        {
            tracing::error!(log_id = %id, "Failed to mark notification sent: {}", e);
        }
    }

    async fn record_failed(&self, id: Uuid, attempts: i32, error: &str) {
        if let Err(e) = self
            .repository
            .notifications
            .mark_failed(id, attempts, error)
            .await
        {
            tracing::error!(log_id = %id, "Failed to mark notification failed: {}", e);
        }
    }

    /// Notification log of one user, newest first
    pub async fn logs_for_user(&self, user_id: Uuid) -> AppResult<Vec<NotificationLog>> {
        self.repository.notifications.by_user(user_id).await
    }
}

/// Sending half of the notification queue, held by the services that change state
#[derive(Clone)]
pub struct NotificationQueue {
    tx: mpsc::UnboundedSender<NotificationJob>,
}

impl NotificationQueue {
    /// Create a queue and the worker that drains it
    pub fn channel(service: NotificationService) -> (Self, NotificationWorker) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, NotificationWorker { rx, service })
    }

    /// Hand a job to the worker without waiting for delivery
    pub fn enqueue(&self, recipient: User, component: Component, kind: NotificationKind) {
        let job = NotificationJob {
            recipient,
            component,
            kind,
        };
        if let Err(e) = self.tx.send(job) {
            tracing::warn!(
                kind = %e.0.kind.notification_type(),
                "Notification worker is gone, dropping notification"
            );
        }
    }
}

/// Receives queued jobs and dispatches them one by one
pub struct NotificationWorker {
    rx: mpsc::UnboundedReceiver<NotificationJob>,
    service: NotificationService,
}

impl NotificationWorker {
    /// Run until every queue handle has been dropped
    pub async fn run(mut self) {
        tracing::info!("Notification worker started");
        while let Some(job) = self.rx.recv().await {
            self.service
                .dispatch(&job.recipient, &job.component, &job.kind)
                .await;
        }
        tracing::info!("Notification worker stopped");
    }

    /// Dispatch whatever is queued right now and return how many jobs ran
    pub async fn drain(&mut self) -> usize {
        let mut count = 0;
        while let Ok(job) = self.rx.try_recv() {
            self.service
                .dispatch(&job.recipient, &job.component, &job.kind)
                .await;
            count += 1;
        }
        count
    }
}
