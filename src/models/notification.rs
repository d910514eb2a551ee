//! Notification log model and notification kinds

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{Component, User, UserShort};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    Checkout,
    Return,
    OverdueReminder,
    DueSoon,
    ComponentRequest,
    RequestRejected,
}

text_enum!(NotificationType {
    Checkout => "checkout",
    Return => "return",
    OverdueReminder => "overdue_reminder",
    DueSoon => "due_soon",
    ComponentRequest => "component_request",
    RequestRejected => "request_rejected",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum NotificationChannel {
    Email,
}

text_enum!(NotificationChannel {
    Email => "email",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Pending,
    Sent,
    Failed,
}

text_enum!(NotificationStatus {
    Pending => "pending",
    Sent => "sent",
    Failed => "failed",
});

/// What a notification says, with the data needed to render it again on retry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationKind {
    Checkout,
    Return {
        duration_days: i64,
    },
    OverdueReminder {
        days_overdue: i64,
    },
    DueSoon,
    /// Sent to an admin about a member's request
    ComponentRequest {
        member: UserShort,
        notes: String,
        requested_days: i32,
    },
    RequestRejected {
        reason: String,
    },
}

impl NotificationKind {
    pub fn notification_type(&self) -> NotificationType {
        match self {
            NotificationKind::Checkout => NotificationType::Checkout,
            NotificationKind::Return { .. } => NotificationType::Return,
            NotificationKind::OverdueReminder { .. } => NotificationType::OverdueReminder,
            NotificationKind::DueSoon => NotificationType::DueSoon,
            NotificationKind::ComponentRequest { .. } => NotificationType::ComponentRequest,
            NotificationKind::RequestRejected { .. } => NotificationType::RequestRejected,
        }
    }
}

/// One persisted delivery record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct NotificationLog {
    pub id: Uuid,
    /// Recipient
    pub user_id: Uuid,
    pub component_id: Uuid,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub notification_type: NotificationType,
    pub channel: NotificationChannel,
    pub status: NotificationStatus,
    pub attempts: i32,
    pub error_message: String,
    /// Serialized `NotificationKind`
    #[schema(value_type = Object)]
    pub payload: serde_json::Value,
    pub sent_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewNotificationLog {
    pub user_id: Uuid,
    pub component_id: Uuid,
    pub notification_type: NotificationType,
    pub channel: NotificationChannel,
    pub payload: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A notification handed from a state transition to the background worker
#[derive(Debug, Clone)]
pub struct NotificationJob {
    pub recipient: User,
    pub component: Component,
    pub kind: NotificationKind,
}

/// Result of a single dispatch; dispatching never returns an error
#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum DispatchOutcome {
    /// Recipient opted out of email
    Skipped,
    Sent { log_id: Uuid },
    Failed { log_id: Option<Uuid>, error: String },
}

/// Summary of one retry sweep
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct RetryReport {
    pub selected: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
}
