//! Component request model (member asks, admin decides)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::{component::ComponentShort, UserShort};

pub const DEFAULT_REJECTION_REASON: &str = "No reason provided";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

text_enum!(RequestStatus {
    Pending => "pending",
    Approved => "approved",
    Rejected => "rejected",
});

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRequest {
    pub id: Uuid,
    pub user_id: Uuid,
    /// Storage id of the requested component
    pub component_id: Uuid,
    pub notes: String,
    pub requested_days: i32,
    pub status: RequestStatus,
    pub requested_at: DateTime<Utc>,
    pub responded_at: Option<DateTime<Utc>>,
    pub responded_by: Option<Uuid>,
    pub rejection_reason: Option<String>,
}

impl ComponentRequest {
    pub fn is_pending(&self) -> bool {
        self.status == RequestStatus::Pending
    }
}

/// Request body for asking for a component
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateRequest {
    pub component_id: Uuid,
    #[validate(length(max = 1000))]
    pub notes: Option<String>,
    #[validate(range(min = 1, max = 365))]
    pub requested_days: Option<i32>,
}

#[derive(Debug, Clone)]
pub struct NewRequest {
    pub user_id: Uuid,
    pub component_id: Uuid,
    pub notes: String,
    pub requested_days: i32,
    pub requested_at: DateTime<Utc>,
}

/// Terminal decision written on a pending request
#[derive(Debug, Clone)]
pub struct RequestDecision {
    pub status: RequestStatus,
    pub responded_at: DateTime<Utc>,
    pub responded_by: Uuid,
    pub rejection_reason: Option<String>,
}

/// Rejection body
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct RejectRequest {
    pub reason: Option<String>,
}

/// Query parameters for listing requests
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct RequestQuery {
    pub status: Option<RequestStatus>,
}

/// Storage-level equality filter
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub user_id: Option<Uuid>,
    pub component_id: Option<Uuid>,
}

impl RequestFilter {
    pub fn matches(&self, request: &ComponentRequest) -> bool {
        self.status.map_or(true, |s| request.status == s)
            && self.user_id.map_or(true, |u| request.user_id == u)
            && self.component_id.map_or(true, |c| request.component_id == c)
    }
}

/// Request with referenced entities resolved
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RequestDetails {
    #[serde(flatten)]
    pub request: ComponentRequest,
    pub user: Option<UserShort>,
    pub component: Option<ComponentShort>,
    pub responded_by_user: Option<UserShort>,
}
