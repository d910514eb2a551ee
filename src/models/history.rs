//! Checkout history model (append-only audit trail)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;

use super::{component::ComponentShort, UserShort};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum HistoryAction {
    Checkout,
    Return,
}

text_enum!(HistoryAction {
    Checkout => "checkout",
    Return => "return",
});

/// One checkout or return, never updated after insert
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CheckoutHistory {
    pub id: Uuid,
    /// Storage id of the component
    pub component_id: Uuid,
    pub user_id: Uuid,
    pub action: HistoryAction,
    pub notes: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewHistory {
    pub component_id: Uuid,
    pub user_id: Uuid,
    pub action: HistoryAction,
    pub notes: String,
    pub timestamp: DateTime<Utc>,
}

/// History entry with user and component resolved
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryDetails {
    #[serde(flatten)]
    pub record: CheckoutHistory,
    pub user_details: Option<UserShort>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_details: Option<ComponentShort>,
}
