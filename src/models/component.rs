//! Component model and related types

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::User;

/// Default loan length when none is given at creation
pub const DEFAULT_CHECKOUT_DAYS: i32 = 7;

/// Lifecycle status of a component
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Available,
    Taken,
    Overdue,
}

text_enum!(ComponentStatus {
    Available => "available",
    Taken => "taken",
    Overdue => "overdue",
});

/// Component record from database
///
/// `status == Available` exactly when the three borrower fields are `None`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Component {
    pub id: Uuid,
    /// Human readable code, always upper-case (e.g. ARD-001)
    #[serde(rename = "componentId")]
    pub component_code: String,
    pub name: String,
    pub category: String,
    pub description: String,
    pub image_url: String,
    /// Default loan length in days
    pub checkout_duration: i32,
    pub status: ComponentStatus,
    pub current_borrower: Option<Uuid>,
    pub checked_out_at: Option<DateTime<Utc>>,
    pub due_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Component {
    pub fn is_available(&self) -> bool {
        self.status == ComponentStatus::Available
    }

    /// Taken or overdue with a due date strictly before `now`
    pub fn is_past_due(&self, now: DateTime<Utc>) -> bool {
        matches!(self.status, ComponentStatus::Taken | ComponentStatus::Overdue)
            && self.due_date.map(|due| due < now).unwrap_or(false)
    }

    /// Taken (not yet overdue) with a due date inside `[now, now + window]`
    pub fn is_due_within(&self, now: DateTime<Utc>, window: Duration) -> bool {
        self.status == ComponentStatus::Taken
            && self
                .due_date
                .map(|due| due >= now && due <= now + window)
                .unwrap_or(false)
    }

    /// Case-insensitive substring match over name, code and description.
    /// `needle` must already be lower-case.
    pub fn matches_search(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle)
            || self.component_code.to_lowercase().contains(needle)
            || self.description.to_lowercase().contains(needle)
    }

    pub fn short(&self) -> ComponentShort {
        ComponentShort {
            id: self.id,
            component_code: self.component_code.clone(),
            name: self.name.clone(),
            status: self.status,
        }
    }
}

/// Short component representation embedded in other responses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentShort {
    pub id: Uuid,
    #[serde(rename = "componentId")]
    pub component_code: String,
    pub name: String,
    pub status: ComponentStatus,
}

/// Borrower summary attached to a component
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct BorrowerDetails {
    pub id: Uuid,
    pub name: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
}

impl BorrowerDetails {
    pub fn summary(user: &User) -> Self {
        Self {
            id: user.id,
            name: user.name.clone(),
            username: user.username.clone(),
            email: None,
            phone: None,
        }
    }

    pub fn with_contact(user: &User) -> Self {
        Self {
            email: Some(user.email.clone()),
            phone: user.phone.clone(),
            ..Self::summary(user)
        }
    }
}

/// Component with its borrower resolved
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ComponentDetails {
    #[serde(flatten)]
    pub component: Component,
    pub current_borrower_details: Option<BorrowerDetails>,
}

/// Result of a successful return
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReturnedComponent {
    #[serde(flatten)]
    pub component: Component,
    /// Borrower before the return
    pub previous_borrower: Uuid,
    /// Whole days the component was out, rounded up
    pub duration_days: i64,
}

/// Create component request
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateComponent {
    /// Human readable code, normalized to upper-case
    #[validate(length(min = 1, max = 64))]
    pub component_id: String,
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(min = 1, max = 100))]
    pub category: String,
    pub description: Option<String>,
    pub image_url: Option<String>,
    #[validate(range(min = 1, max = 365))]
    pub checkout_duration: Option<i32>,
}

/// Normalized insert data
#[derive(Debug, Clone)]
pub struct NewComponent {
    pub component_code: String,
    pub name: String,
    pub category: String,
    pub description: String,
    pub image_url: String,
    pub checkout_duration: i32,
}

impl From<CreateComponent> for NewComponent {
    fn from(data: CreateComponent) -> Self {
        Self {
            component_code: normalize_code(&data.component_id),
            name: data.name,
            category: data.category,
            description: data.description.unwrap_or_default(),
            image_url: data.image_url.unwrap_or_default(),
            checkout_duration: data.checkout_duration.unwrap_or(DEFAULT_CHECKOUT_DAYS),
        }
    }
}

/// Admin edit of descriptive fields
#[derive(Debug, Clone, Default, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateComponent {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub category: Option<String>,
    pub description: Option<String>,
    pub image_url: Option<String>,
    #[validate(range(min = 1, max = 365))]
    pub checkout_duration: Option<i32>,
}

/// Query parameters for listing components
#[derive(Debug, Clone, Default, Deserialize, IntoParams, ToSchema)]
pub struct ComponentQuery {
    pub status: Option<ComponentStatus>,
    pub category: Option<String>,
    /// Substring over name, code and description
    pub search: Option<String>,
}

/// Storage-level equality filter
#[derive(Debug, Clone, Default)]
pub struct ComponentFilter {
    pub status: Option<ComponentStatus>,
    pub category: Option<String>,
    pub current_borrower: Option<Uuid>,
}

impl ComponentFilter {
    pub fn matches(&self, component: &Component) -> bool {
        self.status.map_or(true, |s| component.status == s)
            && self
                .category
                .as_ref()
                .map_or(true, |c| &component.category == c)
            && self
                .current_borrower
                .map_or(true, |b| component.current_borrower == Some(b))
    }
}

/// Borrower fields written by a checkout
#[derive(Debug, Clone, Copy)]
pub struct CheckoutFields {
    pub borrower: Uuid,
    pub checked_out_at: DateTime<Utc>,
    pub due_date: DateTime<Utc>,
}

pub fn normalize_code(code: &str) -> String {
    code.trim().to_uppercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn taken(due: DateTime<Utc>) -> Component {
        Component {
            id: Uuid::new_v4(),
            component_code: "ARD-001".to_string(),
            name: "Arduino Uno R3".to_string(),
            category: "Arduino".to_string(),
            description: "ATmega328P board".to_string(),
            image_url: String::new(),
            checkout_duration: 7,
            status: ComponentStatus::Taken,
            current_borrower: Some(Uuid::new_v4()),
            checked_out_at: Some(due - Duration::days(7)),
            due_date: Some(due),
            created_at: due - Duration::days(30),
        }
    }

    #[test]
    fn test_normalize_code() {
        assert_eq!(normalize_code(" ard-001 "), "ARD-001");
    }

    #[test]
    fn test_due_windows() {
        let now = Utc::now();
        let component = taken(now + Duration::hours(12));
        assert!(component.is_due_within(now, Duration::days(1)));
        assert!(!component.is_past_due(now));

        let late = taken(now - Duration::hours(1));
        assert!(late.is_past_due(now));
        assert!(!late.is_due_within(now, Duration::days(1)));
    }

    #[test]
    fn test_search_matches_code_and_description() {
        let component = taken(Utc::now());
        assert!(component.matches_search("ard-0"));
        assert!(component.matches_search("atmega"));
        assert!(!component.matches_search("servo"));
    }

    #[test]
    fn test_filter_is_conjunction() {
        let component = taken(Utc::now());
        let filter = ComponentFilter {
            status: Some(ComponentStatus::Taken),
            category: Some("Arduino".to_string()),
            current_borrower: None,
        };
        assert!(filter.matches(&component));

        let filter = ComponentFilter {
            status: Some(ComponentStatus::Taken),
            category: Some("Sensor".to_string()),
            current_borrower: None,
        };
        assert!(!filter.matches(&component));
    }
}
