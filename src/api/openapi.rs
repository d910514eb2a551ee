//! OpenAPI documentation

use axum::Router;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::api::{auth, components, dashboard, health, notifications, requests, users};

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Challengers Component Tracker API",
        version = "1.0.0",
        description = "Inventory, checkout and request tracking for electronics components",
        license(name = "AGPL-3.0", url = "https://www.gnu.org/licenses/agpl-3.0.html")
    ),
    servers(
        (url = "/api/v1", description = "API v1")
    ),
    paths(
        // Health
        health::health_check,
        health::readiness_check,
        // Auth
        auth::login,
        auth::me,
        // Components
        components::list_components,
        components::create_component,
        components::list_overdue,
        components::get_component_by_code,
        components::get_component,
        components::update_component,
        components::checkout_component,
        components::return_component,
        components::component_history,
        components::user_history,
        components::user_borrowed,
        // Users
        users::list_users,
        users::update_preferences,
        users::update_role,
        users::delete_user,
        // Requests
        requests::create_request,
        requests::list_requests,
        requests::approve_request,
        requests::reject_request,
        requests::cancel_request,
        // Dashboard
        dashboard::get_stats,
        // Notifications
        notifications::list_notifications,
        notifications::run_overdue_scan,
        notifications::retry_notifications,
    ),
    components(
        schemas(
            // Auth
            auth::LoginRequest,
            auth::LoginResponse,
            crate::models::user::User,
            crate::models::user::UserShort,
            crate::models::user::Role,
            crate::models::user::NotificationPreferences,
            crate::models::user::UpdatePreferences,
            crate::models::user::UpdateRole,
            // Components
            crate::models::component::Component,
            crate::models::component::ComponentShort,
            crate::models::component::ComponentStatus,
            crate::models::component::ComponentDetails,
            crate::models::component::BorrowerDetails,
            crate::models::component::ReturnedComponent,
            crate::models::component::CreateComponent,
            crate::models::component::UpdateComponent,
            components::TransitionRequest,
            crate::models::history::CheckoutHistory,
            crate::models::history::HistoryAction,
            crate::models::history::HistoryDetails,
            // Requests
            crate::models::request::ComponentRequest,
            crate::models::request::RequestStatus,
            crate::models::request::CreateRequest,
            crate::models::request::RejectRequest,
            crate::models::request::RequestDetails,
            crate::services::requests::ApprovedRequest,
            // Dashboard
            crate::services::dashboard::DashboardStats,
            crate::services::dashboard::ComponentCounts,
            crate::services::dashboard::TopBorrower,
            // Notifications
            crate::models::notification::NotificationLog,
            crate::models::notification::NotificationType,
            crate::models::notification::NotificationChannel,
            crate::models::notification::NotificationStatus,
            crate::models::notification::RetryReport,
            crate::services::scanner::ScanReport,
            // Health
            health::HealthResponse,
            // Errors
            crate::error::ErrorResponse,
        )
    ),
    tags(
        (name = "health", description = "Health check endpoints"),
        (name = "auth", description = "Authentication endpoints"),
        (name = "components", description = "Component inventory, checkout and return"),
        (name = "users", description = "User management and notification preferences"),
        (name = "requests", description = "Component request workflow"),
        (name = "dashboard", description = "Dashboard statistics"),
        (name = "notifications", description = "Notification log and maintenance triggers")
    )
)]
pub struct ApiDoc;

/// Create the OpenAPI documentation router
pub fn create_openapi_router() -> Router {
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_core_paths() {
        let doc = ApiDoc::openapi();
        for path in [
            "/components",
            "/components/{id}/checkout",
            "/components/{id}/return",
            "/requests/{id}/approve",
            "/admin/overdue-scan",
            "/users/{id}/preferences",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
    }
}
