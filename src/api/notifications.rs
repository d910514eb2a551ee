//! Notification log and admin maintenance triggers

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{notification::RetryReport, NotificationLog},
    services::scanner::ScanReport,
    AppState,
};

use super::AuthenticatedUser;

#[derive(Debug, Default, Deserialize, IntoParams)]
pub struct NotificationLogQuery {
    /// Defaults to the current user; other users require admin
    pub user_id: Option<Uuid>,
}

/// Notification delivery log
#[utoipa::path(
    get,
    path = "/notifications",
    tag = "notifications",
    security(("bearer_auth" = [])),
    params(NotificationLogQuery),
    responses(
        (status = 200, description = "Notification logs, newest first", body = Vec<NotificationLog>),
        (status = 403, description = "Access denied")
    )
)]
pub async fn list_notifications(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<NotificationLogQuery>,
) -> AppResult<Json<Vec<NotificationLog>>> {
    let user_id = query.user_id.unwrap_or(claims.user_id);
    claims.require_self_or_admin(user_id)?;

    let logs = state.services.notifications.logs_for_user(user_id).await?;
    Ok(Json(logs))
}

/// Run the overdue scan now
#[utoipa::path(
    post,
    path = "/admin/overdue-scan",
    tag = "notifications",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Scan finished", body = ScanReport),
        (status = 403, description = "Admin access required")
    )
)]
pub async fn run_overdue_scan(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<ScanReport>> {
    claims.require_admin()?;

    let report = state.services.scanner.run().await?;
    Ok(Json(report))
}

/// Retry failed notifications now
#[utoipa::path(
    post,
    path = "/admin/notifications/retry",
    tag = "notifications",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Retry sweep finished", body = RetryReport),
        (status = 403, description = "Admin access required")
    )
)]
pub async fn retry_notifications(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<RetryReport>> {
    claims.require_admin()?;

    let report = state.services.notifications.retry_failed().await?;
    Ok(Json(report))
}
