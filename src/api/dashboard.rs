//! Dashboard endpoint

use axum::{extract::State, Json};

use crate::{error::AppResult, services::dashboard::DashboardStats, AppState};

use super::AuthenticatedUser;

/// Inventory counts, recent activity and upcoming due dates
#[utoipa::path(
    get,
    path = "/dashboard/stats",
    tag = "dashboard",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Dashboard statistics", body = DashboardStats)
    )
)]
pub async fn get_stats(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
) -> AppResult<Json<DashboardStats>> {
    let stats = state.services.dashboard.stats(claims.actor()).await?;
    Ok(Json(stats))
}
