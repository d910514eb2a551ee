//! Component request endpoints

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        request::{CreateRequest, RejectRequest, RequestDetails, RequestQuery},
        ComponentRequest,
    },
    services::requests::ApprovedRequest,
    AppState,
};

use super::AuthenticatedUser;

/// Ask for a component
#[utoipa::path(
    post,
    path = "/requests",
    tag = "requests",
    security(("bearer_auth" = [])),
    request_body = CreateRequest,
    responses(
        (status = 201, description = "Request created", body = ComponentRequest),
        (status = 400, description = "Component is not available"),
        (status = 404, description = "Component not found"),
        (status = 409, description = "You already have a pending request for this component")
    )
)]
pub async fn create_request(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(data): Json<CreateRequest>,
) -> AppResult<(StatusCode, Json<ComponentRequest>)> {
    let request = state
        .services
        .requests
        .create(claims.actor(), data)
        .await?;
    Ok((StatusCode::CREATED, Json(request)))
}

/// List requests (admins see all, members their own)
#[utoipa::path(
    get,
    path = "/requests",
    tag = "requests",
    security(("bearer_auth" = [])),
    params(RequestQuery),
    responses(
        (status = 200, description = "Requests, newest first", body = Vec<RequestDetails>)
    )
)]
pub async fn list_requests(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Query(query): Query<RequestQuery>,
) -> AppResult<Json<Vec<RequestDetails>>> {
    let requests = state.services.requests.list(claims.actor(), query).await?;
    Ok(Json(requests))
}

/// Approve a pending request
#[utoipa::path(
    patch,
    path = "/requests/{id}/approve",
    tag = "requests",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Request ID")
    ),
    responses(
        (status = 200, description = "Request approved and component checked out", body = ApprovedRequest),
        (status = 400, description = "Request already processed or component unavailable"),
        (status = 403, description = "Admin access required"),
        (status = 404, description = "Request not found")
    )
)]
pub async fn approve_request(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ApprovedRequest>> {
    claims.require_admin()?;

    let approved = state.services.requests.approve(id, claims.actor()).await?;
    Ok(Json(approved))
}

/// Reject a pending request
#[utoipa::path(
    patch,
    path = "/requests/{id}/reject",
    tag = "requests",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Request ID")
    ),
    request_body = RejectRequest,
    responses(
        (status = 200, description = "Request rejected", body = ComponentRequest),
        (status = 400, description = "Request already processed"),
        (status = 403, description = "Admin access required"),
        (status = 404, description = "Request not found")
    )
)]
pub async fn reject_request(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
    body: Option<Json<RejectRequest>>,
) -> AppResult<Json<ComponentRequest>> {
    claims.require_admin()?;

    let reason = body.and_then(|Json(b)| b.reason);
    let request = state
        .services
        .requests
        .reject(id, claims.actor(), reason)
        .await?;
    Ok(Json(request))
}

/// Cancel a pending request
#[utoipa::path(
    delete,
    path = "/requests/{id}",
    tag = "requests",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Request ID")
    ),
    responses(
        (status = 204, description = "Request cancelled"),
        (status = 400, description = "Can only cancel pending requests"),
        (status = 403, description = "Access denied"),
        (status = 404, description = "Request not found")
    )
)]
pub async fn cancel_request(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<StatusCode> {
    state.services.requests.cancel(id, claims.actor()).await?;
    Ok(StatusCode::NO_CONTENT)
}
