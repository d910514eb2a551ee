//! Component endpoints: registry, checkout and return, history

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    error::AppResult,
    models::{
        component::{ComponentQuery, CreateComponent, ReturnedComponent, UpdateComponent},
        history::HistoryDetails,
        Component, ComponentDetails,
    },
    AppState,
};

use super::AuthenticatedUser;

/// Optional notes for a checkout or return
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct TransitionRequest {
    pub notes: Option<String>,
}

/// List components with optional filters
#[utoipa::path(
    get,
    path = "/components",
    tag = "components",
    security(("bearer_auth" = [])),
    params(ComponentQuery),
    responses(
        (status = 200, description = "Components with borrower summaries", body = Vec<ComponentDetails>)
    )
)]
pub async fn list_components(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Query(query): Query<ComponentQuery>,
) -> AppResult<Json<Vec<ComponentDetails>>> {
    let components = state.services.components.list(query).await?;
    Ok(Json(components))
}

/// Register a new component
#[utoipa::path(
    post,
    path = "/components",
    tag = "components",
    security(("bearer_auth" = [])),
    request_body = CreateComponent,
    responses(
        (status = 201, description = "Component created", body = Component),
        (status = 400, description = "Invalid input"),
        (status = 403, description = "Admin access required"),
        (status = 409, description = "Component ID already exists")
    )
)]
pub async fn create_component(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Json(data): Json<CreateComponent>,
) -> AppResult<(StatusCode, Json<Component>)> {
    claims.require_admin()?;

    let component = state.services.components.create(data).await?;
    Ok((StatusCode::CREATED, Json(component)))
}

/// Components past their due date
#[utoipa::path(
    get,
    path = "/components/overdue",
    tag = "components",
    security(("bearer_auth" = [])),
    responses(
        (status = 200, description = "Overdue components with borrower contact details", body = Vec<ComponentDetails>)
    )
)]
pub async fn list_overdue(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
) -> AppResult<Json<Vec<ComponentDetails>>> {
    let components = state.services.components.overdue().await?;
    Ok(Json(components))
}

/// Get component by human code
#[utoipa::path(
    get,
    path = "/components/code/{code}",
    tag = "components",
    security(("bearer_auth" = [])),
    params(
        ("code" = String, Path, description = "Component code, e.g. ARD-001")
    ),
    responses(
        (status = 200, description = "Component details", body = ComponentDetails),
        (status = 404, description = "Component not found")
    )
)]
pub async fn get_component_by_code(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(code): Path<String>,
) -> AppResult<Json<ComponentDetails>> {
    let component = state.services.components.get_by_code(&code).await?;
    Ok(Json(component))
}

/// Get component details
#[utoipa::path(
    get,
    path = "/components/{id}",
    tag = "components",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Component ID")
    ),
    responses(
        (status = 200, description = "Component details", body = ComponentDetails),
        (status = 404, description = "Component not found")
    )
)]
pub async fn get_component(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<ComponentDetails>> {
    let component = state.services.components.get(id).await?;
    Ok(Json(component))
}

/// Update descriptive fields of a component
#[utoipa::path(
    put,
    path = "/components/{id}",
    tag = "components",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Component ID")
    ),
    request_body = UpdateComponent,
    responses(
        (status = 200, description = "Component updated", body = Component),
        (status = 403, description = "Admin access required"),
        (status = 404, description = "Component not found")
    )
)]
pub async fn update_component(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
    Json(data): Json<UpdateComponent>,
) -> AppResult<Json<Component>> {
    claims.require_admin()?;

    let component = state.services.components.update(id, data).await?;
    Ok(Json(component))
}

/// Check a component out to the current user
#[utoipa::path(
    post,
    path = "/components/{id}/checkout",
    tag = "components",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Component ID")
    ),
    request_body = TransitionRequest,
    responses(
        (status = 200, description = "Component checked out", body = ComponentDetails),
        (status = 400, description = "Component is not available"),
        (status = 404, description = "Component not found")
    )
)]
pub async fn checkout_component(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
    body: Option<Json<TransitionRequest>>,
) -> AppResult<Json<ComponentDetails>> {
    let notes = body.and_then(|Json(b)| b.notes);
    let component = state
        .services
        .components
        .checkout(id, claims.actor(), notes)
        .await?;
    Ok(Json(component))
}

/// Return a borrowed component
#[utoipa::path(
    post,
    path = "/components/{id}/return",
    tag = "components",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Component ID")
    ),
    request_body = TransitionRequest,
    responses(
        (status = 200, description = "Component returned", body = ReturnedComponent),
        (status = 400, description = "Component is already available"),
        (status = 403, description = "You did not borrow this component"),
        (status = 404, description = "Component not found")
    )
)]
pub async fn return_component(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
    body: Option<Json<TransitionRequest>>,
) -> AppResult<Json<ReturnedComponent>> {
    let notes = body.and_then(|Json(b)| b.notes);
    let returned = state
        .services
        .components
        .return_component(id, claims.actor(), notes)
        .await?;
    Ok(Json(returned))
}

/// Checkout history of a component
#[utoipa::path(
    get,
    path = "/components/{id}/history",
    tag = "components",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "Component ID")
    ),
    responses(
        (status = 200, description = "History, newest first", body = Vec<HistoryDetails>),
        (status = 404, description = "Component not found")
    )
)]
pub async fn component_history(
    State(state): State<AppState>,
    AuthenticatedUser(_claims): AuthenticatedUser,
    Path(id): Path<Uuid>,
) -> AppResult<Json<Vec<HistoryDetails>>> {
    let history = state.services.components.history(id).await?;
    Ok(Json(history))
}

/// Checkout history of a user
#[utoipa::path(
    get,
    path = "/users/{id}/history",
    tag = "components",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "History, newest first", body = Vec<HistoryDetails>),
        (status = 403, description = "Access denied")
    )
)]
pub async fn user_history(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Vec<HistoryDetails>>> {
    claims.require_self_or_admin(user_id)?;

    let history = state.services.components.history_by_user(user_id).await?;
    Ok(Json(history))
}

/// Components currently held by a user
#[utoipa::path(
    get,
    path = "/users/{id}/borrowed",
    tag = "components",
    security(("bearer_auth" = [])),
    params(
        ("id" = Uuid, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "Borrowed components", body = Vec<Component>),
        (status = 403, description = "Access denied")
    )
)]
pub async fn user_borrowed(
    State(state): State<AppState>,
    AuthenticatedUser(claims): AuthenticatedUser,
    Path(user_id): Path<Uuid>,
) -> AppResult<Json<Vec<Component>>> {
    claims.require_self_or_admin(user_id)?;

    let components = state.services.components.borrowed_by(user_id).await?;
    Ok(Json(components))
}
