// src/handlers/users.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use uuid::Uuid;

use crate::{
    common::error::ApiError,
    config::AppState,
    middleware::{
        auth::AuthenticatedUser,
        i18n::Locale,
        rbac::{CanManageUsers, RequireAction},
    },
    models::auth::{ChangeRolePayload, User},
};

// GET /api/users
#[utoipa::path(
    get,
    path = "/api/users",
    tag = "Users",
    responses(
        (status = 200, description = "Todas as contas", body = Vec<User>),
        (status = 403, description = "Apenas administradores")
    ),
    security(("api_jwt" = []))
)]
pub async fn list_users(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _guard: RequireAction<CanManageUsers>,
) -> Result<Json<Vec<User>>, ApiError> {
    let users = app_state
        .user_service
        .list_users(&user.0)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(Json(users))
}

// PUT /api/users/{id}/role
#[utoipa::path(
    put,
    path = "/api/users/{id}/role",
    tag = "Users",
    request_body = ChangeRolePayload,
    params(
        ("id" = Uuid, Path, description = "ID da conta alvo")
    ),
    responses(
        (status = 200, description = "Papel alterado", body = User),
        (status = 403, description = "Sem permissão ou conta própria")
    ),
    security(("api_jwt" = []))
)]
pub async fn change_role(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    Path(target): Path<Uuid>,
    Json(payload): Json<ChangeRolePayload>,
) -> Result<Json<User>, ApiError> {
    // A regra de "não na própria conta" depende do alvo: fica no serviço
    let updated = app_state
        .user_service
        .change_role(&user.0, target, payload.role)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(Json(updated))
}

// DELETE /api/users/{id}
#[utoipa::path(
    delete,
    path = "/api/users/{id}",
    tag = "Users",
    params(
        ("id" = Uuid, Path, description = "ID da conta alvo")
    ),
    responses(
        (status = 204, description = "Conta removida"),
        (status = 403, description = "Sem permissão ou conta própria")
    ),
    security(("api_jwt" = []))
)]
pub async fn delete_user(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    Path(target): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    app_state
        .user_service
        .delete_user(&user.0, target)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(StatusCode::NO_CONTENT)
}
