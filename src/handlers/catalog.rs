// src/handlers/catalog.rs

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::{
        auth::AuthenticatedUser,
        i18n::Locale,
        rbac::{CanManageCatalog, CanViewCatalog, RequireAction},
    },
    models::catalog::{Product, ProductPayload},
};

// GET /api/products
#[utoipa::path(
    get,
    path = "/api/products",
    tag = "Catalog",
    responses(
        (status = 200, description = "Produtos em ordem alfabética", body = Vec<Product>)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_products(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _guard: RequireAction<CanViewCatalog>,
) -> Result<Json<Vec<Product>>, ApiError> {
    let products = app_state
        .catalog_service
        .list_products(&user.0)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(Json(products))
}

// GET /api/products/{id}
#[utoipa::path(
    get,
    path = "/api/products/{id}",
    tag = "Catalog",
    params(("id" = Uuid, Path, description = "ID do Produto")),
    responses(
        (status = 200, description = "Produto", body = Product),
        (status = 404, description = "Produto não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_product(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _guard: RequireAction<CanViewCatalog>,
    Path(id): Path<Uuid>,
) -> Result<Json<Product>, ApiError> {
    let product = app_state
        .catalog_service
        .get_product(&user.0, id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(Json(product))
}

// POST /api/products
#[utoipa::path(
    post,
    path = "/api/products",
    tag = "Catalog",
    request_body = ProductPayload,
    responses(
        (status = 201, description = "Produto cadastrado", body = Product)
    ),
    security(("api_jwt" = []))
)]
pub async fn create_product(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _guard: RequireAction<CanManageCatalog>,
    Json(payload): Json<ProductPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let product = app_state
        .catalog_service
        .create_product(&user.0, &payload)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::CREATED, Json(product)))
}

// PUT /api/products/{id}
#[utoipa::path(
    put,
    path = "/api/products/{id}",
    tag = "Catalog",
    request_body = ProductPayload,
    params(("id" = Uuid, Path, description = "ID do Produto")),
    responses(
        (status = 200, description = "Produto atualizado", body = Product)
    ),
    security(("api_jwt" = []))
)]
pub async fn update_product(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _guard: RequireAction<CanManageCatalog>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ProductPayload>,
) -> Result<Json<Product>, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let product = app_state
        .catalog_service
        .update_product(&user.0, id, &payload)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(Json(product))
}

// DELETE /api/products/{id}
#[utoipa::path(
    delete,
    path = "/api/products/{id}",
    tag = "Catalog",
    params(("id" = Uuid, Path, description = "ID do Produto")),
    responses(
        (status = 204, description = "Produto removido")
    ),
    security(("api_jwt" = []))
)]
pub async fn delete_product(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _guard: RequireAction<CanManageCatalog>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    app_state
        .catalog_service
        .delete_product(&user.0, id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(StatusCode::NO_CONTENT)
}
