// src/handlers/stock.rs

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;
use validator::Validate;

use crate::{
    common::error::{ApiError, AppError},
    config::AppState,
    middleware::{
        auth::AuthenticatedUser,
        i18n::Locale,
        rbac::{CanAdministerStock, CanMutateStock, CanViewLedger, RequireAction},
    },
    models::stock::{
        Deduction, DeductionPayload, DeductionReason, DeductionView, EditLotPayload, LotBalance,
        LotView, RegisterLotPayload, RestockPayload, StockLot,
    },
    services::{
        deduction_service::DeductionRequest,
        ledger_query::{
            DeductionFilter, DeductionSort, DeductionSortKey, ExpiryFilter, LotFilter, LotSort,
            LotSortKey, SortDirection,
        },
        ledger_service::LotRegistration,
    },
};

// ---
// Parâmetros de consulta
// ---

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct LotQuery {
    /// Busca em nome do produto, código do lote, tipo e marca
    pub search: Option<String>,
    pub product_id: Option<Uuid>,
    pub expiry: Option<ExpiryFilter>,
    pub sort: Option<LotSortKey>,
    pub direction: Option<SortDirection>,
}

impl LotQuery {
    fn into_parts(self) -> (LotFilter, LotSort) {
        let filter = LotFilter {
            search: self.search,
            product_id: self.product_id,
            expiry: self.expiry.unwrap_or_default(),
        };
        let sort = LotSort {
            key: self.sort.unwrap_or_default(),
            direction: self.direction.unwrap_or_default(),
        };
        (filter, sort)
    }
}

#[derive(Debug, Default, Deserialize, IntoParams)]
#[serde(rename_all = "camelCase")]
#[into_params(parameter_in = Query)]
pub struct DeductionQuery {
    pub lot_id: Option<Uuid>,
    pub product_id: Option<Uuid>,
    pub principal_id: Option<Uuid>,
    pub reason: Option<DeductionReason>,
    /// Limite inferior (inclusivo) de `occurredAt`
    pub from: Option<DateTime<Utc>>,
    /// Limite superior (inclusivo) de `occurredAt`
    pub to: Option<DateTime<Utc>>,
    pub search: Option<String>,
    pub sort: Option<DeductionSortKey>,
    pub direction: Option<SortDirection>,
}

impl DeductionQuery {
    fn into_parts(self) -> (DeductionFilter, DeductionSort) {
        let filter = DeductionFilter {
            lot_id: self.lot_id,
            product_id: self.product_id,
            principal_id: self.principal_id,
            reason: self.reason,
            from: self.from,
            to: self.to,
            search: self.search,
        };
        let default_sort = DeductionSort::default();
        let sort = DeductionSort {
            key: self.sort.unwrap_or(default_sort.key),
            direction: self.direction.unwrap_or(default_sort.direction),
        };
        (filter, sort)
    }
}

// ---
// Lotes
// ---

// GET /api/stock/lots
#[utoipa::path(
    get,
    path = "/api/stock/lots",
    tag = "Stock",
    params(LotQuery),
    responses(
        (status = 200, description = "Lotes com produto e faixa de validade", body = Vec<LotView>)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_lots(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _guard: RequireAction<CanViewLedger>,
    Query(query): Query<LotQuery>,
) -> Result<Json<Vec<LotView>>, ApiError> {
    let (filter, sort) = query.into_parts();

    let lots = app_state
        .ledger_service
        .list_lots(&user.0, &filter, sort)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(Json(lots))
}

// POST /api/stock/lots
#[utoipa::path(
    post,
    path = "/api/stock/lots",
    tag = "Stock",
    request_body = RegisterLotPayload,
    responses(
        (status = 201, description = "Lote registrado", body = StockLot),
        (status = 404, description = "Produto não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn register_lot(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _guard: RequireAction<CanMutateStock>,
    Json(payload): Json<RegisterLotPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let lot = app_state
        .ledger_service
        .register_lot(
            &user.0,
            LotRegistration {
                product_id: payload.product_id,
                lot_code: payload.lot_code,
                quantity: payload.quantity,
                expiry_date: payload.expiry_date,
                location: payload.location,
            },
        )
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::CREATED, Json(lot)))
}

// GET /api/stock/lots/{id}
#[utoipa::path(
    get,
    path = "/api/stock/lots/{id}",
    tag = "Stock",
    params(("id" = Uuid, Path, description = "ID do Lote")),
    responses(
        (status = 200, description = "Lote", body = LotView),
        (status = 404, description = "Lote não encontrado")
    ),
    security(("api_jwt" = []))
)]
pub async fn get_lot(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _guard: RequireAction<CanViewLedger>,
    Path(id): Path<Uuid>,
) -> Result<Json<LotView>, ApiError> {
    let lot = app_state
        .ledger_service
        .get_lot(&user.0, id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(Json(lot))
}

// PUT /api/stock/lots/{id}
#[utoipa::path(
    put,
    path = "/api/stock/lots/{id}",
    tag = "Stock",
    request_body = EditLotPayload,
    params(("id" = Uuid, Path, description = "ID do Lote")),
    responses(
        (status = 200, description = "Lote atualizado (quantidade não muda aqui)", body = StockLot)
    ),
    security(("api_jwt" = []))
)]
pub async fn edit_lot(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _guard: RequireAction<CanAdministerStock>,
    Path(id): Path<Uuid>,
    Json(payload): Json<EditLotPayload>,
) -> Result<Json<StockLot>, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let lot = app_state
        .ledger_service
        .edit_lot(&user.0, id, payload.into())
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(Json(lot))
}

// DELETE /api/stock/lots/{id}
#[utoipa::path(
    delete,
    path = "/api/stock/lots/{id}",
    tag = "Stock",
    params(("id" = Uuid, Path, description = "ID do Lote")),
    responses(
        (status = 204, description = "Lote removido"),
        (status = 409, description = "Lote ainda possui saldo")
    ),
    security(("api_jwt" = []))
)]
pub async fn delete_lot(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _guard: RequireAction<CanAdministerStock>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    app_state
        .ledger_service
        .delete_lot(&user.0, id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(StatusCode::NO_CONTENT)
}

// POST /api/stock/lots/{id}/restock
#[utoipa::path(
    post,
    path = "/api/stock/lots/{id}/restock",
    tag = "Stock",
    request_body = RestockPayload,
    params(("id" = Uuid, Path, description = "ID do Lote")),
    responses(
        (status = 200, description = "Saldo reposto", body = StockLot)
    ),
    security(("api_jwt" = []))
)]
pub async fn restock_lot(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _guard: RequireAction<CanAdministerStock>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RestockPayload>,
) -> Result<Json<StockLot>, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let lot = app_state
        .ledger_service
        .restock_lot(&user.0, id, payload.amount)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(Json(lot))
}

// GET /api/stock/lots/{id}/balance
#[utoipa::path(
    get,
    path = "/api/stock/lots/{id}/balance",
    tag = "Stock",
    params(("id" = Uuid, Path, description = "ID do Lote")),
    responses(
        (status = 200, description = "Conferência do razão do lote", body = LotBalance)
    ),
    security(("api_jwt" = []))
)]
pub async fn lot_balance(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _guard: RequireAction<CanViewLedger>,
    Path(id): Path<Uuid>,
) -> Result<Json<LotBalance>, ApiError> {
    let balance = app_state
        .ledger_service
        .lot_balance(&user.0, id)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(Json(balance))
}

// ---
// Baixas
// ---

// POST /api/stock/lots/{id}/deductions
#[utoipa::path(
    post,
    path = "/api/stock/lots/{id}/deductions",
    tag = "Stock",
    request_body = DeductionPayload,
    params(("id" = Uuid, Path, description = "ID do Lote")),
    responses(
        (status = 201, description = "Baixa registrada", body = Deduction),
        (status = 409, description = "Conflito de concorrência persistente"),
        (status = 422, description = "Estoque insuficiente")
    ),
    security(("api_jwt" = []))
)]
pub async fn apply_deduction(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _guard: RequireAction<CanMutateStock>,
    Path(lot_id): Path<Uuid>,
    Json(payload): Json<DeductionPayload>,
) -> Result<impl IntoResponse, ApiError> {
    payload
        .validate()
        .map_err(|e| AppError::ValidationError(e).to_api_error(&locale))?;

    let deduction = app_state
        .deduction_service
        .apply_deduction(
            &user.0,
            DeductionRequest {
                lot_id,
                quantity: payload.quantity,
                reason: payload.reason,
                note: payload.note,
            },
        )
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok((StatusCode::CREATED, Json(deduction)))
}

// GET /api/stock/deductions
#[utoipa::path(
    get,
    path = "/api/stock/deductions",
    tag = "Stock",
    params(DeductionQuery),
    responses(
        (status = 200, description = "Histórico de baixas", body = Vec<DeductionView>)
    ),
    security(("api_jwt" = []))
)]
pub async fn list_deductions(
    State(app_state): State<AppState>,
    locale: Locale,
    user: AuthenticatedUser,
    _guard: RequireAction<CanViewLedger>,
    Query(query): Query<DeductionQuery>,
) -> Result<Json<Vec<DeductionView>>, ApiError> {
    let (filter, sort) = query.into_parts();

    let deductions = app_state
        .ledger_service
        .list_deductions(&user.0, &filter, sort)
        .await
        .map_err(|e| e.to_api_error(&locale))?;

    Ok(Json(deductions))
}
