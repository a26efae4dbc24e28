// src/docs.rs

use utoipa::OpenApi;
use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use crate::handlers;
use crate::models;
use crate::services;

#[derive(OpenApi)]
#[openapi(
    paths(
        // --- Auth ---
        handlers::auth::register,
        handlers::auth::login,

        // --- Users ---
        handlers::auth::get_me,
        handlers::users::list_users,
        handlers::users::change_role,
        handlers::users::delete_user,

        // --- Catalog ---
        handlers::catalog::list_products,
        handlers::catalog::get_product,
        handlers::catalog::create_product,
        handlers::catalog::update_product,
        handlers::catalog::delete_product,

        // --- STOCK ---
        handlers::stock::list_lots,
        handlers::stock::register_lot,
        handlers::stock::get_lot,
        handlers::stock::edit_lot,
        handlers::stock::delete_lot,
        handlers::stock::restock_lot,
        handlers::stock::lot_balance,
        handlers::stock::apply_deduction,
        handlers::stock::list_deductions,
    ),
    components(
        schemas(
            // --- Auth ---
            models::auth::Role,
            models::auth::User,
            models::auth::Principal,
            models::auth::RegisterUserPayload,
            models::auth::LoginUserPayload,
            models::auth::ChangeRolePayload,
            models::auth::AuthResponse,

            // --- Catalog ---
            models::catalog::Product,
            models::catalog::ProductPayload,

            // --- Stock ---
            models::stock::StockLot,
            models::stock::DeductionReason,
            models::stock::Deduction,
            models::stock::ExpiryBucket,
            models::stock::LotView,
            models::stock::DeductionView,
            models::stock::LotBalance,

            // --- Payloads ---
            models::stock::RegisterLotPayload,
            models::stock::EditLotPayload,
            models::stock::RestockPayload,
            models::stock::DeductionPayload,

            // --- Consultas ---
            services::ledger_query::SortDirection,
            services::ledger_query::ExpiryFilter,
            services::ledger_query::LotSortKey,
            services::ledger_query::DeductionSortKey,
        )
    ),
    tags(
        (name = "Auth", description = "Autenticação e Registro"),
        (name = "Users", description = "Dados do Usuário e Gestão de Contas"),
        (name = "Catalog", description = "Catálogo de Produtos"),
        (name = "Stock", description = "Lotes, Baixas e Conferência do Razão")
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl utoipa::Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "api_jwt",
            SecurityScheme::Http(
                Http::new(HttpAuthScheme::Bearer)
            ),
        );
    }
}
