// src/main.rs

use axum::{
    middleware as axum_middleware,
    routing::{get, post, put},
    Router,
};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

mod common;
mod config;
mod db;
mod docs;
mod handlers;
mod middleware;
mod models;
mod services;

use crate::config::{AppState, Config};
use crate::docs::ApiDoc;
use crate::middleware::auth::auth_guard;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // RUST_LOG controla o nível; padrão "info"
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    let config = Config::from_env()?;
    let bind_addr = config.bind_addr.clone();
    let bootstrap_admin = config.bootstrap_admin.clone();

    let app_state = AppState::new(config).await?;

    if let Some((email, password)) = bootstrap_admin {
        app_state
            .auth_service
            .ensure_bootstrap_admin(&email, &password)
            .await?;
    }

    let app = router(app_state);

    // Inicia o servidor
    let listener = TcpListener::bind(&bind_addr).await?;
    tracing::info!("🚀 Servidor escutando em {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

fn router(app_state: AppState) -> Router {
    // Define as rotas de autenticação (públicas)
    let auth_routes = Router::new()
        .route("/register", post(handlers::auth::register))
        .route("/login", post(handlers::auth::login));

    // Define as rotas de usuário (protegidas pelo middleware)
    let user_routes = Router::new()
        .route("/", get(handlers::users::list_users))
        .route("/me", get(handlers::auth::get_me))
        .route("/{id}", axum::routing::delete(handlers::users::delete_user))
        .route("/{id}/role", put(handlers::users::change_role));

    let product_routes = Router::new()
        .route(
            "/",
            get(handlers::catalog::list_products).post(handlers::catalog::create_product),
        )
        .route(
            "/{id}",
            get(handlers::catalog::get_product)
                .put(handlers::catalog::update_product)
                .delete(handlers::catalog::delete_product),
        );

    let stock_routes = Router::new()
        .route(
            "/lots",
            get(handlers::stock::list_lots).post(handlers::stock::register_lot),
        )
        .route(
            "/lots/{id}",
            get(handlers::stock::get_lot)
                .put(handlers::stock::edit_lot)
                .delete(handlers::stock::delete_lot),
        )
        .route("/lots/{id}/restock", post(handlers::stock::restock_lot))
        .route("/lots/{id}/balance", get(handlers::stock::lot_balance))
        .route("/lots/{id}/deductions", post(handlers::stock::apply_deduction))
        .route("/deductions", get(handlers::stock::list_deductions));

    // Tudo que exige sessão passa pelo mesmo guard
    let protected = Router::new()
        .nest("/users", user_routes)
        .nest("/products", product_routes)
        .nest("/stock", stock_routes)
        .layer(axum_middleware::from_fn_with_state(
            app_state.clone(),
            auth_guard,
        ));

    // Combina tudo no router principal
    Router::new()
        .merge(SwaggerUi::new("/swagger-ui").url("/api-docs/openapi.json", ApiDoc::openapi()))
        .route("/api/health", get(|| async { "OK" }))
        .nest("/api/auth", auth_routes)
        .nest("/api", protected)
        .with_state(app_state)
}
