// src/config.rs

use std::{env, str::FromStr, sync::Arc, time::Duration};

use anyhow::Context;
use sqlx::postgres::PgPoolOptions;

use crate::{
    db::{
        CatalogRepository, CatalogStore, LedgerRepository, LedgerStore, MemoryStore,
        UserRepository, UserStore,
    },
    services::{
        auth::AuthService,
        catalog_service::CatalogService,
        deduction_service::{DeductionService, RetryPolicy},
        ledger_query::DEFAULT_NEAR_EXPIRY_DAYS,
        ledger_service::LedgerService,
        user_service::UserService,
    },
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Postgres,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" => Ok(StoreBackend::Postgres),
            "memory" => Ok(StoreBackend::Memory),
            other => anyhow::bail!("STORE_BACKEND desconhecido: '{}' (use postgres ou memory)", other),
        }
    }
}

// Tudo o que vem do ambiente, lido uma vez na inicialização
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: String,
    pub store_backend: StoreBackend,
    pub database_url: Option<String>,
    pub database_max_connections: u32,
    pub jwt_secret: String,
    pub token_ttl_days: i64,
    pub bcrypt_cost: u32,
    pub retry_policy: RetryPolicy,
    pub near_expiry_days: u32,
    pub bootstrap_admin: Option<(String, String)>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let store_backend: StoreBackend = env_or("STORE_BACKEND", StoreBackend::Postgres)?;
        let database_url = env::var("DATABASE_URL").ok();
        if store_backend == StoreBackend::Postgres && database_url.is_none() {
            anyhow::bail!("DATABASE_URL deve ser definida");
        }

        let jwt_secret = env::var("JWT_SECRET").context("JWT_SECRET deve ser definido")?;

        let defaults = RetryPolicy::default();
        let max_attempts: u32 = env_or("DEDUCTION_MAX_ATTEMPTS", defaults.max_attempts)?;
        if max_attempts == 0 {
            anyhow::bail!("DEDUCTION_MAX_ATTEMPTS deve ser ao menos 1");
        }
        let retry_policy = RetryPolicy {
            max_attempts,
            base_backoff: Duration::from_millis(env_or(
                "DEDUCTION_BACKOFF_BASE_MS",
                defaults.base_backoff.as_millis() as u64,
            )?),
            max_backoff: Duration::from_millis(env_or(
                "DEDUCTION_BACKOFF_MAX_MS",
                defaults.max_backoff.as_millis() as u64,
            )?),
        };

        let bootstrap_admin = match (
            env::var("BOOTSTRAP_ADMIN_EMAIL").ok(),
            env::var("BOOTSTRAP_ADMIN_PASSWORD").ok(),
        ) {
            (Some(email), Some(password)) => Some((email, password)),
            _ => None,
        };

        Ok(Self {
            bind_addr: env_or("BIND_ADDR", "0.0.0.0:3000".to_string())?,
            store_backend,
            database_url,
            database_max_connections: env_or("DATABASE_MAX_CONNECTIONS", 5)?,
            jwt_secret,
            token_ttl_days: env_or("TOKEN_TTL_DAYS", 7)?,
            bcrypt_cost: env_or("BCRYPT_COST", bcrypt::DEFAULT_COST)?,
            retry_policy,
            near_expiry_days: env_or("NEAR_EXPIRY_DAYS", DEFAULT_NEAR_EXPIRY_DAYS)?,
            bootstrap_admin,
        })
    }
}

fn env_or<T>(key: &str, default: T) -> anyhow::Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|e| anyhow::anyhow!("Valor inválido para {}: {}", key, e)),
        Err(_) => Ok(default),
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub auth_service: AuthService,
    pub user_service: UserService,
    pub catalog_service: CatalogService,
    pub ledger_service: LedgerService,
    pub deduction_service: DeductionService,
}

impl AppState {
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        // --- Escolhe o store ---
        let (users, catalog, ledger): (Arc<dyn UserStore>, Arc<dyn CatalogStore>, Arc<dyn LedgerStore>) =
            match config.store_backend {
                StoreBackend::Postgres => {
                    let database_url = config
                        .database_url
                        .as_deref()
                        .context("DATABASE_URL deve ser definida")?;

                    // Conecta ao banco de dados, usando '?' para propagar erros
                    let db_pool = PgPoolOptions::new()
                        .max_connections(config.database_max_connections)
                        .acquire_timeout(Duration::from_secs(3))
                        .connect(database_url)
                        .await?;
                    tracing::info!("✅ Conexão com o banco de dados estabelecida com sucesso!");

                    sqlx::migrate!().run(&db_pool).await?;
                    tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");

                    let users: Arc<dyn UserStore> = Arc::new(UserRepository::new(db_pool.clone()));
                    let catalog: Arc<dyn CatalogStore> = Arc::new(CatalogRepository::new(db_pool.clone()));
                    let ledger: Arc<dyn LedgerStore> = Arc::new(LedgerRepository::new(db_pool));
                    (users, catalog, ledger)
                }
                StoreBackend::Memory => {
                    tracing::warn!("⚠️ Usando store em memória: os dados somem ao reiniciar");
                    let store = MemoryStore::new();
                    let users: Arc<dyn UserStore> = Arc::new(store.clone());
                    let catalog: Arc<dyn CatalogStore> = Arc::new(store.clone());
                    let ledger: Arc<dyn LedgerStore> = Arc::new(store);
                    (users, catalog, ledger)
                }
            };

        Ok(Self::from_stores(config, users, catalog, ledger))
    }

    // --- Monta o gráfico de dependências ---
    pub fn from_stores(
        config: Config,
        users: Arc<dyn UserStore>,
        catalog: Arc<dyn CatalogStore>,
        ledger: Arc<dyn LedgerStore>,
    ) -> Self {
        let auth_service = AuthService::new(
            users.clone(),
            config.jwt_secret.clone(),
            chrono::Duration::days(config.token_ttl_days),
            config.bcrypt_cost,
        );

        Self {
            auth_service,
            user_service: UserService::new(users),
            catalog_service: CatalogService::new(catalog.clone()),
            ledger_service: LedgerService::new(catalog, ledger.clone(), config.near_expiry_days),
            deduction_service: DeductionService::new(ledger, config.retry_policy),
            config: Arc::new(config),
        }
    }
}
