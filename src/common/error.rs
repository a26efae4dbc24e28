// src/common/error.rs

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::{json, Value};
use thiserror::Error;
use uuid::Uuid;

use crate::middleware::i18n::Locale;

// ---
// Erro de domínio
// ---
// Cada caminho de falha volta tipado para quem chamou. Os handlers convertem
// para `ApiError` (com a mensagem no idioma do cliente).
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Erro de validação")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("Argumento inválido: {0}")]
    InvalidArgument(String),

    #[error("Sessão ausente")]
    Unauthenticated,

    #[error("Permissão insuficiente")]
    Unauthorized,

    #[error("Operação proibida sobre a própria conta")]
    SelfProtection,

    #[error("{entity} {id} não encontrado")]
    NotFound { entity: &'static str, id: Uuid },

    #[error("Estoque insuficiente: pedido {requested}, disponível {available}")]
    InsufficientStock { requested: i64, available: i64 },

    #[error("Conflito de concorrência após {attempts} tentativas")]
    Conflict { attempts: u32 },

    #[error("Lote {0} ainda possui saldo")]
    LotHasStock(Uuid),

    #[error("E-mail já existe")]
    EmailAlreadyExists,

    #[error("Credenciais inválidas")]
    InvalidCredentials,

    #[error("Token inválido")]
    InvalidToken,

    // Falha de I/O no banco: quem chamou decide se tenta de novo
    #[error("Banco de dados indisponível: {0}")]
    Unavailable(sqlx::Error),

    #[error("Erro interno do servidor: {0}")]
    Internal(#[from] anyhow::Error),

    #[error("Erro de Bcrypt: {0}")]
    BcryptError(#[from] bcrypt::BcryptError),

    #[error("Erro de JWT: {0}")]
    JwtError(#[from] jsonwebtoken::errors::Error),
}

// ---
// Classificação dos erros do sqlx
// ---
// Classes SQLSTATE 22 (dado inválido) e 23 (restrição violada) falham igual a
// cada nova tentativa. Conexão, pool e transações abortadas ficam `Unavailable`.
impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        let rejected_code = err
            .as_database_error()
            .and_then(|db_err| db_err.code())
            .filter(|code| code.starts_with("22") || code.starts_with("23"))
            .map(|code| code.into_owned());

        if let Some(code) = rejected_code {
            tracing::warn!(sqlstate = %code, "Banco rejeitou a operação: {}", err);
            return AppError::InvalidArgument(
                "Valor rejeitado pelo banco de dados.".to_string(),
            );
        }

        match err {
            sqlx::Error::Database(_)
            | sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::Protocol(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed
            | sqlx::Error::WorkerCrashed
            | sqlx::Error::BeginFailed => AppError::Unavailable(err),
            // Decodificação, esquema, configuração: defeito nosso
            other => AppError::Internal(anyhow::Error::new(other)),
        }
    }
}

impl AppError {
    pub fn not_found(entity: &'static str, id: Uuid) -> Self {
        AppError::NotFound { entity, id }
    }

    pub fn status(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) | AppError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthenticated | AppError::InvalidCredentials | AppError::InvalidToken => {
                StatusCode::UNAUTHORIZED
            }
            AppError::Unauthorized | AppError::SelfProtection => StatusCode::FORBIDDEN,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::InsufficientStock { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Conflict { .. } | AppError::LotHasStock(_) | AppError::EmailAlreadyExists => {
                StatusCode::CONFLICT
            }
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) | AppError::BcryptError(_) | AppError::JwtError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Converte para a resposta HTTP, traduzindo a mensagem para o idioma pedido.
    pub fn to_api_error(&self, locale: &Locale) -> ApiError {
        let status = self.status();
        let english = locale.is_english();

        if status.is_server_error() {
            // O detalhe técnico vai só para o log
            tracing::error!("Erro Interno do Servidor: {}", self);
        }

        let error = match self {
            AppError::ValidationError(_) => pick(english, "Um ou mais campos são inválidos.", "One or more fields are invalid."),
            AppError::InvalidArgument(msg) => msg.clone(),
            AppError::Unauthenticated => pick(english, "Faça login para continuar.", "Please sign in to continue."),
            AppError::Unauthorized => pick(english, "Você não tem permissão para realizar esta ação.", "You are not allowed to perform this action."),
            AppError::SelfProtection => pick(english, "Não é permitido alterar ou excluir a própria conta.", "You cannot change or delete your own account."),
            AppError::NotFound { entity, .. } => {
                if english {
                    format!("{} not found.", entity_name_en(entity))
                } else {
                    format!("{} não encontrado.", entity)
                }
            }
            AppError::InsufficientStock { requested, available } => {
                if english {
                    format!("Insufficient stock: requested {}, available {}.", requested, available)
                } else {
                    format!("Estoque insuficiente: solicitado {}, disponível {}.", requested, available)
                }
            }
            AppError::Conflict { .. } => pick(english, "O lote foi alterado por outra operação. Tente novamente.", "The lot was changed by another operation. Please retry."),
            AppError::LotHasStock(_) => pick(english, "Não é possível excluir um lote com saldo.", "A lot with remaining stock cannot be deleted."),
            AppError::EmailAlreadyExists => pick(english, "Este e-mail já está em uso.", "This e-mail is already in use."),
            AppError::InvalidCredentials => pick(english, "E-mail ou senha inválidos.", "Invalid e-mail or password."),
            AppError::InvalidToken => pick(english, "Token de autenticação inválido ou ausente.", "Invalid or missing authentication token."),
            AppError::Unavailable(_) => pick(english, "Serviço temporariamente indisponível.", "Service temporarily unavailable."),
            AppError::Internal(_) | AppError::BcryptError(_) | AppError::JwtError(_) => {
                pick(english, "Ocorreu um erro inesperado.", "An unexpected error occurred.")
            }
        };

        let details = match self {
            // Retorna todos os detalhes da validação, campo a campo.
            AppError::ValidationError(errors) => {
                let mut details = std::collections::HashMap::new();
                for (field, field_errors) in errors.field_errors() {
                    let messages: Vec<String> = field_errors
                        .iter()
                        .map(|e| {
                            e.message
                                .as_ref()
                                .map(|m| m.to_string())
                                .unwrap_or_else(|| e.code.to_string())
                        })
                        .collect();
                    details.insert(field.to_string(), messages);
                }
                Some(json!(details))
            }
            AppError::InsufficientStock { requested, available } => {
                Some(json!({ "requested": requested, "available": available }))
            }
            AppError::Conflict { attempts } => Some(json!({ "attempts": attempts })),
            _ => None,
        };

        ApiError { status, error, details }
    }
}

fn pick(english: bool, pt: &str, en: &str) -> String {
    if english { en.to_string() } else { pt.to_string() }
}

fn entity_name_en(entity: &str) -> &str {
    match entity {
        "Produto" => "Product",
        "Lote" => "Lot",
        "Usuário" => "User",
        other => other,
    }
}

// ---
// Erro de API (o que sai no JSON)
// ---
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub error: String,
    pub details: Option<Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = match self.details {
            Some(details) => json!({ "error": self.error, "details": details }),
            None => json!({ "error": self.error }),
        };
        (self.status, Json(body)).into_response()
    }
}

// Sem contexto de idioma (ex.: middleware), responde no padrão.
impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.to_api_error(&Locale::default()).into_response()
    }
}
