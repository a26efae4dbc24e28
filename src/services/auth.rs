// src/services/auth.rs

use std::sync::Arc;

use bcrypt::{hash, verify};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use tokio::sync::{watch, RwLock};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::UserStore,
    models::auth::{Claims, NewUser, Principal, Role, User},
};

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    jwt_secret: String,
    token_ttl: chrono::Duration,
    bcrypt_cost: u32,
}

impl AuthService {
    pub fn new(
        users: Arc<dyn UserStore>,
        jwt_secret: String,
        token_ttl: chrono::Duration,
        bcrypt_cost: u32,
    ) -> Self {
        Self { users, jwt_secret, token_ttl, bcrypt_cost }
    }

    /// Cadastro público: toda conta nova nasce como `Reader`.
    pub async fn register_user(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
        employee_code: Option<&str>,
    ) -> Result<(String, Principal), AppError> {
        let user = self
            .create_account(email, password, display_name, employee_code, Role::Reader)
            .await?;

        tracing::info!(user_id = %user.id, "✅ Usuário registrado");

        let principal = user.principal();
        Ok((self.create_token(user.id)?, principal))
    }

    /// `signIn(email, password) -> Principal`, junto com o token da sessão.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<(String, Principal), AppError> {
        let user = self
            .users
            .find_by_email(email.trim())
            .await?
            .ok_or(AppError::InvalidCredentials)?;

        let password_clone = password.to_owned();
        let password_hash_clone = user.password_hash.clone();

        // Executa a verificação em um thread separado
        let is_password_valid = tokio::task::spawn_blocking(move || {
            verify(&password_clone, &password_hash_clone)
        })
        .await
        .map_err(|e| anyhow::anyhow!("Falha na task de verificação de senha: {}", e))??;

        if !is_password_valid {
            return Err(AppError::InvalidCredentials);
        }

        let principal = user.principal();
        Ok((self.create_token(user.id)?, principal))
    }

    /// Resolve o principal atual a partir do token. Conta removida invalida o token.
    pub async fn validate_token(&self, token: &str) -> Result<Principal, AppError> {
        let token_data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.jwt_secret.as_ref()),
            &Validation::default(),
        )
        .map_err(|_| AppError::InvalidToken)?;

        self.users
            .find_by_id(token_data.claims.sub)
            .await?
            .map(|user| user.principal())
            .ok_or(AppError::InvalidToken)
    }

    /// Garante um administrador inicial. Não mexe numa conta já existente.
    pub async fn ensure_bootstrap_admin(&self, email: &str, password: &str) -> Result<(), AppError> {
        if self.users.find_by_email(email).await?.is_some() {
            return Ok(());
        }

        let admin = self
            .create_account(email, password, "Administrador", None, Role::Administrator)
            .await?;
        tracing::info!(user_id = %admin.id, "🔑 Administrador inicial criado");
        Ok(())
    }

    async fn create_account(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
        employee_code: Option<&str>,
        role: Role,
    ) -> Result<User, AppError> {
        // Hashing fora do runtime assíncrono
        let password_clone = password.to_owned();
        let cost = self.bcrypt_cost;
        let password_hash = tokio::task::spawn_blocking(move || hash(&password_clone, cost))
            .await
            .map_err(|e| anyhow::anyhow!("Falha na task de hashing: {}", e))??;

        self.users
            .create_user(&NewUser {
                email: email.trim().to_string(),
                password_hash,
                display_name: display_name.trim().to_string(),
                employee_code: employee_code
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(String::from),
                role,
            })
            .await
    }

    fn create_token(&self, user_id: Uuid) -> Result<String, AppError> {
        let now = Utc::now();
        let expires_at = now + self.token_ttl;

        let claims = Claims {
            sub: user_id,
            exp: expires_at.timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_ref()),
        )?)
    }
}

// ---
// Sessão do cliente
// ---
// O lado "consumidor" do provedor de identidade: guarda o token e publica as
// trocas de principal (login/logout) num `watch`. Quem precisa do principal
// recebe uma cópia e passa adiante explicitamente.
// O servidor HTTP é sem estado e não guarda sessão; só clientes a usam.

#[allow(dead_code)]
pub struct Session {
    auth: AuthService,
    token: RwLock<Option<String>>,
    principal: watch::Sender<Option<Principal>>,
}

#[allow(dead_code)]
impl Session {
    pub fn new(auth: AuthService) -> Self {
        let (principal, _) = watch::channel(None);
        Self { auth, token: RwLock::new(None), principal }
    }

    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Principal, AppError> {
        let (token, principal) = self.auth.sign_in(email, password).await?;
        *self.token.write().await = Some(token);
        self.principal.send_replace(Some(principal.clone()));
        Ok(principal)
    }

    pub async fn sign_out(&self) {
        *self.token.write().await = None;
        self.principal.send_replace(None);
    }

    /// Revalida o token guardado; se não vale mais, encerra a sessão.
    pub async fn refresh(&self) -> Result<Option<Principal>, AppError> {
        let Some(token) = self.token.read().await.clone() else {
            return Ok(None);
        };

        match self.auth.validate_token(&token).await {
            Ok(principal) => {
                self.principal.send_if_modified(|current| {
                    let changed = current.as_ref() != Some(&principal);
                    *current = Some(principal.clone());
                    changed
                });
                Ok(Some(principal))
            }
            Err(AppError::InvalidToken) => {
                self.sign_out().await;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    pub fn current_principal(&self) -> Option<Principal> {
        self.principal.borrow().clone()
    }

    pub async fn token(&self) -> Option<String> {
        self.token.read().await.clone()
    }

    /// `currentPrincipalStream()`
    pub fn subscribe(&self) -> watch::Receiver<Option<Principal>> {
        self.principal.subscribe()
    }
}
