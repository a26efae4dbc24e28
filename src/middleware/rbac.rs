// src/middleware/rbac.rs

use axum::{extract::FromRequestParts, http::request::Parts};
use std::marker::PhantomData;

use crate::{
    common::error::{ApiError, AppError},
    middleware::{auth::AuthenticatedUser, i18n::Locale},
    services::access::{self, Action, Decision},
};

/// 1. O Trait que liga um tipo-marcador a uma ação protegida
pub trait ActionDef: Send + Sync + 'static {
    fn action() -> Action;
}

/// 2. O Extractor (Guardião)
pub struct RequireAction<A>(pub PhantomData<A>);

// 3. Implementação do FromRequestParts: mesma decisão pura usada pelos serviços

impl<A, S> FromRequestParts<S> for RequireAction<A>
where
    A: ActionDef,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let principal = parts
            .extensions
            .get::<AuthenticatedUser>()
            .map(|user| &user.0);

        match access::authorize(principal, A::action()) {
            Decision::Allowed => Ok(RequireAction(PhantomData)),
            Decision::Denied(reason) => {
                let locale = Locale::from_headers(&parts.headers);
                Err(AppError::from(reason).to_api_error(&locale))
            }
        }
    }
}

// ---
// DEFINIÇÃO DAS AÇÕES (TIPOS)
// ---

pub struct CanViewCatalog;
impl ActionDef for CanViewCatalog {
    fn action() -> Action { Action::ViewCatalog }
}

pub struct CanViewLedger;
impl ActionDef for CanViewLedger {
    fn action() -> Action { Action::ViewLedger }
}

pub struct CanMutateStock;
impl ActionDef for CanMutateStock {
    fn action() -> Action { Action::MutateStock }
}

pub struct CanAdministerStock;
impl ActionDef for CanAdministerStock {
    fn action() -> Action { Action::AdministerStock }
}

pub struct CanManageCatalog;
impl ActionDef for CanManageCatalog {
    fn action() -> Action { Action::ManageCatalog }
}

pub struct CanManageUsers;
impl ActionDef for CanManageUsers {
    fn action() -> Action { Action::ManageUsers }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::auth::{Principal, Role};
    use axum::http::{header, Request, StatusCode};
    use uuid::Uuid;

    fn parts_for(role: Option<Role>) -> Parts {
        let (mut parts, _) = Request::builder()
            .header(header::ACCEPT_LANGUAGE, "en-US")
            .body(())
            .unwrap()
            .into_parts();
        if let Some(role) = role {
            parts.extensions.insert(AuthenticatedUser(Principal {
                id: Uuid::new_v4(),
                role,
                display_name: "Teste".into(),
            }));
        }
        parts
    }

    #[tokio::test]
    async fn guard_follows_the_access_decision() {
        let mut clerk = parts_for(Some(Role::StockClerk));
        assert!(RequireAction::<CanMutateStock>::from_request_parts(&mut clerk, &()).await.is_ok());

        let Err(denied) = RequireAction::<CanAdministerStock>::from_request_parts(&mut clerk, &()).await else {
            panic!("operador não pode administrar lotes");
        };
        assert_eq!(denied.status, StatusCode::FORBIDDEN);
        assert_eq!(denied.error, "You are not allowed to perform this action.");

        let mut anonymous = parts_for(None);
        let Err(denied) = RequireAction::<CanViewLedger>::from_request_parts(&mut anonymous, &()).await else {
            panic!("sem sessão deve ser negado");
        };
        assert_eq!(denied.status, StatusCode::UNAUTHORIZED);
    }
}
