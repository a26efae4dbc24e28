// src/services/access.rs

//! Decisão de acesso: função pura de `(principal, ação)` para permitido/negado.
//!
//! Sem I/O e sem estado. Os serviços chamam [`require`] antes de tocar no
//! store, e as rotas usam o mesmo caminho via `RequireAction`.

use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::auth::{Principal, Role},
};

const ALL_ROLES: &[Role] = &[Role::Administrator, Role::StockClerk, Role::Reader];
const STOCK_WRITERS: &[Role] = &[Role::Administrator, Role::StockClerk];
const ADMINISTRATORS: &[Role] = &[Role::Administrator];

/// Ações protegidas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    // Rotas anônimas
    SignIn,
    Register,

    ViewCatalog,
    ViewLedger,
    MutateStock,
    AdministerStock,
    ManageCatalog,
    ManageUsers,

    // Alvo = conta afetada
    ChangeUserRole(Uuid),
    DeleteUser(Uuid),
}

impl Action {
    /// Papéis mínimos exigidos. `None` = acessível sem sessão.
    pub fn required_roles(&self) -> Option<&'static [Role]> {
        match self {
            Action::SignIn | Action::Register => None,
            Action::ViewCatalog | Action::ViewLedger => Some(ALL_ROLES),
            Action::MutateStock => Some(STOCK_WRITERS),
            Action::AdministerStock
            | Action::ManageCatalog
            | Action::ManageUsers
            | Action::ChangeUserRole(_)
            | Action::DeleteUser(_) => Some(ADMINISTRATORS),
        }
    }

    fn target_account(&self) -> Option<Uuid> {
        match self {
            Action::ChangeUserRole(target) | Action::DeleteUser(target) => Some(*target),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Sem sessão: o cliente deve fazer login
    Unauthenticated,
    /// Sessão válida, papel insuficiente
    InsufficientRole,
    /// Alteração de papel/remoção da própria conta
    SelfProtection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Allowed,
    Denied(DenyReason),
}

pub fn authorize(principal: Option<&Principal>, action: Action) -> Decision {
    let Some(required) = action.required_roles() else {
        return Decision::Allowed;
    };

    let Some(principal) = principal else {
        return Decision::Denied(DenyReason::Unauthenticated);
    };

    // Vale mesmo para administradores
    if action.target_account() == Some(principal.id) {
        return Decision::Denied(DenyReason::SelfProtection);
    }

    if required.contains(&principal.role) {
        Decision::Allowed
    } else {
        Decision::Denied(DenyReason::InsufficientRole)
    }
}

/// Versão de [`authorize`] para quem trabalha com `Result`.
pub fn require(principal: Option<&Principal>, action: Action) -> Result<(), AppError> {
    match authorize(principal, action) {
        Decision::Allowed => Ok(()),
        Decision::Denied(reason) => Err(reason.into()),
    }
}

impl From<DenyReason> for AppError {
    fn from(reason: DenyReason) -> Self {
        match reason {
            DenyReason::Unauthenticated => AppError::Unauthenticated,
            DenyReason::InsufficientRole => AppError::Unauthorized,
            DenyReason::SelfProtection => AppError::SelfProtection,
        }
    }
}
