// src/services/user_service.rs

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::UserStore,
    models::auth::{Principal, Role, User},
    services::access::{self, Action},
};

#[derive(Clone)]
pub struct UserService {
    users: Arc<dyn UserStore>,
}

impl UserService {
    pub fn new(users: Arc<dyn UserStore>) -> Self {
        Self { users }
    }

    /// Perfil do próprio usuário (qualquer sessão válida).
    pub async fn me(&self, principal: &Principal) -> Result<User, AppError> {
        self.users
            .find_by_id(principal.id)
            .await?
            .ok_or(AppError::InvalidToken)
    }

    pub async fn list_users(&self, principal: &Principal) -> Result<Vec<User>, AppError> {
        access::require(Some(principal), Action::ManageUsers)?;
        self.users.list_users().await
    }

    pub async fn change_role(
        &self,
        principal: &Principal,
        target: Uuid,
        role: Role,
    ) -> Result<User, AppError> {
        access::require(Some(principal), Action::ChangeUserRole(target))?;

        let user = self
            .users
            .update_role(target, role)
            .await?
            .ok_or_else(|| AppError::not_found("Usuário", target))?;

        tracing::info!(
            user_id = %target,
            changed_by = %principal.id,
            "🔐 Papel alterado para {:?}",
            role
        );
        Ok(user)
    }

    pub async fn delete_user(&self, principal: &Principal, target: Uuid) -> Result<(), AppError> {
        access::require(Some(principal), Action::DeleteUser(target))?;

        if !self.users.delete_user(target).await? {
            return Err(AppError::not_found("Usuário", target));
        }

        tracing::info!(user_id = %target, deleted_by = %principal.id, "🗑️ Usuário removido");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::auth::NewUser;

    async fn seed(store: &MemoryStore, email: &str, role: Role) -> Principal {
        store
            .create_user(&NewUser {
                email: email.into(),
                password_hash: "hash".into(),
                display_name: email.into(),
                employee_code: None,
                role,
            })
            .await
            .unwrap()
            .principal()
    }

    #[tokio::test]
    async fn administrator_manages_other_accounts() {
        let store = MemoryStore::new();
        let service = UserService::new(Arc::new(store.clone()));
        let admin = seed(&store, "admin@estoque.com", Role::Administrator).await;
        let reader = seed(&store, "leitor@estoque.com", Role::Reader).await;

        assert_eq!(service.list_users(&admin).await.unwrap().len(), 2);

        let promoted = service.change_role(&admin, reader.id, Role::StockClerk).await.unwrap();
        assert_eq!(promoted.role, Role::StockClerk);

        service.delete_user(&admin, reader.id).await.unwrap();
        assert!(matches!(
            service.delete_user(&admin, reader.id).await,
            Err(AppError::NotFound { entity: "Usuário", .. })
        ));
        assert!(matches!(
            service.change_role(&admin, Uuid::new_v4(), Role::Reader).await,
            Err(AppError::NotFound { .. })
        ));
    }

    #[tokio::test]
    async fn administrator_cannot_touch_own_account() {
        let store = MemoryStore::new();
        let service = UserService::new(Arc::new(store.clone()));
        let admin = seed(&store, "admin@estoque.com", Role::Administrator).await;

        assert!(matches!(
            service.change_role(&admin, admin.id, Role::Reader).await,
            Err(AppError::SelfProtection)
        ));
        assert!(matches!(service.delete_user(&admin, admin.id).await, Err(AppError::SelfProtection)));

        // Nada mudou
        assert_eq!(service.me(&admin).await.unwrap().role, Role::Administrator);
    }

    #[tokio::test]
    async fn non_administrators_are_denied() {
        let store = MemoryStore::new();
        let service = UserService::new(Arc::new(store.clone()));
        let clerk = seed(&store, "op@estoque.com", Role::StockClerk).await;
        let reader = seed(&store, "leitor@estoque.com", Role::Reader).await;

        assert!(matches!(service.list_users(&clerk).await, Err(AppError::Unauthorized)));
        assert!(matches!(
            service.change_role(&clerk, reader.id, Role::Administrator).await,
            Err(AppError::Unauthorized)
        ));
        assert!(matches!(service.delete_user(&reader, clerk.id).await, Err(AppError::Unauthorized)));
    }
}
