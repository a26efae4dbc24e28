// src/db/memory.rs

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{CasOutcome, CatalogStore, LedgerStore, LotRemoval, UserStore},
    models::{
        auth::{NewUser, Role, User},
        catalog::{Product, ProductPayload},
        stock::{Deduction, LotEdit, NewDeduction, NewLot, StockLot},
    },
};

#[derive(Default)]
struct MemoryState {
    products: HashMap<Uuid, Product>,
    lots: HashMap<Uuid, StockLot>,
    deductions: Vec<Deduction>,
    users: HashMap<Uuid, User>,
}

/// Store em memória com as mesmas garantias do Postgres: cada operação roda
/// sob um único lock de escrita, então o compare-and-swap é atômico.
#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CatalogStore for MemoryStore {
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, AppError> {
        Ok(self.state.read().await.products.get(&id).cloned())
    }

    async fn list_products(&self) -> Result<Vec<Product>, AppError> {
        let mut products: Vec<Product> = self.state.read().await.products.values().cloned().collect();
        products.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        Ok(products)
    }

    async fn create_product(&self, payload: &ProductPayload) -> Result<Product, AppError> {
        let now = Utc::now();
        let product = Product {
            id: Uuid::new_v4(),
            name: payload.name.clone(),
            product_type: payload.product_type.clone(),
            brand: payload.brand.clone(),
            unit: payload.unit.clone(),
            description: payload.description.clone(),
            image_url: payload.image_url.clone(),
            created_at: now,
            updated_at: now,
        };
        self.state.write().await.products.insert(product.id, product.clone());
        Ok(product)
    }

    async fn update_product(
        &self,
        id: Uuid,
        payload: &ProductPayload,
    ) -> Result<Option<Product>, AppError> {
        let mut state = self.state.write().await;
        let Some(product) = state.products.get_mut(&id) else {
            return Ok(None);
        };
        product.name = payload.name.clone();
        product.product_type = payload.product_type.clone();
        product.brand = payload.brand.clone();
        product.unit = payload.unit.clone();
        product.description = payload.description.clone();
        product.image_url = payload.image_url.clone();
        product.updated_at = Utc::now();
        Ok(Some(product.clone()))
    }

    async fn delete_product(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(self.state.write().await.products.remove(&id).is_some())
    }
}

#[async_trait]
impl LedgerStore for MemoryStore {
    async fn get_lot(&self, id: Uuid) -> Result<Option<StockLot>, AppError> {
        Ok(self.state.read().await.lots.get(&id).cloned())
    }

    async fn list_lots(&self) -> Result<Vec<StockLot>, AppError> {
        let mut lots: Vec<StockLot> = self.state.read().await.lots.values().cloned().collect();
        lots.sort_by(|a, b| a.registered_at.cmp(&b.registered_at).then(a.id.cmp(&b.id)));
        Ok(lots)
    }

    async fn insert_lot(&self, lot: &NewLot) -> Result<StockLot, AppError> {
        let now = Utc::now();
        let created = StockLot {
            id: Uuid::new_v4(),
            product_id: lot.product_id,
            lot_code: lot.lot_code.clone(),
            quantity: lot.quantity,
            initial_quantity: lot.quantity,
            expiry_date: lot.expiry_date,
            location: lot.location.clone(),
            registered_at: now,
            registered_by: lot.registered_by,
            last_edited_at: now,
            last_edited_by: lot.registered_by,
            version: 1,
        };
        self.state.write().await.lots.insert(created.id, created.clone());
        Ok(created)
    }

    async fn edit_lot(
        &self,
        id: Uuid,
        edit: &LotEdit,
        editor: Uuid,
    ) -> Result<Option<StockLot>, AppError> {
        let mut state = self.state.write().await;
        let Some(lot) = state.lots.get_mut(&id) else {
            return Ok(None);
        };
        if let Some(code) = &edit.lot_code {
            lot.lot_code = code.clone();
        }
        if let Some(location) = &edit.location {
            lot.location = location.clone();
        }
        if let Some(expiry) = edit.expiry_date {
            lot.expiry_date = expiry;
        }
        lot.last_edited_at = Utc::now();
        lot.last_edited_by = editor;
        lot.version += 1;
        Ok(Some(lot.clone()))
    }

    async fn restock_lot(
        &self,
        id: Uuid,
        amount: i64,
        editor: Uuid,
    ) -> Result<Option<StockLot>, AppError> {
        let mut state = self.state.write().await;
        let Some(lot) = state.lots.get_mut(&id) else {
            return Ok(None);
        };
        // Mesmo efeito do "bigint out of range" do Postgres: nada é escrito
        let (Some(quantity), Some(initial_quantity)) = (
            lot.quantity.checked_add(amount),
            lot.initial_quantity.checked_add(amount),
        ) else {
            return Err(restock_overflow());
        };
        lot.quantity = quantity;
        lot.initial_quantity = initial_quantity;
        lot.last_edited_at = Utc::now();
        lot.last_edited_by = editor;
        lot.version += 1;
        Ok(Some(lot.clone()))
    }

    async fn delete_empty_lot(&self, id: Uuid) -> Result<LotRemoval, AppError> {
        let mut state = self.state.write().await;
        let removal = match state.lots.get(&id) {
            None => LotRemoval::NotFound,
            Some(lot) if lot.quantity > 0 => LotRemoval::HasStock(lot.quantity),
            Some(_) => LotRemoval::Removed,
        };
        if removal == LotRemoval::Removed {
            state.lots.remove(&id);
        }
        Ok(removal)
    }

    async fn apply_deduction_if_unchanged(
        &self,
        expected_quantity: i64,
        deduction: &NewDeduction,
    ) -> Result<CasOutcome, AppError> {
        let mut state = self.state.write().await;

        let Some(lot) = state.lots.get_mut(&deduction.lot_id) else {
            return Ok(CasOutcome::Stale);
        };
        if lot.quantity != expected_quantity || lot.quantity < deduction.quantity {
            return Ok(CasOutcome::Stale);
        }

        lot.quantity -= deduction.quantity;
        lot.version += 1;
        let lot = lot.clone();

        let created = Deduction {
            id: Uuid::new_v4(),
            lot_id: deduction.lot_id,
            product_id: deduction.product_id,
            quantity: deduction.quantity,
            reason: deduction.reason,
            note: deduction.note.clone(),
            acting_principal_id: deduction.acting_principal_id,
            acting_principal_name: deduction.acting_principal_name.clone(),
            occurred_at: Utc::now(),
        };
        state.deductions.push(created.clone());

        Ok(CasOutcome::Applied { deduction: created, lot })
    }

    async fn list_deductions(&self) -> Result<Vec<Deduction>, AppError> {
        Ok(self.state.read().await.deductions.clone())
    }

    async fn deductions_for_lot(&self, lot_id: Uuid) -> Result<Vec<Deduction>, AppError> {
        Ok(self
            .state
            .read()
            .await
            .deductions
            .iter()
            .filter(|d| d.lot_id == lot_id)
            .cloned()
            .collect())
    }
}

fn restock_overflow() -> AppError {
    AppError::InvalidArgument("A reposição excede o saldo máximo do lote.".into())
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError> {
        Ok(self
            .state
            .read()
            .await
            .users
            .values()
            .find(|u| u.email.eq_ignore_ascii_case(email))
            .cloned())
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError> {
        Ok(self.state.read().await.users.get(&id).cloned())
    }

    async fn create_user(&self, user: &NewUser) -> Result<User, AppError> {
        let mut state = self.state.write().await;
        if state.users.values().any(|u| u.email.eq_ignore_ascii_case(&user.email)) {
            return Err(AppError::EmailAlreadyExists);
        }
        let now = Utc::now();
        let created = User {
            id: Uuid::new_v4(),
            email: user.email.clone(),
            password_hash: user.password_hash.clone(),
            display_name: user.display_name.clone(),
            employee_code: user.employee_code.clone(),
            role: user.role,
            created_at: now,
            updated_at: now,
        };
        state.users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn list_users(&self) -> Result<Vec<User>, AppError> {
        let mut users: Vec<User> = self.state.read().await.users.values().cloned().collect();
        users.sort_by(|a, b| a.display_name.cmp(&b.display_name).then(a.id.cmp(&b.id)));
        Ok(users)
    }

    async fn update_role(&self, id: Uuid, role: Role) -> Result<Option<User>, AppError> {
        let mut state = self.state.write().await;
        let Some(user) = state.users.get_mut(&id) else {
            return Ok(None);
        };
        user.role = role;
        user.updated_at = Utc::now();
        Ok(Some(user.clone()))
    }

    async fn delete_user(&self, id: Uuid) -> Result<bool, AppError> {
        Ok(self.state.write().await.users.remove(&id).is_some())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::stock::DeductionReason;

    fn new_lot(quantity: i64) -> NewLot {
        NewLot {
            product_id: Uuid::new_v4(),
            lot_code: "L-01".into(),
            quantity,
            expiry_date: None,
            location: "Almoxarifado".into(),
            registered_by: Uuid::new_v4(),
        }
    }

    fn deduction_for(lot: &StockLot, quantity: i64) -> NewDeduction {
        NewDeduction {
            lot_id: lot.id,
            product_id: lot.product_id,
            quantity,
            reason: DeductionReason::Consumption,
            note: None,
            acting_principal_id: Uuid::new_v4(),
            acting_principal_name: "Operador".into(),
        }
    }

    #[tokio::test]
    async fn cas_rejects_stale_snapshot_without_writing() {
        let store = MemoryStore::new();
        let lot = store.insert_lot(&new_lot(10)).await.unwrap();

        let outcome = store
            .apply_deduction_if_unchanged(9, &deduction_for(&lot, 2))
            .await
            .unwrap();

        assert_eq!(outcome, CasOutcome::Stale);
        assert_eq!(store.get_lot(lot.id).await.unwrap().unwrap().quantity, 10);
        assert!(store.list_deductions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cas_applies_lot_and_record_together() {
        let store = MemoryStore::new();
        let lot = store.insert_lot(&new_lot(10)).await.unwrap();

        let outcome = store
            .apply_deduction_if_unchanged(10, &deduction_for(&lot, 3))
            .await
            .unwrap();

        let CasOutcome::Applied { deduction, lot: updated } = outcome else {
            panic!("esperava baixa aplicada");
        };
        assert_eq!(updated.quantity, 7);
        assert_eq!(updated.version, lot.version + 1);
        assert_eq!(deduction.quantity, 3);
        assert_eq!(store.deductions_for_lot(lot.id).await.unwrap(), vec![deduction]);
    }

    #[tokio::test]
    async fn restock_overflow_leaves_lot_untouched() {
        let store = MemoryStore::new();
        let lot = store.insert_lot(&new_lot(i64::MAX - 1)).await.unwrap();
        assert_eq!(lot.version, 1);

        let result = store.restock_lot(lot.id, 5, Uuid::new_v4()).await;
        assert!(matches!(result, Err(AppError::InvalidArgument(_))));

        let stored = store.get_lot(lot.id).await.unwrap().unwrap();
        assert_eq!(stored, lot);

        let restocked = store.restock_lot(lot.id, 1, Uuid::new_v4()).await.unwrap().unwrap();
        assert_eq!(restocked.quantity, i64::MAX);
        assert_eq!(restocked.version, 2);
    }

    #[tokio::test]
    async fn delete_is_blocked_while_stocked() {
        let store = MemoryStore::new();
        let lot = store.insert_lot(&new_lot(2)).await.unwrap();
        let empty = store.insert_lot(&new_lot(0)).await.unwrap();

        assert_eq!(store.delete_empty_lot(lot.id).await.unwrap(), LotRemoval::HasStock(2));
        assert_eq!(store.delete_empty_lot(empty.id).await.unwrap(), LotRemoval::Removed);
        assert_eq!(store.delete_empty_lot(empty.id).await.unwrap(), LotRemoval::NotFound);
    }

    #[tokio::test]
    async fn emails_are_unique_ignoring_case() {
        let store = MemoryStore::new();
        let user = NewUser {
            email: "ana@estoque.com".into(),
            password_hash: "hash".into(),
            display_name: "Ana".into(),
            employee_code: None,
            role: Role::Reader,
        };
        store.create_user(&user).await.unwrap();

        let duplicate = NewUser { email: "ANA@estoque.com".into(), ..user };
        assert!(matches!(
            store.create_user(&duplicate).await,
            Err(AppError::EmailAlreadyExists)
        ));
    }
}
