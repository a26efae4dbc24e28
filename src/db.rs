// src/db.rs

use async_trait::async_trait;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    models::{
        auth::{NewUser, Role, User},
        catalog::{Product, ProductPayload},
        stock::{Deduction, LotEdit, NewDeduction, NewLot, StockLot},
    },
};

pub mod user_repo;
pub use user_repo::UserRepository;
pub mod catalog_repo;
pub use catalog_repo::CatalogRepository;
pub mod ledger_repo;
pub use ledger_repo::LedgerRepository;
pub mod memory;
pub use memory::MemoryStore;

// ---
// Portas de persistência
// ---
// Os serviços só conhecem estes traits. Há uma implementação Postgres
// (produção) e uma em memória (testes e `STORE_BACKEND=memory`).

#[async_trait]
pub trait CatalogStore: Send + Sync {
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, AppError>;

    async fn list_products(&self) -> Result<Vec<Product>, AppError>;

    async fn create_product(&self, payload: &ProductPayload) -> Result<Product, AppError>;

    async fn update_product(
        &self,
        id: Uuid,
        payload: &ProductPayload,
    ) -> Result<Option<Product>, AppError>;

    async fn delete_product(&self, id: Uuid) -> Result<bool, AppError>;
}

/// Resultado da escrita condicional de uma baixa.
#[derive(Debug, Clone, PartialEq)]
pub enum CasOutcome {
    /// O saldo ainda era o lido: lote decrementado e baixa gravada juntos.
    Applied { deduction: Deduction, lot: StockLot },
    /// Outra escrita mudou o saldo (ou removeu o lote) desde a leitura.
    Stale,
}

/// Resultado da remoção de um lote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LotRemoval {
    Removed,
    NotFound,
    HasStock(i64),
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get_lot(&self, id: Uuid) -> Result<Option<StockLot>, AppError>;

    async fn list_lots(&self) -> Result<Vec<StockLot>, AppError>;

    async fn insert_lot(&self, lot: &NewLot) -> Result<StockLot, AppError>;

    /// Edição de metadados: último a escrever vence.
    async fn edit_lot(
        &self,
        id: Uuid,
        edit: &LotEdit,
        editor: Uuid,
    ) -> Result<Option<StockLot>, AppError>;

    /// Soma `amount` em `quantity` e em `initial_quantity` numa única escrita.
    async fn restock_lot(
        &self,
        id: Uuid,
        amount: i64,
        editor: Uuid,
    ) -> Result<Option<StockLot>, AppError>;

    /// Remove o lote apenas se o saldo for zero.
    async fn delete_empty_lot(&self, id: Uuid) -> Result<LotRemoval, AppError>;

    /// Compare-and-swap: decrementa o lote `deduction.lot_id` somente se o saldo
    /// gravado ainda for `expected_quantity`, e insere a baixa na mesma operação.
    async fn apply_deduction_if_unchanged(
        &self,
        expected_quantity: i64,
        deduction: &NewDeduction,
    ) -> Result<CasOutcome, AppError>;

    async fn list_deductions(&self) -> Result<Vec<Deduction>, AppError>;

    async fn deductions_for_lot(&self, lot_id: Uuid) -> Result<Vec<Deduction>, AppError>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_by_email(&self, email: &str) -> Result<Option<User>, AppError>;

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, AppError>;

    async fn create_user(&self, user: &NewUser) -> Result<User, AppError>;

    async fn list_users(&self) -> Result<Vec<User>, AppError>;

    async fn update_role(&self, id: Uuid, role: Role) -> Result<Option<User>, AppError>;

    async fn delete_user(&self, id: Uuid) -> Result<bool, AppError>;
}
