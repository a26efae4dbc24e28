// src/services/ledger_service.rs

use std::{collections::HashMap, sync::Arc};

use chrono::{Local, NaiveDate};
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{CatalogStore, LedgerStore, LotRemoval},
    models::{
        auth::Principal,
        catalog::Product,
        stock::{DeductionView, LotBalance, LotEdit, LotView, NewLot, StockLot, MAX_RESTOCK_AMOUNT},
    },
    services::{
        access::{self, Action},
        ledger_query::{self, DeductionFilter, DeductionSort, LotFilter, LotSort},
    },
};

/// Dados de um lote novo, já validados no formato.
#[derive(Debug, Clone)]
pub struct LotRegistration {
    pub product_id: Uuid,
    pub lot_code: String,
    pub quantity: i64,
    pub expiry_date: Option<NaiveDate>,
    pub location: String,
}

#[derive(Clone)]
pub struct LedgerService {
    catalog: Arc<dyn CatalogStore>,
    ledger: Arc<dyn LedgerStore>,
    near_expiry_days: u32,
}

impl LedgerService {
    pub fn new(
        catalog: Arc<dyn CatalogStore>,
        ledger: Arc<dyn LedgerStore>,
        near_expiry_days: u32,
    ) -> Self {
        Self { catalog, ledger, near_expiry_days }
    }

    // "Hoje" fixado uma vez por consulta
    fn today() -> NaiveDate {
        Local::now().date_naive()
    }

    async fn products_by_id(&self) -> Result<HashMap<Uuid, Product>, AppError> {
        Ok(self
            .catalog
            .list_products()
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect())
    }

    async fn existing_lot(&self, id: Uuid) -> Result<StockLot, AppError> {
        self.ledger
            .get_lot(id)
            .await?
            .ok_or_else(|| AppError::not_found("Lote", id))
    }

    // ---
    // Cadastro e administração de lotes
    // ---

    pub async fn register_lot(
        &self,
        principal: &Principal,
        registration: LotRegistration,
    ) -> Result<StockLot, AppError> {
        if registration.quantity < 0 {
            return Err(AppError::InvalidArgument("A quantidade não pode ser negativa.".into()));
        }
        let lot_code = required_text(&registration.lot_code, "O código do lote é obrigatório.")?;
        let location = required_text(&registration.location, "O local é obrigatório.")?;
        access::require(Some(principal), Action::MutateStock)?;

        // O lote precisa apontar para um produto que existe no momento do cadastro
        if self.catalog.get_product(registration.product_id).await?.is_none() {
            return Err(AppError::not_found("Produto", registration.product_id));
        }

        let lot = self
            .ledger
            .insert_lot(&NewLot {
                product_id: registration.product_id,
                lot_code,
                quantity: registration.quantity,
                expiry_date: registration.expiry_date,
                location,
                registered_by: principal.id,
            })
            .await?;

        tracing::info!(lot_id = %lot.id, quantity = lot.quantity, "✅ Lote registrado");
        Ok(lot)
    }

    pub async fn edit_lot(
        &self,
        principal: &Principal,
        lot_id: Uuid,
        edit: LotEdit,
    ) -> Result<StockLot, AppError> {
        let edit = LotEdit {
            lot_code: edit
                .lot_code
                .map(|code| required_text(&code, "O código do lote não pode ser vazio."))
                .transpose()?,
            location: edit
                .location
                .map(|loc| required_text(&loc, "O local não pode ser vazio."))
                .transpose()?,
            expiry_date: edit.expiry_date,
        };
        access::require(Some(principal), Action::AdministerStock)?;

        self.ledger
            .edit_lot(lot_id, &edit, principal.id)
            .await?
            .ok_or_else(|| AppError::not_found("Lote", lot_id))
    }

    /// Reposição administrativa: único caminho em que o saldo sobe.
    pub async fn restock_lot(
        &self,
        principal: &Principal,
        lot_id: Uuid,
        amount: i64,
    ) -> Result<StockLot, AppError> {
        if !(1..=MAX_RESTOCK_AMOUNT).contains(&amount) {
            return Err(AppError::InvalidArgument(format!(
                "A reposição deve ser um inteiro entre 1 e {}.",
                MAX_RESTOCK_AMOUNT
            )));
        }
        access::require(Some(principal), Action::AdministerStock)?;

        let lot = self
            .ledger
            .restock_lot(lot_id, amount, principal.id)
            .await?
            .ok_or_else(|| AppError::not_found("Lote", lot_id))?;

        tracing::info!(lot_id = %lot.id, amount, quantity = lot.quantity, "Lote reposto");
        Ok(lot)
    }

    pub async fn delete_lot(&self, principal: &Principal, lot_id: Uuid) -> Result<(), AppError> {
        access::require(Some(principal), Action::AdministerStock)?;

        match self.ledger.delete_empty_lot(lot_id).await? {
            LotRemoval::Removed => {
                tracing::info!(lot_id = %lot_id, "🗑️ Lote removido");
                Ok(())
            }
            LotRemoval::NotFound => Err(AppError::not_found("Lote", lot_id)),
            LotRemoval::HasStock(_) => Err(AppError::LotHasStock(lot_id)),
        }
    }

    // ---
    // Consultas
    // ---

    pub async fn get_lot(&self, principal: &Principal, lot_id: Uuid) -> Result<LotView, AppError> {
        access::require(Some(principal), Action::ViewLedger)?;

        let lot = self.existing_lot(lot_id).await?;
        let product = self.catalog.get_product(lot.product_id).await?;

        Ok(LotView {
            expiry_bucket: ledger_query::expiry_bucket(lot.expiry_date, Self::today(), self.near_expiry_days),
            product,
            lot,
        })
    }

    pub async fn list_lots(
        &self,
        principal: &Principal,
        filter: &LotFilter,
        sort: LotSort,
    ) -> Result<Vec<LotView>, AppError> {
        access::require(Some(principal), Action::ViewLedger)?;

        let lots = self.ledger.list_lots().await?;
        let products = self.products_by_id().await?;

        Ok(ledger_query::list_lots(
            lots,
            &products,
            filter,
            sort,
            Self::today(),
            self.near_expiry_days,
        ))
    }

    pub async fn list_deductions(
        &self,
        principal: &Principal,
        filter: &DeductionFilter,
        sort: DeductionSort,
    ) -> Result<Vec<DeductionView>, AppError> {
        access::require(Some(principal), Action::ViewLedger)?;

        let deductions = self.ledger.list_deductions().await?;
        let lots: HashMap<Uuid, StockLot> = self
            .ledger
            .list_lots()
            .await?
            .into_iter()
            .map(|lot| (lot.id, lot))
            .collect();
        let products = self.products_by_id().await?;

        Ok(ledger_query::list_deductions(deductions, &lots, &products, filter, sort))
    }

    /// Conferência: `initial_quantity = quantity + Σ baixas`.
    pub async fn lot_balance(&self, principal: &Principal, lot_id: Uuid) -> Result<LotBalance, AppError> {
        access::require(Some(principal), Action::ViewLedger)?;

        let lot = self.existing_lot(lot_id).await?;
        let deductions = self.ledger.deductions_for_lot(lot_id).await?;
        let deducted: i64 = deductions.iter().map(|d| d.quantity).sum();
        let consistent = lot.initial_quantity == lot.quantity + deducted;

        if !consistent {
            tracing::error!(
                lot_id = %lot_id,
                initial = lot.initial_quantity,
                quantity = lot.quantity,
                deducted,
                "🔥 Razão do lote inconsistente"
            );
        }

        Ok(LotBalance {
            lot_id,
            initial_quantity: lot.initial_quantity,
            quantity: lot.quantity,
            deducted,
            deduction_count: deductions.len(),
            consistent,
        })
    }
}

fn required_text(value: &str, message: &str) -> Result<String, AppError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(AppError::InvalidArgument(message.to_string()));
    }
    Ok(trimmed.to_string())
}
