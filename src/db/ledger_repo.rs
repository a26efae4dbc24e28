// src/db/ledger_repo.rs

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{CasOutcome, LedgerStore, LotRemoval},
    models::stock::{Deduction, LotEdit, NewDeduction, NewLot, StockLot},
};

// Lotes e baixas vivem juntos: a baixa precisa da mesma transação que o lote.
#[derive(Clone)]
pub struct LedgerRepository {
    pool: PgPool,
}

impl LedgerRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LedgerStore for LedgerRepository {
    // ---
    // Funções de "Leitura"
    // ---

    async fn get_lot(&self, id: Uuid) -> Result<Option<StockLot>, AppError> {
        let lot = sqlx::query_as::<_, StockLot>("SELECT * FROM stock_lots WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(lot)
    }

    async fn list_lots(&self) -> Result<Vec<StockLot>, AppError> {
        let lots = sqlx::query_as::<_, StockLot>(
            "SELECT * FROM stock_lots ORDER BY registered_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(lots)
    }

    async fn list_deductions(&self) -> Result<Vec<Deduction>, AppError> {
        let deductions = sqlx::query_as::<_, Deduction>(
            "SELECT * FROM deductions ORDER BY occurred_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(deductions)
    }

    async fn deductions_for_lot(&self, lot_id: Uuid) -> Result<Vec<Deduction>, AppError> {
        let deductions = sqlx::query_as::<_, Deduction>(
            "SELECT * FROM deductions WHERE lot_id = $1 ORDER BY occurred_at ASC, id ASC",
        )
        .bind(lot_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(deductions)
    }

    // ---
    // Funções de "Escrita"
    // ---

    async fn insert_lot(&self, lot: &NewLot) -> Result<StockLot, AppError> {
        let created = sqlx::query_as::<_, StockLot>(
            r#"
            INSERT INTO stock_lots (
                product_id, lot_code, quantity, initial_quantity, expiry_date,
                location, registered_by, last_edited_by
            )
            VALUES ($1, $2, $3, $3, $4, $5, $6, $6)
            RETURNING *
            "#,
        )
        .bind(lot.product_id)
        .bind(&lot.lot_code)
        .bind(lot.quantity)
        .bind(lot.expiry_date)
        .bind(&lot.location)
        .bind(lot.registered_by)
        .fetch_one(&self.pool)
        .await?;

        Ok(created)
    }

    async fn edit_lot(
        &self,
        id: Uuid,
        edit: &LotEdit,
        editor: Uuid,
    ) -> Result<Option<StockLot>, AppError> {
        // `$4` diz se a validade deve ser trocada (inclusive para NULL)
        let lot = sqlx::query_as::<_, StockLot>(
            r#"
            UPDATE stock_lots
            SET lot_code = COALESCE($2, lot_code),
                location = COALESCE($3, location),
                expiry_date = CASE WHEN $4 THEN $5 ELSE expiry_date END,
                last_edited_at = now(),
                last_edited_by = $6,
                version = version + 1
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(edit.lot_code.as_deref())
        .bind(edit.location.as_deref())
        .bind(edit.expiry_date.is_some())
        .bind(edit.expiry_date.flatten())
        .bind(editor)
        .fetch_optional(&self.pool)
        .await?;

        Ok(lot)
    }

    async fn restock_lot(
        &self,
        id: Uuid,
        amount: i64,
        editor: Uuid,
    ) -> Result<Option<StockLot>, AppError> {
        // Incremento feito pelo próprio banco: não há leitura-modificação-escrita aqui
        let lot = sqlx::query_as::<_, StockLot>(
            r#"
            UPDATE stock_lots
            SET quantity = quantity + $2,
                initial_quantity = initial_quantity + $2,
                last_edited_at = now(),
                last_edited_by = $3,
                version = version + 1
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(amount)
        .bind(editor)
        .fetch_optional(&self.pool)
        .await?;

        Ok(lot)
    }

    async fn delete_empty_lot(&self, id: Uuid) -> Result<LotRemoval, AppError> {
        let removed = sqlx::query("DELETE FROM stock_lots WHERE id = $1 AND quantity = 0")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if removed.rows_affected() > 0 {
            return Ok(LotRemoval::Removed);
        }

        // Não apagou: ou não existe, ou ainda tem saldo
        Ok(match self.get_lot(id).await? {
            Some(lot) => LotRemoval::HasStock(lot.quantity),
            None => LotRemoval::NotFound,
        })
    }

    async fn apply_deduction_if_unchanged(
        &self,
        expected_quantity: i64,
        deduction: &NewDeduction,
    ) -> Result<CasOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        // 1. Decremento condicional (compare-and-swap sobre o saldo lido)
        let lot = sqlx::query_as::<_, StockLot>(
            r#"
            UPDATE stock_lots
            SET quantity = quantity - $3,
                version = version + 1
            WHERE id = $1 AND quantity = $2 AND quantity >= $3
            RETURNING *
            "#,
        )
        .bind(deduction.lot_id)
        .bind(expected_quantity)
        .bind(deduction.quantity)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(lot) = lot else {
            // Saldo mudou desde a leitura: nada foi escrito
            tx.rollback().await?;
            return Ok(CasOutcome::Stale);
        };

        // 2. Grava a baixa na mesma transação
        let created = sqlx::query_as::<_, Deduction>(
            r#"
            INSERT INTO deductions (
                lot_id, product_id, quantity, reason, note,
                acting_principal_id, acting_principal_name
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING *
            "#,
        )
        .bind(deduction.lot_id)
        .bind(deduction.product_id)
        .bind(deduction.quantity)
        .bind(deduction.reason)
        .bind(deduction.note.as_deref())
        .bind(deduction.acting_principal_id)
        .bind(&deduction.acting_principal_name)
        .fetch_one(&mut *tx)
        .await?;

        // 3. Se chegou aqui, deu tudo certo. "Commita" a transação.
        tx.commit().await?;

        Ok(CasOutcome::Applied { deduction: created, lot })
    }
}
