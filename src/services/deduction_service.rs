// src/services/deduction_service.rs

use std::{sync::Arc, time::Duration};

use rand::Rng;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::{CasOutcome, LedgerStore},
    models::{
        auth::Principal,
        stock::{Deduction, DeductionReason, NewDeduction},
    },
    services::access::{self, Action},
};

const MAX_NOTE_CHARS: usize = 500;

/// Limites do laço de compare-and-swap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_millis(250),
        }
    }
}

impl RetryPolicy {
    /// Backoff exponencial com "full jitter": sorteado em `[0, base * 2^(n-1)]`,
    /// limitado a `max_backoff`.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exp = self
            .base_backoff
            .saturating_mul(1u32 << attempt.saturating_sub(1).min(16));
        let cap = exp.min(self.max_backoff);
        let cap_ms = cap.as_millis() as u64;
        if cap_ms == 0 {
            return Duration::ZERO;
        }
        // ThreadRng não é Send: o sorteio termina antes de qualquer await
        Duration::from_millis(rand::thread_rng().gen_range(0..=cap_ms))
    }
}

/// Pedido de baixa, como chega do chamador.
#[derive(Debug, Clone)]
pub struct DeductionRequest {
    pub lot_id: Uuid,
    pub quantity: i64,
    pub reason: DeductionReason,
    pub note: Option<String>,
}

#[derive(Clone)]
pub struct DeductionService {
    ledger: Arc<dyn LedgerStore>,
    policy: RetryPolicy,
}

impl DeductionService {
    pub fn new(ledger: Arc<dyn LedgerStore>, policy: RetryPolicy) -> Self {
        Self { ledger, policy }
    }

    /// Aplica uma baixa num lote.
    ///
    /// Argumentos e permissão são checados antes de qualquer acesso ao store.
    /// `NotFound` e `InsufficientStock` são finais; só o snapshot desatualizado
    /// provoca nova tentativa, até `max_attempts`, e depois vira `Conflict`.
    pub async fn apply_deduction(
        &self,
        principal: &Principal,
        request: DeductionRequest,
    ) -> Result<Deduction, AppError> {
        // 1. Falha rápido: nada de estado parcial
        let note = validate_request(&request)?;
        access::require(Some(principal), Action::MutateStock)?;

        let max_attempts = self.policy.max_attempts.max(1);

        for attempt in 1..=max_attempts {
            // 2. Lê o saldo atual (o snapshot)
            let lot = self
                .ledger
                .get_lot(request.lot_id)
                .await?
                .ok_or_else(|| AppError::not_found("Lote", request.lot_id))?;

            // 3. Revalida contra o snapshot, que pode ser mais novo que o pedido
            if request.quantity > lot.quantity {
                return Err(AppError::InsufficientStock {
                    requested: request.quantity,
                    available: lot.quantity,
                });
            }

            let new_deduction = NewDeduction {
                lot_id: lot.id,
                product_id: lot.product_id,
                quantity: request.quantity,
                reason: request.reason,
                note: note.clone(),
                acting_principal_id: principal.id,
                acting_principal_name: principal.display_name.clone(),
            };

            // 4. Escrita condicional
            match self
                .ledger
                .apply_deduction_if_unchanged(lot.quantity, &new_deduction)
                .await?
            {
                CasOutcome::Applied { deduction, lot } => {
                    tracing::info!(
                        lot_id = %lot.id,
                        quantity = deduction.quantity,
                        remaining = lot.quantity,
                        attempt,
                        "📦 Baixa aplicada"
                    );
                    return Ok(deduction);
                }
                CasOutcome::Stale => {
                    tracing::debug!(
                        lot_id = %request.lot_id,
                        attempt,
                        "Saldo mudou durante a baixa, relendo o lote"
                    );
                    if attempt < max_attempts {
                        let delay = self.policy.backoff(attempt);
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
        }

        tracing::warn!(
            lot_id = %request.lot_id,
            attempts = max_attempts,
            "⚠️ Baixa abortada: contenção persistente no lote"
        );
        Err(AppError::Conflict { attempts: max_attempts })
    }
}

fn validate_request(request: &DeductionRequest) -> Result<Option<String>, AppError> {
    if request.quantity <= 0 {
        return Err(AppError::InvalidArgument(
            "A quantidade da baixa deve ser um inteiro positivo.".into(),
        ));
    }

    let note = request
        .note
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(String::from);

    if note.as_ref().is_some_and(|n| n.chars().count() > MAX_NOTE_CHARS) {
        return Err(AppError::InvalidArgument(format!(
            "A observação deve ter no máximo {} caracteres.",
            MAX_NOTE_CHARS
        )));
    }

    Ok(note)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{LotRemoval, MemoryStore};
    use crate::models::auth::Role;
    use crate::models::stock::{LotEdit, NewLot, StockLot};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn clerk() -> Principal {
        Principal {
            id: Uuid::new_v4(),
            role: Role::StockClerk,
            display_name: "Joana".into(),
        }
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 5,
            base_backoff: Duration::ZERO,
            max_backoff: Duration::ZERO,
        }
    }

    fn request(lot_id: Uuid, quantity: i64) -> DeductionRequest {
        DeductionRequest {
            lot_id,
            quantity,
            reason: DeductionReason::Other,
            note: None,
        }
    }

    async fn seeded(quantity: i64) -> (MemoryStore, StockLot) {
        let store = MemoryStore::new();
        let lot = store
            .insert_lot(&NewLot {
                product_id: Uuid::new_v4(),
                lot_code: "L1".into(),
                quantity,
                expiry_date: None,
                location: "Farmácia".into(),
                registered_by: Uuid::new_v4(),
            })
            .await
            .unwrap();
        (store, lot)
    }

    async fn deducted_total(store: &MemoryStore, lot_id: Uuid) -> i64 {
        store
            .deductions_for_lot(lot_id)
            .await
            .unwrap()
            .iter()
            .map(|d| d.quantity)
            .sum()
    }

    #[tokio::test]
    async fn deduct_then_reject_overdraw() {
        let (store, lot) = seeded(10).await;
        let service = DeductionService::new(Arc::new(store.clone()), fast_policy());
        let who = clerk();

        let first = service.apply_deduction(&who, request(lot.id, 3)).await.unwrap();
        assert_eq!(first.quantity, 3);
        assert_eq!(first.reason.label(), "Outros");
        assert_eq!(first.acting_principal_id, who.id);
        assert_eq!(first.acting_principal_name, "Joana");
        assert_eq!(first.product_id, lot.product_id);
        assert_eq!(store.get_lot(lot.id).await.unwrap().unwrap().quantity, 7);

        let err = service.apply_deduction(&who, request(lot.id, 8)).await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientStock { requested: 8, available: 7 }));
        assert_eq!(store.get_lot(lot.id).await.unwrap().unwrap().quantity, 7);
        assert_eq!(store.deductions_for_lot(lot.id).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn one_more_than_available_is_always_rejected() {
        let (store, lot) = seeded(6).await;
        let service = DeductionService::new(Arc::new(store.clone()), fast_policy());

        let err = service.apply_deduction(&clerk(), request(lot.id, 7)).await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientStock { .. }));
        assert_eq!(store.get_lot(lot.id).await.unwrap().unwrap().quantity, 6);
        assert!(store.list_deductions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn invalid_arguments_and_roles_fail_before_the_store() {
        let (store, lot) = seeded(10).await;
        let service = DeductionService::new(Arc::new(store.clone()), fast_policy());

        for qty in [0, -2] {
            let err = service.apply_deduction(&clerk(), request(lot.id, qty)).await.unwrap_err();
            assert!(matches!(err, AppError::InvalidArgument(_)));
        }

        let long_note = DeductionRequest {
            note: Some("x".repeat(MAX_NOTE_CHARS + 1)),
            ..request(lot.id, 1)
        };
        assert!(matches!(
            service.apply_deduction(&clerk(), long_note).await,
            Err(AppError::InvalidArgument(_))
        ));

        let reader = Principal { role: Role::Reader, ..clerk() };
        assert!(matches!(
            service.apply_deduction(&reader, request(lot.id, 1)).await,
            Err(AppError::Unauthorized)
        ));

        // Nem a baixa pedida para um lote inexistente chega ao store sem permissão
        assert!(matches!(
            service.apply_deduction(&reader, request(Uuid::new_v4(), 1)).await,
            Err(AppError::Unauthorized)
        ));

        assert_eq!(store.get_lot(lot.id).await.unwrap().unwrap().quantity, 10);
    }

    #[tokio::test]
    async fn unknown_lot_is_not_found() {
        let (store, _) = seeded(1).await;
        let service = DeductionService::new(Arc::new(store), fast_policy());

        let missing = Uuid::new_v4();
        let err = service.apply_deduction(&clerk(), request(missing, 1)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound { entity: "Lote", id } if id == missing));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_four_and_five_on_ten_leave_one() {
        let (store, lot) = seeded(10).await;
        let service = Arc::new(DeductionService::new(Arc::new(store.clone()), RetryPolicy::default()));

        let a = {
            let service = service.clone();
            tokio::spawn(async move { service.apply_deduction(&clerk(), request(lot.id, 4)).await })
        };
        let b = {
            let service = service.clone();
            tokio::spawn(async move { service.apply_deduction(&clerk(), request(lot.id, 5)).await })
        };

        assert!(a.await.unwrap().is_ok());
        assert!(b.await.unwrap().is_ok());
        assert_eq!(store.get_lot(lot.id).await.unwrap().unwrap().quantity, 1);
        assert_eq!(store.deductions_for_lot(lot.id).await.unwrap().len(), 2);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 8)]
    async fn concurrent_storm_never_goes_negative_and_conserves() {
        let (store, lot) = seeded(50).await;
        let policy = RetryPolicy {
            max_attempts: 50,
            base_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(5),
        };
        let service = Arc::new(DeductionService::new(Arc::new(store.clone()), policy));

        let mut handles = Vec::new();
        for i in 0..40 {
            let service = service.clone();
            let qty = (i % 3) + 1;
            handles.push(tokio::spawn(async move {
                service.apply_deduction(&clerk(), request(lot.id, qty)).await
            }));
        }

        let mut succeeded = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(d) => succeeded += d.quantity,
                Err(AppError::InsufficientStock { .. }) | Err(AppError::Conflict { .. }) => {}
                Err(other) => panic!("erro inesperado: {other}"),
            }
        }

        let current = store.get_lot(lot.id).await.unwrap().unwrap();
        assert!(current.quantity >= 0);
        assert_eq!(current.quantity, 50 - succeeded);
        assert_eq!(current.initial_quantity, current.quantity + deducted_total(&store, lot.id).await);
    }

    // ---
    // Doubles de store para exercitar o laço de CAS de forma determinística
    // ---

    /// Antes da primeira escrita condicional, outro "cliente" faz uma baixa
    /// no mesmo lote, deixando o snapshot do chamador desatualizado.
    struct RacingStore {
        inner: MemoryStore,
        competitor_qty: i64,
        raced: AtomicU32,
    }

    /// Nunca aceita a escrita condicional.
    struct AlwaysStaleStore {
        inner: MemoryStore,
        attempts: AtomicU32,
    }

    #[async_trait]
    impl LedgerStore for RacingStore {
        async fn get_lot(&self, id: Uuid) -> Result<Option<StockLot>, AppError> {
            self.inner.get_lot(id).await
        }
        async fn list_lots(&self) -> Result<Vec<StockLot>, AppError> {
            self.inner.list_lots().await
        }
        async fn insert_lot(&self, lot: &NewLot) -> Result<StockLot, AppError> {
            self.inner.insert_lot(lot).await
        }
        async fn edit_lot(&self, id: Uuid, edit: &LotEdit, editor: Uuid) -> Result<Option<StockLot>, AppError> {
            self.inner.edit_lot(id, edit, editor).await
        }
        async fn restock_lot(&self, id: Uuid, amount: i64, editor: Uuid) -> Result<Option<StockLot>, AppError> {
            self.inner.restock_lot(id, amount, editor).await
        }
        async fn delete_empty_lot(&self, id: Uuid) -> Result<LotRemoval, AppError> {
            self.inner.delete_empty_lot(id).await
        }
        async fn apply_deduction_if_unchanged(
            &self,
            expected_quantity: i64,
            deduction: &NewDeduction,
        ) -> Result<CasOutcome, AppError> {
            if self.raced.fetch_add(1, Ordering::SeqCst) == 0 {
                let competitor = NewDeduction {
                    quantity: self.competitor_qty,
                    acting_principal_name: "Concorrente".into(),
                    ..deduction.clone()
                };
                let outcome = self.inner.apply_deduction_if_unchanged(expected_quantity, &competitor).await?;
                assert!(matches!(outcome, CasOutcome::Applied { .. }));
            }
            self.inner.apply_deduction_if_unchanged(expected_quantity, deduction).await
        }
        async fn list_deductions(&self) -> Result<Vec<Deduction>, AppError> {
            self.inner.list_deductions().await
        }
        async fn deductions_for_lot(&self, lot_id: Uuid) -> Result<Vec<Deduction>, AppError> {
            self.inner.deductions_for_lot(lot_id).await
        }
    }

    #[async_trait]
    impl LedgerStore for AlwaysStaleStore {
        async fn get_lot(&self, id: Uuid) -> Result<Option<StockLot>, AppError> {
            self.inner.get_lot(id).await
        }
        async fn list_lots(&self) -> Result<Vec<StockLot>, AppError> {
            self.inner.list_lots().await
        }
        async fn insert_lot(&self, lot: &NewLot) -> Result<StockLot, AppError> {
            self.inner.insert_lot(lot).await
        }
        async fn edit_lot(&self, id: Uuid, edit: &LotEdit, editor: Uuid) -> Result<Option<StockLot>, AppError> {
            self.inner.edit_lot(id, edit, editor).await
        }
        async fn restock_lot(&self, id: Uuid, amount: i64, editor: Uuid) -> Result<Option<StockLot>, AppError> {
            self.inner.restock_lot(id, amount, editor).await
        }
        async fn delete_empty_lot(&self, id: Uuid) -> Result<LotRemoval, AppError> {
            self.inner.delete_empty_lot(id).await
        }
        async fn apply_deduction_if_unchanged(
            &self,
            _expected_quantity: i64,
            _deduction: &NewDeduction,
        ) -> Result<CasOutcome, AppError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Ok(CasOutcome::Stale)
        }
        async fn list_deductions(&self) -> Result<Vec<Deduction>, AppError> {
            self.inner.list_deductions().await
        }
        async fn deductions_for_lot(&self, lot_id: Uuid) -> Result<Vec<Deduction>, AppError> {
            self.inner.deductions_for_lot(lot_id).await
        }
    }

    #[tokio::test]
    async fn stale_snapshot_is_retried_against_fresh_state() {
        let (inner, lot) = seeded(10).await;
        let racing = Arc::new(RacingStore {
            inner: inner.clone(),
            competitor_qty: 4,
            raced: AtomicU32::new(0),
        });
        let service = DeductionService::new(racing.clone(), fast_policy());

        let deduction = service.apply_deduction(&clerk(), request(lot.id, 5)).await.unwrap();

        assert_eq!(deduction.quantity, 5);
        assert_eq!(racing.raced.load(Ordering::SeqCst), 2);
        assert_eq!(inner.get_lot(lot.id).await.unwrap().unwrap().quantity, 1);
        assert_eq!(deducted_total(&inner, lot.id).await, 9);
    }

    #[tokio::test]
    async fn retry_revalidates_stock_after_losing_the_race() {
        let (inner, lot) = seeded(10).await;
        let racing = Arc::new(RacingStore {
            inner: inner.clone(),
            competitor_qty: 8,
            raced: AtomicU32::new(0),
        });
        let service = DeductionService::new(racing, fast_policy());

        // Pedido válido na leitura, inválido depois que o concorrente venceu
        let err = service.apply_deduction(&clerk(), request(lot.id, 5)).await.unwrap_err();
        assert!(matches!(err, AppError::InsufficientStock { requested: 5, available: 2 }));
        assert_eq!(inner.get_lot(lot.id).await.unwrap().unwrap().quantity, 2);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_conflict() {
        let (inner, lot) = seeded(10).await;
        let store = Arc::new(AlwaysStaleStore {
            inner: inner.clone(),
            attempts: AtomicU32::new(0),
        });
        let service = DeductionService::new(store.clone(), fast_policy());

        let err = service.apply_deduction(&clerk(), request(lot.id, 1)).await.unwrap_err();
        assert!(matches!(err, AppError::Conflict { attempts: 5 }));
        assert_eq!(store.attempts.load(Ordering::SeqCst), 5);
        assert_eq!(inner.get_lot(lot.id).await.unwrap().unwrap().quantity, 10);
    }

    #[test]
    fn backoff_is_capped() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_backoff: Duration::from_millis(20),
            max_backoff: Duration::from_millis(50),
        };
        for attempt in 1..10 {
            assert!(policy.backoff(attempt) <= Duration::from_millis(50));
        }
        assert!(policy.backoff(1) <= Duration::from_millis(20));
        assert_eq!(fast_policy().backoff(3), Duration::ZERO);
    }
}
