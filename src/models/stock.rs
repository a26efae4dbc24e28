// src/models/stock.rs

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::models::catalog::Product;

// --- 1. Lote de Estoque ---
// Um recebimento de um produto. `quantity` nunca fica negativo (CHECK no banco)
// e só desce via baixa aplicada com compare-and-swap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct StockLot {
    pub id: Uuid,
    pub product_id: Uuid,

    #[schema(example = "L2024-118")]
    pub lot_code: String,

    pub quantity: i64,

    // Quantidade registrada + reposições. Base da conferência do razão.
    pub initial_quantity: i64,

    pub expiry_date: Option<NaiveDate>, // Data simples (Dia/Mês/Ano)

    #[schema(example = "Almoxarifado A - Prateleira 3")]
    pub location: String,

    pub registered_at: DateTime<Utc>,
    pub registered_by: Uuid,
    pub last_edited_at: DateTime<Utc>,
    pub last_edited_by: Uuid,

    // Incrementado a cada escrita na linha
    pub version: i64,
}

// --- 2. Motivo da Baixa ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type, ToSchema)]
#[sqlx(type_name = "deduction_reason")]
pub enum DeductionReason {
    #[serde(rename = "Consumo")]
    #[sqlx(rename = "Consumo")]
    Consumption,
    #[serde(rename = "Vencimento")]
    #[sqlx(rename = "Vencimento")]
    Expired,
    #[serde(rename = "Avaria")]
    #[sqlx(rename = "Avaria")]
    Damage,
    #[serde(rename = "Perda")]
    #[sqlx(rename = "Perda")]
    Loss,
    #[serde(rename = "Outros")]
    #[sqlx(rename = "Outros")]
    Other,
}

impl DeductionReason {
    pub fn label(&self) -> &'static str {
        match self {
            DeductionReason::Consumption => "Consumo",
            DeductionReason::Expired => "Vencimento",
            DeductionReason::Damage => "Avaria",
            DeductionReason::Loss => "Perda",
            DeductionReason::Other => "Outros",
        }
    }
}

// --- 3. Baixa (histórico imutável) ---
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Deduction {
    pub id: Uuid,
    pub lot_id: Uuid,
    pub product_id: Uuid, // desnormalizado do lote
    pub quantity: i64,
    pub reason: DeductionReason,
    pub note: Option<String>,
    pub acting_principal_id: Uuid,
    pub acting_principal_name: String,
    pub occurred_at: DateTime<Utc>,
}

// ---
// Dados de escrita (já validados pelos serviços)
// ---

#[derive(Debug, Clone)]
pub struct NewLot {
    pub product_id: Uuid,
    pub lot_code: String,
    pub quantity: i64,
    pub expiry_date: Option<NaiveDate>,
    pub location: String,
    pub registered_by: Uuid,
}

#[derive(Debug, Clone)]
pub struct NewDeduction {
    pub lot_id: Uuid,
    pub product_id: Uuid,
    pub quantity: i64,
    pub reason: DeductionReason,
    pub note: Option<String>,
    pub acting_principal_id: Uuid,
    pub acting_principal_name: String,
}

// Edição administrativa: campos ausentes ficam como estão.
// `expiry_date: Some(None)` remove a validade.
#[derive(Debug, Clone, Default)]
pub struct LotEdit {
    pub lot_code: Option<String>,
    pub expiry_date: Option<Option<NaiveDate>>,
    pub location: Option<String>,
}

// ---
// Payloads da API
// ---

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct RegisterLotPayload {
    pub product_id: Uuid,

    #[validate(length(min = 1, max = 60, message = "O código do lote é obrigatório."))]
    pub lot_code: String,

    #[validate(range(min = 0, message = "A quantidade não pode ser negativa."))]
    pub quantity: i64,

    pub expiry_date: Option<NaiveDate>, // Formato YYYY-MM-DD

    #[validate(length(min = 1, max = 120, message = "O local é obrigatório."))]
    pub location: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct EditLotPayload {
    #[validate(length(min = 1, max = 60, message = "O código do lote não pode ser vazio."))]
    pub lot_code: Option<String>,

    // `null` explícito remove a validade; campo ausente mantém
    #[serde(default, deserialize_with = "deserialize_some")]
    #[schema(value_type = Option<NaiveDate>)]
    pub expiry_date: Option<Option<NaiveDate>>,

    #[validate(length(min = 1, max = 120, message = "O local não pode ser vazio."))]
    pub location: Option<String>,
}

impl From<EditLotPayload> for LotEdit {
    fn from(payload: EditLotPayload) -> Self {
        LotEdit {
            lot_code: payload.lot_code,
            expiry_date: payload.expiry_date,
            location: payload.location,
        }
    }
}

fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: serde::Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

/// Maior reposição aceita numa única operação.
pub const MAX_RESTOCK_AMOUNT: i64 = 1_000_000_000;

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RestockPayload {
    #[validate(range(min = 1, max = 1_000_000_000, message = "A reposição deve estar entre 1 e 1.000.000.000."))]
    pub amount: i64,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeductionPayload {
    pub quantity: i64,
    pub reason: DeductionReason,

    #[validate(length(max = 500, message = "A observação deve ter no máximo 500 caracteres."))]
    pub note: Option<String>,
}

// ---
// Visões (somente leitura)
// ---

/// Faixa de validade relativa a "hoje".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub enum ExpiryBucket {
    Expired,
    NearExpiry,
    NoExpiry,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LotView {
    #[serde(flatten)]
    pub lot: StockLot,

    // O produto pode ter sido removido do catálogo
    pub product: Option<Product>,

    // `None` quando a validade está além da janela de "perto de vencer"
    pub expiry_bucket: Option<ExpiryBucket>,
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeductionView {
    #[serde(flatten)]
    pub deduction: Deduction,
    pub lot_code: Option<String>,
    pub product_name: Option<String>,
}

/// Conferência do razão de um lote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LotBalance {
    pub lot_id: Uuid,
    pub initial_quantity: i64,
    pub quantity: i64,
    pub deducted: i64,
    pub deduction_count: usize,
    pub consistent: bool,
}
