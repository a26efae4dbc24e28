// src/models/catalog.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

// --- Produto (catálogo) ---
// Só guarda os atributos descritivos. O saldo fica nos lotes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,

    #[schema(example = "Luva nitrílica M")]
    pub name: String,

    #[schema(example = "EPI")]
    pub product_type: String,

    #[schema(example = "Supermax")]
    pub brand: String,

    #[schema(example = "caixa")]
    pub unit: String,

    pub description: Option<String>,
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

// O mesmo payload serve para criar e para editar (edição administrativa completa)
#[derive(Debug, Clone, Deserialize, Validate, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ProductPayload {
    #[validate(length(min = 1, max = 200, message = "O nome é obrigatório."))]
    pub name: String,

    #[validate(length(min = 1, max = 100, message = "O tipo é obrigatório."))]
    pub product_type: String,

    #[validate(length(min = 1, max = 100, message = "A marca é obrigatória."))]
    pub brand: String,

    #[validate(length(min = 1, max = 30, message = "A unidade é obrigatória."))]
    pub unit: String,

    #[validate(length(max = 2000, message = "A descrição é longa demais."))]
    pub description: Option<String>,

    #[validate(url(message = "A URL da imagem é inválida."))]
    pub image_url: Option<String>,
}
