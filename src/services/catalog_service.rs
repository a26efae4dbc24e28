// src/services/catalog_service.rs

use std::sync::Arc;

use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::CatalogStore,
    models::{
        auth::Principal,
        catalog::{Product, ProductPayload},
    },
    services::access::{self, Action},
};

#[derive(Clone)]
pub struct CatalogService {
    catalog: Arc<dyn CatalogStore>,
}

impl CatalogService {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }

    pub async fn get_product(&self, principal: &Principal, id: Uuid) -> Result<Product, AppError> {
        access::require(Some(principal), Action::ViewCatalog)?;
        self.catalog
            .get_product(id)
            .await?
            .ok_or_else(|| AppError::not_found("Produto", id))
    }

    pub async fn list_products(&self, principal: &Principal) -> Result<Vec<Product>, AppError> {
        access::require(Some(principal), Action::ViewCatalog)?;
        self.catalog.list_products().await
    }

    pub async fn create_product(
        &self,
        principal: &Principal,
        payload: &ProductPayload,
    ) -> Result<Product, AppError> {
        access::require(Some(principal), Action::ManageCatalog)?;
        let product = self.catalog.create_product(payload).await?;
        tracing::info!(product_id = %product.id, "✅ Produto cadastrado: {}", product.name);
        Ok(product)
    }

    pub async fn update_product(
        &self,
        principal: &Principal,
        id: Uuid,
        payload: &ProductPayload,
    ) -> Result<Product, AppError> {
        access::require(Some(principal), Action::ManageCatalog)?;
        self.catalog
            .update_product(id, payload)
            .await?
            .ok_or_else(|| AppError::not_found("Produto", id))
    }

    pub async fn delete_product(&self, principal: &Principal, id: Uuid) -> Result<(), AppError> {
        access::require(Some(principal), Action::ManageCatalog)?;
        if !self.catalog.delete_product(id).await? {
            return Err(AppError::not_found("Produto", id));
        }
        tracing::info!(product_id = %id, "🗑️ Produto removido do catálogo");
        Ok(())
    }
}
