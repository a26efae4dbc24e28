// src/db/catalog_repo.rs

use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;

use crate::{
    common::error::AppError,
    db::CatalogStore,
    models::catalog::{Product, ProductPayload},
};

#[derive(Clone)]
pub struct CatalogRepository {
    pool: PgPool,
}

impl CatalogRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl CatalogStore for CatalogRepository {
    async fn get_product(&self, id: Uuid) -> Result<Option<Product>, AppError> {
        let product = sqlx::query_as::<_, Product>("SELECT * FROM products WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(product)
    }

    async fn list_products(&self) -> Result<Vec<Product>, AppError> {
        let products = sqlx::query_as::<_, Product>("SELECT * FROM products ORDER BY name ASC, id ASC")
            .fetch_all(&self.pool)
            .await?;
        Ok(products)
    }

    /// Cria um produto de "catálogo" (sem estoque).
    async fn create_product(&self, payload: &ProductPayload) -> Result<Product, AppError> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            INSERT INTO products (name, product_type, brand, unit, description, image_url)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
            "#,
        )
        .bind(&payload.name)
        .bind(&payload.product_type)
        .bind(&payload.brand)
        .bind(&payload.unit)
        .bind(payload.description.as_deref())
        .bind(payload.image_url.as_deref())
        .fetch_one(&self.pool)
        .await?;

        Ok(product)
    }

    async fn update_product(
        &self,
        id: Uuid,
        payload: &ProductPayload,
    ) -> Result<Option<Product>, AppError> {
        let product = sqlx::query_as::<_, Product>(
            r#"
            UPDATE products
            SET name = $2, product_type = $3, brand = $4, unit = $5,
                description = $6, image_url = $7, updated_at = now()
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(&payload.name)
        .bind(&payload.product_type)
        .bind(&payload.brand)
        .bind(&payload.unit)
        .bind(payload.description.as_deref())
        .bind(payload.image_url.as_deref())
        .fetch_optional(&self.pool)
        .await?;

        Ok(product)
    }

    // Lotes que apontam para o produto continuam existindo (junção opcional nas visões)
    async fn delete_product(&self, id: Uuid) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
