use std::sync::Arc;

use chrono::{DateTime, Utc};
use sea_orm::ActiveValue::Set;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::db::DbPool;
use crate::entities::product::{ActiveModel as ProductActiveModel, Model as ProductModel};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::repositories::BomRepository;

/// Product catalog operations. Products must exist before a BOM can build
/// them or consume them as components.
pub struct ProductService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
}

impl ProductService {
    pub fn new(db_pool: Arc<DbPool>, event_sender: Arc<EventSender>) -> Self {
        Self {
            db_pool,
            event_sender,
        }
    }

    fn connection(&self) -> &DbPool {
        self.db_pool.as_ref()
    }

    #[instrument(skip(self, input))]
    pub async fn create_product(
        &self,
        input: CreateProductInput,
    ) -> Result<ProductView, ServiceError> {
        input.validate()?;

        let db = self.connection();
        if BomRepository::get_product_by_sku(db, &input.sku)
            .await?
            .is_some()
        {
            return Err(ServiceError::Conflict(format!(
                "A product with SKU {} already exists",
                input.sku
            )));
        }

        let product = BomRepository::insert_product(
            db,
            ProductActiveModel {
                sku: Set(input.sku.clone()),
                name: Set(input.name.clone()),
                description: Set(input.description.clone()),
                ..Default::default()
            },
        )
        .await?;

        info!(product_id = %product.id, sku = %product.sku, "created product");
        self.event_sender
            .send_or_log(Event::ProductCreated(product.id))
            .await;

        Ok(ProductView::from(product))
    }

    pub async fn get_product(&self, product_id: Uuid) -> Result<ProductView, ServiceError> {
        BomRepository::get_product(self.connection(), product_id)
            .await?
            .map(ProductView::from)
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))
    }

    pub async fn list_products(
        &self,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<ProductView>, u64), ServiceError> {
        let (products, total) =
            BomRepository::get_products(self.connection(), page, page_size).await?;
        Ok((products.into_iter().map(ProductView::from).collect(), total))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateProductInput {
    #[validate(length(min = 1, max = 64, message = "SKU must be 1 to 64 characters"))]
    pub sku: String,
    #[validate(length(min = 1, max = 255, message = "Name must be 1 to 255 characters"))]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductView {
    pub id: Uuid,
    pub sku: String,
    pub name: String,
    pub description: Option<String>,
    /// True once any BOM has been created for this product.
    pub is_bom: bool,
    /// The currently active BOM, when one is activated.
    pub bom_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<ProductModel> for ProductView {
    fn from(product: ProductModel) -> Self {
        Self {
            id: product.id,
            sku: product.sku,
            name: product.name,
            description: product.description,
            is_bom: product.is_bom,
            bom_id: product.bom_id,
            created_at: product.created_at,
            updated_at: product.updated_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_input_rejects_empty_sku() {
        let input = CreateProductInput {
            sku: String::new(),
            name: "Widget".to_string(),
            description: None,
        };
        assert!(input.validate().is_err());
    }

    #[test]
    fn create_input_accepts_minimal_fields() {
        let input = CreateProductInput {
            sku: "WID-1".to_string(),
            name: "Widget".to_string(),
            description: None,
        };
        assert!(input.validate().is_ok());
    }
}
