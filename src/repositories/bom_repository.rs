use chrono::Utc;
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, ConnectionTrait, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder,
};
use uuid::Uuid;

use crate::entities::bom_component::{
    ActiveModel as ComponentActiveModel, Column as ComponentColumn, Entity as BomComponent,
    Model as ComponentModel,
};
use crate::entities::bom_header::{
    ActiveModel as HeaderActiveModel, BomStatus, Column as HeaderColumn, Entity as BomHeader,
    Model as HeaderModel,
};
use crate::entities::product::{
    ActiveModel as ProductActiveModel, Column as ProductColumn, Entity as Product,
    Model as ProductModel,
};
use crate::errors::ServiceError;

/// Data access for products, BOM headers and component lines.
///
/// Every method takes the connection as an argument so the same queries run
/// against the pool and inside a writer transaction. Nothing here starts or
/// commits transactions; that is the caller's job.
pub struct BomRepository;

impl BomRepository {
    // ---- products ----

    pub async fn get_product<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
    ) -> Result<Option<ProductModel>, ServiceError> {
        Product::find_by_id(id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    pub async fn get_product_by_sku<C: ConnectionTrait>(
        db: &C,
        sku: &str,
    ) -> Result<Option<ProductModel>, ServiceError> {
        Product::find()
            .filter(ProductColumn::Sku.eq(sku))
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    pub async fn get_products<C: ConnectionTrait>(
        db: &C,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<ProductModel>, u64), ServiceError> {
        let paginator = Product::find()
            .order_by_desc(ProductColumn::CreatedAt)
            .paginate(db, page_size.max(1));

        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::DatabaseError)?;

        let products = paginator
            .fetch_page(page.max(1) - 1)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok((products, total))
    }

    pub async fn insert_product<C: ConnectionTrait>(
        db: &C,
        product: ProductActiveModel,
    ) -> Result<ProductModel, ServiceError> {
        product.insert(db).await.map_err(ServiceError::DatabaseError)
    }

    /// Flags a product as BOM-backed without touching its active slot.
    /// Draft BOMs mark the product; only activation claims the slot.
    pub async fn mark_product_is_bom<C: ConnectionTrait>(
        db: &C,
        product_id: Uuid,
    ) -> Result<(), ServiceError> {
        Product::update_many()
            .col_expr(ProductColumn::IsBom, Expr::value(true))
            .col_expr(ProductColumn::UpdatedAt, Expr::value(Utc::now()))
            .filter(ProductColumn::Id.eq(product_id))
            .exec(db)
            .await
            .map_err(ServiceError::DatabaseError)?;
        Ok(())
    }

    // ---- headers ----

    pub async fn get_header<C: ConnectionTrait>(
        db: &C,
        id: Uuid,
    ) -> Result<Option<HeaderModel>, ServiceError> {
        BomHeader::find_by_id(id)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    pub async fn get_header_by_number<C: ConnectionTrait>(
        db: &C,
        bom_number: &str,
    ) -> Result<Option<HeaderModel>, ServiceError> {
        BomHeader::find()
            .filter(HeaderColumn::BomNumber.eq(bom_number))
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// The single active header for a product, if one exists.
    pub async fn get_active_bom<C: ConnectionTrait>(
        db: &C,
        product_id: Uuid,
    ) -> Result<Option<HeaderModel>, ServiceError> {
        BomHeader::find()
            .filter(HeaderColumn::ProductId.eq(product_id))
            .filter(HeaderColumn::Status.eq(BomStatus::Active))
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    pub async fn list_headers<C: ConnectionTrait>(
        db: &C,
        product_id: Option<Uuid>,
        status: Option<BomStatus>,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<HeaderModel>, u64), ServiceError> {
        let mut query = BomHeader::find().order_by_desc(HeaderColumn::CreatedAt);

        if let Some(product_id) = product_id {
            query = query.filter(HeaderColumn::ProductId.eq(product_id));
        }
        if let Some(status) = status {
            query = query.filter(HeaderColumn::Status.eq(status));
        }

        let paginator = query.paginate(db, page_size.max(1));

        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::DatabaseError)?;

        let headers = paginator
            .fetch_page(page.max(1) - 1)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok((headers, total))
    }

    pub async fn insert_header<C: ConnectionTrait>(
        db: &C,
        header: HeaderActiveModel,
    ) -> Result<HeaderModel, ServiceError> {
        header.insert(db).await.map_err(ServiceError::DatabaseError)
    }

    pub async fn update_header<C: ConnectionTrait>(
        db: &C,
        header: HeaderActiveModel,
    ) -> Result<HeaderModel, ServiceError> {
        header.update(db).await.map_err(ServiceError::DatabaseError)
    }

    /// Next version number for a product's BOM line of succession.
    pub async fn next_version<C: ConnectionTrait>(
        db: &C,
        product_id: Uuid,
    ) -> Result<i32, ServiceError> {
        let latest = BomHeader::find()
            .filter(HeaderColumn::ProductId.eq(product_id))
            .order_by_desc(HeaderColumn::Version)
            .one(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(latest.map(|h| h.version + 1).unwrap_or(1))
    }

    pub async fn update_total_cost<C: ConnectionTrait>(
        db: &C,
        bom_id: Uuid,
        total_cost: rust_decimal::Decimal,
    ) -> Result<(), ServiceError> {
        BomHeader::update_many()
            .col_expr(HeaderColumn::TotalCost, Expr::value(total_cost))
            .col_expr(HeaderColumn::UpdatedAt, Expr::value(Utc::now()))
            .filter(HeaderColumn::Id.eq(bom_id))
            .exec(db)
            .await
            .map_err(ServiceError::DatabaseError)?;
        Ok(())
    }

    pub async fn count_active_headers<C: ConnectionTrait>(
        db: &C,
        product_id: Uuid,
    ) -> Result<u64, ServiceError> {
        BomHeader::find()
            .filter(HeaderColumn::ProductId.eq(product_id))
            .filter(HeaderColumn::Status.eq(BomStatus::Active))
            .count(db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    // ---- active slot ----

    /// Claims the product's active-BOM slot for `bom_id`.
    ///
    /// Compare-and-set on `products.bom_id`: succeeds only while the slot is
    /// empty or already holds this BOM. Under concurrent writers the second
    /// transaction re-evaluates the filter against the committed row and
    /// matches zero rows, so exactly one claimant wins.
    pub async fn claim_active_slot<C: ConnectionTrait>(
        db: &C,
        product_id: Uuid,
        bom_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let result = Product::update_many()
            .col_expr(ProductColumn::BomId, Expr::value(bom_id))
            .col_expr(ProductColumn::IsBom, Expr::value(true))
            .col_expr(ProductColumn::UpdatedAt, Expr::value(Utc::now()))
            .filter(ProductColumn::Id.eq(product_id))
            .filter(
                Condition::any()
                    .add(ProductColumn::BomId.is_null())
                    .add(ProductColumn::BomId.eq(bom_id)),
            )
            .exec(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(result.rows_affected > 0)
    }

    /// Releases the slot if it still holds `bom_id`.
    pub async fn release_active_slot<C: ConnectionTrait>(
        db: &C,
        product_id: Uuid,
        bom_id: Uuid,
    ) -> Result<bool, ServiceError> {
        let result = Product::update_many()
            .col_expr(ProductColumn::BomId, Expr::value(Option::<Uuid>::None))
            .col_expr(ProductColumn::UpdatedAt, Expr::value(Utc::now()))
            .filter(ProductColumn::Id.eq(product_id))
            .filter(ProductColumn::BomId.eq(bom_id))
            .exec(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        Ok(result.rows_affected > 0)
    }

    // ---- components ----

    /// Component lines for a BOM in stable line order.
    pub async fn get_components<C: ConnectionTrait>(
        db: &C,
        bom_id: Uuid,
    ) -> Result<Vec<ComponentModel>, ServiceError> {
        BomComponent::find()
            .filter(ComponentColumn::BomId.eq(bom_id))
            .order_by_asc(ComponentColumn::LineNumber)
            .all(db)
            .await
            .map_err(ServiceError::DatabaseError)
    }

    /// Replaces the full component set of a BOM.
    ///
    /// Inserts run one by one so the entity hooks fill ids and timestamps.
    pub async fn replace_components<C: ConnectionTrait>(
        db: &C,
        bom_id: Uuid,
        components: Vec<ComponentActiveModel>,
    ) -> Result<Vec<ComponentModel>, ServiceError> {
        BomComponent::delete_many()
            .filter(ComponentColumn::BomId.eq(bom_id))
            .exec(db)
            .await
            .map_err(ServiceError::DatabaseError)?;

        let mut inserted = Vec::with_capacity(components.len());
        for component in components {
            let model = component
                .insert(db)
                .await
                .map_err(ServiceError::DatabaseError)?;
            inserted.push(model);
        }

        Ok(inserted)
    }
}
