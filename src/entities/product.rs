use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, ActiveValue::Set, ConnectionTrait};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Product entity
///
/// A product is either purchased (a leaf in every structure it appears in)
/// or manufactured, in which case `bom_id` points at its single active BOM
/// header. That nullable column is also the slot the writer claims when
/// activating a BOM, which is what keeps "one active BOM per product" true
/// under concurrent writers.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "products")]
pub struct Model {
    /// Primary key
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// SKU (Stock Keeping Unit), unique across products
    #[sea_orm(unique)]
    pub sku: String,

    /// Product name
    pub name: String,

    /// Product description
    pub description: Option<String>,

    /// True once the product is backed by a BOM
    pub is_bom: bool,

    /// Back-reference to the active BOM header, if any
    pub bom_id: Option<Uuid>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::bom_header::Entity")]
    BomHeaders,
}

impl Related<super::bom_header::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BomHeaders.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let now = Utc::now();

        if insert {
            if let ActiveValue::NotSet = self.id {
                self.id = Set(Uuid::new_v4());
            }

            if let ActiveValue::NotSet = self.is_bom {
                self.is_bom = Set(false);
            }

            if let ActiveValue::NotSet = self.created_at {
                self.created_at = Set(now);
            }
        }

        self.updated_at = Set(now);

        Ok(self)
    }
}
