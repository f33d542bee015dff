use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, ActiveValue::Set, ConnectionTrait};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// BOM lifecycle status
///
/// `Active` is the only status the structure resolver follows when it walks
/// a product's structure. At most one header per product is active at a time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(16))")]
#[serde(rename_all = "lowercase")]
pub enum BomStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "active")]
    Active,
    #[sea_orm(string_value = "inactive")]
    Inactive,
}

impl BomStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BomStatus::Draft => "draft",
            BomStatus::Active => "active",
            BomStatus::Inactive => "inactive",
        }
    }
}

impl std::fmt::Display for BomStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// BOM header entity
///
/// One header is one version of one product's bill of materials. The rolled
/// up cost columns (`total_cost`, per-unit semantics via `total_quantity`)
/// are denormalized here by the writer so that parent BOMs can price a
/// sub-assembly without re-exploding it.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bom_headers")]
pub struct Model {
    /// Primary key
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Human-facing BOM number, unique across headers
    #[sea_orm(unique)]
    pub bom_number: String,

    /// Product this BOM builds
    pub product_id: Uuid,

    /// BOM name
    pub name: String,

    /// Optional free-text description
    pub description: Option<String>,

    /// Version number, starting at 1 per product
    pub version: i32,

    /// Lifecycle status
    pub status: BomStatus,

    /// Labor cost per batch
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub labor_cost: Decimal,

    /// Overhead cost per batch
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub overhead_cost: Decimal,

    /// Rolled up batch cost (components with waste + labor + overhead)
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_cost: Decimal,

    /// Output quantity one batch of this BOM produces
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_quantity: Decimal,

    /// Unit of measure for the output quantity
    pub unit_of_measure: String,

    /// Who created the header
    pub created_by: Option<String>,

    /// Free-text note on the header
    pub notes: Option<String>,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ProductId",
        to = "super::product::Column::Id"
    )]
    Product,
    #[sea_orm(has_many = "super::bom_component::Entity")]
    BomComponents,
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Product.def()
    }
}

impl Related<super::bom_component::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BomComponents.def()
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

            if let ActiveValue::NotSet = self.status {
                self.status = Set(BomStatus::Draft);
            }

            if let ActiveValue::NotSet = self.version {
                self.version = Set(1);
            }

            if let ActiveValue::NotSet = self.created_at {
                self.created_at = Set(now);
            }
        }

        self.updated_at = Set(now);

        Ok(self)
    }
}
