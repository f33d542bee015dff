use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, ActiveValue::Set, ConnectionTrait};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// BOM component line
///
/// `quantity_with_waste` and `total_cost` are derived columns. The writer
/// computes them from `quantity_required`, `waste_percentage` and
/// `unit_cost` before insert and they are never accepted from callers.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "bom_components")]
pub struct Model {
    /// Primary key
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    /// Owning BOM header
    pub bom_id: Uuid,

    /// Position of the line within the BOM, 1-based
    pub line_number: i32,

    /// Product consumed by this line
    pub component_product_id: Uuid,

    /// Net quantity required per batch, before waste
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub quantity_required: Decimal,

    /// Unit of measure for the quantity
    pub unit_of_measure: String,

    /// Expected waste as a percentage of the net quantity
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub waste_percentage: Decimal,

    /// Cost per unit of the component
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub unit_cost: Decimal,

    /// Preferred supplier, if any
    pub supplier_id: Option<Uuid>,

    /// Free-text note on the line
    pub notes: Option<String>,

    /// Gross quantity including waste
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub quantity_with_waste: Decimal,

    /// Extended line cost (gross quantity times unit cost)
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub total_cost: Decimal,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Last update timestamp
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::bom_header::Entity",
        from = "Column::BomId",
        to = "super::bom_header::Column::Id"
    )]
    BomHeader,
    #[sea_orm(
        belongs_to = "super::product::Entity",
        from = "Column::ComponentProductId",
        to = "super::product::Column::Id"
    )]
    ComponentProduct,
}

impl Related<super::bom_header::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BomHeader.def()
    }
}

impl Related<super::product::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ComponentProduct.def()
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

            if let ActiveValue::NotSet = self.created_at {
                self.created_at = Set(now);
            }
        }

        self.updated_at = Set(now);

        Ok(self)
    }
}
