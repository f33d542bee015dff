use std::sync::Arc;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::{ActiveValue::Set, ConnectionTrait, IntoActiveModel, TransactionTrait};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::config::RollupPolicy;
use crate::db::DbPool;
use crate::entities::bom_component::{
    ActiveModel as ComponentActiveModel, Model as ComponentModel,
};
use crate::entities::bom_header::{ActiveModel as HeaderActiveModel, BomStatus, Model as HeaderModel};
use crate::errors::ServiceError;
use crate::events::{Event, EventSender};
use crate::repositories::BomRepository;
use crate::services::costing;
use crate::services::numbering::BomNumberGenerator;
use crate::services::structure::StructureResolver;

/// Attempts at drawing an unused generated BOM number before giving up.
const BOM_NUMBER_ATTEMPTS: usize = 5;

/// Creates and updates BOMs.
///
/// A header and its full component list always change together in one
/// transaction. Activation claims the product's active slot inside that
/// same transaction, so two writers racing to activate a BOM for one
/// product cannot both win.
pub struct BomService {
    db_pool: Arc<DbPool>,
    event_sender: Arc<EventSender>,
    number_generator: BomNumberGenerator,
    rollup_policy: RollupPolicy,
    max_depth: u32,
}

impl BomService {
    pub fn new(
        db_pool: Arc<DbPool>,
        event_sender: Arc<EventSender>,
        number_generator: BomNumberGenerator,
        rollup_policy: RollupPolicy,
        max_depth: u32,
    ) -> Self {
        Self {
            db_pool,
            event_sender,
            number_generator,
            rollup_policy,
            max_depth,
        }
    }

    fn connection(&self) -> &DbPool {
        self.db_pool.as_ref()
    }

    /// Creates a BOM with its component list as one atomic unit.
    ///
    /// When the requested status is `Active`, the product's active slot is
    /// claimed inside the transaction; losing that claim rolls everything
    /// back and surfaces a conflict, leaving no header or component rows.
    #[instrument(skip(self, input))]
    pub async fn create_bom(&self, input: CreateBomInput) -> Result<BomDetail, ServiceError> {
        input.validate()?;
        validate_cost_fields(
            input.labor_cost,
            input.overhead_cost,
            input.total_quantity,
        )?;
        validate_components(&input.components)?;
        ensure_no_self_reference(input.product_id, &input.components)?;

        let status = input.status.unwrap_or(BomStatus::Draft);
        let labor_cost = costing::round_money(input.labor_cost.unwrap_or(Decimal::ZERO));
        let overhead_cost = costing::round_money(input.overhead_cost.unwrap_or(Decimal::ZERO));
        let total_quantity = input.total_quantity.unwrap_or(Decimal::ONE);

        let db = self.connection();
        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        if BomRepository::get_product(&txn, input.product_id)
            .await?
            .is_none()
        {
            return Err(ServiceError::NotFound(format!(
                "Product {} not found",
                input.product_id
            )));
        }
        ensure_component_products_exist(&txn, &input.components).await?;

        let bom_number = self
            .allocate_bom_number(&txn, input.bom_number.as_deref())
            .await?;
        let version = BomRepository::next_version(&txn, input.product_id).await?;

        // Header first with a zero placeholder; the real total lands after
        // the lines exist.
        let header = BomRepository::insert_header(
            &txn,
            HeaderActiveModel {
                bom_number: Set(bom_number),
                product_id: Set(input.product_id),
                name: Set(input.name.clone()),
                description: Set(input.description.clone()),
                version: Set(version),
                status: Set(status),
                labor_cost: Set(labor_cost),
                overhead_cost: Set(overhead_cost),
                total_cost: Set(Decimal::ZERO),
                total_quantity: Set(total_quantity),
                unit_of_measure: Set(unit_or_default(input.unit_of_measure.clone())),
                created_by: Set(input.created_by.clone()),
                notes: Set(input.notes.clone()),
                ..Default::default()
            },
        )
        .await?;

        let lines = self
            .build_lines(&txn, header.id, &input.components)
            .await?;
        let components = BomRepository::replace_components(&txn, header.id, lines).await?;

        let material_cost: Decimal = components.iter().map(|c| c.total_cost).sum();
        let total_cost = costing::round_money(material_cost + labor_cost + overhead_cost);
        BomRepository::update_total_cost(&txn, header.id, total_cost).await?;

        BomRepository::mark_product_is_bom(&txn, input.product_id).await?;

        if status == BomStatus::Active {
            let claimed =
                BomRepository::claim_active_slot(&txn, input.product_id, header.id).await?;
            if !claimed {
                // Dropping the transaction rolls the header and lines back.
                return Err(ServiceError::Conflict(format!(
                    "Product {} already has an active BOM",
                    input.product_id
                )));
            }
        }

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(
            bom_id = %header.id,
            bom_number = %header.bom_number,
            product_id = %header.product_id,
            version,
            "created BOM"
        );

        self.event_sender
            .send_or_log(Event::BomCreated {
                bom_id: header.id,
                product_id: header.product_id,
                version,
            })
            .await;
        if status == BomStatus::Active {
            self.event_sender
                .send_or_log(Event::BomActivated {
                    bom_id: header.id,
                    product_id: header.product_id,
                })
                .await;
        }
        self.event_sender
            .send_or_log(Event::BomCostRolledUp {
                bom_id: header.id,
                total_cost,
            })
            .await;

        let mut header = header;
        header.total_cost = total_cost;
        Ok(BomDetail::from_parts(header, components))
    }

    /// Updates a header and, when a component list is supplied, replaces the
    /// full component set. Partial merges of component lists do not exist;
    /// the submitted set is the new set.
    #[instrument(skip(self, input))]
    pub async fn update_bom(
        &self,
        bom_id: Uuid,
        input: UpdateBomInput,
    ) -> Result<BomDetail, ServiceError> {
        input.validate()?;
        validate_cost_fields(
            input.labor_cost,
            input.overhead_cost,
            input.total_quantity,
        )?;
        if let Some(components) = &input.components {
            if components.is_empty() {
                return Err(ServiceError::ValidationError(
                    "The component list cannot be empty".to_string(),
                ));
            }
            validate_components(components)?;
        }

        let db = self.connection();
        let txn = db.begin().await.map_err(ServiceError::DatabaseError)?;

        let header = BomRepository::get_header(&txn, bom_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("BOM {} not found", bom_id)))?;
        let previous_status = header.status;
        let product_id = header.product_id;

        if let Some(components) = &input.components {
            ensure_no_self_reference(product_id, components)?;
            ensure_component_products_exist(&txn, components).await?;
        }

        let mut active = header.clone().into_active_model();
        if let Some(name) = input.name.clone() {
            active.name = Set(name);
        }
        if let Some(description) = input.description.clone() {
            active.description = Set(Some(description));
        }
        if let Some(status) = input.status {
            active.status = Set(status);
        }
        if let Some(labor_cost) = input.labor_cost {
            active.labor_cost = Set(costing::round_money(labor_cost));
        }
        if let Some(overhead_cost) = input.overhead_cost {
            active.overhead_cost = Set(costing::round_money(overhead_cost));
        }
        if let Some(total_quantity) = input.total_quantity {
            active.total_quantity = Set(total_quantity);
        }
        if let Some(unit) = input.unit_of_measure.clone() {
            active.unit_of_measure = Set(unit);
        }
        if let Some(notes) = input.notes.clone() {
            active.notes = Set(Some(notes));
        }
        let updated = BomRepository::update_header(&txn, active).await?;

        let components = match &input.components {
            Some(inputs) => {
                let lines = self.build_lines(&txn, bom_id, inputs).await?;
                BomRepository::replace_components(&txn, bom_id, lines).await?
            }
            None => BomRepository::get_components(&txn, bom_id).await?,
        };

        let material_cost: Decimal = components.iter().map(|c| c.total_cost).sum();
        let total_cost =
            costing::round_money(material_cost + updated.labor_cost + updated.overhead_cost);
        BomRepository::update_total_cost(&txn, bom_id, total_cost).await?;

        let now_active = updated.status == BomStatus::Active;
        let was_active = previous_status == BomStatus::Active;
        if now_active && !was_active {
            let claimed = BomRepository::claim_active_slot(&txn, product_id, bom_id).await?;
            if !claimed {
                return Err(ServiceError::Conflict(format!(
                    "Product {} already has an active BOM",
                    product_id
                )));
            }
        } else if was_active && !now_active {
            BomRepository::release_active_slot(&txn, product_id, bom_id).await?;
        }

        txn.commit().await.map_err(ServiceError::DatabaseError)?;

        info!(%bom_id, %product_id, "updated BOM");

        self.event_sender
            .send_or_log(Event::BomUpdated {
                bom_id,
                product_id,
            })
            .await;
        if now_active && !was_active {
            self.event_sender
                .send_or_log(Event::BomActivated {
                    bom_id,
                    product_id,
                })
                .await;
        }
        self.event_sender
            .send_or_log(Event::BomCostRolledUp {
                bom_id,
                total_cost,
            })
            .await;

        let mut updated = updated;
        updated.total_cost = total_cost;
        Ok(BomDetail::from_parts(updated, components))
    }

    pub async fn get_bom(&self, bom_id: Uuid) -> Result<BomDetail, ServiceError> {
        let db = self.connection();
        let header = BomRepository::get_header(db, bom_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("BOM {} not found", bom_id)))?;
        let components = BomRepository::get_components(db, bom_id).await?;
        Ok(BomDetail::from_parts(header, components))
    }

    pub async fn list_boms(
        &self,
        product_id: Option<Uuid>,
        status: Option<BomStatus>,
        page: u64,
        page_size: u64,
    ) -> Result<(Vec<BomSummary>, u64), ServiceError> {
        let (headers, total) =
            BomRepository::list_headers(self.connection(), product_id, status, page, page_size)
                .await?;
        Ok((headers.into_iter().map(BomSummary::from).collect(), total))
    }

    /// Uses the supplied number after a uniqueness check, or draws generated
    /// candidates until one is free.
    async fn allocate_bom_number<C: ConnectionTrait>(
        &self,
        db: &C,
        supplied: Option<&str>,
    ) -> Result<String, ServiceError> {
        if let Some(number) = supplied {
            if BomRepository::get_header_by_number(db, number).await?.is_some() {
                return Err(ServiceError::Conflict(format!(
                    "BOM number {} is already in use",
                    number
                )));
            }
            return Ok(number.to_string());
        }

        for _ in 0..BOM_NUMBER_ATTEMPTS {
            let candidate = self.number_generator.generate();
            if BomRepository::get_header_by_number(db, &candidate)
                .await?
                .is_none()
            {
                return Ok(candidate);
            }
        }

        Err(ServiceError::InternalError(
            "Could not allocate an unused BOM number".to_string(),
        ))
    }

    /// Turns input rows into component records with their derived columns
    /// filled in: line numbers, waste-inflated quantities and line costs at
    /// the effective unit price for the configured rollup policy.
    async fn build_lines<C: ConnectionTrait>(
        &self,
        db: &C,
        bom_id: Uuid,
        inputs: &[BomComponentInput],
    ) -> Result<Vec<ComponentActiveModel>, ServiceError> {
        let mut lines = Vec::with_capacity(inputs.len());

        for (index, input) in inputs.iter().enumerate() {
            let waste_percentage = input.waste_percentage.unwrap_or(Decimal::ZERO);
            let submitted_unit_cost = input.unit_cost.unwrap_or(Decimal::ZERO);

            let quantity_with_waste = costing::round_quantity(costing::quantity_with_waste(
                input.quantity_required,
                waste_percentage,
            ));
            let effective_unit_cost = self
                .effective_unit_cost(db, input.component_product_id, submitted_unit_cost)
                .await?;
            let total_cost = costing::round_money(quantity_with_waste * effective_unit_cost);

            lines.push(ComponentActiveModel {
                bom_id: Set(bom_id),
                line_number: Set((index + 1) as i32),
                component_product_id: Set(input.component_product_id),
                quantity_required: Set(input.quantity_required),
                unit_of_measure: Set(unit_or_default(input.unit_of_measure.clone())),
                waste_percentage: Set(waste_percentage),
                unit_cost: Set(submitted_unit_cost),
                supplier_id: Set(input.supplier_id),
                notes: Set(input.notes.clone()),
                quantity_with_waste: Set(quantity_with_waste),
                total_cost: Set(total_cost),
                ..Default::default()
            });
        }

        Ok(lines)
    }

    /// The unit price a component line is costed at.
    ///
    /// Under the `submitted` policy this is always the caller's figure. Under
    /// `recompute`, a component whose product carries an active BOM is priced
    /// from that BOM's rolled-up cost per output unit instead; the stored
    /// `unit_cost` column keeps the caller's baseline either way.
    async fn effective_unit_cost<C: ConnectionTrait>(
        &self,
        db: &C,
        component_product_id: Uuid,
        submitted: Decimal,
    ) -> Result<Decimal, ServiceError> {
        if self.rollup_policy == RollupPolicy::Submitted {
            return Ok(submitted);
        }

        if BomRepository::get_active_bom(db, component_product_id)
            .await?
            .is_none()
        {
            return Ok(submitted);
        }

        let tree =
            StructureResolver::resolve_product_tree(db, component_product_id, self.max_depth)
                .await?;
        let breakdown = costing::compute_cost(&tree);
        if breakdown.total_quantity.is_zero() {
            return Ok(submitted);
        }
        Ok(breakdown.effective_unit_cost)
    }
}

// ---- request and response shapes ----

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct CreateBomInput {
    pub product_id: Uuid,
    #[validate(length(min = 1, max = 255, message = "Name must be 1 to 255 characters"))]
    pub name: String,
    pub description: Option<String>,
    #[validate(length(min = 1, max = 64, message = "BOM number must be 1 to 64 characters"))]
    pub bom_number: Option<String>,
    pub status: Option<BomStatus>,
    pub labor_cost: Option<Decimal>,
    pub overhead_cost: Option<Decimal>,
    pub total_quantity: Option<Decimal>,
    #[validate(length(min = 1, max = 32, message = "Unit of measure must be 1 to 32 characters"))]
    pub unit_of_measure: Option<String>,
    pub created_by: Option<String>,
    #[validate(length(max = 1000, message = "Notes are limited to 1000 characters"))]
    pub notes: Option<String>,
    #[validate(length(min = 1, message = "A BOM needs at least one component"))]
    pub components: Vec<BomComponentInput>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct BomComponentInput {
    pub component_product_id: Uuid,
    pub quantity_required: Decimal,
    #[validate(length(min = 1, max = 32, message = "Unit of measure must be 1 to 32 characters"))]
    pub unit_of_measure: Option<String>,
    pub waste_percentage: Option<Decimal>,
    pub unit_cost: Option<Decimal>,
    pub supplier_id: Option<Uuid>,
    #[validate(length(max = 1000, message = "Notes are limited to 1000 characters"))]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, Validate)]
pub struct UpdateBomInput {
    #[validate(length(min = 1, max = 255, message = "Name must be 1 to 255 characters"))]
    pub name: Option<String>,
    pub description: Option<String>,
    pub status: Option<BomStatus>,
    pub labor_cost: Option<Decimal>,
    pub overhead_cost: Option<Decimal>,
    pub total_quantity: Option<Decimal>,
    #[validate(length(min = 1, max = 32, message = "Unit of measure must be 1 to 32 characters"))]
    pub unit_of_measure: Option<String>,
    #[validate(length(max = 1000, message = "Notes are limited to 1000 characters"))]
    pub notes: Option<String>,
    pub components: Option<Vec<BomComponentInput>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BomSummary {
    pub id: Uuid,
    pub bom_number: String,
    pub product_id: Uuid,
    pub name: String,
    pub version: i32,
    pub status: BomStatus,
    pub total_cost: Decimal,
    pub total_quantity: Decimal,
    pub unit_of_measure: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<HeaderModel> for BomSummary {
    fn from(header: HeaderModel) -> Self {
        Self {
            id: header.id,
            bom_number: header.bom_number,
            product_id: header.product_id,
            name: header.name,
            version: header.version,
            status: header.status,
            total_cost: header.total_cost,
            total_quantity: header.total_quantity,
            unit_of_measure: header.unit_of_measure,
            created_at: header.created_at,
            updated_at: header.updated_at,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BomDetail {
    pub id: Uuid,
    pub bom_number: String,
    pub product_id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub version: i32,
    pub status: BomStatus,
    pub labor_cost: Decimal,
    pub overhead_cost: Decimal,
    pub total_cost: Decimal,
    pub total_quantity: Decimal,
    pub unit_of_measure: String,
    pub created_by: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub components: Vec<BomComponentView>,
}

impl BomDetail {
    fn from_parts(header: HeaderModel, components: Vec<ComponentModel>) -> Self {
        Self {
            id: header.id,
            bom_number: header.bom_number,
            product_id: header.product_id,
            name: header.name,
            description: header.description,
            version: header.version,
            status: header.status,
            labor_cost: header.labor_cost,
            overhead_cost: header.overhead_cost,
            total_cost: header.total_cost,
            total_quantity: header.total_quantity,
            unit_of_measure: header.unit_of_measure,
            created_by: header.created_by,
            notes: header.notes,
            created_at: header.created_at,
            updated_at: header.updated_at,
            components: components.into_iter().map(BomComponentView::from).collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BomComponentView {
    pub id: Uuid,
    pub line_number: i32,
    pub component_product_id: Uuid,
    pub quantity_required: Decimal,
    pub unit_of_measure: String,
    pub waste_percentage: Decimal,
    pub unit_cost: Decimal,
    pub quantity_with_waste: Decimal,
    pub total_cost: Decimal,
    pub supplier_id: Option<Uuid>,
    pub notes: Option<String>,
}

impl From<ComponentModel> for BomComponentView {
    fn from(component: ComponentModel) -> Self {
        Self {
            id: component.id,
            line_number: component.line_number,
            component_product_id: component.component_product_id,
            quantity_required: component.quantity_required,
            unit_of_measure: component.unit_of_measure,
            waste_percentage: component.waste_percentage,
            unit_cost: component.unit_cost,
            quantity_with_waste: component.quantity_with_waste,
            total_cost: component.total_cost,
            supplier_id: component.supplier_id,
            notes: component.notes,
        }
    }
}

// ---- validation helpers ----

fn unit_or_default(unit: Option<String>) -> String {
    unit.unwrap_or_else(|| "each".to_string())
}

fn validate_cost_fields(
    labor_cost: Option<Decimal>,
    overhead_cost: Option<Decimal>,
    total_quantity: Option<Decimal>,
) -> Result<(), ServiceError> {
    if let Some(labor) = labor_cost {
        if labor.is_sign_negative() {
            return Err(ServiceError::ValidationError(
                "labor_cost cannot be negative".to_string(),
            ));
        }
    }
    if let Some(overhead) = overhead_cost {
        if overhead.is_sign_negative() {
            return Err(ServiceError::ValidationError(
                "overhead_cost cannot be negative".to_string(),
            ));
        }
    }
    if let Some(quantity) = total_quantity {
        if quantity <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(
                "total_quantity must be positive".to_string(),
            ));
        }
    }
    Ok(())
}

/// Rejects invalid component rows instead of skipping them. A single bad
/// row fails the whole request before anything is written.
fn validate_components(components: &[BomComponentInput]) -> Result<(), ServiceError> {
    for (index, component) in components.iter().enumerate() {
        let line = index + 1;
        component.validate()?;

        if component.quantity_required <= Decimal::ZERO {
            return Err(ServiceError::ValidationError(format!(
                "Component {}: quantity_required must be positive",
                line
            )));
        }
        if let Some(waste) = component.waste_percentage {
            if waste < Decimal::ZERO || waste > Decimal::ONE_HUNDRED {
                return Err(ServiceError::ValidationError(format!(
                    "Component {}: waste_percentage must be between 0 and 100",
                    line
                )));
            }
        }
        if let Some(cost) = component.unit_cost {
            if cost.is_sign_negative() {
                return Err(ServiceError::ValidationError(format!(
                    "Component {}: unit_cost cannot be negative",
                    line
                )));
            }
        }
    }
    Ok(())
}

fn ensure_no_self_reference(
    product_id: Uuid,
    components: &[BomComponentInput],
) -> Result<(), ServiceError> {
    for (index, component) in components.iter().enumerate() {
        if component.component_product_id == product_id {
            return Err(ServiceError::ValidationError(format!(
                "Component {}: a BOM cannot list the product it builds as its own component",
                index + 1
            )));
        }
    }
    Ok(())
}

async fn ensure_component_products_exist<C: ConnectionTrait>(
    db: &C,
    components: &[BomComponentInput],
) -> Result<(), ServiceError> {
    for (index, component) in components.iter().enumerate() {
        if BomRepository::get_product(db, component.component_product_id)
            .await?
            .is_none()
        {
            return Err(ServiceError::ValidationError(format!(
                "Component {}: product {} does not exist",
                index + 1,
                component.component_product_id
            )));
        }
    }
    Ok(())
}
