use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use sea_orm::ConnectionTrait;
use serde::Serialize;
use tokio::time::timeout;
use tracing::{instrument, warn};
use uuid::Uuid;

use crate::config::MAX_BOM_DEPTH_CEILING;
use crate::db::DbPool;
use crate::entities::bom_header::{BomStatus, Model as HeaderModel};
use crate::errors::ServiceError;
use crate::repositories::BomRepository;

/// One fully expanded BOM: its header fields, its component lines in stable
/// line order, and any reachable sub-BOMs. Built fresh on every resolve call
/// and never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedBomNode {
    pub bom_id: Uuid,
    pub bom_number: String,
    pub product_id: Uuid,
    pub product_name: String,
    pub name: String,
    pub version: i32,
    pub status: BomStatus,
    pub labor_cost: Decimal,
    pub overhead_cost: Decimal,
    /// Cached total from the header. The cost calculator recomputes its own
    /// figure from the tree; this is what the writer last persisted.
    pub total_cost: Decimal,
    pub total_quantity: Decimal,
    pub unit_of_measure: String,
    /// Levels below the resolution root, zero for the root itself.
    pub depth: u32,
    pub components: Vec<ResolvedComponent>,
}

/// A component line inside a resolved node.
///
/// `has_sub_bom` says whether the component's product has an active BOM of
/// its own. `sub_bom` is only populated when that BOM was actually expanded;
/// a cycle or the depth limit leaves it empty and sets the matching flag so
/// callers can report the condition instead of the resolver failing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedComponent {
    pub component_id: Uuid,
    pub component_product_id: Uuid,
    pub product_name: String,
    pub line_number: i32,
    pub quantity_required: Decimal,
    pub unit_of_measure: String,
    pub waste_percentage: Decimal,
    pub unit_cost: Decimal,
    pub quantity_with_waste: Decimal,
    pub total_cost: Decimal,
    pub supplier_id: Option<Uuid>,
    pub notes: Option<String>,
    pub has_sub_bom: bool,
    pub cycle_detected: bool,
    pub depth_exceeded: bool,
    pub sub_bom: Option<Box<ResolvedBomNode>>,
}

/// Walks the product/BOM graph into an in-memory tree.
///
/// Cycles and the depth limit never fail a resolution. The offending
/// component is marked and left unexpanded, so the reachable part of the
/// structure still comes back and the caller decides how to present it.
#[derive(Clone)]
pub struct StructureResolver {
    db_pool: Arc<DbPool>,
    default_max_depth: u32,
    resolve_timeout: Duration,
}

impl StructureResolver {
    pub fn new(db_pool: Arc<DbPool>, default_max_depth: u32, resolve_timeout: Duration) -> Self {
        Self {
            db_pool,
            default_max_depth,
            resolve_timeout,
        }
    }

    /// Resolves the active BOM of a product.
    ///
    /// A product without an active BOM is a leaf and resolves to `NotFound`,
    /// with a message distinct from the one for a missing product.
    #[instrument(skip(self))]
    pub async fn resolve_product(
        &self,
        product_id: Uuid,
        max_depth: Option<u32>,
    ) -> Result<ResolvedBomNode, ServiceError> {
        let depth_limit = self.depth_limit(max_depth);
        let work = Self::resolve_product_tree(self.db_pool.as_ref(), product_id, depth_limit);

        match timeout(self.resolve_timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                warn!(%product_id, timeout_secs = self.resolve_timeout.as_secs(), "structure resolution timed out");
                Err(ServiceError::Timeout(format!(
                    "Resolving the structure of product {} exceeded {}s",
                    product_id,
                    self.resolve_timeout.as_secs()
                )))
            }
        }
    }

    /// Resolves a specific header regardless of status, so drafts and
    /// inactive versions can be previewed before activation. Sub-BOMs are
    /// still only followed through the active headers of component products.
    #[instrument(skip(self))]
    pub async fn resolve_bom(
        &self,
        bom_id: Uuid,
        max_depth: Option<u32>,
    ) -> Result<ResolvedBomNode, ServiceError> {
        let depth_limit = self.depth_limit(max_depth);
        let work = Self::resolve_bom_tree(self.db_pool.as_ref(), bom_id, depth_limit);

        match timeout(self.resolve_timeout, work).await {
            Ok(result) => result,
            Err(_) => {
                warn!(%bom_id, timeout_secs = self.resolve_timeout.as_secs(), "structure resolution timed out");
                Err(ServiceError::Timeout(format!(
                    "Resolving the structure of BOM {} exceeded {}s",
                    bom_id,
                    self.resolve_timeout.as_secs()
                )))
            }
        }
    }

    /// Caller-supplied depth is clamped to the hard ceiling; the configured
    /// default applies when the caller passes nothing.
    fn depth_limit(&self, max_depth: Option<u32>) -> u32 {
        max_depth
            .unwrap_or(self.default_max_depth)
            .clamp(1, MAX_BOM_DEPTH_CEILING)
    }

    /// Connection-generic entry so the writer can resolve inside its own
    /// transaction and see rows it has inserted but not yet committed.
    pub(crate) async fn resolve_product_tree<C: ConnectionTrait>(
        db: &C,
        product_id: Uuid,
        depth_limit: u32,
    ) -> Result<ResolvedBomNode, ServiceError> {
        let product = BomRepository::get_product(db, product_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {} not found", product_id)))?;

        let header = BomRepository::get_active_bom(db, product_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} has no active BOM", product_id))
            })?;

        let mut path = vec![product_id];
        Self::expand(db, header, product.name, &mut path, 0, depth_limit).await
    }

    pub(crate) async fn resolve_bom_tree<C: ConnectionTrait>(
        db: &C,
        bom_id: Uuid,
        depth_limit: u32,
    ) -> Result<ResolvedBomNode, ServiceError> {
        let header = BomRepository::get_header(db, bom_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("BOM {} not found", bom_id)))?;

        let product = BomRepository::get_product(db, header.product_id)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", header.product_id))
            })?;

        let mut path = vec![header.product_id];
        Self::expand(db, header, product.name, &mut path, 0, depth_limit).await
    }

    /// Expands one header into a node, recursing into component products
    /// that carry an active BOM.
    ///
    /// `path` holds the product ids from the resolution root down to this
    /// node. A component whose product is already on the path is a cycle and
    /// is not entered again; the same product appearing in two sibling
    /// branches is legitimate and expands in both.
    async fn expand<C: ConnectionTrait>(
        db: &C,
        header: HeaderModel,
        product_name: String,
        path: &mut Vec<Uuid>,
        depth: u32,
        depth_limit: u32,
    ) -> Result<ResolvedBomNode, ServiceError> {
        let lines = BomRepository::get_components(db, header.id).await?;
        let mut components = Vec::with_capacity(lines.len());

        for line in lines {
            let component_name = BomRepository::get_product(db, line.component_product_id)
                .await?
                .map(|p| p.name)
                .unwrap_or_else(|| "Unknown product".to_string());

            let sub_header =
                BomRepository::get_active_bom(db, line.component_product_id).await?;

            let mut resolved = ResolvedComponent {
                component_id: line.id,
                component_product_id: line.component_product_id,
                product_name: component_name,
                line_number: line.line_number,
                quantity_required: line.quantity_required,
                unit_of_measure: line.unit_of_measure,
                waste_percentage: line.waste_percentage,
                unit_cost: line.unit_cost,
                quantity_with_waste: line.quantity_with_waste,
                total_cost: line.total_cost,
                supplier_id: line.supplier_id,
                notes: line.notes,
                has_sub_bom: sub_header.is_some(),
                cycle_detected: false,
                depth_exceeded: false,
                sub_bom: None,
            };

            if let Some(sub_header) = sub_header {
                if path.contains(&line.component_product_id) {
                    warn!(
                        bom_id = %header.id,
                        component_product_id = %line.component_product_id,
                        "cycle detected in BOM structure"
                    );
                    resolved.cycle_detected = true;
                } else if depth + 1 > depth_limit {
                    resolved.depth_exceeded = true;
                } else {
                    path.push(line.component_product_id);
                    let sub_name = resolved.product_name.clone();
                    let sub_bom = Box::pin(Self::expand(
                        db,
                        sub_header,
                        sub_name,
                        path,
                        depth + 1,
                        depth_limit,
                    ))
                    .await?;
                    path.pop();
                    resolved.sub_bom = Some(Box::new(sub_bom));
                }
            }

            components.push(resolved);
        }

        Ok(ResolvedBomNode {
            bom_id: header.id,
            bom_number: header.bom_number,
            product_id: header.product_id,
            product_name,
            name: header.name,
            version: header.version,
            status: header.status,
            labor_cost: header.labor_cost,
            overhead_cost: header.overhead_cost,
            total_cost: header.total_cost,
            total_quantity: header.total_quantity,
            unit_of_measure: header.unit_of_measure,
            depth,
            components,
        })
    }
}
