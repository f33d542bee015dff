use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use uuid::Uuid;

use super::common::{
    created_response, map_service_error, success_response, validate_input, PaginatedResponse,
};
use crate::entities::bom_header::BomStatus;
use crate::errors::ApiError;
use crate::handlers::AppState;
use crate::services::boms::{CreateBomInput, UpdateBomInput};
use crate::services::costing::{self, CostBreakdown};
use crate::services::structure::ResolvedBomNode;
use crate::ApiResponse;

/// Creates the router for BOM endpoints
pub fn bom_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_bom))
        .route("/", get(list_boms))
        .route("/:id", get(get_bom))
        .route("/:id", put(update_bom))
        .route("/:id/structure", get(get_bom_structure))
}

#[derive(Debug, Deserialize)]
pub struct ListBomsQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
    pub product_id: Option<Uuid>,
    pub status: Option<BomStatus>,
}

#[derive(Debug, Deserialize)]
pub struct StructureQuery {
    pub max_depth: Option<u32>,
}

/// The resolved tree together with its freshly computed rollup. `cost` is
/// recomputed on every call; the header's cached total is inside `structure`.
#[derive(Debug, Serialize)]
pub struct StructureResponse {
    pub structure: ResolvedBomNode,
    pub cost: CostBreakdown,
}

/// Create a BOM with its full component list
async fn create_bom(
    State(state): State<AppState>,
    Json(payload): Json<CreateBomInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let bom = state
        .services
        .boms
        .create_bom(payload)
        .await
        .map_err(map_service_error)?;

    info!("BOM created: {}", bom.id);

    Ok(created_response(ApiResponse::success(bom)))
}

/// Get a BOM by ID
async fn get_bom(
    State(state): State<AppState>,
    Path(bom_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let bom = state
        .services
        .boms
        .get_bom(bom_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(ApiResponse::success(bom)))
}

/// Update a BOM; a submitted component list replaces the existing set
async fn update_bom(
    State(state): State<AppState>,
    Path(bom_id): Path<Uuid>,
    Json(payload): Json<UpdateBomInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let bom = state
        .services
        .boms
        .update_bom(bom_id, payload)
        .await
        .map_err(map_service_error)?;

    info!("BOM updated: {}", bom_id);

    Ok(success_response(ApiResponse::success(bom)))
}

/// List BOMs, optionally filtered by product or status
async fn list_boms(
    State(state): State<AppState>,
    Query(query): Query<ListBomsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query
        .per_page
        .unwrap_or(state.config.api_default_page_size)
        .clamp(1, state.config.api_max_page_size);

    let (boms, total) = state
        .services
        .boms
        .list_boms(query.product_id, query.status, page, per_page)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(ApiResponse::success(
        PaginatedResponse::new(boms, page, per_page, total),
    )))
}

/// Resolve a BOM's structure and compute its cost rollup
///
/// Works for any status, so a draft can be previewed before activation.
/// Sub-assemblies are always followed through active BOMs.
async fn get_bom_structure(
    State(state): State<AppState>,
    Path(bom_id): Path<Uuid>,
    Query(query): Query<StructureQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let structure = state
        .services
        .resolver
        .resolve_bom(bom_id, query.max_depth)
        .await
        .map_err(map_service_error)?;
    let cost = costing::compute_cost(&structure);

    Ok(success_response(ApiResponse::success(StructureResponse {
        structure,
        cost,
    })))
}
