use axum::{
    extract::{Json, Path, Query, State},
    response::IntoResponse,
    routing::{get, post},
    Router,
};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::boms::{StructureQuery, StructureResponse};
use super::common::{
    created_response, map_service_error, success_response, validate_input, PaginatedResponse,
};
use crate::errors::ApiError;
use crate::handlers::AppState;
use crate::services::costing;
use crate::services::products::CreateProductInput;
use crate::ApiResponse;

/// Creates the router for product endpoints
pub fn product_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_product))
        .route("/", get(list_products))
        .route("/:id", get(get_product))
        .route("/:id/structure", get(get_product_structure))
}

#[derive(Debug, Deserialize)]
pub struct ListProductsQuery {
    pub page: Option<u64>,
    pub per_page: Option<u64>,
}

/// Create a product
async fn create_product(
    State(state): State<AppState>,
    Json(payload): Json<CreateProductInput>,
) -> Result<impl IntoResponse, ApiError> {
    validate_input(&payload)?;

    let product = state
        .services
        .products
        .create_product(payload)
        .await
        .map_err(map_service_error)?;

    info!("Product created: {}", product.id);

    Ok(created_response(ApiResponse::success(product)))
}

/// Get a product by ID
async fn get_product(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let product = state
        .services
        .products
        .get_product(product_id)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(ApiResponse::success(product)))
}

/// List products with pagination
async fn list_products(
    State(state): State<AppState>,
    Query(query): Query<ListProductsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = query.page.unwrap_or(1).max(1);
    let per_page = query
        .per_page
        .unwrap_or(state.config.api_default_page_size)
        .clamp(1, state.config.api_max_page_size);

    let (products, total) = state
        .services
        .products
        .list_products(page, per_page)
        .await
        .map_err(map_service_error)?;

    Ok(success_response(ApiResponse::success(
        PaginatedResponse::new(products, page, per_page, total),
    )))
}

/// Resolve the product's active BOM structure and compute its cost rollup
///
/// Responds 404 when the product does not exist and, with a different
/// message, when it exists but has no active BOM.
async fn get_product_structure(
    State(state): State<AppState>,
    Path(product_id): Path<Uuid>,
    Query(query): Query<StructureQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let structure = state
        .services
        .resolver
        .resolve_product(product_id, query.max_depth)
        .await
        .map_err(map_service_error)?;
    let cost = costing::compute_cost(&structure);

    Ok(success_response(ApiResponse::success(StructureResponse {
        structure,
        cost,
    })))
}
