use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use salesdesk_catalog::{Territory, Warehouse};
use salesdesk_order::{AssignmentError, AssignmentReceipt};
use serde::Deserialize;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AssignWarehouseRequest {
    pub warehouse_id: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/territories", get(list_territories))
        .route("/v1/warehouses", get(list_warehouses))
        .route("/v1/orders/{local_id}/warehouse", put(assign_warehouse))
}

/// GET /v1/territories
async fn list_territories(
    State(state): State<AppState>,
) -> Result<Json<Vec<Territory>>, AppError> {
    Ok(Json(state.lookup().territories().await?))
}

/// GET /v1/warehouses
async fn list_warehouses(
    State(state): State<AppState>,
) -> Result<Json<Vec<Warehouse>>, AppError> {
    Ok(Json(state.lookup().warehouses().await?))
}

/// PUT /v1/orders/{local_id}/warehouse
/// Confirms an order received through another channel and records its warehouse
async fn assign_warehouse(
    State(state): State<AppState>,
    Path(local_id): Path<String>,
    Json(req): Json<AssignWarehouseRequest>,
) -> Result<Json<AssignmentReceipt>, AppError> {
    let warehouse = state
        .lookup()
        .warehouses()
        .await?
        .into_iter()
        .find(|w| w.id == req.warehouse_id)
        .ok_or(AssignmentError::UnknownWarehouse(req.warehouse_id))?;

    let receipt = state.assignments.assign(&local_id, &warehouse).await?;
    Ok(Json(receipt))
}
