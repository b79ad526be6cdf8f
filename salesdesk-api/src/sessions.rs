use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, get, patch, post, put},
    Json, Router,
};
use salesdesk_catalog::PolicyType;
use salesdesk_order::{CommitReceipt, FetchTicket, LineId, SessionSnapshot};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::AppError;
use crate::state::{AppState, SharedSession};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TerritoryRequest {
    pub territory_id: String,
}

#[derive(Debug, Deserialize)]
pub struct CustomerRequest {
    pub customer_id: String,
}

#[derive(Debug, Deserialize)]
pub struct DeliveryAddressRequest {
    /// Address id, or its label for customers without registered addresses.
    pub address: String,
}

#[derive(Debug, Deserialize)]
pub struct PolicyTypeRequest {
    pub policy_type: PolicyType,
}

#[derive(Debug, Deserialize)]
pub struct PolicyRequest {
    pub policy_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ReferencePolicyRequest {
    pub reference_policy_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ProductRequest {
    pub product_id: String,
}

#[derive(Debug, Deserialize)]
pub struct PackagingRequest {
    pub packaging_id: String,
}

#[derive(Debug, Deserialize)]
pub struct WarehouseRequest {
    pub warehouse_id: String,
}

#[derive(Debug, Deserialize)]
pub struct SetFieldRequest {
    pub field: String,
    pub value: Value,
}

#[derive(Debug, Serialize)]
pub struct StageResponse {
    pub line_id: LineId,
    pub session: SessionSnapshot,
}

#[derive(Debug, Serialize)]
pub struct CommitResponse {
    pub receipt: CommitReceipt,
    pub session: SessionSnapshot,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/sessions", post(open_session))
        .route("/v1/sessions/{id}", get(get_session).delete(close_session))
        .route("/v1/sessions/{id}/territory", put(select_territory))
        .route("/v1/sessions/{id}/customer", put(select_customer))
        .route("/v1/sessions/{id}/delivery-address", put(select_delivery_address))
        .route("/v1/sessions/{id}/policy-type", put(select_policy_type))
        .route("/v1/sessions/{id}/policy", put(select_policy))
        .route("/v1/sessions/{id}/reference-policy", put(select_reference_policy))
        .route("/v1/sessions/{id}/product", put(select_product))
        .route("/v1/sessions/{id}/packaging", put(select_packaging))
        .route("/v1/sessions/{id}/warehouse", put(select_warehouse))
        .route("/v1/sessions/{id}/draft", patch(set_field))
        .route("/v1/sessions/{id}/lines", post(stage_line))
        .route("/v1/sessions/{id}/lines/{line_id}", delete(remove_line))
        .route("/v1/sessions/{id}/commit", post(commit))
}

async fn find_session(state: &AppState, id: Uuid) -> Result<SharedSession, AppError> {
    state
        .sessions
        .get(id)
        .await
        .ok_or_else(|| AppError::NotFound(format!("Session not found: {}", id)))
}

/// Runs each lookup without holding the session, then applies the answer.
/// Answers overtaken by a newer selection are dropped by the session.
async fn resolve(
    state: &AppState,
    session: &SharedSession,
    tickets: Vec<FetchTicket>,
) -> Result<(), AppError> {
    for ticket in tickets {
        let resolution = state.resolver.resolve(ticket).await;
        session.lock().await.apply(resolution)?;
    }
    Ok(())
}

async fn snapshot(session: &SharedSession) -> Json<SessionSnapshot> {
    Json(session.lock().await.snapshot())
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /v1/sessions
async fn open_session(
    State(state): State<AppState>,
) -> (StatusCode, Json<SessionSnapshot>) {
    let (_, session) = state.sessions.open().await;
    (StatusCode::CREATED, snapshot(&session).await)
}

/// GET /v1/sessions/{id}
async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = find_session(&state, id).await?;
    Ok(snapshot(&session).await)
}

/// DELETE /v1/sessions/{id}
/// Discards the session and anything staged in it
async fn close_session(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, AppError> {
    if state.sessions.close(id).await {
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::NotFound(format!("Session not found: {}", id)))
    }
}

/// PUT /v1/sessions/{id}/territory
async fn select_territory(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<TerritoryRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = find_session(&state, id).await?;
    let ticket = session.lock().await.select_territory(&req.territory_id)?;
    resolve(&state, &session, vec![ticket]).await?;
    Ok(snapshot(&session).await)
}

/// PUT /v1/sessions/{id}/customer
async fn select_customer(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<CustomerRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = find_session(&state, id).await?;
    session.lock().await.select_customer(&req.customer_id)?;
    Ok(snapshot(&session).await)
}

/// PUT /v1/sessions/{id}/delivery-address
async fn select_delivery_address(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<DeliveryAddressRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = find_session(&state, id).await?;
    session.lock().await.select_delivery_address(&req.address)?;
    Ok(snapshot(&session).await)
}

/// PUT /v1/sessions/{id}/policy-type
async fn select_policy_type(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<PolicyTypeRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = find_session(&state, id).await?;
    let ticket = session.lock().await.select_policy_type(req.policy_type)?;
    resolve(&state, &session, vec![ticket]).await?;
    Ok(snapshot(&session).await)
}

/// PUT /v1/sessions/{id}/policy
/// Resolves reference policies under secure credit, products otherwise
async fn select_policy(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<PolicyRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = find_session(&state, id).await?;
    let ticket = session.lock().await.select_policy(&req.policy_id)?;
    resolve(&state, &session, vec![ticket]).await?;
    Ok(snapshot(&session).await)
}

/// PUT /v1/sessions/{id}/reference-policy
async fn select_reference_policy(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ReferencePolicyRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = find_session(&state, id).await?;
    let ticket = session
        .lock()
        .await
        .select_reference_policy(&req.reference_policy_id)?;
    resolve(&state, &session, vec![ticket]).await?;
    Ok(snapshot(&session).await)
}

/// PUT /v1/sessions/{id}/product
/// Resolves packagings and the price quote
async fn select_product(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<ProductRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = find_session(&state, id).await?;
    let tickets = session.lock().await.select_product(&req.product_id)?;
    resolve(&state, &session, tickets).await?;
    Ok(snapshot(&session).await)
}

/// PUT /v1/sessions/{id}/packaging
async fn select_packaging(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<PackagingRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = find_session(&state, id).await?;
    session.lock().await.select_packaging(&req.packaging_id)?;
    Ok(snapshot(&session).await)
}

/// PUT /v1/sessions/{id}/warehouse
async fn select_warehouse(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<WarehouseRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = find_session(&state, id).await?;
    let warehouse = state
        .lookup()
        .warehouses()
        .await?
        .into_iter()
        .find(|w| w.id == req.warehouse_id)
        .ok_or_else(|| {
            AppError::Validation("unknown_warehouse", format!("Unknown warehouse: {}", req.warehouse_id))
        })?;
    session.lock().await.select_warehouse(warehouse)?;
    Ok(snapshot(&session).await)
}

/// PATCH /v1/sessions/{id}/draft
async fn set_field(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(req): Json<SetFieldRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = find_session(&state, id).await?;
    session.lock().await.set_field(&req.field, &req.value)?;
    Ok(snapshot(&session).await)
}

/// POST /v1/sessions/{id}/lines
/// Stages the draft line
async fn stage_line(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<(StatusCode, Json<StageResponse>), AppError> {
    let session = find_session(&state, id).await?;
    let mut guard = session.lock().await;
    let line_id = guard.stage()?;
    Ok((
        StatusCode::CREATED,
        Json(StageResponse {
            line_id,
            session: guard.snapshot(),
        }),
    ))
}

/// DELETE /v1/sessions/{id}/lines/{line_id}
async fn remove_line(
    State(state): State<AppState>,
    Path((id, line_id)): Path<(Uuid, LineId)>,
) -> Result<Json<SessionSnapshot>, AppError> {
    let session = find_session(&state, id).await?;
    let mut guard = session.lock().await;
    guard.remove_line(line_id)?;
    Ok(Json(guard.snapshot()))
}

/// POST /v1/sessions/{id}/commit
/// Two-phase write: order service first, then the local store.
/// A committed session is discarded; the response carries its final snapshot.
async fn commit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<CommitResponse>, AppError> {
    let session = find_session(&state, id).await?;
    let plan = state.commits.prepare(&mut *session.lock().await)?;

    // edits are refused while the session is Committing; the mutex is free
    let outcome = state.commits.execute(&plan).await;

    let final_snapshot = {
        let mut guard = session.lock().await;
        if let Err(err) = guard.finish_commit(&outcome) {
            tracing::error!(session_id = %id, error = %err, "Could not record commit outcome");
        }
        guard.snapshot()
    };
    let receipt = outcome?;
    state.sessions.close(id).await;
    Ok(Json(CommitResponse {
        receipt,
        session: final_snapshot,
    }))
}
