use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::Deserialize;
use serde_json::json;

use meterline_duckdb::items::{CreateItemParams, UpdateItemParams};

use crate::{error::AppError, state::AppState, tenant::TenantContext};

const MAX_NAME_LEN: usize = 200;

#[derive(Debug, Deserialize)]
pub struct CreateItemRequest {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateItemRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

fn validate_name(name: &str) -> Result<(), AppError> {
    if name.trim().is_empty() {
        return Err(AppError::BadRequest("name is required".to_string()));
    }
    if name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::BadRequest(format!(
            "name must be at most {MAX_NAME_LEN} characters"
        )));
    }
    Ok(())
}

/// `GET /api/items` — the caller's items (metered as `list_items`).
pub async fn list_items(
    State(state): State<Arc<AppState>>,
    tenant: TenantContext,
) -> Result<impl IntoResponse, AppError> {
    let items = state
        .db
        .list_items(&tenant.tenant_id)
        .await
        .map_err(AppError::Internal)?;
    Ok(Json(json!({ "data": items })))
}

/// `POST /api/items` — create an item (metered as `create_item`).
pub async fn create_item(
    State(state): State<Arc<AppState>>,
    tenant: TenantContext,
    Json(req): Json<CreateItemRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_name(&req.name)?;

    let item = state
        .db
        .create_item(
            &tenant.tenant_id,
            CreateItemParams {
                name: req.name.trim().to_string(),
                description: req.description,
            },
        )
        .await
        .map_err(AppError::Internal)?;

    Ok((StatusCode::CREATED, Json(json!({ "data": item }))))
}

/// `PUT /api/items/{id}` — update an item (metered as `update_item`).
///
/// Another tenant's item id is reported as `404`.
pub async fn update_item(
    State(state): State<Arc<AppState>>,
    tenant: TenantContext,
    Path(id): Path<String>,
    Json(req): Json<UpdateItemRequest>,
) -> Result<impl IntoResponse, AppError> {
    if let Some(ref name) = req.name {
        validate_name(name)?;
    }

    let item = state
        .db
        .update_item(
            &tenant.tenant_id,
            &id,
            UpdateItemParams {
                name: req.name.map(|n| n.trim().to_string()),
                description: req.description,
            },
        )
        .await
        .map_err(AppError::Internal)?
        .ok_or_else(|| AppError::NotFound(format!("Item {id} not found")))?;

    Ok(Json(json!({ "data": item })))
}
