//! Product catalog JSON API.

use axum::{
    Json,
    extract::{Path, State},
};
use tracing::instrument;

use mercato_core::ProductId;

use crate::error::AppError;
use crate::models::Product;
use crate::state::AppState;

/// `GET /api/products`
#[instrument(skip(state))]
pub async fn index(State(state): State<AppState>) -> Result<Json<Vec<Product>>, AppError> {
    let products = state.catalog().list_products().await?;
    Ok(Json(products.as_ref().clone()))
}

/// `GET /api/products/{id}`
#[instrument(skip(state))]
pub async fn show(
    State(state): State<AppState>,
    Path(id): Path<i32>,
) -> Result<Json<Product>, AppError> {
    state
        .catalog()
        .get_product(ProductId::new(id))
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("product {id}")))
}
