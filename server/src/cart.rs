use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    auth::CurrentUser,
    error::AppError,
    models::{CartOut, CartRow, CART_SELECT},
    state::AppState,
};

pub async fn list_cart(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<Json<Vec<CartOut>>, AppError> {
    let sql = format!("{CART_SELECT} WHERE cr.user_id = ?");
    let rows: Vec<CartRow> = sqlx::query_as(&sql)
        .bind(user.id)
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(rows.into_iter().map(CartOut::from).collect()))
}

#[derive(Deserialize)]
pub struct AddPayload {
    menuitem_id: Option<i64>,
    quantity: Option<i64>,
}

/// Repeated adds of the same menu item stack up as separate rows; there is
/// deliberately no merge-on-add.
pub async fn add_to_cart(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(payload): Json<AddPayload>,
) -> Result<(StatusCode, Json<CartOut>), AppError> {
    let menuitem_id = payload
        .menuitem_id
        .ok_or_else(|| AppError::field("menuitem_id", "This field is required."))?;
    let quantity = validate_quantity(payload.quantity)?;

    let unit_price = menu_price(&state.pool, menuitem_id).await?;
    let price = quantity as f64 * unit_price;

    let result = sqlx::query(
        "INSERT INTO carts (user_id, menuitem_id, quantity, unit_price, price)
         VALUES (?, ?, ?, ?, ?)",
    )
    .bind(user.id)
    .bind(menuitem_id)
    .bind(quantity)
    .bind(unit_price)
    .bind(price)
    .execute(&state.pool)
    .await?;

    let row = fetch_cart_row(&state.pool, result.last_insert_rowid(), user.id).await?;
    Ok((StatusCode::CREATED, Json(row)))
}

#[derive(Deserialize)]
pub struct UpdatePayload {
    menuitem_id: Option<i64>,
    quantity: Option<i64>,
}

/// Re-snapshots `unit_price` from the menu item as it is *now*, whether the
/// quantity or the referenced item changed.
pub async fn update_cart_item(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<UpdatePayload>,
) -> Result<Json<CartOut>, AppError> {
    let existing = fetch_cart_row(&state.pool, id, user.id).await?;

    let menuitem_id = payload.menuitem_id.unwrap_or(existing.menuitem.id);
    let quantity = match payload.quantity {
        Some(_) => validate_quantity(payload.quantity)?,
        None => existing.quantity,
    };

    let unit_price = menu_price(&state.pool, menuitem_id).await?;
    let price = quantity as f64 * unit_price;

    sqlx::query(
        "UPDATE carts SET menuitem_id = ?, quantity = ?, unit_price = ?, price = ? WHERE id = ?",
    )
    .bind(menuitem_id)
    .bind(quantity)
    .bind(unit_price)
    .bind(price)
    .bind(id)
    .execute(&state.pool)
    .await?;

    Ok(Json(fetch_cart_row(&state.pool, id, user.id).await?))
}

pub async fn clear_cart(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<StatusCode, AppError> {
    let result = sqlx::query("DELETE FROM carts WHERE user_id = ?")
        .bind(user.id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound(
            "No cart items found for this user".to_string(),
        ));
    }

    Ok(StatusCode::NO_CONTENT)
}

fn validate_quantity(quantity: Option<i64>) -> Result<i64, AppError> {
    match quantity {
        None => Err(AppError::field("quantity", "This field is required.")),
        Some(q) if q < 1 => Err(AppError::field("quantity", "Must be a positive integer.")),
        Some(q) => Ok(q),
    }
}

async fn menu_price(pool: &SqlitePool, menuitem_id: i64) -> Result<f64, AppError> {
    let row: Option<(f64,)> = sqlx::query_as("SELECT price FROM menu_items WHERE id = ?")
        .bind(menuitem_id)
        .fetch_optional(pool)
        .await?;

    row.map(|(price,)| price)
        .ok_or_else(|| AppError::NotFound("Menu item not found".to_string()))
}

/// The row must belong to the caller; other users' rows are indistinguishable
/// from absent ones.
async fn fetch_cart_row(pool: &SqlitePool, id: i64, user_id: i64) -> Result<CartOut, AppError> {
    let sql = format!("{CART_SELECT} WHERE cr.id = ? AND cr.user_id = ?");
    let row: Option<CartRow> = sqlx::query_as(&sql)
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    row.map(CartOut::from)
        .ok_or_else(|| AppError::NotFound("Cart item not found".to_string()))
}
