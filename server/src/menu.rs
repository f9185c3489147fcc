use std::{collections::BTreeMap, sync::Arc};

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    auth::CurrentUser,
    error::AppError,
    models::{Category, MenuItemOut, MenuItemRow, MENU_ITEM_SELECT},
    query::parse_ordering,
    state::AppState,
};

/// Exposed ordering fields for `/menu-items`, mapped to their columns.
const MENU_ORDER_FIELDS: &[(&str, &str)] = &[
    ("id", "m.id"),
    ("title", "m.title"),
    ("price", "m.price"),
    ("featured", "m.featured"),
    ("category", "m.category_id"),
];

pub async fn list_categories(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<Category>>, AppError> {
    let categories = sqlx::query_as("SELECT id, slug, title FROM categories")
        .fetch_all(&state.pool)
        .await?;

    Ok(Json(categories))
}

#[derive(Deserialize)]
pub struct CategoryPayload {
    slug: Option<String>,
    title: Option<String>,
}

pub async fn create_category(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(payload): Json<CategoryPayload>,
) -> Result<(StatusCode, Json<Category>), AppError> {
    user.require_manager()?;

    let mut errors = BTreeMap::new();
    let slug = payload.slug.unwrap_or_default();
    if slug.trim().is_empty() {
        errors.insert("slug", vec!["This field is required.".to_string()]);
    }
    let title = payload.title.unwrap_or_default();
    if title.trim().is_empty() {
        errors.insert("title", vec!["This field is required.".to_string()]);
    }
    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let taken: Option<(i64,)> = sqlx::query_as("SELECT id FROM categories WHERE slug = ?")
        .bind(&slug)
        .fetch_optional(&state.pool)
        .await?;
    if taken.is_some() {
        return Err(AppError::field(
            "slug",
            "A category with that slug already exists.",
        ));
    }

    let result = sqlx::query("INSERT INTO categories (slug, title) VALUES (?, ?)")
        .bind(&slug)
        .bind(&title)
        .execute(&state.pool)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(Category {
            id: result.last_insert_rowid(),
            slug,
            title,
        }),
    ))
}

#[derive(Deserialize)]
pub struct MenuListParams {
    title: Option<String>,
    ordering: Option<String>,
}

pub async fn list_menu_items(
    State(state): State<Arc<AppState>>,
    Query(params): Query<MenuListParams>,
) -> Result<Json<Vec<MenuItemOut>>, AppError> {
    let mut sql = MENU_ITEM_SELECT.to_string();

    if params.title.is_some() {
        sql.push_str(" WHERE instr(lower(m.title), lower(?)) > 0");
    }

    if let Some(ordering) = &params.ordering {
        sql.push_str(&parse_ordering(ordering, MENU_ORDER_FIELDS)?);
    }

    let mut query = sqlx::query_as::<_, MenuItemRow>(&sql);
    if let Some(title) = &params.title {
        query = query.bind(title);
    }

    let rows = query.fetch_all(&state.pool).await?;
    Ok(Json(rows.into_iter().map(MenuItemOut::from).collect()))
}

pub async fn get_menu_item(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<MenuItemOut>, AppError> {
    Ok(Json(fetch_menu_item(&state.pool, id).await?))
}

#[derive(Deserialize)]
pub struct MenuItemPayload {
    title: Option<String>,
    price: Option<f64>,
    #[serde(default)]
    featured: bool,
    category_id: Option<i64>,
}

pub async fn create_menu_item(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(payload): Json<MenuItemPayload>,
) -> Result<(StatusCode, Json<MenuItemOut>), AppError> {
    user.require_manager()?;

    let (title, price, category_id) = validate_menu_item(&state.pool, payload_fields(&payload)).await?;

    let result = sqlx::query(
        "INSERT INTO menu_items (title, price, featured, category_id) VALUES (?, ?, ?, ?)",
    )
    .bind(&title)
    .bind(price)
    .bind(payload.featured)
    .bind(category_id)
    .execute(&state.pool)
    .await?;

    let item = fetch_menu_item(&state.pool, result.last_insert_rowid()).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

pub async fn replace_menu_item(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<MenuItemPayload>,
) -> Result<Json<MenuItemOut>, AppError> {
    user.require_manager()?;
    fetch_menu_item(&state.pool, id).await?;

    let (title, price, category_id) = validate_menu_item(&state.pool, payload_fields(&payload)).await?;

    sqlx::query("UPDATE menu_items SET title = ?, price = ?, featured = ?, category_id = ? WHERE id = ?")
        .bind(&title)
        .bind(price)
        .bind(payload.featured)
        .bind(category_id)
        .bind(id)
        .execute(&state.pool)
        .await?;

    Ok(Json(fetch_menu_item(&state.pool, id).await?))
}

#[derive(Deserialize)]
pub struct MenuItemPatch {
    title: Option<String>,
    price: Option<f64>,
    featured: Option<bool>,
    category_id: Option<i64>,
}

pub async fn patch_menu_item(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<MenuItemPatch>,
) -> Result<Json<MenuItemOut>, AppError> {
    user.require_manager()?;
    let existing = fetch_menu_item(&state.pool, id).await?;

    let merged = MenuItemPayload {
        title: Some(payload.title.unwrap_or(existing.title)),
        price: Some(payload.price.unwrap_or(existing.price)),
        featured: payload.featured.unwrap_or(existing.featured),
        category_id: Some(payload.category_id.unwrap_or(existing.category.id)),
    };
    let (title, price, category_id) = validate_menu_item(&state.pool, payload_fields(&merged)).await?;

    sqlx::query("UPDATE menu_items SET title = ?, price = ?, featured = ?, category_id = ? WHERE id = ?")
        .bind(&title)
        .bind(price)
        .bind(merged.featured)
        .bind(category_id)
        .bind(id)
        .execute(&state.pool)
        .await?;

    Ok(Json(fetch_menu_item(&state.pool, id).await?))
}

pub async fn delete_menu_item(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    user.require_manager()?;

    let result = sqlx::query("DELETE FROM menu_items WHERE id = ?")
        .bind(id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Menu item not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

pub async fn fetch_menu_item(pool: &SqlitePool, id: i64) -> Result<MenuItemOut, AppError> {
    let sql = format!("{MENU_ITEM_SELECT} WHERE m.id = ?");
    let row: Option<MenuItemRow> = sqlx::query_as(&sql).bind(id).fetch_optional(pool).await?;

    row.map(MenuItemOut::from)
        .ok_or_else(|| AppError::NotFound("Menu item not found".to_string()))
}

fn payload_fields(payload: &MenuItemPayload) -> (Option<&str>, Option<f64>, Option<i64>) {
    (payload.title.as_deref(), payload.price, payload.category_id)
}

async fn validate_menu_item(
    pool: &SqlitePool,
    (title, price, category_id): (Option<&str>, Option<f64>, Option<i64>),
) -> Result<(String, f64, i64), AppError> {
    let mut errors = BTreeMap::new();

    let title = title.unwrap_or_default();
    if title.trim().is_empty() {
        errors.insert("title", vec!["This field is required.".to_string()]);
    }

    match price {
        None => {
            errors.insert("price", vec!["This field is required.".to_string()]);
        }
        Some(p) if p <= 0.0 => {
            errors.insert("price", vec!["Must be a positive number.".to_string()]);
        }
        Some(_) => {}
    }

    match category_id {
        None => {
            errors.insert("category_id", vec!["This field is required.".to_string()]);
        }
        Some(id) => {
            let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM categories WHERE id = ?")
                .bind(id)
                .fetch_optional(pool)
                .await?;
            if exists.is_none() {
                errors.insert("category_id", vec!["Invalid category.".to_string()]);
            }
        }
    }

    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    Ok((
        title.to_string(),
        price.unwrap_or_default(),
        category_id.unwrap_or_default(),
    ))
}
