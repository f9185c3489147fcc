use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Local;
use rand::{seq::SliceRandom, Rng};
use serde::Deserialize;
use serde_json::{json, Value};
use sqlx::{FromRow, SqlitePool};

use crate::{
    auth::{CurrentUser, Role},
    error::AppError,
    models::{OrderItemOut, OrderItemRow, OrderOut, OrderRow, ORDER_ITEM_SELECT, ORDER_SELECT},
    query::{page_bounds, parse_ordering},
    state::AppState,
};

/// Exposed ordering fields for `/orders`, mapped to their columns.
const ORDER_ORDER_FIELDS: &[(&str, &str)] = &[
    ("id", "o.id"),
    ("date", "o.date"),
    ("total", "o.total"),
    ("status", "o.status"),
    ("user", "o.user_id"),
    ("delivery_crew", "o.delivery_crew_id"),
];

#[derive(Deserialize)]
pub struct OrderListParams {
    ordering: Option<String>,
    page: Option<u32>,
    per_page: Option<u32>,
}

/// Managers see every order, delivery crew the ones assigned to them,
/// customers their own. Orders and their items are paginated as two
/// independent sequences driven by the same `page`/`per_page` parameters;
/// order page N and item page N do not correspond to each other.
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Query(params): Query<OrderListParams>,
) -> Result<Json<Value>, AppError> {
    let scope = if user.is_manager() {
        ""
    } else if user.is_delivery_crew() {
        " WHERE o.delivery_crew_id = ?"
    } else {
        " WHERE o.user_id = ?"
    };
    let scoped = !user.is_manager();

    let (limit, offset) = page_bounds(params.page, params.per_page, state.config.page_size);

    let mut sql = format!("{ORDER_SELECT}{scope}");
    if let Some(ordering) = &params.ordering {
        sql.push_str(&parse_ordering(ordering, ORDER_ORDER_FIELDS)?);
    }
    sql.push_str(" LIMIT ? OFFSET ?");

    let mut query = sqlx::query_as::<_, OrderRow>(&sql);
    if scoped {
        query = query.bind(user.id);
    }
    let orders: Vec<OrderRow> = query.bind(limit).bind(offset).fetch_all(&state.pool).await?;

    let items_sql = format!("{ORDER_ITEM_SELECT}{scope} LIMIT ? OFFSET ?");
    let mut query = sqlx::query_as::<_, OrderItemRow>(&items_sql);
    if scoped {
        query = query.bind(user.id);
    }
    let items: Vec<OrderItemRow> = query.bind(limit).bind(offset).fetch_all(&state.pool).await?;

    Ok(Json(json!({
        "orders": orders.into_iter().map(OrderOut::from).collect::<Vec<_>>(),
        "order_items": items.into_iter().map(OrderItemOut::from).collect::<Vec<_>>(),
    })))
}

#[derive(FromRow)]
struct CartSnapshot {
    menuitem_id: i64,
    quantity: i64,
    unit_price: f64,
    price: f64,
}

/// Converts the caller's cart into an order: snapshot every cart row into an
/// order item, hand the order to a random delivery-crew member, clear the
/// cart. The writes run in one transaction so a failure leaves neither a
/// partial order nor a half-cleared cart.
pub async fn place_order(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<(StatusCode, Json<OrderOut>), AppError> {
    let cart: Vec<CartSnapshot> = sqlx::query_as(
        "SELECT menuitem_id, quantity, unit_price, price FROM carts WHERE user_id = ?",
    )
    .bind(user.id)
    .fetch_all(&state.pool)
    .await?;

    if cart.is_empty() {
        return Err(AppError::BadRequest("No items in cart".to_string()));
    }

    let crew = delivery_crew_ids(&state.pool).await?;
    let Some(crew_id) = choose_crew(&crew, &mut rand::thread_rng()) else {
        return Err(AppError::BadRequest("No delivery crew available".to_string()));
    };

    let total: f64 = cart.iter().map(|row| row.price).sum();
    let date = Local::now().date_naive();

    let mut tx = state.pool.begin().await?;

    let order_id = sqlx::query(
        "INSERT INTO orders (user_id, delivery_crew_id, status, total, date)
         VALUES (?, ?, 0, ?, ?)",
    )
    .bind(user.id)
    .bind(crew_id)
    .bind(total)
    .bind(date)
    .execute(&mut *tx)
    .await?
    .last_insert_rowid();

    for row in &cart {
        sqlx::query(
            "INSERT INTO order_items (order_id, menuitem_id, quantity, unit_price, price)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(order_id)
        .bind(row.menuitem_id)
        .bind(row.quantity)
        .bind(row.unit_price)
        .bind(row.price)
        .execute(&mut *tx)
        .await?;
    }

    sqlx::query("DELETE FROM carts WHERE user_id = ?")
        .bind(user.id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;

    let order = fetch_order(&state.pool, order_id).await?;
    Ok((StatusCode::CREATED, Json(order)))
}

fn choose_crew(crew: &[i64], rng: &mut impl Rng) -> Option<i64> {
    crew.choose(rng).copied()
}

/// Owner-only, with no manager or delivery-crew bypass.
pub async fn get_order(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<Json<Vec<OrderItemOut>>, AppError> {
    let order = fetch_order(&state.pool, id).await?;

    if order.user.id != user.id {
        return Err(AppError::Forbidden(
            "The order does not belong to the authenticated user".to_string(),
        ));
    }

    let sql = format!("{ORDER_ITEM_SELECT} WHERE oi.order_id = ?");
    let items: Vec<OrderItemRow> = sqlx::query_as(&sql).bind(id).fetch_all(&state.pool).await?;

    Ok(Json(items.into_iter().map(OrderItemOut::from).collect()))
}

#[derive(Deserialize)]
pub struct ReplacePayload {
    status: Option<bool>,
    delivery_crew: Option<i64>,
}

pub async fn replace_order(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<ReplacePayload>,
) -> Result<Json<OrderOut>, AppError> {
    if user.is_delivery_crew() {
        return Err(AppError::Forbidden(
            "Delivery crew members are not allowed to update orders".to_string(),
        ));
    }

    if user.is_manager() {
        fetch_order(&state.pool, id).await?;
    } else {
        fetch_order_owned(&state.pool, id, user.id).await?;
    }

    let status = payload
        .status
        .ok_or_else(|| AppError::field("status", "This field is required."))?;

    if let Some(crew_id) = payload.delivery_crew {
        validate_assignee(&state.pool, crew_id).await?;
    }

    sqlx::query("UPDATE orders SET status = ?, delivery_crew_id = ? WHERE id = ?")
        .bind(status)
        .bind(payload.delivery_crew)
        .bind(id)
        .execute(&state.pool)
        .await?;

    Ok(Json(fetch_order(&state.pool, id).await?))
}

#[derive(Deserialize)]
pub struct PatchPayload {
    status: Option<bool>,
    // Double option: absent leaves the assignment alone, null clears it.
    #[serde(default)]
    delivery_crew: Option<Option<i64>>,
}

pub async fn patch_order(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<i64>,
    Json(payload): Json<PatchPayload>,
) -> Result<Json<OrderOut>, AppError> {
    if user.is_delivery_crew() {
        // Crew may flip the status on their own assignments; any
        // delivery_crew field in the payload is ignored.
        fetch_order_assigned(&state.pool, id, user.id).await?;

        if let Some(status) = payload.status {
            sqlx::query("UPDATE orders SET status = ? WHERE id = ?")
                .bind(status)
                .bind(id)
                .execute(&state.pool)
                .await?;
        }
    } else if user.is_manager() {
        fetch_order(&state.pool, id).await?;

        if let Some(status) = payload.status {
            sqlx::query("UPDATE orders SET status = ? WHERE id = ?")
                .bind(status)
                .bind(id)
                .execute(&state.pool)
                .await?;
        }

        if let Some(assignment) = payload.delivery_crew {
            if let Some(crew_id) = assignment {
                validate_assignee(&state.pool, crew_id).await?;
            }
            sqlx::query("UPDATE orders SET delivery_crew_id = ? WHERE id = ?")
                .bind(assignment)
                .bind(id)
                .execute(&state.pool)
                .await?;
        }
    } else {
        return Err(AppError::Forbidden(
            "The user does not have permission to update".to_string(),
        ));
    }

    Ok(Json(fetch_order(&state.pool, id).await?))
}

pub async fn delete_order(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, AppError> {
    if !user.is_manager() {
        return Err(AppError::Forbidden(
            "The user does not have permission to delete".to_string(),
        ));
    }

    let result = sqlx::query("DELETE FROM orders WHERE id = ?")
        .bind(id)
        .execute(&state.pool)
        .await?;

    if result.rows_affected() == 0 {
        return Err(AppError::NotFound("Order not found".to_string()));
    }

    Ok(StatusCode::NO_CONTENT)
}

async fn fetch_order(pool: &SqlitePool, id: i64) -> Result<OrderOut, AppError> {
    let sql = format!("{ORDER_SELECT} WHERE o.id = ?");
    let row: Option<OrderRow> = sqlx::query_as(&sql).bind(id).fetch_optional(pool).await?;

    row.map(OrderOut::from)
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))
}

async fn fetch_order_owned(pool: &SqlitePool, id: i64, user_id: i64) -> Result<OrderOut, AppError> {
    let sql = format!("{ORDER_SELECT} WHERE o.id = ? AND o.user_id = ?");
    let row: Option<OrderRow> = sqlx::query_as(&sql)
        .bind(id)
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    row.map(OrderOut::from)
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))
}

async fn fetch_order_assigned(
    pool: &SqlitePool,
    id: i64,
    crew_id: i64,
) -> Result<OrderOut, AppError> {
    let sql = format!("{ORDER_SELECT} WHERE o.id = ? AND o.delivery_crew_id = ?");
    let row: Option<OrderRow> = sqlx::query_as(&sql)
        .bind(id)
        .bind(crew_id)
        .fetch_optional(pool)
        .await?;

    row.map(OrderOut::from)
        .ok_or_else(|| AppError::NotFound("Order not found".to_string()))
}

async fn delivery_crew_ids(pool: &SqlitePool) -> Result<Vec<i64>, AppError> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        "SELECT u.id
         FROM users u
         JOIN user_groups ug ON ug.user_id = u.id
         JOIN groups g ON g.id = ug.group_id
         WHERE g.name = ?",
    )
    .bind(Role::DeliveryCrew.name())
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

async fn validate_assignee(pool: &SqlitePool, crew_id: i64) -> Result<(), AppError> {
    let member: Option<(i64,)> = sqlx::query_as(
        "SELECT ug.user_id
         FROM user_groups ug
         JOIN groups g ON g.id = ug.group_id
         WHERE ug.user_id = ? AND g.name = ?",
    )
    .bind(crew_id)
    .bind(Role::DeliveryCrew.name())
    .fetch_optional(pool)
    .await?;

    if member.is_none() {
        return Err(AppError::field(
            "delivery_crew",
            "Must be a member of the Delivery crew group.",
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;
    use rand::{rngs::StdRng, SeedableRng};

    struct Fixture {
        state: Arc<AppState>,
        customer: CurrentUser,
        crew: CurrentUser,
        manager: CurrentUser,
        item: i64,
    }

    async fn seeded() -> Fixture {
        let state = testutil::state().await;
        let pool = &state.pool;

        let customer_id = testutil::create_user(pool, "alice").await;
        let crew_id = testutil::create_user(pool, "carla").await;
        testutil::add_role(pool, crew_id, Role::DeliveryCrew).await;
        let manager_id = testutil::create_user(pool, "boss").await;
        testutil::add_role(pool, manager_id, Role::Manager).await;

        let cat = testutil::create_category(pool, "mains", "Mains").await;
        let item = testutil::create_menu_item(pool, "Lasagna", 12.5, cat).await;

        Fixture {
            customer: testutil::as_user(customer_id, "alice", &[]),
            crew: testutil::as_user(crew_id, "carla", &[Role::DeliveryCrew]),
            manager: testutil::as_user(manager_id, "boss", &[Role::Manager]),
            state,
            item,
        }
    }

    async fn add_cart_row(
        pool: &SqlitePool,
        user_id: i64,
        menuitem_id: i64,
        quantity: i64,
        unit_price: f64,
    ) {
        sqlx::query(
            "INSERT INTO carts (user_id, menuitem_id, quantity, unit_price, price)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(menuitem_id)
        .bind(quantity)
        .bind(unit_price)
        .bind(quantity as f64 * unit_price)
        .execute(pool)
        .await
        .unwrap();
    }

    async fn order_count(pool: &SqlitePool) -> i64 {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM orders")
            .fetch_one(pool)
            .await
            .unwrap();
        count
    }

    #[tokio::test]
    async fn placement_snapshots_totals_and_clears_cart() {
        let f = seeded().await;
        add_cart_row(&f.state.pool, f.customer.id, f.item, 2, 12.5).await;
        add_cart_row(&f.state.pool, f.customer.id, f.item, 1, 4.25).await;

        let (status, Json(order)) = place_order(State(f.state.clone()), f.customer.clone())
            .await
            .unwrap();

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(order.total, 29.25);
        assert!(!order.status);
        assert_eq!(order.delivery_crew.as_ref().unwrap().id, f.crew.id);

        let Json(items) = get_order(State(f.state.clone()), f.customer.clone(), Path(order.id))
            .await
            .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].quantity, 2);
        assert_eq!(items[0].unit_price, 12.5);
        assert_eq!(items[0].price, 25.0);

        let (remaining,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM carts WHERE user_id = ?")
            .bind(f.customer.id)
            .fetch_one(&f.state.pool)
            .await
            .unwrap();
        assert_eq!(remaining, 0);
    }

    #[tokio::test]
    async fn empty_cart_is_bad_request() {
        let f = seeded().await;

        let err = place_order(State(f.state.clone()), f.customer)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(order_count(&f.state.pool).await, 0);
    }

    #[tokio::test]
    async fn missing_delivery_crew_is_bad_request() {
        let f = seeded().await;
        add_cart_row(&f.state.pool, f.customer.id, f.item, 1, 12.5).await;
        sqlx::query("DELETE FROM user_groups").execute(&f.state.pool).await.unwrap();

        let err = place_order(State(f.state.clone()), f.customer)
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
        assert_eq!(order_count(&f.state.pool).await, 0);
    }

    #[test]
    fn crew_choice_is_uniform_over_the_set() {
        let crew = vec![1, 2, 3];
        let mut rng = StdRng::seed_from_u64(7);
        let mut seen = std::collections::HashSet::new();
        for _ in 0..100 {
            seen.insert(choose_crew(&crew, &mut rng).unwrap());
        }
        assert_eq!(seen.len(), 3);
        assert!(choose_crew(&[], &mut rng).is_none());
    }

    #[tokio::test]
    async fn get_order_is_owner_only() {
        let f = seeded().await;
        add_cart_row(&f.state.pool, f.customer.id, f.item, 1, 12.5).await;
        let (_, Json(order)) = place_order(State(f.state.clone()), f.customer.clone())
            .await
            .unwrap();

        let other_id = testutil::create_user(&f.state.pool, "bob").await;
        let other = testutil::as_user(other_id, "bob", &[]);
        let err = get_order(State(f.state.clone()), other, Path(order.id))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        // Owner-only with no role bypass: managers are rejected too.
        let err = get_order(State(f.state.clone()), f.manager, Path(order.id))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn crew_patch_is_scoped_and_status_only() {
        let f = seeded().await;
        add_cart_row(&f.state.pool, f.customer.id, f.item, 1, 12.5).await;
        let (_, Json(order)) = place_order(State(f.state.clone()), f.customer.clone())
            .await
            .unwrap();

        let outsider_id = testutil::create_user(&f.state.pool, "drew").await;
        testutil::add_role(&f.state.pool, outsider_id, Role::DeliveryCrew).await;
        let outsider = testutil::as_user(outsider_id, "drew", &[Role::DeliveryCrew]);

        let err = patch_order(
            State(f.state.clone()),
            outsider.clone(),
            Path(order.id),
            Json(PatchPayload {
                status: Some(true),
                delivery_crew: None,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        // The assigned crew member may flip status; their attempt to
        // reassign the order is ignored.
        let Json(updated) = patch_order(
            State(f.state.clone()),
            f.crew.clone(),
            Path(order.id),
            Json(PatchPayload {
                status: Some(true),
                delivery_crew: Some(Some(outsider_id)),
            }),
        )
        .await
        .unwrap();
        assert!(updated.status);
        assert_eq!(updated.delivery_crew.unwrap().id, f.crew.id);
    }

    #[tokio::test]
    async fn customer_patch_is_forbidden() {
        let f = seeded().await;
        add_cart_row(&f.state.pool, f.customer.id, f.item, 1, 12.5).await;
        let (_, Json(order)) = place_order(State(f.state.clone()), f.customer.clone())
            .await
            .unwrap();

        let err = patch_order(
            State(f.state.clone()),
            f.customer,
            Path(order.id),
            Json(PatchPayload {
                status: Some(true),
                delivery_crew: None,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn replace_scopes_by_role() {
        let f = seeded().await;
        add_cart_row(&f.state.pool, f.customer.id, f.item, 1, 12.5).await;
        let (_, Json(order)) = place_order(State(f.state.clone()), f.customer.clone())
            .await
            .unwrap();

        let err = replace_order(
            State(f.state.clone()),
            f.crew.clone(),
            Path(order.id),
            Json(ReplacePayload {
                status: Some(true),
                delivery_crew: None,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let other_id = testutil::create_user(&f.state.pool, "bob").await;
        let other = testutil::as_user(other_id, "bob", &[]);
        let err = replace_order(
            State(f.state.clone()),
            other,
            Path(order.id),
            Json(ReplacePayload {
                status: Some(true),
                delivery_crew: None,
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));

        let Json(updated) = replace_order(
            State(f.state.clone()),
            f.manager,
            Path(order.id),
            Json(ReplacePayload {
                status: Some(true),
                delivery_crew: None,
            }),
        )
        .await
        .unwrap();
        assert!(updated.status);
        assert!(updated.delivery_crew.is_none());
    }

    #[tokio::test]
    async fn replace_rejects_non_crew_assignee() {
        let f = seeded().await;
        add_cart_row(&f.state.pool, f.customer.id, f.item, 1, 12.5).await;
        let (_, Json(order)) = place_order(State(f.state.clone()), f.customer.clone())
            .await
            .unwrap();

        let outsider_id = testutil::create_user(&f.state.pool, "eve").await;
        let err = replace_order(
            State(f.state.clone()),
            f.manager,
            Path(order.id),
            Json(ReplacePayload {
                status: Some(false),
                delivery_crew: Some(outsider_id),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn delete_is_manager_only() {
        let f = seeded().await;
        add_cart_row(&f.state.pool, f.customer.id, f.item, 1, 12.5).await;
        let (_, Json(order)) = place_order(State(f.state.clone()), f.customer.clone())
            .await
            .unwrap();

        let err = delete_order(State(f.state.clone()), f.customer, Path(order.id))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));

        let status = delete_order(State(f.state.clone()), f.manager.clone(), Path(order.id))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let err = delete_order(State(f.state), f.manager, Path(order.id))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn listing_is_role_scoped_and_paginated() {
        let f = seeded().await;

        for _ in 0..3 {
            add_cart_row(&f.state.pool, f.customer.id, f.item, 1, 10.0).await;
            place_order(State(f.state.clone()), f.customer.clone())
                .await
                .unwrap();
        }
        let other_id = testutil::create_user(&f.state.pool, "bob").await;
        let other = testutil::as_user(other_id, "bob", &[]);
        add_cart_row(&f.state.pool, other_id, f.item, 2, 10.0).await;
        place_order(State(f.state.clone()), other.clone())
            .await
            .unwrap();

        let all = |user: CurrentUser| {
            list_orders(
                State(f.state.clone()),
                user,
                Query(OrderListParams {
                    ordering: None,
                    page: None,
                    per_page: None,
                }),
            )
        };

        let Json(body) = all(f.manager.clone()).await.unwrap();
        assert_eq!(body["orders"].as_array().unwrap().len(), 4);

        let Json(body) = all(f.customer.clone()).await.unwrap();
        assert_eq!(body["orders"].as_array().unwrap().len(), 3);

        let Json(body) = all(f.crew.clone()).await.unwrap();
        assert_eq!(body["orders"].as_array().unwrap().len(), 4);

        let Json(body) = list_orders(
            State(f.state.clone()),
            f.manager.clone(),
            Query(OrderListParams {
                ordering: Some("-total".to_string()),
                page: Some(1),
                per_page: Some(2),
            }),
        )
        .await
        .unwrap();
        let orders = body["orders"].as_array().unwrap();
        assert_eq!(orders.len(), 2);
        assert_eq!(orders[0]["total"].as_f64().unwrap(), 20.0);
        let items = body["order_items"].as_array().unwrap();
        assert_eq!(items.len(), 2);
    }
}
