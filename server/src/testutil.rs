//! Shared fixtures for the module tests: an in-memory database with the
//! schema applied, plus seed helpers for the rows most tests need.

use std::sync::Arc;

use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};

use crate::{
    auth::{self, CurrentUser, Role},
    config::Config,
    state::AppState,
};

pub(crate) async fn pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("migrations");

    pool
}

pub(crate) async fn state() -> Arc<AppState> {
    Arc::new(AppState {
        config: Config::load(),
        pool: pool().await,
    })
}

pub(crate) async fn create_user(pool: &SqlitePool, username: &str) -> i64 {
    sqlx::query("INSERT INTO users (username, email, password_hash) VALUES (?, '', ?)")
        .bind(username)
        .bind(auth::store_password("secret"))
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
}

pub(crate) async fn add_role(pool: &SqlitePool, user_id: i64, role: Role) {
    sqlx::query(
        "INSERT INTO user_groups (user_id, group_id)
         SELECT ?, id FROM groups WHERE name = ?",
    )
    .bind(user_id)
    .bind(role.name())
    .execute(pool)
    .await
    .unwrap();
}

pub(crate) fn as_user(id: i64, username: &str, roles: &[Role]) -> CurrentUser {
    CurrentUser {
        id,
        username: username.to_string(),
        roles: roles.iter().copied().collect(),
    }
}

pub(crate) async fn create_category(pool: &SqlitePool, slug: &str, title: &str) -> i64 {
    sqlx::query("INSERT INTO categories (slug, title) VALUES (?, ?)")
        .bind(slug)
        .bind(title)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
}

pub(crate) async fn create_menu_item(
    pool: &SqlitePool,
    title: &str,
    price: f64,
    category_id: i64,
) -> i64 {
    sqlx::query("INSERT INTO menu_items (title, price, featured, category_id) VALUES (?, ?, 0, ?)")
        .bind(title)
        .bind(price)
        .bind(category_id)
        .execute(pool)
        .await
        .unwrap()
        .last_insert_rowid()
}
