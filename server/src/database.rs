use std::str::FromStr;

use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    SqlitePool,
};
use tracing::info;

use crate::{
    auth::{self, Role},
    config::Config,
};

pub async fn init_db(database_url: &str) -> SqlitePool {
    let options = SqliteConnectOptions::from_str(database_url)
        .expect("Invalid database URL")
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .expect("Failed to open database");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("Migrations failed");

    pool
}

/// Seeds the first Manager-group account from the environment, if configured.
/// Group membership is otherwise only reachable through a manager, so a fresh
/// database needs one account planted outside the API.
pub async fn ensure_admin(pool: &SqlitePool, config: &Config) -> Result<(), sqlx::Error> {
    let (Some(username), Some(password)) = (&config.admin_username, &config.admin_password)
    else {
        return Ok(());
    };

    let existing: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE username = ?")
        .bind(username)
        .fetch_optional(pool)
        .await?;

    if existing.is_some() {
        return Ok(());
    }

    let result = sqlx::query("INSERT INTO users (username, email, password_hash) VALUES (?, '', ?)")
        .bind(username)
        .bind(auth::store_password(password))
        .execute(pool)
        .await?;

    sqlx::query(
        "INSERT INTO user_groups (user_id, group_id)
         SELECT ?, id FROM groups WHERE name = ?",
    )
    .bind(result.last_insert_rowid())
    .bind(Role::Manager.name())
    .execute(pool)
    .await?;

    info!("Seeded manager account '{username}'");
    Ok(())
}
