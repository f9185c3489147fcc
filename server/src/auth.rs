use std::{collections::HashSet, sync::Arc};

use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use rand::RngCore;
use sha2::{Digest, Sha256};
use sqlx::SqlitePool;

use crate::{error::AppError, state::AppState};

/// The two staff roles, resolved once from group membership at request start.
/// Everyone else is an ordinary customer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Manager,
    DeliveryCrew,
}

impl Role {
    pub fn name(self) -> &'static str {
        match self {
            Role::Manager => "Manager",
            Role::DeliveryCrew => "Delivery crew",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        match name {
            "Manager" => Some(Role::Manager),
            "Delivery crew" => Some(Role::DeliveryCrew),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: i64,
    pub username: String,
    pub roles: HashSet<Role>,
}

impl CurrentUser {
    pub fn is_manager(&self) -> bool {
        self.roles.contains(&Role::Manager)
    }

    pub fn is_delivery_crew(&self) -> bool {
        self.roles.contains(&Role::DeliveryCrew)
    }

    pub fn require_manager(&self) -> Result<(), AppError> {
        if self.is_manager() {
            Ok(())
        } else {
            Err(AppError::Forbidden(
                "Only managers may perform this action".to_string(),
            ))
        }
    }
}

impl FromRequestParts<Arc<AppState>> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let header = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .ok_or(AppError::Unauthorized)?;

        let token = header.strip_prefix("Bearer ").ok_or(AppError::Unauthorized)?;

        lookup_token(&state.pool, token)
            .await?
            .ok_or(AppError::Unauthorized)
    }
}

/// Resolves a bearer token to its user and role set in two queries; handlers
/// never re-query group membership after this point.
pub async fn lookup_token(
    pool: &SqlitePool,
    token: &str,
) -> Result<Option<CurrentUser>, AppError> {
    let row: Option<(i64, String)> = sqlx::query_as(
        "SELECT u.id, u.username
         FROM tokens t
         JOIN users u ON u.id = t.user_id
         WHERE t.token = ?",
    )
    .bind(token)
    .fetch_optional(pool)
    .await?;

    let Some((id, username)) = row else {
        return Ok(None);
    };

    let names: Vec<(String,)> = sqlx::query_as(
        "SELECT g.name
         FROM user_groups ug
         JOIN groups g ON g.id = ug.group_id
         WHERE ug.user_id = ?",
    )
    .bind(id)
    .fetch_all(pool)
    .await?;

    let roles = names
        .iter()
        .filter_map(|(name,)| Role::from_name(name))
        .collect();

    Ok(Some(CurrentUser {
        id,
        username,
        roles,
    }))
}

pub fn new_token() -> String {
    let mut bytes = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Produces the stored `salt$digest` form for a fresh password.
pub fn store_password(password: &str) -> String {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    let salt = hex::encode(salt);
    let digest = digest(&salt, password);
    format!("{salt}${digest}")
}

pub fn verify_password(password: &str, stored: &str) -> bool {
    match stored.split_once('$') {
        Some((salt, expected)) => digest(salt, password) == expected,
        None => false,
    }
}

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(password.as_bytes());
    hex::encode(hasher.finalize())
}
