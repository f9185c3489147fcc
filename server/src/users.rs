use std::{collections::BTreeMap, sync::Arc};

use axum::{extract::State, http::StatusCode, Json};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    auth::{self, CurrentUser},
    error::AppError,
    models::Profile,
    state::AppState,
};

#[derive(Deserialize)]
pub struct RegisterPayload {
    username: Option<String>,
    #[serde(default)]
    email: String,
    password: Option<String>,
}

pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterPayload>,
) -> Result<(StatusCode, Json<Profile>), AppError> {
    let mut errors = BTreeMap::new();

    let username = payload.username.unwrap_or_default();
    if username.trim().is_empty() {
        errors.insert("username", vec!["This field is required.".to_string()]);
    }

    let password = payload.password.unwrap_or_default();
    if password.is_empty() {
        errors.insert("password", vec!["This field is required.".to_string()]);
    }

    if !errors.is_empty() {
        return Err(AppError::Validation(errors));
    }

    let taken: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE username = ?")
        .bind(&username)
        .fetch_optional(&state.pool)
        .await?;

    if taken.is_some() {
        return Err(AppError::field(
            "username",
            "A user with that username already exists.",
        ));
    }

    let result = sqlx::query("INSERT INTO users (username, email, password_hash) VALUES (?, ?, ?)")
        .bind(&username)
        .bind(&payload.email)
        .bind(auth::store_password(&password))
        .execute(&state.pool)
        .await?;

    info!("Registered user '{username}'");

    Ok((
        StatusCode::CREATED,
        Json(Profile {
            id: result.last_insert_rowid(),
            username,
            email: payload.email,
        }),
    ))
}

#[derive(Deserialize)]
pub struct TokenPayload {
    username: Option<String>,
    password: Option<String>,
}

#[derive(Serialize, Debug)]
pub struct TokenOut {
    pub token: String,
}

pub async fn issue_token(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<TokenPayload>,
) -> Result<Json<TokenOut>, AppError> {
    let (Some(username), Some(password)) = (payload.username, payload.password) else {
        return Err(AppError::Unauthorized);
    };

    let row: Option<(i64, String)> =
        sqlx::query_as("SELECT id, password_hash FROM users WHERE username = ?")
            .bind(&username)
            .fetch_optional(&state.pool)
            .await?;

    let Some((user_id, stored)) = row else {
        return Err(AppError::Unauthorized);
    };

    if !auth::verify_password(&password, &stored) {
        return Err(AppError::Unauthorized);
    }

    let token = auth::new_token();
    sqlx::query("INSERT INTO tokens (token, user_id) VALUES (?, ?)")
        .bind(&token)
        .bind(user_id)
        .execute(&state.pool)
        .await?;

    Ok(Json(TokenOut { token }))
}

pub async fn me(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<Json<Profile>, AppError> {
    let profile: Profile = sqlx::query_as("SELECT id, username, email FROM users WHERE id = ?")
        .bind(user.id)
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(profile))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{auth::lookup_token, testutil};

    #[tokio::test]
    async fn register_then_login_then_lookup() {
        let state = testutil::state().await;

        let (status, profile) = register(
            State(state.clone()),
            Json(RegisterPayload {
                username: Some("maria".to_string()),
                email: "maria@example.com".to_string(),
                password: Some("hunter2".to_string()),
            }),
        )
        .await
        .unwrap();

        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(profile.username, "maria");

        let token = issue_token(
            State(state.clone()),
            Json(TokenPayload {
                username: Some("maria".to_string()),
                password: Some("hunter2".to_string()),
            }),
        )
        .await
        .unwrap();

        let user = lookup_token(&state.pool, &token.token)
            .await
            .unwrap()
            .expect("token resolves");
        assert_eq!(user.id, profile.id);
        assert!(user.roles.is_empty());
    }

    #[tokio::test]
    async fn register_requires_username_and_password() {
        let state = testutil::state().await;

        let err = register(
            State(state),
            Json(RegisterPayload {
                username: None,
                email: String::new(),
                password: None,
            }),
        )
        .await
        .unwrap_err();

        match err {
            AppError::Validation(errors) => {
                assert!(errors.contains_key("username"));
                assert!(errors.contains_key("password"));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected() {
        let state = testutil::state().await;
        testutil::create_user(&state.pool, "taken").await;

        let err = register(
            State(state),
            Json(RegisterPayload {
                username: Some("taken".to_string()),
                email: String::new(),
                password: Some("pw".to_string()),
            }),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Validation(_)));
    }

    #[tokio::test]
    async fn wrong_password_is_unauthorized() {
        let state = testutil::state().await;
        testutil::create_user(&state.pool, "sam").await;

        let err = issue_token(
            State(state),
            Json(TokenPayload {
                username: Some("sam".to_string()),
                password: Some("wrong".to_string()),
            }),
        )
        .await
        .unwrap_err();

        assert!(matches!(err, AppError::Unauthorized));
    }
}
