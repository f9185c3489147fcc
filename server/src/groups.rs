use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use sqlx::SqlitePool;

use crate::{
    auth::{CurrentUser, Role},
    error::AppError,
    models::UserOut,
    state::AppState,
};

fn already_member_detail(role: Role) -> &'static str {
    match role {
        Role::Manager => "The user is already a manager",
        Role::DeliveryCrew => "The user is already a Delivery crew",
    }
}

async fn members(pool: &SqlitePool, role: Role) -> Result<Vec<UserOut>, AppError> {
    let users = sqlx::query_as(
        "SELECT u.id, u.username
         FROM users u
         JOIN user_groups ug ON ug.user_id = u.id
         JOIN groups g ON g.id = ug.group_id
         WHERE g.name = ?",
    )
    .bind(role.name())
    .fetch_all(pool)
    .await?;

    Ok(users)
}

#[derive(Deserialize)]
pub struct MemberPayload {
    username: Option<String>,
}

async fn add_member(
    pool: &SqlitePool,
    role: Role,
    payload: MemberPayload,
) -> Result<Json<UserOut>, AppError> {
    let Some(username) = payload.username.filter(|u| !u.is_empty()) else {
        return Err(AppError::BadRequest("Username is required".to_string()));
    };

    let user: Option<UserOut> = sqlx::query_as("SELECT id, username FROM users WHERE username = ?")
        .bind(&username)
        .fetch_optional(pool)
        .await?;

    let Some(user) = user else {
        return Err(AppError::NotFound(
            "There is no user with the given username".to_string(),
        ));
    };

    let member: Option<(i64,)> = sqlx::query_as(
        "SELECT ug.user_id
         FROM user_groups ug
         JOIN groups g ON g.id = ug.group_id
         WHERE ug.user_id = ? AND g.name = ?",
    )
    .bind(user.id)
    .bind(role.name())
    .fetch_optional(pool)
    .await?;

    if member.is_some() {
        return Err(AppError::BadRequest(already_member_detail(role).to_string()));
    }

    sqlx::query(
        "INSERT INTO user_groups (user_id, group_id)
         SELECT ?, id FROM groups WHERE name = ?",
    )
    .bind(user.id)
    .bind(role.name())
    .execute(pool)
    .await?;

    Ok(Json(user))
}

/// Removal is idempotent: the user just has to exist. Deleting a membership
/// that was never there still reports success.
async fn remove_member(pool: &SqlitePool, role: Role, user_id: i64) -> Result<StatusCode, AppError> {
    let exists: Option<(i64,)> = sqlx::query_as("SELECT id FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(pool)
        .await?;

    if exists.is_none() {
        return Err(AppError::NotFound("The user is not found".to_string()));
    }

    sqlx::query(
        "DELETE FROM user_groups
         WHERE user_id = ?
           AND group_id IN (SELECT id FROM groups WHERE name = ?)",
    )
    .bind(user_id)
    .bind(role.name())
    .execute(pool)
    .await?;

    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_managers(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<Json<Vec<UserOut>>, AppError> {
    user.require_manager()?;
    Ok(Json(members(&state.pool, Role::Manager).await?))
}

pub async fn add_manager(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(payload): Json<MemberPayload>,
) -> Result<Json<UserOut>, AppError> {
    user.require_manager()?;
    add_member(&state.pool, Role::Manager, payload).await
}

pub async fn remove_manager(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(user_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    user.require_manager()?;
    remove_member(&state.pool, Role::Manager, user_id).await
}

pub async fn list_delivery_crew(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
) -> Result<Json<Vec<UserOut>>, AppError> {
    user.require_manager()?;
    Ok(Json(members(&state.pool, Role::DeliveryCrew).await?))
}

pub async fn add_delivery_crew(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(payload): Json<MemberPayload>,
) -> Result<Json<UserOut>, AppError> {
    user.require_manager()?;
    add_member(&state.pool, Role::DeliveryCrew, payload).await
}

pub async fn remove_delivery_crew(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(user_id): Path<i64>,
) -> Result<StatusCode, AppError> {
    user.require_manager()?;
    remove_member(&state.pool, Role::DeliveryCrew, user_id).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil;

    #[tokio::test]
    async fn add_is_rejected_on_second_call() {
        let state = testutil::state().await;
        testutil::create_user(&state.pool, "dana").await;
        let manager = testutil::as_user(1, "boss", &[Role::Manager]);

        let Json(added) = add_manager(
            State(state.clone()),
            manager.clone(),
            Json(MemberPayload {
                username: Some("dana".to_string()),
            }),
        )
        .await
        .unwrap();
        assert_eq!(added.username, "dana");

        let err = add_manager(
            State(state.clone()),
            manager,
            Json(MemberPayload {
                username: Some("dana".to_string()),
            }),
        )
        .await
        .unwrap_err();
        match err {
            AppError::BadRequest(detail) => {
                assert_eq!(detail, "The user is already a manager")
            }
            other => panic!("expected bad request, got {other:?}"),
        }

        let rows = members(&state.pool, Role::Manager).await.unwrap();
        assert_eq!(rows.len(), 1);
    }

    #[tokio::test]
    async fn remove_is_idempotent_for_non_members() {
        let state = testutil::state().await;
        let id = testutil::create_user(&state.pool, "sol").await;
        let manager = testutil::as_user(99, "boss", &[Role::Manager]);

        let status = remove_delivery_crew(State(state.clone()), manager.clone(), Path(id))
            .await
            .unwrap();
        assert_eq!(status, StatusCode::NO_CONTENT);

        let err = remove_delivery_crew(State(state), manager, Path(4242))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn missing_username_is_bad_request() {
        let state = testutil::state().await;
        let manager = testutil::as_user(1, "boss", &[Role::Manager]);

        let err = add_delivery_crew(
            State(state),
            manager,
            Json(MemberPayload { username: None }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::BadRequest(_)));
    }

    #[tokio::test]
    async fn listing_requires_manager() {
        let state = testutil::state().await;
        let crew = testutil::as_user(1, "courier", &[Role::DeliveryCrew]);

        let err = list_managers(State(state), crew).await.unwrap_err();
        assert!(matches!(err, AppError::Forbidden(_)));
    }

    #[tokio::test]
    async fn unknown_user_is_not_found() {
        let state = testutil::state().await;
        let manager = testutil::as_user(1, "boss", &[Role::Manager]);

        let err = add_manager(
            State(state),
            manager,
            Json(MemberPayload {
                username: Some("ghost".to_string()),
            }),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }
}
