use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use rally_db::models::UserUpdate;
use rally_types::api::{Claims, UserPatch};

use crate::auth::{AppState, validate_email, validate_password, validate_username};
use crate::error::{ApiError, blocking};
use crate::todolists::can_access;

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let user = blocking(move || {
        state
            .db
            .get_user(user_id)?
            .ok_or_else(|| ApiError::not_found("user"))
    })
    .await?;
    Ok(Json(user))
}

/// Users may only edit themselves. A new password is re-hashed before it is stored.
pub async fn update_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
    Json(patch): Json<UserPatch>,
) -> Result<impl IntoResponse, ApiError> {
    if claims.sub != user_id {
        return Err(ApiError::forbidden());
    }

    let username = patch.username.map(|u| u.trim().to_string());
    let email = patch.email.map(|e| e.trim().to_lowercase());
    if let Some(username) = &username {
        validate_username(username)?;
    }
    if let Some(email) = &email {
        validate_email(email)?;
    }
    if let Some(password) = &patch.password {
        validate_password(password)?;
    }

    let user = blocking(move || {
        let conflict = state.db.user_conflicts(
            username.as_deref().unwrap_or_default(),
            email.as_deref().unwrap_or_default(),
            Some(user_id),
        )?;
        if conflict {
            return Err(ApiError::conflict("username or email already taken"));
        }

        let password_hash = match patch.password {
            Some(password) => Some(state.credentials.hash(&password)?),
            None => None,
        };
        let update = UserUpdate {
            username,
            email,
            password_hash,
        };
        if update.is_empty() {
            return Err(ApiError::bad_request("nothing to update"));
        }

        if !state.db.update_user(user_id, &update, Utc::now())? {
            return Err(ApiError::not_found("user"));
        }
        state
            .db
            .get_user(user_id)?
            .ok_or_else(|| ApiError::not_found("user"))
    })
    .await?;

    info!("User {} updated their profile", user_id);
    Ok(Json(user))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    if claims.sub != user_id {
        return Err(ApiError::forbidden());
    }

    blocking(move || {
        if !state.db.delete_user(user_id)? {
            return Err(ApiError::not_found("user"));
        }
        Ok(())
    })
    .await?;

    info!("User {} deleted", user_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn get_user_channels(
    State(state): State<AppState>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let channels = blocking(move || Ok(state.db.get_channels_for_member(user_id)?)).await?;
    Ok(Json(channels))
}

/// Lists owned by `user_id`, narrowed to the ones the caller may see.
/// Another user's personal lists are never included.
pub async fn get_user_todolists(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(user_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let lists = blocking(move || {
        let mut visible = Vec::new();
        for list in state.db.get_todo_lists_by_owner(user_id)? {
            if can_access(&state, &list, claims.sub)? {
                visible.push(list);
            }
        }
        Ok(visible)
    })
    .await?;
    Ok(Json(lists))
}
