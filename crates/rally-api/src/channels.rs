use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use rally_db::models::ChannelUpdate;
use rally_types::api::{
    ChannelPatch, Claims, CreateChannelRequest, JoinChannelRequest, MembersResponse,
};

use crate::auth::AppState;
use crate::error::{ApiError, blocking};

fn validate_name(name: &str) -> Result<String, ApiError> {
    let name = name.trim();
    if name.is_empty() || name.len() > 64 {
        return Err(ApiError::bad_request(
            "channel name must be 1 to 64 characters",
        ));
    }
    Ok(name.to_string())
}

/// Creates a channel with the caller as its only member. An empty password
/// means no gate.
pub async fn create_channel(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateChannelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = validate_name(&req.name)?;
    let password = req.password.filter(|p| !p.is_empty());
    let creator = claims.sub;

    let channel = blocking(move || {
        let password_hash = password.map(|p| state.credentials.hash(&p)).transpose()?;

        let channel_id = Uuid::new_v4();
        state.db.create_channel(
            channel_id,
            &name,
            password_hash.as_deref(),
            creator,
            Utc::now(),
        )?;
        state
            .db
            .get_channel(channel_id)?
            .ok_or_else(|| ApiError::not_found("channel"))
    })
    .await?;

    info!("Channel {} created by {}", channel.id, claims.username);
    Ok((StatusCode::CREATED, Json(channel)))
}

pub async fn get_channel(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let channel = blocking(move || {
        state
            .db
            .get_channel(channel_id)?
            .ok_or_else(|| ApiError::not_found("channel"))
    })
    .await?;
    Ok(Json(channel))
}

/// Members only. Sending `"password": null` or `""` removes the gate.
pub async fn update_channel(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(channel_id): Path<Uuid>,
    Json(patch): Json<ChannelPatch>,
) -> Result<impl IntoResponse, ApiError> {
    let name = patch.name.as_deref().map(validate_name).transpose()?;

    let channel = blocking(move || {
        let channel = state
            .db
            .get_channel(channel_id)?
            .ok_or_else(|| ApiError::not_found("channel"))?;
        if !channel.has_member(claims.sub) {
            return Err(ApiError::forbidden());
        }

        let password_hash = match patch.password {
            None => None,
            Some(None) => Some(None),
            Some(Some(p)) if p.is_empty() => Some(None),
            Some(Some(p)) => Some(Some(state.credentials.hash(&p)?)),
        };
        let update = ChannelUpdate {
            name,
            password_hash,
        };

        if !state.db.update_channel(channel_id, &update, Utc::now())? {
            return Err(ApiError::not_found("channel"));
        }
        state
            .db
            .get_channel(channel_id)?
            .ok_or_else(|| ApiError::not_found("channel"))
    })
    .await?;

    Ok(Json(channel))
}

pub async fn delete_channel(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(channel_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(move || {
        let channel = state
            .db
            .get_channel(channel_id)?
            .ok_or_else(|| ApiError::not_found("channel"))?;
        if !channel.has_member(claims.sub) {
            return Err(ApiError::forbidden());
        }
        state.db.delete_channel(channel_id)?;
        Ok(())
    })
    .await?;

    info!("Channel {} deleted", channel_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Joins the caller to the channel. Open channels accept `{}` as the body.
pub async fn join_channel(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(channel_id): Path<Uuid>,
    Json(req): Json<JoinChannelRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Argon2 verification runs here too, so keep it off the runtime
    let members = blocking(move || {
        state
            .membership
            .join(channel_id, claims.sub, &req.password)?;
        Ok(state.membership.resolve_members(channel_id)?)
    })
    .await?;

    Ok(Json(MembersResponse {
        channel_id,
        members,
    }))
}

pub async fn leave_channel(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(channel_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let members = blocking(move || {
        state.membership.leave(channel_id, claims.sub)?;
        Ok(state.membership.resolve_members(channel_id)?)
    })
    .await?;

    Ok(Json(MembersResponse {
        channel_id,
        members,
    }))
}

pub async fn get_channel_members(
    State(state): State<AppState>,
    Path(channel_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let members = blocking(move || Ok(state.membership.resolve_members(channel_id)?)).await?;
    Ok(Json(MembersResponse {
        channel_id,
        members,
    }))
}

/// Members only, so a password gate also gates the channel's lists.
pub async fn get_channel_todolists(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(channel_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let lists = blocking(move || {
        let channel = state
            .db
            .get_channel(channel_id)?
            .ok_or_else(|| ApiError::not_found("channel"))?;
        if !channel.has_member(claims.sub) {
            return Err(ApiError::forbidden());
        }
        Ok(state.db.get_todo_lists_by_channel(channel_id)?)
    })
    .await?;
    Ok(Json(lists))
}
