use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use rally_types::api::{Claims, PublicKeyResponse, SubscribeRequest};
use rally_types::models::PushSubscription;

use crate::auth::AppState;
use crate::error::{ApiError, blocking};

/// VAPID application server key for `PushManager.subscribe`. Public route.
pub async fn public_key(State(state): State<AppState>) -> impl IntoResponse {
    Json(PublicKeyResponse {
        public_key: state.push_public_key.clone(),
    })
}

pub async fn subscribe(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SubscribeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    if !req.endpoint.starts_with("https://") {
        return Err(ApiError::bad_request("push endpoint must be an https URL"));
    }
    if req.keys.p256dh.is_empty() || req.keys.auth.is_empty() {
        return Err(ApiError::bad_request("subscription keys are missing"));
    }

    let subscription = PushSubscription {
        id: Uuid::new_v4(),
        user_id: claims.sub,
        endpoint: req.endpoint,
        keys: req.keys,
        expiration_time: req.expiration_time,
        created_at: Utc::now(),
    };

    let subscription = blocking(move || {
        state.db.create_subscription(&subscription)?;
        Ok(subscription)
    })
    .await?;

    info!(
        "Push subscription {} registered for {}",
        subscription.id, claims.username
    );
    Ok((StatusCode::CREATED, Json(subscription)))
}

pub async fn list_subscriptions(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let subs = blocking(move || Ok(state.db.get_subscriptions_for_user(claims.sub)?)).await?;
    Ok(Json(subs))
}

/// Only the owner can remove a subscription; anyone else gets a 404.
pub async fn unsubscribe(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(subscription_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(move || {
        if !state.db.delete_subscription(subscription_id, claims.sub)? {
            return Err(ApiError::not_found("subscription"));
        }
        Ok(())
    })
    .await?;
    Ok(StatusCode::NO_CONTENT)
}
