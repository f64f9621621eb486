use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use rally_core::credentials::Credentials;
use rally_core::membership::MembershipManager;
use rally_core::notify::{Dispatcher, PushTransport};
use rally_core::tasks::TaskCoordinator;
use rally_core::tokens::Tokens;
use rally_db::Database;
use rally_types::api::{LoginRequest, LoginResponse, RegisterRequest, RegisterResponse};

use crate::error::{ApiError, blocking};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub credentials: Credentials,
    pub tokens: Tokens,
    pub membership: MembershipManager<Database>,
    pub tasks: TaskCoordinator<Database>,
    pub dispatcher: Dispatcher<Database>,
    pub push_public_key: String,
}

impl AppStateInner {
    pub fn new(
        db: Arc<Database>,
        credentials: Credentials,
        tokens: Tokens,
        transport: Arc<dyn PushTransport>,
        push_public_key: String,
    ) -> Self {
        let membership = MembershipManager::new(db.clone(), credentials.clone());
        Self {
            tasks: TaskCoordinator::new(db.clone()),
            dispatcher: Dispatcher::new(membership.clone(), db.clone(), transport),
            membership,
            db,
            credentials,
            tokens,
            push_public_key,
        }
    }
}

pub(crate) fn validate_username(username: &str) -> Result<(), ApiError> {
    if username.len() < 3 || username.len() > 32 {
        return Err(ApiError::bad_request("username must be 3 to 32 characters"));
    }
    Ok(())
}

pub(crate) fn validate_email(email: &str) -> Result<(), ApiError> {
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(ApiError::bad_request("email address is malformed")),
    }
}

pub(crate) fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.len() < 8 {
        return Err(ApiError::bad_request(
            "password must be at least 8 characters",
        ));
    }
    Ok(())
}

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let username = req.username.trim().to_string();
    let email = req.email.trim().to_lowercase();
    validate_username(&username)?;
    validate_email(&email)?;
    validate_password(&req.password)?;

    let st = state.clone();
    let name = username.clone();
    let user_id = blocking(move || {
        if st.db.user_conflicts(&name, &email, None)? {
            return Err(ApiError::conflict("username or email already taken"));
        }

        let password_hash = st.credentials.hash(&req.password)?;
        let user_id = Uuid::new_v4();
        st.db
            .create_user(user_id, &name, &email, &password_hash, Utc::now())?;
        Ok(user_id)
    })
    .await?;

    let token = state.tokens.issue(user_id, &username)?;
    info!("Registered user {} ({})", username, user_id);

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse { user_id, token }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let st = state.clone();
    let user = blocking(move || {
        // Same answer and same Argon2 cost for an unknown user and a wrong password
        let Some(user) = st.db.get_user_by_identifier(req.identifier.trim())? else {
            st.credentials.reject(&req.password);
            return Err(ApiError::unauthorized());
        };

        if !st.credentials.verify(&req.password, &user.password) {
            return Err(ApiError::unauthorized());
        }
        Ok(user.into_model()?)
    })
    .await?;

    let token = state.tokens.issue(user.id, &user.username)?;

    Ok(Json(LoginResponse {
        user_id: user.id,
        username: user.username,
        token,
    }))
}
