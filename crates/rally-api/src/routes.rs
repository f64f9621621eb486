use axum::{
    Router, middleware,
    routing::{delete, get, post, put},
};

use crate::auth::{self, AppState};
use crate::middleware::require_auth;
use crate::{channels, subscriptions, todolists, users};

/// All REST routes. CORS and request tracing are layered on by the binary.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/users", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/push/public-key", get(subscriptions::public_key))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route(
            "/users/{user_id}",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
        .route("/users/{user_id}/channels", get(users::get_user_channels))
        .route("/users/{user_id}/todolists", get(users::get_user_todolists))
        .route("/channels", post(channels::create_channel))
        .route(
            "/channels/{channel_id}",
            get(channels::get_channel)
                .put(channels::update_channel)
                .delete(channels::delete_channel),
        )
        .route("/channels/{channel_id}/join", post(channels::join_channel))
        .route(
            "/channels/{channel_id}/leave",
            post(channels::leave_channel),
        )
        .route(
            "/channels/{channel_id}/members",
            get(channels::get_channel_members),
        )
        .route(
            "/channels/{channel_id}/todolists",
            get(channels::get_channel_todolists),
        )
        .route("/todolists", post(todolists::create_todolist))
        .route(
            "/todolists/{list_id}",
            get(todolists::get_todolist)
                .put(todolists::update_todolist)
                .delete(todolists::delete_todolist),
        )
        .route("/todolists/{list_id}/tasks", post(todolists::add_task))
        .route(
            "/todolists/{list_id}/tasks/{task_id}",
            put(todolists::update_task).delete(todolists::delete_task),
        )
        .route(
            "/subscriptions",
            post(subscriptions::subscribe).get(subscriptions::list_subscriptions),
        )
        .route(
            "/subscriptions/{subscription_id}",
            delete(subscriptions::unsubscribe),
        )
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state);

    Router::new().merge(public_routes).merge(protected_routes)
}
