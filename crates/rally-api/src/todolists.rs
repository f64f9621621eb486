use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use chrono::Utc;
use tracing::{info, warn};
use uuid::Uuid;

use rally_db::models::TodoListUpdate;
use rally_types::api::{Claims, CreateTodoListRequest, TaskInput, TodoListPatch};
use rally_types::models::TodoList;

use crate::auth::AppState;
use crate::error::{ApiError, blocking};

fn validate_title(title: &str) -> Result<String, ApiError> {
    let title = title.trim();
    if title.is_empty() || title.len() > 200 {
        return Err(ApiError::bad_request(
            "list title must be 1 to 200 characters",
        ));
    }
    Ok(title.to_string())
}

/// The owner and the members of the list's channel may touch a list.
pub(crate) fn can_access(
    state: &AppState,
    list: &TodoList,
    user_id: Uuid,
) -> Result<bool, ApiError> {
    if list.owner_id == user_id {
        return Ok(true);
    }
    match list.channel_id {
        Some(channel_id) => {
            let members = state
                .db
                .get_channel_members(channel_id)?
                .unwrap_or_default();
            Ok(members.contains(&user_id))
        }
        None => Ok(false),
    }
}

fn load_accessible_list(
    state: &AppState,
    list_id: Uuid,
    user_id: Uuid,
) -> Result<TodoList, ApiError> {
    let list = state
        .db
        .get_todo_list(list_id)?
        .ok_or_else(|| ApiError::not_found("todo list"))?;

    if !can_access(state, &list, user_id)? {
        return Err(ApiError::forbidden());
    }
    Ok(list)
}

/// Pushes `message` to the list's audience. Failures are logged, never returned.
async fn notify_audience(state: &AppState, list: &TodoList, message: &str) {
    match state.dispatcher.notify_list_audience(list, message).await {
        Ok(delivered) => info!("Notified {} devices about list {}", delivered, list.id),
        Err(failures) => warn!("Notification for list {} incomplete: {}", list.id, failures),
    }
}

pub async fn create_todolist(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CreateTodoListRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let title = validate_title(&req.title)?;

    let list = blocking(move || {
        if let Some(channel_id) = req.channel_id {
            let channel = state
                .db
                .get_channel(channel_id)?
                .ok_or_else(|| ApiError::not_found("channel"))?;
            if !channel.has_member(claims.sub) {
                return Err(ApiError::forbidden());
            }
        }

        let now = Utc::now();
        let list = TodoList {
            id: Uuid::new_v4(),
            title,
            description: req.description,
            owner_id: claims.sub,
            channel_id: req.channel_id,
            tasks: Vec::new(),
            created_at: now,
            updated_at: now,
        };
        state.db.create_todo_list(&list)?;
        Ok(list)
    })
    .await?;

    info!("Todo list {} created by {}", list.id, list.owner_id);
    Ok((StatusCode::CREATED, Json(list)))
}

pub async fn get_todolist(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(list_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let list = blocking(move || load_accessible_list(&state, list_id, claims.sub)).await?;
    Ok(Json(list))
}

pub async fn update_todolist(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(list_id): Path<Uuid>,
    Json(patch): Json<TodoListPatch>,
) -> Result<impl IntoResponse, ApiError> {
    let title = patch.title.as_deref().map(validate_title).transpose()?;

    let list = blocking(move || {
        load_accessible_list(&state, list_id, claims.sub)?;

        // Moving a list into a channel requires being in that channel
        if let Some(Some(channel_id)) = patch.channel_id {
            let channel = state
                .db
                .get_channel(channel_id)?
                .ok_or_else(|| ApiError::not_found("channel"))?;
            if !channel.has_member(claims.sub) {
                return Err(ApiError::forbidden());
            }
        }

        let update = TodoListUpdate {
            title,
            description: patch.description,
            channel_id: patch.channel_id,
        };
        if !state.db.update_todo_list(list_id, &update, Utc::now())? {
            return Err(ApiError::not_found("todo list"));
        }
        state
            .db
            .get_todo_list(list_id)?
            .ok_or_else(|| ApiError::not_found("todo list"))
    })
    .await?;

    Ok(Json(list))
}

pub async fn delete_todolist(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(list_id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    blocking(move || {
        let list = load_accessible_list(&state, list_id, claims.sub)?;
        if list.owner_id != claims.sub {
            return Err(ApiError::forbidden());
        }
        state.db.delete_todo_list(list_id)?;
        Ok(())
    })
    .await?;

    info!("Todo list {} deleted", list_id);
    Ok(StatusCode::NO_CONTENT)
}

pub async fn add_task(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(list_id): Path<Uuid>,
    Json(input): Json<TaskInput>,
) -> Result<impl IntoResponse, ApiError> {
    let task = blocking(move || {
        load_accessible_list(&state, list_id, claims.sub)?;
        Ok(state.tasks.add_task(list_id, input, claims.sub)?)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(task)))
}

/// Full replacement of one task. Flipping `completed` notifies the list's audience.
pub async fn update_task(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((list_id, task_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<TaskInput>,
) -> Result<impl IntoResponse, ApiError> {
    let st = state.clone();
    let (list, update) = blocking(move || {
        let list = load_accessible_list(&st, list_id, claims.sub)?;
        let update = st.tasks.update_task(list_id, task_id, input, claims.sub)?;
        Ok((list, update))
    })
    .await?;

    if let Some(message) = update.notification() {
        notify_audience(&state, &list, &message).await;
    }

    Ok(Json(update.current))
}

/// Deletes one task and notifies the list's audience. Returns the removed task.
pub async fn delete_task(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path((list_id, task_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ApiError> {
    let st = state.clone();
    let (list, deletion) = blocking(move || {
        let list = load_accessible_list(&st, list_id, claims.sub)?;
        let deletion = st.tasks.delete_task(list_id, task_id)?;
        Ok((list, deletion))
    })
    .await?;

    notify_audience(&state, &list, &deletion.notification()).await;

    Ok(Json(deletion.deleted))
}
