//! Database row types. These map directly to SQLite rows and are kept apart
//! from the rally-types models so the DB layer owns its own representation.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use uuid::Uuid;

use rally_types::models::{Channel, PushSubscription, SubscriptionKeys, Task, TodoList, User};

pub struct UserRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password: String,
    pub created_at: String,
    pub updated_at: String,
}

pub struct ChannelRow {
    pub id: String,
    pub name: String,
    pub password: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct TodoListRow {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub owner_id: String,
    pub channel_id: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

pub struct TaskRow {
    pub id: String,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub created_at: String,
    pub updated_at: String,
    pub updated_by: String,
}

pub struct SubscriptionRow {
    pub id: String,
    pub user_id: String,
    pub endpoint: String,
    pub p256dh: String,
    pub auth: String,
    pub expiration_time: Option<i64>,
    pub created_at: String,
}

/// Field-scoped user update. The password arrives already hashed.
#[derive(Debug, Default)]
pub struct UserUpdate {
    pub username: Option<String>,
    pub email: Option<String>,
    pub password_hash: Option<String>,
}

impl UserUpdate {
    pub fn is_empty(&self) -> bool {
        self.username.is_none() && self.email.is_none() && self.password_hash.is_none()
    }
}

/// Field-scoped channel update. `password_hash: Some(None)` clears the gate.
#[derive(Debug, Default)]
pub struct ChannelUpdate {
    pub name: Option<String>,
    pub password_hash: Option<Option<String>>,
}

#[derive(Debug, Default)]
pub struct TodoListUpdate {
    pub title: Option<String>,
    pub description: Option<Option<String>>,
    pub channel_id: Option<Option<Uuid>>,
}

impl UserRow {
    pub fn into_model(self) -> Result<User> {
        Ok(User {
            id: parse_id(&self.id)?,
            username: self.username,
            email: self.email,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

impl ChannelRow {
    pub fn into_model(self, members: Vec<Uuid>) -> Result<Channel> {
        Ok(Channel {
            id: parse_id(&self.id)?,
            name: self.name,
            members,
            password_hash: self.password.filter(|p| !p.is_empty()),
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

impl TodoListRow {
    pub fn into_model(self, tasks: Vec<Task>) -> Result<TodoList> {
        Ok(TodoList {
            id: parse_id(&self.id)?,
            title: self.title,
            description: self.description,
            owner_id: parse_id(&self.owner_id)?,
            channel_id: self.channel_id.as_deref().map(parse_id).transpose()?,
            tasks,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
        })
    }
}

impl TaskRow {
    pub fn into_model(self) -> Result<Task> {
        Ok(Task {
            id: parse_id(&self.id)?,
            title: self.title,
            description: self.description,
            completed: self.completed,
            created_at: parse_timestamp(&self.created_at)?,
            updated_at: parse_timestamp(&self.updated_at)?,
            updated_by: parse_id(&self.updated_by)?,
        })
    }
}

impl SubscriptionRow {
    pub fn into_model(self) -> Result<PushSubscription> {
        Ok(PushSubscription {
            id: parse_id(&self.id)?,
            user_id: parse_id(&self.user_id)?,
            endpoint: self.endpoint,
            keys: SubscriptionKeys {
                p256dh: self.p256dh,
                auth: self.auth,
            },
            expiration_time: self.expiration_time,
            created_at: parse_timestamp(&self.created_at)?,
        })
    }
}

pub fn parse_id(raw: &str) -> Result<Uuid> {
    raw.parse::<Uuid>()
        .with_context(|| format!("corrupt id '{}'", raw))
}

/// Rows are written as RFC 3339. SQLite's own `datetime('now')` format is
/// accepted too, for rows touched by hand.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .with_context(|| format!("corrupt timestamp '{}'", raw))
}

/// Fixed-width so that text ordering in SQL matches time ordering.
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}
