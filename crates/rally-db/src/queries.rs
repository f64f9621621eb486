use crate::Database;
use crate::models::{
    ChannelRow, ChannelUpdate, SubscriptionRow, TaskRow, TodoListRow, TodoListUpdate, UserRow,
    UserUpdate, format_timestamp, parse_id,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::Connection;
use rusqlite::types::Value;
use uuid::Uuid;

use rally_types::models::{Channel, PushSubscription, Task, TodoList, User};

impl Database {
    // -- Users --

    pub fn create_user(
        &self,
        id: Uuid,
        username: &str,
        email: &str,
        password_hash: &str,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let ts = format_timestamp(now);
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, email, password, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
                rusqlite::params![id.to_string(), username, email, password_hash, ts],
            )?;
            Ok(())
        })
    }

    /// True if another user already holds `username` or `email`.
    pub fn user_conflicts(
        &self,
        username: &str,
        email: &str,
        except: Option<Uuid>,
    ) -> Result<bool> {
        let except = except.map(|id| id.to_string()).unwrap_or_default();
        self.with_conn(|conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM users WHERE (username = ?1 OR email = ?2) AND id != ?3",
                rusqlite::params![username, email, except],
                |row| row.get(0),
            )?;
            Ok(count > 0)
        })
    }

    /// Looks a user up by username or email.
    pub fn get_user_by_identifier(&self, identifier: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| {
            query_user(
                conn,
                "WHERE username = ?1 OR email = ?1 LIMIT 1",
                &[&identifier as &dyn rusqlite::types::ToSql],
            )
        })
    }

    pub fn get_user(&self, id: Uuid) -> Result<Option<User>> {
        let id = id.to_string();
        self.with_conn(|conn| {
            query_user(conn, "WHERE id = ?1", &[&id as &dyn rusqlite::types::ToSql])?
                .map(UserRow::into_model)
                .transpose()
        })
    }

    pub fn update_user(&self, id: Uuid, update: &UserUpdate, now: DateTime<Utc>) -> Result<bool> {
        let mut sets = Vec::new();
        if let Some(username) = &update.username {
            sets.push(("username", Value::Text(username.clone())));
        }
        if let Some(email) = &update.email {
            sets.push(("email", Value::Text(email.clone())));
        }
        if let Some(hash) = &update.password_hash {
            sets.push(("password", Value::Text(hash.clone())));
        }
        self.with_conn(|conn| update_fields(conn, "users", id, sets, now))
    }

    /// Removes the user and the push subscriptions they own. Channel
    /// memberships and lists are left alone.
    pub fn delete_user(&self, id: Uuid) -> Result<bool> {
        let id = id.to_string();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM push_subscriptions WHERE user_id = ?1", [&id])?;
            let deleted = tx.execute("DELETE FROM users WHERE id = ?1", [&id])?;
            tx.commit()?;
            Ok(deleted > 0)
        })
    }

    // -- Channels --

    /// Inserts the channel with its creator as the first member.
    pub fn create_channel(
        &self,
        id: Uuid,
        name: &str,
        password_hash: Option<&str>,
        creator: Uuid,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let id = id.to_string();
        let ts = format_timestamp(now);
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "INSERT INTO channels (id, name, password, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
                rusqlite::params![id, name, password_hash, ts],
            )?;
            tx.execute(
                "INSERT INTO channel_members (channel_id, user_id, joined_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![id, creator.to_string(), ts],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_channel(&self, id: Uuid) -> Result<Option<Channel>> {
        let id = id.to_string();
        self.with_conn(|conn| {
            let Some(row) = query_channel_row(conn, &id)? else {
                return Ok(None);
            };
            let members = query_members(conn, &id)?;
            Ok(Some(row.into_model(members)?))
        })
    }

    /// Every channel whose membership set contains `user_id`.
    pub fn get_channels_for_member(&self, user_id: Uuid) -> Result<Vec<Channel>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT c.id, c.name, c.password, c.created_at, c.updated_at
                 FROM channels c
                 JOIN channel_members m ON m.channel_id = c.id
                 WHERE m.user_id = ?1
                 ORDER BY c.created_at",
            )?;
            let rows = stmt
                .query_map([user_id.to_string()], map_channel_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|row| {
                    let members = query_members(conn, &row.id)?;
                    row.into_model(members)
                })
                .collect()
        })
    }

    pub fn update_channel(
        &self,
        id: Uuid,
        update: &ChannelUpdate,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut sets = Vec::new();
        if let Some(name) = &update.name {
            sets.push(("name", Value::Text(name.clone())));
        }
        if let Some(password) = &update.password_hash {
            let value = match password {
                Some(hash) => Value::Text(hash.clone()),
                None => Value::Null,
            };
            sets.push(("password", value));
        }
        self.with_conn(|conn| update_fields(conn, "channels", id, sets, now))
    }

    pub fn delete_channel(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM channels WHERE id = ?1", [id.to_string()])?;
            Ok(deleted > 0)
        })
    }

    /// Add-to-set on the membership field. Returns false if the channel does
    /// not exist; an existing member is left untouched.
    pub fn add_channel_member(
        &self,
        channel_id: Uuid,
        user_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let channel_id = channel_id.to_string();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if !channel_exists(&tx, &channel_id)? {
                return Ok(false);
            }
            tx.execute(
                "INSERT OR IGNORE INTO channel_members (channel_id, user_id, joined_at)
                 VALUES (?1, ?2, ?3)",
                rusqlite::params![channel_id, user_id.to_string(), format_timestamp(now)],
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    /// Pull from the membership field. Returns false if the channel does not exist.
    pub fn remove_channel_member(&self, channel_id: Uuid, user_id: Uuid) -> Result<bool> {
        let channel_id = channel_id.to_string();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            if !channel_exists(&tx, &channel_id)? {
                return Ok(false);
            }
            tx.execute(
                "DELETE FROM channel_members WHERE channel_id = ?1 AND user_id = ?2",
                rusqlite::params![channel_id, user_id.to_string()],
            )?;
            tx.commit()?;
            Ok(true)
        })
    }

    /// `None` if the channel does not exist, otherwise the (possibly empty) membership set.
    pub fn get_channel_members(&self, channel_id: Uuid) -> Result<Option<Vec<Uuid>>> {
        let channel_id = channel_id.to_string();
        self.with_conn(|conn| {
            if !channel_exists(conn, &channel_id)? {
                return Ok(None);
            }
            Ok(Some(query_members(conn, &channel_id)?))
        })
    }

    // -- Todo lists --

    pub fn create_todo_list(&self, list: &TodoList) -> Result<()> {
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let list_id = list.id.to_string();
            tx.execute(
                "INSERT INTO todo_lists (id, title, description, owner_id, channel_id, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    list_id,
                    list.title,
                    list.description,
                    list.owner_id.to_string(),
                    list.channel_id.map(|c| c.to_string()),
                    format_timestamp(list.created_at),
                    format_timestamp(list.updated_at),
                ],
            )?;
            for task in &list.tasks {
                insert_task(&tx, &list_id, task)?;
            }
            tx.commit()?;
            Ok(())
        })
    }

    pub fn get_todo_list(&self, id: Uuid) -> Result<Option<TodoList>> {
        self.with_conn(|conn| {
            let lists = query_todo_lists(conn, "WHERE id = ?1", &id.to_string())?;
            Ok(lists.into_iter().next())
        })
    }

    pub fn todo_list_exists(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let exists: bool = conn.query_row(
                "SELECT EXISTS(SELECT 1 FROM todo_lists WHERE id = ?1)",
                [id.to_string()],
                |row| row.get(0),
            )?;
            Ok(exists)
        })
    }

    pub fn get_todo_lists_by_owner(&self, owner_id: Uuid) -> Result<Vec<TodoList>> {
        self.with_conn(|conn| query_todo_lists(conn, "WHERE owner_id = ?1", &owner_id.to_string()))
    }

    pub fn get_todo_lists_by_channel(&self, channel_id: Uuid) -> Result<Vec<TodoList>> {
        self.with_conn(|conn| {
            query_todo_lists(conn, "WHERE channel_id = ?1", &channel_id.to_string())
        })
    }

    pub fn update_todo_list(
        &self,
        id: Uuid,
        update: &TodoListUpdate,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let mut sets = Vec::new();
        if let Some(title) = &update.title {
            sets.push(("title", Value::Text(title.clone())));
        }
        if let Some(description) = &update.description {
            sets.push((
                "description",
                description.clone().map_or(Value::Null, Value::Text),
            ));
        }
        if let Some(channel_id) = &update.channel_id {
            sets.push((
                "channel_id",
                channel_id.map_or(Value::Null, |c| Value::Text(c.to_string())),
            ));
        }
        self.with_conn(|conn| update_fields(conn, "todo_lists", id, sets, now))
    }

    pub fn delete_todo_list(&self, id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute("DELETE FROM todo_lists WHERE id = ?1", [id.to_string()])?;
            Ok(deleted > 0)
        })
    }

    // -- Tasks --

    /// Appends a task to the list. Returns false if the list does not exist.
    pub fn push_task(&self, list_id: Uuid, task: &Task) -> Result<bool> {
        let list_id = list_id.to_string();
        self.with_conn_mut(|conn| {
            let tx = conn.transaction()?;
            let touched = tx.execute(
                "UPDATE todo_lists SET updated_at = ?2 WHERE id = ?1",
                rusqlite::params![list_id, format_timestamp(task.updated_at)],
            )?;
            if touched == 0 {
                return Ok(false);
            }
            insert_task(&tx, &list_id, task)?;
            tx.commit()?;
            Ok(true)
        })
    }

    pub fn get_task(&self, list_id: Uuid, task_id: Uuid) -> Result<Option<Task>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, title, description, completed, created_at, updated_at, updated_by
                 FROM tasks WHERE list_id = ?1 AND id = ?2",
            )?;
            let row = stmt
                .query_row(
                    rusqlite::params![list_id.to_string(), task_id.to_string()],
                    map_task_row,
                )
                .optional()?;
            row.map(TaskRow::into_model).transpose()
        })
    }

    /// Positional replace of one embedded task. Returns false if the list or task is gone.
    pub fn replace_task(&self, list_id: Uuid, task: &Task) -> Result<bool> {
        self.with_conn(|conn| {
            let updated = conn.execute(
                "UPDATE tasks
                 SET title = ?3, description = ?4, completed = ?5, updated_at = ?6, updated_by = ?7
                 WHERE list_id = ?1 AND id = ?2",
                rusqlite::params![
                    list_id.to_string(),
                    task.id.to_string(),
                    task.title,
                    task.description,
                    task.completed,
                    format_timestamp(task.updated_at),
                    task.updated_by.to_string(),
                ],
            )?;
            Ok(updated > 0)
        })
    }

    /// Pulls one embedded task. Returns false if the list or task is gone.
    pub fn pull_task(&self, list_id: Uuid, task_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM tasks WHERE list_id = ?1 AND id = ?2",
                rusqlite::params![list_id.to_string(), task_id.to_string()],
            )?;
            Ok(deleted > 0)
        })
    }

    // -- Push subscriptions --

    pub fn create_subscription(&self, sub: &PushSubscription) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO push_subscriptions (id, user_id, endpoint, p256dh, auth, expiration_time, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    sub.id.to_string(),
                    sub.user_id.to_string(),
                    sub.endpoint,
                    sub.keys.p256dh,
                    sub.keys.auth,
                    sub.expiration_time,
                    format_timestamp(sub.created_at),
                ],
            )?;
            Ok(())
        })
    }

    pub fn get_subscriptions_for_user(&self, user_id: Uuid) -> Result<Vec<PushSubscription>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, user_id, endpoint, p256dh, auth, expiration_time, created_at
                 FROM push_subscriptions WHERE user_id = ?1
                 ORDER BY created_at",
            )?;
            let rows = stmt
                .query_map([user_id.to_string()], |row| {
                    Ok(SubscriptionRow {
                        id: row.get(0)?,
                        user_id: row.get(1)?,
                        endpoint: row.get(2)?,
                        p256dh: row.get(3)?,
                        auth: row.get(4)?,
                        expiration_time: row.get(5)?,
                        created_at: row.get(6)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter().map(SubscriptionRow::into_model).collect()
        })
    }

    /// Deletes a subscription only if it belongs to `user_id`.
    pub fn delete_subscription(&self, id: Uuid, user_id: Uuid) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM push_subscriptions WHERE id = ?1 AND user_id = ?2",
                rusqlite::params![id.to_string(), user_id.to_string()],
            )?;
            Ok(deleted > 0)
        })
    }
}

fn query_user(
    conn: &Connection,
    clause: &str,
    params: &[&dyn rusqlite::types::ToSql],
) -> Result<Option<UserRow>> {
    let sql = format!(
        "SELECT id, username, email, password, created_at, updated_at FROM users {}",
        clause
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row(params, |row| {
            Ok(UserRow {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
                password: row.get(3)?,
                created_at: row.get(4)?,
                updated_at: row.get(5)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn channel_exists(conn: &Connection, channel_id: &str) -> Result<bool> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM channels WHERE id = ?1)",
        [channel_id],
        |row| row.get(0),
    )?;
    Ok(exists)
}

fn map_channel_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChannelRow> {
    Ok(ChannelRow {
        id: row.get(0)?,
        name: row.get(1)?,
        password: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
    })
}

fn query_channel_row(conn: &Connection, id: &str) -> Result<Option<ChannelRow>> {
    let mut stmt = conn
        .prepare("SELECT id, name, password, created_at, updated_at FROM channels WHERE id = ?1")?;
    stmt.query_row([id], map_channel_row).optional()
}

fn query_members(conn: &Connection, channel_id: &str) -> Result<Vec<Uuid>> {
    let mut stmt = conn.prepare(
        "SELECT user_id FROM channel_members WHERE channel_id = ?1 ORDER BY joined_at, rowid",
    )?;
    let ids = stmt
        .query_map([channel_id], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    ids.iter().map(|id| parse_id(id)).collect()
}

fn query_todo_lists(conn: &Connection, clause: &str, param: &str) -> Result<Vec<TodoList>> {
    let sql = format!(
        "SELECT id, title, description, owner_id, channel_id, created_at, updated_at
         FROM todo_lists {} ORDER BY created_at",
        clause
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt
        .query_map([param], |row| {
            Ok(TodoListRow {
                id: row.get(0)?,
                title: row.get(1)?,
                description: row.get(2)?,
                owner_id: row.get(3)?,
                channel_id: row.get(4)?,
                created_at: row.get(5)?,
                updated_at: row.get(6)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter()
        .map(|row| {
            let tasks = query_tasks(conn, &row.id)?;
            row.into_model(tasks)
        })
        .collect()
}

fn map_task_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskRow> {
    Ok(TaskRow {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        completed: row.get(3)?,
        created_at: row.get(4)?,
        updated_at: row.get(5)?,
        updated_by: row.get(6)?,
    })
}

fn query_tasks(conn: &Connection, list_id: &str) -> Result<Vec<Task>> {
    let mut stmt = conn.prepare(
        "SELECT id, title, description, completed, created_at, updated_at, updated_by
         FROM tasks WHERE list_id = ?1 ORDER BY position",
    )?;
    let rows = stmt
        .query_map([list_id], map_task_row)?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    rows.into_iter().map(TaskRow::into_model).collect()
}

fn insert_task(conn: &Connection, list_id: &str, task: &Task) -> Result<()> {
    conn.execute(
        "INSERT INTO tasks (list_id, id, position, title, description, completed, created_at, updated_at, updated_by)
         VALUES (?1, ?2, (SELECT COALESCE(MAX(position), -1) + 1 FROM tasks WHERE list_id = ?1),
                 ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
            list_id,
            task.id.to_string(),
            task.title,
            task.description,
            task.completed,
            format_timestamp(task.created_at),
            format_timestamp(task.updated_at),
            task.updated_by.to_string(),
        ],
    )?;
    Ok(())
}

/// Applies a field-scoped `UPDATE`, always bumping `updated_at`.
/// Returns false if no row has `id`.
fn update_fields(
    conn: &Connection,
    table: &str,
    id: Uuid,
    mut sets: Vec<(&'static str, Value)>,
    now: DateTime<Utc>,
) -> Result<bool> {
    sets.push(("updated_at", Value::Text(format_timestamp(now))));

    let assignments: Vec<String> = sets
        .iter()
        .enumerate()
        .map(|(i, (column, _))| format!("{} = ?{}", column, i + 1))
        .collect();
    let sql = format!(
        "UPDATE {} SET {} WHERE id = ?{}",
        table,
        assignments.join(", "),
        sets.len() + 1
    );

    let mut values: Vec<Value> = sets.into_iter().map(|(_, v)| v).collect();
    values.push(Value::Text(id.to_string()));

    let updated = conn.execute(&sql, rusqlite::params_from_iter(values))?;
    Ok(updated > 0)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
