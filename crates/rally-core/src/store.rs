//! Persistence seams the core builds on.
//!
//! The traits expose only the field-scoped operations the coordinators need
//! (add-to-set, pull, positional replace). [`Database`] is the production
//! implementation; tests wrap it to inject failures.

use anyhow::Result;
use chrono::Utc;
use uuid::Uuid;

use rally_db::Database;
use rally_types::models::{Channel, PushSubscription, Task};

pub trait ChannelStore: Send + Sync {
    fn find_channel(&self, channel_id: Uuid) -> Result<Option<Channel>>;

    /// Returns false if the channel does not exist.
    fn add_member(&self, channel_id: Uuid, user_id: Uuid) -> Result<bool>;

    /// Returns false if the channel does not exist.
    fn remove_member(&self, channel_id: Uuid, user_id: Uuid) -> Result<bool>;

    /// `None` if the channel does not exist.
    fn members(&self, channel_id: Uuid) -> Result<Option<Vec<Uuid>>>;
}

pub trait TodoStore: Send + Sync {
    fn list_exists(&self, list_id: Uuid) -> Result<bool>;

    fn find_task(&self, list_id: Uuid, task_id: Uuid) -> Result<Option<Task>>;

    /// Returns false if the list does not exist.
    fn push_task(&self, list_id: Uuid, task: &Task) -> Result<bool>;

    /// Returns false if the list or task does not exist.
    fn replace_task(&self, list_id: Uuid, task: &Task) -> Result<bool>;

    /// Returns false if the list or task does not exist.
    fn pull_task(&self, list_id: Uuid, task_id: Uuid) -> Result<bool>;
}

pub trait SubscriptionStore: Send + Sync {
    fn subscriptions_for(&self, user_id: Uuid) -> Result<Vec<PushSubscription>>;
}

impl ChannelStore for Database {
    fn find_channel(&self, channel_id: Uuid) -> Result<Option<Channel>> {
        self.get_channel(channel_id)
    }

    fn add_member(&self, channel_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.add_channel_member(channel_id, user_id, Utc::now())
    }

    fn remove_member(&self, channel_id: Uuid, user_id: Uuid) -> Result<bool> {
        self.remove_channel_member(channel_id, user_id)
    }

    fn members(&self, channel_id: Uuid) -> Result<Option<Vec<Uuid>>> {
        self.get_channel_members(channel_id)
    }
}

impl TodoStore for Database {
    fn list_exists(&self, list_id: Uuid) -> Result<bool> {
        self.todo_list_exists(list_id)
    }

    fn find_task(&self, list_id: Uuid, task_id: Uuid) -> Result<Option<Task>> {
        self.get_task(list_id, task_id)
    }

    fn push_task(&self, list_id: Uuid, task: &Task) -> Result<bool> {
        Database::push_task(self, list_id, task)
    }

    fn replace_task(&self, list_id: Uuid, task: &Task) -> Result<bool> {
        Database::replace_task(self, list_id, task)
    }

    fn pull_task(&self, list_id: Uuid, task_id: Uuid) -> Result<bool> {
        Database::pull_task(self, list_id, task_id)
    }
}

impl SubscriptionStore for Database {
    fn subscriptions_for(&self, user_id: Uuid) -> Result<Vec<PushSubscription>> {
        self.get_subscriptions_for_user(user_id)
    }
}
