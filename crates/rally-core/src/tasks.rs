use std::sync::Arc;

use chrono::Utc;
use tracing::info;
use uuid::Uuid;

use rally_types::api::TaskInput;
use rally_types::models::Task;

use crate::error::{CoreError, CoreResult};
use crate::store::TodoStore;

/// Result of a task update: the state observed before the write and the state written.
#[derive(Debug, Clone)]
pub struct TaskUpdate {
    pub previous: Task,
    pub current: Task,
}

impl TaskUpdate {
    /// Only a flip of the completion flag is worth a push.
    pub fn is_notify_worthy(&self) -> bool {
        self.previous.completed != self.current.completed
    }

    pub fn notification(&self) -> Option<String> {
        self.is_notify_worthy().then(|| {
            format!(
                "Task '{}' has been marked as {}.",
                self.current.title, self.current.completed
            )
        })
    }
}

/// Result of a task deletion. Deletions always notify.
#[derive(Debug, Clone)]
pub struct TaskDeletion {
    pub deleted: Task,
}

impl TaskDeletion {
    pub fn notification(&self) -> String {
        format!("Task '{}' has been deleted.", self.deleted.title)
    }
}

/// Owns create/update/delete of tasks embedded in a to-do list.
///
/// Updates read the prior task and then write the new one without holding a
/// lock in between. Two concurrent updates of the same task can therefore both
/// observe the same prior state; the write itself is a positional replace
/// keyed on (list, task), so a task deleted in the gap is not resurrected.
pub struct TaskCoordinator<S> {
    store: Arc<S>,
}

impl<S> Clone for TaskCoordinator<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
        }
    }
}

impl<S: TodoStore> TaskCoordinator<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    pub fn add_task(&self, list_id: Uuid, input: TaskInput, actor: Uuid) -> CoreResult<Task> {
        let input = validate(input)?;
        let now = Utc::now();
        let task = Task {
            id: Uuid::new_v4(),
            title: input.title,
            description: input.description,
            completed: input.completed,
            created_at: now,
            updated_at: now,
            updated_by: actor,
        };

        if !self.store.push_task(list_id, &task)? {
            return Err(CoreError::NotFound("todo list"));
        }

        info!("Task {} added to list {} by {}", task.id, list_id, actor);
        Ok(task)
    }

    pub fn update_task(
        &self,
        list_id: Uuid,
        task_id: Uuid,
        input: TaskInput,
        actor: Uuid,
    ) -> CoreResult<TaskUpdate> {
        let input = validate(input)?;
        let previous = self.existing_task(list_id, task_id)?;

        let current = Task {
            id: previous.id,
            title: input.title,
            description: input.description,
            completed: input.completed,
            created_at: previous.created_at,
            updated_at: Utc::now(),
            updated_by: actor,
        };

        if !self.store.replace_task(list_id, &current)? {
            return Err(CoreError::NotFound("task"));
        }

        info!("Task {} in list {} updated by {}", task_id, list_id, actor);
        Ok(TaskUpdate { previous, current })
    }

    pub fn delete_task(&self, list_id: Uuid, task_id: Uuid) -> CoreResult<TaskDeletion> {
        let deleted = self.existing_task(list_id, task_id)?;

        if !self.store.pull_task(list_id, task_id)? {
            return Err(CoreError::NotFound("task"));
        }

        info!("Task {} deleted from list {}", task_id, list_id);
        Ok(TaskDeletion { deleted })
    }

    fn existing_task(&self, list_id: Uuid, task_id: Uuid) -> CoreResult<Task> {
        if let Some(task) = self.store.find_task(list_id, task_id)? {
            return Ok(task);
        }
        if self.store.list_exists(list_id)? {
            Err(CoreError::NotFound("task"))
        } else {
            Err(CoreError::NotFound("todo list"))
        }
    }
}

fn validate(mut input: TaskInput) -> CoreResult<TaskInput> {
    input.title = input.title.trim().to_string();
    if input.title.is_empty() {
        return Err(CoreError::validation("task title must not be empty"));
    }
    if input.title.len() > 200 {
        return Err(CoreError::validation("task title is too long"));
    }
    Ok(input)
}
