use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A named group of users sharing to-do lists.
///
/// The password hash is carried for membership checks but never serialized,
/// so a `Channel` can be returned from the API as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Channel {
    pub id: Uuid,
    pub name: String,
    pub members: Vec<Uuid>,
    #[serde(skip)]
    pub password_hash: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Channel {
    /// Whether joining requires a password. An empty stored hash counts as open.
    pub fn is_protected(&self) -> bool {
        self.password_hash.as_deref().is_some_and(|h| !h.is_empty())
    }

    pub fn has_member(&self, user_id: Uuid) -> bool {
        self.members.contains(&user_id)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TodoList {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub owner_id: Uuid,
    pub channel_id: Option<Uuid>,
    pub tasks: Vec<Task>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A single item embedded in a [`TodoList`]. Ids are unique within the parent list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub completed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub updated_by: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionKeys {
    pub p256dh: String,
    pub auth: String,
}

/// A per-device web push registration. A user may hold several.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushSubscription {
    pub id: Uuid,
    pub user_id: Uuid,
    pub endpoint: String,
    pub keys: SubscriptionKeys,
    /// Milliseconds since the Unix epoch, as reported by the browser's PushManager.
    pub expiration_time: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl PushSubscription {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration_time
            .is_some_and(|exp| exp <= now.timestamp_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn channel(password_hash: Option<&str>) -> Channel {
        Channel {
            id: Uuid::new_v4(),
            name: "Team".into(),
            members: vec![],
            password_hash: password_hash.map(str::to_string),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_channel_protection() {
        assert!(!channel(None).is_protected());
        assert!(!channel(Some("")).is_protected());
        assert!(channel(Some("$argon2id$v=19$...")).is_protected());
    }

    #[test]
    fn test_channel_hash_not_serialized() {
        let json = serde_json::to_value(channel(Some("secret-hash"))).unwrap();
        assert!(json.get("password_hash").is_none());
        assert_eq!(json["members"], serde_json::json!([]));
    }

    #[test]
    fn test_subscription_expiry() {
        let now = Utc::now();
        let mut sub = PushSubscription {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            endpoint: "https://push.example.com/abc".into(),
            keys: SubscriptionKeys {
                p256dh: "p".into(),
                auth: "a".into(),
            },
            expiration_time: None,
            created_at: now,
        };
        assert!(!sub.is_expired(now));

        sub.expiration_time = Some(now.timestamp_millis() - 1);
        assert!(sub.is_expired(now));

        sub.expiration_time = Some(now.timestamp_millis() + 60_000);
        assert!(!sub.is_expired(now));
    }
}
