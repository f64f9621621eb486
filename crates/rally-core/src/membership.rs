use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::credentials::Credentials;
use crate::error::{CoreError, CoreResult};
use crate::store::ChannelStore;

/// Owns mutation of a channel's membership set.
pub struct MembershipManager<S> {
    store: Arc<S>,
    credentials: Credentials,
}

impl<S> Clone for MembershipManager<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            credentials: self.credentials.clone(),
        }
    }
}

impl<S: ChannelStore> MembershipManager<S> {
    pub fn new(store: Arc<S>, credentials: Credentials) -> Self {
        Self { store, credentials }
    }

    /// Adds `user_id` to the channel, checking the password first if the
    /// channel has one. Joining twice is a no-op.
    ///
    /// Nothing is written unless verification passes. The add itself is a
    /// single add-to-set, so a concurrent reader sees the user either absent
    /// or present, never half-joined.
    pub fn join(&self, channel_id: Uuid, user_id: Uuid, password: &str) -> CoreResult<()> {
        let channel = self
            .store
            .find_channel(channel_id)?
            .ok_or(CoreError::NotFound("channel"))?;

        if let Some(hash) = channel.password_hash.as_deref() {
            if !self.credentials.verify(password, hash) {
                warn!(
                    "Rejected join of {} to channel {}: bad password",
                    user_id, channel_id
                );
                return Err(CoreError::Unauthorized);
            }
        }

        if channel.has_member(user_id) {
            debug!("{} already in channel {}", user_id, channel_id);
            return Ok(());
        }

        // The channel can vanish between the read and the add
        if !self.store.add_member(channel_id, user_id)? {
            return Err(CoreError::NotFound("channel"));
        }

        info!("{} joined channel {}", user_id, channel_id);
        Ok(())
    }

    /// Removes `user_id` from the channel. Leaving a channel you are not in is a no-op.
    pub fn leave(&self, channel_id: Uuid, user_id: Uuid) -> CoreResult<()> {
        if !self.store.remove_member(channel_id, user_id)? {
            return Err(CoreError::NotFound("channel"));
        }
        info!("{} left channel {}", user_id, channel_id);
        Ok(())
    }

    pub fn resolve_members(&self, channel_id: Uuid) -> CoreResult<Vec<Uuid>> {
        self.store
            .members(channel_id)?
            .ok_or(CoreError::NotFound("channel"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use argon2::Params;
    use chrono::Utc;
    use rally_db::Database;

    fn setup(password: Option<&str>) -> (MembershipManager<Database>, Uuid) {
        let creds = Credentials::with_params(Params::new(1024, 1, 1, None).unwrap());
        let db = Database::open_in_memory().unwrap();
        let channel_id = Uuid::new_v4();
        let hash = password.map(|p| creds.hash(p).unwrap());
        db.create_channel(
            channel_id,
            "Team",
            hash.as_deref(),
            Uuid::new_v4(),
            Utc::now(),
        )
        .unwrap();
        // Start from an empty membership set
        let owner = db.get_channel_members(channel_id).unwrap().unwrap()[0];
        db.remove_channel_member(channel_id, owner).unwrap();

        (MembershipManager::new(Arc::new(db), creds), channel_id)
    }

    #[test]
    fn test_wrong_password_leaves_membership_unchanged() {
        let (mgr, channel_id) = setup(Some("s3cret"));
        let user = Uuid::new_v4();

        let err = mgr.join(channel_id, user, "guess").unwrap_err();
        assert!(matches!(err, CoreError::Unauthorized));
        assert!(mgr.resolve_members(channel_id).unwrap().is_empty());
    }

    #[test]
    fn test_join_is_idempotent() {
        let (mgr, channel_id) = setup(Some("s3cret"));
        let user = Uuid::new_v4();

        mgr.join(channel_id, user, "s3cret").unwrap();
        mgr.join(channel_id, user, "s3cret").unwrap();
        assert_eq!(mgr.resolve_members(channel_id).unwrap(), vec![user]);
    }

    #[test]
    fn test_open_channel_accepts_any_password() {
        let (mgr, channel_id) = setup(None);
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        mgr.join(channel_id, a, "").unwrap();
        mgr.join(channel_id, b, "whatever").unwrap();
        assert_eq!(mgr.resolve_members(channel_id).unwrap(), vec![a, b]);
    }

    #[test]
    fn test_blank_stored_hash_is_an_open_channel() {
        let creds = Credentials::with_params(Params::new(1024, 1, 1, None).unwrap());
        let db = Arc::new(Database::open_in_memory().unwrap());
        let channel_id = Uuid::new_v4();
        db.create_channel(channel_id, "Legacy", Some(""), Uuid::new_v4(), Utc::now())
            .unwrap();
        let mgr = MembershipManager::new(db, creds);

        let user = Uuid::new_v4();
        mgr.join(channel_id, user, "anything").unwrap();
        assert!(mgr.resolve_members(channel_id).unwrap().contains(&user));
    }

    #[test]
    fn test_missing_channel() {
        let (mgr, _) = setup(None);
        let missing = Uuid::new_v4();
        let user = Uuid::new_v4();

        assert!(matches!(
            mgr.join(missing, user, ""),
            Err(CoreError::NotFound(_))
        ));
        assert!(matches!(
            mgr.leave(missing, user),
            Err(CoreError::NotFound(_))
        ));
        assert!(matches!(
            mgr.resolve_members(missing),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn test_leave_non_member_is_noop() {
        let (mgr, channel_id) = setup(None);
        let member = Uuid::new_v4();
        mgr.join(channel_id, member, "").unwrap();

        mgr.leave(channel_id, Uuid::new_v4()).unwrap();
        assert_eq!(mgr.resolve_members(channel_id).unwrap(), vec![member]);
    }

    #[test]
    fn test_last_member_leaving_empties_the_set() {
        let (mgr, channel_id) = setup(None);
        let user = Uuid::new_v4();
        mgr.join(channel_id, user, "").unwrap();

        mgr.leave(channel_id, user).unwrap();
        assert_eq!(mgr.resolve_members(channel_id).unwrap(), Vec::<Uuid>::new());
    }
}
