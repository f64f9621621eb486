use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use rally_types::models::{PushSubscription, TodoList};

use crate::aggregate::ErrorList;
use crate::error::{CoreError, CoreResult};
use crate::membership::MembershipManager;
use crate::notify::transport::{DeliveryError, PushTransport};
use crate::store::{ChannelStore, SubscriptionStore};

/// How long a push relay may hold an undelivered message, in seconds.
pub const PUSH_TTL_SECS: u32 = 30;

/// One failure inside a fan-out. The batch keeps going after each of these.
#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to resolve members of channel {channel_id}: {source}")]
    Members {
        channel_id: Uuid,
        #[source]
        source: CoreError,
    },

    #[error("failed to find subscriptions for user {user_id}: {source}")]
    Subscriptions {
        user_id: Uuid,
        #[source]
        source: CoreError,
    },

    #[error("failed to push to subscription {subscription_id} of user {user_id}: {source}")]
    Delivery {
        user_id: Uuid,
        subscription_id: Uuid,
        #[source]
        source: DeliveryError,
    },
}

/// `Ok` carries the number of pushes that went out.
pub type DispatchResult = Result<usize, ErrorList<DispatchError>>;

/// Fans a message out to every push subscription of a channel's members.
///
/// Delivery is best effort: every reachable subscription is attempted, no
/// failure aborts the batch, and nothing is retried.
pub struct Dispatcher<S> {
    membership: MembershipManager<S>,
    store: Arc<S>,
    transport: Arc<dyn PushTransport>,
    ttl: u32,
}

impl<S> Clone for Dispatcher<S> {
    fn clone(&self) -> Self {
        Self {
            membership: self.membership.clone(),
            store: self.store.clone(),
            transport: self.transport.clone(),
            ttl: self.ttl,
        }
    }
}

/// Each recipient paired with the outcome of its subscription lookup.
type Audience = Vec<(Uuid, anyhow::Result<Vec<PushSubscription>>)>;

impl<S: ChannelStore + SubscriptionStore + 'static> Dispatcher<S> {
    pub fn new(
        membership: MembershipManager<S>,
        store: Arc<S>,
        transport: Arc<dyn PushTransport>,
    ) -> Self {
        Self {
            membership,
            store,
            transport,
            ttl: PUSH_TTL_SECS,
        }
    }

    /// Member and subscription lookups run together on the blocking pool;
    /// only the pushes themselves run on the async side.
    pub async fn notify_channel_members(&self, channel_id: Uuid, message: &str) -> DispatchResult {
        let mut failures = ErrorList::new();

        let membership = self.membership.clone();
        let store = self.store.clone();
        let audience = run_blocking(move || {
            let members = membership.resolve_members(channel_id)?;
            Ok(lookup_subscriptions(&*store, members))
        })
        .await;

        let audience = match audience {
            Ok(audience) => audience,
            Err(source) => {
                warn!("Push to channel {} aborted: {}", channel_id, source);
                failures.push(DispatchError::Members { channel_id, source });
                return Err(failures);
            }
        };

        let members = audience.len();
        let delivered = self.deliver(audience, message, &mut failures).await;

        info!(
            "Push to channel {}: {} members, {} delivered, {} failures",
            channel_id,
            members,
            delivered,
            failures.len()
        );
        failures.into_result().map(|()| delivered)
    }

    pub async fn notify_user(&self, user_id: Uuid, message: &str) -> DispatchResult {
        let mut failures = ErrorList::new();

        let store = self.store.clone();
        match run_blocking(move || Ok(lookup_subscriptions(&*store, vec![user_id]))).await {
            Ok(audience) => {
                let delivered = self.deliver(audience, message, &mut failures).await;
                failures.into_result().map(|()| delivered)
            }
            Err(source) => {
                failures.push(DispatchError::Subscriptions { user_id, source });
                Err(failures)
            }
        }
    }

    /// Channel-scoped lists notify the channel; personal lists notify their owner.
    pub async fn notify_list_audience(&self, list: &TodoList, message: &str) -> DispatchResult {
        match list.channel_id {
            Some(channel_id) => self.notify_channel_members(channel_id, message).await,
            None => self.notify_user(list.owner_id, message).await,
        }
    }

    async fn deliver(
        &self,
        audience: Audience,
        message: &str,
        failures: &mut ErrorList<DispatchError>,
    ) -> usize {
        let now = Utc::now();
        let mut delivered = 0;

        for (user_id, subscriptions) in audience {
            let subscriptions = match subscriptions {
                Ok(subs) => subs,
                Err(e) => {
                    warn!("Subscription lookup for {} failed: {}", user_id, e);
                    failures.push(DispatchError::Subscriptions {
                        user_id,
                        source: CoreError::Storage(e),
                    });
                    continue;
                }
            };

            for sub in &subscriptions {
                if sub.is_expired(now) {
                    debug!("Skipping expired subscription {} of {}", sub.id, user_id);
                    continue;
                }

                match self.transport.send(sub, message.as_bytes(), self.ttl).await {
                    Ok(()) => delivered += 1,
                    Err(source) => {
                        warn!(
                            "Push to subscription {} of {} failed: {}",
                            sub.id, user_id, source
                        );
                        failures.push(DispatchError::Delivery {
                            user_id,
                            subscription_id: sub.id,
                            source,
                        });
                    }
                }
            }
        }
        delivered
    }
}

/// One lookup per member. A failed lookup is kept, not propagated.
fn lookup_subscriptions<S: SubscriptionStore>(store: &S, members: Vec<Uuid>) -> Audience {
    members
        .into_iter()
        .map(|user_id| (user_id, store.subscriptions_for(user_id)))
        .collect()
}

async fn run_blocking<T, F>(f: F) -> CoreResult<T>
where
    F: FnOnce() -> CoreResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        CoreError::Storage(anyhow::anyhow!("store lookup did not complete: {}", e))
    })?
}
