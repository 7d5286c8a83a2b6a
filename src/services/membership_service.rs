use async_trait::async_trait;
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::db::MembershipChecker;
use crate::error::StoreError;

/// Remembers positive membership answers for a short while, so repeated
/// joins and chats do not hit the database every time.
pub struct CachedMembership {
    inner: Arc<dyn MembershipChecker>,
    cache: Cache<(String, String), ()>,
}

impl CachedMembership {
    pub fn new(inner: Arc<dyn MembershipChecker>, ttl: Duration) -> Self {
        Self {
            inner,
            cache: Cache::builder()
                .max_capacity(100_000)
                .time_to_live(ttl)
                .build(),
        }
    }
}

#[async_trait]
impl MembershipChecker for CachedMembership {
    async fn is_member(&self, user_id: &str, room_id: &str) -> Result<bool, StoreError> {
        let key = (user_id.to_string(), room_id.to_string());
        if self.cache.contains_key(&key) {
            return Ok(true);
        }

        debug!("Membership cache miss for user {} in room {}", user_id, room_id);
        let member = self.inner.is_member(user_id, room_id).await?;
        if member {
            self.cache.insert(key, ()).await;
        }
        Ok(member)
    }

    async fn forget(&self, user_id: &str, room_id: &str) {
        self.cache
            .invalidate(&(user_id.to_string(), room_id.to_string()))
            .await;
        self.inner.forget(user_id, room_id).await;
    }
}
