use chrono::{DateTime, Utc};

use crate::{ResultEngine, idempotency_keys};

use super::Engine;

impl Engine {
    /// Deletes idempotency keys whose TTL has passed. Returns how many were
    /// removed.
    pub async fn purge_expired_idempotency_keys(&self) -> ResultEngine<u64> {
        let removed = idempotency_keys::delete_expired(&self.database, self.clock.now()).await?;
        if removed > 0 {
            tracing::info!(removed, "expired idempotency keys purged");
        }
        Ok(removed)
    }

    /// Deletes idempotency keys claimed before `cutoff`, expired or not.
    pub async fn purge_idempotency_keys_created_before(
        &self,
        cutoff: DateTime<Utc>,
    ) -> ResultEngine<u64> {
        let removed = idempotency_keys::purge_created_before(&self.database, cutoff).await?;
        tracing::info!(removed, %cutoff, "idempotency keys purged");
        Ok(removed)
    }
}
