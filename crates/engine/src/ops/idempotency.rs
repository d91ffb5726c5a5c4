//! Idempotency gate shared by the workflows.
//!
//! A workflow first claims its key outside of the business transaction. The
//! claim is finalized as `completed` inside that transaction, so the result
//! becomes visible exactly when the business writes commit. Failures are
//! recorded afterwards on a best-effort basis.

use chrono::{DateTime, Utc};
use sea_orm::ConnectionTrait;
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    EngineError, IdempotencyKey, IdempotencyStatus, IdempotentOperation, ResultEngine,
    idempotency_keys,
};

use super::{Engine, chrono_duration};

/// Ownership of a pending key.
#[derive(Debug)]
pub(super) struct Claim {
    pub key: String,
    pub claim_id: String,
}

#[derive(Debug)]
pub(super) enum Gate {
    /// The key already completed; holds the serialized result.
    Replay(String),
    Claimed(Claim),
}

enum Existing {
    Replay(String),
    Reclaim { claim_id: String },
}

impl Engine {
    /// Claims `key` for `operation` on behalf of `user_id`, or returns the
    /// stored result of an earlier completed run.
    pub(super) async fn claim_idempotency_key(
        &self,
        key: &str,
        operation: IdempotentOperation,
        user_id: i64,
    ) -> ResultEngine<Gate> {
        if key.trim().is_empty() {
            return Err(EngineError::InvalidRequest(
                "idempotency key must not be empty".to_string(),
            ));
        }
        let now = self.clock.now();
        let ttl = chrono_duration(self.config.idempotency_ttl)?;
        let fresh = IdempotencyKey::pending(key, operation, user_id, now, ttl)?;

        let stale_after = chrono_duration(self.config.pending_timeout)?;

        if let Some(existing) = idempotency_keys::find_by_key(&self.database, key).await? {
            return match inspect(existing, operation, user_id, now, stale_after)? {
                Existing::Replay(result) => {
                    tracing::debug!(key, operation = operation.as_str(), "replaying completed request");
                    Ok(Gate::Replay(result))
                }
                Existing::Reclaim { claim_id } => {
                    if idempotency_keys::reclaim(&self.database, &claim_id, &fresh).await? {
                        Ok(Gate::Claimed(Claim {
                            key: fresh.key,
                            claim_id: fresh.claim_id,
                        }))
                    } else {
                        Err(EngineError::OperationInProgress(key.to_string()))
                    }
                }
            };
        }

        match idempotency_keys::create(&self.database, &fresh).await {
            Ok(()) => Ok(Gate::Claimed(Claim {
                key: fresh.key,
                claim_id: fresh.claim_id,
            })),
            Err(EngineError::IdempotencyKeyExists(_)) => {
                tracing::debug!(key, "idempotency key inserted concurrently");
                match idempotency_keys::find_by_key(&self.database, key).await? {
                    Some(winner) => settle_lost_race(winner, operation, user_id, now, stale_after),
                    None => Err(EngineError::OperationInProgress(key.to_string())),
                }
            }
            Err(err) => Err(err),
        }
    }

    /// Stores `result` as the outcome of `claim`. Must run inside the
    /// business transaction.
    pub(super) async fn complete_idempotency_key<C, T>(
        &self,
        db: &C,
        claim: &Claim,
        result: &T,
    ) -> ResultEngine<()>
    where
        C: ConnectionTrait,
        T: Serialize,
    {
        let payload = serde_json::to_string(result)?;
        let now = self.clock.now();
        if idempotency_keys::mark_completed(db, &claim.key, &claim.claim_id, &payload, now).await? {
            Ok(())
        } else {
            Err(EngineError::TransactionFailure(format!(
                "idempotency claim on \"{}\" was taken over",
                claim.key
            )))
        }
    }

    /// Records `err` as the outcome of `claim`. Never fails: errors are only
    /// logged.
    pub(super) async fn fail_idempotency_key(&self, claim: &Claim, err: &EngineError) {
        let now = self.clock.now();
        match idempotency_keys::mark_failed(
            &self.database,
            &claim.key,
            &claim.claim_id,
            &err.to_string(),
            now,
        )
        .await
        {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(key = %claim.key, "idempotency claim lost before recording failure");
            }
            Err(record_err) => {
                tracing::warn!(
                    key = %claim.key,
                    error = %record_err,
                    "failed to record idempotency failure"
                );
            }
        }
    }
}

/// Decides what an existing record means for a new request on its key.
fn inspect(
    existing: IdempotencyKey,
    operation: IdempotentOperation,
    user_id: i64,
    now: DateTime<Utc>,
    stale_after: chrono::Duration,
) -> ResultEngine<Existing> {
    if existing.is_expired(now) {
        return Ok(Existing::Reclaim {
            claim_id: existing.claim_id,
        });
    }
    if existing.operation != operation || existing.user_id != user_id {
        return Err(EngineError::DuplicateRequest(existing.key));
    }
    match existing.status {
        IdempotencyStatus::Completed => Ok(Existing::Replay(completed_result(existing)?)),
        IdempotencyStatus::Failed => Ok(Existing::Reclaim {
            claim_id: existing.claim_id,
        }),
        IdempotencyStatus::Pending => {
            if now - existing.created_at < stale_after {
                return Err(EngineError::OperationInProgress(existing.key));
            }
            tracing::warn!(
                key = %existing.key,
                claimed_at = %existing.created_at,
                "taking over abandoned idempotency claim"
            );
            Ok(Existing::Reclaim {
                claim_id: existing.claim_id,
            })
        }
    }
}

/// Outcome for a caller whose insert lost to a concurrent one. Only a
/// finished, matching winner can answer; anything reclaimable was decided a
/// moment ago and is left to the next attempt.
fn settle_lost_race(
    winner: IdempotencyKey,
    operation: IdempotentOperation,
    user_id: i64,
    now: DateTime<Utc>,
    stale_after: chrono::Duration,
) -> ResultEngine<Gate> {
    let key = winner.key.clone();
    match inspect(winner, operation, user_id, now, stale_after)? {
        Existing::Replay(result) => Ok(Gate::Replay(result)),
        Existing::Reclaim { .. } => Err(EngineError::OperationInProgress(key)),
    }
}

fn completed_result(record: IdempotencyKey) -> ResultEngine<String> {
    record.result.ok_or_else(|| {
        EngineError::Serialization(format!(
            "completed idempotency key \"{}\" has no result",
            record.key
        ))
    })
}

pub(super) fn decode_replay<T: DeserializeOwned>(payload: &str) -> ResultEngine<T> {
    Ok(serde_json::from_str(payload)?)
}
