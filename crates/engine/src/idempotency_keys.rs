//! Idempotency key records.
//!
//! A record is owned by whoever holds its current `claim_id`. Every state
//! change after the initial insert is a conditional update on that token, so
//! a claim that has been taken over can no longer finalize the record.

use chrono::{DateTime, Duration, Utc};
use sea_orm::{ActiveValue, QueryFilter, entity::prelude::*, sea_query::Expr};
use serde::{Deserialize, Serialize};

use crate::{EngineError, ResultEngine, util::is_unique_violation};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdempotencyStatus {
    Pending,
    Completed,
    Failed,
}

impl IdempotencyStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }
}

impl TryFrom<&str> for IdempotencyStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "pending" => Ok(Self::Pending),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            other => Err(EngineError::Serialization(format!(
                "invalid idempotency status: {other}"
            ))),
        }
    }
}

/// Operations guarded by an idempotency key.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum IdempotentOperation {
    #[serde(rename = "purchase_item")]
    Purchase,
    #[serde(rename = "quest_complete")]
    QuestComplete,
}

impl IdempotentOperation {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Purchase => "purchase_item",
            Self::QuestComplete => "quest_complete",
        }
    }
}

impl TryFrom<&str> for IdempotentOperation {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "purchase_item" => Ok(Self::Purchase),
            "quest_complete" => Ok(Self::QuestComplete),
            other => Err(EngineError::Serialization(format!(
                "invalid idempotent operation: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdempotencyKey {
    pub key: String,
    pub operation: IdempotentOperation,
    pub user_id: i64,
    pub status: IdempotencyStatus,
    /// Serialized outcome: the result when completed, the error text when
    /// failed.
    pub result: Option<String>,
    pub claim_id: String,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub expires_at: DateTime<Utc>,
}

impl IdempotencyKey {
    /// A fresh pending claim on `key`, expiring `ttl` after `now`.
    pub fn pending(
        key: &str,
        operation: IdempotentOperation,
        user_id: i64,
        now: DateTime<Utc>,
        ttl: Duration,
    ) -> ResultEngine<Self> {
        let expires_at = now.checked_add_signed(ttl).ok_or_else(|| {
            EngineError::InvalidRequest(format!("idempotency ttl {ttl} is out of range"))
        })?;
        Ok(Self {
            key: key.to_string(),
            operation,
            user_id,
            status: IdempotencyStatus::Pending,
            result: None,
            claim_id: Uuid::new_v4().to_string(),
            created_at: now,
            completed_at: None,
            expires_at,
        })
    }

    /// A key stays live up to and including its expiry instant.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "idempotency_keys")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub key: String,
    pub operation: String,
    pub user_id: i64,
    pub status: String,
    pub result: Option<String>,
    pub claim_id: String,
    pub created_at: DateTimeUtc,
    pub completed_at: Option<DateTimeUtc>,
    pub expires_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&IdempotencyKey> for ActiveModel {
    fn from(record: &IdempotencyKey) -> Self {
        Self {
            key: ActiveValue::Set(record.key.clone()),
            operation: ActiveValue::Set(record.operation.as_str().to_string()),
            user_id: ActiveValue::Set(record.user_id),
            status: ActiveValue::Set(record.status.as_str().to_string()),
            result: ActiveValue::Set(record.result.clone()),
            claim_id: ActiveValue::Set(record.claim_id.clone()),
            created_at: ActiveValue::Set(record.created_at),
            completed_at: ActiveValue::Set(record.completed_at),
            expires_at: ActiveValue::Set(record.expires_at),
        }
    }
}

impl TryFrom<Model> for IdempotencyKey {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            operation: IdempotentOperation::try_from(model.operation.as_str())?,
            status: IdempotencyStatus::try_from(model.status.as_str())?,
            key: model.key,
            user_id: model.user_id,
            result: model.result,
            claim_id: model.claim_id,
            created_at: model.created_at,
            completed_at: model.completed_at,
            expires_at: model.expires_at,
        })
    }
}

/// Inserts a new record. Fails with [`EngineError::IdempotencyKeyExists`]
/// when the key is already present.
pub async fn create<C: ConnectionTrait>(db: &C, record: &IdempotencyKey) -> ResultEngine<()> {
    match ActiveModel::from(record).insert(db).await {
        Ok(_) => Ok(()),
        Err(err) if is_unique_violation(&err) => {
            Err(EngineError::IdempotencyKeyExists(record.key.clone()))
        }
        Err(err) => Err(err.into()),
    }
}

pub async fn find_by_key<C: ConnectionTrait>(
    db: &C,
    key: &str,
) -> ResultEngine<Option<IdempotencyKey>> {
    Entity::find_by_id(key.to_string())
        .one(db)
        .await?
        .map(IdempotencyKey::try_from)
        .transpose()
}

/// Replaces the stored record with `record` if its claim is still
/// `expected_claim_id`. Returns `false` when someone else took it first.
pub async fn reclaim<C: ConnectionTrait>(
    db: &C,
    expected_claim_id: &str,
    record: &IdempotencyKey,
) -> ResultEngine<bool> {
    let mut active = ActiveModel::from(record);
    active.key = ActiveValue::NotSet;

    let res = Entity::update_many()
        .set(active)
        .filter(Column::Key.eq(record.key.clone()))
        .filter(Column::ClaimId.eq(expected_claim_id))
        .exec(db)
        .await?;
    Ok(res.rows_affected == 1)
}

async fn finalize<C: ConnectionTrait>(
    db: &C,
    key: &str,
    claim_id: &str,
    status: IdempotencyStatus,
    result: &str,
    now: DateTime<Utc>,
) -> ResultEngine<bool> {
    let res = Entity::update_many()
        .col_expr(Column::Status, Expr::value(status.as_str()))
        .col_expr(Column::Result, Expr::value(result))
        .col_expr(Column::CompletedAt, Expr::value(now))
        .filter(Column::Key.eq(key))
        .filter(Column::ClaimId.eq(claim_id))
        .filter(Column::Status.eq(IdempotencyStatus::Pending.as_str()))
        .exec(db)
        .await?;
    Ok(res.rows_affected == 1)
}

/// Moves a pending claim to `completed` with its serialized result.
pub async fn mark_completed<C: ConnectionTrait>(
    db: &C,
    key: &str,
    claim_id: &str,
    result: &str,
    now: DateTime<Utc>,
) -> ResultEngine<bool> {
    finalize(db, key, claim_id, IdempotencyStatus::Completed, result, now).await
}

/// Moves a pending claim to `failed`, keeping the error text.
pub async fn mark_failed<C: ConnectionTrait>(
    db: &C,
    key: &str,
    claim_id: &str,
    error: &str,
    now: DateTime<Utc>,
) -> ResultEngine<bool> {
    finalize(db, key, claim_id, IdempotencyStatus::Failed, error, now).await
}

/// Deletes records whose expiry instant is strictly before `now`.
pub async fn delete_expired<C: ConnectionTrait>(db: &C, now: DateTime<Utc>) -> ResultEngine<u64> {
    let res = Entity::delete_many()
        .filter(Column::ExpiresAt.lt(now))
        .exec(db)
        .await?;
    Ok(res.rows_affected)
}

pub async fn purge_created_before<C: ConnectionTrait>(
    db: &C,
    cutoff: DateTime<Utc>,
) -> ResultEngine<u64> {
    let res = Entity::delete_many()
        .filter(Column::CreatedAt.lt(cutoff))
        .exec(db)
        .await?;
    Ok(res.rows_affected)
}
