//! Ledger of quest completions, used to enforce daily point caps.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, QueryFilter, entity::prelude::*};
use serde::{Deserialize, Serialize};

use crate::{Decimal, EngineError, ResultEngine};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuestCompletion {
    pub id: Uuid,
    pub quest_id: String,
    pub user_id: i64,
    pub submitted_at: DateTime<Utc>,
    pub completion_ratio: Option<Decimal>,
    pub minutes: Option<i64>,
    pub awarded_points: Decimal,
    pub idempotency_key: String,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "quest_completions")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub quest_id: String,
    pub user_id: i64,
    pub submitted_at: DateTimeUtc,
    pub completion_ratio: Option<String>,
    pub minutes: Option<i64>,
    pub awarded_points: String,
    pub idempotency_key: String,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::quests::Entity",
        from = "Column::QuestId",
        to = "super::quests::Column::Id",
        on_update = "NoAction",
        on_delete = "Cascade"
    )]
    Quests,
}

impl Related<super::quests::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Quests.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&QuestCompletion> for ActiveModel {
    fn from(completion: &QuestCompletion) -> Self {
        Self {
            id: ActiveValue::Set(completion.id.to_string()),
            quest_id: ActiveValue::Set(completion.quest_id.clone()),
            user_id: ActiveValue::Set(completion.user_id),
            submitted_at: ActiveValue::Set(completion.submitted_at),
            completion_ratio: ActiveValue::Set(completion.completion_ratio.map(|r| r.to_string())),
            minutes: ActiveValue::Set(completion.minutes),
            awarded_points: ActiveValue::Set(completion.awarded_points.to_string()),
            idempotency_key: ActiveValue::Set(completion.idempotency_key.clone()),
        }
    }
}

impl TryFrom<Model> for QuestCompletion {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&model.id).map_err(|err| {
                EngineError::Serialization(format!("invalid completion id {}: {err}", model.id))
            })?,
            quest_id: model.quest_id,
            user_id: model.user_id,
            submitted_at: model.submitted_at,
            completion_ratio: model.completion_ratio.as_deref().map(Decimal::parse).transpose()?,
            minutes: model.minutes,
            awarded_points: Decimal::parse(&model.awarded_points)?,
            idempotency_key: model.idempotency_key,
        })
    }
}

pub async fn create<C: ConnectionTrait>(db: &C, completion: &QuestCompletion) -> ResultEngine<()> {
    ActiveModel::from(completion).insert(db).await?;
    Ok(())
}

/// Points awarded to `user_id` for `quest_id` in `[start, end)`.
pub async fn sum_awarded_between<C: ConnectionTrait>(
    db: &C,
    quest_id: &str,
    user_id: i64,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
) -> ResultEngine<Decimal> {
    let rows = Entity::find()
        .filter(Column::QuestId.eq(quest_id))
        .filter(Column::UserId.eq(user_id))
        .filter(Column::SubmittedAt.gte(start))
        .filter(Column::SubmittedAt.lt(end))
        .all(db)
        .await?;

    rows.iter().try_fold(Decimal::ZERO, |acc, row| {
        acc.checked_add(Decimal::parse(&row.awarded_points)?)
    })
}
