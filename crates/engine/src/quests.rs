//! Quests: recurring or one-off work that awards points when completed.

use chrono::{DateTime, Duration, FixedOffset, Utc};
use sea_orm::{ActiveValue, QueryFilter, QueryOrder, entity::prelude::*};
use serde::{Deserialize, Serialize};

use crate::{Decimal, EngineError, NewQuest, QuestUpdate, ResultEngine, util::resolve_timezone};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestCategory {
    Daily,
    Weekly,
    Adhoc,
}

impl QuestCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Daily => "daily",
            Self::Weekly => "weekly",
            Self::Adhoc => "adhoc",
        }
    }

    /// Distance between two occurrences; `None` for one-off quests.
    pub fn period(self) -> Option<Duration> {
        match self {
            Self::Daily => Some(Duration::days(1)),
            Self::Weekly => Some(Duration::weeks(1)),
            Self::Adhoc => None,
        }
    }

    pub fn is_recurring(self) -> bool {
        self.period().is_some()
    }
}

impl TryFrom<&str> for QuestCategory {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "daily" => Ok(Self::Daily),
            "weekly" => Ok(Self::Weekly),
            "adhoc" => Ok(Self::Adhoc),
            other => Err(EngineError::InvalidQuest(format!(
                "invalid quest category: {other}"
            ))),
        }
    }
}

/// How a completion is scored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestMode {
    /// Full `points_award` on every completion.
    Binary,
    /// `points_award` scaled by a completion ratio in `[0, 1]`.
    Partial,
    /// `rate_per_minute` times the clamped number of minutes.
    PerMinute,
}

impl QuestMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Binary => "BINARY",
            Self::Partial => "PARTIAL",
            Self::PerMinute => "PER_MINUTE",
        }
    }
}

impl TryFrom<&str> for QuestMode {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "BINARY" => Ok(Self::Binary),
            "PARTIAL" => Ok(Self::Partial),
            "PER_MINUTE" => Ok(Self::PerMinute),
            other => Err(EngineError::InvalidQuest(format!(
                "invalid quest mode: {other}"
            ))),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuestStatus {
    Active,
    Paused,
    Archived,
}

impl QuestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Archived => "archived",
        }
    }
}

impl TryFrom<&str> for QuestStatus {
    type Error = EngineError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value {
            "active" => Ok(Self::Active),
            "paused" => Ok(Self::Paused),
            "archived" => Ok(Self::Archived),
            other => Err(EngineError::InvalidQuest(format!(
                "invalid quest status: {other}"
            ))),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quest {
    pub id: String,
    pub chat_id: i64,
    pub title: String,
    pub category: QuestCategory,
    pub mode: QuestMode,
    pub points_award: Decimal,
    pub rate_per_minute: Option<Decimal>,
    pub min_minutes: Option<i64>,
    pub max_minutes: Option<i64>,
    /// Upper bound of points awarded per quest-local calendar day.
    pub daily_points_cap: Option<Decimal>,
    pub cooldown_sec: i64,
    pub streak_enabled: bool,
    pub status: QuestStatus,
    /// Last completion instant, with the offset of the quest timezone at
    /// that moment.
    pub last_completed_at: Option<DateTime<FixedOffset>>,
    pub streak_count: i64,
    /// IANA zone name; empty means UTC.
    pub timezone: String,
    /// Bumped on every write; stale writers are rejected.
    pub revision: i64,
    pub created_at: DateTime<Utc>,
}

impl Quest {
    /// Validates `new` and builds an active quest with a fresh id.
    pub fn new(new: NewQuest, created_at: DateTime<Utc>) -> ResultEngine<Self> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(EngineError::InvalidQuest(
                "title must not be empty".to_string(),
            ));
        }
        if new.points_award.is_negative() {
            return Err(EngineError::InvalidQuest(
                "points_award must not be negative".to_string(),
            ));
        }
        validate_cooldown(new.cooldown_sec)?;
        if new.daily_points_cap.is_some_and(|cap| cap.is_negative()) {
            return Err(EngineError::InvalidQuest(
                "daily_points_cap must not be negative".to_string(),
            ));
        }
        if new.mode == QuestMode::PerMinute {
            match new.rate_per_minute {
                None => {
                    return Err(EngineError::InvalidQuest(
                        "rate_per_minute is required for PER_MINUTE quests".to_string(),
                    ));
                }
                Some(rate) if rate.is_negative() => {
                    return Err(EngineError::InvalidQuest(
                        "rate_per_minute must not be negative".to_string(),
                    ));
                }
                Some(_) => {}
            }
        }
        if new.min_minutes.is_some_and(|m| m < 0) || new.max_minutes.is_some_and(|m| m < 0) {
            return Err(EngineError::InvalidQuest(
                "minute bounds must not be negative".to_string(),
            ));
        }
        if let (Some(min), Some(max)) = (new.min_minutes, new.max_minutes)
            && min > max
        {
            return Err(EngineError::InvalidQuest(format!(
                "min_minutes {min} is greater than max_minutes {max}"
            )));
        }
        resolve_timezone(&new.timezone)?;

        Ok(Self {
            id: Uuid::new_v4().to_string(),
            chat_id: new.chat_id,
            title: title.to_string(),
            category: new.category,
            mode: new.mode,
            points_award: new.points_award,
            rate_per_minute: new.rate_per_minute,
            min_minutes: new.min_minutes,
            max_minutes: new.max_minutes,
            daily_points_cap: new.daily_points_cap,
            cooldown_sec: new.cooldown_sec,
            streak_enabled: new.streak_enabled,
            status: QuestStatus::Active,
            last_completed_at: None,
            streak_count: 0,
            timezone: new.timezone.trim().to_string(),
            revision: 0,
            created_at,
        })
    }

    /// Applies `update` in place, with the same checks as [`Quest::new`].
    /// Nothing changes when a check fails.
    pub fn apply(&mut self, update: QuestUpdate) -> ResultEngine<()> {
        let title = match update.title.as_deref().map(str::trim) {
            Some("") => {
                return Err(EngineError::InvalidQuest(
                    "title must not be empty".to_string(),
                ));
            }
            Some(title) => title.to_string(),
            None => self.title.clone(),
        };
        let points_award = update.points_award.unwrap_or(self.points_award);
        if points_award.is_negative() {
            return Err(EngineError::InvalidQuest(
                "points_award must not be negative".to_string(),
            ));
        }
        let daily_points_cap = update.daily_points_cap.unwrap_or(self.daily_points_cap);
        if daily_points_cap.is_some_and(|cap| cap.is_negative()) {
            return Err(EngineError::InvalidQuest(
                "daily_points_cap must not be negative".to_string(),
            ));
        }
        let cooldown_sec = update.cooldown_sec.unwrap_or(self.cooldown_sec);
        validate_cooldown(cooldown_sec)?;
        let timezone = match update.timezone {
            Some(timezone) => {
                resolve_timezone(&timezone)?;
                timezone.trim().to_string()
            }
            None => self.timezone.clone(),
        };

        self.title = title;
        self.points_award = points_award;
        self.daily_points_cap = daily_points_cap;
        self.cooldown_sec = cooldown_sec;
        self.timezone = timezone;
        if let Some(status) = update.status {
            self.status = status;
        }
        if let Some(enabled) = update.streak_enabled {
            self.streak_enabled = enabled;
        }
        Ok(())
    }

    /// Points earned by one completion, before the daily cap.
    pub fn score(&self, completion_ratio: Option<Decimal>, minutes: Option<i64>) -> ResultEngine<Decimal> {
        match self.mode {
            QuestMode::Binary => Ok(self.points_award),
            QuestMode::Partial => {
                let ratio = completion_ratio.ok_or_else(|| {
                    EngineError::InvalidCompletionRatio("missing".to_string())
                })?;
                if ratio.is_negative() || ratio > Decimal::ONE {
                    return Err(EngineError::InvalidCompletionRatio(ratio.to_string()));
                }
                self.points_award.checked_mul(ratio)
            }
            QuestMode::PerMinute => {
                let minutes = minutes.ok_or_else(|| {
                    EngineError::InvalidRequest(
                        "minutes are required for PER_MINUTE quests".to_string(),
                    )
                })?;
                if minutes < 0 {
                    return Err(EngineError::InvalidRequest(format!(
                        "minutes must not be negative, got {minutes}"
                    )));
                }
                let rate = self.rate_per_minute.ok_or_else(|| {
                    EngineError::InvalidQuest(format!(
                        "quest {} has no rate_per_minute",
                        self.id
                    ))
                })?;
                rate.checked_mul(Decimal::from(self.clamp_minutes(minutes)))
            }
        }
    }

    fn clamp_minutes(&self, minutes: i64) -> i64 {
        let floor = minutes.max(self.min_minutes.unwrap_or(0));
        match self.max_minutes {
            Some(max) => floor.min(max),
            None => floor,
        }
    }

    /// Seconds left before the quest can be completed again at `now`.
    pub fn cooldown_remaining(&self, now: DateTime<Utc>) -> ResultEngine<Option<i64>> {
        if self.cooldown_sec <= 0 {
            return Ok(None);
        }
        let Some(last) = self.last_completed_at else {
            return Ok(None);
        };
        let ready_at = Duration::try_seconds(self.cooldown_sec)
            .and_then(|cooldown| last.with_timezone(&Utc).checked_add_signed(cooldown))
            .ok_or_else(|| {
                EngineError::InvalidQuest(format!(
                    "quest {} has an out of range cooldown of {}s",
                    self.id, self.cooldown_sec
                ))
            })?;
        Ok((now < ready_at).then(|| (ready_at - now).num_seconds().max(1)))
    }
}

fn validate_cooldown(cooldown_sec: i64) -> ResultEngine<()> {
    if cooldown_sec < 0 {
        return Err(EngineError::InvalidQuest(
            "cooldown_sec must not be negative".to_string(),
        ));
    }
    if Duration::try_seconds(cooldown_sec).is_none() {
        return Err(EngineError::InvalidQuest(format!(
            "cooldown_sec {cooldown_sec} is out of range"
        )));
    }
    Ok(())
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "quests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: String,
    pub chat_id: i64,
    pub title: String,
    pub category: String,
    pub mode: String,
    pub points_award: String,
    pub rate_per_minute: Option<String>,
    pub min_minutes: Option<i64>,
    pub max_minutes: Option<i64>,
    pub daily_points_cap: Option<String>,
    pub cooldown_sec: i64,
    pub streak_enabled: bool,
    pub status: String,
    pub last_completed_at: Option<String>,
    pub streak_count: i64,
    pub timezone: String,
    pub revision: i64,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::quest_completions::Entity")]
    QuestCompletions,
}

impl Related<super::quest_completions::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::QuestCompletions.def()
    }
}

impl ActiveModelBehavior for ActiveModel {}

impl From<&Quest> for ActiveModel {
    fn from(quest: &Quest) -> Self {
        Self {
            id: ActiveValue::Set(quest.id.clone()),
            chat_id: ActiveValue::Set(quest.chat_id),
            title: ActiveValue::Set(quest.title.clone()),
            category: ActiveValue::Set(quest.category.as_str().to_string()),
            mode: ActiveValue::Set(quest.mode.as_str().to_string()),
            points_award: ActiveValue::Set(quest.points_award.to_string()),
            rate_per_minute: ActiveValue::Set(quest.rate_per_minute.map(|r| r.to_string())),
            min_minutes: ActiveValue::Set(quest.min_minutes),
            max_minutes: ActiveValue::Set(quest.max_minutes),
            daily_points_cap: ActiveValue::Set(quest.daily_points_cap.map(|c| c.to_string())),
            cooldown_sec: ActiveValue::Set(quest.cooldown_sec),
            streak_enabled: ActiveValue::Set(quest.streak_enabled),
            status: ActiveValue::Set(quest.status.as_str().to_string()),
            last_completed_at: ActiveValue::Set(quest.last_completed_at.map(|at| at.to_rfc3339())),
            streak_count: ActiveValue::Set(quest.streak_count),
            timezone: ActiveValue::Set(quest.timezone.clone()),
            revision: ActiveValue::Set(quest.revision),
            created_at: ActiveValue::Set(quest.created_at),
        }
    }
}

impl TryFrom<Model> for Quest {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        let last_completed_at = model
            .last_completed_at
            .as_deref()
            .map(DateTime::parse_from_rfc3339)
            .transpose()
            .map_err(|err| {
                EngineError::InvalidQuest(format!(
                    "quest {} has a malformed last_completed_at: {err}",
                    model.id
                ))
            })?;

        Ok(Self {
            category: QuestCategory::try_from(model.category.as_str())?,
            mode: QuestMode::try_from(model.mode.as_str())?,
            points_award: Decimal::parse(&model.points_award)?,
            rate_per_minute: model.rate_per_minute.as_deref().map(Decimal::parse).transpose()?,
            daily_points_cap: model.daily_points_cap.as_deref().map(Decimal::parse).transpose()?,
            status: QuestStatus::try_from(model.status.as_str())?,
            last_completed_at,
            id: model.id,
            chat_id: model.chat_id,
            title: model.title,
            min_minutes: model.min_minutes,
            max_minutes: model.max_minutes,
            cooldown_sec: model.cooldown_sec,
            streak_enabled: model.streak_enabled,
            streak_count: model.streak_count,
            timezone: model.timezone,
            revision: model.revision,
            created_at: model.created_at,
        })
    }
}

pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: &str) -> ResultEngine<Option<Quest>> {
    Entity::find_by_id(id.to_string())
        .one(db)
        .await?
        .map(Quest::try_from)
        .transpose()
}

pub async fn create<C: ConnectionTrait>(db: &C, quest: &Quest) -> ResultEngine<()> {
    ActiveModel::from(quest).insert(db).await?;
    Ok(())
}

/// Every quest of `chat_id`, oldest first.
pub async fn list_for_chat<C: ConnectionTrait>(db: &C, chat_id: i64) -> ResultEngine<Vec<Quest>> {
    Entity::find()
        .filter(Column::ChatId.eq(chat_id))
        .order_by_asc(Column::CreatedAt)
        .order_by_asc(Column::Id)
        .all(db)
        .await?
        .into_iter()
        .map(Quest::try_from)
        .collect()
}

/// Writes `quest` if the stored revision still equals `quest.revision`, and
/// bumps the stored revision. Returns `false` when another writer got there
/// first.
pub async fn update<C: ConnectionTrait>(db: &C, quest: &Quest) -> ResultEngine<bool> {
    let mut active = ActiveModel::from(quest);
    active.id = ActiveValue::NotSet;
    active.created_at = ActiveValue::NotSet;
    active.revision = ActiveValue::Set(quest.revision + 1);

    let res = Entity::update_many()
        .set(active)
        .filter(Column::Id.eq(quest.id.clone()))
        .filter(Column::Revision.eq(quest.revision))
        .exec(db)
        .await?;
    Ok(res.rows_affected == 1)
}
