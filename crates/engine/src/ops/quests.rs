use chrono::{DateTime, FixedOffset};
use sea_orm::ConnectionTrait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    CompleteQuestCmd, Decimal, EngineError, IdempotentOperation, NewQuest, NotFound, Quest,
    QuestCompletion, QuestStatus, QuestUpdate, ResultEngine, quest_completions, quests, users,
    util::{local_day_bounds, normalize_required_text, resolve_timezone},
};

use super::{
    Engine,
    idempotency::{Gate, decode_replay},
    with_deadline,
};

/// Outcome of a quest completion.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Completion {
    pub completion_id: Uuid,
    pub quest_id: String,
    pub user_id: i64,
    /// Points credited, after the daily cap.
    pub awarded_points: Decimal,
    /// User balance right after the credit.
    pub balance: Decimal,
    pub streak_count: i64,
    /// Completion instant in the quest timezone.
    pub completed_at: DateTime<FixedOffset>,
}

impl Engine {
    /// Completes a quest for `cmd.user_id` and credits the earned points.
    ///
    /// "Now" is taken in the quest timezone, so `last_completed_at` carries
    /// the local offset and the daily cap follows the local calendar day.
    /// Daily and weekly quests are rescheduled last, once the idempotency
    /// result is written; a scheduler error undoes the whole completion.
    pub async fn complete_quest(&self, cmd: CompleteQuestCmd) -> ResultEngine<Completion> {
        let quest_id = normalize_required_text(&cmd.quest_id, "quest id")?;
        let deadline = self.deadline(cmd.timeout)?;

        let gate = with_deadline(
            deadline,
            self.claim_idempotency_key(
                &cmd.idempotency_key,
                IdempotentOperation::QuestComplete,
                cmd.user_id,
            ),
        )
        .await?;
        let claim = match gate {
            Gate::Replay(payload) => return decode_replay(&payload),
            Gate::Claimed(claim) => claim,
        };

        let (cmd_ref, quest_id_ref, claim_ref) = (&cmd, quest_id.as_str(), &claim);
        let outcome = with_deadline(
            deadline,
            self.uow.run_in_transaction(None, |tx| async move {
                let (completion, quest) = self
                    .complete_quest_in_tx(tx.conn(), cmd_ref, quest_id_ref)
                    .await?;
                self.complete_idempotency_key(tx.conn(), claim_ref, &completion)
                    .await?;
                // The scheduler is not transactional: it goes after every
                // write that can still fail.
                if quest.category.is_recurring() {
                    self.scheduler.schedule_recurring_task(&quest).await?;
                }
                Ok(completion)
            }),
        )
        .await;

        match outcome {
            Ok(completion) => {
                tracing::info!(
                    quest_id = %completion.quest_id,
                    user_id = completion.user_id,
                    awarded = %completion.awarded_points,
                    streak = completion.streak_count,
                    "quest completion committed"
                );
                Ok(completion)
            }
            Err(err) => {
                self.fail_idempotency_key(&claim, &err).await;
                Err(err)
            }
        }
    }

    async fn complete_quest_in_tx<C: ConnectionTrait>(
        &self,
        db: &C,
        cmd: &CompleteQuestCmd,
        quest_id: &str,
    ) -> ResultEngine<(Completion, Quest)> {
        let mut quest = quests::find_by_id(db, quest_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(NotFound::Quest(quest_id.to_string())))?;
        let user = users::find_by_id(db, cmd.user_id)
            .await?
            .ok_or(EngineError::NotFound(NotFound::User(cmd.user_id)))?;
        let tz = resolve_timezone(&quest.timezone)?;

        if quest.status != QuestStatus::Active {
            return Err(EngineError::QuestUnavailable(quest.id));
        }
        let now = self.clock.now();
        if let Some(retry_after_secs) = quest.cooldown_remaining(now)? {
            return Err(EngineError::CooldownActive {
                quest: quest.id,
                retry_after_secs,
            });
        }
        let local_now = now.with_timezone(&tz);

        let mut award = quest.score(cmd.completion_ratio, cmd.minutes)?;
        if let Some(cap) = quest.daily_points_cap {
            let (day_start, day_end) = local_day_bounds(tz, local_now.date_naive());
            let earned_today =
                quest_completions::sum_awarded_between(db, &quest.id, user.id, day_start, day_end)
                    .await?;
            let remaining = cap.checked_sub(earned_today)?.max(Decimal::ZERO);
            if award > remaining {
                tracing::debug!(quest_id = %quest.id, %award, %remaining, "daily cap reached");
                award = remaining;
            }
        }

        let balance = users::update_balance(db, user.id, award).await?;

        if quest.streak_enabled {
            let missed = self.scheduler.missed_occurrence(&quest, now).await?;
            quest.streak_count = if missed { 1 } else { quest.streak_count + 1 };
        }
        quest.last_completed_at = Some(local_now.fixed_offset());
        if !quests::update(db, &quest).await? {
            return Err(EngineError::TransactionFailure(format!(
                "quest \"{}\" was modified concurrently",
                quest.id
            )));
        }
        quest.revision += 1;

        let completion = QuestCompletion {
            id: Uuid::new_v4(),
            quest_id: quest.id.clone(),
            user_id: user.id,
            submitted_at: now,
            completion_ratio: cmd.completion_ratio,
            minutes: cmd.minutes,
            awarded_points: award,
            idempotency_key: cmd.idempotency_key.clone(),
        };
        quest_completions::create(db, &completion).await?;

        let summary = Completion {
            completion_id: completion.id,
            quest_id: quest.id.clone(),
            user_id: user.id,
            awarded_points: award,
            balance,
            streak_count: quest.streak_count,
            completed_at: local_now.fixed_offset(),
        };
        Ok((summary, quest))
    }

    /// Creates a quest. Recurring quests get their first occurrence
    /// scheduled from the creation instant.
    pub async fn create_quest(&self, new: NewQuest) -> ResultEngine<Quest> {
        let quest = Quest::new(new, self.clock.now())?;
        let quest_ref = &quest;
        self.uow
            .run_in_transaction(None, |tx| async move {
                quests::create(tx.conn(), quest_ref).await?;
                if quest_ref.category.is_recurring() {
                    self.scheduler.schedule_recurring_task(quest_ref).await?;
                }
                Ok(())
            })
            .await?;
        Ok(quest)
    }

    pub async fn quest(&self, quest_id: &str) -> ResultEngine<Quest> {
        quests::find_by_id(&self.database, quest_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(NotFound::Quest(quest_id.to_string())))
    }

    /// Quests of `chat_id` in every status, oldest first.
    pub async fn quests(&self, chat_id: i64) -> ResultEngine<Vec<Quest>> {
        quests::list_for_chat(&self.database, chat_id).await
    }

    /// Changes the editable fields of a quest, typically its status.
    ///
    /// The write is guarded by the quest revision: a completion landing in
    /// between makes it fail with [`EngineError::TransactionFailure`].
    pub async fn update_quest(&self, quest_id: &str, update: QuestUpdate) -> ResultEngine<Quest> {
        let quest_id = normalize_required_text(quest_id, "quest id")?;
        let (quest_id_ref, update_ref) = (quest_id.as_str(), &update);
        let quest = self
            .uow
            .run_in_transaction(None, |tx| async move {
                let mut quest = quests::find_by_id(tx.conn(), quest_id_ref)
                    .await?
                    .ok_or_else(|| EngineError::NotFound(NotFound::Quest(quest_id_ref.to_string())))?;
                quest.apply(update_ref.clone())?;
                if !quests::update(tx.conn(), &quest).await? {
                    return Err(EngineError::TransactionFailure(format!(
                        "quest \"{}\" was modified concurrently",
                        quest.id
                    )));
                }
                quest.revision += 1;
                Ok(quest)
            })
            .await?;
        tracing::info!(quest_id = %quest.id, status = quest.status.as_str(), "quest updated");
        Ok(quest)
    }
}
