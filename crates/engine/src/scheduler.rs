//! Recurrence bookkeeping for daily and weekly quests.

use std::{collections::HashMap, sync::Mutex};

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::{EngineError, Quest, ResultEngine};

/// Holds the next occurrence of recurring quests.
///
/// The completion workflow calls it inside its transaction: an error from
/// [`Scheduler::schedule_recurring_task`] rolls the completion back.
#[async_trait]
pub trait Scheduler: Send + Sync {
    /// Records the next occurrence of `quest` after its latest completion.
    async fn schedule_recurring_task(&self, quest: &Quest) -> ResultEngine<()>;

    /// Returns `true` when at least one occurrence of `quest` went by
    /// without a completion before `at`. A missed occurrence resets the
    /// streak.
    async fn missed_occurrence(&self, _quest: &Quest, _at: DateTime<Utc>) -> ResultEngine<bool> {
        Ok(false)
    }
}

/// Process-local [`Scheduler`].
#[derive(Debug, Default)]
pub struct InMemoryScheduler {
    next: Mutex<HashMap<String, DateTime<Utc>>>,
}

impl InMemoryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next occurrence recorded for `quest_id`, if any.
    pub fn next_occurrence(&self, quest_id: &str) -> Option<DateTime<Utc>> {
        self.next
            .lock()
            .ok()
            .and_then(|next| next.get(quest_id).copied())
    }

    fn with_next<T>(&self, f: impl FnOnce(&mut HashMap<String, DateTime<Utc>>) -> T) -> ResultEngine<T> {
        let mut next = self
            .next
            .lock()
            .map_err(|_| EngineError::Scheduler("schedule lock poisoned".to_string()))?;
        Ok(f(&mut next))
    }
}

#[async_trait]
impl Scheduler for InMemoryScheduler {
    async fn schedule_recurring_task(&self, quest: &Quest) -> ResultEngine<()> {
        let Some(period) = quest.category.period() else {
            return self.with_next(|next| {
                next.remove(&quest.id);
            });
        };
        let anchor = quest
            .last_completed_at
            .map_or(quest.created_at, |at| at.with_timezone(&Utc));
        let occurrence = anchor + period;
        self.with_next(|next| {
            next.insert(quest.id.clone(), occurrence);
        })?;
        tracing::debug!(quest_id = %quest.id, next = %occurrence, "recurring quest scheduled");
        Ok(())
    }

    async fn missed_occurrence(&self, quest: &Quest, at: DateTime<Utc>) -> ResultEngine<bool> {
        let Some(period) = quest.category.period() else {
            return Ok(false);
        };
        let scheduled = self.with_next(|next| next.get(&quest.id).copied())?;
        Ok(scheduled.is_some_and(|occurrence| at > occurrence + period))
    }
}
