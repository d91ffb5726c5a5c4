use std::sync::{
    Arc, Mutex,
    atomic::{AtomicBool, Ordering},
};

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate, TimeZone, Timelike, Utc};
use sea_orm::ConnectionTrait;

use engine::{
    Clock, CompleteQuestCmd, EngineError, FixedClock, IdempotencyStatus, InMemoryScheduler,
    NewQuest, NotFound, Quest, QuestCategory, QuestMode, QuestStatus, QuestUpdate, ResultEngine,
    Scheduler, idempotency_keys, quest_completions,
};

mod common;
use common::{CHAT, balance, d, engine_with, harness, harness_with_scheduler, seed_user};

fn binary(title: &str, category: QuestCategory) -> NewQuest {
    NewQuest::new(CHAT, title, category, QuestMode::Binary, d("10"))
}

#[tokio::test]
async fn binary_completion_credits_points_and_starts_streak() {
    let h = harness().await;
    seed_user(&h.engine, 1, "0").await;
    let quest = h
        .engine
        .create_quest(binary("Meditate", QuestCategory::Adhoc))
        .await
        .unwrap();

    let completion = h
        .engine
        .complete_quest(CompleteQuestCmd::new(1, &quest.id, "q-1"))
        .await
        .unwrap();

    assert_eq!(completion.awarded_points, d("10"));
    assert_eq!(completion.balance, d("10"));
    assert_eq!(completion.streak_count, 1);
    assert_eq!(balance(&h.engine, 1).await, d("10"));

    let stored = h.engine.quest(&quest.id).await.unwrap();
    assert_eq!(stored.streak_count, 1);
    assert_eq!(stored.revision, quest.revision + 1);
    assert_eq!(stored.last_completed_at, Some(completion.completed_at));
}

#[tokio::test]
async fn new_york_quest_records_local_offset_and_date() {
    let h = harness().await;
    seed_user(&h.engine, 1, "0").await;
    let quest = h
        .engine
        .create_quest(binary("Journal", QuestCategory::Adhoc).timezone("America/New_York"))
        .await
        .unwrap();
    // 02:30 UTC on July 5th is still July 4th in New York.
    let instant = Utc.with_ymd_and_hms(2026, 7, 5, 2, 30, 0).unwrap();
    h.clock.set(instant);

    let completion = h
        .engine
        .complete_quest(CompleteQuestCmd::new(1, &quest.id, "q-1"))
        .await
        .unwrap();

    let at = completion.completed_at;
    assert_eq!(at.offset().local_minus_utc(), -4 * 3600);
    assert_eq!(at.date_naive(), NaiveDate::from_ymd_opt(2026, 7, 4).unwrap());
    assert_eq!(at.hour(), 22);
    assert_eq!(at, instant);

    let stored = h.engine.quest(&quest.id).await.unwrap();
    let last = stored.last_completed_at.unwrap();
    assert_eq!(last.offset().local_minus_utc(), -4 * 3600);
    assert_eq!(last.day(), 4);
}

#[tokio::test]
async fn empty_timezone_records_utc() {
    let h = harness().await;
    seed_user(&h.engine, 1, "0").await;
    let quest = h
        .engine
        .create_quest(binary("Stretch", QuestCategory::Adhoc))
        .await
        .unwrap();

    let completion = h
        .engine
        .complete_quest(CompleteQuestCmd::new(1, &quest.id, "q-1"))
        .await
        .unwrap();

    assert_eq!(completion.completed_at.offset().local_minus_utc(), 0);
    assert_eq!(completion.completed_at, common::start());
}

#[tokio::test]
async fn unresolvable_timezone_fails_without_side_effects() {
    let h = harness().await;
    seed_user(&h.engine, 1, "0").await;
    let quest = h
        .engine
        .create_quest(binary("Sail", QuestCategory::Adhoc))
        .await
        .unwrap();
    h.db.execute_unprepared("UPDATE quests SET timezone = 'Mars/Olympus_Mons'")
        .await
        .unwrap();

    let err = h
        .engine
        .complete_quest(CompleteQuestCmd::new(1, &quest.id, "q-1"))
        .await
        .unwrap_err();

    assert_eq!(
        err,
        EngineError::InvalidTimezone("Mars/Olympus_Mons".to_string())
    );
    assert_eq!(balance(&h.engine, 1).await, d("0"));
    assert_eq!(h.engine.quest(&quest.id).await.unwrap().streak_count, 0);
}

#[tokio::test]
async fn missing_quest_and_user_are_reported() {
    let h = harness().await;
    seed_user(&h.engine, 1, "0").await;
    let quest = h
        .engine
        .create_quest(binary("Read", QuestCategory::Adhoc))
        .await
        .unwrap();

    let err = h
        .engine
        .complete_quest(CompleteQuestCmd::new(1, "nope", "q-1"))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::NotFound(NotFound::Quest("nope".to_string())));

    let err = h
        .engine
        .complete_quest(CompleteQuestCmd::new(9, &quest.id, "q-2"))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::NotFound(NotFound::User(9)));
}

#[tokio::test]
async fn partial_quest_scales_award_and_validates_ratio() {
    let h = harness().await;
    seed_user(&h.engine, 1, "0").await;
    let quest = h
        .engine
        .create_quest(NewQuest::new(
            CHAT,
            "Clean",
            QuestCategory::Adhoc,
            QuestMode::Partial,
            d("10"),
        ))
        .await
        .unwrap();

    let err = h
        .engine
        .complete_quest(CompleteQuestCmd::new(1, &quest.id, "q-1").completion_ratio(d("1.5")))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::InvalidCompletionRatio("1.5".to_string()));
    assert_eq!(balance(&h.engine, 1).await, d("0"));

    let completion = h
        .engine
        .complete_quest(CompleteQuestCmd::new(1, &quest.id, "q-2").completion_ratio(d("0.5")))
        .await
        .unwrap();
    assert_eq!(completion.awarded_points, d("5"));
    assert_eq!(balance(&h.engine, 1).await, d("5"));
}

#[tokio::test]
async fn per_minute_quest_clamps_minutes() {
    let h = harness().await;
    seed_user(&h.engine, 1, "0").await;
    let quest = h
        .engine
        .create_quest(
            NewQuest::new(CHAT, "Run", QuestCategory::Adhoc, QuestMode::PerMinute, d("0"))
                .rate_per_minute(d("0.5"))
                .minutes_range(Some(10), Some(60)),
        )
        .await
        .unwrap();

    let long = h
        .engine
        .complete_quest(CompleteQuestCmd::new(1, &quest.id, "q-1").minutes(90))
        .await
        .unwrap();
    assert_eq!(long.awarded_points, d("30"));

    let short = h
        .engine
        .complete_quest(CompleteQuestCmd::new(1, &quest.id, "q-2").minutes(2))
        .await
        .unwrap();
    assert_eq!(short.awarded_points, d("5"));

    let err = h
        .engine
        .complete_quest(CompleteQuestCmd::new(1, &quest.id, "q-3"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidRequest(_)));
    assert_eq!(balance(&h.engine, 1).await, d("35"));
}

#[tokio::test]
async fn daily_cap_follows_the_quest_calendar_day() {
    let h = harness().await;
    seed_user(&h.engine, 1, "0").await;
    let quest = h
        .engine
        .create_quest(
            NewQuest::new(CHAT, "Practice", QuestCategory::Adhoc, QuestMode::PerMinute, d("0"))
                .rate_per_minute(d("1"))
                .daily_points_cap(d("50"))
                .timezone("America/New_York"),
        )
        .await
        .unwrap();
    // 22:30 on July 4th in New York.
    h.clock.set(Utc.with_ymd_and_hms(2026, 7, 5, 2, 30, 0).unwrap());

    let mut awarded = Vec::new();
    for n in 0..3 {
        let completion = h
            .engine
            .complete_quest(CompleteQuestCmd::new(1, &quest.id, format!("q-{n}")).minutes(30))
            .await
            .unwrap();
        awarded.push(completion.awarded_points);
    }
    assert_eq!(awarded, vec![d("30"), d("20"), d("0")]);

    // Still July 5th in UTC, but a new day in New York.
    h.clock.advance(Duration::hours(2));
    let next_day = h
        .engine
        .complete_quest(CompleteQuestCmd::new(1, &quest.id, "q-next").minutes(30))
        .await
        .unwrap();
    assert_eq!(next_day.awarded_points, d("30"));
    assert_eq!(balance(&h.engine, 1).await, d("80"));

    let (start, end) = (
        Utc.with_ymd_and_hms(2026, 7, 4, 4, 0, 0).unwrap(),
        Utc.with_ymd_and_hms(2026, 7, 5, 4, 0, 0).unwrap(),
    );
    let july_4th = quest_completions::sum_awarded_between(&h.db, &quest.id, 1, start, end)
        .await
        .unwrap();
    assert_eq!(july_4th, d("50"));
}

#[tokio::test]
async fn cooldown_rejects_early_completion() {
    let h = harness().await;
    seed_user(&h.engine, 1, "0").await;
    let quest = h
        .engine
        .create_quest(binary("Water plants", QuestCategory::Adhoc).cooldown_sec(3600))
        .await
        .unwrap();

    h.engine
        .complete_quest(CompleteQuestCmd::new(1, &quest.id, "q-1"))
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(10));

    let err = h
        .engine
        .complete_quest(CompleteQuestCmd::new(1, &quest.id, "q-2"))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        EngineError::CooldownActive {
            quest: quest.id.clone(),
            retry_after_secs: 50 * 60,
        }
    );

    h.clock.advance(Duration::minutes(50));
    h.engine
        .complete_quest(CompleteQuestCmd::new(1, &quest.id, "q-3"))
        .await
        .unwrap();
    assert_eq!(balance(&h.engine, 1).await, d("20"));
}

#[tokio::test]
async fn streak_grows_daily_and_resets_after_a_missed_day() {
    let scheduler = Arc::new(InMemoryScheduler::new());
    let h = harness_with_scheduler(scheduler.clone()).await;
    seed_user(&h.engine, 1, "0").await;
    let quest = h
        .engine
        .create_quest(binary("Push-ups", QuestCategory::Daily))
        .await
        .unwrap();
    assert_eq!(
        scheduler.next_occurrence(&quest.id),
        Some(common::start() + Duration::days(1))
    );

    let mut streaks = Vec::new();
    for (n, gap) in [0, 1, 1, 3].into_iter().enumerate() {
        h.clock.advance(Duration::days(gap));
        let completion = h
            .engine
            .complete_quest(CompleteQuestCmd::new(1, &quest.id, format!("q-{n}")))
            .await
            .unwrap();
        streaks.push(completion.streak_count);
    }

    assert_eq!(streaks, vec![1, 2, 3, 1]);
    assert_eq!(
        scheduler.next_occurrence(&quest.id),
        Some(h.clock.now() + Duration::days(1))
    );
}

#[tokio::test]
async fn streak_stays_put_when_disabled() {
    let h = harness().await;
    seed_user(&h.engine, 1, "0").await;
    let quest = h
        .engine
        .create_quest(binary("Hydrate", QuestCategory::Adhoc).streak_enabled(false))
        .await
        .unwrap();

    let completion = h
        .engine
        .complete_quest(CompleteQuestCmd::new(1, &quest.id, "q-1"))
        .await
        .unwrap();
    assert_eq!(completion.streak_count, 0);
}

#[tokio::test]
async fn replayed_completion_is_not_credited_twice() {
    let h = harness().await;
    seed_user(&h.engine, 1, "0").await;
    let quest = h
        .engine
        .create_quest(binary("Walk", QuestCategory::Adhoc))
        .await
        .unwrap();

    let cmd = CompleteQuestCmd::new(1, &quest.id, "q-1");
    let first = h.engine.complete_quest(cmd.clone()).await.unwrap();
    let second = h.engine.complete_quest(cmd).await.unwrap();

    assert_eq!(first, second);
    assert_eq!(balance(&h.engine, 1).await, d("10"));
    assert_eq!(h.engine.quest(&quest.id).await.unwrap().streak_count, 1);
}

#[tokio::test]
async fn paused_quest_cannot_be_completed_until_resumed() {
    let h = harness().await;
    seed_user(&h.engine, 1, "0").await;
    let quest = h
        .engine
        .create_quest(binary("Paint", QuestCategory::Adhoc))
        .await
        .unwrap();

    let paused = h
        .engine
        .update_quest(&quest.id, QuestUpdate::default().status(QuestStatus::Paused))
        .await
        .unwrap();
    assert_eq!(paused.status, QuestStatus::Paused);
    assert_eq!(paused.revision, quest.revision + 1);
    assert_eq!(h.engine.quest(&quest.id).await.unwrap(), paused);

    let err = h
        .engine
        .complete_quest(CompleteQuestCmd::new(1, &quest.id, "q-1"))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::QuestUnavailable(quest.id.clone()));
    assert_eq!(balance(&h.engine, 1).await, d("0"));

    h.engine
        .update_quest(&quest.id, QuestUpdate::default().status(QuestStatus::Active))
        .await
        .unwrap();
    let completion = h
        .engine
        .complete_quest(CompleteQuestCmd::new(1, &quest.id, "q-1"))
        .await
        .unwrap();
    assert_eq!(completion.awarded_points, d("10"));
}

#[tokio::test]
async fn quest_updates_are_validated() {
    let h = harness().await;
    let quest = h
        .engine
        .create_quest(binary("Paint", QuestCategory::Adhoc))
        .await
        .unwrap();

    let err = h
        .engine
        .update_quest("missing", QuestUpdate::default().status(QuestStatus::Archived))
        .await
        .unwrap_err();
    assert_eq!(err, EngineError::NotFound(NotFound::Quest("missing".to_string())));

    let err = h
        .engine
        .update_quest(
            &quest.id,
            QuestUpdate::default()
                .status(QuestStatus::Archived)
                .points_award(d("-1")),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidQuest(_)));
    assert_eq!(h.engine.quest(&quest.id).await.unwrap(), quest);

    let updated = h
        .engine
        .update_quest(
            &quest.id,
            QuestUpdate::default()
                .title(" Paint walls ")
                .daily_points_cap(Some(d("25")))
                .cooldown_sec(60),
        )
        .await
        .unwrap();
    assert_eq!(updated.title, "Paint walls");
    assert_eq!(updated.daily_points_cap, Some(d("25")));
    assert_eq!(updated.cooldown_sec, 60);
    assert_eq!(updated.status, QuestStatus::Active);
}

#[tokio::test]
async fn chat_quests_are_listed_oldest_first() {
    let h = harness().await;
    let first = h
        .engine
        .create_quest(binary("Stretch", QuestCategory::Daily))
        .await
        .unwrap();
    h.clock.advance(Duration::minutes(1));
    h.engine
        .create_quest(NewQuest::new(
            CHAT + 1,
            "Elsewhere",
            QuestCategory::Adhoc,
            QuestMode::Binary,
            d("1"),
        ))
        .await
        .unwrap();
    let second = h
        .engine
        .create_quest(binary("Journal", QuestCategory::Adhoc))
        .await
        .unwrap();
    h.engine
        .update_quest(&first.id, QuestUpdate::default().status(QuestStatus::Paused))
        .await
        .unwrap();

    let listed: Vec<_> = h
        .engine
        .quests(CHAT)
        .await
        .unwrap()
        .into_iter()
        .map(|quest| (quest.id, quest.status))
        .collect();
    assert_eq!(
        listed,
        vec![(first.id, QuestStatus::Paused), (second.id, QuestStatus::Active)]
    );
    assert!(h.engine.quests(CHAT + 7).await.unwrap().is_empty());
}

#[tokio::test]
async fn oversized_cooldown_is_reported_not_fatal() {
    let h = harness().await;
    seed_user(&h.engine, 1, "0").await;

    let err = h
        .engine
        .create_quest(binary("Hibernate", QuestCategory::Adhoc).cooldown_sec(i64::MAX))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidQuest(_)));

    // Representable as a span but not once added to a date.
    let quest = h
        .engine
        .create_quest(binary("Hibernate", QuestCategory::Adhoc).cooldown_sec(9_000_000_000_000_000))
        .await
        .unwrap();
    h.engine
        .complete_quest(CompleteQuestCmd::new(1, &quest.id, "q-1"))
        .await
        .unwrap();
    let err = h
        .engine
        .complete_quest(CompleteQuestCmd::new(1, &quest.id, "q-2"))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidQuest(_)));
    assert_eq!(balance(&h.engine, 1).await, d("10"));
}

/// Scheduler that can be switched off to simulate an outage.
#[derive(Default)]
struct FlakyScheduler {
    down: AtomicBool,
    inner: InMemoryScheduler,
}

#[async_trait]
impl Scheduler for FlakyScheduler {
    async fn schedule_recurring_task(&self, quest: &Quest) -> ResultEngine<()> {
        if self.down.load(Ordering::SeqCst) {
            return Err(EngineError::Scheduler("scheduler unavailable".to_string()));
        }
        self.inner.schedule_recurring_task(quest).await
    }
}

#[tokio::test]
async fn scheduler_failure_rolls_back_the_completion() {
    let scheduler = Arc::new(FlakyScheduler::default());
    let h = harness_with_scheduler(scheduler.clone()).await;
    seed_user(&h.engine, 1, "0").await;
    let quest = h
        .engine
        .create_quest(binary("Review", QuestCategory::Weekly))
        .await
        .unwrap();

    scheduler.down.store(true, Ordering::SeqCst);
    let cmd = CompleteQuestCmd::new(1, &quest.id, "q-1");
    let err = h.engine.complete_quest(cmd.clone()).await.unwrap_err();
    assert_eq!(
        err,
        EngineError::Scheduler("scheduler unavailable".to_string())
    );

    assert_eq!(balance(&h.engine, 1).await, d("0"));
    let stored = h.engine.quest(&quest.id).await.unwrap();
    assert_eq!(stored, quest);
    let recorded = quest_completions::sum_awarded_between(
        &h.db,
        &quest.id,
        1,
        common::start() - Duration::days(1),
        common::start() + Duration::days(1),
    )
    .await
    .unwrap();
    assert_eq!(recorded, d("0"));

    // The failed key is retried once the scheduler is back.
    scheduler.down.store(false, Ordering::SeqCst);
    let completion = h.engine.complete_quest(cmd).await.unwrap();
    assert_eq!(completion.awarded_points, d("10"));
    assert_eq!(balance(&h.engine, 1).await, d("10"));
}

#[tokio::test]
async fn create_quest_validates_mode_fields() {
    let h = harness().await;

    let err = h
        .engine
        .create_quest(NewQuest::new(
            CHAT,
            "Swim",
            QuestCategory::Adhoc,
            QuestMode::PerMinute,
            d("0"),
        ))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidQuest(_)));

    let err = h
        .engine
        .create_quest(binary("   ", QuestCategory::Adhoc))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::InvalidQuest(_)));
}

/// Scheduler whose every call outlasts a short workflow deadline.
struct SlowScheduler;

#[async_trait]
impl Scheduler for SlowScheduler {
    async fn schedule_recurring_task(&self, _quest: &Quest) -> ResultEngine<()> {
        tokio::time::sleep(std::time::Duration::from_millis(300)).await;
        Ok(())
    }
}

#[tokio::test]
async fn timed_out_completion_is_rolled_back() {
    let h = harness_with_scheduler(Arc::new(SlowScheduler)).await;
    seed_user(&h.engine, 1, "0").await;
    let quest = h
        .engine
        .create_quest(binary("Water plants", QuestCategory::Daily))
        .await
        .unwrap();

    let err = h
        .engine
        .complete_quest(
            CompleteQuestCmd::new(1, &quest.id, "q-slow")
                .timeout(std::time::Duration::from_millis(100)),
        )
        .await
        .unwrap_err();

    assert_eq!(err, EngineError::Timeout);
    assert_eq!(balance(&h.engine, 1).await, d("0"));
    assert_eq!(h.engine.quest(&quest.id).await.unwrap().streak_count, 0);
    let record = idempotency_keys::find_by_key(&h.db, "q-slow")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(record.status, IdempotencyStatus::Failed);
}

type Journal = Arc<Mutex<Vec<&'static str>>>;

struct JournalClock {
    inner: FixedClock,
    journal: Journal,
}

impl Clock for JournalClock {
    fn now(&self) -> chrono::DateTime<Utc> {
        self.journal.lock().unwrap().push("clock");
        self.inner.now()
    }
}

struct JournalScheduler {
    journal: Journal,
}

#[async_trait]
impl Scheduler for JournalScheduler {
    async fn schedule_recurring_task(&self, _quest: &Quest) -> ResultEngine<()> {
        self.journal.lock().unwrap().push("schedule");
        Ok(())
    }
}

#[tokio::test]
async fn recurring_quest_is_rescheduled_after_the_result_is_stored() {
    let journal = Journal::default();
    let clock = Arc::new(JournalClock {
        inner: FixedClock::new(common::start()),
        journal: journal.clone(),
    });
    let scheduler = Arc::new(JournalScheduler {
        journal: journal.clone(),
    });
    let (engine, _db) = engine_with(clock, scheduler).await;
    seed_user(&engine, 1, "0").await;
    let quest = engine
        .create_quest(binary("Floss", QuestCategory::Weekly))
        .await
        .unwrap();

    journal.lock().unwrap().clear();
    engine
        .complete_quest(CompleteQuestCmd::new(1, &quest.id, "q-1"))
        .await
        .unwrap();

    // The last clock reading stamps the stored result.
    let events = journal.lock().unwrap().clone();
    assert_eq!(events.last(), Some(&"schedule"));
    assert_eq!(events.iter().filter(|event| **event == "schedule").count(), 1);
}

#[tokio::test]
async fn daily_cap_applies_to_binary_quests_too() {
    let h = harness().await;
    seed_user(&h.engine, 1, "0").await;
    let quest = h
        .engine
        .create_quest(binary("Push-ups", QuestCategory::Adhoc).daily_points_cap(d("15")))
        .await
        .unwrap();

    let mut awarded = Vec::new();
    for key in ["q-1", "q-2", "q-3"] {
        let completion = h
            .engine
            .complete_quest(CompleteQuestCmd::new(1, &quest.id, key))
            .await
            .unwrap();
        awarded.push(completion.awarded_points);
    }

    assert_eq!(awarded, vec![d("10"), d("5"), d("0")]);
    assert_eq!(balance(&h.engine, 1).await, d("15"));
}
