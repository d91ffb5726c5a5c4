#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};
use sea_orm::{Database, DatabaseConnection};

use engine::{
    Clock, Decimal, Engine, FixedClock, InMemoryScheduler, NewShopItem, NewUser, Scheduler, ShopItem,
    User,
};
use migration::MigratorTrait;

pub const CHAT: i64 = 42;

pub struct Harness {
    pub engine: Engine,
    pub db: DatabaseConnection,
    pub clock: Arc<FixedClock>,
}

/// 2026-07-04 12:00 in New York.
pub fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 7, 4, 16, 0, 0).unwrap()
}

pub fn d(value: &str) -> Decimal {
    value.parse().unwrap()
}

pub async fn harness() -> Harness {
    harness_with_scheduler(Arc::new(InMemoryScheduler::new())).await
}

pub async fn harness_with_scheduler(scheduler: Arc<dyn Scheduler>) -> Harness {
    let clock = Arc::new(FixedClock::new(start()));
    let (engine, db) = engine_with(clock.clone(), scheduler).await;
    Harness { engine, db, clock }
}

pub async fn engine_with(
    clock: Arc<dyn Clock>,
    scheduler: Arc<dyn Scheduler>,
) -> (Engine, DatabaseConnection) {
    let db = Database::connect("sqlite::memory:").await.unwrap();
    migration::Migrator::up(&db, None).await.unwrap();
    let engine = Engine::builder()
        .database(db.clone())
        .clock(clock)
        .scheduler(scheduler)
        .build()
        .await
        .unwrap();
    (engine, db)
}

pub async fn seed_user(engine: &Engine, id: i64, balance: &str) -> User {
    engine
        .create_user(NewUser::new(id, CHAT, format!("user-{id}")).balance(d(balance)))
        .await
        .unwrap()
}

pub async fn seed_item(engine: &Engine, code: &str, price: &str, stock: Option<i64>) -> ShopItem {
    let mut item = NewShopItem::new(CHAT, code, code.to_uppercase(), d(price));
    if let Some(stock) = stock {
        item = item.stock(stock);
    }
    engine.create_shop_item(item).await.unwrap()
}

pub async fn balance(engine: &Engine, user_id: i64) -> Decimal {
    engine.user(user_id).await.unwrap().balance
}

pub async fn stock(db: &DatabaseConnection, chat_id: i64, code: &str) -> Option<i64> {
    engine::shop_items::find_by_code(db, chat_id, code)
        .await
        .unwrap()
        .unwrap()
        .stock
}

pub async fn purchase_count(db: &DatabaseConnection, user_id: i64) -> u64 {
    engine::purchases::count_for_user(db, user_id).await.unwrap()
}
