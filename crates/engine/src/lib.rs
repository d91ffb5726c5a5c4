//! Idempotent commerce and quest-completion engine.
//!
//! The entry point is [`Engine`], built through [`Engine::builder`]. Every
//! state-changing workflow takes a caller-supplied idempotency key and runs
//! its writes inside a single database transaction, so a purchase or a quest
//! completion is applied exactly once and never partially.

pub use clock::{Clock, FixedClock, SystemClock};
pub use commands::{
    CompleteQuestCmd, NewDiscountTier, NewQuest, NewShopItem, NewUser, PurchaseCmd, QuestUpdate,
    ShopItemUpdate,
};
pub use decimal::{DIVISION_SCALE, Decimal};
pub use discount_tiers::DiscountTier;
pub use error::{EngineError, NotFound};
pub use idempotency_keys::{IdempotencyKey, IdempotencyStatus, IdempotentOperation};
pub use ops::{
    Completion, Engine, EngineBuilder, EngineConfig, TxHandle, UnitOfWork,
};
pub use purchases::Purchase;
pub use quest_completions::QuestCompletion;
pub use quests::{Quest, QuestCategory, QuestMode, QuestStatus};
pub use scheduler::{InMemoryScheduler, Scheduler};
pub use shop_items::ShopItem;
pub use users::User;

mod clock;
mod commands;
mod decimal;
mod error;
mod ops;
mod scheduler;
mod util;

pub mod chat_configs;
pub mod discount_tiers;
pub mod idempotency_keys;
pub mod purchases;
pub mod quest_completions;
pub mod quests;
pub mod shop_items;
pub mod users;

pub type ResultEngine<T> = Result<T, EngineError>;
