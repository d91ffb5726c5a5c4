//! Command structs for engine operations.
//!
//! These types group parameters for the workflows and the catalog
//! operations, keeping call sites readable and avoiding long argument lists.

use std::time::Duration;

use crate::{Decimal, QuestCategory, QuestMode, QuestStatus};

/// Buy `quantity` units of the item `item_code`.
#[derive(Clone, Debug)]
pub struct PurchaseCmd {
    pub user_id: i64,
    pub item_code: String,
    pub quantity: i64,
    pub idempotency_key: String,
    /// Overrides [`EngineConfig::operation_timeout`](crate::EngineConfig).
    pub timeout: Option<Duration>,
}

impl PurchaseCmd {
    #[must_use]
    pub fn new(
        user_id: i64,
        item_code: impl Into<String>,
        quantity: i64,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            item_code: item_code.into(),
            quantity,
            idempotency_key: idempotency_key.into(),
            timeout: None,
        }
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Complete a quest on behalf of a user.
#[derive(Clone, Debug)]
pub struct CompleteQuestCmd {
    pub user_id: i64,
    pub quest_id: String,
    pub idempotency_key: String,
    /// Required by [`QuestMode::Partial`] quests.
    pub completion_ratio: Option<Decimal>,
    /// Required by [`QuestMode::PerMinute`] quests.
    pub minutes: Option<i64>,
    pub timeout: Option<Duration>,
}

impl CompleteQuestCmd {
    #[must_use]
    pub fn new(
        user_id: i64,
        quest_id: impl Into<String>,
        idempotency_key: impl Into<String>,
    ) -> Self {
        Self {
            user_id,
            quest_id: quest_id.into(),
            idempotency_key: idempotency_key.into(),
            completion_ratio: None,
            minutes: None,
            timeout: None,
        }
    }

    #[must_use]
    pub fn completion_ratio(mut self, ratio: Decimal) -> Self {
        self.completion_ratio = Some(ratio);
        self
    }

    #[must_use]
    pub fn minutes(mut self, minutes: i64) -> Self {
        self.minutes = Some(minutes);
        self
    }

    #[must_use]
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

#[derive(Clone, Debug)]
pub struct NewUser {
    pub id: i64,
    pub chat_id: i64,
    pub display_name: String,
    pub timezone: String,
    pub balance: Decimal,
}

impl NewUser {
    #[must_use]
    pub fn new(id: i64, chat_id: i64, display_name: impl Into<String>) -> Self {
        Self {
            id,
            chat_id,
            display_name: display_name.into(),
            timezone: String::new(),
            balance: Decimal::ZERO,
        }
    }

    #[must_use]
    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }

    /// Opening balance.
    #[must_use]
    pub fn balance(mut self, balance: Decimal) -> Self {
        self.balance = balance;
        self
    }
}

/// A catalog entry. `chat_id == 0` makes the item global.
#[derive(Clone, Debug)]
pub struct NewShopItem {
    pub chat_id: i64,
    pub code: String,
    pub name: String,
    pub price: Decimal,
    pub stock: Option<i64>,
    pub discount_tier_id: Option<i64>,
    pub is_active: bool,
}

impl NewShopItem {
    #[must_use]
    pub fn new(
        chat_id: i64,
        code: impl Into<String>,
        name: impl Into<String>,
        price: Decimal,
    ) -> Self {
        Self {
            chat_id,
            code: code.into(),
            name: name.into(),
            price,
            stock: None,
            discount_tier_id: None,
            is_active: true,
        }
    }

    #[must_use]
    pub fn stock(mut self, stock: i64) -> Self {
        self.stock = Some(stock);
        self
    }

    #[must_use]
    pub fn discount_tier(mut self, tier_id: i64) -> Self {
        self.discount_tier_id = Some(tier_id);
        self
    }

    #[must_use]
    pub fn inactive(mut self) -> Self {
        self.is_active = false;
        self
    }
}

/// Partial update of a catalog entry; `None` leaves a field untouched.
#[derive(Clone, Debug, Default)]
pub struct ShopItemUpdate {
    pub name: Option<String>,
    pub price: Option<Decimal>,
    pub is_active: Option<bool>,
    /// `Some(None)` makes the stock unlimited.
    pub stock: Option<Option<i64>>,
    pub discount_tier_id: Option<Option<i64>>,
}

impl ShopItemUpdate {
    #[must_use]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn price(mut self, price: Decimal) -> Self {
        self.price = Some(price);
        self
    }

    #[must_use]
    pub fn active(mut self, is_active: bool) -> Self {
        self.is_active = Some(is_active);
        self
    }

    #[must_use]
    pub fn stock(mut self, stock: Option<i64>) -> Self {
        self.stock = Some(stock);
        self
    }

    #[must_use]
    pub fn discount_tier(mut self, tier_id: Option<i64>) -> Self {
        self.discount_tier_id = Some(tier_id);
        self
    }
}

#[derive(Clone, Debug)]
pub struct NewDiscountTier {
    pub name: String,
    pub discount_percent: Decimal,
    pub min_purchases: i64,
}

impl NewDiscountTier {
    #[must_use]
    pub fn new(name: impl Into<String>, discount_percent: Decimal) -> Self {
        Self {
            name: name.into(),
            discount_percent,
            min_purchases: 0,
        }
    }

    #[must_use]
    pub fn min_purchases(mut self, min_purchases: i64) -> Self {
        self.min_purchases = min_purchases;
        self
    }
}

/// Create a quest. The mode-specific fields are validated by
/// [`Engine::create_quest`](crate::Engine::create_quest).
#[derive(Clone, Debug)]
pub struct NewQuest {
    pub chat_id: i64,
    pub title: String,
    pub category: QuestCategory,
    pub mode: QuestMode,
    pub points_award: Decimal,
    pub rate_per_minute: Option<Decimal>,
    pub min_minutes: Option<i64>,
    pub max_minutes: Option<i64>,
    pub daily_points_cap: Option<Decimal>,
    pub cooldown_sec: i64,
    pub streak_enabled: bool,
    pub timezone: String,
}

impl NewQuest {
    #[must_use]
    pub fn new(
        chat_id: i64,
        title: impl Into<String>,
        category: QuestCategory,
        mode: QuestMode,
        points_award: Decimal,
    ) -> Self {
        Self {
            chat_id,
            title: title.into(),
            category,
            mode,
            points_award,
            rate_per_minute: None,
            min_minutes: None,
            max_minutes: None,
            daily_points_cap: None,
            cooldown_sec: 0,
            streak_enabled: true,
            timezone: String::new(),
        }
    }

    #[must_use]
    pub fn rate_per_minute(mut self, rate: Decimal) -> Self {
        self.rate_per_minute = Some(rate);
        self
    }

    #[must_use]
    pub fn minutes_range(mut self, min: Option<i64>, max: Option<i64>) -> Self {
        self.min_minutes = min;
        self.max_minutes = max;
        self
    }

    #[must_use]
    pub fn daily_points_cap(mut self, cap: Decimal) -> Self {
        self.daily_points_cap = Some(cap);
        self
    }

    #[must_use]
    pub fn cooldown_sec(mut self, cooldown_sec: i64) -> Self {
        self.cooldown_sec = cooldown_sec;
        self
    }

    #[must_use]
    pub fn streak_enabled(mut self, enabled: bool) -> Self {
        self.streak_enabled = enabled;
        self
    }

    #[must_use]
    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = timezone.into();
        self
    }
}

/// Partial update of a quest; `None` leaves a field untouched. Category and
/// scoring mode are fixed at creation.
#[derive(Clone, Debug, Default)]
pub struct QuestUpdate {
    pub title: Option<String>,
    pub status: Option<QuestStatus>,
    pub points_award: Option<Decimal>,
    /// `Some(None)` removes the cap.
    pub daily_points_cap: Option<Option<Decimal>>,
    pub cooldown_sec: Option<i64>,
    pub streak_enabled: Option<bool>,
    pub timezone: Option<String>,
}

impl QuestUpdate {
    #[must_use]
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    #[must_use]
    pub fn status(mut self, status: QuestStatus) -> Self {
        self.status = Some(status);
        self
    }

    #[must_use]
    pub fn points_award(mut self, points: Decimal) -> Self {
        self.points_award = Some(points);
        self
    }

    #[must_use]
    pub fn daily_points_cap(mut self, cap: Option<Decimal>) -> Self {
        self.daily_points_cap = Some(cap);
        self
    }

    #[must_use]
    pub fn cooldown_sec(mut self, cooldown_sec: i64) -> Self {
        self.cooldown_sec = Some(cooldown_sec);
        self
    }

    #[must_use]
    pub fn streak_enabled(mut self, enabled: bool) -> Self {
        self.streak_enabled = Some(enabled);
        self
    }

    #[must_use]
    pub fn timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }
}
