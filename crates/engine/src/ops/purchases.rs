use sea_orm::ConnectionTrait;

use crate::{
    Decimal, DiscountTier, EngineError, IdempotentOperation, NewDiscountTier, NewShopItem,
    NotFound, Purchase, PurchaseCmd, ResultEngine, ShopItem, ShopItemUpdate, discount_tiers,
    purchases::{self, NewPurchase},
    shop_items::{self, GLOBAL_CHAT_ID},
    users,
    util::normalize_required_text,
};

use super::{
    Engine,
    idempotency::{Gate, decode_replay},
    with_deadline,
};

impl Engine {
    /// Buys `cmd.quantity` units of `cmd.item_code` for `cmd.user_id`.
    ///
    /// The item is looked up in the user's chat first, then in the global
    /// catalog. The debit, the stock decrement and the receipt are written in
    /// one transaction together with the idempotency result, so replaying
    /// `cmd.idempotency_key` returns the same receipt without charging
    /// twice.
    pub async fn purchase(&self, cmd: PurchaseCmd) -> ResultEngine<Purchase> {
        if cmd.quantity <= 0 {
            return Err(EngineError::InvalidRequest(format!(
                "quantity must be positive, got {}",
                cmd.quantity
            )));
        }
        let code = normalize_required_text(&cmd.item_code, "item code")?;
        let deadline = self.deadline(cmd.timeout)?;

        let gate = with_deadline(
            deadline,
            self.claim_idempotency_key(
                &cmd.idempotency_key,
                IdempotentOperation::Purchase,
                cmd.user_id,
            ),
        )
        .await?;
        let claim = match gate {
            Gate::Replay(payload) => return decode_replay(&payload),
            Gate::Claimed(claim) => claim,
        };

        let (cmd_ref, code_ref, claim_ref) = (&cmd, code.as_str(), &claim);
        let outcome = with_deadline(
            deadline,
            self.uow.run_in_transaction(None, |tx| async move {
                let purchase = self.purchase_in_tx(tx.conn(), cmd_ref, code_ref).await?;
                self.complete_idempotency_key(tx.conn(), claim_ref, &purchase)
                    .await?;
                Ok(purchase)
            }),
        )
        .await;

        match outcome {
            Ok(purchase) => {
                tracing::info!(
                    purchase_id = purchase.id,
                    user_id = purchase.user_id,
                    item = %code,
                    quantity = purchase.quantity,
                    total = %purchase.total_cost,
                    "purchase committed"
                );
                Ok(purchase)
            }
            Err(err) => {
                self.fail_idempotency_key(&claim, &err).await;
                Err(err)
            }
        }
    }

    async fn purchase_in_tx<C: ConnectionTrait>(
        &self,
        db: &C,
        cmd: &PurchaseCmd,
        code: &str,
    ) -> ResultEngine<Purchase> {
        let user = users::find_by_id(db, cmd.user_id)
            .await?
            .ok_or(EngineError::NotFound(NotFound::User(cmd.user_id)))?;

        let item = match shop_items::find_by_code(db, user.chat_id, code).await? {
            Some(item) => item,
            None => shop_items::find_by_code(db, GLOBAL_CHAT_ID, code)
                .await?
                .ok_or_else(|| EngineError::NotFound(NotFound::Item(code.to_string())))?,
        };
        if !item.is_active {
            return Err(EngineError::ItemUnavailable(code.to_string()));
        }
        if !item.has_stock_for(cmd.quantity) {
            return Err(EngineError::InsufficientStock {
                item: code.to_string(),
                available: item.stock.unwrap_or_default(),
                requested: cmd.quantity,
            });
        }

        let subtotal = item.price.checked_mul(Decimal::from(cmd.quantity))?;
        let (total, discount_tier_id) = self.apply_discount(db, &item, user.id, subtotal).await?;

        if user.balance < total {
            return Err(EngineError::InsufficientFunds {
                balance: user.balance,
                required: total,
            });
        }

        users::update_balance(db, user.id, -total).await?;
        if item.stock.is_some() && !shop_items::decrement_stock(db, item.id, cmd.quantity).await? {
            let available = shop_items::find_by_id(db, item.id)
                .await?
                .and_then(|item| item.stock)
                .unwrap_or_default();
            return Err(EngineError::InsufficientStock {
                item: code.to_string(),
                available,
                requested: cmd.quantity,
            });
        }

        purchases::create(
            db,
            NewPurchase {
                user_id: user.id,
                item_id: item.id,
                item_name: item.name,
                item_price: item.price,
                quantity: cmd.quantity,
                total_cost: total,
                discount_tier_id,
                purchased_at: self.clock.now(),
            },
        )
        .await
    }

    async fn apply_discount<C: ConnectionTrait>(
        &self,
        db: &C,
        item: &ShopItem,
        user_id: i64,
        subtotal: Decimal,
    ) -> ResultEngine<(Decimal, Option<i64>)> {
        let Some(tier_id) = item.discount_tier_id else {
            return Ok((subtotal, None));
        };
        let Some(tier) = discount_tiers::find_by_id(db, tier_id).await? else {
            tracing::debug!(tier_id, item = %item.code, "discount tier missing, charging full price");
            return Ok((subtotal, None));
        };

        let purchases_so_far = purchases::count_for_user(db, user_id).await?;
        if purchases_so_far < u64::try_from(tier.min_purchases).unwrap_or_default() {
            return Ok((subtotal, None));
        }
        Ok((tier.apply(subtotal)?, Some(tier.id)))
    }

    /// Adds an item to the catalog of `item.chat_id` (`0` for global).
    pub async fn create_shop_item(&self, item: NewShopItem) -> ResultEngine<ShopItem> {
        let mut item = item;
        item.code = normalize_required_text(&item.code, "item code")?;
        item.name = normalize_required_text(&item.name, "item name")?;
        validate_price(item.price)?;
        validate_stock(item.stock)?;

        let now = self.clock.now();
        let item_ref = &item;
        self.uow
            .run_in_transaction(None, |tx| async move {
                if let Some(tier_id) = item_ref.discount_tier_id {
                    require_discount_tier(tx.conn(), tier_id).await?;
                }
                shop_items::create(tx.conn(), item_ref, now).await
            })
            .await
    }

    /// Changes an existing item: restock, reprice, rename, (de)activate or
    /// (un)assign a discount tier.
    pub async fn update_shop_item(
        &self,
        chat_id: i64,
        code: &str,
        update: ShopItemUpdate,
    ) -> ResultEngine<ShopItem> {
        let code = normalize_required_text(code, "item code")?;
        let now = self.clock.now();
        let (code_ref, update_ref) = (code.as_str(), &update);
        self.uow
            .run_in_transaction(None, |tx| async move {
                let mut item = shop_items::find_by_code(tx.conn(), chat_id, code_ref)
                    .await?
                    .ok_or_else(|| EngineError::NotFound(NotFound::Item(code_ref.to_string())))?;

                if let Some(name) = &update_ref.name {
                    item.name = normalize_required_text(name, "item name")?;
                }
                if let Some(price) = update_ref.price {
                    validate_price(price)?;
                    item.price = price;
                }
                if let Some(is_active) = update_ref.is_active {
                    item.is_active = is_active;
                }
                if let Some(stock) = update_ref.stock {
                    validate_stock(stock)?;
                    item.stock = stock;
                }
                if let Some(tier_id) = update_ref.discount_tier_id {
                    if let Some(tier_id) = tier_id {
                        require_discount_tier(tx.conn(), tier_id).await?;
                    }
                    item.discount_tier_id = tier_id;
                }
                item.updated_at = now;

                shop_items::update(tx.conn(), &item).await?;
                Ok(item)
            })
            .await
    }

    /// Active items a user of `chat_id` can buy, chat items first.
    pub async fn shop_items(&self, chat_id: i64) -> ResultEngine<Vec<ShopItem>> {
        shop_items::list_for_chat(&self.database, chat_id).await
    }

    pub async fn create_discount_tier(&self, tier: NewDiscountTier) -> ResultEngine<DiscountTier> {
        let name = normalize_required_text(&tier.name, "discount tier name")?;
        if tier.discount_percent.is_negative() || tier.discount_percent > Decimal::from(100) {
            return Err(EngineError::InvalidRequest(format!(
                "discount_percent must be within [0, 100], got {}",
                tier.discount_percent
            )));
        }
        if tier.min_purchases < 0 {
            return Err(EngineError::InvalidRequest(
                "min_purchases must not be negative".to_string(),
            ));
        }

        discount_tiers::create(
            &self.database,
            &name,
            tier.discount_percent,
            tier.min_purchases,
            self.clock.now(),
        )
        .await
    }

    /// Receipts of a user, oldest first.
    pub async fn user_purchases(&self, user_id: i64) -> ResultEngine<Vec<Purchase>> {
        if users::find_by_id(&self.database, user_id).await?.is_none() {
            return Err(EngineError::NotFound(NotFound::User(user_id)));
        }
        purchases::list_for_user(&self.database, user_id).await
    }
}

async fn require_discount_tier<C: ConnectionTrait>(db: &C, tier_id: i64) -> ResultEngine<()> {
    match discount_tiers::find_by_id(db, tier_id).await? {
        Some(_) => Ok(()),
        None => Err(EngineError::NotFound(NotFound::DiscountTier(tier_id))),
    }
}

fn validate_price(price: Decimal) -> ResultEngine<()> {
    if price.is_negative() {
        return Err(EngineError::InvalidRequest(format!(
            "price must not be negative, got {price}"
        )));
    }
    Ok(())
}

fn validate_stock(stock: Option<i64>) -> ResultEngine<()> {
    match stock {
        Some(stock) if stock < 0 => Err(EngineError::InvalidRequest(format!(
            "stock must not be negative, got {stock}"
        ))),
        _ => Ok(()),
    }
}
