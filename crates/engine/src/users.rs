//! Users and their balances.
//!
//! The balance is stored as canonical decimal text and is only ever changed
//! through [`update_balance`], which applies a delta with a compare-and-swap
//! on the stored value.

use chrono::{DateTime, Utc};
use sea_orm::{ActiveValue, QueryFilter, entity::prelude::*, sea_query::Expr};
use serde::{Deserialize, Serialize};

use crate::{Decimal, EngineError, NotFound, ResultEngine};

const BALANCE_CAS_ATTEMPTS: usize = 3;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    /// Chat the user belongs to; selects the chat-local catalog.
    pub chat_id: i64,
    pub display_name: String,
    pub balance: Decimal,
    pub timezone: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: i64,
    pub chat_id: i64,
    pub display_name: String,
    pub timezone: String,
    pub balance: String,
    pub created_at: DateTimeUtc,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<&User> for ActiveModel {
    fn from(user: &User) -> Self {
        Self {
            id: ActiveValue::Set(user.id),
            chat_id: ActiveValue::Set(user.chat_id),
            display_name: ActiveValue::Set(user.display_name.clone()),
            timezone: ActiveValue::Set(user.timezone.clone()),
            balance: ActiveValue::Set(user.balance.to_string()),
            created_at: ActiveValue::Set(user.created_at),
        }
    }
}

impl TryFrom<Model> for User {
    type Error = EngineError;

    fn try_from(model: Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: model.id,
            chat_id: model.chat_id,
            display_name: model.display_name,
            balance: Decimal::parse(&model.balance)?,
            timezone: model.timezone,
            created_at: model.created_at,
        })
    }
}

pub async fn find_by_id<C: ConnectionTrait>(db: &C, id: i64) -> ResultEngine<Option<User>> {
    Entity::find_by_id(id)
        .one(db)
        .await?
        .map(User::try_from)
        .transpose()
}

pub async fn create<C: ConnectionTrait>(db: &C, user: &User) -> ResultEngine<()> {
    ActiveModel::from(user).insert(db).await?;
    Ok(())
}

/// Adds `delta` to the balance of user `id` and returns the new balance.
///
/// A debit that would leave the balance negative fails with
/// [`EngineError::InsufficientFunds`]. The write only lands if the stored
/// balance is still the one the new value was computed from; a concurrent
/// writer makes the update retry against the fresh value.
pub async fn update_balance<C: ConnectionTrait>(
    db: &C,
    id: i64,
    delta: Decimal,
) -> ResultEngine<Decimal> {
    for _ in 0..BALANCE_CAS_ATTEMPTS {
        let model = Entity::find_by_id(id)
            .one(db)
            .await?
            .ok_or(EngineError::NotFound(NotFound::User(id)))?;
        let current = Decimal::parse(&model.balance)?;
        let next = current.checked_add(delta)?;
        if delta.is_negative() && next.is_negative() {
            return Err(EngineError::InsufficientFunds {
                balance: current,
                required: -delta,
            });
        }

        let res = Entity::update_many()
            .col_expr(Column::Balance, Expr::value(next.to_string()))
            .filter(Column::Id.eq(id))
            .filter(Column::Balance.eq(model.balance))
            .exec(db)
            .await?;
        if res.rows_affected == 1 {
            return Ok(next);
        }
        tracing::debug!(user_id = id, "balance changed concurrently, retrying");
    }

    Err(EngineError::TransactionFailure(format!(
        "balance of user {id} kept changing concurrently"
    )))
}
