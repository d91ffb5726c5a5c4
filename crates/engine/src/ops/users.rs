use crate::{EngineError, NewUser, NotFound, ResultEngine, User, users, util::resolve_timezone};

use super::Engine;

impl Engine {
    /// Registers a user with an opening balance.
    pub async fn create_user(&self, new: NewUser) -> ResultEngine<User> {
        let display_name = new.display_name.trim();
        if display_name.is_empty() {
            return Err(EngineError::InvalidRequest(
                "display name must not be empty".to_string(),
            ));
        }
        if new.balance.is_negative() {
            return Err(EngineError::InvalidRequest(format!(
                "opening balance must not be negative, got {}",
                new.balance
            )));
        }
        resolve_timezone(&new.timezone)?;
        if users::find_by_id(&self.database, new.id).await?.is_some() {
            return Err(EngineError::InvalidRequest(format!(
                "user {} already exists",
                new.id
            )));
        }

        let user = User {
            id: new.id,
            chat_id: new.chat_id,
            display_name: display_name.to_string(),
            balance: new.balance,
            timezone: new.timezone.trim().to_string(),
            created_at: self.clock.now(),
        };
        users::create(&self.database, &user).await?;
        tracing::info!(user_id = user.id, chat_id = user.chat_id, "user created");
        Ok(user)
    }

    pub async fn user(&self, user_id: i64) -> ResultEngine<User> {
        users::find_by_id(&self.database, user_id)
            .await?
            .ok_or(EngineError::NotFound(NotFound::User(user_id)))
    }
}
