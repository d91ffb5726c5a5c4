use crate::{ResultEngine, chat_configs, util::normalize_required_text};

use super::Engine;

impl Engine {
    /// Name of the chat's currency, or
    /// [`DEFAULT_CURRENCY_NAME`](chat_configs::DEFAULT_CURRENCY_NAME) when
    /// none was set.
    pub async fn currency_name(&self, chat_id: i64) -> ResultEngine<String> {
        Ok(chat_configs::find_currency_name(&self.database, chat_id)
            .await?
            .unwrap_or_else(|| chat_configs::DEFAULT_CURRENCY_NAME.to_string()))
    }

    pub async fn set_currency_name(&self, chat_id: i64, name: &str) -> ResultEngine<String> {
        let name = normalize_required_text(name, "currency name")?;
        chat_configs::upsert_currency_name(&self.database, chat_id, &name, self.clock.now())
            .await?;
        tracing::info!(chat_id, currency = %name, "currency name set");
        Ok(name)
    }
}
