//! Telegram send-side client using teloxide.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::MessageId;
use tracing::warn;

use crate::error::RelayError;

/// Narrow seam over the bot platform's send API so tests can substitute a
/// recording fake.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Send a text message; returns the platform message id.
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<i64, RelayError>;

    /// Delete a previously sent message.
    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), RelayError>;
}

pub struct TelegramTransport {
    bot: Bot,
}

impl TelegramTransport {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }
}

#[async_trait]
impl ChatTransport for TelegramTransport {
    async fn send_text(&self, chat_id: i64, text: &str) -> Result<i64, RelayError> {
        self.bot
            .send_message(ChatId(chat_id), text)
            .await
            .map(|msg| msg.id.0 as i64)
            .map_err(|e| {
                let msg = format!("Failed to send: {e}");
                warn!("{}", msg);
                RelayError::Upstream(msg)
            })
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), RelayError> {
        self.bot
            .delete_message(ChatId(chat_id), MessageId(message_id as i32))
            .await
            .map_err(|e| {
                let msg = format!("Failed to delete message: {e}");
                warn!("{}", msg);
                RelayError::Upstream(msg)
            })?;

        Ok(())
    }
}
