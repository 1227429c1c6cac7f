//! Message relay - forwards Telegram chat to Gemini and back.

pub mod engine;
pub mod gemini;
pub mod history;
pub mod split;
pub mod telegram;


pub use engine::RelayEngine;
pub use gemini::{CompletionClient, GeminiClient, ImagePayload};
pub use history::{Role, Turn};
pub use telegram::{ChatTransport, TelegramTransport};
