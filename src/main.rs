mod config;
mod error;
mod relay;

use std::sync::Arc;

use teloxide::net::Download;
use teloxide::prelude::*;
use teloxide::types::FileId;
use teloxide::utils::command::BotCommands;
use tracing::{error, info};
use tracing_subscriber::prelude::*;

use config::Config;
use error::RelayError;
use relay::{GeminiClient, RelayEngine, TelegramTransport};

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase")]
enum Command {
    #[command(description = "show the welcome message")]
    Start,
    #[command(description = "get help on how to use the bot")]
    Help,
    #[command(description = "clear conversation history")]
    Clear,
}

#[tokio::main]
async fn main() {
    // Local development convenience; production supplies real env vars.
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stdout)
                .with_filter(
                    tracing_subscriber::EnvFilter::from_default_env()
                        .add_directive(tracing::Level::INFO.into()),
                ),
        )
        .init();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => {
            // Operator-facing: missing credentials must never reach chat users.
            eprintln!("configuration error: {e}");
            std::process::exit(1);
        }
    };

    let bot = Bot::new(&config.telegram_bot_token);

    let completion = Arc::new(GeminiClient::new(
        config.gemini_api_key.clone(),
        config.gemini_model.clone(),
        config.request_timeout,
    ));
    let transport = Arc::new(TelegramTransport::new(bot.clone()));
    let engine = Arc::new(RelayEngine::new(
        config.history_cap,
        config.chunk_limit,
        completion,
        transport,
    ));

    info!(
        "🚀 Starting Limlo Study Bot (model: {}, history cap: {}, chunk limit: {})",
        config.gemini_model, config.history_cap, config.chunk_limit
    );

    let handler = Update::filter_message()
        .branch(
            dptree::entry()
                .filter_command::<Command>()
                .endpoint(handle_command),
        )
        .branch(dptree::filter(|msg: Message| msg.photo().is_some()).endpoint(handle_photo))
        .branch(dptree::filter(|msg: Message| msg.text().is_some()).endpoint(handle_text));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![engine])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;
}

async fn handle_command(
    msg: Message,
    cmd: Command,
    engine: Arc<RelayEngine>,
) -> ResponseResult<()> {
    let chat_id = msg.chat.id.0;
    let result = match cmd {
        Command::Start => engine.handle_start(chat_id).await,
        Command::Help => engine.handle_help(chat_id).await,
        Command::Clear => engine.handle_clear(chat_id).await,
    };

    if let Err(e) = result {
        error!("Command handler failed for chat {chat_id}: {e}");
    }
    Ok(())
}

async fn handle_text(msg: Message, engine: Arc<RelayEngine>) -> ResponseResult<()> {
    let chat_id = msg.chat.id.0;
    let Some(text) = msg.text() else {
        return Ok(());
    };

    if let Err(e) = engine.handle_text(chat_id, text).await {
        error!("Text handler failed for chat {chat_id}: {e}");
    }
    Ok(())
}

async fn handle_photo(bot: Bot, msg: Message, engine: Arc<RelayEngine>) -> ResponseResult<()> {
    let chat_id = msg.chat.id.0;
    let Some(sizes) = msg.photo() else {
        return Ok(());
    };
    // Telegram orders sizes smallest first; take the highest resolution.
    let Some(photo) = sizes.last() else {
        return Ok(());
    };

    let bytes = match download_photo(&bot, photo.file.id.clone()).await {
        Ok(bytes) => bytes,
        Err(e) => {
            error!("Photo download failed for chat {chat_id}: {e}");
            bot.send_message(
                msg.chat.id,
                "😔 Sorry, I couldn't fetch that image. Please try sending it again.",
            )
            .await
            .ok();
            return Ok(());
        }
    };

    if let Err(e) = engine.handle_photo(chat_id, bytes, msg.caption()).await {
        error!("Photo handler failed for chat {chat_id}: {e}");
    }
    Ok(())
}

async fn download_photo(bot: &Bot, file_id: FileId) -> Result<Vec<u8>, RelayError> {
    let file = bot
        .get_file(file_id)
        .await
        .map_err(|e| RelayError::Upstream(format!("Failed to get file info: {e}")))?;

    let mut data = Vec::new();
    bot.download_file(&file.path, &mut data)
        .await
        .map_err(|e| RelayError::Upstream(format!("Failed to download file: {e}")))?;

    Ok(data)
}
