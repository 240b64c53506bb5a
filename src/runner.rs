//! Process wiring: builds the collaborators, checks the Telegram token, then
//! feeds long-polling updates into the [`Dispatcher`] until the stream ends or
//! Ctrl-C is pressed.

use crate::bot::commands::Command;
use crate::bot::{
    CandidateCache, Dispatcher, EventHandler, InboundEvent, MessageSender, TelegramTransport,
};
use crate::config::{Settings, CANDIDATE_CACHE_MAX_SIZE};
use crate::media::{Downloader, WorkspaceManager, YoutubeSearch, YtDlpExtractor};
use anyhow::{Context, Result};
use futures_util::StreamExt;
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{Update, UpdateKind};
use teloxide::update_listeners::{polling_default, AsUpdateStream};
use teloxide::utils::command::BotCommands;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Run the bot until the update stream ends or shutdown is requested.
///
/// # Errors
///
/// Returns an error if a client cannot be built or the Telegram handshake fails.
pub async fn run(settings: Arc<Settings>) -> Result<()> {
    let proxy = settings.proxy().context("Invalid proxy URL")?;
    if proxy.is_some() {
        info!("Outbound traffic goes through the configured proxy");
    }

    let bot = init_bot(&settings, proxy.clone())?;
    let me = bot
        .get_me()
        .await
        .context("Telegram handshake (getMe) failed")?;
    info!(username = %me.username(), "Authorized on Telegram");

    register_commands(&bot).await;

    let handler = init_handler(&settings, bot.clone(), proxy)?;
    let dispatcher = Dispatcher::new(handler, settings.concurrency);

    let shutdown = CancellationToken::new();
    spawn_ctrl_c_listener(shutdown.clone());

    info!(concurrency = settings.concurrency, "Bot is running...");

    let username = me.username().to_string();
    let mut listener = polling_default(bot.clone()).await;
    let events = listener.as_stream().filter_map(|result| {
        let bot = bot.clone();
        let username = username.clone();
        async move {
            match result {
                Ok(update) => Some(classify(&bot, &update, &username)),
                Err(e) => {
                    warn!(error = %e, "Failed to fetch updates");
                    None
                }
            }
        }
    });

    dispatcher.run(events, shutdown).await;
    info!("Bot stopped");
    Ok(())
}

fn init_bot(settings: &Settings, proxy: Option<reqwest::Proxy>) -> Result<Bot> {
    let token = settings.telegram_token.clone();
    let Some(proxy) = proxy else {
        return Ok(Bot::new(token));
    };

    let client = teloxide::net::default_reqwest_settings()
        .proxy(proxy)
        .build()
        .context("Failed to build Telegram HTTP client")?;
    Ok(Bot::with_client(token, client))
}

fn init_handler(
    settings: &Settings,
    bot: Bot,
    proxy: Option<reqwest::Proxy>,
) -> Result<EventHandler> {
    let sender = MessageSender::new(Arc::new(TelegramTransport::new(bot)));

    let search = YoutubeSearch::new(&settings.youtube_token, proxy)
        .context("Failed to build search client")?;

    let root = settings
        .downloads_root()
        .context("Failed to resolve downloads directory")?;
    info!(path = %root.display(), "Downloads root");

    let extractor = YtDlpExtractor::new(&settings.ytdlp_path, settings.extractor_timeout());
    let downloader = Downloader::new(
        sender.clone(),
        Arc::new(extractor),
        WorkspaceManager::new(root),
    );

    info!(
        "Initializing CandidateCache (ttl: {}s, max_size: {})",
        settings.candidate_cache_ttl_secs, CANDIDATE_CACHE_MAX_SIZE
    );
    let candidates = CandidateCache::new(settings.candidate_cache_ttl(), CANDIDATE_CACHE_MAX_SIZE);

    Ok(EventHandler::new(sender, Arc::new(search), downloader, candidates))
}

async fn register_commands(bot: &Bot) {
    match bot.set_my_commands(Command::bot_commands()).await {
        Ok(_) => debug!("Bot commands registered"),
        Err(e) => warn!(error = %e, "Failed to register bot commands"),
    }
}

/// Classify an update, acknowledging button presses on the way
fn classify(bot: &Bot, update: &Update, username: &str) -> InboundEvent {
    if let UpdateKind::CallbackQuery(q) = &update.kind {
        let bot = bot.clone();
        let id = q.id.clone();
        tokio::spawn(async move {
            if let Err(e) = bot.answer_callback_query(id).await {
                warn!(error = %e, "Failed to answer callback query");
            }
        });
    }
    InboundEvent::from_update(update, username)
}

fn spawn_ctrl_c_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("Ctrl-C received, shutting down");
                shutdown.cancel();
            }
            Err(e) => warn!(error = %e, "Failed to listen for Ctrl-C"),
        }
    });
}
