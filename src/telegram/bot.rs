//! Bot instance creation and the command set.

use reqwest::ClientBuilder;
use secrecy::ExposeSecret;
use teloxide::prelude::*;
use teloxide::types::BotCommand;
use teloxide::utils::command::BotCommands;

use crate::core::config::{self, Config};

#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Commands:")]
pub enum Command {
    #[command(description = "start the bot or open a shared video")]
    Start(String),
    #[command(description = "show this help")]
    Help,
    #[command(description = "show a collection and its videos")]
    Collection(String),
    #[command(description = "archive a video from a URL (admins)")]
    Upload(String),
    #[command(description = "list running downloads (admins)")]
    Jobs,
    #[command(description = "cancel a running download (admins)")]
    Cancel(String),
    #[command(description = "catalog statistics (admins)")]
    Stats,
}

/// Creates the Bot with upload-friendly timeouts and an optional custom API URL.
pub fn create_bot(config: &Config) -> anyhow::Result<Bot> {
    let client = ClientBuilder::new()
        .connect_timeout(config::upload::connect_timeout())
        .timeout(config::upload::request_timeout())
        .build()?;

    let bot = Bot::with_client(config.bot_token.expose_secret(), client);
    let bot = match &config.bot_api_url {
        Some(raw) => {
            log::info!("Using custom Bot API URL: {}", raw);
            let url = url::Url::parse(raw).map_err(|e| anyhow::anyhow!("Invalid BOT_API_URL: {}", e))?;
            bot.set_api_url(url)
        }
        None => bot,
    };
    Ok(bot)
}

/// Publishes the public commands in the Telegram UI.
pub async fn setup_bot_commands(bot: &Bot) -> Result<(), teloxide::RequestError> {
    bot.set_my_commands(vec![
        BotCommand::new("start", "start the bot"),
        BotCommand::new("help", "show help"),
        BotCommand::new("collection", "show a collection"),
    ])
    .await?;
    Ok(())
}
