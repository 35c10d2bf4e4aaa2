//! Telegram adapter (teloxide).
//!
//! This crate implements the `cvewatch-core` MessagingPort over the Telegram
//! Bot API, plus the small inbound command router.

use std::time::Duration;

use async_trait::async_trait;
use teloxide::{prelude::*, types::ParseMode, ApiError, RequestError};
use tokio::time::sleep;
use tracing::{info, warn};

pub mod router;

use cvewatch_core::{
    domain::RecipientId,
    errors::Error,
    formatting::markdown_bold_to_html,
    messaging::{port::MessagingPort, types::MessagingCapabilities},
    Result,
};

/// Telegram caps messages at 4096 characters; escaping can grow the text,
/// so renders are cut a little earlier.
const SAFE_MESSAGE_LEN: usize = 4000;

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
    ready_retry: Duration,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self {
            bot,
            ready_retry: Duration::from_secs(5),
        }
    }

    pub fn bot(&self) -> Bot {
        self.bot.clone()
    }

    fn tg_chat(recipient: &RecipientId) -> Result<teloxide::types::ChatId> {
        recipient
            .0
            .trim()
            .parse::<i64>()
            .map(teloxide::types::ChatId)
            .map_err(|_| {
                Error::Config(format!(
                    "telegram recipient must be a numeric chat id, got '{recipient}'"
                ))
            })
    }

    fn map_err(e: RequestError) -> Error {
        match e {
            RequestError::Api(ApiError::NotFound) => {
                Error::Unauthorized("telegram rejected the bot token".to_string())
            }
            other => Error::External(format!("telegram error: {other}")),
        }
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    fn capabilities(&self) -> MessagingCapabilities {
        MessagingCapabilities {
            max_message_len: SAFE_MESSAGE_LEN,
        }
    }

    async fn wait_until_ready(&self) -> Result<()> {
        loop {
            match self.bot.get_me().await {
                Ok(me) => {
                    info!("logged in to Telegram as @{}", me.username());
                    return Ok(());
                }
                Err(RequestError::Api(ApiError::NotFound)) => {
                    return Err(Error::Unauthorized(
                        "telegram rejected the bot token".to_string(),
                    ));
                }
                Err(e) => {
                    warn!("telegram not reachable yet: {e}");
                    sleep(self.ready_retry).await;
                }
            }
        }
    }

    async fn send_text(&self, recipient: &RecipientId, text: &str) -> Result<()> {
        let chat = Self::tg_chat(recipient)?;
        let html = markdown_bold_to_html(text);

        self.with_retry(|| {
            self.bot
                .send_message(chat, html.clone())
                .parse_mode(ParseMode::Html)
        })
        .await?;
        Ok(())
    }
}
