use std::time::Duration;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

const PONG: &str = "Pong!";

/// Health-check commands answered by the bot, with or without a `@botname`
/// suffix.
pub fn ping_reply(text: &str) -> Option<&'static str> {
    let cmd = text.split_whitespace().next()?;
    let cmd = cmd.split('@').next().unwrap_or(cmd);
    matches!(cmd, "/ping" | "!ping").then_some(PONG)
}

/// Runs the inbound long-polling dispatcher until `cancel` fires.
pub async fn run_commands(bot: Bot, cancel: CancellationToken) -> anyhow::Result<()> {
    let handler = dptree::entry().branch(Update::filter_message().endpoint(handle_message));

    let mut dispatcher = Dispatcher::builder(bot, handler).build();
    let shutdown = dispatcher.shutdown_token();

    tokio::spawn(async move {
        cancel.cancelled().await;
        // The dispatcher reports idle until it has started polling.
        for _ in 0..50 {
            match shutdown.shutdown() {
                Ok(done) => {
                    done.await;
                    return;
                }
                Err(_) => tokio::time::sleep(Duration::from_millis(100)).await,
            }
        }
        warn!("command dispatcher did not acknowledge shutdown");
    });

    dispatcher.dispatch().await;
    Ok(())
}

async fn handle_message(bot: Bot, msg: Message) -> ResponseResult<()> {
    let Some(reply) = msg.text().and_then(ping_reply) else {
        return Ok(());
    };
    debug!(chat = msg.chat.id.0, "answering ping");
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}
