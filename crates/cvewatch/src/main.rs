use std::sync::Arc;

use teloxide::Bot;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use cvewatch_core::{
    config::{Config, TransportKind},
    feed::{FeedSource, NvdClient},
    messaging::{
        port::MessagingPort,
        throttled::{ThrottleConfig, ThrottledMessenger},
    },
    poller::{Poller, PollerSettings},
    watermark::WatermarkStore,
};
use cvewatch_discord::{DiscordMessenger, DiscordSettings};
use cvewatch_telegram::TelegramMessenger;

#[tokio::main]
async fn main() -> Result<(), cvewatch_core::Error> {
    cvewatch_core::logging::init("cvewatch")?;

    let cfg = Arc::new(Config::load()?);
    let store = WatermarkStore::open(&cfg.state_dir, &cfg.watermark_file)?;
    let feed: Arc<dyn FeedSource> = Arc::new(NvdClient::new(cfg.feed_settings())?);
    info!(
        transport = ?cfg.transport,
        watermark = %store.path().display(),
        "cvewatch starting"
    );

    let cancel = CancellationToken::new();
    let raw_messenger: Arc<dyn MessagingPort> = match cfg.transport {
        TransportKind::Telegram => {
            let bot = Bot::new(cfg.bot_token.clone());
            let router_cancel = cancel.clone();
            let router_bot = bot.clone();
            tokio::spawn(async move {
                if let Err(e) = cvewatch_telegram::router::run_commands(router_bot, router_cancel).await
                {
                    error!("command router stopped: {e}");
                }
            });
            Arc::new(TelegramMessenger::new(bot))
        }
        TransportKind::Discord => Arc::new(DiscordMessenger::new(DiscordSettings::new(
            cfg.bot_token.clone(),
        ))?),
    };
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig {
            min_send_interval: cfg.min_send_interval,
        },
    ));

    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => info!("shutdown requested"),
                Err(e) => warn!("cannot listen for ctrl-c: {e}"),
            }
            cancel.cancel();
        });
    }

    let mut poller = Poller::new(PollerSettings::from_config(&cfg), feed, messenger, store);
    poller.run(cancel).await;
    info!("cvewatch stopped");
    Ok(())
}
