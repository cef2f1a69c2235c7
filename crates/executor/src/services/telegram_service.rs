use common::config::TelegramConfig;
use common::events::SignalEvent;
use teloxide::prelude::*;
use tokio::sync::broadcast;
use tracing::{error, info};

/// Forwards every signal event to one Telegram chat.
pub struct TelegramService {
    bot: Bot,
    chat_id: ChatId,
}

impl TelegramService {
    pub fn new(config: &TelegramConfig) -> Self {
        Self {
            bot: Bot::new(config.token.clone()),
            chat_id: ChatId(config.chat_id),
        }
    }

    pub async fn start(self, mut rx: broadcast::Receiver<SignalEvent>) {
        info!("Starting Telegram Notification Service");

        loop {
            match rx.recv().await {
                Ok(event) => {
                    // A failed send is logged and dropped.
                    if let Err(e) = self.bot.send_message(self.chat_id, event.to_string()).await {
                        error!("Failed to send Telegram message: {}", e);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    error!("Telegram service lagged behind. Missed {} events.", n);
                }
                Err(broadcast::error::RecvError::Closed) => {
                    info!("Signal event channel closed. Stopping Telegram service.");
                    break;
                }
            }
        }
    }
}
