use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use log::{error, info, warn};
use teloxide::{
    prelude::*,
    types::{ParseMode, Recipient},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("Telegram token or chat ID not configured")]
    MissingCredentials,
    #[error("Telegram API error: {0}")]
    Api(#[from] teloxide::RequestError),
}

/// Something that can put a message in front of a human.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn deliver(&self, text: &str) -> Result<(), DeliveryError>;
}

pub struct TelegramTransport {
    bot: Bot,
    recipient: Option<Recipient>,
}

impl TelegramTransport {
    pub fn new(token: &str, chat_id: &str, timeout: Duration) -> Result<TelegramTransport> {
        let client = teloxide::net::default_reqwest_settings()
            .timeout(timeout)
            .build()?;
        Ok(TelegramTransport {
            bot: Bot::with_client(token, client),
            recipient: parse_recipient(chat_id),
        })
    }
}

/// Numeric ids address chats directly, anything else is a channel username.
fn parse_recipient(chat_id: &str) -> Option<Recipient> {
    let chat_id = chat_id.trim();
    if chat_id.is_empty() {
        return None;
    }
    Some(match chat_id.parse::<i64>() {
        Ok(id) => Recipient::Id(ChatId(id)),
        Err(_) => Recipient::ChannelUsername(chat_id.to_owned()),
    })
}

#[async_trait]
impl Transport for TelegramTransport {
    async fn deliver(&self, text: &str) -> Result<(), DeliveryError> {
        let recipient = self
            .recipient
            .clone()
            .ok_or(DeliveryError::MissingCredentials)?;
        if self.bot.token().is_empty() {
            return Err(DeliveryError::MissingCredentials);
        }
        self.bot
            .send_message(recipient, text)
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(())
    }
}

/// Best-effort delivery with a running count of confirmed sends.
pub struct Notifier {
    transport: Box<dyn Transport>,
    messages_sent: u64,
    delay: Duration,
}

impl Notifier {
    pub fn new(transport: Box<dyn Transport>, delay: Duration) -> Notifier {
        Notifier {
            transport,
            messages_sent: 0,
            delay,
        }
    }

    pub fn messages_sent(&self) -> u64 {
        self.messages_sent
    }

    /// Never fails: delivery problems are logged and reported as `false`.
    pub async fn send(&mut self, message: &str) -> bool {
        match self.transport.deliver(message).await {
            Ok(()) => {
                self.messages_sent += 1;
                info!("Message sent to Telegram successfully (#{})", self.messages_sent);
                true
            }
            Err(e) => {
                error!("Error sending Telegram message: {}", e);
                false
            }
        }
    }

    /// Sends messages one after another, pausing between them to stay under
    /// Telegram's rate limits. Returns the delivery outcome of each message.
    pub async fn send_all(&mut self, messages: &[String]) -> Vec<bool> {
        let mut outcomes = Vec::with_capacity(messages.len());
        for (i, message) in messages.iter().enumerate() {
            if i > 0 && !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            outcomes.push(self.send(message).await);
        }
        let failed = outcomes.iter().filter(|ok| !**ok).count();
        if failed > 0 {
            warn!("{} of {} messages could not be delivered", failed, messages.len());
        }
        outcomes
    }
}
