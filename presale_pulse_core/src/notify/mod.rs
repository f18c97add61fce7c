// Notification fan-out: one payload, N independent channels.

mod telegram;
mod x_feed;

pub use telegram::TelegramChannel;
pub use x_feed::XChannel;

use crate::error::CoreError;
use crate::models::NotificationPayload;
use async_trait::async_trait;
use log::{error, info};
use tokio::time::{timeout, Duration};

/// An external notification destination.
#[async_trait(?Send)]
pub trait Channel {
    fn name(&self) -> &'static str;
    async fn send(&self, payload: &NotificationPayload) -> Result<(), CoreError>;
}

/// Attempts every channel in the caller-given order, each under its own
/// timeout. A failing or hanging channel is logged and never suppresses
/// the remaining ones. No retries; channels own their own retry policy.
pub struct Dispatcher {
    channels: Vec<Box<dyn Channel>>,
    per_channel_timeout: Duration,
}

impl Dispatcher {
    pub fn new(channels: Vec<Box<dyn Channel>>, per_channel_timeout: Duration) -> Self {
        Self {
            channels,
            per_channel_timeout,
        }
    }

    pub async fn dispatch(&self, payload: &NotificationPayload) {
        for channel in &self.channels {
            match timeout(self.per_channel_timeout, channel.send(payload)).await {
                Ok(Ok(())) => info!("notification delivered via {}", channel.name()),
                Ok(Err(e)) => error!("{} delivery failed: {}", channel.name(), e),
                Err(_) => error!(
                    "{} delivery timed out after {:?}",
                    channel.name(),
                    self.per_channel_timeout
                ),
            }
        }
    }
}
