//! Messaging platform integration (Telegram).

pub mod telegram;
pub mod traits;
pub mod update;

pub use telegram::TelegramClient;
pub use traits::{BotProfile, PlatformApi, PlatformError, SendOptions};
pub use update::{Chat, Message, MessageEntity, Update, User};

use std::sync::Arc;

use crate::config::RouteConfig;

/// Create the platform client used by the gateway.
pub fn create_platform(config: Arc<RouteConfig>) -> Arc<dyn PlatformApi> {
    Arc::new(TelegramClient::new(config))
}
