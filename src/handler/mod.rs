pub mod command;

use async_trait::async_trait;
use tracing::debug;

use crate::hub::{Message, MessageHandler};

pub use command::{CommandPlugin, CommandRouter};

/// Ordered handler chain; the first handler to claim a message ends dispatch.
pub struct Dispatcher {
    handlers: Vec<Box<dyn MessageHandler>>,
}

impl Dispatcher {
    pub fn new(handlers: Vec<Box<dyn MessageHandler>>) -> Self {
        Self { handlers }
    }
}

#[async_trait]
impl MessageHandler for Dispatcher {
    async fn handle(&self, message: &Message) -> bool {
        for handler in &self.handlers {
            if handler.handle(message).await {
                return true;
            }
        }
        // Most traffic is ordinary chat, not commands
        debug!("No handler claimed message {}", message.msg_id);
        false
    }
}
