use async_trait::async_trait;
use tracing::info;

use crate::hub::{Message, MessageHandler};

/// A plugin reachable through `<prefix><keyword>` messages
#[async_trait]
pub trait CommandPlugin: Send + Sync {
    /// Keywords this plugin answers to, in priority order.
    fn commands(&self) -> &[&str];

    /// Returns true when the plugin handled the command.
    async fn on_command(&self, keyword: &str, message: &Message) -> bool;
}

/// Routes prefixed messages to the first plugin declaring the keyword.
///
/// The keyword is the text between the prefix and the first space, or the
/// first newline, so both `#cmd args` and `#cmd\nbody` work.
pub struct CommandRouter {
    prefix: String,
    plugins: Vec<Box<dyn CommandPlugin>>,
}

impl CommandRouter {
    pub fn new(prefix: impl Into<String>, plugins: Vec<Box<dyn CommandPlugin>>) -> Self {
        Self {
            prefix: prefix.into(),
            plugins,
        }
    }
}

fn first_token(text: &str, separator: char) -> &str {
    text.split_once(separator).map_or(text, |(token, _)| token)
}

#[async_trait]
impl MessageHandler for CommandRouter {
    async fn handle(&self, message: &Message) -> bool {
        let Some(rest) = message.content.strip_prefix(self.prefix.as_str()) else {
            return false;
        };
        let by_space = first_token(rest, ' ');
        let by_newline = first_token(rest, '\n');

        for plugin in &self.plugins {
            let matched = plugin
                .commands()
                .iter()
                .find_map(|&key| {
                    if key == by_space {
                        Some(by_space)
                    } else if key == by_newline {
                        Some(by_newline)
                    } else {
                        None
                    }
                });

            // Only the first matching keyword of a plugin is tried
            if let Some(keyword) = matched {
                info!("Command '{}' from message {}", keyword, message.msg_id);
                if plugin.on_command(keyword, message).await {
                    return true;
                }
            }
        }
        false
    }
}
