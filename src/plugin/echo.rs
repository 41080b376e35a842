use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, warn};

use crate::handler::CommandPlugin;
use crate::hub::{Connector, Message};

/// `#echo ...`: repeats the message back into the group it came from
pub struct Echo {
    connector: Arc<dyn Connector>,
}

impl Echo {
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }
}

#[async_trait]
impl CommandPlugin for Echo {
    fn commands(&self) -> &[&str] {
        &["echo"]
    }

    async fn on_command(&self, _keyword: &str, message: &Message) -> bool {
        if !message.is_group() {
            warn!("Echo ignored message {} outside a group", message.msg_id);
            return true;
        }
        let gid = message.gid.as_deref().unwrap_or_default();

        if let Err(e) = self.connector.send_text(gid, &message.content).await {
            error!("Echo failed to reply in group {}: {}", gid, e);
        }
        true
    }
}
