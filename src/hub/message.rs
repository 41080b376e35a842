use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One inbound event from the assistant stream.
///
/// Built once per decoded `data:` frame and never mutated afterwards;
/// handlers receive it by reference.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "msgType", default)]
    pub msg_type: i32,
    #[serde(default)]
    pub time: i64,
    #[serde(rename = "msgID", default)]
    pub msg_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gid: Option<String>,
    #[serde(rename = "groupName", default, skip_serializing_if = "Option::is_none")]
    pub group_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(rename = "wechatName", default, skip_serializing_if = "Option::is_none")]
    pub wechat_name: Option<String>,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quote: Option<Quote>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub at: Option<At>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revoke: Option<Revoke>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media: Option<Media>,
    #[serde(default)]
    pub event: String,
    /// Event-specific payload, see [`Message::event_data`]
    #[serde(default)]
    pub data: Value,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    #[serde(rename = "msgID")]
    pub msg_id: String,
    pub uid: String,
    pub name: String,
    pub bot: bool,
    pub content: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct At {
    pub uid: String,
    pub name: String,
    pub bot: bool,
    /// Character offset of the mention inside `content`
    pub offset: usize,
    pub length: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Revoke {
    #[serde(rename = "oldMsgID")]
    pub old_msg_id: String,
    #[serde(rename = "replaceMsg")]
    pub replace_msg: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Media {
    pub filename: String,
    /// URL, or an inline `BASE64:` marker
    pub src: String,
    pub size: String,
}

/// Payload of a "user left the group" event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitGroupUser {
    pub uid: String,
    pub name: String,
}

impl Message {
    pub fn is_group(&self) -> bool {
        self.gid.as_deref().is_some_and(|gid| !gid.is_empty())
    }

    /// Decode the event payload carried in `data`.
    pub fn event_data<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.data.clone())
            .with_context(|| format!("Failed to decode payload of event '{}'", self.event))
    }
}
