use serde::{Deserialize, Serialize};

/// A chat participant: the bot itself or any group member
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Member {
    #[serde(rename = "wxId")]
    pub id: String,
    #[serde(rename = "nickName")]
    pub nick_name: String,
}

/// A member as seen from inside one group
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupMember {
    #[serde(flatten)]
    pub member: Member,
    /// Per-group display name override, empty when unset
    #[serde(rename = "displayName", default)]
    pub display_name: String,
}
