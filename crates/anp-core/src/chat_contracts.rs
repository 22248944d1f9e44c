use crate::fields::{deserialize_optional_text, deserialize_port, ReplyKey};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
    System,
    #[serde(other)]
    Other,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HistoryEntry {
    #[serde(rename = "type")]
    pub role: ChatRole,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub from_agent: bool,
    #[serde(default)]
    pub timestamp: ReplyKey,
}

impl HistoryEntry {
    pub fn is_agent_reply(&self) -> bool {
        self.role == ChatRole::Assistant && self.from_agent
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Bookmark {
    pub id: String,
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "deserialize_port")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub discovery: Option<String>,
}

impl Bookmark {
    pub fn has_connection_info(&self) -> bool {
        self.did.is_some() || self.url.is_some() || self.port.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentProfile {
    pub name: String,
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    pub did: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_text")]
    pub url: Option<String>,
    #[serde(default, deserialize_with = "deserialize_port")]
    pub port: Option<u16>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AgentInfo {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

impl From<&Bookmark> for AgentInfo {
    fn from(bookmark: &Bookmark) -> Self {
        Self {
            name: bookmark.name.clone(),
            did: bookmark.did.clone(),
            url: bookmark.url.clone(),
            port: bookmark.port,
        }
    }
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct SendRequest {
    pub message: String,
    #[serde(rename = "isAgentCommand", skip_serializing_if = "std::ops::Not::not")]
    pub is_agent_command: bool,
    #[serde(rename = "agentInfo", skip_serializing_if = "Option::is_none")]
    pub agent_info: Option<AgentInfo>,
    /// Ask the backend model to pick one of the bookmarks named in `message`.
    #[serde(rename = "isRecommendation", skip_serializing_if = "std::ops::Not::not")]
    pub is_recommendation: bool,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AddBookmarkRequest {
    pub name: String,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct DiscoverRequest {
    pub bookmark_id: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

/// Every chat backend reply carries `success` and, on failure, a free-text
/// `message`. Nothing else about failures is structured.
pub trait ApiReply {
    fn success(&self) -> bool;
    fn message(&self) -> Option<&str>;
}

macro_rules! api_reply {
    ($ty:ty) => {
        impl ApiReply for $ty {
            fn success(&self) -> bool {
                self.success
            }

            fn message(&self) -> Option<&str> {
                self.message.as_deref()
            }
        }
    };
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct RunningStatus {
    #[serde(default)]
    pub running: bool,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct ActionReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct SendReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub response: Option<String>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct HistoryReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub history: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct BookmarksReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub bookmarks: Vec<Bookmark>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AddBookmarkReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub bookmark: Option<Bookmark>,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DiscoverySummary {
    #[serde(default)]
    pub summary: String,
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct DiscoverReply {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub discovery: Option<DiscoverySummary>,
}

api_reply!(ActionReply);
api_reply!(SendReply);
api_reply!(HistoryReply);
api_reply!(BookmarksReply);
api_reply!(AddBookmarkReply);
api_reply!(DiscoverReply);

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct AgentCatalog {
    #[serde(default)]
    pub agents: Vec<AgentProfile>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn history_marks_agent_replies_and_tolerates_unknown_roles() {
        let reply: HistoryReply = serde_json::from_str(
            r#"{
                "success": true,
                "history": [
                    {"type": "user", "message": "@weather hi", "timestamp": 1712.5},
                    {"type": "assistant", "message": "sent", "timestamp": 1713.0},
                    {"type": "assistant", "message": "sunny", "timestamp": 1714.25, "from_agent": true},
                    {"type": "tool", "message": "trace", "timestamp": 1715}
                ]
            }"#,
        )
        .expect("history");
        assert!(reply.success());
        let replies: Vec<_> = reply
            .history
            .iter()
            .filter(|entry| entry.is_agent_reply())
            .collect();
        assert_eq!(replies.len(), 1);
        assert_eq!(replies[0].message, "sunny");
        assert_eq!(reply.history[3].role, ChatRole::Other);
    }

    #[test]
    fn bookmark_blank_fields_mean_unset() {
        let bookmark: Bookmark = serde_json::from_str(
            r#"{"id": "weather", "name": "weather", "did": "", "url": "", "port": ""}"#,
        )
        .expect("bookmark");
        assert!(!bookmark.has_connection_info());

        let configured: Bookmark = serde_json::from_str(
            r#"{"id": "w", "name": "w", "url": "http://127.0.0.1:9010", "port": 9010}"#,
        )
        .expect("configured bookmark");
        assert!(configured.has_connection_info());
        let info = AgentInfo::from(&configured);
        assert_eq!(info.port, Some(9010));
    }

    #[test]
    fn send_request_omits_agent_fields_for_plain_messages() {
        let plain = SendRequest {
            message: "hello".to_string(),
            is_agent_command: false,
            agent_info: None,
            is_recommendation: false,
        };
        assert_eq!(
            serde_json::to_value(&plain).expect("plain"),
            serde_json::json!({"message": "hello"})
        );

        let directed = SendRequest {
            message: "@w hi".to_string(),
            is_agent_command: true,
            agent_info: Some(AgentInfo {
                name: "w".to_string(),
                did: None,
                url: Some("http://h".to_string()),
                port: None,
            }),
            is_recommendation: false,
        };
        assert_eq!(
            serde_json::to_value(&directed).expect("directed"),
            serde_json::json!({
                "message": "@w hi",
                "isAgentCommand": true,
                "agentInfo": {"name": "w", "url": "http://h"}
            })
        );

        let recommendation = SendRequest {
            message: "pick one".to_string(),
            is_agent_command: false,
            agent_info: None,
            is_recommendation: true,
        };
        assert_eq!(
            serde_json::to_value(&recommendation).expect("recommendation"),
            serde_json::json!({"message": "pick one", "isRecommendation": true})
        );
    }

    #[test]
    fn failure_bodies_expose_message() {
        let reply: ActionReply =
            serde_json::from_str(r#"{"success": false, "message": "server not running"}"#)
                .expect("reply");
        assert!(!reply.success());
        assert_eq!(reply.message(), Some("server not running"));

        let bare: ActionReply = serde_json::from_str("{}").expect("bare reply");
        assert!(!bare.success());
        assert_eq!(bare.message(), None);
    }
}
