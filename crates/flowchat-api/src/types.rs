//! Request and response payloads for the chat server

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

static THINKING_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)\A<thinking>(.*?)</thinking>\n?").expect("thinking prefix pattern is valid")
});

/// One prior turn as the server sees it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    /// Build a turn, folding recorded thinking into a `<thinking>` prefix.
    pub fn new(role: Role, content: &str, thinking: &str) -> Self {
        let content = if thinking.is_empty() {
            content.to_string()
        } else {
            format!("<thinking>{}</thinking>\n{}", thinking, content)
        };
        Self { role, content }
    }

    /// Split a leading `<thinking>` block from the visible content.
    pub fn split_thinking(&self) -> (Option<&str>, &str) {
        match THINKING_PREFIX.captures(&self.content) {
            Some(caps) => {
                let whole = caps.get(0).map_or(0, |m| m.end());
                let thinking = caps.get(1).map(|m| m.as_str());
                (thinking, &self.content[whole..])
            }
            None => (None, self.content.as_str()),
        }
    }
}

/// Kind of an attached context block on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    Text,
    Image,
}

/// A context block as sent to the server. Image content is base64 text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextPayload {
    pub name: String,
    pub content: String,
    pub file_type: FileType,
}

/// Body of `POST /api/chat`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatRequest {
    pub question: String,
    pub conversation: Vec<ConversationTurn>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub contexts: Vec<ContextPayload>,
}

/// Body of `POST /api/agent_create`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentCreateRequest {
    pub conversation: Vec<ConversationTurn>,
    pub contexts: Vec<ContextPayload>,
}

/// Successful reply of `POST /api/agent_create`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentCreated {
    pub agent_uid: String,
    #[serde(default)]
    pub name: Option<String>,
}

/// Reply of `POST /api/model`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelReply {
    pub successful: bool,
    #[serde(default)]
    pub model: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
}

/// Reply of `GET /api/tags`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TagsReply {
    #[serde(default)]
    pub models: Vec<serde_json::Value>,
}

impl TagsReply {
    /// Model identifiers, whether the server lists plain strings or objects.
    pub fn model_names(&self) -> Vec<String> {
        self.models
            .iter()
            .filter_map(|m| match m {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Object(obj) => ["name", "model", "id"]
                    .iter()
                    .find_map(|k| obj.get(*k).and_then(|v| v.as_str()))
                    .map(str::to_string),
                _ => None,
            })
            .collect()
    }
}

/// The server reports failures in-band as `{"error": "..."}`.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum Reply<T> {
    Failed { error: serde_json::Value },
    Ok(T),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_turn_without_thinking_is_verbatim() {
        let turn = ConversationTurn::new(Role::User, "hello", "");
        assert_eq!(turn.content, "hello");
        assert_eq!(turn.split_thinking(), (None, "hello"));
    }

    #[test]
    fn test_turn_with_thinking_prefix() {
        let turn = ConversationTurn::new(Role::Assistant, "Hi!", "pondering");
        assert_eq!(turn.content, "<thinking>pondering</thinking>\nHi!");
        assert_eq!(turn.split_thinking(), (Some("pondering"), "Hi!"));
    }

    #[test]
    fn test_split_thinking_multiline() {
        let turn = ConversationTurn {
            role: Role::Assistant,
            content: "<thinking>a\nb</thinking>\nanswer".into(),
        };
        assert_eq!(turn.split_thinking(), (Some("a\nb"), "answer"));
    }

    #[test]
    fn test_split_thinking_ignores_inner_tag() {
        let turn = ConversationTurn {
            role: Role::Assistant,
            content: "see <thinking>x</thinking>".into(),
        };
        assert_eq!(turn.split_thinking(), (None, "see <thinking>x</thinking>"));
    }

    #[test]
    fn test_chat_request_omits_missing_model() {
        let req = ChatRequest {
            question: "q".into(),
            conversation: vec![],
            model: None,
            contexts: vec![ContextPayload {
                name: "CONTEXT".into(),
                content: "body".into(),
                file_type: FileType::Text,
            }],
        };
        let json = serde_json::to_value(&req).unwrap();
        assert!(json.get("model").is_none());
        assert_eq!(json["contexts"][0]["file_type"], "text");
    }

    #[test]
    fn test_reply_error_body() {
        let reply: Reply<AgentCreated> =
            serde_json::from_str(r#"{"error": "no model"}"#).unwrap();
        assert!(matches!(reply, Reply::Failed { ref error } if error == "no model"));

        let reply: Reply<AgentCreated> =
            serde_json::from_str(r#"{"error": {"message": "no model"}}"#).unwrap();
        assert!(matches!(reply, Reply::Failed { ref error } if error["message"] == "no model"));

        let reply: Reply<AgentCreated> =
            serde_json::from_str(r#"{"agent_uid": "a1", "name": "Helper", "successful": true}"#)
                .unwrap();
        assert!(matches!(reply, Reply::Ok(AgentCreated { ref agent_uid, .. }) if agent_uid == "a1"));
    }

    #[test]
    fn test_tags_model_names() {
        let tags: TagsReply = serde_json::from_str(
            r#"{"models": ["llama3", {"name": "qwen"}, {"id": "gpt"}, 42], "successful": true}"#,
        )
        .unwrap();
        assert_eq!(tags.model_names(), vec!["llama3", "qwen", "gpt"]);
    }
}
