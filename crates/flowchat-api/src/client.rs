//! HTTP client for the chat server

use std::time::Duration;

use serde::{Serialize, de::DeserializeOwned};

use crate::{
    error::{Error, Result},
    stream::{ChunkStream, decode_stream},
    types::{AgentCreateRequest, AgentCreated, ChatRequest, ModelReply, Reply, TagsReply},
};

/// Connection settings for [`ChatClient`]
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Server root, e.g. `http://localhost:8000`
    pub base_url: String,
    /// Timeout for non-streaming calls. Chat streams are never timed out.
    pub request_timeout: Duration,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            request_timeout: Duration::from_secs(60),
        }
    }
}

/// Client for the `/api/*` endpoints
#[derive(Debug, Clone)]
pub struct ChatClient {
    client: reqwest::Client,
    config: ClientConfig,
}

impl ChatClient {
    /// Create a client for the given configuration
    pub fn new(config: ClientConfig) -> Result<Self> {
        if config.base_url.trim().is_empty() {
            return Err(Error::InvalidConfig("base_url is empty".to_string()));
        }
        Ok(Self {
            client: reqwest::Client::new(),
            config,
        })
    }

    /// Create a client for a server root with default timeouts
    pub fn with_base_url(base_url: impl Into<String>) -> Result<Self> {
        Self::new(ClientConfig {
            base_url: base_url.into(),
            ..Default::default()
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    /// Open a chat stream for one user turn.
    ///
    /// Fails without yielding anything if the server rejects the request or
    /// answers with an `{"error": ...}` body instead of an event stream.
    pub async fn open_chat(&self, request: &ChatRequest) -> Result<ChunkStream> {
        let url = self.url("/api/chat");
        tracing::debug!(
            "Opening chat stream: {} prior turns, {} contexts",
            request.conversation.len(),
            request.contexts.len()
        );

        let response = self
            .client
            .post(&url)
            .header("accept", "text/event-stream")
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(status_error(status.as_u16(), &text));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok());

        if is_json(content_type) {
            let body = response.bytes().await?;
            return json_chat_reply(body.to_vec());
        }

        Ok(decode_stream(response.bytes_stream()))
    }

    /// Register an agent built from the conversation so far
    pub async fn create_agent(&self, request: &AgentCreateRequest) -> Result<AgentCreated> {
        self.post_json("/api/agent_create", request).await
    }

    /// Store the server-side model, or read it back when `model` is `None`
    pub async fn set_model(&self, model: Option<&str>) -> Result<ModelReply> {
        let reply: ModelReply = self
            .post_json("/api/model", &serde_json::json!({ "model": model }))
            .await?;
        if !reply.successful {
            return Err(Error::api(
                None,
                reply.reason.unwrap_or_else(|| "model update rejected".to_string()),
            ));
        }
        Ok(reply)
    }

    /// List the models the server can use
    pub async fn list_models(&self) -> Result<TagsReply> {
        let response = self
            .client
            .get(self.url("/api/tags"))
            .timeout(self.config.request_timeout)
            .send()
            .await?;
        parse_reply(response).await
    }

    async fn post_json<T, B>(&self, path: &str, body: &B) -> Result<T>
    where
        T: DeserializeOwned,
        B: Serialize + ?Sized,
    {
        let response = self
            .client
            .post(self.url(path))
            .timeout(self.config.request_timeout)
            .json(body)
            .send()
            .await?;
        parse_reply(response).await
    }
}

async fn parse_reply<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let text = response.text().await?;
    if !status.is_success() {
        return Err(status_error(status.as_u16(), &text));
    }
    match serde_json::from_str::<Reply<T>>(&text)? {
        Reply::Failed { error } => Err(Error::api(None, error_text(error))),
        Reply::Ok(value) => Ok(value),
    }
}

fn is_json(content_type: Option<&str>) -> bool {
    content_type.is_some_and(|ct| ct.starts_with("application/json"))
}

/// A non-2xx answer to any endpoint
fn status_error(status: u16, body: &str) -> Error {
    Error::api(Some(status), error_message(body))
}

/// Read a chat response that arrived as one JSON document.
///
/// An `{"error": ...}` document means the stream never opened; anything else
/// is decoded as chunk data.
fn json_chat_reply(body: Vec<u8>) -> Result<ChunkStream> {
    if let Ok(Reply::Failed { error }) = serde_json::from_slice::<Reply<serde_json::Value>>(&body)
    {
        return Err(Error::api(None, error_text(error)));
    }
    let once = futures::stream::iter([Ok::<_, Error>(body)]);
    Ok(decode_stream(once))
}

/// Pull the message out of an error body, falling back to the raw text.
fn error_message(body: &str) -> String {
    #[derive(serde::Deserialize)]
    struct ErrorBody {
        error: serde_json::Value,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(ErrorBody { error }) => error_text(error),
        Err(_) if body.trim().is_empty() => "empty response".to_string(),
        Err(_) => body.trim().to_string(),
    }
}

fn error_text(error: serde_json::Value) -> String {
    match error {
        serde_json::Value::String(message) => message,
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::Chunk;
    use futures::StreamExt;

    #[test]
    fn test_error_message_from_json_body() {
        assert_eq!(error_message(r#"{"error": "no such model"}"#), "no such model");
        assert_eq!(
            error_message(r#"{"error": {"code": 7}}"#),
            r#"{"code":7}"#
        );
    }

    #[test]
    fn test_error_message_plain_text() {
        assert_eq!(error_message("Internal Server Error\n"), "Internal Server Error");
        assert_eq!(error_message("  "), "empty response");
    }

    #[test]
    fn test_status_error_keeps_code_and_message() {
        let err = status_error(500, r#"{"error": "model crashed"}"#);
        assert!(matches!(
            err,
            Error::Api { status: Some(500), ref message } if message == "model crashed"
        ));
        assert!(err.is_retryable());

        let err = status_error(422, "");
        assert!(matches!(
            err,
            Error::Api { status: Some(422), ref message } if message == "empty response"
        ));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_json_content_type() {
        assert!(is_json(Some("application/json")));
        assert!(is_json(Some("application/json; charset=utf-8")));
        assert!(!is_json(Some("text/event-stream")));
        assert!(!is_json(None));
    }

    #[test]
    fn test_json_error_reply_fails_to_open() {
        let result = json_chat_reply(br#"{"error": "model not loaded"}"#.to_vec());
        assert!(matches!(
            result,
            Err(Error::Api { status: None, ref message }) if message == "model not loaded"
        ));
    }

    #[test]
    fn test_json_error_object_fails_to_open() {
        let result = json_chat_reply(br#"{"error": {"code": 503, "detail": "busy"}}"#.to_vec());
        let Err(Error::Api { status, message }) = result else {
            panic!("expected an open failure");
        };
        assert_eq!(status, None);
        assert!(message.contains("busy"));
    }

    #[tokio::test]
    async fn test_json_chunk_reply_is_decoded() {
        let body = br#"{"type":"content","text":"Hi!"}"#.to_vec();
        let mut chunks = json_chat_reply(body).unwrap();

        assert_eq!(
            chunks.next().await.unwrap().unwrap(),
            Chunk::Content { text: "Hi!".into() }
        );
        assert!(chunks.next().await.is_none());
    }

    #[test]
    fn test_reply_error_object() {
        let reply: Reply<serde_json::Value> =
            serde_json::from_str(r#"{"error": {"code": 7}}"#).unwrap();
        let Reply::Failed { error } = reply else {
            panic!("expected a failure");
        };
        assert_eq!(error_text(error), r#"{"code":7}"#);
    }

    #[test]
    fn test_url_joins_without_double_slash() {
        let client = ChatClient::with_base_url("http://localhost:8000/").unwrap();
        assert_eq!(client.url("/api/chat"), "http://localhost:8000/api/chat");
    }

    #[test]
    fn test_empty_base_url_rejected() {
        assert!(matches!(
            ChatClient::with_base_url("  "),
            Err(Error::InvalidConfig(_))
        ));
    }
}
