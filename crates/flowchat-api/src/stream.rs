//! Response chunks and the SSE frame decoder that produces them

use crate::error::{Error, Result};
use crate::types::ConversationTurn;
use async_stream::stream;
use futures::StreamExt;
use serde::Deserialize;
use std::pin::Pin;
use tokio_stream::Stream;

/// One decoded unit of a chat response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Chunk {
    /// Incremental answer text
    Content { text: String },
    /// Incremental reasoning text
    Thinking { text: String },
    /// End of turn, carrying the server's view of the conversation
    Conversation { conversation: Vec<ConversationTurn> },
    /// A chunk type this client does not know about
    Unknown { kind: String },
}

#[derive(Deserialize)]
struct RawChunk {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    conversation: Vec<serde_json::Value>,
}

impl Chunk {
    /// Decode a chunk from its JSON text.
    pub fn from_json(json: &str) -> Result<Self> {
        let raw: RawChunk = serde_json::from_str(json)?;
        Ok(match raw.kind.as_str() {
            "content" => Chunk::Content { text: raw.text },
            "thinking" => Chunk::Thinking { text: raw.text },
            "conversation" => Chunk::Conversation {
                conversation: raw
                    .conversation
                    .into_iter()
                    .filter_map(|turn| match serde_json::from_value(turn) {
                        Ok(turn) => Some(turn),
                        Err(e) => {
                            tracing::debug!("Skipping unrecognized conversation turn: {}", e);
                            None
                        }
                    })
                    .collect(),
            },
            _ => Chunk::Unknown { kind: raw.kind },
        })
    }
}

/// A stream of decoded chunks. The first `Err` ends the stream.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Chunk>> + Send>>;

/// A slice of a chunk too large for a single `data:` frame
#[derive(Debug, Deserialize)]
struct PartialFrame {
    data: String,
    #[serde(default)]
    is_start: bool,
    #[serde(default)]
    is_done: bool,
}

/// Incremental decoder for the server's event stream.
///
/// Understands `data:` frames, `partial:` frames that split one large chunk
/// across several events, comment lines, and bare JSON lines.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    buffer: Vec<u8>,
    data: Option<String>,
    partial: Option<String>,
    reassembly: Option<String>,
}

impl FrameDecoder {
    /// Create an empty decoder
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed raw bytes, returning every chunk completed by them.
    pub fn push(&mut self, bytes: &[u8]) -> Vec<Result<Chunk>> {
        self.buffer
            .extend(bytes.iter().copied().filter(|b| *b != b'\r'));

        let mut out = Vec::new();
        while let Some(pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=pos).take(pos).collect();
            match String::from_utf8(line) {
                Ok(line) => self.process_line(&line, &mut out),
                Err(e) => out.push(Err(e.into())),
            }
        }
        out
    }

    /// Flush whatever is left once the byte stream has closed.
    pub fn finish(&mut self) -> Vec<Result<Chunk>> {
        let mut out = Vec::new();
        if !self.buffer.is_empty() {
            let line = std::mem::take(&mut self.buffer);
            match String::from_utf8(line) {
                Ok(line) => self.process_line(&line, &mut out),
                Err(e) => out.push(Err(e.into())),
            }
        }
        self.dispatch(&mut out);
        if self.reassembly.take().is_some() {
            out.push(Err(Error::Frame(
                "stream closed before partial frame completed".to_string(),
            )));
        }
        out
    }

    fn process_line(&mut self, line: &str, out: &mut Vec<Result<Chunk>>) {
        if line.is_empty() {
            self.dispatch(out);
            return;
        }
        if line.starts_with(':') {
            return;
        }
        if line.starts_with('{') {
            self.dispatch(out);
            out.push(Chunk::from_json(line));
            return;
        }

        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };
        match field {
            "data" => match self.data.as_mut() {
                Some(data) => {
                    data.push('\n');
                    data.push_str(value);
                }
                None => self.data = Some(value.to_string()),
            },
            "partial" => self.partial = Some(value.to_string()),
            other => tracing::trace!("Ignoring stream field '{}'", other),
        }
    }

    fn dispatch(&mut self, out: &mut Vec<Result<Chunk>>) {
        if let Some(data) = self.data.take() {
            out.push(Chunk::from_json(&data));
        }
        if let Some(partial) = self.partial.take() {
            if let Some(result) = self.reassemble(&partial) {
                out.push(result);
            }
        }
    }

    fn reassemble(&mut self, partial: &str) -> Option<Result<Chunk>> {
        let frame: PartialFrame = match serde_json::from_str(partial) {
            Ok(frame) => frame,
            Err(e) => return Some(Err(e.into())),
        };

        if frame.is_start {
            if self.reassembly.is_some() {
                tracing::warn!("Partial frame restarted before the previous one completed");
            }
            self.reassembly = Some(frame.data);
        } else {
            match self.reassembly.as_mut() {
                Some(buf) => buf.push_str(&frame.data),
                None => {
                    return Some(Err(Error::Frame(
                        "partial frame continuation without a start".to_string(),
                    )));
                }
            }
        }

        if frame.is_done {
            let json = self.reassembly.take().unwrap_or_default();
            tracing::debug!("Reassembled partial frame ({} bytes)", json.len());
            return Some(Chunk::from_json(&json));
        }
        None
    }
}

/// Decode a byte stream into chunks, stopping at the first error.
pub fn decode_stream<S, B, E>(bytes: S) -> ChunkStream
where
    S: Stream<Item = std::result::Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Into<Error> + Send + 'static,
{
    Box::pin(stream! {
        let mut bytes = Box::pin(bytes);
        let mut decoder = FrameDecoder::new();

        while let Some(item) = bytes.next().await {
            match item {
                Ok(b) => {
                    for chunk in decoder.push(b.as_ref()) {
                        let failed = chunk.is_err();
                        yield chunk;
                        if failed {
                            return;
                        }
                    }
                }
                Err(e) => {
                    yield Err(e.into());
                    return;
                }
            }
        }

        for chunk in decoder.finish() {
            let failed = chunk.is_err();
            yield chunk;
            if failed {
                return;
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Role;

    fn ok_chunks(results: Vec<Result<Chunk>>) -> Vec<Chunk> {
        results.into_iter().map(|r| r.unwrap()).collect()
    }

    #[test]
    fn test_chunk_types() {
        assert_eq!(
            Chunk::from_json(r#"{"type":"content","text":"Hi"}"#).unwrap(),
            Chunk::Content { text: "Hi".into() }
        );
        assert_eq!(
            Chunk::from_json(r#"{"type":"thinking","text":"hm"}"#).unwrap(),
            Chunk::Thinking { text: "hm".into() }
        );
        assert_eq!(
            Chunk::from_json(r#"{"type":"tool_call","name":"x"}"#).unwrap(),
            Chunk::Unknown {
                kind: "tool_call".into()
            }
        );
    }

    #[test]
    fn test_conversation_chunk_without_body() {
        let chunk = Chunk::from_json(r#"{"type":"conversation"}"#).unwrap();
        assert_eq!(
            chunk,
            Chunk::Conversation {
                conversation: vec![]
            }
        );
    }

    #[test]
    fn test_conversation_chunk_skips_odd_turns() {
        let chunk = Chunk::from_json(
            r#"{"type":"conversation","conversation":[
                {"role":"user","content":"hello"},
                {"role":"tool","content":"ignored"},
                {"role":"assistant","content":"Hi!"}
            ]}"#,
        )
        .unwrap();
        let Chunk::Conversation { conversation } = chunk else {
            panic!("expected conversation chunk");
        };
        assert_eq!(conversation.len(), 2);
        assert_eq!(conversation[1].role, Role::Assistant);
    }

    #[test]
    fn test_missing_type_is_an_error() {
        assert!(Chunk::from_json(r#"{"text":"orphan"}"#).is_err());
    }

    #[test]
    fn test_data_frames_split_across_pushes() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: {\"type\":\"con").is_empty());
        assert!(decoder.push(b"tent\",\"text\":\"Hi\"}\n").is_empty());
        let chunks = ok_chunks(decoder.push(b"\ndata: {\"type\":\"thinking\",\"text\":\"x\"}\n\n"));
        assert_eq!(
            chunks,
            vec![
                Chunk::Content { text: "Hi".into() },
                Chunk::Thinking { text: "x".into() },
            ]
        );
    }

    #[test]
    fn test_crlf_and_comments() {
        let mut decoder = FrameDecoder::new();
        let chunks = ok_chunks(decoder.push(
            b": keep-alive\r\n\r\nevent: message\r\ndata: {\"type\":\"content\",\"text\":\"a\"}\r\n\r\n",
        ));
        assert_eq!(chunks, vec![Chunk::Content { text: "a".into() }]);
    }

    #[test]
    fn test_partial_frames_reassemble() {
        let full = r#"{"type":"content","text":"a long answer"}"#;
        let (head, tail) = full.split_at(12);
        let first = serde_json::json!({"data": head, "is_start": true, "is_done": false});
        let second = serde_json::json!({"data": tail, "is_start": false, "is_done": true});

        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(format!("partial: {}\n\n", first).as_bytes()).is_empty());
        let chunks = ok_chunks(decoder.push(format!("partial: {}\n\n", second).as_bytes()));
        assert_eq!(
            chunks,
            vec![Chunk::Content {
                text: "a long answer".into()
            }]
        );
    }

    #[test]
    fn test_partial_continuation_without_start() {
        let frame = serde_json::json!({"data": "x", "is_start": false, "is_done": true});
        let mut decoder = FrameDecoder::new();
        let results = decoder.push(format!("partial: {}\n\n", frame).as_bytes());
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(Error::Frame(_))));
    }

    #[test]
    fn test_bare_json_lines() {
        let mut decoder = FrameDecoder::new();
        let chunks = ok_chunks(decoder.push(
            b"{\"type\":\"content\",\"text\":\"a\"}\n{\"type\":\"content\",\"text\":\"b\"}\n",
        ));
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn test_finish_flushes_unterminated_frame() {
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(b"data: {\"type\":\"conversation\"}").is_empty());
        let chunks = ok_chunks(decoder.finish());
        assert_eq!(
            chunks,
            vec![Chunk::Conversation {
                conversation: vec![]
            }]
        );
    }

    #[test]
    fn test_finish_inside_partial_is_error() {
        let frame = serde_json::json!({"data": "{\"type\"", "is_start": true, "is_done": false});
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(format!("partial: {}\n\n", frame).as_bytes()).is_empty());
        let results = decoder.finish();
        assert!(matches!(results.as_slice(), [Err(Error::Frame(_))]));
    }

    #[test]
    fn test_multibyte_text_split_mid_character() {
        let frame = "data: {\"type\":\"content\",\"text\":\"héllo\"}\n\n".as_bytes();
        let split = frame.iter().position(|b| *b == 0xC3).unwrap() + 1;
        let mut decoder = FrameDecoder::new();
        assert!(decoder.push(&frame[..split]).is_empty());
        let chunks = ok_chunks(decoder.push(&frame[split..]));
        assert_eq!(chunks, vec![Chunk::Content { text: "héllo".into() }]);
    }

    #[tokio::test]
    async fn test_decode_stream_stops_at_first_error() {
        let parts: Vec<Result<Vec<u8>>> = vec![
            Ok(b"data: {\"type\":\"content\",\"text\":\"a\"}\n\n".to_vec()),
            Ok(b"data: not json\n\n".to_vec()),
            Ok(b"data: {\"type\":\"content\",\"text\":\"b\"}\n\n".to_vec()),
        ];
        let mut stream = decode_stream(futures::stream::iter(parts));

        assert_eq!(
            stream.next().await.unwrap().unwrap(),
            Chunk::Content { text: "a".into() }
        );
        assert!(stream.next().await.unwrap().is_err());
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn test_decode_stream_transport_error() {
        let parts: Vec<Result<Vec<u8>>> = vec![
            Ok(b"data: {\"type\":\"thinking\",\"text\":\"t\"}\n\n".to_vec()),
            Err(Error::api(None, "connection reset")),
        ];
        let results: Vec<_> = decode_stream(futures::stream::iter(parts)).collect().await;
        assert_eq!(results.len(), 2);
        assert!(matches!(results[1], Err(Error::Api { .. })));
    }
}
