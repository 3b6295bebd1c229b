//! flowchat-api: wire layer for the flowchat server
//!
//! Request payloads, the chunk stream decoder, and an HTTP client for the
//! `/api/chat`, `/api/agent_create`, `/api/model` and `/api/tags` endpoints.

pub mod client;
pub mod error;
pub mod stream;
pub mod types;

pub use client::{ChatClient, ClientConfig};
pub use error::{Error, Result};
pub use stream::{Chunk, ChunkStream, FrameDecoder};
pub use types::*;
