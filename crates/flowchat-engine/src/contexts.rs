//! Context blocks attached to the next outgoing message

use base64::{Engine, engine::general_purpose::STANDARD};
use flowchat_api::{ContextPayload, FileType};

use crate::error::{Error, Result};

/// Name of the free-text system prompt block
pub const SYSTEM_CONTEXT: &str = "system";

/// Body of a context block. Images stay raw until a payload is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContextContent {
    Text(String),
    Image(Vec<u8>),
}

impl ContextContent {
    pub fn file_type(&self) -> FileType {
        match self {
            ContextContent::Text(_) => FileType::Text,
            ContextContent::Image(_) => FileType::Image,
        }
    }
}

/// A named unit of auxiliary content
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextBlock {
    pub name: String,
    pub content: ContextContent,
}

impl ContextBlock {
    pub fn file_type(&self) -> FileType {
        self.content.file_type()
    }

    pub fn is_system(&self) -> bool {
        self.name.eq_ignore_ascii_case(SYSTEM_CONTEXT)
    }

    /// Size of the body in bytes
    pub fn size(&self) -> usize {
        match &self.content {
            ContextContent::Text(text) => text.len(),
            ContextContent::Image(bytes) => bytes.len(),
        }
    }

    /// Wire form; image bytes are base64 encoded here and nowhere else.
    pub fn to_payload(&self) -> ContextPayload {
        let content = match &self.content {
            ContextContent::Text(text) => text.clone(),
            ContextContent::Image(bytes) => STANDARD.encode(bytes),
        };
        ContextPayload {
            name: self.name.clone(),
            content,
            file_type: self.file_type(),
        }
    }
}

/// What an attach request did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttachAction {
    /// The system block did not exist and was created at this index
    SystemCreated(usize),
    /// The system block exists; the caller should run its upload flow
    OpenUpload,
}

/// The active set of context blocks
#[derive(Debug, Clone, Default)]
pub struct ContextSet {
    blocks: Vec<ContextBlock>,
}

impl ContextSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn blocks(&self) -> &[ContextBlock] {
        &self.blocks
    }

    pub fn get(&self, idx: usize) -> Option<&ContextBlock> {
        self.blocks.get(idx)
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    fn has_name(&self, name: &str) -> bool {
        self.blocks.iter().any(|b| b.name.eq_ignore_ascii_case(name))
    }

    /// Create the system block on first use; afterwards ask for an upload.
    pub fn attach(&mut self) -> AttachAction {
        if self.has_name(SYSTEM_CONTEXT) {
            return AttachAction::OpenUpload;
        }
        self.blocks.push(ContextBlock {
            name: SYSTEM_CONTEXT.to_string(),
            content: ContextContent::Text(String::new()),
        });
        AttachAction::SystemCreated(self.blocks.len() - 1)
    }

    /// Name the next uploaded block of this type would receive.
    ///
    /// The bare base name is used while free, otherwise the base name is
    /// suffixed with the current block count.
    pub fn default_name(&self, file_type: FileType) -> String {
        let base = match file_type {
            FileType::Image => "IMAGE",
            FileType::Text => "CONTEXT",
        };
        if self.has_name(base) {
            format!("{}_{}", base, self.blocks.len())
        } else {
            base.to_string()
        }
    }

    /// Add an uploaded block under its default name, returning its index
    pub fn upload(&mut self, content: ContextContent) -> usize {
        let name = self.default_name(content.file_type());
        tracing::debug!("Attached context '{}'", name);
        self.blocks.push(ContextBlock { name, content });
        self.blocks.len() - 1
    }

    fn block_mut(&mut self, idx: usize) -> Result<&mut ContextBlock> {
        let len = self.blocks.len();
        self.blocks
            .get_mut(idx)
            .ok_or(Error::IndexOutOfRange { index: idx, len })
    }

    /// Rename a block. Names already used by another block are rejected.
    pub fn rename(&mut self, idx: usize, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        let clash = self
            .blocks
            .iter()
            .enumerate()
            .any(|(i, b)| i != idx && b.name.eq_ignore_ascii_case(&name));
        let block = self.block_mut(idx)?;
        if clash {
            return Err(Error::DuplicateContextName(name));
        }
        block.name = name;
        Ok(())
    }

    /// Replace the text of a text block
    pub fn set_text(&mut self, idx: usize, text: impl Into<String>) -> Result<()> {
        match &mut self.block_mut(idx)?.content {
            ContextContent::Text(body) => {
                *body = text.into();
                Ok(())
            }
            ContextContent::Image(_) => Err(Error::NotTextContext(idx)),
        }
    }

    /// Append to the text of a text block
    pub fn append_text(&mut self, idx: usize, text: &str) -> Result<()> {
        match &mut self.block_mut(idx)?.content {
            ContextContent::Text(body) => {
                body.push_str(text);
                Ok(())
            }
            ContextContent::Image(_) => Err(Error::NotTextContext(idx)),
        }
    }

    pub fn remove(&mut self, idx: usize) -> Result<ContextBlock> {
        if idx >= self.blocks.len() {
            return Err(Error::IndexOutOfRange {
                index: idx,
                len: self.blocks.len(),
            });
        }
        Ok(self.blocks.remove(idx))
    }

    pub fn clear(&mut self) {
        self.blocks.clear();
    }

    /// Text of the system block, if one exists
    pub fn system_prompt(&self) -> Option<&str> {
        self.blocks
            .iter()
            .find(|b| b.is_system())
            .and_then(|b| match &b.content {
                ContextContent::Text(text) => Some(text.as_str()),
                ContextContent::Image(_) => None,
            })
    }

    /// Wire form of every block, in order
    pub fn to_payload(&self) -> Vec<ContextPayload> {
        self.blocks.iter().map(ContextBlock::to_payload).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(s: &str) -> ContextContent {
        ContextContent::Text(s.to_string())
    }

    #[test]
    fn test_attach_creates_system_once() {
        let mut contexts = ContextSet::new();
        assert_eq!(contexts.attach(), AttachAction::SystemCreated(0));
        assert_eq!(contexts.attach(), AttachAction::OpenUpload);
        assert_eq!(contexts.len(), 1);
        assert_eq!(contexts.system_prompt(), Some(""));
    }

    #[test]
    fn test_attach_respects_renamed_system_case() {
        let mut contexts = ContextSet::new();
        contexts.attach();
        contexts.rename(0, "SYSTEM").unwrap();
        assert_eq!(contexts.attach(), AttachAction::OpenUpload);
    }

    #[test]
    fn test_image_names() {
        let mut contexts = ContextSet::new();
        let first = contexts.upload(ContextContent::Image(vec![1]));
        let second = contexts.upload(ContextContent::Image(vec![2]));
        assert_eq!(contexts.get(first).unwrap().name, "IMAGE");
        assert_eq!(contexts.get(second).unwrap().name, "IMAGE_1");
    }

    #[test]
    fn test_text_names_use_block_count() {
        let mut contexts = ContextSet::new();
        contexts.attach();
        contexts.upload(text("a"));
        contexts.upload(text("b"));
        contexts.upload(ContextContent::Image(vec![0]));
        let names: Vec<&str> = contexts.blocks().iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["system", "CONTEXT", "CONTEXT_2", "IMAGE"]);
    }

    #[test]
    fn test_base_name_match_is_case_insensitive() {
        let mut contexts = ContextSet::new();
        contexts.upload(text("a"));
        contexts.rename(0, "context").unwrap();
        assert_eq!(contexts.default_name(FileType::Text), "CONTEXT_1");
    }

    #[test]
    fn test_rename_rejects_duplicates() {
        let mut contexts = ContextSet::new();
        contexts.upload(text("a"));
        contexts.upload(text("b"));
        assert!(matches!(
            contexts.rename(1, "Context"),
            Err(Error::DuplicateContextName(_))
        ));
        contexts.rename(0, "Context").unwrap();
        assert_eq!(contexts.get(0).unwrap().name, "Context");
        assert!(matches!(
            contexts.rename(7, "other"),
            Err(Error::IndexOutOfRange { index: 7, .. })
        ));
    }

    #[test]
    fn test_text_edits() {
        let mut contexts = ContextSet::new();
        contexts.attach();
        contexts.set_text(0, "You are terse.").unwrap();
        contexts.append_text(0, " Answer in English.").unwrap();
        assert_eq!(
            contexts.system_prompt(),
            Some("You are terse. Answer in English.")
        );
    }

    #[test]
    fn test_text_edits_reject_images() {
        let mut contexts = ContextSet::new();
        contexts.upload(ContextContent::Image(vec![1, 2]));
        assert!(matches!(
            contexts.append_text(0, "x"),
            Err(Error::NotTextContext(0))
        ));
        assert!(matches!(contexts.set_text(0, "x"), Err(Error::NotTextContext(0))));
    }

    #[test]
    fn test_remove() {
        let mut contexts = ContextSet::new();
        contexts.upload(text("a"));
        let removed = contexts.remove(0).unwrap();
        assert_eq!(removed.name, "CONTEXT");
        assert!(contexts.is_empty());
        assert!(contexts.remove(0).is_err());
    }

    #[test]
    fn test_image_payload_round_trip() {
        let mut contexts = ContextSet::new();
        contexts.upload(ContextContent::Image(vec![0xff, 0x00, 0x7f]));
        contexts.upload(text("notes"));

        let payload = contexts.to_payload();
        assert_eq!(payload[0].file_type, FileType::Image);
        assert_eq!(STANDARD.decode(&payload[0].content).unwrap(), vec![0xff, 0x00, 0x7f]);
        assert_eq!(payload[1].file_type, FileType::Text);
        assert_eq!(payload[1].content, "notes");

        assert_eq!(
            contexts.get(0).unwrap().content,
            ContextContent::Image(vec![0xff, 0x00, 0x7f])
        );
    }
}
