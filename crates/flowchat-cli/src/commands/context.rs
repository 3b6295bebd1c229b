//! /attach and the /ctx family

use std::path::Path;

use super::{CommandResult, index_and_rest};
use flowchat_engine::{AttachAction, ChatSession, ContextContent};

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "webp"];

/// Turn an uploaded file into context content, by extension.
pub fn content_for_path(path: &Path, bytes: Vec<u8>) -> anyhow::Result<ContextContent> {
    let is_image = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()));
    if is_image {
        return Ok(ContextContent::Image(bytes));
    }
    let text = String::from_utf8(bytes)
        .map_err(|_| anyhow::anyhow!("{} is neither an image nor UTF-8 text", path.display()))?;
    Ok(ContextContent::Text(text))
}

pub struct ContextCommand;

impl ContextCommand {
    pub fn attach(session: &ChatSession) -> CommandResult {
        let message = match session.attach() {
            AttachAction::SystemCreated(idx) => format!(
                "Created the system context [{}]. Fill it with /ctx-set {} TEXT",
                idx, idx
            ),
            AttachAction::OpenUpload => "Attach a file with /upload PATH".to_string(),
        };
        CommandResult::Message(message)
    }

    pub fn list(session: &ChatSession) -> CommandResult {
        let contexts = session.contexts();
        if contexts.is_empty() {
            return CommandResult::Message("No contexts attached".to_string());
        }
        let lines: Vec<String> = contexts
            .blocks()
            .iter()
            .enumerate()
            .map(|(idx, block)| match &block.content {
                ContextContent::Text(text) => {
                    let preview: String = text.chars().take(60).collect();
                    format!("[{}] {} (text, {} bytes) {}", idx, block.name, block.size(), preview)
                }
                ContextContent::Image(_) => {
                    format!("[{}] {} (image, {} bytes)", idx, block.name, block.size())
                }
            })
            .collect();
        CommandResult::Message(lines.join("\n"))
    }

    pub fn rename(args: &str, session: &ChatSession) -> CommandResult {
        match index_and_rest(args) {
            Some((idx, name)) if !name.is_empty() => {
                report(session.rename_context(idx, name), "Renamed")
            }
            _ => CommandResult::Message("Usage: /ctx-rename N NAME".to_string()),
        }
    }

    pub fn set(args: &str, session: &ChatSession) -> CommandResult {
        match index_and_rest(args) {
            Some((idx, text)) => report(session.set_context_text(idx, text), "Updated"),
            None => CommandResult::Message("Usage: /ctx-set N TEXT".to_string()),
        }
    }

    pub fn append(args: &str, session: &ChatSession) -> CommandResult {
        match index_and_rest(args) {
            Some((idx, text)) => report(session.append_context_text(idx, text), "Updated"),
            None => CommandResult::Message("Usage: /ctx-append N TEXT".to_string()),
        }
    }

    pub fn remove(args: &str, session: &ChatSession) -> CommandResult {
        match args.parse::<usize>() {
            Ok(idx) => report(session.remove_context(idx), "Removed"),
            Err(_) => CommandResult::Message("Usage: /ctx-rm N".to_string()),
        }
    }
}

fn report(result: flowchat_engine::Result<()>, done: &str) -> CommandResult {
    match result {
        Ok(()) => CommandResult::Message(done.to_string()),
        Err(e) => CommandResult::Message(format!("Error: {}", e)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::session;

    #[test]
    fn test_content_for_path() {
        let image = content_for_path(Path::new("cat.PNG"), vec![1, 2]).unwrap();
        assert_eq!(image, ContextContent::Image(vec![1, 2]));

        let text = content_for_path(Path::new("notes.md"), b"hello".to_vec()).unwrap();
        assert_eq!(text, ContextContent::Text("hello".into()));

        assert!(content_for_path(Path::new("blob.bin"), vec![0xff, 0xfe]).is_err());
    }

    #[test]
    fn test_attach_then_edit_system() {
        let session = session();
        assert!(matches!(ContextCommand::attach(&session), CommandResult::Message(m) if m.contains("system")));
        ContextCommand::set("0 Be brief.", &session);
        ContextCommand::append("0 Always.", &session);
        assert_eq!(session.contexts().system_prompt(), Some("Be brief.Always."));

        assert_eq!(
            ContextCommand::attach(&session),
            CommandResult::Message("Attach a file with /upload PATH".into())
        );
    }

    #[test]
    fn test_rename_duplicate_reports_error() {
        let session = session();
        session.upload(ContextContent::Text("a".into()));
        session.upload(ContextContent::Text("b".into()));

        let CommandResult::Message(text) = ContextCommand::rename("1 context", &session) else {
            panic!("expected message");
        };
        assert!(text.starts_with("Error"));
        assert_eq!(
            ContextCommand::rename("1 notes", &session),
            CommandResult::Message("Renamed".into())
        );
        assert_eq!(
            ContextCommand::remove("0", &session),
            CommandResult::Message("Removed".into())
        );
        assert_eq!(session.contexts().get(0).unwrap().name, "notes");
    }
}
