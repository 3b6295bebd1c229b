//! /list, /retry, /rm, /cancel and /edit

use super::{CommandResult, index_and_rest};
use flowchat_engine::{ChatSession, Field, RemoveOutcome, Sender};

pub struct HistoryCommand;

impl HistoryCommand {
    /// Show every message with its index
    pub fn list(session: &ChatSession) -> CommandResult {
        let snapshot = session.snapshot();
        if snapshot.is_empty() {
            return CommandResult::Message("No messages yet".to_string());
        }

        let mut output = String::new();
        for (idx, message) in snapshot.iter().enumerate() {
            let who = match message.sender {
                Sender::User => "you",
                Sender::Assistant => "assistant",
            };
            output.push_str(&format!("[{}] {} ({})\n", idx, who, message.timestamp));
            if !message.thinking.is_empty() {
                output.push_str(&format!("  (thinking) {}\n", message.thinking));
            }
            output.push_str(&format!("  {}\n", message.content));
        }
        CommandResult::Message(output.trim_end().to_string())
    }

    pub fn retry(args: &str, session: &ChatSession) -> CommandResult {
        let Ok(idx) = args.parse::<usize>() else {
            return CommandResult::Message("Usage: /retry N".to_string());
        };
        match session.retry(idx) {
            Ok(outcome) => CommandResult::Resend(outcome.text),
            Err(e) => CommandResult::Message(format!("Cannot retry: {}", e)),
        }
    }

    pub fn remove(args: &str, session: &ChatSession) -> CommandResult {
        let Ok(idx) = args.parse::<usize>() else {
            return CommandResult::Message("Usage: /rm N".to_string());
        };
        match session.remove(idx) {
            Ok(RemoveOutcome::CancelledStream) => {
                CommandResult::Message("Cancelled the streaming reply".to_string())
            }
            Ok(RemoveOutcome::Removed(_)) => CommandResult::Message(format!("Removed [{}]", idx)),
            Err(e) => CommandResult::Message(format!("Cannot remove: {}", e)),
        }
    }

    /// Discard the edit in progress, or else cancel the stream
    pub fn cancel(session: &ChatSession) -> CommandResult {
        let message = if session.cancel_edit() {
            "Edit discarded"
        } else if session.cancel() {
            "Cancelled"
        } else {
            "Nothing to cancel"
        };
        CommandResult::Message(message.to_string())
    }

    pub fn edit(args: &str, session: &ChatSession) -> CommandResult {
        let usage = || CommandResult::Message("Usage: /edit N content|thinking".to_string());
        let Some((idx, mode)) = index_and_rest(args) else {
            return usage();
        };
        let mode = match mode.to_lowercase().as_str() {
            "" | "content" => Field::Content,
            "thinking" => Field::Thinking,
            _ => return usage(),
        };

        match session.begin_edit(idx, mode) {
            Ok(()) => {
                let current = session
                    .edit_state()
                    .map(|edit| edit.value)
                    .unwrap_or_default();
                CommandResult::Message(format!(
                    "Editing [{}]. Current value:\n{}\nType the new value, or /cancel",
                    idx, current
                ))
            }
            Err(e) => CommandResult::Message(format!("Cannot edit: {}", e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::tests::session;

    #[tokio::test]
    async fn test_list_shows_indices() {
        let session = session();
        session.send("hi").await;

        let CommandResult::Message(text) = HistoryCommand::list(&session) else {
            panic!("expected message");
        };
        assert!(text.contains("[0] you"));
        assert!(text.contains("[1] assistant"));
        assert!(text.contains("echo: hi"));
    }

    #[tokio::test]
    async fn test_retry_returns_text_for_resend() {
        let session = session();
        session.send("hi").await;

        assert_eq!(
            HistoryCommand::retry("0", &session),
            CommandResult::Resend("hi".into())
        );
        assert!(session.snapshot().is_empty());
        assert!(matches!(
            HistoryCommand::retry("0", &session),
            CommandResult::Message(_)
        ));
    }

    #[tokio::test]
    async fn test_edit_then_cancel() {
        let session = session();
        session.send("hi").await;

        HistoryCommand::edit("1 content", &session);
        assert_eq!(session.edit_state().unwrap().value, "echo: hi");
        assert_eq!(
            HistoryCommand::cancel(&session),
            CommandResult::Message("Edit discarded".into())
        );
        assert_eq!(
            HistoryCommand::cancel(&session),
            CommandResult::Message("Nothing to cancel".into())
        );
        assert_eq!(session.snapshot()[1].content, "echo: hi");
    }

    #[test]
    fn test_edit_usage() {
        let session = session();
        assert_eq!(
            HistoryCommand::edit("1 summary", &session),
            CommandResult::Message("Usage: /edit N content|thinking".into())
        );
    }
}
