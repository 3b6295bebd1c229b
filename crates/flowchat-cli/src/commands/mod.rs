//! Slash commands for interactive mode

mod context;
mod history;

pub use context::{ContextCommand, content_for_path};
pub use history::HistoryCommand;

use std::path::PathBuf;

use flowchat_engine::ChatSession;

/// Result of executing a slash command
#[derive(Debug, PartialEq, Eq)]
pub enum CommandResult {
    /// Show a message to the user
    Message(String),
    /// Send this text as a new message
    Resend(String),
    /// Read a file and attach it as a context block
    Upload(PathBuf),
    /// Create an agent from the conversation
    CreateAgent,
    /// Set the model, or show the server's current one
    Model(Option<String>),
    /// List the server's models
    ListModels,
    /// Exit the application
    Exit,
    /// Unknown command
    Unknown(String),
}

/// Parse and execute a slash command
pub fn execute_command(input: &str, session: &ChatSession) -> Option<CommandResult> {
    let input = input.trim();
    let rest = input.strip_prefix('/')?;

    let parts: Vec<&str> = rest.splitn(2, ' ').collect();
    let command = parts[0].to_lowercase();
    let args = parts.get(1).map(|s| s.trim()).unwrap_or("");

    Some(match command.as_str() {
        "help" | "h" | "?" => CommandResult::Message(help_message()),

        "quit" | "exit" | "q" => CommandResult::Exit,

        "list" | "ls" => HistoryCommand::list(session),
        "retry" => HistoryCommand::retry(args, session),
        "rm" => HistoryCommand::remove(args, session),
        "cancel" => HistoryCommand::cancel(session),
        "edit" => HistoryCommand::edit(args, session),

        "attach" => ContextCommand::attach(session),
        "upload" => {
            if args.is_empty() {
                CommandResult::Message("Usage: /upload PATH".to_string())
            } else {
                CommandResult::Upload(PathBuf::from(args))
            }
        }
        "ctx" => ContextCommand::list(session),
        "ctx-rename" => ContextCommand::rename(args, session),
        "ctx-set" => ContextCommand::set(args, session),
        "ctx-append" => ContextCommand::append(args, session),
        "ctx-rm" => ContextCommand::remove(args, session),

        "agent" => CommandResult::CreateAgent,
        "model" | "m" => CommandResult::Model((!args.is_empty()).then(|| args.to_string())),
        "models" => CommandResult::ListModels,

        _ => CommandResult::Unknown(command),
    })
}

/// Split `"N rest"` into an index and the remaining text
pub(crate) fn index_and_rest(args: &str) -> Option<(usize, &str)> {
    let (idx, rest) = match args.split_once(' ') {
        Some((idx, rest)) => (idx, rest.trim()),
        None => (args, ""),
    };
    Some((idx.parse().ok()?, rest))
}

fn help_message() -> String {
    r#"Available commands:
  /help, /h, /?          Show this help message
  /list, /ls             Show the conversation with message indices
  /retry N               Resend user message N (drops it if it is the last exchange)
  /rm N                  Remove message N, or cancel the reply being streamed
  /cancel                Cancel the streamed reply or the edit in progress
  /edit N content|thinking
                         Edit a field of message N; the next line is the new value
  /attach                Create the system context, or explain how to upload
  /upload PATH           Attach a file (images: png, jpg, jpeg, gif, webp)
  /ctx                   List attached contexts
  /ctx-rename N NAME     Rename context N
  /ctx-set N TEXT        Replace the text of context N
  /ctx-append N TEXT     Append to the text of context N
  /ctx-rm N              Remove context N
  /agent                 Create an agent from this conversation
  /model, /m [ID]        Show the server model or switch to ID
  /models                List models the server offers
  /quit, /exit, /q       Exit flowchat"#
        .to_string()
}
