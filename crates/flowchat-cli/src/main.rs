//! flowchat - terminal client for a streaming chat server

mod commands;
mod config;

use std::io::Write;
use std::sync::Arc;

use clap::Parser;
use flowchat_api::{ChatClient, ClientConfig};
use flowchat_engine::{
    ChatEvent, ChatSession, HttpTransport, Notice, NoticeLevel, RetryConfig, SessionConfig,
    StreamOutcome,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing_subscriber::EnvFilter;

use commands::CommandResult;

/// flowchat - chat with a streaming model server
#[derive(Parser, Debug)]
#[command(name = "flowchat")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Server root URL (default: http://localhost:8000)
    #[arg(short, long)]
    server: Option<String>,

    /// Model requested with each message
    #[arg(short, long)]
    model: Option<String>,

    /// Send a single message, print the reply and exit
    #[arg(short = 'c', long)]
    command: Option<String>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Initialize config file
    #[arg(long)]
    init_config: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Logs go to stderr so they never interleave with streamed text
    if args.verbose || std::env::var_os("RUST_LOG").is_some() {
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("flowchat=debug,flowchat_api=debug,flowchat_engine=debug")
        });
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    if args.init_config {
        match config::Config::init() {
            Ok(path) => {
                println!("Config file created at: {}", path.display());
                println!("\nExample config:\n{}", config::example_config());
            }
            Err(e) => {
                eprintln!("Error creating config: {}", e);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    let cfg = config::Config::load();

    // Merge config with CLI args (CLI takes precedence)
    let server = args
        .server
        .or(cfg.server.clone())
        .unwrap_or_else(|| ClientConfig::default().base_url);
    let model = args.model.or(cfg.model.clone());

    let client = ChatClient::with_base_url(server)?;
    let retry_config = RetryConfig {
        max_retries: cfg
            .max_retries
            .unwrap_or(RetryConfig::default().max_retries),
        ..Default::default()
    };
    let transport = Arc::new(HttpTransport::new(client.clone()).with_retry_config(retry_config));

    let session = ChatSession::new(
        transport,
        SessionConfig {
            model,
            clear_contexts_after_send: cfg.clear_contexts_after_send.unwrap_or(false),
            clear_contexts_after_agent_create: cfg
                .clear_contexts_after_agent_create
                .unwrap_or(false),
        },
    )
    .with_notifier(Arc::new(print_notice));

    let printer = tokio::spawn(print_events(session.events()));

    if let Some(command) = args.command {
        session.send(&command).await;
        // Let the printer drain the last events
        tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        printer.abort();
        return Ok(());
    }

    let result = run_interactive(&session, &client).await;
    session.cancel();
    printer.abort();
    result
}

fn print_notice(notice: Notice) {
    match notice.level {
        NoticeLevel::Error => eprintln!("Error: {}", notice.message),
        NoticeLevel::Success => eprintln!("{}", notice.message),
    }
}

/// Print streamed text as it arrives
async fn print_events(mut events: broadcast::Receiver<ChatEvent>) {
    let mut in_thinking = false;
    let mut current_reply = None;
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Display fell behind by {} events", skipped);
                continue;
            }
            Err(broadcast::error::RecvError::Closed) => break,
        };

        let mut stdout = std::io::stdout();
        match event {
            ChatEvent::ExchangeStart { assistant_id, .. } => {
                in_thinking = false;
                current_reply = Some(assistant_id);
            }
            ChatEvent::ThinkingDelta { text } => {
                if !in_thinking {
                    print!("(thinking) ");
                    in_thinking = true;
                }
                print!("{}", text);
            }
            ChatEvent::ContentDelta { text } => {
                if in_thinking {
                    println!("\n");
                    in_thinking = false;
                }
                print!("{}", text);
            }
            ChatEvent::TurnEnd { .. } => {}
            // A cancelled reply can wind down after its resend started
            ChatEvent::StreamEnd { assistant_id, .. } if current_reply != Some(assistant_id) => {}
            ChatEvent::StreamEnd { outcome, .. } => {
                match outcome {
                    StreamOutcome::Cancelled => println!("\n[cancelled]"),
                    _ => println!(),
                }
                in_thinking = false;
            }
        }
        let _ = stdout.flush();
    }
}

fn spawn_send(session: &ChatSession, text: String) {
    if session.is_streaming() {
        println!("A reply is still streaming; /cancel it first.");
        return;
    }
    let session = session.clone();
    tokio::spawn(async move {
        session.send(&text).await;
    });
}

async fn run_interactive(session: &ChatSession, client: &ChatClient) -> anyhow::Result<()> {
    if std::io::IsTerminal::is_terminal(&std::io::stderr()) {
        eprintln!("flowchat ({})", client.config().base_url);
        eprintln!("Type /help for commands.");
        eprintln!();
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        // While editing, the next plain line is the new value
        if session.edit_state().is_some() && !input.starts_with('/') {
            let committed = session
                .set_edit_value(input)
                .and_then(|_| session.commit_edit());
            match committed {
                Ok(()) => println!("Saved."),
                Err(e) => println!("Cannot save edit: {}", e),
            }
            continue;
        }

        let Some(result) = commands::execute_command(input, session) else {
            spawn_send(session, input.to_string());
            continue;
        };

        match result {
            CommandResult::Message(msg) => println!("{}", msg),
            CommandResult::Resend(text) => {
                println!("> {}", text);
                spawn_send(session, text);
            }
            CommandResult::Upload(path) => match tokio::fs::read(&path).await {
                Ok(bytes) => match commands::content_for_path(&path, bytes) {
                    Ok(content) => {
                        let idx = session.upload(content);
                        if let Some(block) = session.contexts().get(idx) {
                            println!("Attached [{}] {}", idx, block.name);
                        }
                    }
                    Err(e) => println!("{}", e),
                },
                Err(e) => println!("Cannot read {}: {}", path.display(), e),
            },
            CommandResult::CreateAgent => {
                // Outcome is reported through the notifier
                let _ = session.create_agent().await;
            }
            CommandResult::Model(None) => match client.set_model(None).await {
                Ok(reply) => println!(
                    "Server model: {}",
                    reply.model.as_deref().unwrap_or("(none)")
                ),
                Err(e) => println!("Error: {}", e),
            },
            CommandResult::Model(Some(id)) => match client.set_model(Some(&id)).await {
                Ok(_) => {
                    session.set_model(Some(id.clone()));
                    println!("Switched to: {}", id);
                }
                Err(e) => println!("Error: {}", e),
            },
            CommandResult::ListModels => match client.list_models().await {
                Ok(tags) => {
                    let current = session.config().model;
                    println!("Available models:");
                    for name in tags.model_names() {
                        let marker = if current.as_deref() == Some(name.as_str()) {
                            " *"
                        } else {
                            ""
                        };
                        println!("  {}{}", name, marker);
                    }
                }
                Err(e) => println!("Error: {}", e),
            },
            CommandResult::Unknown(cmd) => {
                println!("Unknown command: /{}", cmd);
                println!("Type /help for available commands.");
            }
            CommandResult::Exit => break,
        }
    }

    Ok(())
}
