// crates/memoir-server/src/main.rs
// Memoir - repository-scoped memory and session history for coding assistants

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "memoir", about = "Repository-scoped memory for coding assistants")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Handle a host hook event (reads JSON from stdin)
    Hook {
        #[command(subcommand)]
        action: HookAction,
    },
    /// Run a tool by name with JSON arguments
    Tool {
        name: String,
        /// JSON argument object; also accepted on stdin when omitted
        #[arg(long)]
        args: Option<String>,
    },
}

#[derive(Subcommand, Clone, Copy)]
enum HookAction {
    /// Buffer a streamed chat message and run keyword detection
    ChatMessage,
    /// Finalize buffered messages and compact the session's active chunks
    SessionCompacting,
}

impl std::fmt::Display for HookAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HookAction::ChatMessage => write!(f, "chat-message"),
            HookAction::SessionCompacting => write!(f, "session-compacting"),
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    match &cli.command {
        Commands::Hook { .. } => {
            // Hooks: configurable via MEMOIR_HOOK_LOG_LEVEL (default: warn).
            // No timestamps or module targets — hooks are ephemeral processes.
            let hook_level =
                std::env::var("MEMOIR_HOOK_LOG_LEVEL").unwrap_or_else(|_| "warn".to_string());
            let level = match hook_level.to_lowercase().as_str() {
                "off" => None,
                "error" => Some(Level::ERROR),
                "warn" => Some(Level::WARN),
                "info" => Some(Level::INFO),
                "debug" | "trace" => Some(Level::DEBUG),
                other => {
                    eprintln!("[memoir] Unknown MEMOIR_HOOK_LOG_LEVEL={other:?}, using warn");
                    Some(Level::WARN)
                }
            };
            if let Some(level) = level {
                let subscriber = FmtSubscriber::builder()
                    .with_max_level(level)
                    .with_writer(std::io::stderr)
                    .with_ansi(false)
                    .without_time()
                    .with_target(false)
                    .finish();
                let _ = tracing::subscriber::set_global_default(subscriber);
            }
        }
        Commands::Tool { .. } => {
            let subscriber = FmtSubscriber::builder()
                .with_max_level(Level::WARN)
                .with_writer(std::io::stderr)
                .with_ansi(false)
                .finish();
            let _ = tracing::subscriber::set_global_default(subscriber);
        }
    }

    match cli.command {
        Commands::Hook { action } => {
            // Hooks must NEVER exit non-zero — the host treats that as a
            // broken hook. Catch errors and panics, log to stderr, emit {}.
            let result = tokio::task::spawn(async move {
                match action {
                    HookAction::ChatMessage => memoir::hooks::chat_message::run().await,
                    HookAction::SessionCompacting => {
                        memoir::hooks::session_compacting::run().await
                    }
                }
            })
            .await;

            match result {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    eprintln!("[memoir] hook {action} failed: {e:#}");
                    println!("{{}}");
                }
                Err(e) => {
                    eprintln!("[memoir] hook {action} panicked: {e}");
                    println!("{{}}");
                }
            }
            Ok(())
        }
        Commands::Tool { name, args } => {
            let args_value: serde_json::Value = match args {
                Some(raw) => serde_json::from_str(&raw)?,
                None => memoir::hooks::read_hook_input()?,
            };

            let runtime = memoir::hooks::hook_runtime().await?;
            match memoir::tools::dispatch(&runtime, &name, &args_value).await {
                Ok(output) => {
                    println!("{output}");
                    Ok(())
                }
                Err(message) => {
                    eprintln!("{message}");
                    std::process::exit(1);
                }
            }
        }
    }
}
