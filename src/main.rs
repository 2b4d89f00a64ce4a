//! # docqa CLI
//!
//! Ask questions about PDFs and text files from the terminal.
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `docqa ask "<question>" --docs <paths>` | Answer one question and exit |
//! | `docqa chat --docs <paths>` | Interactive session with history |
//! | `docqa chunks --docs <paths>` | Print how documents are split |
//!
//! ## Examples
//!
//! ```bash
//! docqa ask "Who wrote the paper?" --docs paper.pdf
//! docqa --session alice chat --docs ./docs
//! RUST_LOG=docqa=debug,docqa_core=debug docqa chat --docs notes.md
//! ```

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::io::Write;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use docqa::app::{self, App, Command};
use docqa::config;

/// docqa: conversational question answering over your documents.
#[derive(Parser)]
#[command(name = "docqa", version, about)]
struct Cli {
    /// Path to configuration file (TOML). Defaults to `./docqa.toml` when
    /// present, otherwise built-in defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Chat model API key. Overrides the environment variable named in `[llm]`.
    #[arg(long, global = true)]
    api_key: Option<String>,

    /// Conversation session id.
    #[arg(long, global = true, default_value = app::DEFAULT_SESSION)]
    session: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Answer a single question and exit.
    Ask {
        question: String,

        /// Documents or directories to index.
        #[arg(long, num_args = 1..)]
        docs: Vec<PathBuf>,

        /// Also consult the web tools.
        #[arg(long)]
        tools: bool,
    },

    /// Start an interactive session.
    ///
    /// Lines starting with `:` are commands: `:session <id>`,
    /// `:load <paths>...`, `:history`, `:tools on|off`, `:key <api-key>`
    /// and `:quit`. Anything else is a question.
    Chat {
        /// Documents or directories to index.
        #[arg(long, num_args = 1..)]
        docs: Vec<PathBuf>,
    },

    /// Print the chunks the documents are split into.
    Chunks {
        #[arg(long, num_args = 1.., required = true)]
        docs: Vec<PathBuf>,
    },
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("docqa=info,docqa_core=info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();
    let cli = Cli::parse();
    let cfg = config::load_or_default(cli.config.as_deref())?;

    if let Commands::Chunks { docs } = &cli.command {
        for chunk in app::preview_chunks(&cfg, docs)? {
            println!("── {} ({} chars)", chunk.label(), chunk.text.chars().count());
            println!("{}\n", chunk.text);
        }
        return Ok(());
    }

    let api_key = app::resolve_api_key(cli.api_key.as_deref(), &cfg)?;
    let mut app = App::new(cfg, &api_key, cli.session)?;

    match cli.command {
        Commands::Ask {
            question,
            docs,
            tools,
        } => {
            if tools {
                app.set_tools(true)?;
            }
            if !docs.is_empty() {
                app.load(&docs).await?;
            }
            let reply = app.ask(&question).await?;
            println!("{}", app::format_reply(&reply));
        }
        Commands::Chat { docs } => {
            if !docs.is_empty() {
                app.load(&docs).await?;
            }
            run_repl(&mut app).await?;
        }
        Commands::Chunks { .. } => {}
    }

    Ok(())
}

async fn run_repl(app: &mut App) -> Result<()> {
    println!("docqa: ask a question, or :quit to exit.");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("[{}]> ", app.session_id());
        std::io::stdout().flush()?;
        let Some(line) = lines.next_line().await? else {
            break;
        };

        let command = match app::parse_line(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(usage) => {
                eprintln!("{}", usage);
                continue;
            }
        };

        let outcome = match command {
            Command::Quit => break,
            Command::Ask(question) => app
                .ask(&question)
                .await
                .map(|reply| println!("{}\n", app::format_reply(&reply))),
            Command::Session(id) => app
                .set_session(&id)
                .map(|()| println!("Switched to session '{}'.", id)),
            Command::Load(paths) => app.load(&paths).await.map(|outcome| {
                println!(
                    "Indexed {} chunks{}.",
                    outcome.snapshot.len(),
                    if outcome.rebuilt { "" } else { " (unchanged)" }
                );
                for failure in &outcome.failures {
                    println!("  skipped {}", failure);
                }
            }),
            Command::History => app
                .history()
                .map(|turns| println!("{}\n", app::format_history(&turns))),
            Command::Tools(enabled) => app.set_tools(enabled).map(|()| {
                println!("Web tools {}.", if enabled { "enabled" } else { "disabled" })
            }),
            Command::Key(key) => app.set_api_key(&key).map(|()| println!("API key updated.")),
        };

        if let Err(e) = outcome {
            eprintln!("Error: {:#}", e);
        }
    }

    Ok(())
}
