mod markdown;
mod terminal;

use anyhow::Context;
use clap::{Parser, Subcommand};
use crossterm::style::Stylize;
use lib::llm::{ChatBackend, OllamaBackend};
use lib::session::Conversation;
use std::io::{self, Write};
use std::path::PathBuf;

use crate::terminal::TerminalDisplay;

#[derive(Parser)]
#[command(name = "thinkchat")]
#[command(about = "ThinkChat CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Create the configuration directory and a default config.json.
    Init {
        /// Config file path (default: THINKCHAT_CONFIG_PATH or ~/.thinkchat/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// List models installed in Ollama.
    Models {
        /// Config file path (default: THINKCHAT_CONFIG_PATH or ~/.thinkchat/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Chat with the model (interactive). Type /help for commands.
    Chat {
        /// Config file path (default: THINKCHAT_CONFIG_PATH or ~/.thinkchat/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Model to use (default: THINKCHAT_MODEL, config, or deepseek-r1)
        #[arg(long, short, value_name = "NAME")]
        model: Option<String>,

        /// Stream the model's reasoning instead of collapsing it.
        #[arg(long)]
        show_thinking: bool,
    },

    /// Ask a single question and exit.
    Ask {
        /// Config file path (default: THINKCHAT_CONFIG_PATH or ~/.thinkchat/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Model to use (default: THINKCHAT_MODEL, config, or deepseek-r1)
        #[arg(long, short, value_name = "NAME")]
        model: Option<String>,

        /// Stream the model's reasoning instead of collapsing it.
        #[arg(long)]
        show_thinking: bool,

        /// The question.
        #[arg(required = true)]
        prompt: Vec<String>,
    },
}

const HELP_TEXT: &str = "available commands:\n  /history - show the conversation so far\n  /help    - show this help message\n  /exit    - leave (also /quit or Ctrl-D)";

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("thinkchat {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Init { config }) => {
            if let Err(e) = run_init(config) {
                log::error!("init failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Models { config }) => {
            if let Err(e) = run_models(config) {
                log::error!("listing models failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Chat {
            config,
            model,
            show_thinking,
        }) => {
            if let Err(e) = run_chat(config, model, show_thinking) {
                log::error!("chat failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Ask {
            config,
            model,
            show_thinking,
            prompt,
        }) => {
            if let Err(e) = run_ask(config, model, show_thinking, prompt.join(" ")) {
                eprintln!("ask failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")
}

/// Everything a chat needs: the runtime the backend streams on, the backend, and the
/// system prompt for the conversation.
struct ChatSetup {
    // Dropping the runtime stops in-flight streams, so it lives as long as the backend.
    _runtime: tokio::runtime::Runtime,
    backend: OllamaBackend,
    system_prompt: String,
}

fn setup_chat(config_path: Option<PathBuf>, model: Option<String>) -> anyhow::Result<ChatSetup> {
    let (config, path) = lib::config::load_config(config_path)?;
    log::debug!("using config {}", path.display());
    let runtime = runtime()?;
    let model = lib::config::resolve_model(&config, model.as_deref());
    let backend = OllamaBackend::new(
        lib::config::ollama_client(&config),
        model,
        runtime.handle().clone(),
    );
    Ok(ChatSetup {
        _runtime: runtime,
        backend,
        system_prompt: config.chat.system_prompt,
    })
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    let dir = lib::init::init_config_dir(&path)?;
    println!("initialized configuration at {}", dir.display());
    Ok(())
}

fn run_models(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, _) = lib::config::load_config(config_path)?;
    let client = lib::config::ollama_client(&config);
    let rt = runtime()?;
    let models = rt
        .block_on(client.list_models())
        .with_context(|| format!("querying {}", client.base_url()))?;
    if models.is_empty() {
        println!("no models installed (try `ollama pull {}`)", lib::config::DEFAULT_MODEL);
    }
    for m in models {
        match m.size {
            Some(bytes) => println!("{}  ({:.1} GB)", m.name, bytes as f64 / 1e9),
            None => println!("{}", m.name),
        }
    }
    Ok(())
}

fn run_chat(
    config_path: Option<PathBuf>,
    model: Option<String>,
    show_thinking: bool,
) -> anyhow::Result<()> {
    let setup = setup_chat(config_path, model)?;
    let mut conversation = Conversation::new(setup.system_prompt.clone());
    let mut display = TerminalDisplay::new(show_thinking, false);

    println!(
        "{} {}",
        "thinkchat".bold(),
        format!("· {} · Ask me anything! (/help for commands)", setup.backend.model()).dark_grey()
    );

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            println!();
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if input.eq_ignore_ascii_case("/exit") || input.eq_ignore_ascii_case("/quit") {
            break;
        }
        if input.eq_ignore_ascii_case("/help") {
            println!("{}", HELP_TEXT);
            continue;
        }
        if input.eq_ignore_ascii_case("/history") {
            let mut history = TerminalDisplay::new(show_thinking, true);
            lib::reparse::render_history(&conversation, &mut history);
            history.finish_line();
            continue;
        }

        let result = lib::turn::run_turn(&mut conversation, &setup.backend, &mut display, input);
        match result {
            Ok(outcome) => {
                show_unclosed_reply(&mut display, &outcome);
                display.finish_line();
            }
            Err(e) => {
                display.finish_line();
                eprintln!("chat error: {}", e);
            }
        }
    }

    Ok(())
}

fn run_ask(
    config_path: Option<PathBuf>,
    model: Option<String>,
    show_thinking: bool,
    prompt: String,
) -> anyhow::Result<()> {
    let setup = setup_chat(config_path, model)?;
    let mut conversation = Conversation::new(setup.system_prompt.clone());
    let mut display = TerminalDisplay::new(show_thinking, false);
    let result = lib::turn::run_turn(&mut conversation, &setup.backend, &mut display, &prompt);
    if let Ok(outcome) = &result {
        show_unclosed_reply(&mut display, outcome);
    }
    display.finish_line();
    result?;
    Ok(())
}

/// A reply that never closed its thinking phase went to the thinking target only.
fn show_unclosed_reply(display: &mut TerminalDisplay, outcome: &lib::turn::TurnOutcome) {
    if outcome.thinking_complete {
        return;
    }
    log::debug!("reply ended without </think>; stored as thinking only");
    display.show_unclosed_reply(&outcome.thinking);
}
