// gptutils-cli/src/main.rs
mod history;
mod models;

use anyhow::{anyhow, Context, Result};
use colored::*;
use std::env;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use rustyline::error::ReadlineError;
use rustyline::DefaultEditor;

use gptutils_core::{CancellationToken, ChatClient, ChatRequest, Config, Usage};

use crate::history::ChatHistory;
use crate::models::cli::Cli;

use clap::Parser;
use time::macros::format_description;
use tracing::{debug, error, info, warn, Level};
use tracing_subscriber::{
    fmt::{self, time::LocalTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

const APP_DIR_NAME: &str = "gptutils";
const LOG_FILE_NAME: &str = "gptutils.log";
const HISTORY_FILE_NAME: &str = "cli_history.txt";

fn app_cache_dir() -> Option<PathBuf> {
    dirs::cache_dir()
        .or_else(dirs::runtime_dir)
        .or_else(|| Some(env::temp_dir()))
        .map(|d| d.join(APP_DIR_NAME))
}

fn load_config(cli: &Cli) -> Result<Config> {
    let config = match &cli.config {
        Some(path) => {
            info!("Loading configuration from {:?}", path);
            Config::from_file(path)
                .with_context(|| format!("Failed to load configuration from {}", path.display()))?
        }
        None => Config::from_env().context("Failed to load configuration from environment")?,
    };
    Ok(match &cli.model {
        Some(model) => config.with_model(model.clone()),
        None => config,
    })
}

fn print_welcome_message(config: &Config, streaming: bool) {
    println!("\n{}", "gptutils - Chat".cyan().bold());
    println!(
        "{}: {}  {}: {}",
        "Model".cyan(),
        config.model,
        "Streaming".cyan(),
        if streaming { "on" } else { "off" }
    );
    println!(
        "{}\n{}",
        "Type 'exit' or 'quit' (or Ctrl-D) to leave.".dimmed(),
        "Type 'clear' to start over, 'history' to show the conversation.".dimmed()
    );
    println!();
}

fn print_history(history: &ChatHistory) {
    let mut turns = history.turns().peekable();
    if turns.peek().is_none() {
        println!("{}", "(no messages yet)".dimmed());
        return;
    }
    println!("\n{}", "--- Conversation ---".bold());
    for (i, message) in turns.enumerate() {
        println!(
            "{}. [{}] {}",
            i + 1,
            message.role.as_str().to_uppercase().cyan(),
            message.content_str()
        );
    }
    println!("{}", "--------------------".bold());
}

fn print_usage(usage: &Usage) {
    println!(
        "{}",
        format!(
            "[tokens: prompt {}, completion {}, total {}]",
            usage.prompt_tokens, usage.completion_tokens, usage.total_tokens
        )
        .dimmed()
    );
}

/// Streams the reply to stdout as it arrives. Ctrl-C aborts the reply.
async fn stream_reply(client: &ChatClient, request: ChatRequest) -> Result<String> {
    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        })
    };

    print!("{} ", "Assistant:".green().bold());
    io::stdout().flush().context("Failed to flush stdout")?;

    let mut reply = String::new();
    let result = client
        .chat_stream_with_cancel(request, &cancel, |text: &str| {
            reply.push_str(text);
            let mut stdout = io::stdout();
            stdout.write_all(text.as_bytes())?;
            stdout.flush()
        })
        .await;
    watcher.abort();
    println!();

    let summary = result?;
    debug!(
        fragments = summary.fragments,
        completed = summary.completed,
        "Streamed reply finished."
    );
    if let Some(usage) = &summary.usage {
        debug!(total_tokens = usage.total_tokens, "Stream usage.");
    }
    Ok(reply)
}

/// Waits for the complete reply behind a spinner, then prints it with usage.
async fn complete_reply(client: &ChatClient, request: ChatRequest) -> Result<String> {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.cyan} {msg}")?
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "-"]),
    );
    pb.set_message("Thinking...");
    pb.enable_steady_tick(Duration::from_millis(100));

    let result = client.chat(request).await;
    pb.finish_and_clear();

    let response = result?;
    let content = response.first_content().to_string();
    println!("{} {}", "Assistant:".green().bold(), content);
    if let Some(usage) = &response.usage {
        print_usage(usage);
    }
    Ok(content)
}

async fn run_interactive(client: ChatClient, cli: &Cli) -> Result<()> {
    let streaming = cli.streaming();
    let mut history = ChatHistory::new(&cli.system);
    print_welcome_message(client.config(), streaming);

    let mut rl = DefaultEditor::new()?;

    let history_file_path = app_cache_dir()
        .ok_or_else(|| anyhow!("Could not determine cache directory for history file"))?
        .join(HISTORY_FILE_NAME);
    if rl.load_history(&history_file_path).is_err() {
        debug!(path = %history_file_path.display(), "No previous CLI history found or error loading.");
    }

    let prompt = format!("{} ", "You:".blue().bold());

    loop {
        match rl.readline(&prompt) {
            Ok(line) => {
                let input = line.trim();
                if input.is_empty() {
                    continue;
                }
                if let Err(e) = rl.add_history_entry(input) {
                    debug!(error = %e, "Failed to add CLI history entry.");
                }

                match input.to_lowercase().as_str() {
                    "exit" | "quit" => {
                        info!("Exit command entered, leaving interactive mode.");
                        break;
                    }
                    "clear" => {
                        history.clear();
                        println!("{}", "Conversation cleared.".cyan());
                        continue;
                    }
                    "history" => {
                        print_history(&history);
                        continue;
                    }
                    _ => {}
                }

                history.push_user(input);
                let request =
                    ChatRequest::new(history.messages().to_vec()).temperature(cli.temperature);

                let result = if streaming {
                    stream_reply(&client, request).await
                } else {
                    complete_reply(&client, request).await
                };

                match result {
                    Ok(reply) => {
                        info!(chars = reply.len(), "Turn completed.");
                        history.push_assistant(reply);
                    }
                    Err(e) => {
                        error!("Chat turn failed: {:#}", e);
                        eprintln!("{}: {:#}", "Error".red(), e);
                        history.discard_last_user();
                    }
                }
                println!();
            }
            Err(ReadlineError::Interrupted) => {
                println!("{}", "^C".yellow());
                continue;
            }
            Err(ReadlineError::Eof) => {
                info!("EOF detected, exiting interactive mode.");
                break;
            }
            Err(err) => {
                error!("Readline error: {:?}", err);
                eprintln!("Error reading input: {}", err.to_string().red());
                break;
            }
        }
    }

    if let Some(dir) = history_file_path.parent() {
        if let Err(e) = fs::create_dir_all(dir) {
            warn!(path = %dir.display(), error = %e, "Failed to create CLI history directory.");
        }
    }
    if let Err(e) = rl.save_history(&history_file_path) {
        warn!(path = %history_file_path.display(), error = %e, "Failed to save CLI history.");
    } else {
        debug!(path = %history_file_path.display(), "Saved CLI history.");
    }

    println!("{}", "Goodbye!".cyan());
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    colored::control::set_override(true);

    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // --- Logging Setup ---
    let default_level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::default().add_directive(default_level.into()));

    let log_dir = match app_cache_dir() {
        Some(dir) => dir,
        None => {
            eprintln!("{}", "Error: Could not determine a suitable directory for log files.".red());
            return ExitCode::FAILURE;
        }
    };
    if let Err(e) = fs::create_dir_all(&log_dir) {
        eprintln!("{} Failed to create log directory {}: {}", "Error:".red(), log_dir.display(), e);
        return ExitCode::FAILURE;
    }
    let log_path = log_dir.join(LOG_FILE_NAME);

    let file_appender = tracing_appender::rolling::never(&log_dir, LOG_FILE_NAME);
    let (non_blocking_writer, _guard) = tracing_appender::non_blocking(file_appender);

    let local_timer = LocalTime::new(format_description!(
        "[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:3]"
    ));

    let file_layer = fmt::layer()
        .with_writer(non_blocking_writer)
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .with_timer(local_timer.clone());

    let stderr_layer = fmt::layer()
        .with_writer(io::stderr)
        .with_timer(local_timer)
        .with_target(false)
        .with_level(true);

    if let Err(e) = tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
    {
        eprintln!("{} Failed to initialize logging: {}", "Error:".red(), e);
        return ExitCode::FAILURE;
    }
    colored::control::unset_override();

    info!(
        "Logging initialized. Level determined by RUST_LOG or -v flags (default: {}). Logging to stderr and {}",
        default_level,
        log_path.display()
    );
    // --- End Logging Setup ---

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {:#}", e);
            eprintln!("{} {:#}", "Error:".red(), e);
            return ExitCode::FAILURE;
        }
    };
    info!(?config, "Configuration loaded.");

    let client = match ChatClient::new(config) {
        Ok(client) => client,
        Err(e) => {
            error!("Failed to create chat client: {}", e);
            eprintln!("{} {}", "Error:".red(), e);
            return ExitCode::FAILURE;
        }
    };

    match run_interactive(client, &cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Application failed: {:?}", e);
            eprintln!("{} {:?}", "Error:".red(), e);
            ExitCode::FAILURE
        }
    }
}
