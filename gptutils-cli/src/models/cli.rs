use clap::{ArgAction, Parser};
use std::path::PathBuf;

/// gptutils: chat with an OpenAI-compatible model from the terminal.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase message verbosity.
    ///
    /// Specify multiple times for more verbose output:
    ///  -v:  INFO level
    ///  -vv: DEBUG level
    ///  -vvv: TRACE level (most verbose)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Stream replies token by token (default).
    #[arg(long, overrides_with = "no_stream")]
    pub stream: bool,

    /// Wait for the complete reply and print token usage.
    #[arg(long = "no-stream")]
    pub no_stream: bool,

    /// Model name. Defaults to the configured model.
    #[arg(short, long)]
    pub model: Option<String>,

    /// Sampling temperature.
    #[arg(short, long, default_value_t = 0.7)]
    pub temperature: f64,

    /// TOML configuration file. Without it the environment is used.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// System prompt that opens every conversation.
    #[arg(short, long, default_value = "You are a helpful assistant.")]
    pub system: String,
}

impl Cli {
    pub fn streaming(&self) -> bool {
        !self.no_stream
    }
}
