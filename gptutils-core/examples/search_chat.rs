//! Asks a question that needs fresh information, with web search forced on.

use anyhow::Result;
use gptutils_core::{ChatClient, SearchOptions};
use std::io::{self, Write};

#[tokio::main]
async fn main() -> Result<()> {
    let client = ChatClient::from_env()?;

    let response = client
        .chat_with_search("What is today's top technology news?", SearchOptions::forced())
        .await?;
    println!("{}\n", response.first_content());

    client
        .chat_with_search_stream(
            "Which new AI models were released this week?",
            SearchOptions::enabled(),
            |text: &str| {
                let mut stdout = io::stdout();
                stdout.write_all(text.as_bytes())?;
                stdout.flush()
            },
        )
        .await?;
    println!();
    Ok(())
}
