//! Streams a single reply to stdout.
//!
//! Run with `API_KEY=... cargo run -p gptutils-core --example stream_chat`.

use anyhow::Result;
use gptutils_core::{ChatClient, ChatRequest, Message};
use std::io::{self, Write};

#[tokio::main]
async fn main() -> Result<()> {
    let client = ChatClient::from_env()?;

    let request = ChatRequest::new(vec![
        Message::system("You are a helpful assistant."),
        Message::user("Write a short poem about spring."),
    ])
    .temperature(0.8);

    let summary = client
        .chat_stream(request, |text: &str| {
            let mut stdout = io::stdout();
            stdout.write_all(text.as_bytes())?;
            stdout.flush()
        })
        .await?;
    println!();

    if let Some(usage) = summary.usage {
        println!("[tokens used: {}]", usage.total_tokens);
    }
    Ok(())
}
