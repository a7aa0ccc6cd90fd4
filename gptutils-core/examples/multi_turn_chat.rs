//! Keeps a conversation going across several requests.

use anyhow::Result;
use gptutils_core::{ChatClient, ChatRequest, Message};

#[tokio::main]
async fn main() -> Result<()> {
    let client = ChatClient::from_env()?;
    let mut messages = vec![Message::system("You are a concise travel guide.")];

    for question in [
        "Name one city worth visiting in China.",
        "What food is it known for?",
        "Summarize both answers in one sentence.",
    ] {
        println!("You: {}", question);
        messages.push(Message::user(question));

        let response = client.chat(ChatRequest::new(messages.clone())).await?;
        let answer = response.first_content().to_string();
        println!("Assistant: {}\n", answer);
        messages.push(Message::assistant(answer));
    }
    Ok(())
}
