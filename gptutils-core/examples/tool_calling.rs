//! Lets the model call the built-in weather and calculator tools.

use anyhow::Result;
use gptutils_core::tools::builtin::{calculator_tool, weather_tool};
use gptutils_core::{ChatClient, ChatRequest, Message, ToolRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    let client = ChatClient::from_env()?;

    let mut registry = ToolRegistry::new();
    registry.register(weather_tool());
    registry.register(calculator_tool());

    let request = ChatRequest::new(vec![Message::user(
        "What's the weather in Beijing, and what is (12 + 8) * 3?",
    )]);
    let output = client.chat_with_tools(request, &registry, 0).await?;

    for result in &output.tool_results {
        println!(
            "{}({}) -> {} [{:?}]",
            result.tool_name, result.arguments, result.output, result.status
        );
    }
    println!("\n{}", output.response.first_content());
    Ok(())
}
