//! Tool calling against the Anthropic Messages API.
//!
//! Declares one tool, lets the model call it, then feeds the result back
//! for the final answer. The API key resolves from ANTHROPIC_API_KEY first,
//! the OS keychain second.
//!
//! Run:
//!   ANTHROPIC_API_KEY=your_key cargo run --example anthropic_tools

use anyhow::Result;
use serde_json::{json, Map};
use unigen::auth::KeyringStore;
use unigen::{
    AnthropicConfig, AnthropicGenerator, ContentGenerator, GenerateRequest, Message, Part, Role,
    ToolDeclaration,
};

fn weather_tool() -> ToolDeclaration {
    ToolDeclaration::new("get_weather")
        .description("Current weather for a city")
        .parameters(json!({
            "type": "object",
            "properties": {
                "city": {"type": "string", "description": "City name"}
            },
            "required": ["city"]
        }))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let store = KeyringStore::new();
    let config = AnthropicConfig::resolve("claude-sonnet-4-0", &store)?;
    let generator = AnthropicGenerator::new(config)?;

    let request = GenerateRequest::from_text("What's the weather in Tokyo right now?")
        .tools(vec![weather_tool()])
        .max_tokens(512);

    let response = generator.generate_content(&request).await?;
    let calls = response.function_calls();
    let Some(Part::FunctionCall { name, args, id }) = calls.first().copied() else {
        println!("Model answered directly: {}", response.text());
        return Ok(());
    };
    println!("Model called {name} with {args:?}");

    // Pretend we executed the tool.
    let mut result = Map::new();
    result.insert("temp_c".to_string(), json!(21));
    result.insert("conditions".to_string(), json!("partly cloudy"));

    let mut messages = request.messages.clone();
    messages.push(Message::new(
        Role::Model,
        response.candidates[0].content.parts.clone(),
    ));
    messages.push(Message::tool(vec![Part::function_response(
        id.clone(),
        result,
    )]));

    let followup = GenerateRequest::new(messages)
        .tools(vec![weather_tool()])
        .max_tokens(512);
    let answer = generator.generate_content(&followup).await?;
    println!("Final answer: {}", answer.text());

    Ok(())
}
