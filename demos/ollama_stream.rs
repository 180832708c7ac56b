//! Streaming generation against a local Ollama server.
//!
//! Prints partial responses as the server emits them, then the settled
//! usage from the final chunk.
//!
//! Prerequisites:
//! - An Ollama server on localhost:11434 (or set OLLAMA_HOST)
//! - The model pulled, e.g.: ollama pull llama3.2
//!
//! Run:
//!   cargo run --example ollama_stream

use std::io::Write;

use futures::StreamExt;
use unigen::{ContentGenerator, GenerateRequest, Message, OllamaConfig, OllamaGenerator};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| "llama3.2".to_string());
    let generator = OllamaGenerator::new(OllamaConfig::new(&model))?;

    let request = GenerateRequest::new(vec![
        Message::system("Answer in two sentences."),
        Message::user("Why is the sky blue?"),
    ]);

    println!(
        "Estimated prompt tokens: {}\n",
        generator.count_tokens(&request).await?
    );

    let mut stream = generator.generate_content_stream(&request).await?;
    let mut usage = None;
    while let Some(item) = stream.next().await {
        let chunk = item?;
        print!("{}", chunk.text());
        std::io::stdout().flush()?;
        if chunk.finish_reason().is_some() {
            usage = Some(chunk.usage);
        }
    }
    println!();

    if let Some(usage) = usage {
        println!(
            "\nUsage: {} prompt + {} output = {} tokens",
            usage.prompt_tokens, usage.candidate_tokens, usage.total_tokens
        );
    }

    Ok(())
}
