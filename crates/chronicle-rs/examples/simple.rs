//! Blocking turn against OpenRouter with the in-memory store.
//!
//! Sends a deliberately repetitive history with a low threshold so the
//! engine compresses it, then prints the hydrated prompt and metrics.
//!
//! # Usage
//!
//! ```bash
//! OPENROUTER_KEY=sk-... cargo run --example simple
//! ```

use chronicle_rs::prelude::*;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 1. Resolve credentials and overrides once, then lower the threshold.
    let config = EngineConfig::from_env()?.with_token_threshold(50);
    let engine = Engine::from_config(config)?;

    // 2. A history that is comfortably over 50 tokens.
    let mut history = vec![
        Message::user("Hi, I'm Grace. I'm planning a trip to Kyoto in April."),
        Message::assistant("Lovely! Cherry blossom season. How long will you stay?"),
        Message::user("Ten days. I'm vegetarian and I don't like crowds."),
        Message::assistant("Noted. I'll suggest quieter temples and vegetarian spots."),
    ];
    for _ in 0..4 {
        history.push(Message::user("Any more tips for temples that are less busy?"));
        history.push(Message::assistant("Try Ohara and the northern hills early in the morning."));
    }

    // 3. Run the turn.
    let turn = engine.process_turn_blocking(
        "kyoto-trip",
        Message::user("What should I eat on my first night?"),
        &history,
    )?;

    // 4. Print results.
    for message in &turn.hydrated_messages {
        println!("[{}] {}", message.role, message.content);
    }
    println!("\n{}", serde_json::to_string_pretty(&turn.meta)?);

    Ok(())
}
