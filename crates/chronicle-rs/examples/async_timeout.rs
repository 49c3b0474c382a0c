//! Suspending turn with a compression timeout too short to meet.
//!
//! The turn still completes: compression is abandoned, the prior (empty)
//! state is used, and `timed_out` is reported in the metrics.
//!
//! # Usage
//!
//! ```bash
//! OPENROUTER_KEY=sk-... cargo run --example async_timeout
//! ```

use chronicle_rs::prelude::*;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = EngineConfig::from_env()?
        .with_token_threshold(10)
        .with_custom_instructions("You are a concise assistant.");
    let engine = Engine::from_config(config)?;

    let history: Vec<Message> = (0..10)
        .map(|_| Message::user("This is a message that repeats itself over and over."))
        .collect();

    let turn = engine
        .process_turn(
            "timeout-demo",
            Message::user("Trigger bloat."),
            &history,
            TurnOptions::with_timeout_ms(1),
        )
        .await?;

    println!(
        "bloat_detected={} timed_out={} strategy={} tokens {} -> {}",
        turn.meta.bloat_detected,
        turn.meta.timed_out,
        turn.meta.strategy,
        turn.meta.original_tokens,
        turn.meta.final_tokens
    );
    println!("fact_ledger={}", serde_json::Value::Object(turn.meta.fact_ledger));

    Ok(())
}
