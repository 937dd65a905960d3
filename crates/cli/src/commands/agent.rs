//! `proctor agent`: Answer one message with the ReAct agent.

use proctor_agent::{LoggingHooks, ReactAgent};
use proctor_core::event::EventBus;
use std::sync::Arc;

pub async fn run(message: &str, verbose: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;
    let generator = super::generator(&config)?;

    let event_bus = Arc::new(EventBus::default());
    let router = proctor_tools::router_from_config(&config, Some(Arc::clone(&event_bus)));
    let mut agent = ReactAgent::new(generator, router)
        .with_settings(config.agent.clone())
        .with_event_bus(event_bus);
    if verbose {
        agent = agent.with_hooks(Arc::new(LoggingHooks));
    }

    eprint!("  Thinking...");
    let result = agent.run(message).await?;
    eprint!("\r              \r");

    match &result.final_answer {
        Some(answer) => println!("{answer}"),
        None => println!("(no answer)"),
    }
    eprintln!();
    eprintln!(
        "  Status: {}  Iterations: {}  Tool calls: {}  Time: {:.1}s",
        result.status,
        result.iterations_used,
        result.tool_executions,
        result.duration_ms as f64 / 1000.0
    );
    if let Some(error) = &result.error {
        eprintln!("  Error: {error}");
    }

    Ok(())
}
