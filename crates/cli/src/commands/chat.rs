//! `anemone chat`: talk to Anemone in the terminal.
//!
//! Reply fragments are printed as they stream in. Memory lookups are noted
//! on stderr so they stay out of piped output.

use std::io::Write;
use std::sync::Arc;

use anemone_agent::ConversationRuntime;
use anemone_core::message::ConversationId;
use anemone_core::sink::{SinkEvent, TransportSink, TurnStatus};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Prints turn events to the terminal.
struct TerminalSink;

impl TransportSink for TerminalSink {
    fn emit(&self, event: SinkEvent) {
        match event {
            SinkEvent::StreamChunk { content } => {
                let mut stdout = std::io::stdout().lock();
                let _ = write!(stdout, "{content}");
                let _ = stdout.flush();
            }
            SinkEvent::MemoryRetrieved { memory, .. } if !memory.is_empty() => {
                eprintln!("\n  (remembered: {memory})");
            }
            SinkEvent::StatusUpdate {
                status: TurnStatus::Error,
                message,
            } => {
                eprintln!("\n  {message}");
            }
            _ => {}
        }
    }
}

pub async fn run(message: Option<String>) -> Result<(), Box<dyn std::error::Error>> {
    let config = super::load_config()?;

    let providers = anemone_providers::build_from_config(&config);
    let provider = providers
        .default()
        .ok_or_else(|| format!("provider '{}' is not configured", providers.default_name()))?;
    let memory = anemone_memory::build_from_config(&config.memory).await?;

    let runtime = ConversationRuntime::from_config(&config, provider, memory);
    let conversation = ConversationId::new();
    let sink: Arc<dyn TransportSink> = Arc::new(TerminalSink);
    let name = runtime.agent_name().to_string();

    if let Some(msg) = message {
        runtime.submit(&conversation, &msg, Some(sink)).await?;
        println!();
        return Ok(());
    }

    println!("{name} (model: {})", config.default_model);
    println!("Type 'exit' to quit, '/clear' to start over.\n");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();

        match input {
            "" => continue,
            "exit" | "quit" => break,
            "/clear" => {
                runtime.clear(&conversation, None).await;
                println!("  (conversation cleared)\n");
                continue;
            }
            _ => {}
        }

        print!("\n{name} > ");
        std::io::stdout().flush()?;
        if let Err(e) = runtime.submit(&conversation, input, Some(sink.clone())).await {
            eprintln!("\n  Error: {e}");
        }
        println!("\n");
    }

    println!("Goodbye!");
    Ok(())
}
