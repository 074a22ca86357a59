//! Interactive streaming chat
//!
//! Streams answers from the chat backend, printing text as it arrives and
//! tool calls as they change state. Ctrl-C cancels the response in flight.
//!
//! ```bash
//! CARABAO_CHAT_BASE_URL=http://127.0.0.1:8000/api/v1 \
//! CARABAO_CHAT_TOKEN=... \
//! RUST_LOG=info cargo run --example stream_chat
//! ```

use std::io::Write;
use std::sync::Arc;

use anyhow::Context;
use carabao_chat::prelude::*;
use carabao_chat::{CredentialProvider, get_base_url};
use tokio::io::{AsyncBufReadExt, BufReader};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();

    let options = ChatOptions::builder()
        .base_url(get_base_url(None))
        .hooks(Hooks::new().add_user_prompt_submit(|event| async move {
            if event.prompt.len() > 4000 {
                return Some(HookDecision::block("prompt too long"));
            }
            None
        }))
        .build()?;

    let credentials: Arc<dyn CredentialProvider> = match std::env::var("CARABAO_CHAT_TOKEN") {
        Ok(token) => Arc::new(StaticToken::new(token)),
        Err(_) => Arc::new(carabao_chat::NoCredentials),
    };
    let client = ChatClient::with_credentials(options, credentials)?;

    match client.refresh_history().await {
        Ok(count) => println!("Loaded {} earlier messages", count),
        Err(e) => eprintln!("Could not load history: {}", e),
    }

    // Render live snapshots
    let mut live = client.subscribe();
    tokio::spawn(async move {
        let mut printed = 0;
        let mut tools = Vec::new();
        while live.changed().await.is_ok() {
            let snapshot = live.borrow_and_update().clone();
            if !snapshot.is_active {
                printed = 0;
                tools.clear();
                continue;
            }
            if let Some(fresh) = snapshot.text.get(printed..) {
                print!("{}", fresh);
                printed = snapshot.text.len();
            }
            for call in &snapshot.tool_calls {
                let seen = (call.id.clone(), call.status);
                if !tools.contains(&seen) {
                    print!("\n  [{} {:?}]\n", call.name, call.status);
                    tools.push(seen);
                }
            }
            let _ = std::io::stdout().flush();
        }
    });

    // Ctrl-C cancels the active response
    let canceller = client.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if !canceller.cancel() {
                std::process::exit(0);
            }
        }
    });

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("\n> ");
        std::io::stdout().flush().context("flushing stdout")?;

        let Some(line) = lines.next_line().await.context("reading stdin")? else {
            break;
        };
        match line.trim() {
            "/quit" => break,
            "/clear" => {
                client.clear_history().await?;
                println!("History cleared");
                continue;
            }
            _ => {}
        }

        client.set_input(line);
        if !client.input_is_valid() {
            continue;
        }

        match client.send_input().await {
            Ok(outcome) => {
                println!();
                for call in outcome.tool_calls.iter().filter_map(|c| c.query_id()) {
                    match client.fetch_preview(call).await {
                        Ok(preview) => println!(
                            "  preview {}: {:?}, {} rows",
                            call,
                            preview.response_type,
                            preview.data.map(|d| d.len()).unwrap_or(0)
                        ),
                        Err(e) => eprintln!("  preview {} unavailable: {}", call, e),
                    }
                }
                if !outcome.decode_errors.is_empty() {
                    eprintln!("  ({} malformed frames skipped)", outcome.decode_errors.len());
                }
            }
            Err(Error::Cancelled) => println!("\n(cancelled)"),
            Err(_) => {
                if let Some(message) = client.last_error() {
                    eprintln!("\n{}", message);
                }
            }
        }
    }

    Ok(())
}
