//! One-shot "say" command

use std::error::Error;

use crate::cli::exit_with_provider_error;
use crate::core::providers::{ClientFactory, ClientSource};
use crate::core::session::SessionId;

/// Send `prompt` as the first message of a fresh session and print the
/// whole reply once it has arrived.
pub async fn run_say(factory: &ClientFactory, prompt: Vec<String>) -> Result<(), Box<dyn Error>> {
    let prompt = prompt.join(" ");
    if prompt.trim().is_empty() {
        eprintln!("Usage: llmschat say <prompt>");
        std::process::exit(1);
    }

    let client = match factory.client_for(SessionId::new()).await {
        Ok(client) => client,
        Err(err) => exit_with_provider_error(&err),
    };

    match client.complete(&prompt).await {
        Ok(reply) => {
            println!("{reply}");
            Ok(())
        }
        Err(err) => exit_with_provider_error(&err),
    }
}
