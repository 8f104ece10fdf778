//! Viewing and replacing the saved settings profile.

use std::error::Error;

use tracing::info;

use crate::core::providers::ProviderRegistry;
use crate::core::store::settings::mask_api_key;
use crate::core::store::Database;

pub fn show_settings(db: &Database) -> Result<(), Box<dyn Error>> {
    let Some(settings) = db.settings()? else {
        println!("No settings saved yet.");
        println!("Example: llmschat settings set --name Ada --provider OpenAI --model gpt-4 --api-key sk-...");
        return Ok(());
    };

    let provider = db
        .provider_by_id(settings.provider_id)?
        .map(|provider| provider.name)
        .unwrap_or_else(|| format!("(missing provider {})", settings.provider_id));
    let model = db
        .model_by_id(settings.model_id)?
        .map(|model| model.name)
        .unwrap_or_else(|| format!("(missing model {})", settings.model_id));

    println!("Current settings:");
    println!("  name: {}", settings.display_name);
    println!("  provider: {provider}");
    println!("  model: {model}");
    println!("  api-key: {}", mask_api_key(&settings.api_key));
    Ok(())
}

/// Validate the names against the catalog and replace the saved profile.
pub(crate) fn apply_settings(
    db: &Database,
    name: &str,
    provider_name: &str,
    model_name: &str,
    api_key: &str,
) -> Result<(String, String), Box<dyn Error>> {
    let name = name.trim();
    let api_key = api_key.trim();
    if name.is_empty() {
        return Err("Display name cannot be empty.".into());
    }
    if api_key.is_empty() {
        return Err("API key cannot be empty.".into());
    }

    let provider = db.provider_by_name(provider_name.trim())?.ok_or_else(|| {
        format!("Unknown provider '{provider_name}'. Run 'llmschat providers' to see the catalog.")
    })?;
    let model = db
        .model_by_name(provider.id, model_name.trim())?
        .ok_or_else(|| {
            format!(
                "Provider {} has no model '{model_name}'. Run 'llmschat models {}' to see its models.",
                provider.name, provider.name
            )
        })?;

    db.save_settings(name, provider.id, model.id, api_key)?;
    info!(provider = %provider.name, model = %model.name, "settings saved");
    Ok((provider.name, model.name))
}

pub fn save_settings(
    db: &Database,
    registry: &ProviderRegistry,
    name: &str,
    provider_name: &str,
    model_name: &str,
    api_key: &str,
) -> Result<(), Box<dyn Error>> {
    let (provider, model) = apply_settings(db, name, provider_name, model_name, api_key)?;
    println!(
        "✅ Saved settings: {provider} / {model} (key {})",
        mask_api_key(api_key.trim())
    );
    if !registry.supports(&provider) {
        eprintln!("⚠️  {provider} has no adapter yet; chats will report an unsupported provider.");
    }
    Ok(())
}
