//! Model listing for one catalog provider.

use std::error::Error;

use crate::core::store::Database;

fn render_models(db: &Database, provider_name: &str) -> Result<String, Box<dyn Error>> {
    let provider = db.provider_by_name(provider_name)?.ok_or_else(|| {
        format!("Unknown provider '{provider_name}'. Run 'llmschat providers' to see the catalog.")
    })?;
    let models = db.models_for_provider(provider.id)?;
    let active_model = db
        .settings()?
        .filter(|settings| settings.provider_id == provider.id)
        .map(|settings| settings.model_id);

    if models.is_empty() {
        return Ok(format!("No models listed for {}.\n", provider.name));
    }

    let mut content = format!("Models for {}:\n\n", provider.name);
    for model in &models {
        let marker = if active_model == Some(model.id) {
            '*'
        } else {
            ' '
        };
        content.push_str(&format!("{marker} {}\n", model.name));
    }
    if active_model.is_some() {
        content.push_str("\n* = model in the saved settings\n");
    }
    Ok(content)
}

pub fn list_models(db: &Database, provider_name: &str) -> Result<(), Box<dyn Error>> {
    print!("{}", render_models(db, provider_name)?);
    Ok(())
}
