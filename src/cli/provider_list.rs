use std::error::Error;

use crate::core::providers::ProviderRegistry;
use crate::core::store::{Database, Provider};

fn render_providers(
    providers: &[Provider],
    active_provider: Option<i64>,
    registry: &ProviderRegistry,
) -> String {
    if providers.is_empty() {
        return "No providers in the catalog.\n".to_string();
    }

    let width = providers
        .iter()
        .map(|provider| provider.name.len())
        .max()
        .unwrap_or(0);
    let mut content = String::from("Providers:\n\n");
    for provider in providers {
        let marker = if active_provider == Some(provider.id) {
            '*'
        } else {
            ' '
        };
        let url = if provider.base_url.is_empty() {
            "(no endpoint)"
        } else {
            provider.base_url.as_str()
        };
        let support = if registry.supports(&provider.name) {
            ""
        } else {
            "  [no adapter]"
        };
        content.push_str(&format!(
            "{marker} {:<width$}  {url}{support}\n",
            provider.name
        ));
    }

    if active_provider.is_some() {
        content.push_str("\n* = provider in the saved settings\n");
    }
    content
}

pub fn list_providers(db: &Database, registry: &ProviderRegistry) -> Result<(), Box<dyn Error>> {
    let providers = db.providers()?;
    let active_provider = db.settings()?.map(|settings| settings.provider_id);
    print!("{}", render_providers(&providers, active_provider, registry));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_catalog_with_support_markers() {
        let db = Database::open_in_memory().unwrap();
        let providers = db.providers().unwrap();
        let rendered = render_providers(&providers, None, &ProviderRegistry::with_builtins());

        assert!(rendered.starts_with("Providers:\n\n"));
        assert!(rendered.contains("  OpenAI     https://api.openai.com/v1\n"));
        assert!(rendered.contains("  Meta       (no endpoint)  [no adapter]\n"));
        assert!(rendered.contains("  Google     https://generativelanguage.googleapis.com  [no adapter]\n"));
        assert!(!rendered.contains("saved settings"));
    }

    #[test]
    fn marks_the_saved_provider() {
        let db = Database::open_in_memory().unwrap();
        let providers = db.providers().unwrap();
        let deepseek = db.provider_by_name("Deepseek").unwrap().unwrap();
        let rendered = render_providers(
            &providers,
            Some(deepseek.id),
            &ProviderRegistry::with_builtins(),
        );

        assert!(rendered.contains("* Deepseek"));
        assert!(rendered.ends_with("* = provider in the saved settings\n"));
    }

    #[test]
    fn empty_catalog() {
        assert_eq!(
            render_providers(&[], None, &ProviderRegistry::new()),
            "No providers in the catalog.\n"
        );
    }
}
