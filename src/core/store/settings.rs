//! The single active settings profile.

use rusqlite::{params, OptionalExtension};

use super::{Database, StoreError};

/// The active user profile: chosen provider, model and credential.
#[derive(Clone, PartialEq, Eq)]
pub struct Settings {
    pub id: i64,
    pub display_name: String,
    pub provider_id: i64,
    pub model_id: i64,
    pub api_key: String,
}

impl std::fmt::Debug for Settings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Settings")
            .field("id", &self.id)
            .field("display_name", &self.display_name)
            .field("provider_id", &self.provider_id)
            .field("model_id", &self.model_id)
            .field("api_key", &mask_api_key(&self.api_key))
            .finish()
    }
}

/// Render a credential for display without revealing it.
pub fn mask_api_key(api_key: &str) -> String {
    let visible: String = api_key
        .chars()
        .rev()
        .take(4)
        .collect::<Vec<_>>()
        .into_iter()
        .rev()
        .collect();
    if api_key.chars().count() <= 8 {
        "*".repeat(api_key.chars().count())
    } else {
        format!("****{visible}")
    }
}

impl Database {
    /// Replace the settings profile. Exactly one row exists afterwards.
    pub fn save_settings(
        &self,
        display_name: &str,
        provider_id: i64,
        model_id: i64,
        api_key: &str,
    ) -> Result<(), StoreError> {
        self.with_connection(|conn| {
            let tx = conn.transaction()?;

            let model_provider: Option<i64> = tx
                .query_row(
                    "SELECT provider_id FROM models WHERE id = ?1",
                    params![model_id],
                    |row| row.get(0),
                )
                .optional()?;
            match model_provider {
                Some(owner) if owner == provider_id => {}
                Some(owner) => {
                    return Err(StoreError::InvalidData(format!(
                        "model {model_id} belongs to provider {owner}, not {provider_id}"
                    )))
                }
                None => {
                    return Err(StoreError::InvalidData(format!(
                        "model {model_id} does not exist"
                    )))
                }
            }

            tx.execute("DELETE FROM settings", [])?;
            tx.execute(
                "INSERT INTO settings (name, provider_id, model_id, api_key) VALUES (?1, ?2, ?3, ?4)",
                params![display_name, provider_id, model_id, api_key],
            )?;
            tx.commit()?;
            Ok(())
        })
    }

    /// The current settings profile, if one has been saved.
    pub fn settings(&self) -> Result<Option<Settings>, StoreError> {
        self.with_connection(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, name, provider_id, model_id, api_key FROM settings LIMIT 1",
                    [],
                    |row| {
                        Ok(Settings {
                            id: row.get(0)?,
                            display_name: row.get(1)?,
                            provider_id: row.get(2)?,
                            model_id: row.get(3)?,
                            api_key: row.get(4)?,
                        })
                    },
                )
                .optional()?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn model_id(db: &Database, provider: &str, model: &str) -> (i64, i64) {
        let provider = db.provider_by_name(provider).unwrap().unwrap();
        let model = db.model_by_name(provider.id, model).unwrap().unwrap();
        (provider.id, model.id)
    }

    fn settings_rows(db: &Database) -> i64 {
        db.with_connection(|conn| {
            Ok(conn.query_row("SELECT COUNT(*) FROM settings", [], |row| row.get(0))?)
        })
        .unwrap()
    }

    #[test]
    fn no_settings_before_first_save() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.settings().unwrap().is_none());
    }

    #[test]
    fn saving_twice_keeps_only_the_latest_profile() {
        let db = Database::open_in_memory().unwrap();
        let (openai, gpt4) = model_id(&db, "OpenAI", "gpt-4");
        let (anthropic, claude) = model_id(&db, "Anthropic", "claude-2.1");

        db.save_settings("Ada", openai, gpt4, "sk-first").unwrap();
        db.save_settings("Grace", anthropic, claude, "sk-ant-second")
            .unwrap();

        assert_eq!(settings_rows(&db), 1);
        let settings = db.settings().unwrap().unwrap();
        assert_eq!(settings.display_name, "Grace");
        assert_eq!(settings.provider_id, anthropic);
        assert_eq!(settings.model_id, claude);
        assert_eq!(settings.api_key, "sk-ant-second");
    }

    #[test]
    fn mismatched_model_is_rejected_without_touching_existing_row() {
        let db = Database::open_in_memory().unwrap();
        let (openai, gpt4) = model_id(&db, "OpenAI", "gpt-4");
        let (anthropic, _) = model_id(&db, "Anthropic", "claude-2.1");
        db.save_settings("Ada", openai, gpt4, "sk-first").unwrap();

        let err = db
            .save_settings("Ada", anthropic, gpt4, "sk-first")
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidData(_)));

        let settings = db.settings().unwrap().unwrap();
        assert_eq!(settings.provider_id, openai);
    }

    #[test]
    fn debug_output_masks_the_api_key() {
        let settings = Settings {
            id: 1,
            display_name: "Ada".into(),
            provider_id: 1,
            model_id: 1,
            api_key: "sk-verysecretvalue".into(),
        };
        let rendered = format!("{settings:?}");
        assert!(!rendered.contains("verysecret"));
        assert!(rendered.contains("****alue"));
    }

    #[test]
    fn short_keys_are_fully_masked() {
        assert_eq!(mask_api_key("abc"), "***");
        assert_eq!(mask_api_key(""), "");
    }
}
