//! Provider/model catalog. Seeded on startup and read-only afterwards.

use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::debug;

use super::{Database, StoreError};
use crate::core::builtin_providers::load_builtin_providers;

/// An LLM vendor endpoint family.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Provider {
    pub id: i64,
    pub name: String,
    pub base_url: String,
}

/// A model exposed by one provider.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Model {
    pub id: i64,
    pub name: String,
    pub provider_id: i64,
}

fn provider_from_row(row: &Row<'_>) -> rusqlite::Result<Provider> {
    Ok(Provider {
        id: row.get(0)?,
        name: row.get(1)?,
        base_url: row.get(2)?,
    })
}

fn model_from_row(row: &Row<'_>) -> rusqlite::Result<Model> {
    Ok(Model {
        id: row.get(0)?,
        name: row.get(1)?,
        provider_id: row.get(2)?,
    })
}

/// Insert the built-in providers and models, leaving existing rows alone.
pub(super) fn seed_builtin_catalog(conn: &mut Connection) -> Result<(), StoreError> {
    let tx = conn.transaction()?;

    for provider in load_builtin_providers() {
        tx.execute(
            "INSERT OR IGNORE INTO providers (name, base_url) VALUES (?1, ?2)",
            params![provider.name, provider.base_url],
        )?;
        let provider_id: i64 = tx.query_row(
            "SELECT id FROM providers WHERE name = ?1",
            params![provider.name],
            |row| row.get(0),
        )?;

        for model in &provider.models {
            tx.execute(
                "INSERT OR IGNORE INTO models (name, provider_id) VALUES (?1, ?2)",
                params![model, provider_id],
            )?;
        }
        debug!(provider = %provider.name, provider_id, "catalog provider seeded");
    }

    tx.commit()?;
    Ok(())
}

impl Database {
    /// All providers, ordered by name.
    pub fn providers(&self) -> Result<Vec<Provider>, StoreError> {
        self.with_connection(|conn| {
            let mut stmt =
                conn.prepare("SELECT id, name, base_url FROM providers ORDER BY name")?;
            let rows = stmt.query_map([], provider_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    /// Look up a provider by name, ignoring case.
    pub fn provider_by_name(&self, name: &str) -> Result<Option<Provider>, StoreError> {
        self.with_connection(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, name, base_url FROM providers WHERE name = ?1",
                    params![name],
                    provider_from_row,
                )
                .optional()?)
        })
    }

    pub fn provider_by_id(&self, id: i64) -> Result<Option<Provider>, StoreError> {
        self.with_connection(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, name, base_url FROM providers WHERE id = ?1",
                    params![id],
                    provider_from_row,
                )
                .optional()?)
        })
    }

    /// Models for one provider, ordered by name.
    pub fn models_for_provider(&self, provider_id: i64) -> Result<Vec<Model>, StoreError> {
        self.with_connection(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, name, provider_id FROM models WHERE provider_id = ?1 ORDER BY name",
            )?;
            let rows = stmt.query_map(params![provider_id], model_from_row)?;
            Ok(rows.collect::<Result<Vec<_>, _>>()?)
        })
    }

    pub fn model_by_id(&self, id: i64) -> Result<Option<Model>, StoreError> {
        self.with_connection(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, name, provider_id FROM models WHERE id = ?1",
                    params![id],
                    model_from_row,
                )
                .optional()?)
        })
    }

    pub fn model_by_name(
        &self,
        provider_id: i64,
        name: &str,
    ) -> Result<Option<Model>, StoreError> {
        self.with_connection(|conn| {
            Ok(conn
                .query_row(
                    "SELECT id, name, provider_id FROM models WHERE provider_id = ?1 AND name = ?2",
                    params![provider_id, name],
                    model_from_row,
                )
                .optional()?)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn providers_are_listed_by_name() {
        let db = Database::open_in_memory().unwrap();
        let names: Vec<String> = db
            .providers()
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(
            names,
            ["Anthropic", "Deepseek", "Google", "Meta", "Mistral", "OpenAI"]
        );
    }

    #[test]
    fn provider_lookup_ignores_case() {
        let db = Database::open_in_memory().unwrap();
        let provider = db.provider_by_name("deepseek").unwrap().unwrap();
        assert_eq!(provider.name, "Deepseek");
        assert_eq!(provider.base_url, "https://api.deepseek.com/v1");
        assert!(db.provider_by_name("nope").unwrap().is_none());
    }

    #[test]
    fn models_are_scoped_to_their_provider() {
        let db = Database::open_in_memory().unwrap();
        let anthropic = db.provider_by_name("Anthropic").unwrap().unwrap();
        let models = db.models_for_provider(anthropic.id).unwrap();
        let names: Vec<&str> = models.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(names, ["claude-2.0", "claude-2.1", "claude-instant-1.2"]);
        assert!(models.iter().all(|m| m.provider_id == anthropic.id));

        let openai = db.provider_by_name("OpenAI").unwrap().unwrap();
        assert!(db.model_by_name(openai.id, "claude-2.1").unwrap().is_none());
    }

    #[test]
    fn seeding_twice_does_not_duplicate_rows() {
        let db = Database::open_in_memory().unwrap();
        let count_models = |db: &Database| -> i64 {
            db.with_connection(|conn| {
                Ok(conn.query_row("SELECT COUNT(*) FROM models", [], |row| row.get(0))?)
            })
            .unwrap()
        };
        let before = count_models(&db);
        db.with_connection(|conn| seed_builtin_catalog(conn)).unwrap();
        assert_eq!(count_models(&db), before);
    }

    #[test]
    fn models_must_reference_an_existing_provider() {
        let db = Database::open_in_memory().unwrap();
        let result = db.with_connection(|conn| {
            conn.execute(
                "INSERT INTO models (name, provider_id) VALUES ('ghost', 9999)",
                [],
            )?;
            Ok(())
        });
        assert!(matches!(result, Err(StoreError::Sqlite(_))));
    }
}
