use anyhow::{anyhow, Result};
use base64::engine::general_purpose::STANDARD as B64_ENGINE;
use base64::Engine;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use serde_json::json;
use time::OffsetDateTime;

use crate::compose::MessageType;
use crate::db::DbPool;
use crate::providers::PROVIDER_SEEDS;

const ACTIVE_KEY: &str = "generation.active";

/// Provider selection the dispatcher reads before every request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GenerationSettings {
    pub provider: String,
    pub model: String,
    /// End-user key, empty when the gateway should fall back to its own.
    pub api_key: String,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            provider: "gemini".to_string(),
            model: "gemini-2.0-flash-exp".to_string(),
            api_key: String::new(),
        }
    }
}

/// Source of the active generation settings. The dispatcher only needs this
/// seam, which also lets tests pin settings without a database.
pub trait SettingsStore: Send + Sync {
    fn load(&self) -> Result<GenerationSettings>;
    fn save(&self, settings: &GenerationSettings) -> Result<()>;
}

pub struct SqliteSettingsStore {
    pool: DbPool,
}

impl SqliteSettingsStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

impl SettingsStore for SqliteSettingsStore {
    fn load(&self) -> Result<GenerationSettings> {
        let conn = self.pool.get()?;
        read_settings(&conn)
    }

    fn save(&self, settings: &GenerationSettings) -> Result<()> {
        let conn = self.pool.get()?;
        write_settings(&conn, settings)
    }
}

/// Ensure a usable active selection exists. Called once at startup after
/// migrations; never overwrites a selection the user already made.
pub fn seed_defaults(conn: &Connection) -> Result<()> {
    let existing: Option<String> = conn
        .query_row(
            "SELECT value FROM app_settings WHERE key = ?1",
            params![ACTIVE_KEY],
            |row| row.get(0),
        )
        .optional()?;
    if existing.is_none() {
        let seed = PROVIDER_SEEDS
            .first()
            .ok_or_else(|| anyhow!("no providers seeded"))?;
        let defaults = GenerationSettings {
            provider: seed.id.to_string(),
            model: seed
                .default_models
                .first()
                .map(|m| m.id.to_string())
                .unwrap_or_default(),
            api_key: String::new(),
        };
        set_active(conn, &defaults.provider, &defaults.model)?;
    }
    Ok(())
}

pub fn read_settings(conn: &Connection) -> Result<GenerationSettings> {
    let mut settings = GenerationSettings::default();
    if let Some((provider, model)) = read_active(conn)? {
        settings.provider = provider;
        settings.model = model;
    }
    if let Some(secret) = load_secret(conn, &settings.provider)? {
        settings.api_key = secret;
    }
    Ok(settings)
}

pub fn write_settings(conn: &Connection, settings: &GenerationSettings) -> Result<()> {
    set_active(conn, &settings.provider, &settings.model)?;
    store_secret(conn, &settings.provider, &settings.api_key)?;
    Ok(())
}

fn read_active(conn: &Connection) -> Result<Option<(String, String)>> {
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM app_settings WHERE key = ?1",
            params![ACTIVE_KEY],
            |row| row.get(0),
        )
        .optional()?;
    let Some(raw) = value else {
        return Ok(None);
    };
    let data: serde_json::Value = serde_json::from_str(&raw)?;
    let provider = data
        .get("provider")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    let model = data
        .get("model")
        .and_then(|v| v.as_str())
        .unwrap_or_default()
        .to_string();
    Ok(Some((provider, model)))
}

fn set_active(conn: &Connection, provider: &str, model: &str) -> Result<()> {
    let now = OffsetDateTime::now_utc().unix_timestamp();
    let payload = json!({ "provider": provider, "model": model }).to_string();
    conn.execute(
        "INSERT INTO app_settings (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![ACTIVE_KEY, payload, now],
    )?;
    Ok(())
}

/// Store an API key at rest, base64-encoded. An empty key deletes the row.
pub fn store_secret(conn: &Connection, provider: &str, api_key: &str) -> Result<()> {
    let trimmed = api_key.trim();
    if trimmed.is_empty() {
        conn.execute(
            "DELETE FROM provider_credentials WHERE provider_id = ?1",
            params![provider],
        )?;
        return Ok(());
    }
    let encoded = B64_ENGINE.encode(trimmed.as_bytes());
    let now = OffsetDateTime::now_utc().unix_timestamp();
    conn.execute(
        "INSERT INTO provider_credentials (provider_id, secret, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?3)
         ON CONFLICT(provider_id) DO UPDATE SET secret = excluded.secret, updated_at = excluded.updated_at",
        params![provider, encoded, now],
    )?;
    Ok(())
}

pub fn load_secret(conn: &Connection, provider: &str) -> Result<Option<String>> {
    let secret: Option<String> = conn
        .query_row(
            "SELECT secret FROM provider_credentials WHERE provider_id = ?1",
            params![provider],
            |row| row.get(0),
        )
        .optional()?;
    let Some(encoded) = secret else {
        return Ok(None);
    };
    let decoded = B64_ENGINE
        .decode(encoded.as_bytes())
        .map_err(|_| anyhow!("Failed to decode stored credential"))?;
    let value = String::from_utf8(decoded)
        .map_err(|_| anyhow!("Stored credential was not valid UTF-8"))?;
    Ok(Some(value))
}

/// User override for a built-in system prompt, if one was saved.
pub fn custom_prompt(conn: &Connection, message_type: MessageType) -> Result<Option<String>> {
    let key = prompt_key(message_type);
    let value: Option<String> = conn
        .query_row(
            "SELECT value FROM app_settings WHERE key = ?1",
            params![key],
            |row| row.get(0),
        )
        .optional()?;
    Ok(value.filter(|v| !v.trim().is_empty()))
}

/// Save a prompt override. An empty prompt reverts to the built-in default.
pub fn set_custom_prompt(
    conn: &Connection,
    message_type: MessageType,
    prompt: &str,
) -> Result<()> {
    let key = prompt_key(message_type);
    if prompt.trim().is_empty() {
        conn.execute("DELETE FROM app_settings WHERE key = ?1", params![key])?;
        return Ok(());
    }
    let now = OffsetDateTime::now_utc().unix_timestamp();
    conn.execute(
        "INSERT INTO app_settings (key, value, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
        params![key, prompt, now],
    )?;
    Ok(())
}

fn prompt_key(message_type: MessageType) -> String {
    format!("prompts.{}", message_type.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::apply_migrations;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();
        conn
    }

    #[test]
    fn seeding_picks_gemini_with_its_default_model() {
        let conn = test_conn();
        seed_defaults(&conn).unwrap();
        let settings = read_settings(&conn).unwrap();
        assert_eq!(settings.provider, "gemini");
        assert_eq!(settings.model, "gemini-2.0-flash-exp");
        assert!(settings.api_key.is_empty());
    }

    #[test]
    fn seeding_never_overwrites_an_existing_selection() {
        let conn = test_conn();
        set_active(&conn, "openrouter", "meta-llama/llama-3-70b").unwrap();
        seed_defaults(&conn).unwrap();
        let settings = read_settings(&conn).unwrap();
        assert_eq!(settings.provider, "openrouter");
        assert_eq!(settings.model, "meta-llama/llama-3-70b");
    }

    #[test]
    fn secrets_are_encoded_at_rest_and_decoded_on_read() {
        let conn = test_conn();
        store_secret(&conn, "gemini", "sk-test-123").unwrap();
        let raw: String = conn
            .query_row(
                "SELECT secret FROM provider_credentials WHERE provider_id = 'gemini'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_ne!(raw, "sk-test-123");
        assert_eq!(load_secret(&conn, "gemini").unwrap().as_deref(), Some("sk-test-123"));

        store_secret(&conn, "gemini", "  ").unwrap();
        assert_eq!(load_secret(&conn, "gemini").unwrap(), None);
    }

    #[test]
    fn settings_round_trip_through_write_and_read() {
        let conn = test_conn();
        let settings = GenerationSettings {
            provider: "openrouter".into(),
            model: "anthropic/claude-3.5-sonnet".into(),
            api_key: "or-key".into(),
        };
        write_settings(&conn, &settings).unwrap();
        let loaded = read_settings(&conn).unwrap();
        assert_eq!(loaded.provider, settings.provider);
        assert_eq!(loaded.model, settings.model);
        assert_eq!(loaded.api_key, settings.api_key);
    }

    #[test]
    fn prompt_overrides_fall_back_to_builtin_when_cleared() {
        let conn = test_conn();
        assert_eq!(custom_prompt(&conn, MessageType::Mom).unwrap(), None);
        set_custom_prompt(&conn, MessageType::Mom, "Always sign off as Alice.").unwrap();
        assert_eq!(
            custom_prompt(&conn, MessageType::Mom).unwrap().as_deref(),
            Some("Always sign off as Alice.")
        );
        assert_eq!(custom_prompt(&conn, MessageType::Sales).unwrap(), None);
        set_custom_prompt(&conn, MessageType::Mom, "").unwrap();
        assert_eq!(custom_prompt(&conn, MessageType::Mom).unwrap(), None);
    }
}
