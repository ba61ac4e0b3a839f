use anyhow::{bail, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// A reusable service blurb the user can weave into a message via a
/// `[USE_SNIPPET: name]` marker in the raw notes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnippetRecord {
    pub id: String,
    pub name: String,
    pub content: String,
    pub created_at: i64,
}

pub fn add_snippet(conn: &Connection, name: &str, content: &str) -> Result<SnippetRecord> {
    let name = name.trim();
    let content = content.trim();
    if name.is_empty() || content.is_empty() {
        bail!("snippet name and content are required");
    }
    let record = SnippetRecord {
        id: Uuid::new_v4().to_string(),
        name: name.to_string(),
        content: content.to_string(),
        created_at: OffsetDateTime::now_utc().unix_timestamp(),
    };
    conn.execute(
        "INSERT INTO snippets (id, name, content, created_at) VALUES (?1, ?2, ?3, ?4)
         ON CONFLICT(name) DO UPDATE SET content = excluded.content",
        params![record.id, record.name, record.content, record.created_at],
    )?;
    Ok(record)
}

/// Lookup by marker name, case-insensitive so markers typed by hand still
/// resolve.
pub fn find_snippet(conn: &Connection, name: &str) -> Result<Option<SnippetRecord>> {
    let record = conn
        .query_row(
            "SELECT id, name, content, created_at FROM snippets WHERE name = ?1 COLLATE NOCASE",
            params![name.trim()],
            |row| {
                Ok(SnippetRecord {
                    id: row.get(0)?,
                    name: row.get(1)?,
                    content: row.get(2)?,
                    created_at: row.get(3)?,
                })
            },
        )
        .optional()?;
    Ok(record)
}

pub fn list_snippets(conn: &Connection) -> Result<Vec<SnippetRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, name, content, created_at FROM snippets ORDER BY name COLLATE NOCASE",
    )?;
    let rows = stmt.query_map([], |row| {
        Ok(SnippetRecord {
            id: row.get(0)?,
            name: row.get(1)?,
            content: row.get(2)?,
            created_at: row.get(3)?,
        })
    })?;
    let mut snippets = Vec::new();
    for row in rows {
        snippets.push(row?);
    }
    Ok(snippets)
}

pub fn delete_snippet(conn: &Connection, name: &str) -> Result<bool> {
    let changed = conn.execute(
        "DELETE FROM snippets WHERE name = ?1 COLLATE NOCASE",
        params![name.trim()],
    )?;
    Ok(changed > 0)
}
