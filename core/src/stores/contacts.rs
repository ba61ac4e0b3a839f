use anyhow::Result;
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

/// A remembered recipient, keyed by name for autocomplete.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContactRecord {
    pub name: String,
    pub phone: String,
}

/// Upsert a contact. A later meeting with the same name refreshes the phone.
pub fn save_contact(conn: &Connection, name: &str, phone: &str) -> Result<()> {
    let name = name.trim();
    let phone = phone.trim();
    if name.is_empty() || phone.is_empty() {
        return Ok(());
    }
    let now = OffsetDateTime::now_utc().unix_timestamp();
    conn.execute(
        "INSERT INTO contacts (name, phone, updated_at) VALUES (?1, ?2, ?3)
         ON CONFLICT(name) DO UPDATE SET phone = excluded.phone, updated_at = excluded.updated_at",
        params![name, phone, now],
    )?;
    Ok(())
}

pub fn find_contact(conn: &Connection, name: &str) -> Result<Option<ContactRecord>> {
    let record = conn
        .query_row(
            "SELECT name, phone FROM contacts WHERE name = ?1",
            params![name.trim()],
            |row| {
                Ok(ContactRecord {
                    name: row.get(0)?,
                    phone: row.get(1)?,
                })
            },
        )
        .optional()?;
    Ok(record)
}

pub fn list_contacts(conn: &Connection) -> Result<Vec<ContactRecord>> {
    let mut stmt =
        conn.prepare("SELECT name, phone FROM contacts ORDER BY name COLLATE NOCASE")?;
    let rows = stmt.query_map([], |row| {
        Ok(ContactRecord {
            name: row.get(0)?,
            phone: row.get(1)?,
        })
    })?;
    let mut contacts = Vec::new();
    for row in rows {
        contacts.push(row?);
    }
    Ok(contacts)
}

pub fn delete_contact(conn: &Connection, name: &str) -> Result<bool> {
    let changed = conn.execute("DELETE FROM contacts WHERE name = ?1", params![name.trim()])?;
    Ok(changed > 0)
}
