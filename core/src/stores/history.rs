use anyhow::Result;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::compose::{MeetingDetails, MessageType};
use crate::gateway::GenerationResult;

/// Oldest entries are dropped once the history grows past this.
pub const MAX_HISTORY_ITEMS: usize = 50;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MeetingRecord {
    pub id: String,
    pub recipient_name: String,
    pub recipient_phone: String,
    pub company_name: String,
    pub meeting_location: String,
    pub message_type: String,
    pub raw_notes: String,
    pub generated_message: String,
    pub action_items: Vec<String>,
    pub created_at: i64,
}

/// Persist a finished generation and trim the history to its cap.
pub fn add_meeting(
    conn: &Connection,
    details: &MeetingDetails,
    message_type: MessageType,
    result: &GenerationResult,
) -> Result<MeetingRecord> {
    let record = MeetingRecord {
        id: Uuid::new_v4().to_string(),
        recipient_name: details.recipient_name.clone(),
        recipient_phone: details.recipient_phone.clone(),
        company_name: details.company_name.clone(),
        meeting_location: details.meeting_location.clone(),
        message_type: message_type.as_str().to_string(),
        raw_notes: details.raw_notes.clone(),
        generated_message: result.whatsapp_message.clone(),
        action_items: result.action_items.clone(),
        created_at: OffsetDateTime::now_utc().unix_timestamp(),
    };
    let action_items_json = serde_json::to_string(&record.action_items)?;
    conn.execute(
        "INSERT INTO meetings (id, recipient_name, recipient_phone, company_name, company_address, meeting_location, participants, message_type, raw_notes, generated_message, action_items, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        params![
            record.id,
            record.recipient_name,
            record.recipient_phone,
            record.company_name,
            details.company_address,
            record.meeting_location,
            details.participants,
            record.message_type,
            record.raw_notes,
            record.generated_message,
            action_items_json,
            record.created_at,
        ],
    )?;
    conn.execute(
        "DELETE FROM meetings WHERE id NOT IN (
             SELECT id FROM meetings ORDER BY created_at DESC, rowid DESC LIMIT ?1
         )",
        params![MAX_HISTORY_ITEMS as i64],
    )?;
    Ok(record)
}

/// Newest first.
pub fn list_meetings(conn: &Connection) -> Result<Vec<MeetingRecord>> {
    let mut stmt = conn.prepare(
        "SELECT id, recipient_name, recipient_phone, company_name, meeting_location, message_type, raw_notes, generated_message, action_items, created_at
         FROM meetings ORDER BY created_at DESC, rowid DESC",
    )?;
    let rows = stmt.query_map([], |row| {
        let action_items_json: String = row.get(8)?;
        // a stored list that no longer parses is surfaced, not emptied
        let action_items = serde_json::from_str(&action_items_json).map_err(|err| {
            rusqlite::Error::FromSqlConversionFailure(
                8,
                rusqlite::types::Type::Text,
                Box::new(err),
            )
        })?;
        Ok(MeetingRecord {
            id: row.get(0)?,
            recipient_name: row.get(1)?,
            recipient_phone: row.get(2)?,
            company_name: row.get(3)?,
            meeting_location: row.get(4)?,
            message_type: row.get(5)?,
            raw_notes: row.get(6)?,
            generated_message: row.get(7)?,
            action_items,
            created_at: row.get(9)?,
        })
    })?;
    let mut meetings = Vec::new();
    for row in rows {
        meetings.push(row?);
    }
    Ok(meetings)
}

pub fn delete_meeting(conn: &Connection, id: &str) -> Result<bool> {
    let changed = conn.execute("DELETE FROM meetings WHERE id = ?1", params![id])?;
    Ok(changed > 0)
}
