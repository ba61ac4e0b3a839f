use r2d2_sqlite::rusqlite::{params, Connection};
use serde_json::Value;
use time::OffsetDateTime;
use uuid::Uuid;

/// A persisted diagnostic event, most useful for inspecting why a
/// generation attempt failed after the fact.
#[derive(Debug, Clone)]
pub struct EventRow {
    pub id: String,
    pub ts: i64,
    pub level: String,
    pub code: Option<String>,
    pub module: String,
    pub message: String,
    pub explain: Option<String>,
}

pub fn log_event(
    conn: &Connection,
    level: &str,
    code: Option<&str>,
    module: &str,
    message: &str,
    explain: Option<&str>,
    data: Option<Value>,
) -> rusqlite::Result<()> {
    let id = Uuid::new_v4().to_string();
    let ts = OffsetDateTime::now_utc().unix_timestamp();
    let data_str = data.map(|v| v.to_string());
    conn.execute(
        "INSERT INTO event_log (id, ts, level, code, module, message, explain, data) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![id, ts, level, code, module, message, explain, data_str],
    )?;
    Ok(())
}

/// Most recent events for a module, newest first.
pub fn recent_events(
    conn: &Connection,
    module: &str,
    limit: u32,
) -> rusqlite::Result<Vec<EventRow>> {
    let mut stmt = conn.prepare(
        "SELECT id, ts, level, code, module, message, explain FROM event_log WHERE module = ?1 ORDER BY ts DESC, rowid DESC LIMIT ?2",
    )?;
    let rows = stmt.query_map(params![module, limit], |row| {
        Ok(EventRow {
            id: row.get(0)?,
            ts: row.get(1)?,
            level: row.get(2)?,
            code: row.get(3)?,
            module: row.get(4)?,
            message: row.get(5)?,
            explain: row.get(6)?,
        })
    })?;
    rows.collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::apply_migrations;
    use serde_json::json;

    #[test]
    fn events_are_persisted_and_queried_newest_first() {
        let conn = Connection::open_in_memory().unwrap();
        apply_migrations(&conn).unwrap();

        log_event(&conn, "info", None, "dispatcher", "first", None, None).unwrap();
        log_event(
            &conn,
            "error",
            Some("DSP-0503"),
            "dispatcher",
            "gateway unavailable",
            Some("The gateway returned a retryable status."),
            Some(json!({ "status": 503 })),
        )
        .unwrap();
        log_event(&conn, "info", None, "gateway", "other module", None, None).unwrap();

        let events = recent_events(&conn, "dispatcher", 10).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].message, "gateway unavailable");
        assert_eq!(events[0].code.as_deref(), Some("DSP-0503"));
        assert_eq!(events[1].message, "first");
    }
}
