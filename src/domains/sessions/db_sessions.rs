use super::entity::{NewSessionRecord, SessionIntent, SessionQuery, SessionRecord, TdSessionLookup};
use super::utils::{escape_like, normalize_optional};
use crate::domains::agents::{AgentOptions, AgentType};
use crate::infrastructure::database::Database;
use crate::infrastructure::database::timestamps::{
    utc_from_epoch_millis_lossy, utc_from_epoch_millis_lossy_opt,
};
use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::types::{Type, Value};
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};

const SELECT_COLUMNS: &str = "id, agent_profile_id, agent_profile_name, agent_type, agent_options,
    agent_session_id, agent_session_path, worktree_path, branch_name, project_path,
    td_task_id, td_session_id, session_name, content_preview, intent, created_at, ended_at";

const NEWEST_FIRST: &str = "ORDER BY created_at DESC, rowid DESC";

pub trait AgentSessionMethods {
    fn insert_agent_session(&self, input: &NewSessionRecord) -> Result<SessionRecord>;
    /// Inserts the row, or clears `ended_at` when the id already exists.
    fn upsert_started_agent_session(&self, input: &NewSessionRecord) -> Result<SessionRecord>;
    fn get_agent_session(&self, id: &str) -> Result<Option<SessionRecord>>;
    fn set_agent_session_ended(&self, id: &str, ended_at: DateTime<Utc>) -> Result<bool>;
    fn set_agent_session_resumed(&self, id: &str) -> Result<bool>;
    fn set_agent_session_name(&self, id: &str, name: &str) -> Result<bool>;
    /// Fills the transcript link only if none is set yet.
    fn set_agent_session_link(
        &self,
        id: &str,
        agent_session_id: Option<&str>,
        path: &str,
        preview: Option<&str>,
    ) -> Result<bool>;
    /// Replaces any existing link and drops the stale preview.
    fn replace_agent_session_link(&self, id: &str, agent_session_id: Option<&str>, path: &str) -> Result<bool>;
    fn set_agent_session_preview(&self, id: &str, preview: Option<&str>) -> Result<bool>;
    fn query_agent_sessions(&self, query: &SessionQuery) -> Result<Vec<SessionRecord>>;
    fn count_agent_sessions(&self, query: &SessionQuery) -> Result<u64>;
    fn latest_agent_session_for_td(&self, lookup: &TdSessionLookup) -> Result<Option<SessionRecord>>;
    fn list_unended_agent_sessions(&self) -> Result<Vec<SessionRecord>>;
}

fn conversion_error(index: usize, message: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(index, Type::Text, message.into())
}

fn row_to_record(row: &Row) -> rusqlite::Result<SessionRecord> {
    let agent_type: String = row.get(3)?;
    let options_json: String = row.get(4)?;
    let intent: String = row.get(14)?;

    Ok(SessionRecord {
        id: row.get(0)?,
        agent_profile_id: row.get(1)?,
        agent_profile_name: row.get(2)?,
        agent_type: agent_type
            .parse::<AgentType>()
            .map_err(|e| conversion_error(3, e))?,
        agent_options: serde_json::from_str::<AgentOptions>(&options_json).unwrap_or_else(|err| {
            log::warn!("Ignoring unreadable agent options '{options_json}': {err}");
            AgentOptions::new()
        }),
        agent_session_id: row.get(5)?,
        agent_session_path: row.get(6)?,
        worktree_path: row.get(7)?,
        branch_name: row.get(8)?,
        project_path: row.get(9)?,
        td_task_id: row.get(10)?,
        td_session_id: row.get(11)?,
        session_name: row.get(12)?,
        content_preview: row.get(13)?,
        intent: intent.parse::<SessionIntent>().unwrap_or_default(),
        created_at: utc_from_epoch_millis_lossy(row.get(15)?),
        ended_at: utc_from_epoch_millis_lossy_opt(row.get(16)?),
    })
}

fn fetch_by_id(conn: &Connection, id: &str) -> Result<Option<SessionRecord>> {
    let record = conn
        .query_row(
            &format!("SELECT {SELECT_COLUMNS} FROM agent_sessions WHERE id = ?1"),
            params![id],
            row_to_record,
        )
        .optional()?;
    Ok(record)
}

fn insert_values(input: &NewSessionRecord) -> Result<Vec<Value>> {
    let created_at = input.created_at.unwrap_or_else(Utc::now).timestamp_millis();
    let options = serde_json::to_string(&input.agent_options)?;
    let opt = |value: &Option<String>| match normalize_optional(value.as_deref()) {
        Some(text) => Value::Text(text),
        None => Value::Null,
    };

    Ok(vec![
        Value::Text(input.id.clone()),
        Value::Text(input.agent_profile_id.clone()),
        Value::Text(input.agent_profile_name.clone()),
        Value::Text(input.agent_type.as_str().to_string()),
        Value::Text(options),
        Value::Text(input.worktree_path.clone()),
        opt(&input.branch_name),
        opt(&input.project_path),
        opt(&input.td_task_id),
        opt(&input.td_session_id),
        opt(&input.session_name),
        Value::Text(input.intent.as_str().to_string()),
        Value::Integer(created_at),
    ])
}

const INSERT_SQL: &str = "INSERT INTO agent_sessions (
        id, agent_profile_id, agent_profile_name, agent_type, agent_options,
        worktree_path, branch_name, project_path, td_task_id, td_session_id,
        session_name, intent, created_at
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)";

/// WHERE clause plus bound values for a history query.
fn filter_clause(query: &SessionQuery) -> (String, Vec<Value>) {
    let mut clauses: Vec<String> = Vec::new();
    let mut values: Vec<Value> = Vec::new();

    for (column, value) in [
        ("project_path", &query.project_path),
        ("worktree_path", &query.worktree_path),
        ("td_task_id", &query.td_task_id),
    ] {
        if let Some(value) = normalize_optional(value.as_deref()) {
            values.push(Value::Text(value));
            clauses.push(format!("{column} = ?{}", values.len()));
        }
    }

    if let Some(agent_type) = query.agent_type {
        values.push(Value::Text(agent_type.as_str().to_string()));
        clauses.push(format!("agent_type = ?{}", values.len()));
    }
    if let Some(after) = query.created_after {
        values.push(Value::Integer(after.timestamp_millis()));
        clauses.push(format!("created_at >= ?{}", values.len()));
    }
    if let Some(before) = query.created_before {
        values.push(Value::Integer(before.timestamp_millis()));
        clauses.push(format!("created_at <= ?{}", values.len()));
    }
    if let Some(term) = normalize_optional(query.search.as_deref()) {
        values.push(Value::Text(format!("%{}%", escape_like(&term))));
        let n = values.len();
        clauses.push(format!(
            "(session_name LIKE ?{n} ESCAPE '\\' OR content_preview LIKE ?{n} ESCAPE '\\' \
             OR branch_name LIKE ?{n} ESCAPE '\\' OR td_task_id LIKE ?{n} ESCAPE '\\' \
             OR agent_profile_name LIKE ?{n} ESCAPE '\\')"
        ));
    }

    if clauses.is_empty() {
        (String::new(), values)
    } else {
        (format!("WHERE {}", clauses.join(" AND ")), values)
    }
}

impl AgentSessionMethods for Database {
    fn insert_agent_session(&self, input: &NewSessionRecord) -> Result<SessionRecord> {
        let values = insert_values(input)?;
        self.with_recovery("insert session", |conn| {
            conn.execute(INSERT_SQL, params_from_iter(values.iter()))?;
            fetch_by_id(conn, &input.id)?
                .ok_or_else(|| anyhow::anyhow!("session '{}' missing after insert", input.id))
        })
    }

    fn upsert_started_agent_session(&self, input: &NewSessionRecord) -> Result<SessionRecord> {
        let values = insert_values(input)?;
        let sql = format!("{INSERT_SQL} ON CONFLICT(id) DO UPDATE SET ended_at = NULL");
        self.with_recovery("record session started", |conn| {
            conn.execute(&sql, params_from_iter(values.iter()))?;
            fetch_by_id(conn, &input.id)?
                .ok_or_else(|| anyhow::anyhow!("session '{}' missing after upsert", input.id))
        })
    }

    fn get_agent_session(&self, id: &str) -> Result<Option<SessionRecord>> {
        self.with_recovery("get session", |conn| fetch_by_id(conn, id))
    }

    fn set_agent_session_ended(&self, id: &str, ended_at: DateTime<Utc>) -> Result<bool> {
        self.with_recovery("mark session ended", |conn| {
            let changed = conn.execute(
                "UPDATE agent_sessions SET ended_at = ?2 WHERE id = ?1",
                params![id, ended_at.timestamp_millis()],
            )?;
            Ok(changed > 0)
        })
    }

    fn set_agent_session_resumed(&self, id: &str) -> Result<bool> {
        self.with_recovery("mark session resumed", |conn| {
            let changed = conn.execute(
                "UPDATE agent_sessions SET ended_at = NULL WHERE id = ?1",
                params![id],
            )?;
            Ok(changed > 0)
        })
    }

    fn set_agent_session_name(&self, id: &str, name: &str) -> Result<bool> {
        let name = normalize_optional(Some(name));
        self.with_recovery("rename session", |conn| {
            let changed = conn.execute(
                "UPDATE agent_sessions SET session_name = ?2 WHERE id = ?1",
                params![id, name],
            )?;
            Ok(changed > 0)
        })
    }

    fn set_agent_session_link(
        &self,
        id: &str,
        agent_session_id: Option<&str>,
        path: &str,
        preview: Option<&str>,
    ) -> Result<bool> {
        let agent_session_id = normalize_optional(agent_session_id);
        let preview = normalize_optional(preview);
        self.with_recovery("link transcript", |conn| {
            let changed = conn.execute(
                "UPDATE agent_sessions
                 SET agent_session_id = ?2,
                     agent_session_path = ?3,
                     content_preview = COALESCE(?4, content_preview)
                 WHERE id = ?1 AND agent_session_path IS NULL",
                params![id, agent_session_id, path, preview],
            )?;
            Ok(changed > 0)
        })
    }

    fn replace_agent_session_link(&self, id: &str, agent_session_id: Option<&str>, path: &str) -> Result<bool> {
        let agent_session_id = normalize_optional(agent_session_id);
        self.with_recovery("relink transcript", |conn| {
            let changed = conn.execute(
                "UPDATE agent_sessions
                 SET agent_session_id = ?2, agent_session_path = ?3, content_preview = NULL
                 WHERE id = ?1",
                params![id, agent_session_id, path],
            )?;
            Ok(changed > 0)
        })
    }

    fn set_agent_session_preview(&self, id: &str, preview: Option<&str>) -> Result<bool> {
        let preview = normalize_optional(preview);
        self.with_recovery("update preview", |conn| {
            let changed = conn.execute(
                "UPDATE agent_sessions SET content_preview = ?2 WHERE id = ?1",
                params![id, preview],
            )?;
            Ok(changed > 0)
        })
    }

    fn query_agent_sessions(&self, query: &SessionQuery) -> Result<Vec<SessionRecord>> {
        let (where_clause, mut values) = filter_clause(query);
        values.push(Value::Integer(i64::from(query.effective_limit())));
        let limit_index = values.len();
        values.push(Value::Integer(i64::from(query.offset.unwrap_or(0))));
        let offset_index = values.len();

        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM agent_sessions {where_clause} {NEWEST_FIRST} LIMIT ?{limit_index} OFFSET ?{offset_index}"
        );
        self.with_recovery("query sessions", |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map(params_from_iter(values.iter()), row_to_record)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }

    fn count_agent_sessions(&self, query: &SessionQuery) -> Result<u64> {
        let (where_clause, values) = filter_clause(query);
        let sql = format!("SELECT COUNT(*) FROM agent_sessions {where_clause}");
        self.with_recovery("count sessions", |conn| {
            let count: i64 = conn.query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
            Ok(u64::try_from(count).unwrap_or_default())
        })
    }

    fn latest_agent_session_for_td(&self, lookup: &TdSessionLookup) -> Result<Option<SessionRecord>> {
        let Some(td_session_id) = normalize_optional(Some(&lookup.td_session_id)) else {
            return Ok(None);
        };
        let mut clauses = vec!["td_session_id = ?1".to_string()];
        let mut values = vec![Value::Text(td_session_id)];
        if let Some(task) = normalize_optional(lookup.td_task_id.as_deref()) {
            values.push(Value::Text(task));
            clauses.push(format!("td_task_id = ?{}", values.len()));
        }
        if let Some(project) = normalize_optional(lookup.project_path.as_deref()) {
            values.push(Value::Text(project));
            clauses.push(format!("project_path = ?{}", values.len()));
        }

        let sql = format!(
            "SELECT {SELECT_COLUMNS} FROM agent_sessions WHERE {} {NEWEST_FIRST} LIMIT 1",
            clauses.join(" AND ")
        );
        self.with_recovery("latest session for td id", |conn| {
            let record = conn
                .query_row(&sql, params_from_iter(values.iter()), row_to_record)
                .optional()?;
            Ok(record)
        })
    }

    fn list_unended_agent_sessions(&self) -> Result<Vec<SessionRecord>> {
        let sql = format!("SELECT {SELECT_COLUMNS} FROM agent_sessions WHERE ended_at IS NULL {NEWEST_FIRST}");
        self.with_recovery("list unended sessions", |conn| {
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], row_to_record)?;
            Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
        })
    }
}
