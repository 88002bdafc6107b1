use anyhow::{Context, Result};
use rusqlite::Connection;

/// Highest migration this build knows about, stored in `PRAGMA user_version`.
pub const SCHEMA_VERSION: i64 = 3;

type Migration = fn(&Connection) -> Result<()>;

const MIGRATIONS: [(i64, Migration); 3] = [
    (1, create_agent_sessions),
    (2, add_task_linkage),
    (3, add_preview_and_intent),
];

pub fn initialize_schema(conn: &Connection) -> Result<()> {
    let current = schema_version(conn)?;

    for (version, migration) in MIGRATIONS {
        if version <= current {
            continue;
        }
        migration(conn).with_context(|| format!("Failed to apply schema migration {version}"))?;
        conn.pragma_update(None, "user_version", version)?;
        log::debug!("Applied session store migration {version}");
    }

    Ok(())
}

pub fn schema_version(conn: &Connection) -> Result<i64> {
    let version = conn.query_row("PRAGMA user_version", [], |row| row.get(0))?;
    Ok(version)
}

fn column_exists(conn: &Connection, table: &str, column: &str) -> Result<bool> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
    let names = stmt.query_map([], |row| row.get::<_, String>(1))?;
    for name in names {
        if name? == column {
            return Ok(true);
        }
    }
    Ok(false)
}

fn add_column_if_missing(conn: &Connection, table: &str, column: &str, decl: &str) -> Result<()> {
    if !column_exists(conn, table, column)? {
        conn.execute(&format!("ALTER TABLE {table} ADD COLUMN {column} {decl}"), [])?;
    }
    Ok(())
}

fn create_agent_sessions(conn: &Connection) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS agent_sessions (
            id TEXT PRIMARY KEY,
            agent_profile_id TEXT NOT NULL,
            agent_profile_name TEXT NOT NULL,
            agent_type TEXT NOT NULL,
            agent_options TEXT NOT NULL DEFAULT '{}',
            agent_session_id TEXT,
            agent_session_path TEXT,
            worktree_path TEXT NOT NULL,
            branch_name TEXT,
            project_path TEXT,
            created_at INTEGER NOT NULL,
            ended_at INTEGER
        )",
        [],
    )?;

    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_agent_sessions_project ON agent_sessions(project_path, created_at DESC)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_agent_sessions_worktree ON agent_sessions(worktree_path)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_agent_sessions_created ON agent_sessions(created_at DESC)",
        [],
    )?;
    Ok(())
}

fn add_task_linkage(conn: &Connection) -> Result<()> {
    add_column_if_missing(conn, "agent_sessions", "td_task_id", "TEXT")?;
    add_column_if_missing(conn, "agent_sessions", "td_session_id", "TEXT")?;
    add_column_if_missing(conn, "agent_sessions", "session_name", "TEXT")?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_agent_sessions_td_session ON agent_sessions(td_session_id, created_at DESC)",
        [],
    )?;
    Ok(())
}

fn add_preview_and_intent(conn: &Connection) -> Result<()> {
    add_column_if_missing(conn, "agent_sessions", "content_preview", "TEXT")?;
    add_column_if_missing(
        conn,
        "agent_sessions",
        "intent",
        "TEXT NOT NULL DEFAULT 'work'",
    )?;
    Ok(())
}
