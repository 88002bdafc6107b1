use super::db_schema::initialize_schema;
use crate::errors::OrchestratorError;
use anyhow::{Context, Result, anyhow};
use chrono::Utc;
use log::{info, warn};
use r2d2::{ManageConnection, Pool, PooledConnection};
use rusqlite::{Connection, ErrorCode};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);
const CHECKOUT_TIMEOUT: Duration = Duration::from_secs(5);
const FILE_POOL_SIZE: u32 = 4;
const SIDECAR_SUFFIXES: [&str; 3] = ["-journal", "-wal", "-shm"];

#[derive(Debug, Clone)]
enum DbLocation {
    File(PathBuf),
    Memory,
}

/// Opens plain rusqlite connections for the r2d2 pool.
///
/// Opening never reads the file header, so a corrupt file surfaces on the
/// first statement instead of stalling pool checkout.
#[derive(Debug)]
pub struct SqliteConnectionManager {
    location: DbLocation,
}

impl ManageConnection for SqliteConnectionManager {
    type Connection = Connection;
    type Error = rusqlite::Error;

    fn connect(&self) -> Result<Connection, rusqlite::Error> {
        let conn = match &self.location {
            DbLocation::File(path) => Connection::open(path)?,
            DbLocation::Memory => Connection::open_in_memory()?,
        };
        conn.busy_timeout(BUSY_TIMEOUT)?;
        Ok(conn)
    }

    fn is_valid(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        conn.query_row("SELECT 1", [], |_| Ok(()))
    }

    fn has_broken(&self, _conn: &mut Connection) -> bool {
        false
    }
}

struct DatabaseInner {
    location: DbLocation,
    pool: RwLock<Pool<SqliteConnectionManager>>,
    generation: AtomicU64,
    recovery_lock: Mutex<()>,
}

#[derive(Clone)]
pub struct Database {
    inner: Arc<DatabaseInner>,
}

impl Database {
    pub fn new(db_path: Option<PathBuf>) -> Result<Self> {
        let path = match db_path {
            Some(path) => path,
            None => default_database_path()?,
        };

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create database directory {}", parent.display())
            })?;
        }

        info!("Opening session store at {}", path.display());
        Self::open(DbLocation::File(path))
    }

    pub fn new_in_memory() -> Result<Self> {
        Self::open(DbLocation::Memory)
    }

    fn open(location: DbLocation) -> Result<Self> {
        let pool = build_pool(&location)?;
        let db = Self {
            inner: Arc::new(DatabaseInner {
                location,
                pool: RwLock::new(pool),
                generation: AtomicU64::new(0),
                recovery_lock: Mutex::new(()),
            }),
        };
        db.with_recovery("initialize schema", initialize_schema)?;
        Ok(db)
    }

    pub fn path(&self) -> Option<&Path> {
        match &self.inner.location {
            DbLocation::File(path) => Some(path.as_path()),
            DbLocation::Memory => None,
        }
    }

    pub fn get_conn(&self) -> Result<PooledConnection<SqliteConnectionManager>> {
        let pool = self
            .inner
            .pool
            .read()
            .map_err(|_| anyhow!("database pool lock poisoned"))?
            .clone();
        pool.get().context("Failed to get database connection")
    }

    /// Runs `op` on a pooled connection, rebuilding the store once if the
    /// failure looks like file corruption. A failure after the rebuild is fatal.
    pub fn with_recovery<T, F>(&self, operation: &str, op: F) -> Result<T>
    where
        F: Fn(&Connection) -> Result<T>,
    {
        let generation = self.inner.generation.load(Ordering::SeqCst);
        let err = match self.run(&op) {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !is_corruption_error(&err) {
            return Err(err);
        }

        warn!("Session store corruption detected during '{operation}': {err:#}");
        if let Err(recovery_err) = self.recover(generation) {
            return Err(self.fatal(format!("recovery failed: {recovery_err:#}")));
        }

        self.run(&op)
            .map_err(|retry_err| self.fatal(format!("'{operation}' failed after rebuild: {retry_err:#}")))
    }

    fn run<T, F>(&self, op: &F) -> Result<T>
    where
        F: Fn(&Connection) -> Result<T>,
    {
        let conn = self.get_conn()?;
        op(&conn)
    }

    fn fatal(&self, message: String) -> anyhow::Error {
        let path = self
            .path()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| ":memory:".to_string());
        anyhow::Error::new(OrchestratorError::StorageCorruption { path, message })
    }

    fn recover(&self, observed_generation: u64) -> Result<()> {
        let _guard = self
            .inner
            .recovery_lock
            .lock()
            .map_err(|_| anyhow!("database recovery lock poisoned"))?;

        if self.inner.generation.load(Ordering::SeqCst) != observed_generation {
            // Another caller already rebuilt the store.
            return Ok(());
        }

        if let DbLocation::File(path) = &self.inner.location {
            quarantine(path)?;
        }

        let pool = build_pool(&self.inner.location)?;
        {
            let conn = pool.get().context("Failed to open rebuilt session store")?;
            initialize_schema(&conn)?;
        }

        *self
            .inner
            .pool
            .write()
            .map_err(|_| anyhow!("database pool lock poisoned"))? = pool;
        self.inner.generation.fetch_add(1, Ordering::SeqCst);
        info!("Session store rebuilt with a fresh schema");
        Ok(())
    }
}

fn build_pool(location: &DbLocation) -> Result<Pool<SqliteConnectionManager>> {
    let manager = SqliteConnectionManager {
        location: location.clone(),
    };
    let builder = Pool::builder()
        .test_on_check_out(false)
        .connection_timeout(CHECKOUT_TIMEOUT);
    let builder = match location {
        // Every in-memory connection is its own database, so keep exactly one alive.
        DbLocation::Memory => builder.max_size(1).idle_timeout(None).max_lifetime(None),
        DbLocation::File(_) => builder.max_size(FILE_POOL_SIZE),
    };
    builder
        .build(manager)
        .context("Failed to build database connection pool")
}

fn quarantine(path: &Path) -> Result<()> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_else(|| "sessions.db".to_string());
    let aside = path.with_file_name(format!(
        "{file_name}.corrupt-{}",
        Utc::now().timestamp_millis()
    ));

    match fs::rename(path, &aside) {
        Ok(()) => warn!(
            "Moved unreadable session store {} aside to {}",
            path.display(),
            aside.display()
        ),
        Err(err) if err.kind() == ErrorKind::NotFound => {}
        Err(err) => {
            return Err(err).with_context(|| {
                format!("Failed to move corrupt session store {}", path.display())
            });
        }
    }

    for suffix in SIDECAR_SUFFIXES {
        let sidecar = PathBuf::from(format!("{}{suffix}", path.display()));
        match fs::remove_file(&sidecar) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => warn!("Failed to remove {}: {err}", sidecar.display()),
        }
    }
    Ok(())
}

pub fn is_corruption_error(err: &anyhow::Error) -> bool {
    err.chain().any(|cause| {
        if let Some(rusqlite::Error::SqliteFailure(failure, _)) =
            cause.downcast_ref::<rusqlite::Error>()
            && matches!(
                failure.code,
                ErrorCode::DatabaseCorrupt | ErrorCode::NotADatabase
            )
        {
            return true;
        }
        let message = cause.to_string().to_lowercase();
        message.contains("malformed") || message.contains("not a database")
    })
}

pub fn default_database_path() -> Result<PathBuf> {
    let data_dir = dirs::data_dir().ok_or_else(|| anyhow!("Failed to resolve data directory"))?;
    Ok(data_dir.join("agentdeck").join("sessions.db"))
}
