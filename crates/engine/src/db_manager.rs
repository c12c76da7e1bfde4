use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use duckdb::types::Value as SqlValue;
use duckdb::{params_from_iter, Config, Connection, Statement};
use serde_json::Value;
use tracing::{debug, error, info};

use crate::config::{default_db_path, EngineConfig, DEFAULT_DATA_DIR};
use crate::types::{AccessMode, DatabaseLocation, IsolationPolicy, Row};
use crate::values::{to_json_value, to_sql_value};
use crate::{DataError, DataResult};

/// Mode-aware access to a single DuckDB database.
///
/// Every operation opens its own connection and closes it when done, so the
/// manager never holds a file connection between calls. Write sessions are
/// serialized by a per-manager lock. Read sessions run alongside each other;
/// whether they also wait for an active writer depends on the
/// [`IsolationPolicy`].
///
/// In-memory databases keep one root instance alive for the lifetime of the
/// manager and hand out cloned connections to it, since a fresh in-memory
/// connection would see an empty database. DuckDB applies access mode per
/// instance, so read-only sessions on an in-memory database are only
/// protected by the lock, not by the engine.
pub struct DataManager {
    location: DatabaseLocation,
    isolation: IsolationPolicy,
    lock: RwLock<()>,
    memory_root: Mutex<Option<Connection>>,
    open_sessions: AtomicUsize,
}

impl DataManager {
    pub fn open(location: DatabaseLocation) -> Self {
        Self {
            location,
            isolation: IsolationPolicy::default(),
            lock: RwLock::new(()),
            memory_root: Mutex::new(None),
            open_sessions: AtomicUsize::new(0),
        }
    }

    pub fn open_file(path: impl Into<std::path::PathBuf>) -> Self {
        Self::open(DatabaseLocation::File(path.into()))
    }

    pub fn in_memory() -> Self {
        Self::open(DatabaseLocation::InMemory)
    }

    /// Uses `./data/analytics.duckdb`, creating `./data` when it is missing.
    pub fn open_default() -> DataResult<Self> {
        fs::create_dir_all(DEFAULT_DATA_DIR)?;
        Ok(Self::open(DatabaseLocation::File(default_db_path())))
    }

    pub fn from_config(config: &EngineConfig) -> DataResult<Self> {
        let manager = match &config.location {
            Some(location) => Self::open(location.clone()),
            None => Self::open_default()?,
        };
        Ok(manager.with_isolation(config.isolation))
    }

    pub fn with_isolation(mut self, isolation: IsolationPolicy) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn location(&self) -> &DatabaseLocation {
        &self.location
    }

    pub fn isolation(&self) -> IsolationPolicy {
        self.isolation
    }

    /// Number of sessions currently holding a connection.
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }

    /// Opens a scoped session in the given mode.
    ///
    /// `ReadWrite` blocks until no other write session is active. Dropping the
    /// returned session closes its connection and then releases the lock, on
    /// every exit path including unwinding. Sessions are not reentrant: a
    /// thread holding a session must not acquire another one on the same
    /// manager while a conflicting lock mode is involved.
    pub fn acquire_session(&self, mode: AccessMode) -> DataResult<Session<'_>> {
        let guard = match (mode, self.isolation) {
            (AccessMode::ReadWrite, _) => {
                LockGuard::Exclusive(self.lock.write().unwrap_or_else(PoisonError::into_inner))
            }
            (AccessMode::ReadOnly, IsolationPolicy::Strict) => {
                LockGuard::Shared(self.lock.read().unwrap_or_else(PoisonError::into_inner))
            }
            (AccessMode::ReadOnly, IsolationPolicy::Concurrent) => LockGuard::Unlocked,
        };

        let conn = self.connect(mode)?;
        self.open_sessions.fetch_add(1, Ordering::SeqCst);
        debug!(location = %self.location, ?mode, "session opened");

        Ok(Session {
            conn,
            mode,
            _tracker: SessionTracker {
                open_sessions: &self.open_sessions,
                mode,
            },
            _guard: guard,
        })
    }

    /// Runs one statement and returns every result row.
    pub fn execute(&self, query: &str, params: &[Value], mode: AccessMode) -> DataResult<Vec<Row>> {
        let result = self
            .acquire_session(mode)
            .and_then(|session| session.execute(query, params));
        if let Err(err) = &result {
            error!(query, error = %err, "query failed");
        }
        result
    }

    pub fn execute_write(&self, query: &str, params: &[Value]) -> DataResult<Vec<Row>> {
        self.execute(query, params, AccessMode::ReadWrite)
    }

    /// Nothing to release: connections live only as long as their session.
    pub fn close(&self) {
        info!(location = %self.location, "data manager closed; connections are managed per operation");
    }

    fn connect(&self, mode: AccessMode) -> DataResult<Connection> {
        let opened = match &self.location {
            DatabaseLocation::InMemory => self.memory_connection(),
            DatabaseLocation::File(path) => {
                let access = match mode {
                    AccessMode::ReadOnly => duckdb::AccessMode::ReadOnly,
                    AccessMode::ReadWrite => duckdb::AccessMode::ReadWrite,
                };
                Config::default()
                    .access_mode(access)
                    .and_then(|config| Connection::open_with_flags(path, config))
            }
        };
        opened.map_err(|source| DataError::Connection {
            location: self.location.clone(),
            source,
        })
    }

    fn memory_connection(&self) -> duckdb::Result<Connection> {
        let mut root = self
            .memory_root
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(conn) = root.as_ref() {
            return conn.try_clone();
        }
        let conn = root.insert(Connection::open_in_memory()?);
        conn.try_clone()
    }
}

// Guards are held only for their Drop.
#[allow(dead_code)]
enum LockGuard<'a> {
    Shared(RwLockReadGuard<'a, ()>),
    Exclusive(RwLockWriteGuard<'a, ()>),
    Unlocked,
}

/// A connection scoped to one unit of work.
///
/// Fields drop in declaration order: the connection closes first, then the
/// session count drops, then the lock guard is released.
pub struct Session<'a> {
    conn: Connection,
    mode: AccessMode,
    _tracker: SessionTracker<'a>,
    _guard: LockGuard<'a>,
}

struct SessionTracker<'a> {
    open_sessions: &'a AtomicUsize,
    mode: AccessMode,
}

impl Session<'_> {
    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn execute(&self, query: &str, params: &[Value]) -> DataResult<Vec<Row>> {
        run_query(&self.conn, query, params).map_err(|source| DataError::Query {
            query: query.to_string(),
            source,
        })
    }
}

impl Drop for SessionTracker<'_> {
    fn drop(&mut self) {
        self.open_sessions.fetch_sub(1, Ordering::SeqCst);
        debug!(mode = ?self.mode, "session closed");
    }
}

fn run_query(conn: &Connection, query: &str, params: &[Value]) -> duckdb::Result<Vec<Row>> {
    let bound: Vec<SqlValue> = params.iter().map(to_sql_value).collect();
    let mut stmt = conn.prepare(query)?;
    let mut rows = stmt.query(params_from_iter(bound.iter()))?;
    let columns = rows
        .as_ref()
        .map(Statement::column_names)
        .unwrap_or_default();

    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Row::with_capacity(columns.len());
        for (index, name) in columns.iter().enumerate() {
            let value: SqlValue = row.get(index)?;
            record.insert(name.clone(), to_json_value(value));
        }
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::panic::{catch_unwind, AssertUnwindSafe};
    use std::sync::atomic::AtomicBool;
    use std::thread;
    use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

    #[test]
    fn in_memory_create_insert_select() {
        let dm = DataManager::in_memory();
        dm.execute_write("CREATE TABLE t(x INTEGER)", &[]).expect("create");
        dm.execute_write("INSERT INTO t VALUES (?)", &[json!(5)])
            .expect("insert");

        let rows = dm
            .execute("SELECT x FROM t", &[], AccessMode::ReadOnly)
            .expect("select");
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].get("x"), Some(&json!(5)));
        assert_eq!(serde_json::to_value(&rows).unwrap(), json!([{ "x": 5 }]));
    }

    #[test]
    fn row_keys_follow_column_order() {
        let dm = DataManager::in_memory();
        dm.execute_write("CREATE TABLE readings(city VARCHAR, temp DOUBLE, id INTEGER)", &[])
            .expect("create");
        for (id, city) in ["Leeds", "York", "Bath"].iter().enumerate() {
            dm.execute_write(
                "INSERT INTO readings VALUES (?, ?, ?)",
                &[json!(city), json!(10.5), json!(id)],
            )
            .expect("insert");
        }

        let rows = dm
            .execute(
                "SELECT id, city, temp FROM readings ORDER BY id",
                &[],
                AccessMode::ReadOnly,
            )
            .expect("select");
        assert_eq!(rows.len(), 3);
        for row in &rows {
            let keys: Vec<&str> = row.keys().map(String::as_str).collect();
            assert_eq!(keys, vec!["id", "city", "temp"]);
        }
        assert_eq!(rows[2].get("city"), Some(&json!("Bath")));
    }

    #[test]
    fn zero_rows_yield_empty_result() {
        let dm = DataManager::in_memory();
        dm.execute_write("CREATE TABLE empty_t(x INTEGER)", &[])
            .expect("create");
        let rows = dm
            .execute("SELECT x FROM empty_t", &[], AccessMode::ReadOnly)
            .expect("select");
        assert!(rows.is_empty());
    }

    #[test]
    fn nulls_are_preserved() {
        let dm = DataManager::in_memory();
        let rows = dm
            .execute(
                "SELECT NULL AS missing, CAST(? AS INTEGER) AS given",
                &[Value::Null],
                AccessMode::ReadOnly,
            )
            .expect("select");
        assert_eq!(rows[0].get("missing"), Some(&Value::Null));
        assert_eq!(rows[0].get("given"), Some(&Value::Null));
    }

    #[test]
    fn missing_table_is_a_query_error() {
        let dm = DataManager::in_memory();
        let err = dm
            .execute("SELECT * FROM nonexistent_table", &[], AccessMode::ReadOnly)
            .expect_err("should fail");
        match err {
            DataError::Query { query, source } => {
                assert_eq!(query, "SELECT * FROM nonexistent_table");
                assert!(source.to_string().contains("nonexistent_table"));
            }
            other => panic!("expected query error, got {other:?}"),
        }
    }

    #[test]
    fn parameter_mismatch_fails_without_holding_the_lock() {
        let dm = DataManager::in_memory();
        dm.execute_write("CREATE TABLE t(x INTEGER)", &[]).expect("create");

        let err = dm
            .execute_write("INSERT INTO t VALUES (?)", &[])
            .expect_err("missing parameter");
        assert!(err.is_query());
        assert_eq!(dm.open_sessions(), 0);

        dm.execute_write("INSERT INTO t VALUES (?)", &[json!(1)])
            .expect("write after failure");
        let rows = dm
            .execute("SELECT COUNT(*) AS n FROM t", &[], AccessMode::ReadOnly)
            .expect("read after failure");
        assert_eq!(rows[0].get("n"), Some(&json!(1)));
    }

    #[test]
    fn sessions_return_to_baseline() {
        let dm = DataManager::in_memory();
        assert_eq!(dm.open_sessions(), 0);

        dm.execute("SELECT 1 AS one", &[], AccessMode::ReadOnly)
            .expect("select");
        assert_eq!(dm.open_sessions(), 0);

        let _ = dm.execute("SELEC broken", &[], AccessMode::ReadOnly);
        assert_eq!(dm.open_sessions(), 0);

        let _ = dm.execute_write("INSERT INTO nowhere VALUES (1)", &[]);
        assert_eq!(dm.open_sessions(), 0);

        {
            let session = dm.acquire_session(AccessMode::ReadOnly).expect("session");
            assert_eq!(dm.open_sessions(), 1);
            assert_eq!(session.mode(), AccessMode::ReadOnly);
        }
        assert_eq!(dm.open_sessions(), 0);
    }

    #[test]
    fn panicking_session_releases_the_write_lock() {
        let dm = DataManager::in_memory();
        let outcome = catch_unwind(AssertUnwindSafe(|| {
            let _session = dm.acquire_session(AccessMode::ReadWrite).expect("session");
            panic!("tool handler blew up");
        }));
        assert!(outcome.is_err());
        assert_eq!(dm.open_sessions(), 0);

        dm.execute_write("CREATE TABLE after_panic(x INTEGER)", &[])
            .expect("lock is free again");
    }

    #[test]
    fn repeated_reads_are_identical() {
        let db_path = temp_db_path("repeat");
        let dm = DataManager::open_file(&db_path);
        dm.execute_write("CREATE TABLE obs(t INTEGER, v DOUBLE)", &[])
            .expect("create");
        dm.execute_write("INSERT INTO obs VALUES (1, 2.5), (2, 3.5), (3, NULL)", &[])
            .expect("insert");

        let first = dm
            .execute("SELECT * FROM obs ORDER BY t", &[], AccessMode::ReadOnly)
            .expect("first read");
        let second = dm
            .execute("SELECT * FROM obs ORDER BY t", &[], AccessMode::ReadOnly)
            .expect("second read");
        assert_eq!(first.len(), 3);
        assert_eq!(first, second);

        cleanup_temp_db(&db_path);
    }

    #[test]
    fn read_only_file_session_rejects_writes() {
        let db_path = temp_db_path("readonly");
        let dm = DataManager::open_file(&db_path);
        dm.execute_write("CREATE TABLE t(x INTEGER)", &[]).expect("create");

        let err = dm
            .execute("INSERT INTO t VALUES (1)", &[], AccessMode::ReadOnly)
            .expect_err("read-only connection must not write");
        assert!(err.is_query());
        assert_eq!(dm.open_sessions(), 0);

        cleanup_temp_db(&db_path);
    }

    #[test]
    fn connection_is_closed_once_session_count_drops() {
        let db_path = temp_db_path("closed");
        let dm = DataManager::open_file(&db_path);
        {
            let session = dm.acquire_session(AccessMode::ReadWrite).expect("session");
            session
                .execute("CREATE TABLE t(x INTEGER)", &[])
                .expect("create");
            session
                .execute("INSERT INTO t VALUES (1), (2)", &[])
                .expect("insert");
            assert_eq!(dm.open_sessions(), 1);
        }
        assert_eq!(dm.open_sessions(), 0);
        // Closing the last connection checkpoints and removes the WAL.
        assert!(!std::path::Path::new(&format!("{db_path}.wal")).exists());

        let reader = DataManager::open_file(&db_path);
        let rows = reader
            .execute("SELECT COUNT(*) AS n FROM t", &[], AccessMode::ReadOnly)
            .expect("read back");
        assert_eq!(rows[0]["n"], json!(2));

        cleanup_temp_db(&db_path);
    }

    #[test]
    fn missing_file_is_a_connection_error() {
        let db_path = temp_db_path("missing");
        let dm = DataManager::open_file(&db_path);
        let err = dm
            .execute("SELECT 1", &[], AccessMode::ReadOnly)
            .expect_err("no database file yet");
        assert!(err.is_connection(), "unexpected error: {err}");
        assert_eq!(dm.open_sessions(), 0);

        cleanup_temp_db(&db_path);
    }

    #[test]
    fn concurrent_writers_are_serialized() {
        const WRITERS: usize = 8;
        let dm = DataManager::in_memory();
        dm.execute_write("CREATE TABLE hits(writer INTEGER)", &[])
            .expect("create");

        let active = AtomicUsize::new(0);
        let max_active = AtomicUsize::new(0);

        thread::scope(|scope| {
            for writer in 0..WRITERS {
                let (dm, active, max_active) = (&dm, &active, &max_active);
                scope.spawn(move || {
                    let session = dm.acquire_session(AccessMode::ReadWrite).expect("session");
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    max_active.fetch_max(now, Ordering::SeqCst);
                    thread::sleep(Duration::from_millis(10));
                    session
                        .execute("INSERT INTO hits VALUES (?)", &[json!(writer)])
                        .expect("insert");
                    active.fetch_sub(1, Ordering::SeqCst);
                });
            }
        });

        assert_eq!(max_active.load(Ordering::SeqCst), 1);
        let rows = dm
            .execute("SELECT COUNT(*) AS n FROM hits", &[], AccessMode::ReadOnly)
            .expect("count");
        assert_eq!(rows[0].get("n"), Some(&json!(WRITERS)));
    }

    #[test]
    fn concurrent_readers_do_not_block_each_other() {
        const READERS: u32 = 4;
        const HOLD: Duration = Duration::from_millis(300);

        let db_path = temp_db_path("readers");
        let dm = DataManager::open_file(&db_path);
        dm.execute_write("CREATE TABLE t AS SELECT 42 AS answer", &[])
            .expect("create");

        let started = Instant::now();
        thread::scope(|scope| {
            for _ in 0..READERS {
                let dm = &dm;
                scope.spawn(move || {
                    let session = dm.acquire_session(AccessMode::ReadOnly).expect("session");
                    thread::sleep(HOLD);
                    let rows = session.execute("SELECT answer FROM t", &[]).expect("read");
                    assert_eq!(rows[0].get("answer"), Some(&json!(42)));
                });
            }
        });
        let elapsed = started.elapsed();

        assert!(
            elapsed < HOLD * (READERS - 1),
            "readers appear serialized: {elapsed:?}"
        );
        assert_eq!(dm.open_sessions(), 0);

        cleanup_temp_db(&db_path);
    }

    #[test]
    fn strict_readers_wait_for_active_writer() {
        let dm = DataManager::in_memory().with_isolation(IsolationPolicy::Strict);
        let read_done = AtomicBool::new(false);

        thread::scope(|scope| {
            let writer = dm.acquire_session(AccessMode::ReadWrite).expect("writer");
            let reader = scope.spawn(|| {
                dm.execute("SELECT 1 AS one", &[], AccessMode::ReadOnly)
                    .expect("read");
                read_done.store(true, Ordering::SeqCst);
            });

            thread::sleep(Duration::from_millis(150));
            assert!(!read_done.load(Ordering::SeqCst), "read overlapped a write");
            drop(writer);
            reader.join().expect("reader thread");
        });

        assert!(read_done.load(Ordering::SeqCst));
    }

    #[test]
    fn concurrent_policy_reads_bypass_the_lock() {
        let dm = DataManager::in_memory().with_isolation(IsolationPolicy::Concurrent);
        let _writer = dm.acquire_session(AccessMode::ReadWrite).expect("writer");
        let rows = dm
            .execute("SELECT 7 AS seven", &[], AccessMode::ReadOnly)
            .expect("read while writer is active");
        assert_eq!(rows[0].get("seven"), Some(&json!(7)));
        assert_eq!(dm.open_sessions(), 1);
    }

    #[test]
    fn from_config_honours_location_and_policy() {
        let config = EngineConfig {
            location: Some(DatabaseLocation::InMemory),
            isolation: IsolationPolicy::Concurrent,
        };
        let dm = DataManager::from_config(&config).expect("manager");
        assert_eq!(dm.location(), &DatabaseLocation::InMemory);
        assert_eq!(dm.isolation(), IsolationPolicy::Concurrent);
        dm.close();
    }

    fn temp_db_path(label: &str) -> String {
        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time")
            .as_nanos();
        format!("/tmp/duckwx_db_manager_{label}_{suffix}.duckdb")
    }

    fn cleanup_temp_db(db_path: &str) {
        let _ = fs::remove_file(db_path);
        let _ = fs::remove_file(format!("{db_path}.wal"));
        let _ = fs::remove_file(format!("{db_path}.wal.lck"));
    }
}
