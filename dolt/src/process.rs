//! Execution conduit that shells out to `dolt sql` once per statement.

use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread::JoinHandle;
use std::time::Duration;

use rowsync_core::statement::quote_literal;
use rowsync_core::{Catalog, Conduit, ConduitError, Dialect, Session, Statement, TableColumn};
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};
use wait_timeout::ChildExt;

use crate::error::{DoltError, Result};

/// Default time allowed for one `dolt` invocation.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs statements through the `dolt` command line inside a repository
/// directory.
///
/// Every statement is a separate process, so there is no transaction around
/// a reconciliation: statements that ran before a failure stay applied.
/// [`Conduit::is_atomic`] reports `false` and the reconciler warns about it.
#[derive(Debug, Clone)]
pub struct DoltCli {
    dir: PathBuf,
    binary: PathBuf,
    timeout: Duration,
}

impl DoltCli {
    /// Targets the Dolt repository (or multi-database root) at `dir`.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            binary: PathBuf::from("dolt"),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Uses a different binary than `dolt` from `PATH`.
    pub fn with_binary(mut self, binary: impl Into<PathBuf>) -> Self {
        self.binary = binary.into();
        self
    }

    /// Sets the per-invocation timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Runs `dolt version` and returns its output.
    ///
    /// Useful as a connectivity check before reconciling.
    pub fn version(&self) -> Result<String> {
        self.run(vec!["version".into()])
    }

    /// Runs one SQL statement, optionally against a specific database.
    ///
    /// Returns captured standard output.
    pub fn sql(&self, database: Option<&str>, sql: &str) -> Result<String> {
        self.run(sql_args(database, sql))
    }

    /// Runs a query with `-r json` and returns its result rows.
    ///
    /// Empty output counts as no rows.
    pub fn sql_rows(&self, database: Option<&str>, sql: &str) -> Result<Vec<Map<String, Value>>> {
        let mut args = sql_args(database, sql);
        let query = args.split_off(args.len() - 2);
        args.push("-r".into());
        args.push("json".into());
        args.extend(query);
        parse_rows(&self.run(args)?)
    }

    pub(crate) fn run(&self, args: Vec<OsString>) -> Result<String> {
        let mut command = Command::new(&self.binary);
        command
            .args(&args)
            .current_dir(&self.dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command.spawn().map_err(|source| DoltError::Spawn {
            binary: self.binary.clone(),
            source,
        })?;

        // Both pipes are drained while waiting so a chatty child cannot
        // block on a full buffer.
        let stdout_thread = child.stdout.take().map(drain);
        let stderr_thread = child.stderr.take().map(drain);

        let Some(status) = child.wait_timeout(self.timeout)? else {
            if let Err(e) = child.kill() {
                debug!(error = %e, "failed to kill timed out dolt process");
            }
            let _ = child.wait();
            return Err(DoltError::Timeout(self.timeout));
        };

        let stdout = collect(stdout_thread, "stdout");
        let stderr = collect(stderr_thread, "stderr");
        if status.success() {
            Ok(stdout)
        } else {
            Err(DoltError::Failed {
                code: status.code(),
                stderr: stderr.trim().to_string(),
            })
        }
    }
}

fn sql_args(database: Option<&str>, sql: &str) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::with_capacity(5);
    if let Some(db) = database {
        args.push("--use-db".into());
        args.push(db.into());
    }
    args.push("sql".into());
    args.push("-q".into());
    args.push(sql.into());
    args
}

#[derive(Deserialize)]
struct JsonRows {
    #[serde(default)]
    rows: Vec<Map<String, Value>>,
}

fn parse_rows(stdout: &str) -> Result<Vec<Map<String, Value>>> {
    if stdout.trim().is_empty() {
        return Ok(Vec::new());
    }
    let parsed: JsonRows = serde_json::from_str(stdout)?;
    Ok(parsed.rows)
}

fn field(row: &Map<String, Value>, name: &str) -> String {
    match row.get(name) {
        Some(Value::String(text)) => text.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn drain<R: Read + Send + 'static>(mut pipe: R) -> JoinHandle<std::io::Result<Vec<u8>>> {
    std::thread::spawn(move || {
        let mut buf = Vec::new();
        pipe.read_to_end(&mut buf)?;
        Ok(buf)
    })
}

fn collect(handle: Option<JoinHandle<std::io::Result<Vec<u8>>>>, stream: &str) -> String {
    let buf = match handle.map(JoinHandle::join) {
        Some(Ok(Ok(buf))) => buf,
        Some(Ok(Err(e))) => {
            debug!(stream, error = %e, "failed to read dolt output");
            Vec::new()
        }
        Some(Err(_)) => {
            debug!(stream, "dolt output reader panicked");
            Vec::new()
        }
        None => Vec::new(),
    };
    String::from_utf8_lossy(&buf).into_owned()
}

impl Conduit for DoltCli {
    type Session<'a> = DoltSession<'a>;

    fn begin(&mut self) -> std::result::Result<DoltSession<'_>, ConduitError> {
        Ok(DoltSession {
            cli: self,
            database: None,
            executed: 0,
        })
    }

    fn is_atomic(&self) -> bool {
        false
    }
}

impl Catalog for DoltCli {
    fn database_exists(&mut self, name: &str) -> std::result::Result<bool, ConduitError> {
        let sql = format!(
            "SELECT SCHEMA_NAME FROM information_schema.SCHEMATA WHERE SCHEMA_NAME = {}",
            quote_literal(Dialect::MySql, name)
        );
        let rows = self.sql_rows(None, &sql).map_err(ConduitError::from_source)?;
        Ok(!rows.is_empty())
    }

    fn table_columns(
        &mut self,
        database: &str,
        table: &str,
    ) -> std::result::Result<Vec<TableColumn>, ConduitError> {
        let sql = format!(
            "SELECT COLUMN_NAME, COLUMN_TYPE, COLUMN_KEY FROM information_schema.COLUMNS \
             WHERE TABLE_SCHEMA = {} AND TABLE_NAME = {} ORDER BY ORDINAL_POSITION",
            quote_literal(Dialect::MySql, database),
            quote_literal(Dialect::MySql, table)
        );
        let rows = self.sql_rows(None, &sql).map_err(ConduitError::from_source)?;
        Ok(rows
            .iter()
            .map(|row| TableColumn {
                name: field(row, "COLUMN_NAME"),
                data_type: field(row, "COLUMN_TYPE"),
                key: field(row, "COLUMN_KEY"),
            })
            .collect())
    }
}

/// A sequence of `dolt sql` invocations sharing a selected database.
///
/// `USE` statements are not sent to `dolt`, since a selection made in one
/// process would not carry over to the next. The database is remembered and
/// passed to later invocations with `--use-db` instead.
pub struct DoltSession<'a> {
    cli: &'a DoltCli,
    database: Option<String>,
    executed: usize,
}

impl DoltSession<'_> {
    /// Database selected by the last `USE` statement.
    pub fn database(&self) -> Option<&str> {
        self.database.as_deref()
    }
}

impl Session for DoltSession<'_> {
    fn execute(&mut self, statement: &Statement) -> std::result::Result<(), ConduitError> {
        if let Some(db) = statement.used_database() {
            debug!(database = db, "selecting dolt database");
            self.database = Some(db.to_string());
            return Ok(());
        }
        debug!(kind = %statement.kind(), database = ?self.database, "dolt sql");
        self.cli
            .sql(self.database.as_deref(), statement.sql())
            .map_err(ConduitError::from_source)?;
        self.executed += 1;
        Ok(())
    }

    fn commit(self) -> std::result::Result<(), ConduitError> {
        Ok(())
    }

    fn rollback(self) -> std::result::Result<(), ConduitError> {
        if self.executed > 0 {
            warn!(
                executed = self.executed,
                "dolt statements already executed cannot be rolled back"
            );
        }
        Ok(())
    }
}
