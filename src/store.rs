use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags, backup::Backup};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use thiserror::Error;

/// Cursor's key-value table inside `state.vscdb`.
pub const DEFAULT_TABLE: &str = "cursorDiskKV";

const BUSY_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawRecord {
    pub key: String,
    pub value: String,
}

/// Everything but `InvalidTable` means the store could not be read this cycle.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store unavailable: cannot open {}", path.display())]
    Unavailable {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },
    #[error("store unavailable: query on {table} failed")]
    Query {
        table: String,
        #[source]
        source: rusqlite::Error,
    },
    #[error("invalid table name: {0:?}")]
    InvalidTable(String),
    #[error("store unavailable: snapshot copy failed")]
    Snapshot {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

pub trait RecordStore {
    /// All rows whose key starts with `key_prefix`, in store order.
    fn fetch_records(&self, key_prefix: &str) -> Result<Vec<RawRecord>, StoreError>;
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ReadMode {
    /// Query the live database file.
    #[default]
    Direct,
    /// Copy the database with the online backup API and query the copy.
    Snapshot,
}

#[derive(Clone, Debug)]
pub struct SqliteStore {
    path: PathBuf,
    table: String,
    mode: ReadMode,
}

impl SqliteStore {
    /// `table` must be a plain identifier; it is interpolated into SQL.
    pub fn new(
        path: impl Into<PathBuf>,
        table: &str,
        mode: ReadMode,
    ) -> Result<Self, StoreError> {
        if !is_identifier(table) {
            return Err(StoreError::InvalidTable(table.to_string()));
        }
        Ok(Self {
            path: path.into(),
            table: table.to_string(),
            mode,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn open(&self) -> Result<Connection, StoreError> {
        open_db(&self.path)
    }

    /// Tables, their columns and row counts.
    pub fn describe(&self) -> Result<DatabaseInfo, StoreError> {
        let conn = self.open()?;
        let query_err = |source| StoreError::Query {
            table: "sqlite_master".to_string(),
            source,
        };

        let names: Vec<String> = {
            let mut stmt = conn
                .prepare("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .map_err(query_err)?;
            stmt.query_map([], |row| row.get::<_, String>(0))
                .map_err(query_err)?
                .collect::<Result<_, _>>()
                .map_err(query_err)?
        };

        let mut tables = Vec::with_capacity(names.len());
        for name in names {
            let table_err = |source| StoreError::Query {
                table: name.clone(),
                source,
            };
            let quoted = name.replace('"', "\"\"");
            let columns: Vec<String> = {
                let mut stmt = conn
                    .prepare(&format!("PRAGMA table_info(\"{}\")", quoted))
                    .map_err(table_err)?;
                stmt.query_map([], |row| row.get::<_, String>(1))
                    .map_err(table_err)?
                    .collect::<Result<_, _>>()
                    .map_err(table_err)?
            };
            let row_count: i64 = conn
                .query_row(&format!("SELECT COUNT(*) FROM \"{}\"", quoted), [], |row| {
                    row.get(0)
                })
                .map_err(table_err)?;
            tables.push(TableInfo {
                name,
                columns,
                row_count: row_count.max(0) as u64,
            });
        }

        let file_size = std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0);
        Ok(DatabaseInfo {
            path: self.path.clone(),
            file_size,
            tables,
        })
    }

    fn query(&self, conn: &Connection, key_prefix: &str) -> Result<Vec<RawRecord>, StoreError> {
        let query_err = |source| StoreError::Query {
            table: self.table.clone(),
            source,
        };
        let sql = format!(
            "SELECT key, value FROM {} WHERE key LIKE ?1 ESCAPE '\\'",
            self.table
        );
        let pattern = format!("{}%", escape_like(key_prefix));

        let mut stmt = conn.prepare(&sql).map_err(query_err)?;
        let mut rows = stmt.query([&pattern]).map_err(query_err)?;
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(query_err)? {
            let key: String = row.get(0).map_err(query_err)?;
            let value = match row.get_ref(1).map_err(query_err)? {
                ValueRef::Text(bytes) | ValueRef::Blob(bytes) => {
                    String::from_utf8_lossy(bytes).into_owned()
                }
                ValueRef::Null => String::new(),
                ValueRef::Integer(i) => i.to_string(),
                ValueRef::Real(f) => f.to_string(),
            };
            out.push(RawRecord { key, value });
        }
        Ok(out)
    }
}

impl RecordStore for SqliteStore {
    fn fetch_records(&self, key_prefix: &str) -> Result<Vec<RawRecord>, StoreError> {
        match self.mode {
            ReadMode::Direct => {
                let conn = self.open()?;
                self.query(&conn, key_prefix)
            }
            ReadMode::Snapshot => {
                let snapshot = backup_database(&self.path)?;
                let conn = Connection::open_with_flags(
                    snapshot.path(),
                    OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
                )
                .map_err(|source| StoreError::Unavailable {
                    path: snapshot.path().to_path_buf(),
                    source,
                })?;
                self.query(&conn, key_prefix)
            }
        }
    }
}

fn open_db(path: &Path) -> Result<Connection, StoreError> {
    let unavailable = |source| StoreError::Unavailable {
        path: path.to_path_buf(),
        source,
    };
    let conn = Connection::open_with_flags(
        path,
        OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
    )
    .map_err(unavailable)?;
    conn.busy_timeout(BUSY_TIMEOUT).map_err(unavailable)?;
    Ok(conn)
}

/// Copy the database into a temporary file so the query never holds a
/// read lock on the live file for long.
fn backup_database(db_path: &Path) -> Result<NamedTempFile, StoreError> {
    let snapshot_err =
        |e: Box<dyn std::error::Error + Send + Sync>| StoreError::Snapshot { source: e };

    let src = open_db(db_path)?;
    let tmp = NamedTempFile::new().map_err(|e| snapshot_err(e.into()))?;
    let mut dst = Connection::open(tmp.path()).map_err(|e| snapshot_err(e.into()))?;
    {
        let backup = Backup::new(&src, &mut dst).map_err(|e| snapshot_err(e.into()))?;
        backup
            .run_to_completion(1000, Duration::from_millis(5), None)
            .map_err(|e| snapshot_err(e.into()))?;
    }
    drop(src);
    Ok(tmp)
}

fn escape_like(prefix: &str) -> String {
    let mut out = String::with_capacity(prefix.len());
    for c in prefix.chars() {
        if matches!(c, '%' | '_' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DatabaseInfo {
    pub path: PathBuf,
    pub file_size: u64,
    pub tables: Vec<TableInfo>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TableInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub row_count: u64,
}
