use std::collections::HashSet;
use std::fs::{self, File, OpenOptions, TryLockError};
use std::io::{self, Write};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Utc;
use directories::BaseDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::domain::CachedRow;
use crate::error::SeekerError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ColumnKind {
    String,
    Timestamp,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub kind: ColumnKind,
}

impl Column {
    pub fn string(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::String,
        }
    }

    pub fn timestamp(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: ColumnKind::Timestamp,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: Vec<Column>,
}

impl TableSchema {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|column| column.name.as_str()).collect()
    }
}

pub trait TableStore: Send + Sync {
    fn table_exists(&self, table: &str) -> Result<bool, SeekerError>;
    fn create_table(&self, table: &str, schema: &TableSchema) -> Result<(), SeekerError>;
    fn schema(&self, table: &str) -> Result<Option<TableSchema>, SeekerError>;
    fn insert_rows(&self, table: &str, rows: &[CachedRow]) -> Result<usize, SeekerError>;
    /// Whole table, or `None` when it was never created.
    fn read_table(&self, table: &str) -> Result<Option<Vec<CachedRow>>, SeekerError>;
    fn replace_table(&self, table: &str, rows: &[CachedRow]) -> Result<(), SeekerError>;
    fn list_tables(&self) -> Result<Vec<String>, SeekerError>;
    fn write_lock(&self, table: &str) -> Result<WriteLock, SeekerError>;
}

#[derive(Debug, Serialize, Deserialize)]
struct TableFile {
    name: String,
    schema: TableSchema,
    #[serde(default)]
    rows: Vec<CachedRow>,
}

#[derive(Debug, Clone)]
pub struct LocalTableStore {
    root: Utf8PathBuf,
}

impl LocalTableStore {
    pub fn new_with_root(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn tables_dir(&self) -> Utf8PathBuf {
        self.root.join("tables")
    }

    pub fn table_path(&self, table: &str) -> Utf8PathBuf {
        self.tables_dir().join(format!("{table}.json"))
    }

    pub fn lock_path(&self, table: &str) -> Utf8PathBuf {
        self.tables_dir().join(format!("{table}.lock"))
    }

    fn load(&self, table: &str) -> Result<Option<TableFile>, SeekerError> {
        let path = self.table_path(table);
        let content = match fs::read_to_string(path.as_std_path()) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(SeekerError::Filesystem(format!("read {path}: {err}"))),
        };
        let file = serde_json::from_str(&content)
            .map_err(|err| SeekerError::Filesystem(format!("parse {path}: {err}")))?;
        Ok(Some(file))
    }

    fn load_existing(&self, table: &str) -> Result<TableFile, SeekerError> {
        self.load(table)?
            .ok_or_else(|| SeekerError::TableNotFound(table.to_string()))
    }

    fn save(&self, file: &TableFile) -> Result<(), SeekerError> {
        let content = serde_json::to_vec_pretty(file)
            .map_err(|err| SeekerError::Filesystem(err.to_string()))?;
        write_bytes_atomic(&self.table_path(&file.name), &content)
    }
}

impl TableStore for LocalTableStore {
    fn table_exists(&self, table: &str) -> Result<bool, SeekerError> {
        Ok(self.table_path(table).as_std_path().exists())
    }

    fn create_table(&self, table: &str, schema: &TableSchema) -> Result<(), SeekerError> {
        if self.table_exists(table)? {
            return Err(SeekerError::Filesystem(format!(
                "table {table} already exists"
            )));
        }
        self.save(&TableFile {
            name: table.to_string(),
            schema: schema.clone(),
            rows: Vec::new(),
        })
    }

    fn schema(&self, table: &str) -> Result<Option<TableSchema>, SeekerError> {
        Ok(self.load(table)?.map(|file| file.schema))
    }

    fn insert_rows(&self, table: &str, rows: &[CachedRow]) -> Result<usize, SeekerError> {
        let mut file = self.load_existing(table)?;
        let mut seen = file
            .rows
            .iter()
            .map(|row| row.accession.clone())
            .collect::<HashSet<_>>();
        let now = Utc::now();
        let mut inserted = 0usize;
        for row in rows {
            if !seen.insert(row.accession.clone()) {
                warn!("{} is already cached in {table}; skipping", row.accession);
                continue;
            }
            let mut row = row.clone();
            row.last_updated = Some(now);
            file.rows.push(row);
            inserted += 1;
        }
        self.save(&file)?;
        debug!(table, inserted, "inserted rows");
        Ok(inserted)
    }

    fn read_table(&self, table: &str) -> Result<Option<Vec<CachedRow>>, SeekerError> {
        Ok(self.load(table)?.map(|file| file.rows))
    }

    fn replace_table(&self, table: &str, rows: &[CachedRow]) -> Result<(), SeekerError> {
        let mut file = self.load_existing(table)?;
        file.rows = rows.to_vec();
        self.save(&file)
    }

    fn list_tables(&self) -> Result<Vec<String>, SeekerError> {
        let dir = self.tables_dir();
        let entries = match fs::read_dir(dir.as_std_path()) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(SeekerError::Filesystem(err.to_string())),
        };
        let mut tables = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| SeekerError::Filesystem(err.to_string()))?;
            let path = entry.path();
            if path.extension().is_some_and(|ext| ext == "json") {
                if let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) {
                    tables.push(stem.to_string());
                }
            }
        }
        tables.sort();
        Ok(tables)
    }

    fn write_lock(&self, table: &str) -> Result<WriteLock, SeekerError> {
        let path = self.lock_path(table);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| SeekerError::Filesystem(err.to_string()))?;
        }
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.as_std_path())
            .map_err(|err| SeekerError::Filesystem(format!("open {path}: {err}")))?;
        match file.try_lock() {
            Ok(()) => Ok(WriteLock { file, path }),
            Err(TryLockError::WouldBlock) => Err(SeekerError::CacheLocked(table.to_string())),
            Err(TryLockError::Error(err)) => {
                Err(SeekerError::Filesystem(format!("lock {path}: {err}")))
            }
        }
    }
}

/// Exclusive OS lock on the table's lock file. The lock file itself stays on
/// disk; the lock dies with the handle or the process.
#[derive(Debug)]
pub struct WriteLock {
    file: File,
    path: Utf8PathBuf,
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        if let Err(err) = self.file.unlock() {
            warn!("failed to release lock {}: {err}", self.path);
        }
    }
}

pub fn default_cache_root() -> Result<Utf8PathBuf, SeekerError> {
    BaseDirs::new()
        .and_then(|dirs| {
            Utf8PathBuf::from_path_buf(dirs.home_dir().join(".cache").join("mlst-seeker")).ok()
        })
        .ok_or_else(|| SeekerError::Filesystem("unable to resolve cache directory".to_string()))
}

pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), SeekerError> {
    let parent = path
        .parent()
        .ok_or_else(|| SeekerError::Filesystem("invalid destination path".to_string()))?;
    fs::create_dir_all(parent.as_std_path())
        .map_err(|err| SeekerError::Filesystem(err.to_string()))?;
    let mut temp = tempfile::Builder::new()
        .prefix("mlst-seeker-table")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| SeekerError::Filesystem(err.to_string()))?;
    temp.write_all(content)
        .map_err(|err| SeekerError::Filesystem(err.to_string()))?;
    temp.persist(path.as_std_path())
        .map_err(|err| SeekerError::Filesystem(err.to_string()))?;
    Ok(())
}
