use crate::codec::{parse_csv, to_csv_file};
use crate::error::Result;
use crate::io::atomic_write;
use crate::record::Record;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Persistence for the ordered record list. Each call reads or replaces the
/// whole list; identity is position.
pub trait RecordStore: Send + Sync {
    fn load(&self) -> Result<Vec<Record>>;
    fn save(&self, rows: &[Record]) -> Result<()>;
    /// Short label for diagnostics.
    fn describe(&self) -> String;
}

// ---------------------------------------------------------------------------
// CsvFileStore
// ---------------------------------------------------------------------------

/// Records kept in a CSV file on disk. A missing file is an empty list.
#[derive(Debug, Clone)]
pub struct CsvFileStore {
    path: PathBuf,
}

impl CsvFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RecordStore for CsvFileStore {
    fn load(&self) -> Result<Vec<Record>> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let text = std::fs::read_to_string(&self.path)?;
        parse_csv(&text)
    }

    fn save(&self, rows: &[Record]) -> Result<()> {
        let text = to_csv_file(rows)?;
        atomic_write(&self.path, text.as_bytes())
    }

    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }
}

// ---------------------------------------------------------------------------
// MemoryStore
// ---------------------------------------------------------------------------

#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: RwLock<Vec<Record>>,
}

impl MemoryStore {
    pub fn new(rows: Vec<Record>) -> Self {
        Self {
            rows: RwLock::new(rows),
        }
    }
}

impl RecordStore for MemoryStore {
    fn load(&self) -> Result<Vec<Record>> {
        Ok(self.rows.read().map(|r| r.clone()).unwrap_or_default())
    }

    fn save(&self, rows: &[Record]) -> Result<()> {
        if let Ok(mut guard) = self.rows.write() {
            *guard = rows.to_vec();
        }
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
