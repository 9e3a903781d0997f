//! Durable storage behind the document store: one redb table per collection, keyed by
//! insertion sequence, each value a record serialized as JSON.

use super::Record;
use crate::error::AppError;
use redb::{Database, ReadableTable, TableDefinition, TableError};
use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;

fn storage(e: impl Display) -> AppError {
    AppError::Internal(format!("document storage: {}", e))
}

/// An open redb database shared by every collection.
#[derive(Clone)]
pub struct DocumentDb {
    db: Arc<Database>,
}

impl DocumentDb {
    /// Open or create the database file.
    pub fn open(path: &Path) -> Result<Self, AppError> {
        let db = Database::create(path).map_err(storage)?;
        Ok(DocumentDb { db: Arc::new(db) })
    }

    /// Journal for `collection`, creating its table when missing.
    pub fn journal(&self, collection: &str) -> Result<Journal, AppError> {
        let journal = Journal {
            db: Arc::clone(&self.db),
            table: collection.to_string(),
        };
        let txn = self.db.begin_write().map_err(storage)?;
        {
            let _table = txn.open_table(journal.definition()).map_err(storage)?;
        }
        txn.commit().map_err(storage)?;
        Ok(journal)
    }
}

pub struct Journal {
    db: Arc<Database>,
    table: String,
}

impl Journal {
    fn definition(&self) -> TableDefinition<'_, u64, &'static [u8]> {
        TableDefinition::new(&self.table)
    }

    /// Every stored record in sequence order.
    pub fn load(&self) -> Result<Vec<(u64, Record)>, AppError> {
        let txn = self.db.begin_read().map_err(storage)?;
        let table = match txn.open_table(self.definition()) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(storage(e)),
        };
        let mut rows = Vec::new();
        for entry in table.iter().map_err(storage)? {
            let (seq, bytes) = entry.map_err(storage)?;
            let record: Record = serde_json::from_slice(bytes.value()).map_err(storage)?;
            rows.push((seq.value(), record));
        }
        Ok(rows)
    }

    /// Writes `puts` and removes `deletes` in one transaction.
    pub fn write(&self, puts: &[(u64, &Record)], deletes: &[u64]) -> Result<(), AppError> {
        let txn = self.db.begin_write().map_err(storage)?;
        {
            let mut table = txn.open_table(self.definition()).map_err(storage)?;
            for (seq, record) in puts {
                let bytes = serde_json::to_vec(record).map_err(storage)?;
                table.insert(*seq, bytes.as_slice()).map_err(storage)?;
            }
            for seq in deletes {
                table.remove(*seq).map_err(storage)?;
            }
        }
        txn.commit().map_err(storage)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn rec(v: serde_json::Value) -> Record {
        v.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn writes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docs.redb");
        {
            let db = DocumentDb::open(&path).unwrap();
            let journal = db.journal("accounts").unwrap();
            let (a, b) = (rec(json!({ "uuid": "A1" })), rec(json!({ "uuid": "A2" })));
            journal.write(&[(0, &a), (1, &b)], &[]).unwrap();
            journal.write(&[], &[0]).unwrap();
        }
        let db = DocumentDb::open(&path).unwrap();
        let rows = db.journal("accounts").unwrap().load().unwrap();
        assert_eq!(rows, vec![(1, rec(json!({ "uuid": "A2" })))]);
        assert!(db.journal("auths").unwrap().load().unwrap().is_empty());
    }
}
