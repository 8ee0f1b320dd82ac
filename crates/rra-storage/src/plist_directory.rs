//! The row-plist-directory adapter of spec.md §6: one file per row.
//!
//! Filename = lowercase hex SHA-256 of the canonical encoding of the
//! primary-key value, split into a two-character directory prefix, with a
//! `.rowplist` extension — e.g. primary key `42` might live at
//! `ab/ab34...ef.rowplist`.

use crate::adapter::{AdapterRowIter, StorageAdapter};
use crate::canonical::canonical_digest_hex;
use crate::plist::{decode_row, encode_row};
use rra_core::{Attribute, Error, Expr, Result, Row, Scheme, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

pub struct RowPlistDirectoryAdapter {
    root: PathBuf,
    scheme: Arc<Scheme>,
    primary_key: Attribute,
}

impl RowPlistDirectoryAdapter {
    /// Opens (creating if necessary) a row-plist-directory store rooted at
    /// `root`, keyed on `primary_key`.
    pub fn open(root: impl Into<PathBuf>, scheme: Arc<Scheme>, primary_key: Attribute) -> Result<Self> {
        if !scheme.contains(&primary_key) {
            return Err(Error::scheme_violation("primary key must be part of the scheme"));
        }
        let root = root.into();
        fs::create_dir_all(&root).map_err(|e| Error::storage(e.to_string()))?;
        Ok(RowPlistDirectoryAdapter { root, scheme, primary_key })
    }

    fn path_for_key(&self, key: &Value) -> Result<PathBuf> {
        let digest = canonical_digest_hex(key)?;
        let (prefix, _) = digest.split_at(2);
        Ok(self.root.join(prefix).join(format!("{digest}.rowplist")))
    }

    fn all_paths(&self) -> Result<Vec<PathBuf>> {
        let mut paths = Vec::new();
        let entries = fs::read_dir(&self.root).map_err(|e| Error::storage(e.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|e| Error::storage(e.to_string()))?;
            if !entry.file_type().map_err(|e| Error::storage(e.to_string()))?.is_dir() {
                continue;
            }
            let sub = fs::read_dir(entry.path()).map_err(|e| Error::storage(e.to_string()))?;
            for file in sub {
                let file = file.map_err(|e| Error::storage(e.to_string()))?;
                let path = file.path();
                if path.extension().and_then(|e| e.to_str()) == Some("rowplist") {
                    paths.push(path);
                }
            }
        }
        Ok(paths)
    }

    fn read_row(&self, path: &Path) -> Result<Row> {
        let xml = fs::read_to_string(path).map_err(|e| Error::storage(e.to_string()))?;
        decode_row(&xml, self.scheme.clone())
    }
}

impl StorageAdapter for RowPlistDirectoryAdapter {
    fn scheme(&self) -> &Arc<Scheme> {
        &self.scheme
    }

    fn rows(&self) -> AdapterRowIter<'_> {
        match self.all_paths() {
            Ok(paths) => Box::new(paths.into_iter().map(move |p| self.read_row(&p))),
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }

    fn add(&mut self, row: Row) -> Result<usize> {
        let key = row.get(&self.primary_key);
        let path = self.path_for_key(&key)?;
        if path.exists() {
            return Ok(0);
        }
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::storage(e.to_string()))?;
        }
        let xml = encode_row(&row)?;
        fs::write(&path, xml).map_err(|e| Error::storage(e.to_string()))?;
        Ok(1)
    }

    fn delete(&mut self, predicate: &Expr) -> Result<usize> {
        let mut count = 0;
        for path in self.all_paths()? {
            let row = self.read_row(&path)?;
            if predicate.matches(&row) {
                fs::remove_file(&path).map_err(|e| Error::storage(e.to_string()))?;
                count += 1;
            }
        }
        Ok(count)
    }

    fn update(&mut self, predicate: &Expr, new_values: &[(Attribute, Value)]) -> Result<usize> {
        let mut count = 0;
        for path in self.all_paths()? {
            let row = self.read_row(&path)?;
            if predicate.matches(&row) {
                let updated = row.with_overrides(new_values);
                // If the primary key itself changed, this would orphan the
                // old file; the contract (spec.md §6) keys files on the
                // primary key, so updates to it are rejected rather than
                // silently leaking a stale file.
                if updated.get(&self.primary_key) != row.get(&self.primary_key) {
                    return Err(Error::scheme_violation("update may not change the primary key"));
                }
                let xml = encode_row(&updated)?;
                fs::write(&path, xml).map_err(|e| Error::storage(e.to_string()))?;
                count += 1;
            }
        }
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheme() -> Arc<Scheme> {
        Arc::new(Scheme::new(vec![Attribute::new("id"), Attribute::new("name")]))
    }

    fn row(id: i64, name: &str) -> Row {
        Row::new(scheme(), vec![Value::Integer(id), Value::Text(name.into())]).unwrap()
    }

    #[test]
    fn add_then_rows_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let mut adapter = RowPlistDirectoryAdapter::open(dir.path(), scheme(), Attribute::new("id")).unwrap();
        adapter.add(row(1, "cat")).unwrap();
        adapter.add(row(2, "dog")).unwrap();

        let mut rows: Vec<Row> = adapter.rows().collect::<Result<_>>().unwrap();
        rows.sort_by_key(|r| r.get(&Attribute::new("id")).as_i64().unwrap());
        assert_eq!(rows, vec![row(1, "cat"), row(2, "dog")]);
    }

    #[test]
    fn duplicate_primary_key_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let mut adapter = RowPlistDirectoryAdapter::open(dir.path(), scheme(), Attribute::new("id")).unwrap();
        assert_eq!(adapter.add(row(1, "cat")).unwrap(), 1);
        assert_eq!(adapter.add(row(1, "cat")).unwrap(), 0);
    }

    #[test]
    fn filenames_are_content_addressed() {
        let dir = tempfile::tempdir().unwrap();
        let mut adapter = RowPlistDirectoryAdapter::open(dir.path(), scheme(), Attribute::new("id")).unwrap();
        adapter.add(row(7, "fox")).unwrap();
        let expected = adapter.path_for_key(&Value::Integer(7)).unwrap();
        assert!(expected.exists());
        assert_eq!(expected.extension().unwrap(), "rowplist");
    }

    #[test]
    fn delete_removes_matching_files() {
        let dir = tempfile::tempdir().unwrap();
        let mut adapter = RowPlistDirectoryAdapter::open(dir.path(), scheme(), Attribute::new("id")).unwrap();
        adapter.add(row(1, "cat")).unwrap();
        adapter.add(row(2, "dog")).unwrap();
        let removed = adapter.delete(&Expr::attr("id").eq(Expr::constant(1i64))).unwrap();
        assert_eq!(removed, 1);
        assert_eq!(adapter.rows().collect::<Result<Vec<_>>>().unwrap().len(), 1);
    }
}
