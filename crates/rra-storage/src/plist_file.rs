//! The single-file plist adapter of spec.md §6: scheme and the entire row
//! array serialized as one plist under a caller-supplied path.
//!
//! Simpler sibling of `RowPlistDirectoryAdapter` — every mutation rewrites
//! the whole file, which is the teacher's own tradeoff for this adapter
//! shape (a single JS-visible blob rather than a directory of small files).

use crate::adapter::{AdapterRowIter, StorageAdapter};
use crate::plist::{decode_row, encode_row};
use rra_core::{Attribute, Error, Expr, Result, Row, Scheme, Value};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

pub struct PlistFileAdapter {
    path: PathBuf,
    scheme: Arc<Scheme>,
    rows: Vec<Row>,
}

impl PlistFileAdapter {
    /// Opens `path`, loading existing rows if the file exists, or starting
    /// empty otherwise.
    pub fn open(path: impl Into<PathBuf>, scheme: Arc<Scheme>) -> Result<Self> {
        let path = path.into();
        let rows = if path.exists() {
            let xml = fs::read_to_string(&path).map_err(|e| Error::storage(e.to_string()))?;
            parse_rows(&xml, scheme.clone())?
        } else {
            Vec::new()
        };
        Ok(PlistFileAdapter { path, scheme, rows })
    }

    fn flush(&self) -> Result<()> {
        let mut body = String::from("<plist><array>\n");
        for row in &self.rows {
            body.push_str(&encode_row(row)?);
            body.push('\n');
        }
        body.push_str("</array></plist>");
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| Error::storage(e.to_string()))?;
        }
        fs::write(&self.path, body).map_err(|e| Error::storage(e.to_string()))
    }
}

fn parse_rows(xml: &str, scheme: Arc<Scheme>) -> Result<Vec<Row>> {
    // Each row is one top-level <dict>...</dict> block; split on that
    // boundary rather than pulling in a full tree parser for a format this
    // adapter itself fully controls.
    let mut rows = Vec::new();
    let mut rest = xml;
    while let Some(start) = rest.find("<dict>") {
        let end = rest[start..]
            .find("</dict>")
            .ok_or_else(|| Error::serialization("unterminated <dict>"))?
            + start
            + "</dict>".len();
        rows.push(decode_row(&rest[start..end], scheme.clone())?);
        rest = &rest[end..];
    }
    Ok(rows)
}

impl StorageAdapter for PlistFileAdapter {
    fn scheme(&self) -> &Arc<Scheme> {
        &self.scheme
    }

    fn rows(&self) -> AdapterRowIter<'_> {
        Box::new(self.rows.iter().cloned().map(Ok))
    }

    fn add(&mut self, row: Row) -> Result<usize> {
        if self.rows.contains(&row) {
            return Ok(0);
        }
        self.rows.push(row);
        self.flush()?;
        Ok(1)
    }

    fn delete(&mut self, predicate: &Expr) -> Result<usize> {
        let before = self.rows.len();
        self.rows.retain(|row| !predicate.matches(row));
        let removed = before - self.rows.len();
        if removed > 0 {
            self.flush()?;
        }
        Ok(removed)
    }

    fn update(&mut self, predicate: &Expr, new_values: &[(Attribute, Value)]) -> Result<usize> {
        let mut count = 0;
        for row in self.rows.iter_mut() {
            if predicate.matches(row) {
                *row = row.with_overrides(new_values);
                count += 1;
            }
        }
        if count > 0 {
            self.flush()?;
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
    fn persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.plist");
        {
            let mut adapter = PlistFileAdapter::open(&path, scheme()).unwrap();
            adapter.add(row(1, "cat")).unwrap();
            adapter.add(row(2, "dog")).unwrap();
        }
        let reopened = PlistFileAdapter::open(&path, scheme()).unwrap();
        let mut rows: Vec<Row> = reopened.rows().collect::<Result<_>>().unwrap();
        rows.sort_by_key(|r| r.get(&Attribute::new("id")).as_i64().unwrap());
        assert_eq!(rows, vec![row(1, "cat"), row(2, "dog")]);
    }

    #[test]
    fn delete_then_reopen_reflects_removal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rows.plist");
        {
            let mut adapter = PlistFileAdapter::open(&path, scheme()).unwrap();
            adapter.add(row(1, "cat")).unwrap();
            adapter.add(row(2, "dog")).unwrap();
            adapter.delete(&Expr::attr("id").eq(Expr::constant(1i64))).unwrap();
        }
        let reopened = PlistFileAdapter::open(&path, scheme()).unwrap();
        assert_eq!(reopened.rows().collect::<Result<Vec<_>>>().unwrap().len(), 1);
    }
}
