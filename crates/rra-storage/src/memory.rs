//! A trivial in-memory storage adapter.
//!
//! Used as the default backing store for stored relations and in tests of
//! the layers above. Implements `select_native` directly over its `Vec`
//! so `rra-algebra::Select` always has a pushdown path to exercise.

use crate::adapter::{AdapterRowIter, StorageAdapter};
use rra_core::{Attribute, Expr, Result, Row, Scheme, Value};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct MemoryAdapter {
    scheme: Arc<Scheme>,
    rows: Vec<Row>,
}

impl MemoryAdapter {
    pub fn new(scheme: Arc<Scheme>) -> Self {
        MemoryAdapter { scheme, rows: Vec::new() }
    }

    pub fn with_rows(scheme: Arc<Scheme>, rows: Vec<Row>) -> Self {
        MemoryAdapter { scheme, rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl StorageAdapter for MemoryAdapter {
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
        Ok(1)
    }

    fn delete(&mut self, predicate: &Expr) -> Result<usize> {
        let before = self.rows.len();
        self.rows.retain(|row| !predicate.matches(row));
        Ok(before - self.rows.len())
    }

    fn update(&mut self, predicate: &Expr, new_values: &[(Attribute, Value)]) -> Result<usize> {
        let mut count = 0;
        for row in self.rows.iter_mut() {
            if predicate.matches(row) {
                *row = row.with_overrides(new_values);
                count += 1;
            }
        }
        Ok(count)
    }

    fn select_native(&self, predicate: &Expr) -> Option<AdapterRowIter<'_>> {
        let predicate = predicate.clone();
        Some(Box::new(
            self.rows.iter().filter(move |row| predicate.matches(row)).cloned().map(Ok),
        ))
    }
}
