//! Row structure for the rra relational algebra engine.
//!
//! A `Row` is a finite mapping attribute → value over a shared `Scheme`.
//! Internally it stores values positionally (mirroring the teacher's
//! `cynos_core::Row`) and resolves an attribute to a position by asking the
//! `Scheme` for its index — so two rows over the same `Arc<Scheme>` share
//! lookup cost without either one owning a hash map per row.

use crate::attribute::{Attribute, Scheme};
use crate::error::{Error, Result};
use crate::value::Value;
use alloc::sync::Arc;
use alloc::vec::Vec;

/// A row: a mapping from every attribute of `scheme` to a `Value`.
///
/// Lookup of an attribute outside the scheme returns `Value::NotFound`
/// rather than panicking (spec.md §3).
#[derive(Clone, Debug)]
pub struct Row {
    scheme: Arc<Scheme>,
    values: Vec<Value>,
}

impl Row {
    /// Builds a row over `scheme`. `values` must be given in the same
    /// order as `scheme.to_vec()` and must not contain `Value::NotFound`.
    pub fn new(scheme: Arc<Scheme>, values: Vec<Value>) -> Result<Self> {
        if values.len() != scheme.len() {
            return Err(Error::SchemeViolation {
                message: alloc::format!(
                    "row has {} values but scheme has {} attributes",
                    values.len(),
                    scheme.len()
                ),
            });
        }
        if values.iter().any(Value::is_not_found) {
            return Err(Error::SchemeViolation {
                message: "NotFound may not be stored in a row".into(),
            });
        }
        Ok(Row { scheme, values })
    }

    pub fn scheme(&self) -> &Arc<Scheme> {
        &self.scheme
    }

    /// Looks up `attr`. Returns `Value::NotFound` if `attr` is not part of
    /// this row's scheme.
    pub fn get(&self, attr: &Attribute) -> Value {
        match self.index_of(attr) {
            Some(idx) => self.values[idx].clone(),
            None => Value::NotFound,
        }
    }

    pub fn get_ref(&self, attr: &Attribute) -> Option<&Value> {
        self.index_of(attr).map(|idx| &self.values[idx])
    }

    fn index_of(&self, attr: &Attribute) -> Option<usize> {
        self.scheme.iter().position(|a| a == attr)
    }

    pub fn values(&self) -> &[Value] {
        &self.values
    }

    /// Restricts this row to `projected` (spec.md §4.1 `project`).
    /// `projected` must be a subset of this row's scheme.
    pub fn project(&self, projected: &Arc<Scheme>) -> Row {
        let values = projected
            .to_vec()
            .iter()
            .map(|attr| self.get(attr))
            .collect::<Vec<_>>();
        Row { scheme: projected.clone(), values }
    }

    /// Returns a copy of this row with the given attributes overwritten
    /// (spec.md §4.1 `update` and `equijoin`'s "a overwrites on overlap").
    /// Attributes not already in scope are *not* added — use
    /// `extend_with_scheme` for equijoin's scheme-widening case.
    pub fn with_overrides(&self, overrides: &[(Attribute, Value)]) -> Row {
        let mut values = self.values.clone();
        for (attr, value) in overrides {
            if let Some(idx) = self.index_of(attr) {
                values[idx] = value.clone();
            }
        }
        Row { scheme: self.scheme.clone(), values }
    }

    /// Combines `self` (role "a") with `other` (role "b") into a row over
    /// `combined_scheme`, with `self`'s values taking precedence on overlap
    /// beyond the join-matching attributes (spec.md §4.1 `equijoin`).
    pub fn combine(&self, other: &Row, combined_scheme: &Arc<Scheme>) -> Row {
        let values = combined_scheme
            .to_vec()
            .iter()
            .map(|attr| {
                let from_self = self.get(attr);
                if !from_self.is_not_found() {
                    from_self
                } else {
                    other.get(attr)
                }
            })
            .collect::<Vec<_>>();
        Row { scheme: combined_scheme.clone(), values }
    }

    /// True iff this row's keys are exactly `scheme`.
    pub fn matches_scheme(&self, scheme: &Scheme) -> bool {
        self.scheme.as_ref() == scheme
    }
}

impl PartialEq for Row {
    fn eq(&self, other: &Self) -> bool {
        self.scheme == other.scheme && self.values == other.values
    }
}

impl Eq for Row {}

impl core::hash::Hash for Row {
    fn hash<H: core::hash::Hasher>(&self, state: &mut H) {
        self.values.hash(state);
    }
}
