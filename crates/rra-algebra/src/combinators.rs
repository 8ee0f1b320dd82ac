//! The eleven lazy algebraic combinators of spec.md §4.1.
//!
//! Every combinator is a small struct holding `Rc<dyn Relation>` operands
//! plus whatever is needed to recompute its scheme and rows on demand;
//! construction validates scheme compatibility up front so a malformed
//! expression tree fails at build time rather than partway through
//! iteration. `rows()` recomputes from the operands every call — laziness
//! here means "not evaluated until asked", not "cached forever".

use crate::relation::{Relation, RelationRef, RowIter};
use hashbrown::{HashMap, HashSet};
use rra_core::{Attribute, Error, Expr, Result, Row, Scheme, Value};
use std::any::Any;
use std::rc::Rc;
use std::sync::Arc;

fn require_same_scheme(a: &Arc<Scheme>, b: &Arc<Scheme>) -> Result<()> {
    if a.as_ref() != b.as_ref() {
        return Err(Error::scheme_violation("operand schemes must match"));
    }
    Ok(())
}

fn collect_rows(relation: &dyn Relation) -> Result<HashSet<Row>> {
    relation.rows().collect()
}

// ---------------------------------------------------------------- union ---

pub struct Union {
    scheme: Arc<Scheme>,
    left: RelationRef,
    right: RelationRef,
}

impl Union {
    pub fn new(left: RelationRef, right: RelationRef) -> Result<Self> {
        require_same_scheme(left.scheme(), right.scheme())?;
        let scheme = left.scheme().clone();
        Ok(Union { scheme, left, right })
    }

    pub fn left(&self) -> &RelationRef {
        &self.left
    }

    pub fn right(&self) -> &RelationRef {
        &self.right
    }
}

impl Relation for Union {
    fn scheme(&self) -> &Arc<Scheme> {
        &self.scheme
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn rows(&self) -> RowIter<'_> {
        match (collect_rows(self.left.as_ref()), collect_rows(self.right.as_ref())) {
            (Ok(mut l), Ok(r)) => {
                l.extend(r);
                Box::new(l.into_iter().map(Ok))
            }
            (Err(e), _) | (_, Err(e)) => Box::new(std::iter::once(Err(e))),
        }
    }
}

// ----------------------------------------------------------- intersection ---

pub struct Intersection {
    scheme: Arc<Scheme>,
    left: RelationRef,
    right: RelationRef,
}

impl Intersection {
    pub fn new(left: RelationRef, right: RelationRef) -> Result<Self> {
        require_same_scheme(left.scheme(), right.scheme())?;
        let scheme = left.scheme().clone();
        Ok(Intersection { scheme, left, right })
    }

    pub fn left(&self) -> &RelationRef {
        &self.left
    }

    pub fn right(&self) -> &RelationRef {
        &self.right
    }
}

impl Relation for Intersection {
    fn scheme(&self) -> &Arc<Scheme> {
        &self.scheme
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn rows(&self) -> RowIter<'_> {
        match (collect_rows(self.left.as_ref()), collect_rows(self.right.as_ref())) {
            (Ok(l), Ok(r)) => Box::new(l.into_iter().filter(move |row| r.contains(row)).map(Ok)),
            (Err(e), _) | (_, Err(e)) => Box::new(std::iter::once(Err(e))),
        }
    }
}

// ------------------------------------------------------------- difference ---

pub struct Difference {
    scheme: Arc<Scheme>,
    left: RelationRef,
    right: RelationRef,
}

impl Difference {
    pub fn new(left: RelationRef, right: RelationRef) -> Result<Self> {
        require_same_scheme(left.scheme(), right.scheme())?;
        let scheme = left.scheme().clone();
        Ok(Difference { scheme, left, right })
    }

    pub fn left(&self) -> &RelationRef {
        &self.left
    }

    pub fn right(&self) -> &RelationRef {
        &self.right
    }
}

impl Relation for Difference {
    fn scheme(&self) -> &Arc<Scheme> {
        &self.scheme
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn rows(&self) -> RowIter<'_> {
        match (collect_rows(self.left.as_ref()), collect_rows(self.right.as_ref())) {
            (Ok(l), Ok(r)) => Box::new(l.into_iter().filter(move |row| !r.contains(row)).map(Ok)),
            (Err(e), _) | (_, Err(e)) => Box::new(std::iter::once(Err(e))),
        }
    }
}

// ---------------------------------------------------------------- project ---

pub struct Project {
    scheme: Arc<Scheme>,
    operand: RelationRef,
}

impl Project {
    pub fn new(operand: RelationRef, scheme: Arc<Scheme>) -> Result<Self> {
        if !scheme.is_subset_of(operand.scheme()) {
            return Err(Error::scheme_violation("projection scheme must be a subset of the operand scheme"));
        }
        Ok(Project { scheme, operand })
    }

    pub fn operand(&self) -> &RelationRef {
        &self.operand
    }

    pub fn projected_scheme(&self) -> &Arc<Scheme> {
        &self.scheme
    }
}

impl Relation for Project {
    fn scheme(&self) -> &Arc<Scheme> {
        &self.scheme
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn rows(&self) -> RowIter<'_> {
        let scheme = self.scheme.clone();
        let mut projected = HashSet::new();
        for row in self.operand.rows() {
            match row {
                Ok(row) => {
                    projected.insert(row.project(&scheme));
                }
                Err(e) => return Box::new(std::iter::once(Err(e))),
            }
        }
        Box::new(projected.into_iter().map(Ok))
    }
}

// ----------------------------------------------------------------- select ---

pub struct Select {
    operand: RelationRef,
    expr: Expr,
}

impl Select {
    pub fn new(operand: RelationRef, expr: Expr) -> Self {
        Select { operand, expr }
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn operand(&self) -> &RelationRef {
        &self.operand
    }
}

impl Relation for Select {
    fn scheme(&self) -> &Arc<Scheme> {
        self.operand.scheme()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn rows(&self) -> RowIter<'_> {
        if let Some(stored) = self.operand.as_any().downcast_ref::<crate::relation::StoredRelation>() {
            if let Some(pushed) = stored.adapter().select_native(&self.expr) {
                return pushed;
            }
        }
        let expr = self.expr.clone();
        Box::new(self.operand.rows().filter(move |row| match row {
            Ok(row) => expr.matches(row),
            Err(_) => true,
        }))
    }
}

// ----------------------------------------------------------------- rename ---

pub struct Rename {
    scheme: Arc<Scheme>,
    operand: RelationRef,
    /// output attribute -> source attribute (identity for unrenamed ones).
    sources: HashMap<Attribute, Attribute>,
}

impl Rename {
    pub fn new(operand: RelationRef, renames: Vec<(Attribute, Attribute)>) -> Result<Self> {
        let operand_scheme = operand.scheme();
        let mut sources: HashMap<Attribute, Attribute> =
            operand_scheme.iter().map(|a| (a.clone(), a.clone())).collect();

        for (from, _to) in &renames {
            if !operand_scheme.contains(from) {
                return Err(Error::scheme_violation("rename source attribute not in scheme"));
            }
            sources.remove(from);
        }
        for (from, to) in &renames {
            if sources.insert(to.clone(), from.clone()).is_some() {
                return Err(Error::scheme_violation("rename creates a colliding attribute"));
            }
        }

        let scheme = Arc::new(Scheme::new(sources.keys().cloned()));
        Ok(Rename { scheme, operand, sources })
    }

    pub fn operand(&self) -> &RelationRef {
        &self.operand
    }

    /// Renames a single row the same way this node renames its operand's
    /// rows. Used by the differentiator to rename `dR` without
    /// re-deriving the whole relation (spec.md §4.4 `d(rename) = rename of
    /// dR`).
    pub fn rename_row(&self, row: &Row) -> Result<Row> {
        let values = self
            .scheme
            .iter()
            .map(|attr| row.get(self.sources.get(attr).unwrap_or(attr)))
            .collect();
        Row::new(self.scheme.clone(), values)
    }
}

impl Relation for Rename {
    fn scheme(&self) -> &Arc<Scheme> {
        &self.scheme
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn rows(&self) -> RowIter<'_> {
        let scheme = self.scheme.clone();
        let sources = self.sources.clone();
        Box::new(self.operand.rows().map(move |row| {
            let row = row?;
            let values = scheme
                .iter()
                .map(|attr| row.get(sources.get(attr).unwrap_or(attr)))
                .collect();
            Row::new(scheme.clone(), values)
        }))
    }
}

// --------------------------------------------------------------- equijoin ---

pub struct Equijoin {
    scheme: Arc<Scheme>,
    left: RelationRef,
    right: RelationRef,
    matching: Vec<(Attribute, Attribute)>,
}

impl Equijoin {
    pub fn new(left: RelationRef, right: RelationRef, matching: Vec<(Attribute, Attribute)>) -> Result<Self> {
        for (a, b) in &matching {
            if !left.scheme().contains(a) {
                return Err(Error::scheme_violation("equijoin matching attribute missing from left scheme"));
            }
            if !right.scheme().contains(b) {
                return Err(Error::scheme_violation("equijoin matching attribute missing from right scheme"));
            }
        }
        for shared in left.scheme().intersection(right.scheme()).iter() {
            let covered = matching.iter().any(|(a, b)| a == shared && b == shared);
            if !covered {
                return Err(Error::scheme_violation("ambiguous overlapping attribute in equijoin"));
            }
        }
        let scheme = Arc::new(left.scheme().union(right.scheme()));
        Ok(Equijoin { scheme, left, right, matching })
    }

    fn key(row: &Row, attrs: &[Attribute]) -> Vec<Value> {
        attrs.iter().map(|a| row.get(a)).collect()
    }

    pub fn left(&self) -> &RelationRef {
        &self.left
    }

    pub fn right(&self) -> &RelationRef {
        &self.right
    }

    pub fn matching(&self) -> &[(Attribute, Attribute)] {
        &self.matching
    }

    pub fn joined_scheme(&self) -> &Arc<Scheme> {
        &self.scheme
    }

    /// Joins two already-materialized snapshots the same way this node
    /// joins its lazy operands. Used by the differentiator to compute
    /// `dA ⋈ B_after` and friends without rebuilding the lazy tree
    /// (spec.md §4.4).
    pub fn join_concrete(&self, left: &crate::relation::ConcreteRelation, right: &crate::relation::ConcreteRelation) -> Equijoin {
        Equijoin {
            scheme: self.scheme.clone(),
            left: Rc::new(crate::relation::ConcreteRelation::new(left.scheme().clone(), left.rows_set().iter().cloned())),
            right: Rc::new(crate::relation::ConcreteRelation::new(right.scheme().clone(), right.rows_set().iter().cloned())),
            matching: self.matching.clone(),
        }
    }
}

impl Relation for Equijoin {
    fn scheme(&self) -> &Arc<Scheme> {
        &self.scheme
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn rows(&self) -> RowIter<'_> {
        let left_attrs: Vec<Attribute> = self.matching.iter().map(|(a, _)| a.clone()).collect();
        let right_attrs: Vec<Attribute> = self.matching.iter().map(|(_, b)| b.clone()).collect();

        let right_rows: Result<Vec<Row>> = self.right.rows().collect();
        let right_rows = match right_rows {
            Ok(r) => r,
            Err(e) => return Box::new(std::iter::once(Err(e))),
        };

        let mut build: HashMap<Vec<Value>, Vec<Row>> = HashMap::new();
        for row in &right_rows {
            build.entry(Self::key(row, &right_attrs)).or_default().push(row.clone());
        }

        let scheme = self.scheme.clone();
        let mut out = Vec::new();
        for left_row in self.left.rows() {
            let left_row = match left_row {
                Ok(r) => r,
                Err(e) => return Box::new(std::iter::once(Err(e))),
            };
            let key = Self::key(&left_row, &left_attrs);
            if let Some(matches) = build.get(&key) {
                for right_row in matches {
                    out.push(left_row.combine(right_row, &scheme));
                }
            }
        }
        Box::new(out.into_iter().map(Ok))
    }
}

// -------------------------------------------------------------- aggregate ---

#[derive(Clone)]
pub enum AggregateKind {
    Min,
    Max,
    Count,
    Custom(Rc<dyn Fn(&Value, &Value) -> Value>),
}

pub struct Aggregate {
    scheme: Arc<Scheme>,
    operand: RelationRef,
    attr: Attribute,
    output: Attribute,
    initial: Value,
    kind: AggregateKind,
}

impl Aggregate {
    pub fn new(operand: RelationRef, attr: Attribute, output: Attribute, initial: Value, kind: AggregateKind) -> Result<Self> {
        if !operand.scheme().contains(&attr) {
            return Err(Error::scheme_violation("aggregate attribute missing from operand scheme"));
        }
        let scheme = Arc::new(Scheme::new(vec![output.clone()]));
        Ok(Aggregate { scheme, operand, attr, output, initial, kind })
    }

    pub fn min(operand: RelationRef, attr: Attribute, output: Attribute) -> Result<Self> {
        Self::new(operand, attr, output, Value::Null, AggregateKind::Min)
    }

    pub fn max(operand: RelationRef, attr: Attribute, output: Attribute) -> Result<Self> {
        Self::new(operand, attr, output, Value::Null, AggregateKind::Max)
    }

    pub fn count(operand: RelationRef, attr: Attribute, output: Attribute) -> Result<Self> {
        Self::new(operand, attr, output, Value::Integer(0), AggregateKind::Count)
    }

    pub fn operand(&self) -> &RelationRef {
        &self.operand
    }

    /// Rebuilds this aggregate over an already-materialized snapshot in
    /// place of the lazy operand. Used by the differentiator, which
    /// recomputes aggregates rather than maintaining them incrementally
    /// (spec.md §4.4: "aggregates do not decompose incrementally here").
    pub fn over_concrete(&self, rows: &crate::relation::ConcreteRelation) -> Aggregate {
        Aggregate {
            scheme: self.scheme.clone(),
            operand: Rc::new(crate::relation::ConcreteRelation::new(rows.scheme().clone(), rows.rows_set().iter().cloned())),
            attr: self.attr.clone(),
            output: self.output.clone(),
            initial: self.initial.clone(),
            kind: self.kind.clone(),
        }
    }

    fn fold(&self, acc: &Value, value: &Value) -> Value {
        match &self.kind {
            AggregateKind::Min => {
                if acc.is_null() || value < acc {
                    value.clone()
                } else {
                    acc.clone()
                }
            }
            AggregateKind::Max => {
                if acc.is_null() || value > acc {
                    value.clone()
                } else {
                    acc.clone()
                }
            }
            AggregateKind::Count => Value::Integer(acc.as_i64().unwrap_or(0) + 1),
            AggregateKind::Custom(f) => f(acc, value),
        }
    }
}

impl Relation for Aggregate {
    fn scheme(&self) -> &Arc<Scheme> {
        &self.scheme
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn rows(&self) -> RowIter<'_> {
        let mut acc = self.initial.clone();
        for row in self.operand.rows() {
            match row {
                Ok(row) => acc = self.fold(&acc, &row.get(&self.attr)),
                Err(e) => return Box::new(std::iter::once(Err(e))),
            }
        }
        let row = Row::new(self.scheme.clone(), vec![acc]);
        Box::new(std::iter::once(row))
    }
}

// --------------------------------------------------------------- otherwise ---

pub struct Otherwise {
    left: RelationRef,
    right: RelationRef,
}

impl Otherwise {
    pub fn new(left: RelationRef, right: RelationRef) -> Result<Self> {
        require_same_scheme(left.scheme(), right.scheme())?;
        Ok(Otherwise { left, right })
    }

    pub fn left(&self) -> &RelationRef {
        &self.left
    }

    pub fn right(&self) -> &RelationRef {
        &self.right
    }
}

impl Relation for Otherwise {
    fn scheme(&self) -> &Arc<Scheme> {
        self.left.scheme()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn rows(&self) -> RowIter<'_> {
        match collect_rows(self.left.as_ref()) {
            Ok(rows) if !rows.is_empty() => Box::new(rows.into_iter().map(Ok)),
            Ok(_) => self.right.rows(),
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }
}

// ------------------------------------------------------------------ unique ---

pub struct Unique {
    operand: RelationRef,
    attr: Attribute,
    value: Value,
}

impl Unique {
    pub fn new(operand: RelationRef, attr: Attribute, value: Value) -> Result<Self> {
        if !operand.scheme().contains(&attr) {
            return Err(Error::scheme_violation("unique attribute missing from operand scheme"));
        }
        Ok(Unique { operand, attr, value })
    }

    pub fn operand(&self) -> &RelationRef {
        &self.operand
    }

    pub fn over_concrete(&self, rows: &crate::relation::ConcreteRelation) -> Unique {
        Unique {
            operand: Rc::new(crate::relation::ConcreteRelation::new(rows.scheme().clone(), rows.rows_set().iter().cloned())),
            attr: self.attr.clone(),
            value: self.value.clone(),
        }
    }

    /// Whether every row of `rows` has `attr == value` — the condition
    /// this combinator gates on. Used by the differentiator to detect the
    /// transition boundary without rebuilding the lazy tree.
    pub fn holds(&self, rows: &crate::relation::ConcreteRelation) -> bool {
        rows.rows_set().iter().all(|row| row.get(&self.attr) == self.value)
    }
}

impl Relation for Unique {
    fn scheme(&self) -> &Arc<Scheme> {
        self.operand.scheme()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn rows(&self) -> RowIter<'_> {
        let rows: Result<Vec<Row>> = self.operand.rows().collect();
        match rows {
            Ok(rows) => {
                if rows.iter().all(|row| row.get(&self.attr) == self.value) {
                    Box::new(rows.into_iter().map(Ok))
                } else {
                    Box::new(std::iter::empty())
                }
            }
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }
}

// ------------------------------------------------------------------ update ---

pub struct Update {
    operand: RelationRef,
    new_values: Vec<(Attribute, Value)>,
}

impl Update {
    pub fn new(operand: RelationRef, new_values: Vec<(Attribute, Value)>) -> Result<Self> {
        for (attr, _) in &new_values {
            if !operand.scheme().contains(attr) {
                return Err(Error::scheme_violation("update attribute missing from operand scheme"));
            }
        }
        Ok(Update { operand, new_values })
    }

    pub fn operand(&self) -> &RelationRef {
        &self.operand
    }

    pub fn new_values(&self) -> &[(Attribute, Value)] {
        &self.new_values
    }
}

impl Relation for Update {
    fn scheme(&self) -> &Arc<Scheme> {
        self.operand.scheme()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn rows(&self) -> RowIter<'_> {
        let new_values = self.new_values.clone();
        Box::new(self.operand.rows().map(move |row| row.map(|row| row.with_overrides(&new_values))))
    }
}

