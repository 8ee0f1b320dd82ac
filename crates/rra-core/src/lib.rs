//! rra-core — value/row/scheme primitives and select expressions.
//!
//! This crate provides the foundational types shared by every other crate
//! in the `rra` reactive relational algebra engine:
//!
//! - `Value`: the tagged-union cell value (spec.md §3)
//! - `Attribute` / `Scheme`: interned column names and attribute sets
//! - `Row`: a finite mapping attribute → value
//! - `Expr`: the select-expression predicate AST
//! - `Error`: the four error kinds of spec.md §7
//!
//! # Example
//!
//! ```
//! use rra_core::{Attribute, Expr, Row, Scheme, Value};
//! use std::sync::Arc;
//!
//! let scheme = Arc::new(Scheme::new(vec![Attribute::new("id"), Attribute::new("name")]));
//! let row = Row::new(scheme, vec![Value::Integer(1), Value::Text("cat".into())]).unwrap();
//!
//! let predicate = Expr::attr("id").eq(Expr::constant(1i64));
//! assert!(predicate.matches(&row));
//! ```

#![no_std]

extern crate alloc;

mod attribute;
mod error;
mod expr;
mod row;
mod value;

pub use attribute::{Attribute, Scheme};
pub use error::{Error, Result};
pub use expr::{BinaryOp, Expr};
pub use row::Row;
pub use value::Value;
