//! rra-algebra — concrete relations (spec.md §3 C3) and the eleven lazy
//! algebraic combinators (§4.1 C4) built on top of `rra-core`'s value
//! layer and `rra-storage`'s adapter contract.

mod combinators;
mod relation;

pub use combinators::{Aggregate, AggregateKind, Difference, Equijoin, Intersection, Otherwise, Project, Rename, Select, Union, Unique, Update};
pub use relation::{materialize, same_relation, ConcreteRelation, Relation, RelationRef, RowIter, StoredRelation};
