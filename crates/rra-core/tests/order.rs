//! Property tests for `Value`'s total order (spec.md §3: values compare
//! by type tag first, then within-type) and for the row operations that
//! lean on scheme-relative lookup (`with_overrides`, `project`).

use proptest::prelude::*;
use rra_core::{Attribute, Row, Scheme, Value};
use std::cmp::Ordering;
use std::sync::Arc;

fn any_value() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<i64>().prop_map(Value::Integer),
        any::<f64>().prop_map(Value::Real),
        "[a-zA-Z0-9]{0,8}".prop_map(Value::Text),
        prop::collection::vec(any::<u8>(), 0..8).prop_map(Value::Blob),
    ]
}

fn flip(ord: Ordering) -> Ordering {
    match ord {
        Ordering::Less => Ordering::Greater,
        Ordering::Greater => Ordering::Less,
        Ordering::Equal => Ordering::Equal,
    }
}

proptest! {
    #[test]
    fn value_order_is_antisymmetric(a in any_value(), b in any_value()) {
        prop_assert_eq!(a.cmp(&b), flip(b.cmp(&a)));
    }

    #[test]
    fn value_order_is_transitive(a in any_value(), b in any_value(), c in any_value()) {
        if a.cmp(&b) != Ordering::Greater && b.cmp(&c) != Ordering::Greater {
            prop_assert_ne!(a.cmp(&c), Ordering::Greater);
        }
    }

    #[test]
    fn distinct_type_tags_never_compare_equal(a in any_value(), b in any_value()) {
        let different_tag = std::mem::discriminant(&a) != std::mem::discriminant(&b);
        if different_tag {
            prop_assert_ne!(a.cmp(&b), Ordering::Equal);
        }
    }

    #[test]
    fn with_overrides_never_touches_unnamed_attributes(id in any::<i64>(), name in "[a-zA-Z]{1,8}", new_name in "[a-zA-Z]{1,8}") {
        let scheme = Arc::new(Scheme::new(vec![Attribute::new("id"), Attribute::new("name")]));
        let row = Row::new(scheme, vec![Value::Integer(id), Value::Text(name)]).unwrap();
        let updated = row.with_overrides(&[(Attribute::new("name"), Value::Text(new_name.clone()))]);
        prop_assert_eq!(updated.get(&Attribute::new("id")), Value::Integer(id));
        prop_assert_eq!(updated.get(&Attribute::new("name")), Value::Text(new_name));
    }

    #[test]
    fn project_then_get_matches_original(id in any::<i64>(), name in "[a-zA-Z]{1,8}") {
        let scheme = Arc::new(Scheme::new(vec![Attribute::new("id"), Attribute::new("name")]));
        let row = Row::new(scheme, vec![Value::Integer(id), Value::Text(name.clone())]).unwrap();
        let name_only = Arc::new(Scheme::new(vec![Attribute::new("name")]));
        let projected = row.project(&name_only);
        prop_assert_eq!(projected.values().len(), 1);
        prop_assert_eq!(projected.get(&Attribute::new("name")), Value::Text(name));
        prop_assert_eq!(projected.get(&Attribute::new("id")), Value::NotFound);
    }
}
