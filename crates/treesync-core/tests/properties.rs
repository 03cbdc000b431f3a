//! Property-based tests for schema descriptors and the wire envelope.

use proptest::prelude::*;
use std::collections::BTreeSet;
use treesync_core::{Envelope, Schema, Value, Wire};

fn field_names() -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set("[a-z]{1,8}", 1..12).prop_map(|set| set.into_iter().collect())
}

fn build(name: &str, names: &[String], scalars: &BTreeSet<String>) -> std::sync::Arc<Schema> {
    let mut builder = Schema::builder(name);
    for field in names {
        builder = if scalars.contains(field) {
            builder.scalar(field.clone(), 0)
        } else {
            builder.primitive_map(field.clone())
        };
    }
    builder.build().unwrap()
}

fn value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::Int),
        // Quarter steps keep the JSON text exact.
        (-4_000_000i32..4_000_000).prop_map(|q| Value::Float(f64::from(q) / 4.0)),
        "[a-zA-Z0-9 ]{0,12}".prop_map(Value::Text),
    ]
}

fn wire_strategy() -> impl Strategy<Value = Wire> {
    let leaf = prop_oneof![Just(Wire::Absent), value_strategy().prop_map(Wire::Value)];
    leaf.prop_recursive(3, 24, 6, |inner| {
        prop::collection::vec(inner, 0..6).prop_map(Wire::Seq)
    })
}

proptest! {
    #[test]
    fn wire_ids_ignore_declaration_order(
        names in field_names(),
        seed in any::<u64>(),
    ) {
        let scalars: BTreeSet<String> = names.iter().step_by(2).cloned().collect();

        // Same names, different declaration order.
        let mut shuffled = names.clone();
        let len = shuffled.len();
        for i in 0..len {
            let j = ((seed >> (i % 32)) as usize + i * 7) % len;
            shuffled.swap(i, j);
        }

        let source = build("Source", &names, &scalars);
        let mirror = build("Mirror", &shuffled, &scalars);

        for name in &names {
            prop_assert_eq!(source.wire_id(name), mirror.wire_id(name));
        }
    }

    #[test]
    fn wire_ids_are_dense_and_sorted(names in field_names()) {
        let schema = build("Dense", &names, &BTreeSet::new());
        let mut sorted = names.clone();
        sorted.sort();
        for (rank, name) in sorted.iter().enumerate() {
            prop_assert_eq!(schema.wire_id(name), Some(rank as u32));
        }
    }

    #[test]
    fn envelope_survives_json(body in prop::collection::vec(wire_strategy(), 0..10)) {
        let mut items = vec![Wire::Value(Value::Int(2))];
        items.extend(body);
        let envelope = Envelope::from_wire(items);

        let json = envelope.to_json().unwrap();
        prop_assert_eq!(Envelope::from_json(&json).unwrap(), envelope);
    }
}
