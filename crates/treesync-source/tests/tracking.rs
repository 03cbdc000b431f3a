//! Change tracking and delta encoding on the source side.
//!
//! Tests cover:
//! - No-op writes and idempotent reads
//! - Reset semantics
//! - Replacement vs. in-place update of nested children
//! - Propagation through nested nodes and maps
//! - Detached nodes staying inert

use proptest::prelude::*;
use std::sync::Arc;
use treesync_core::{Envelope, Schema, SyncError, Value};
use treesync_source::{Node, NodeMap, PrimitiveMap};

fn aiming() -> Arc<Schema> {
    Schema::builder("Aiming")
        .scalar("angle", 0.0)
        .scalar("active", false)
        .build()
        .unwrap()
}

fn pet() -> Arc<Schema> {
    Schema::builder("Pet")
        .scalar("species", "cat")
        .scalar("hp", 10)
        .build()
        .unwrap()
}

/// Wire ids: aiming=0, inventory=1, level=2, name=3, pets=4.
fn hero() -> Arc<Schema> {
    Schema::builder("Hero")
        .scalar("name", "Default Hero Name")
        .scalar("level", 1)
        .node("aiming", aiming())
        .primitive_map("inventory")
        .node_map("pets", pet())
        .build()
        .unwrap()
}

fn flushed_hero() -> Node {
    let root = Node::new(hero());
    root.flush();
    root
}

#[test]
fn test_fresh_node_snapshot() {
    let root = Node::new(hero());
    assert_eq!(
        root.complete_state().to_json().unwrap(),
        r#"[1,3,"Default Hero Name",2,1,0,[1,1,0.0,0,false],1,[1,0],4,[1,0]]"#
    );
}

#[test]
fn test_setting_current_value_is_invisible() {
    let root = flushed_hero();
    root.set("name", "Default Hero Name").unwrap();
    root.node("aiming").unwrap().set("active", false).unwrap();

    assert!(!root.has_changes());
    assert!(root.recent_changes().is_empty());
}

#[test]
fn test_write_and_revert_cancels_out() {
    let root = flushed_hero();
    root.set("level", 2).unwrap();
    root.set("level", 1).unwrap();

    assert!(root.recent_changes().is_empty());
}

#[test]
fn test_delta_follows_declaration_order() {
    let root = flushed_hero();
    root.set("level", 5).unwrap();
    root.set("name", "Zed").unwrap();

    assert_eq!(root.recent_changes().to_json().unwrap(), r#"[2,3,"Zed",2,5]"#);
}

#[test]
fn test_recent_changes_is_idempotent() {
    let root = flushed_hero();
    root.set("name", "Ann").unwrap();
    root.primitive_map("inventory").unwrap().set("gold", 10).unwrap();

    let first = root.recent_changes();
    let second = root.recent_changes();
    assert_eq!(first, second);
}

#[test]
fn test_reset_clears_until_next_write() {
    let root = flushed_hero();
    root.set("name", "Ann").unwrap();
    root.node("aiming").unwrap().set("angle", 1.0).unwrap();

    root.reset_recent_changes();
    assert!(root.recent_changes().is_empty());
    assert!(!root.node("aiming").unwrap().has_changes());

    root.node("aiming").unwrap().set("angle", 2.0).unwrap();
    assert_eq!(root.recent_changes().to_json().unwrap(), "[2,0,[2,1,2.0]]");
}

#[test]
fn test_replacement_sends_complete_state() {
    let root = flushed_hero();
    let replacement = Node::new(aiming());
    replacement.set("angle", 1.5).unwrap();

    let old = root.set_child("aiming", replacement).unwrap().unwrap();
    assert!(!old.is_attached());
    assert_eq!(
        root.recent_changes().to_json().unwrap(),
        "[2,0,[1,1,1.5,0,false]]"
    );
}

#[test]
fn test_in_place_edit_sends_nested_delta() {
    let root = flushed_hero();
    root.node("aiming").unwrap().set("active", true).unwrap();

    assert_eq!(root.recent_changes().to_json().unwrap(), "[2,0,[2,0,true]]");
}

#[test]
fn test_nested_child_reverted_in_cycle_is_omitted() {
    let root = flushed_hero();
    let aim = root.node("aiming").unwrap();
    aim.set("active", true).unwrap();
    aim.set("active", false).unwrap();
    root.set("level", 3).unwrap();

    assert_eq!(root.recent_changes().to_json().unwrap(), "[2,2,3]");
}

#[test]
fn test_replaced_child_is_inert() {
    let root = flushed_hero();
    let old = root.node("aiming").unwrap();
    root.set_child("aiming", Node::new(aiming())).unwrap();
    root.flush();

    old.set("angle", 9.0).unwrap();
    assert!(old.has_changes());
    assert!(!old.is_attached());
    assert!(!root.has_changes());
    assert!(root.recent_changes().is_empty());
}

#[test]
fn test_clearing_a_child_sends_null() {
    let root = flushed_hero();
    root.clear_child("aiming").unwrap();

    assert_eq!(root.recent_changes().to_json().unwrap(), "[2,0,null]");
    assert!(root.child("aiming").unwrap().is_none());
    assert!(matches!(
        root.node("aiming"),
        Err(SyncError::ChildKindMismatch { .. })
    ));

    // Absent children are left out of snapshots.
    root.flush();
    assert_eq!(
        root.complete_state().to_json().unwrap(),
        r#"[1,3,"Default Hero Name",2,1,1,[1,0],4,[1,0]]"#
    );
}

#[test]
fn test_changes_reach_root_through_maps() {
    let root = Node::new(hero());
    let pets = root.node_map("pets").unwrap();
    pets.set("rex", Node::new(pet())).unwrap();
    root.flush();

    pets.get("rex").unwrap().set("hp", 3).unwrap();
    assert_eq!(
        root.recent_changes().to_json().unwrap(),
        "[2,4,[2,2,0,[2,0,3]]]"
    );

    root.flush();
    root.primitive_map("inventory").unwrap().set("gold", 10).unwrap();
    assert_eq!(
        root.recent_changes().to_json().unwrap(),
        r#"[2,1,[2,0,"gold",0,10]]"#
    );
}

#[test]
fn test_many_writes_report_once() {
    let root = flushed_hero();
    let aim = root.node("aiming").unwrap();
    for i in 0..10 {
        aim.set("angle", i as f64).unwrap();
    }

    assert_eq!(root.recent_changes().to_json().unwrap(), "[2,0,[2,1,9.0]]");
}

#[test]
fn test_attaching_an_owned_child_is_rejected() {
    let root = flushed_hero();
    let other = Node::new(hero());

    let err = root
        .set_child("aiming", other.node("aiming").unwrap())
        .unwrap_err();
    assert_eq!(err, SyncError::AlreadyAttached);
    assert!(!root.has_changes());
}

#[test]
fn test_setting_same_child_is_a_no_op() {
    let root = flushed_hero();
    let aim = root.node("aiming").unwrap();
    root.set_child("aiming", aim).unwrap();

    assert!(!root.has_changes());
}

#[test]
fn test_wrong_kinds_are_rejected() {
    let root = flushed_hero();

    assert!(matches!(
        root.set("name", 3),
        Err(SyncError::TypeMismatch { .. })
    ));
    assert!(matches!(
        root.set("aiming", 3),
        Err(SyncError::NotScalar { .. })
    ));
    assert!(matches!(
        root.set("missing", 3),
        Err(SyncError::UnknownField { .. })
    ));
    assert!(matches!(
        root.set_child("aiming", PrimitiveMap::new()),
        Err(SyncError::ChildKindMismatch { .. })
    ));
    assert!(matches!(
        root.set_child("pets", NodeMap::new(aiming())),
        Err(SyncError::ChildKindMismatch { .. })
    ));
    assert!(!root.has_changes());
}

#[test]
fn test_non_finite_floats_never_reach_the_wire() {
    let root = flushed_hero();
    let aim = root.node("aiming").unwrap();

    for x in [f64::NAN, f64::INFINITY] {
        assert!(matches!(
            aim.set("angle", x),
            Err(SyncError::NonFiniteFloat(_))
        ));
        assert!(matches!(
            root.primitive_map("inventory").unwrap().set("weight", x),
            Err(SyncError::NonFiniteFloat(_))
        ));
    }

    assert_eq!(aim.get("angle").unwrap(), Value::Float(0.0));
    assert!(!root.primitive_map("inventory").unwrap().contains_key("weight"));
    assert!(!root.has_changes());
    assert!(root.flush().is_empty());

    // What does go out still parses back to the same envelope.
    aim.set("angle", -0.25).unwrap();
    let delta = root.flush();
    assert_eq!(delta.to_json().unwrap(), "[2,0,[2,1,-0.25]]");
    assert_eq!(Envelope::from_json(&delta.to_json().unwrap()).unwrap(), delta);
}

#[test]
fn test_int_widens_into_float_field() {
    let root = flushed_hero();
    let aim = root.node("aiming").unwrap();
    aim.set("angle", 2).unwrap();

    assert_eq!(aim.get("angle").unwrap(), Value::Float(2.0));
}

#[derive(Clone, Debug)]
enum Op {
    SetName(String),
    SetLevel(i64),
    SetAngle(f64),
    SetItem(u8, i64),
    DeleteItem(u8),
}

fn op_strategy() -> impl Strategy<Value = Op> {
    prop_oneof![
        "[a-c]{1,3}".prop_map(Op::SetName),
        (0i64..4).prop_map(Op::SetLevel),
        (0i32..4).prop_map(|a| Op::SetAngle(a as f64)),
        (0u8..4, 0i64..4).prop_map(|(k, v)| Op::SetItem(k, v)),
        (0u8..4).prop_map(Op::DeleteItem),
    ]
}

fn apply(root: &Node, op: &Op) {
    match op {
        Op::SetName(name) => root.set("name", name.as_str()).unwrap(),
        Op::SetLevel(level) => root.set("level", *level).unwrap(),
        Op::SetAngle(angle) => root.node("aiming").unwrap().set("angle", *angle).unwrap(),
        Op::SetItem(key, value) => {
            root.primitive_map("inventory")
                .unwrap()
                .set(&format!("k{}", key), *value)
                .unwrap();
        }
        Op::DeleteItem(key) => {
            root.primitive_map("inventory")
                .unwrap()
                .delete(&format!("k{}", key));
        }
    }
}

proptest! {
    #[test]
    fn reads_are_idempotent_and_reset_clears(ops in prop::collection::vec(op_strategy(), 0..24)) {
        let root = flushed_hero();
        for op in &ops {
            apply(&root, op);
        }

        let first = root.recent_changes();
        prop_assert_eq!(&first, &root.recent_changes());

        prop_assert_eq!(root.flush(), first);
        prop_assert!(root.recent_changes().is_empty());
    }
}
