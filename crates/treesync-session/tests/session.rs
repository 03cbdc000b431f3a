//! Publisher -> transport -> subscriber flows.
//!
//! Tests cover:
//! - Late joiners receiving a complete state mid-stream
//! - Several subscribers converging on the source
//! - Recovery after a rejected envelope
//! - Undecodable bytes

use proptest::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use treesync_core::{Envelope, Schema, SyncError};
use treesync_mirror::MirrorNode;
use treesync_session::{Publisher, SessionConfig, SessionConfigBuilder, Subscriber, SubscriberId};
use treesync_source::Node;

fn pet() -> Arc<Schema> {
    Schema::builder("Pet")
        .scalar("species", "cat")
        .scalar("hp", 10)
        .build()
        .unwrap()
}

fn hero() -> Arc<Schema> {
    Schema::builder("Hero")
        .scalar("name", "Default Hero Name")
        .scalar("level", 1)
        .primitive_map("inventory")
        .node_map("pets", pet())
        .build()
        .unwrap()
}

/// Deliver every outgoing envelope as JSON bytes.
fn deliver(publisher: &mut Publisher, subscribers: &mut BTreeMap<SubscriberId, Subscriber>) {
    for out in publisher.flush() {
        if let Some(subscriber) = subscribers.get_mut(&out.subscriber) {
            subscriber.receive_bytes(&out.encode().unwrap()).unwrap();
        }
    }
}

fn join(
    publisher: &mut Publisher,
    subscribers: &mut BTreeMap<SubscriberId, Subscriber>,
) -> SubscriberId {
    let id = publisher.subscribe();
    subscribers.insert(id, Subscriber::new(MirrorNode::new(hero())));
    id
}

#[test]
fn test_late_joiner_catches_up() {
    let mut publisher = Publisher::new(Node::new(hero()), SessionConfig::default());
    let mut subscribers = BTreeMap::new();
    let early = join(&mut publisher, &mut subscribers);
    deliver(&mut publisher, &mut subscribers);

    let root = publisher.root().clone();
    root.set("level", 4).unwrap();
    root.primitive_map("inventory").unwrap().set("gold", 30).unwrap();
    deliver(&mut publisher, &mut subscribers);

    let late = join(&mut publisher, &mut subscribers);
    root.set("name", "Ayla").unwrap();
    deliver(&mut publisher, &mut subscribers);

    for id in [early, late] {
        let subscriber = &subscribers[&id];
        assert!(!subscriber.needs_resync());
        assert_eq!(subscriber.mirror().complete_state(), root.complete_state());
    }
    assert_eq!(publisher.stats().complete_sent, 2);
    assert_eq!(publisher.stats().deltas_sent, 2);
}

#[test]
fn test_rejected_envelope_triggers_resync() {
    let mut publisher = Publisher::new(Node::new(hero()), SessionConfig::default());
    let id = publisher.subscribe();
    let mut subscriber = Subscriber::new(MirrorNode::new(hero()));

    for out in publisher.flush() {
        subscriber.receive(&out.envelope).unwrap();
    }
    assert!(!subscriber.needs_resync());

    let bogus = Envelope::from_json("[2,9,1]").unwrap();
    assert!(matches!(
        subscriber.receive(&bogus),
        Err(SyncError::UnknownWireId { id: 9, .. })
    ));
    assert!(subscriber.needs_resync());

    // Deltas are ignored until a complete state arrives.
    publisher.root().set("level", 2).unwrap();
    for out in publisher.flush() {
        subscriber.receive(&out.envelope).unwrap();
    }
    assert_eq!(subscriber.skipped(), 1);
    assert_eq!(subscriber.mirror().get("level").unwrap().as_int(), Some(1));

    assert!(publisher.request_resync(id));
    for out in publisher.flush() {
        subscriber.receive(&out.envelope).unwrap();
    }
    assert!(!subscriber.needs_resync());
    assert_eq!(subscriber.mirror().get("level").unwrap().as_int(), Some(2));
    assert_eq!(
        subscriber.mirror().complete_state(),
        publisher.root().complete_state()
    );
}

#[test]
fn test_fresh_subscriber_waits_for_complete_state() {
    let mut subscriber = Subscriber::new(MirrorNode::new(hero()));
    assert!(subscriber.needs_resync());

    subscriber
        .receive(&Envelope::from_json("[2,2,5]").unwrap())
        .unwrap();
    assert_eq!(subscriber.received(), 0);
    assert_eq!(subscriber.skipped(), 1);
}

#[test]
fn test_undecodable_bytes_are_rejected() {
    let mut subscriber = Subscriber::new(MirrorNode::new(hero()));
    assert!(matches!(
        subscriber.receive_bytes(b"{not json"),
        Err(SyncError::Serialization(_))
    ));
    assert!(subscriber.needs_resync());
}

#[derive(Clone, Debug)]
enum Step {
    Level(i64),
    Item(u8, i64),
    DropItem(u8),
    Pet(u8, i64),
    PetHp(u8, i64),
    DropPet(u8),
    Join,
    Flush,
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0i64..9).prop_map(Step::Level),
        (0u8..4, 0i64..9).prop_map(|(k, v)| Step::Item(k, v)),
        (0u8..4).prop_map(Step::DropItem),
        (0u8..3, 0i64..9).prop_map(|(k, v)| Step::Pet(k, v)),
        (0u8..3, 0i64..9).prop_map(|(k, v)| Step::PetHp(k, v)),
        (0u8..3).prop_map(Step::DropPet),
        Just(Step::Join),
        Just(Step::Flush),
    ]
}

proptest! {
    #[test]
    fn subscribers_converge_after_final_flush(
        steps in prop::collection::vec(step_strategy(), 0..48),
        resync in 0u64..4,
    ) {
        let config = SessionConfigBuilder::new().resync_interval(resync).build();
        let mut publisher = Publisher::new(Node::new(hero()), config);
        let mut subscribers = BTreeMap::new();
        join(&mut publisher, &mut subscribers);
        let root = publisher.root().clone();

        for step in &steps {
            match step {
                Step::Level(level) => root.set("level", *level).unwrap(),
                Step::Item(key, value) => {
                    root.primitive_map("inventory").unwrap().set(&format!("i{}", key), *value).unwrap();
                }
                Step::DropItem(key) => {
                    root.primitive_map("inventory").unwrap().delete(&format!("i{}", key));
                }
                Step::Pet(key, hp) => {
                    let pet_node = Node::new(pet());
                    pet_node.set("hp", *hp).unwrap();
                    root.node_map("pets").unwrap().set(&format!("p{}", key), pet_node).unwrap();
                }
                Step::PetHp(key, hp) => {
                    if let Some(p) = root.node_map("pets").unwrap().get(&format!("p{}", key)) {
                        p.set("hp", *hp).unwrap();
                    }
                }
                Step::DropPet(key) => {
                    root.node_map("pets").unwrap().delete(&format!("p{}", key));
                }
                Step::Join => {
                    join(&mut publisher, &mut subscribers);
                }
                Step::Flush => deliver(&mut publisher, &mut subscribers),
            }
        }
        deliver(&mut publisher, &mut subscribers);

        for subscriber in subscribers.values() {
            prop_assert!(!subscriber.needs_resync());
            prop_assert_eq!(subscriber.mirror().complete_state(), root.complete_state());
        }
    }
}
