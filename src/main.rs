use benchmark::run_benchmark;
use std::sync::Arc;
use stress_test::{stress_test_replication, stress_test_scaling};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use treesync_core::{schema_of, Describe, Schema};
use treesync_mirror::MirrorNode;
use treesync_session::{Publisher, SessionConfig, Subscriber};
use treesync_source::Node;

pub mod benchmark;

struct Aiming;

impl Describe for Aiming {
    fn describe() -> treesync_core::Result<Arc<Schema>> {
        Schema::builder("Aiming")
            .scalar("angle", 0.0)
            .scalar("active", false)
            .build()
    }
}

struct Hero;

impl Describe for Hero {
    fn describe() -> treesync_core::Result<Arc<Schema>> {
        Schema::builder("Hero")
            .scalar("name", "Default Hero Name")
            .scalar("level", 1)
            .node("aiming", schema_of::<Aiming>()?)
            .primitive_map("inventory")
            .build()
    }
}

/// Walk one hero through a few flush cycles and print what goes over the wire.
fn hero_demo() -> Result<(), Box<dyn std::error::Error>> {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║            HERO REPLICATION DEMO                           ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let mut publisher = Publisher::new(Node::of::<Hero>()?, SessionConfig::default());
    let mut subscriber = Subscriber::new(MirrorNode::of::<Hero>()?);
    let id = publisher.subscribe();

    subscriber.mirror_mut().on("level", |level| {
        tracing::info!(%level, "mirror saw a level change");
    })?;
    subscriber.mirror_mut().node_mut("aiming")?.on("angle", |angle| {
        tracing::info!(%angle, "mirror saw the aim move");
    })?;

    let hero = publisher.root().clone();
    let mut cycle = |label: &str| -> Result<(), Box<dyn std::error::Error>> {
        for out in publisher.flush() {
            let bytes = out.encode()?;
            println!("  {:<28} -> {} {}", label, out.subscriber, String::from_utf8_lossy(&bytes));
            subscriber.receive_bytes(&bytes)?;
        }
        Ok(())
    };

    cycle("initial snapshot")?;

    hero.set("level", 2)?;
    hero.primitive_map("inventory")?.set("potion", 3)?;
    cycle("level up, pick up potions")?;

    hero.node("aiming")?.set("angle", 1.5)?;
    cycle("aim in place")?;

    let fresh = Node::of::<Aiming>()?;
    fresh.set("active", true)?;
    hero.set_child("aiming", fresh)?;
    cycle("swap aiming node")?;

    cycle("idle")?;

    let converged = subscriber.mirror().complete_state() == hero.complete_state();
    tracing::info!(subscriber = %id, converged, "demo finished");
    Ok(())
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "treesync=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    hero_demo()?;
    run_benchmark(100, 10)?;

    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║            REPLICATION STRESS TESTS                        ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    stress_test_replication(4, 200, 10)?.print();
    stress_test_replication(16, 500, 50)?.print();
    stress_test_scaling(32, 8)?;

    println!("\n✓ All stress tests completed successfully!");
    Ok(())
}
