use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::{Duration, Instant};
use treesync_core::{schema_of, Describe, Result, Schema};
use treesync_mirror::MirrorNodeMap;
use treesync_source::{Node, NodeMap};

struct ActiveSlot;

impl Describe for ActiveSlot {
    fn describe() -> Result<Arc<Schema>> {
        Schema::builder("ActiveSlot")
            .scalar("id", "")
            .scalar("active", false)
            .scalar("ammo", 0)
            .build()
    }
}

struct Inventory;

impl Describe for Inventory {
    fn describe() -> Result<Arc<Schema>> {
        Schema::builder("Inventory")
            .primitive_map("items")
            .node_map("activeSlots", schema_of::<ActiveSlot>()?)
            .build()
    }
}

struct Aiming;

impl Describe for Aiming {
    fn describe() -> Result<Arc<Schema>> {
        Schema::builder("Aiming")
            .scalar("angle", 0.0)
            .scalar("active", false)
            .build()
    }
}

struct Hero;

impl Describe for Hero {
    fn describe() -> Result<Arc<Schema>> {
        Schema::builder("Hero")
            .scalar("name", "Default Hero Name")
            .scalar("x", 0.0)
            .scalar("y", 0.0)
            .node("inventory", schema_of::<Inventory>()?)
            .node("aiming", schema_of::<Aiming>()?)
            .build()
    }
}

/// Timings of one benchmark round
#[derive(Clone, Debug, Default)]
pub struct BenchmarkTimings {
    pub complete_state: Duration,
    pub mutation: Duration,
    pub recent_changes: Duration,
    pub mirror_apply: Duration,
    pub complete_bytes: usize,
    pub delta_bytes: usize,
}

impl BenchmarkTimings {
    pub fn print(&self, round: usize) {
        println!(
            "  Round {:>2}: complete {:>8.3}ms ({} B) | mutate {:>8.3}ms | changes {:>8.3}ms ({} B) | mirror {:>8.3}ms",
            round,
            ms(self.complete_state),
            self.complete_bytes,
            ms(self.mutation),
            ms(self.recent_changes),
            self.delta_bytes,
            ms(self.mirror_apply),
        );
    }
}

fn ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

fn hero(rng: &mut StdRng, i: usize) -> Result<Node> {
    let hero = Node::of::<Hero>()?;
    hero.set("name", format!("Hero {}", i as f64 + rng.gen::<f64>()))?;
    hero.set("x", rng.gen::<f64>() * 1000.0)?;
    hero.set("y", rng.gen::<f64>() * 1000.0)?;

    let inventory = hero.node("inventory")?;
    let items = inventory.primitive_map("items")?;
    items.set("A", 1)?;
    items.set("B", 2)?;
    items.set("C", 3)?;

    let slot = Node::of::<ActiveSlot>()?;
    slot.set("id", "weapon")?;
    slot.set("active", true)?;
    slot.set("ammo", 999)?;
    inventory.node_map("activeSlots")?.set("weapon", slot)?;
    Ok(hero)
}

/// One round: build `heroes` heroes in a node map, then time the snapshot,
/// an in-place edit of every hero, and the resulting delta separately.
pub fn benchmark_round(heroes: usize) -> Result<BenchmarkTimings> {
    let mut rng = StdRng::from_entropy();
    let server = NodeMap::new(schema_of::<Hero>()?);
    let mut client = MirrorNodeMap::new(schema_of::<Hero>()?);

    let mut targets = Vec::with_capacity(heroes);
    for i in 0..heroes {
        let node = hero(&mut rng, i)?;
        let x = node.get("x")?.as_float().unwrap_or(0.0);
        targets.push((
            x + rng.gen::<f64>() * 1000.0,
            x + rng.gen::<f64>() * 1000.0,
            rng.gen::<f64>() * 360.0,
        ));
        server.set(&format!("Hero {}", i), node)?;
    }

    let mut timings = BenchmarkTimings::default();

    let start = Instant::now();
    let state = server.complete_state();
    timings.complete_state = start.elapsed();
    timings.complete_bytes = state.to_bytes()?.len();
    client.apply_complete_state(&state)?;
    server.reset_recent_changes();

    let start = Instant::now();
    for (i, (x, y, angle)) in targets.iter().enumerate() {
        let Some(hero) = server.get(&format!("Hero {}", i)) else {
            continue;
        };
        hero.set("x", *x)?;
        hero.set("y", *y)?;
        hero.node("aiming")?.set("angle", *angle)?;

        if let Some(slot) = hero.node("inventory")?.node_map("activeSlots")?.get("weapon") {
            let ammo = slot.get("ammo")?.as_int().unwrap_or(0);
            slot.set("ammo", ammo - 1)?;
        }
    }
    timings.mutation = start.elapsed();

    let start = Instant::now();
    let changes = server.recent_changes();
    timings.recent_changes = start.elapsed();
    timings.delta_bytes = changes.to_bytes()?.len();

    let start = Instant::now();
    client.apply_recent_changes(&changes)?;
    timings.mirror_apply = start.elapsed();

    Ok(timings)
}

/// Snapshot/delta benchmark over a node map of heroes
pub fn run_benchmark(heroes: usize, rounds: usize) -> Result<()> {
    println!("\n╔════════════════════════════════════════════════════════════╗");
    println!("║        Snapshot/Delta Benchmark                            ║");
    println!("║  Heroes: {} | Rounds: {}", heroes, rounds);
    println!("╚════════════════════════════════════════════════════════════╝");

    for round in 1..=rounds {
        benchmark_round(heroes)?.print(round);
    }
    Ok(())
}
