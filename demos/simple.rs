//! basic example to showcase the main functions of Context

use chashring::{Context, Result};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    let mut context = Context::new();
    context.set_targets([
        ("192.168.0.1:11211", 1),
        ("192.168.0.2:11211", 1),
        ("192.168.0.3:11211", 2),
    ])?;

    // return the target that stores the key 'foo'
    let target = context.lookup_one("foo")?;
    println!("target for key foo: {}", String::from_utf8_lossy(target));

    // return all targets in failover order for the key 'foo'
    let ranked: Vec<_> = context
        .lookup_ranked("foo", 3)?
        .into_iter()
        .map(String::from_utf8_lossy)
        .collect();
    println!("failover order for key foo: {ranked:?}");

    // spread a hot key over its first two targets
    let target = context.lookup_balance("hot", 2)?;
    println!("balanced target for key hot: {}", String::from_utf8_lossy(target));

    // share the built ring with a copy restored from a snapshot
    context.freeze();
    let snapshot = context.serialize()?;
    println!("snapshot size: {} bytes", snapshot.len());

    let mut restored = Context::new();
    restored.unserialize(&snapshot)?;
    let ring = restored.ring()?;
    println!(
        "restored ring: {} targets, {} points, foo -> {}",
        ring.targets_count(),
        ring.items_count(),
        String::from_utf8_lossy(ring.lookup_one("foo")?)
    );

    Ok(())
}
