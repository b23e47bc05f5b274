use rpool::{AllocError, Policy, PoolHandle, Registry};
use tracing_subscriber::EnvFilter;

/// Prints the pool's regions in address order, plus its counters.
fn print_pool(
  registry: &Registry,
  pool: PoolHandle,
  label: &str,
) -> Result<(), AllocError> {
  let stats = registry.stats(pool)?;
  let layout: Vec<String> = registry
    .snapshot(pool)?
    .iter()
    .map(|segment| {
      let kind = if segment.allocated { "A" } else { "gap" };
      format!("{kind} {}", segment.size)
    })
    .collect();

  println!(
    "[{label}] [{}]  allocations = {}, allocated bytes = {}, gaps = {}",
    layout.join(" | "),
    stats.num_allocations,
    stats.allocated_bytes,
    stats.num_gaps,
  );
  Ok(())
}

/// Leaves a 30-byte gap at the front and a 10-byte gap further in,
/// then allocates 10 bytes to show where each policy places it.
fn placement(
  registry: &mut Registry,
  policy: Policy,
) -> Result<(), AllocError> {
  println!("\n=== {policy:?} ===");
  let pool = registry.open(100, policy)?;

  let low = registry.allocate(pool, 30)?;
  let mid = registry.allocate(pool, 20)?;
  let high = registry.allocate(pool, 10)?;
  let tail = registry.allocate(pool, 40)?;
  registry.deallocate(pool, low)?;
  registry.deallocate(pool, high)?;
  print_pool(registry, pool, "two gaps")?;

  let picked = registry.allocate(pool, 10)?;
  println!("allocate(10) landed at offset {}", picked.offset());
  print_pool(registry, pool, "after")?;

  for alloc in [picked, mid, tail] {
    registry.deallocate(pool, alloc)?;
  }
  registry.close(pool)
}

fn main() -> Result<(), AllocError> {
  tracing_subscriber::fmt()
    .with_env_filter(EnvFilter::from_default_env())
    .init();

  let mut registry = Registry::default();
  registry.init()?;

  // --------------------------------------------------------------------
  // 1) Open a 1 KiB pool. It starts out as a single gap.
  // --------------------------------------------------------------------
  let pool = registry.open(1024, Policy::FirstFit)?;
  print_pool(&registry, pool, "open")?;

  // --------------------------------------------------------------------
  // 2) Two allocations split the gap from the front.
  // --------------------------------------------------------------------
  let first = registry.allocate(pool, 100)?;
  let second = registry.allocate(pool, 50)?;
  print_pool(&registry, pool, "alloc 100, 50")?;

  registry
    .pool_mut(pool)?
    .bytes_mut(&first)?
    .copy_from_slice(&[0xAB; 100]);
  println!("first byte of the 100-byte block = 0x{:X}", registry.pool(pool)?.bytes(&first)?[0]);

  // --------------------------------------------------------------------
  // 3) A pool with live allocations refuses to close.
  // --------------------------------------------------------------------
  if let Err(err) = registry.close(pool) {
    println!("close refused: {err}");
  }

  // --------------------------------------------------------------------
  // 4) Freeing both blocks coalesces everything back into one gap.
  // --------------------------------------------------------------------
  registry.deallocate(pool, first)?;
  print_pool(&registry, pool, "free 100")?;
  registry.deallocate(pool, second)?;
  print_pool(&registry, pool, "free 50")?;

  if let Err(err) = registry.deallocate(pool, second) {
    println!("double free rejected: {err}");
  }

  registry.close(pool)?;

  // --------------------------------------------------------------------
  // 5) Same fragmentation, two placement policies.
  // --------------------------------------------------------------------
  placement(&mut registry, Policy::FirstFit)?;
  placement(&mut registry, Policy::BestFit)?;

  registry.teardown()?;
  println!("\nregistry torn down");
  Ok(())
}
