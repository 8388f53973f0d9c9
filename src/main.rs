use rmc_order::{LinkConfig, OrderingMode};
use simulation::{simulate_cluster, simulate_ordering};
pub mod simulation;

fn main() {
    let rt = tokio::runtime::Runtime::new().unwrap();
    rt.block_on(async_main());
}

async fn async_main() {
    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║            ORDERING SIMULATIONS                             ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    // Delivery-only modes over a hostile link: loss, duplication, reorder
    let stats = simulate_ordering(OrderingMode::Unordered, 4, 200, LinkConfig::chaotic()).await;
    stats.print();

    let stats = simulate_ordering(OrderingMode::Fifo, 4, 200, LinkConfig::chaotic()).await;
    stats.print();

    // Clock-driven modes over a reordering link
    let stats = simulate_ordering(OrderingMode::Causal, 3, 100, LinkConfig::reordering(0.5)).await;
    stats.print();

    let stats = simulate_ordering(OrderingMode::Total, 3, 100, LinkConfig::reordering(0.5)).await;
    stats.print();

    println!("\n\n╔════════════════════════════════════════════════════════════╗");
    println!("║          FULL CLUSTER RUNS (in-process)                     ║");
    println!("╚════════════════════════════════════════════════════════════╝");

    let stats = simulate_cluster(OrderingMode::Fifo, 3, 20).await;
    stats.print();

    let stats = simulate_cluster(OrderingMode::Total, 3, 20).await;
    stats.print();

    println!("\n✓ All simulations completed successfully!");
}
