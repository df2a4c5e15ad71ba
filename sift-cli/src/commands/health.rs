use anyhow::{bail, Result};
use sift::{Client, HealthStatus};

pub async fn run_health(client: &Client, wait_for: Option<&str>, timeout: &str) -> Result<()> {
    let health = match wait_for {
        None => client.cluster_health(&[]).await?,
        Some("green") => client.wait_for_status(HealthStatus::Green, timeout).await?,
        Some("yellow") => client.wait_for_status(HealthStatus::Yellow, timeout).await?,
        Some(other) => bail!("Can only wait for green or yellow, not '{}'", other),
    };

    println!("Cluster:    {}", health.cluster_name);
    println!("Status:     {}", health.status);
    println!(
        "Nodes:      {} ({} data)",
        health.number_of_nodes, health.number_of_data_nodes
    );
    println!(
        "Shards:     {} active, {} primary",
        health.active_shards, health.active_primary_shards
    );
    if health.relocating_shards + health.initializing_shards + health.unassigned_shards > 0 {
        println!(
            "Pending:    {} relocating, {} initializing, {} unassigned",
            health.relocating_shards, health.initializing_shards, health.unassigned_shards
        );
    }

    Ok(())
}
