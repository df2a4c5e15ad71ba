use anyhow::Result;
use sift::Client;

/// Print the registry, one node per line
pub async fn run_nodes(client: &Client, info: bool) -> Result<()> {
    for node in client.nodes() {
        println!("{:<24} {:<32} {}", node.id, node.url, node.state.as_str());
    }

    if info {
        let info = client.nodes_info().await?;
        println!();
        println!("Cluster: {}", info.cluster_name);
        for (id, node) in &info.nodes {
            println!(
                "  {} name={} version={} http={}",
                id,
                node.name,
                node.version.as_deref().unwrap_or("-"),
                node.publish_url("http").as_deref().unwrap_or("-"),
            );
        }
    }

    Ok(())
}
