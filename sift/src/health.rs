//! Node liveness probing
//!
//! A health check sends `HEAD /?timeout=1` to every registered node, one
//! after another. A 2xx answer flips the node to alive; anything else marks
//! it dead. The registry membership itself is never touched here.

use crate::client::ClientInner;
use crate::error::{Error, Result};
use crate::metrics;
use reqwest::Method;
use std::time::{Duration, Instant};
use tracing::{debug, error};

/// Probe every registered node.
///
/// A no-op when health checks are disabled, unless `force` is set.
pub(crate) async fn healthcheck(inner: &ClientInner, timeout: Duration, force: bool) {
    if !force && !inner.settings.read().config.healthcheck_enabled {
        return;
    }

    let nodes = inner.registry.nodes();
    debug!(nodes = nodes.len(), force, "Running health check");

    for node in nodes {
        let started = Instant::now();
        match probe(inner, &node.url, timeout).await {
            Ok(status) => {
                debug!("{} is alive (status {})", node.url, status);
                inner.registry.mark_alive(&node.id);
                metrics::record_healthcheck(&node.url, true, started.elapsed());
            }
            Err(reason) => {
                error!("{} is dead: {}", node.url, reason);
                inner.registry.mark_dead(&node.id);
                metrics::record_healthcheck(&node.url, false, started.elapsed());
            }
        }
    }
}

/// Wait until at least one seed URL answers, retrying once a second.
///
/// Runs before the registry exists, so it talks to the seed URLs directly.
pub(crate) async fn startup_healthcheck(inner: &ClientInner, timeout: Duration) -> Result<()> {
    let urls = inner.settings.read().seed_urls.clone();
    let started = tokio::time::Instant::now();

    loop {
        for url in &urls {
            match probe(inner, url, timeout).await {
                Ok(_) => return Ok(()),
                Err(reason) => debug!("Startup health check of {} failed: {}", url, reason),
            }
        }
        if started.elapsed() >= timeout {
            break;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;
        if started.elapsed() >= timeout {
            break;
        }
    }

    error!("No node among {:?} answered within {}ms", urls, timeout.as_millis());
    Err(Error::NoClient("health check timeout".into()))
}

async fn probe(
    inner: &ClientInner,
    url: &str,
    timeout: Duration,
) -> std::result::Result<u16, String> {
    let request = inner
        .http_request(Method::HEAD, format!("{}/?timeout=1", url))
        .with_timeout(timeout);

    match inner.transport.send(request).await {
        Ok(response) if response.is_success() => Ok(response.status),
        Ok(response) => Err(format!("status {}", response.status)),
        Err(e) => Err(e.to_string()),
    }
}
