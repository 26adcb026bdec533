// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Service discovery: probe a small, fixed local TCP port range for a
//! healthy agent HTTP server. SPEC_FULL.md §4.6.

use std::time::Duration;

use agentbridge_adapters::DiscoveredServer;
use serde::Deserialize;

const DEFAULT_PORT: u16 = 4096;
const PORT_RANGE_END: u16 = 4106;
const PROBE_TIMEOUT: Duration = Duration::from_millis(1500);

#[derive(Debug, Deserialize)]
struct HealthBody {
    url: String,
    version: Option<String>,
}

/// Probe `127.0.0.1:4096`, then sequentially `4097..=4106`. Returns the
/// first server to answer `GET /global/health` successfully, or `None`
/// after exhausting the range (exactly eleven probes total).
pub async fn discover(client: &reqwest::Client) -> Option<DiscoveredServer> {
    for port in DEFAULT_PORT..=PORT_RANGE_END {
        if let Some(server) = probe(client, port).await {
            return Some(server);
        }
    }
    None
}

async fn probe(client: &reqwest::Client, port: u16) -> Option<DiscoveredServer> {
    let url = format!("http://127.0.0.1:{port}/global/health");
    let response = client.get(&url).timeout(PROBE_TIMEOUT).send().await.ok()?;
    if !response.status().is_success() {
        return None;
    }
    let body: HealthBody = response.json().await.ok()?;
    Some(DiscoveredServer { url: body.url, version: body.version })
}

#[cfg(test)]
#[path = "discovery_tests.rs"]
mod discovery_tests;
