//! Peers command implementation.

use caselink_peer::PeerDescriptor;
use serde::Serialize;
use std::fs;
use std::path::Path;

/// One configured peer, credentials elided.
#[derive(Debug, Serialize)]
struct PeerSummary {
    url: String,
    name: String,
    sync_enabled: bool,
    auto_encrypt: bool,
}

/// Runs the peers command.
pub fn run(config: &Path, format: &str) -> Result<(), Box<dyn std::error::Error>> {
    let raw = fs::read_to_string(config)?;
    let peers: Vec<PeerDescriptor> = serde_json::from_str(&raw)?;

    let summaries: Vec<PeerSummary> = peers
        .into_iter()
        .map(|peer| PeerSummary {
            url: peer.url,
            name: peer.name,
            sync_enabled: peer.sync_enabled,
            auto_encrypt: peer.auto_encrypt,
        })
        .collect();

    match format {
        "json" => println!("{}", serde_json::to_string_pretty(&summaries)?),
        _ => {
            if summaries.is_empty() {
                println!("No peers configured");
            }
            for peer in &summaries {
                let state = if peer.sync_enabled { "enabled" } else { "disabled" };
                let crypt = if peer.auto_encrypt { ", auto-encrypt" } else { "" };
                println!("{} ({}) - sync {}{}", peer.name, peer.url, state, crypt);
            }
        }
    }
    Ok(())
}
