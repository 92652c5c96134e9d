//! Peer configuration.
//!
//! Peers are read-only configuration resolved once at startup. A peer must
//! be both configured and sync-enabled before any job is created for it.

use crate::error::{PeerError, PeerResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Credentials presented to an upstream peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerCredentials {
    /// Client identifier.
    pub client_id: String,
    /// Client secret.
    pub client_secret: String,
}

/// One configured upstream peer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PeerDescriptor {
    /// Base URL, also the peer's identity for exclusivity.
    pub url: String,
    /// Human-readable name.
    pub name: String,
    /// Credentials for the peer.
    pub credentials: PeerCredentials,
    /// Whether outbound sync to this peer is enabled.
    #[serde(default = "default_true")]
    pub sync_enabled: bool,
    /// Whether snapshots bound for this peer are encrypted automatically.
    #[serde(default)]
    pub auto_encrypt: bool,
}

fn default_true() -> bool {
    true
}

impl PeerDescriptor {
    /// Returns the snapshot passphrase for this peer, when auto-encryption
    /// is on.
    ///
    /// The passphrase is the concatenation of the credential fields; it is
    /// derived on both sides and never transmitted or stored.
    #[must_use]
    pub fn snapshot_passphrase(&self) -> Option<String> {
        self.auto_encrypt.then(|| {
            format!(
                "{}{}",
                self.credentials.client_id, self.credentials.client_secret
            )
        })
    }
}

/// Read-only registry of configured peers, keyed by URL.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: HashMap<String, PeerDescriptor>,
}

impl PeerRegistry {
    /// Builds a registry from configured descriptors.
    #[must_use]
    pub fn new(peers: Vec<PeerDescriptor>) -> Self {
        Self {
            peers: peers.into_iter().map(|p| (p.url.clone(), p)).collect(),
        }
    }

    /// Resolves a URL to a sync-enabled peer.
    ///
    /// # Errors
    ///
    /// Fails fast with [`PeerError::UnknownPeer`] or
    /// [`PeerError::SyncDisabled`], before any job exists.
    pub fn resolve(&self, url: &str) -> PeerResult<&PeerDescriptor> {
        let peer = self
            .peers
            .get(url)
            .ok_or_else(|| PeerError::UnknownPeer(url.to_owned()))?;
        if !peer.sync_enabled {
            return Err(PeerError::SyncDisabled(url.to_owned()));
        }
        Ok(peer)
    }

    /// Returns all configured peers.
    pub fn all(&self) -> impl Iterator<Item = &PeerDescriptor> {
        self.peers.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn descriptor(url: &str, enabled: bool) -> PeerDescriptor {
        PeerDescriptor {
            url: url.to_owned(),
            name: "hub".into(),
            credentials: PeerCredentials {
                client_id: "id".into(),
                client_secret: "secret".into(),
            },
            sync_enabled: enabled,
            auto_encrypt: false,
        }
    }

    #[test]
    fn resolve_known_peer() {
        let registry = PeerRegistry::new(vec![descriptor("https://hub.example.org", true)]);
        assert!(registry.resolve("https://hub.example.org").is_ok());
    }

    #[test]
    fn unknown_peer_fails_fast() {
        let registry = PeerRegistry::new(vec![]);
        assert!(matches!(
            registry.resolve("https://nowhere.example.org"),
            Err(PeerError::UnknownPeer(_))
        ));
    }

    #[test]
    fn disabled_peer_fails_fast() {
        let registry = PeerRegistry::new(vec![descriptor("https://hub.example.org", false)]);
        assert!(matches!(
            registry.resolve("https://hub.example.org"),
            Err(PeerError::SyncDisabled(_))
        ));
    }

    #[test]
    fn passphrase_from_credentials() {
        let mut peer = descriptor("https://hub.example.org", true);
        assert_eq!(peer.snapshot_passphrase(), None);

        peer.auto_encrypt = true;
        assert_eq!(peer.snapshot_passphrase(), Some("idsecret".into()));
    }

    #[test]
    fn descriptor_deserializes_with_defaults() {
        let peer: PeerDescriptor = serde_json::from_value(serde_json::json!({
            "url": "https://hub.example.org",
            "name": "hub",
            "credentials": {"client_id": "a", "client_secret": "b"},
        }))
        .unwrap();
        assert!(peer.sync_enabled);
        assert!(!peer.auto_encrypt);
    }
}
