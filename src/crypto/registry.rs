use std::sync::Arc;

use dashmap::DashMap;

use super::identity::{CryptoIdentity, EntityType};
use super::signer::Signer;

/// key: component-crypto-registry
/// Tracks one crypto identity per named component. The Component Handshake
/// consults this before admitting a new component: it must already hold
/// (or be issued) an identity validated against its declared name before
/// governance/quorum ack can proceed.
#[derive(Default)]
pub struct CryptoRegistry {
    identities: DashMap<String, CryptoIdentity>,
}

impl CryptoRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Issues (or returns the existing) identity for `component_name`.
    /// Components acquire exactly one identity; calling this twice for the
    /// same name is idempotent and returns the original identity.
    pub fn issue(&self, component_name: &str, key_id: &str) -> CryptoIdentity {
        self.identities
            .entry(component_name.to_string())
            .or_insert_with(|| CryptoIdentity::new(component_name, EntityType::Component, key_id))
            .clone()
    }

    pub fn get(&self, component_name: &str) -> Option<CryptoIdentity> {
        self.identities.get(component_name).map(|r| r.clone())
    }

    pub fn is_validated(&self, component_name: &str) -> bool {
        self.identities.contains_key(component_name)
    }
}

/// Bundles an identity with the signer bound to it, the shape every
/// signing-capable component holds.
#[derive(Clone)]
pub struct SignedIdentity {
    pub identity: CryptoIdentity,
    pub signer: Arc<dyn Signer>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn issue_is_idempotent() {
        let registry = CryptoRegistry::new();
        let a = registry.issue("executor", "k1");
        let b = registry.issue("executor", "k2");
        assert_eq!(a.crypto_id, b.crypto_id);
        assert!(registry.is_validated("executor"));
        assert!(!registry.is_validated("unknown"));
    }
}
