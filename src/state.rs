//! In-memory tables shared by the request handlers.
//!
//! Both tables live for the lifetime of the process and are never pruned.
//! Each guards its map with its own lock; callers never hold a table lock
//! across a networking command.

use std::collections::HashMap;

use tokio::sync::RwLock;

/// Endpoint IP -> owning gateway IP.
#[derive(Debug, Default)]
pub struct BindingTable {
    inner: RwLock<HashMap<String, String>>,
}

impl BindingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lookup(&self, endpoint_ip: &str) -> Option<String> {
        self.inner.read().await.get(endpoint_ip).cloned()
    }

    pub async fn set(&self, endpoint_ip: &str, gateway_ip: &str) {
        self.inner
            .write()
            .await
            .insert(endpoint_ip.to_string(), gateway_ip.to_string());
    }
}

/// Gateway IP -> hardware identity of the core-facing element behind it.
#[derive(Debug, Default)]
pub struct GatewayRegistry {
    inner: RwLock<HashMap<String, String>>,
}

impl GatewayRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lookup(&self, gateway_ip: &str) -> Option<String> {
        self.inner.read().await.get(gateway_ip).cloned()
    }

    /// Stores `identity` for `gateway_ip`.  Returns `false` only when the
    /// exact same identity was already registered.
    pub async fn register(&self, gateway_ip: &str, identity: &str) -> bool {
        let mut map = self.inner.write().await;
        match map.get(gateway_ip) {
            Some(existing) if existing == identity => false,
            _ => {
                map.insert(gateway_ip.to_string(), identity.to_string());
                true
            }
        }
    }
}
