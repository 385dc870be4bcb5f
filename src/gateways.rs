//! Gateway registration.

use std::sync::Arc;

use log::{debug, info};

use crate::error::InvalidRequest;
use crate::handshake::{HandshakeJob, HandshakeTracker};
use crate::state::GatewayRegistry;
use crate::types::GatewayRegistration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// First registration, or the core identity changed. A handshake was
    /// started.
    New,
    Unchanged,
}

pub struct GatewayService {
    registry: Arc<GatewayRegistry>,
    handshakes: Arc<HandshakeTracker>,
}

impl GatewayService {
    pub fn new(registry: Arc<GatewayRegistry>, handshakes: Arc<HandshakeTracker>) -> Self {
        Self {
            registry,
            handshakes,
        }
    }

    /// Records the gateway's core identity. A new or changed identity
    /// starts a detached handshake towards `target_host`; this call does
    /// not wait for it.
    pub async fn register(&self, req: &GatewayRegistration) -> Result<Registration, InvalidRequest> {
        if req.gateway_ip.is_empty() {
            return Err(InvalidRequest("gateway ip is empty".into()));
        }
        if req.core_identity.is_empty() {
            return Err(InvalidRequest("core identity is empty".into()));
        }

        if !self
            .registry
            .register(&req.gateway_ip, &req.core_identity)
            .await
        {
            debug!(
                "gateway {} already registered with {}",
                req.gateway_ip, req.core_identity
            );
            return Ok(Registration::Unchanged);
        }

        info!(
            "registered gateway {} with core identity {} (host {:?})",
            req.gateway_ip, req.core_identity, req.target_host
        );
        self.handshakes
            .start(HandshakeJob {
                gateway_ip: req.gateway_ip.clone(),
                target_host: req.target_host.clone(),
            })
            .await;
        Ok(Registration::New)
    }
}
