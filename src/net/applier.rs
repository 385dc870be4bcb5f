//! Translates binding transitions into host networking mutations.

use std::sync::Arc;

use log::{debug, error};

use super::{NetworkPort, RuleOp, TrafficMark};
use crate::error::ApplyError;
use crate::state::GatewayRegistry;

#[derive(Clone)]
pub struct NetworkStateApplier {
    port: Arc<dyn NetworkPort>,
    registry: Arc<GatewayRegistry>,
    interface_prefix: String,
}

impl NetworkStateApplier {
    pub fn new(
        port: Arc<dyn NetworkPort>,
        registry: Arc<GatewayRegistry>,
        interface_prefix: impl Into<String>,
    ) -> Self {
        Self {
            port,
            registry,
            interface_prefix: interface_prefix.into(),
        }
    }

    /// Hardware identity registered for `gateway_ip`.
    pub async fn require_identity(&self, gateway_ip: &str) -> Result<String, ApplyError> {
        self.registry
            .lookup(gateway_ip)
            .await
            .ok_or_else(|| ApplyError::UnregisteredGateway(gateway_ip.to_string()))
    }

    /// Tags packets destined to `endpoint_ip` with the mark of `gateway_ip`.
    pub async fn apply_mark(
        &self,
        gateway_ip: &str,
        endpoint_ip: &str,
        op: RuleOp,
    ) -> Result<(), ApplyError> {
        let mark = TrafficMark::from_gateway_ip(gateway_ip)?;
        debug!("{} mark {} for {}", op, mark, endpoint_ip);
        self.port
            .apply_mark(op, endpoint_ip, mark)
            .await
            .map_err(|source| {
                error!("mark {} for {} failed: {}", op, endpoint_ip, source);
                ApplyError::MarkApply {
                    op,
                    endpoint: endpoint_ip.to_string(),
                    mark,
                    source,
                }
            })
    }

    /// Adds or removes the static resolution entry for `endpoint_ip` on the
    /// interface of `gateway_ip`. Adding requires the gateway's hardware
    /// identity to be registered.
    pub async fn apply_resolution(
        &self,
        gateway_ip: &str,
        endpoint_ip: &str,
        op: RuleOp,
    ) -> Result<(), ApplyError> {
        let interface = TrafficMark::from_gateway_ip(gateway_ip)?
            .interface_name(&self.interface_prefix);

        let result = match op {
            RuleOp::Add => {
                let hardware_addr = self.require_identity(gateway_ip).await?;
                debug!(
                    "add resolution {} -> {} on {}",
                    endpoint_ip, hardware_addr, interface
                );
                self.port
                    .add_resolution(endpoint_ip, &hardware_addr, &interface)
                    .await
            }
            RuleOp::Remove => {
                debug!("remove resolution {} on {}", endpoint_ip, interface);
                self.port.remove_resolution(endpoint_ip, &interface).await
            }
        };

        result.map_err(|source| {
            error!(
                "resolution {} for {} on {} failed: {}",
                op, endpoint_ip, interface, source
            );
            ApplyError::ResolutionApply {
                op,
                endpoint: endpoint_ip.to_string(),
                interface,
                source,
            }
        })
    }
}
