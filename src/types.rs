//! Wire types for the control API and the outbound gateway announcement.
//!
//! Inbound bodies accept both the current field names and the short names
//! used by older access-side agents (`gwip`, `ip`, `coremac`, ...).  Every
//! field defaults to empty so that a missing field is reported as a
//! validation error rather than a deserialisation failure.

use serde::{Deserialize, Serialize};

/// Request to steer a batch of endpoint IPs through one gateway.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BindRequest {
    #[serde(default, alias = "gwip")]
    pub gateway_ip: String,
    #[serde(default, alias = "ip")]
    pub endpoint_ips: Vec<String>,
}

/// A gateway declaring the hardware identity of its core-facing element.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayRegistration {
    #[serde(default, alias = "gwip")]
    pub gateway_ip: String,
    #[serde(default, alias = "coremac")]
    pub core_identity: String,
    /// Declared but not used for any state transition.
    #[serde(default, alias = "accessmac")]
    pub access_identity: String,
    #[serde(default, alias = "hostname")]
    pub target_host: String,
}

/// Sent to the registering host once the local interface facing the
/// gateway is known.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Announcement {
    pub gateway_ip: String,
    pub gateway_mac: String,
}
