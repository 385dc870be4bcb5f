//! Error types for the reconciler.

use thiserror::Error;

use crate::net::{RuleOp, TrafficMark};

/// Failure of a single host networking operation.
#[derive(Debug, Error)]
pub enum PortError {
    #[error("failed to run `{command}`: {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` exited with {status}: {output}")]
    CommandFailed {
        command: String,
        status: String,
        output: String,
    },

    #[error("failed to enumerate interfaces: {0}")]
    Interfaces(#[from] nix::Error),
}

/// Failure to apply one step of a binding transition.
#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("invalid gateway ip {0:?}: no traffic mark can be derived")]
    InvalidGatewayAddress(String),

    #[error("{op} of mark {mark} for {endpoint} failed: {source}")]
    MarkApply {
        op: RuleOp,
        endpoint: String,
        mark: TrafficMark,
        #[source]
        source: PortError,
    },

    #[error("{op} of resolution entry for {endpoint} on {interface} failed: {source}")]
    ResolutionApply {
        op: RuleOp,
        endpoint: String,
        interface: String,
        #[source]
        source: PortError,
    },

    #[error("gateway {0} is not registered")]
    UnregisteredGateway(String),
}

/// Malformed or incomplete inbound request. Raised before any state is
/// touched.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid request: {0}")]
pub struct InvalidRequest(pub String);

#[derive(Debug, Error)]
pub enum AnnounceError {
    #[error("announcement transport failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("announcement rejected with status {0}")]
    Rejected(u16),
}
