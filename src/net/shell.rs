//! [`NetworkPort`] backed by the host's `iptables` and `arp` tools.

use std::net::IpAddr;

use async_trait::async_trait;
use log::{debug, trace};
use tokio::process::Command;

use super::{netif, NetworkPort, RuleOp, TrafficMark};
use crate::config::Config;
use crate::error::PortError;

pub struct ShellNetwork {
    iptables_bin: String,
    arp_bin: String,
    mangle_chain: String,
}

impl ShellNetwork {
    pub fn new(config: &Config) -> Self {
        Self {
            iptables_bin: config.iptables_bin.clone(),
            arp_bin: config.arp_bin.clone(),
            mangle_chain: config.mangle_chain.clone(),
        }
    }
}

#[async_trait]
impl NetworkPort for ShellNetwork {
    async fn apply_mark(
        &self,
        op: RuleOp,
        endpoint_ip: &str,
        mark: TrafficMark,
    ) -> Result<(), PortError> {
        let flag = match op {
            RuleOp::Add => "-A",
            RuleOp::Remove => "-D",
        };
        let mark = mark.value().to_string();
        run(
            &self.iptables_bin,
            &[
                "-t",
                "mangle",
                flag,
                &self.mangle_chain,
                "-d",
                endpoint_ip,
                "-j",
                "MARK",
                "--set-mark",
                &mark,
            ],
        )
        .await
        .map(drop)
    }

    async fn add_resolution(
        &self,
        endpoint_ip: &str,
        hardware_addr: &str,
        interface: &str,
    ) -> Result<(), PortError> {
        run(
            &self.arp_bin,
            &["-s", endpoint_ip, hardware_addr, "-i", interface],
        )
        .await
        .map(drop)
    }

    async fn remove_resolution(
        &self,
        endpoint_ip: &str,
        interface: &str,
    ) -> Result<(), PortError> {
        run(&self.arp_bin, &["-d", endpoint_ip, "-i", interface])
            .await
            .map(drop)
    }

    async fn interface_for_address(&self, address: &str) -> Result<Option<String>, PortError> {
        let Ok(ip) = address.parse::<IpAddr>() else {
            debug!("{:?} is not an ip address, no interface carries it", address);
            return Ok(None);
        };
        Ok(netif::interface_with_address(ip)?)
    }

    async fn hardware_address(&self, interface: &str) -> Result<Option<String>, PortError> {
        Ok(netif::hardware_address(interface)?)
    }
}

/// Runs `program` and returns its stdout. A non-zero exit becomes
/// [`PortError::CommandFailed`] carrying stdout and stderr combined.
async fn run(program: &str, args: &[&str]) -> Result<String, PortError> {
    let command = format!("{} {}", program, args.join(" "));
    trace!("executing command: {}", command);

    let output = Command::new(program)
        .args(args)
        .output()
        .await
        .map_err(|source| PortError::Spawn {
            command: command.clone(),
            source,
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    if output.status.success() {
        Ok(stdout)
    } else {
        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(PortError::CommandFailed {
            command,
            status: output.status.to_string(),
            output: format!("{}{}", stdout, stderr).trim().to_string(),
        })
    }
}
