use figment::{
    providers::{Env, Format, Json, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    /// Address the HTTP control API listens on.
    pub listen: SocketAddr,
    /// Per-gateway interfaces are named `<prefix><mark>`.
    pub interface_prefix: String,
    pub mangle_chain: String,
    pub iptables_bin: String,
    pub arp_bin: String,
    /// Appended to the target host name when building the announcement URL.
    pub announce_host_suffix: String,
    pub announce_port: u16,
    pub announce_path: String,
    pub announce_interval_ms: u64,
    pub announce_timeout_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen: SocketAddr::from(([0, 0, 0, 0], 8080)),
            interface_prefix: "upf".into(),
            mangle_chain: "PREROUTING".into(),
            iptables_bin: "iptables".into(),
            arp_bin: "arp".into(),
            announce_host_suffix: "-http".into(),
            announce_port: 8080,
            announce_path: "/registergw".into(),
            announce_interval_ms: 1000,
            announce_timeout_ms: 10_000,
        }
    }
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        Self::from_figment(
            Figment::from(Serialized::defaults(Config::default()))
                .merge(Toml::file("exitlb.toml"))
                .merge(Json::file("exitlb.json"))
                .merge(Env::prefixed("EXITLB_")),
        )
    }

    fn from_figment(figment: Figment) -> anyhow::Result<Self> {
        let config: Config = figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to load configuration: {}", e))?;

        if config.announce_interval_ms == 0 {
            anyhow::bail!("announce_interval_ms must be greater than zero");
        }
        if !config.announce_path.starts_with('/') {
            anyhow::bail!(
                "announce_path must start with '/', got {:?}",
                config.announce_path
            );
        }

        Ok(config)
    }

    pub fn announce_interval(&self) -> Duration {
        Duration::from_millis(self.announce_interval_ms)
    }

    pub fn announce_timeout(&self) -> Duration {
        Duration::from_millis(self.announce_timeout_ms)
    }
}
