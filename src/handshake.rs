//! Announcing our hardware address to newly registered gateways.
//!
//! When a gateway registers a new core identity, the host that sent the
//! registration has to learn the link-layer address of our interface
//! facing that gateway. A handshake walks through
//!
//! ```text
//! Resolving -> Announcing { attempt } -> Acknowledged
//!          \-> Abandoned
//! ```
//!
//! `Resolving` finds the local interface whose configuration carries the
//! gateway's IP and reads its hardware address. If that fails there is
//! nothing to announce and the task ends as `Abandoned`. `Announcing`
//! posts the address to the target host every `interval` until the host
//! answers `201 Created`. There is no retry limit; a handshake lives until
//! it is acknowledged, aborted, or the process exits.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, error, info, warn};
use reqwest::StatusCode;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::error::AnnounceError;
use crate::net::NetworkPort;
use crate::types::Announcement;

/// Delivers an [`Announcement`] to a target host.
#[async_trait]
pub trait Announcer: Send + Sync {
    async fn announce(
        &self,
        target_host: &str,
        announcement: &Announcement,
    ) -> Result<(), AnnounceError>;
}

/// Posts announcements to `http://<host><suffix>:<port><path>`.
pub struct HttpAnnouncer {
    client: reqwest::Client,
    host_suffix: String,
    port: u16,
    path: String,
}

impl HttpAnnouncer {
    pub fn from_config(config: &Config) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(config.announce_timeout())
            .build()?;
        Ok(Self {
            client,
            host_suffix: config.announce_host_suffix.clone(),
            port: config.announce_port,
            path: config.announce_path.clone(),
        })
    }

    fn url_for(&self, target_host: &str) -> String {
        format!(
            "http://{}{}:{}{}",
            target_host, self.host_suffix, self.port, self.path
        )
    }
}

#[async_trait]
impl Announcer for HttpAnnouncer {
    async fn announce(
        &self,
        target_host: &str,
        announcement: &Announcement,
    ) -> Result<(), AnnounceError> {
        let url = self.url_for(target_host);
        debug!("announcing {:?} to {}", announcement, url);
        let resp = self.client.post(&url).json(announcement).send().await?;
        match resp.status() {
            StatusCode::CREATED => Ok(()),
            other => Err(AnnounceError::Rejected(other.as_u16())),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeState {
    Resolving,
    Announcing { attempt: u64 },
    Acknowledged,
    Abandoned,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandshakeOutcome {
    Acknowledged { attempts: u64 },
    /// No local interface or hardware address could be found.
    Abandoned { reason: String },
}

/// Gateway whose registration triggered the handshake and the host that
/// must be told about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeJob {
    pub gateway_ip: String,
    pub target_host: String,
}

/// A running handshake task.
pub struct HandshakeHandle {
    gateway_ip: String,
    state: watch::Receiver<HandshakeState>,
    task: JoinHandle<HandshakeOutcome>,
}

impl HandshakeHandle {
    pub fn gateway_ip(&self) -> &str {
        &self.gateway_ip
    }

    pub fn state(&self) -> HandshakeState {
        self.state.borrow().clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    pub fn abort(&self) {
        self.task.abort();
    }

    /// Waits for the task. `None` if it was aborted.
    pub async fn join(self) -> Option<HandshakeOutcome> {
        self.task.await.ok()
    }
}

/// Spawns handshake tasks.
#[derive(Clone)]
pub struct Handshake {
    port: Arc<dyn NetworkPort>,
    announcer: Arc<dyn Announcer>,
    interval: Duration,
}

impl Handshake {
    pub fn new(
        port: Arc<dyn NetworkPort>,
        announcer: Arc<dyn Announcer>,
        interval: Duration,
    ) -> Self {
        Self {
            port,
            announcer,
            interval,
        }
    }

    /// Starts `job` in the background and returns immediately.
    pub fn spawn(&self, job: HandshakeJob) -> HandshakeHandle {
        let (state_tx, state_rx) = watch::channel(HandshakeState::Resolving);
        let gateway_ip = job.gateway_ip.clone();
        let this = self.clone();
        let task = tokio::spawn(async move { this.run(job, state_tx).await });
        HandshakeHandle {
            gateway_ip,
            state: state_rx,
            task,
        }
    }

    async fn run(
        &self,
        job: HandshakeJob,
        state: watch::Sender<HandshakeState>,
    ) -> HandshakeOutcome {
        let gateway_mac = match self.resolve(&job.gateway_ip).await {
            Ok(mac) => mac,
            Err(reason) => {
                error!(
                    "handshake for gateway {} abandoned: {}",
                    job.gateway_ip, reason
                );
                state.send_replace(HandshakeState::Abandoned);
                return HandshakeOutcome::Abandoned { reason };
            }
        };

        let announcement = Announcement {
            gateway_ip: job.gateway_ip.clone(),
            gateway_mac,
        };
        let mut attempt = 0;
        loop {
            attempt += 1;
            state.send_replace(HandshakeState::Announcing { attempt });
            match self
                .announcer
                .announce(&job.target_host, &announcement)
                .await
            {
                Ok(()) => {
                    info!(
                        "access mac for gateway {} registered at {} after {} attempt(s)",
                        job.gateway_ip, job.target_host, attempt
                    );
                    state.send_replace(HandshakeState::Acknowledged);
                    return HandshakeOutcome::Acknowledged { attempts: attempt };
                }
                Err(e) => warn!(
                    "announcement to {} failed (attempt {}): {}",
                    job.target_host, attempt, e
                ),
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    async fn resolve(&self, gateway_ip: &str) -> Result<String, String> {
        let interface = match self.port.interface_for_address(gateway_ip).await {
            Ok(Some(name)) => name,
            Ok(None) => return Err(format!("no local interface carries {}", gateway_ip)),
            Err(e) => return Err(e.to_string()),
        };
        match self.port.hardware_address(&interface).await {
            Ok(Some(mac)) => {
                debug!("gateway {} is reached via {} ({})", gateway_ip, interface, mac);
                Ok(mac)
            }
            Ok(None) => Err(format!("interface {} has no hardware address", interface)),
            Err(e) => Err(e.to_string()),
        }
    }
}

/// Keeps track of every handshake started by this process.
pub struct HandshakeTracker {
    handshake: Handshake,
    handles: Mutex<Vec<HandshakeHandle>>,
    spawned: AtomicUsize,
}

impl HandshakeTracker {
    pub fn new(handshake: Handshake) -> Self {
        Self {
            handshake,
            handles: Mutex::new(Vec::new()),
            spawned: AtomicUsize::new(0),
        }
    }

    pub async fn start(&self, job: HandshakeJob) {
        let handle = self.handshake.spawn(job);
        self.spawned.fetch_add(1, Ordering::Relaxed);
        let mut handles = self.handles.lock().await;
        handles.retain(|h| !h.is_finished());
        handles.push(handle);
    }

    /// Number of handshakes started since creation.
    pub fn spawned(&self) -> usize {
        self.spawned.load(Ordering::Relaxed)
    }

    /// Handshakes not yet finished.
    pub async fn active(&self) -> usize {
        let handles = self.handles.lock().await;
        handles.iter().filter(|h| !h.is_finished()).count()
    }

    /// Aborts all outstanding handshakes and waits for them to stop.
    pub async fn shutdown(&self) {
        let handles = std::mem::take(&mut *self.handles.lock().await);
        for handle in handles {
            if !handle.is_finished() {
                info!(
                    "aborting handshake for gateway {} in state {:?}",
                    handle.gateway_ip(),
                    handle.state()
                );
                handle.abort();
            }
            handle.join().await;
        }
    }
}
