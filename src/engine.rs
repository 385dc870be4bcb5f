//! Binding reconciliation.
//!
//! For every endpoint in a bind request the engine compares the requested
//! gateway with the current owner and drives the host through the minimal
//! transition:
//!
//! * **unbound**: mark-add and resolution-add for the new gateway.
//! * **same gateway**: nothing.
//! * **other gateway**: mark-add and resolution-add for the new gateway,
//!   then mark-del and resolution-del for the old one.
//!
//! New state is always installed before old state is withdrawn, so an
//! endpoint never loses its path. The binding table only moves to the new
//! gateway once both add steps succeeded. A failed resolution-add is
//! compensated by removing the mark that was just installed. A gateway
//! without a registered hardware identity is rejected before any command
//! runs.
//!
//! Transitions for the same endpoint IP are serialised by a per-endpoint
//! lock held across lookup, commands and commit. Unrelated endpoints
//! proceed concurrently.

use std::collections::HashMap;
use std::sync::Arc;

use log::{error, info, warn};
use tokio::sync::{Mutex, OwnedMutexGuard};

use crate::error::{ApplyError, InvalidRequest};
use crate::net::{NetworkStateApplier, RuleOp, TrafficMark};
use crate::state::BindingTable;

#[derive(Debug)]
pub enum EndpointOutcome {
    /// First binding for the endpoint.
    Bound,
    /// Already owned by the requested gateway.
    Unchanged,
    Migrated { from: String },
    /// Migrated, but state for the old gateway could not be fully removed.
    StaleCleanup { from: String, errors: Vec<ApplyError> },
    /// Binding left as it was.
    Failed { error: ApplyError },
}

#[derive(Debug)]
pub struct EndpointReport {
    pub endpoint_ip: String,
    pub outcome: EndpointOutcome,
}

#[derive(Debug)]
pub struct ReconcileReport {
    pub gateway_ip: String,
    pub endpoints: Vec<EndpointReport>,
}

impl ReconcileReport {
    /// True when every endpoint ended in its target state with no stale
    /// kernel state left behind.
    pub fn is_success(&self) -> bool {
        self.endpoints.iter().all(|e| {
            matches!(
                e.outcome,
                EndpointOutcome::Bound
                    | EndpointOutcome::Unchanged
                    | EndpointOutcome::Migrated { .. }
            )
        })
    }

    /// Human-readable errors keyed by endpoint IP.
    pub fn errors(&self) -> Vec<(String, String)> {
        let mut out = Vec::new();
        for report in &self.endpoints {
            match &report.outcome {
                EndpointOutcome::Failed { error } => {
                    out.push((report.endpoint_ip.clone(), error.to_string()))
                }
                EndpointOutcome::StaleCleanup { errors, .. } => out.extend(
                    errors
                        .iter()
                        .map(|e| (report.endpoint_ip.clone(), e.to_string())),
                ),
                _ => {}
            }
        }
        out
    }
}

/// Async locks for endpoint IPs with a transition in flight or queued.
#[derive(Default)]
struct EndpointLocks {
    inner: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl EndpointLocks {
    async fn acquire(&self, endpoint_ip: &str) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(endpoint_ip.to_string()).or_default().clone()
        };
        lock.lock_owned().await
    }

    /// Drops the entry for `endpoint_ip` once nobody holds or waits on it.
    /// Clones are only taken under the map lock, so a count of one here
    /// means the map owns the last reference.
    async fn release(&self, endpoint_ip: &str, guard: OwnedMutexGuard<()>) {
        drop(guard);
        let mut map = self.inner.lock().await;
        if map
            .get(endpoint_ip)
            .is_some_and(|lock| Arc::strong_count(lock) == 1)
        {
            map.remove(endpoint_ip);
        }
    }
}

pub struct ReconciliationEngine {
    bindings: Arc<BindingTable>,
    applier: NetworkStateApplier,
    locks: EndpointLocks,
}

impl ReconciliationEngine {
    pub fn new(bindings: Arc<BindingTable>, applier: NetworkStateApplier) -> Self {
        Self {
            bindings,
            applier,
            locks: EndpointLocks::default(),
        }
    }

    /// Binds each of `endpoint_ips` to `gateway_ip`.
    ///
    /// Endpoints are processed in order and independently: a failure stops
    /// that endpoint's transition and the next endpoint is attempted.
    /// Request-level validation happens before anything is touched.
    pub async fn reconcile(
        &self,
        gateway_ip: &str,
        endpoint_ips: &[String],
    ) -> Result<ReconcileReport, InvalidRequest> {
        if gateway_ip.is_empty() {
            return Err(InvalidRequest("gateway ip is empty".into()));
        }
        if endpoint_ips.is_empty() {
            return Err(InvalidRequest("endpoint ip list is empty".into()));
        }
        if endpoint_ips.iter().any(|ip| ip.is_empty()) {
            return Err(InvalidRequest(
                "endpoint ip list contains an empty entry".into(),
            ));
        }
        TrafficMark::from_gateway_ip(gateway_ip)
            .map_err(|e| InvalidRequest(e.to_string()))?;

        let mut endpoints = Vec::with_capacity(endpoint_ips.len());
        for endpoint_ip in endpoint_ips {
            let outcome = self.reconcile_endpoint(gateway_ip, endpoint_ip).await;
            endpoints.push(EndpointReport {
                endpoint_ip: endpoint_ip.clone(),
                outcome,
            });
        }

        Ok(ReconcileReport {
            gateway_ip: gateway_ip.to_string(),
            endpoints,
        })
    }

    async fn reconcile_endpoint(&self, gateway_ip: &str, endpoint_ip: &str) -> EndpointOutcome {
        let guard = self.locks.acquire(endpoint_ip).await;
        let outcome = self.transition(gateway_ip, endpoint_ip).await;
        self.locks.release(endpoint_ip, guard).await;
        outcome
    }

    async fn transition(&self, gateway_ip: &str, endpoint_ip: &str) -> EndpointOutcome {
        let current = self.bindings.lookup(endpoint_ip).await;
        if current.as_deref() == Some(gateway_ip) {
            return EndpointOutcome::Unchanged;
        }

        if let Err(error) = self.install(gateway_ip, endpoint_ip).await {
            error!(
                "binding {} to {} failed, owner stays {:?}: {}",
                endpoint_ip, gateway_ip, current, error
            );
            return EndpointOutcome::Failed { error };
        }
        self.bindings.set(endpoint_ip, gateway_ip).await;

        let Some(old_gateway) = current else {
            info!("bound {} to {}", endpoint_ip, gateway_ip);
            return EndpointOutcome::Bound;
        };

        let errors = self.withdraw(&old_gateway, endpoint_ip).await;
        if errors.is_empty() {
            info!(
                "migrated {} from {} to {}",
                endpoint_ip, old_gateway, gateway_ip
            );
            EndpointOutcome::Migrated { from: old_gateway }
        } else {
            warn!(
                "migrated {} from {} to {} leaving stale state for {}",
                endpoint_ip, old_gateway, gateway_ip, old_gateway
            );
            EndpointOutcome::StaleCleanup {
                from: old_gateway,
                errors,
            }
        }
    }

    /// Installs mark and resolution entry for the new owner. A mark whose
    /// resolution entry could not be installed is removed again.
    async fn install(&self, gateway_ip: &str, endpoint_ip: &str) -> Result<(), ApplyError> {
        self.applier.require_identity(gateway_ip).await?;
        self.applier
            .apply_mark(gateway_ip, endpoint_ip, RuleOp::Add)
            .await?;

        if let Err(e) = self
            .applier
            .apply_resolution(gateway_ip, endpoint_ip, RuleOp::Add)
            .await
        {
            if let Err(undo) = self
                .applier
                .apply_mark(gateway_ip, endpoint_ip, RuleOp::Remove)
                .await
            {
                error!(
                    "could not remove orphaned mark for {} via {}: {}",
                    endpoint_ip, gateway_ip, undo
                );
            }
            return Err(e);
        }
        Ok(())
    }

    /// Removes the old owner's mark and resolution entry. Both removals are
    /// attempted; every failure is returned.
    async fn withdraw(&self, gateway_ip: &str, endpoint_ip: &str) -> Vec<ApplyError> {
        let mut errors = Vec::new();
        if let Err(e) = self
            .applier
            .apply_mark(gateway_ip, endpoint_ip, RuleOp::Remove)
            .await
        {
            errors.push(e);
        }
        if let Err(e) = self
            .applier
            .apply_resolution(gateway_ip, endpoint_ip, RuleOp::Remove)
            .await
        {
            errors.push(e);
        }
        errors
    }
}
