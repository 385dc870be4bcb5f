//! Test doubles shared by the unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::PortError;
use crate::net::{NetworkPort, RuleOp, TrafficMark};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Call {
    Mark {
        op: RuleOp,
        endpoint: String,
        mark: u8,
    },
    ResolutionAdd {
        endpoint: String,
        hardware_addr: String,
        interface: String,
    },
    ResolutionRemove {
        endpoint: String,
        interface: String,
    },
}

impl Call {
    pub fn mark(op: RuleOp, endpoint: &str, mark: u8) -> Self {
        Call::Mark {
            op,
            endpoint: endpoint.into(),
            mark,
        }
    }

    pub fn resolution_add(endpoint: &str, hardware_addr: &str, interface: &str) -> Self {
        Call::ResolutionAdd {
            endpoint: endpoint.into(),
            hardware_addr: hardware_addr.into(),
            interface: interface.into(),
        }
    }

    pub fn resolution_remove(endpoint: &str, interface: &str) -> Self {
        Call::ResolutionRemove {
            endpoint: endpoint.into(),
            interface: interface.into(),
        }
    }
}

/// Records every attempted mutation; selected calls can be made to fail.
#[derive(Default)]
pub struct FakeNetwork {
    calls: Mutex<Vec<Call>>,
    failing: Mutex<HashSet<Call>>,
    interfaces: Mutex<HashMap<String, String>>,
    hardware: Mutex<HashMap<String, String>>,
    delay: Option<Duration>,
}

impl FakeNetwork {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every mutation sleeps for `delay` before completing.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay: Some(delay),
            ..Self::default()
        }
    }

    pub fn with_interface(self, address: &str, interface: &str, hardware_addr: &str) -> Self {
        self.interfaces
            .lock()
            .unwrap()
            .insert(address.into(), interface.into());
        self.hardware
            .lock()
            .unwrap()
            .insert(interface.into(), hardware_addr.into());
        self
    }

    pub fn fail_on(&self, call: Call) {
        self.failing.lock().unwrap().insert(call);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.calls.lock().unwrap().clear();
    }

    async fn record(&self, call: Call) -> Result<(), PortError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.calls.lock().unwrap().push(call.clone());
        if self.failing.lock().unwrap().contains(&call) {
            return Err(PortError::CommandFailed {
                command: format!("{call:?}"),
                status: "exit status: 1".into(),
                output: "injected failure".into(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl NetworkPort for FakeNetwork {
    async fn apply_mark(
        &self,
        op: RuleOp,
        endpoint_ip: &str,
        mark: TrafficMark,
    ) -> Result<(), PortError> {
        self.record(Call::mark(op, endpoint_ip, mark.value())).await
    }

    async fn add_resolution(
        &self,
        endpoint_ip: &str,
        hardware_addr: &str,
        interface: &str,
    ) -> Result<(), PortError> {
        self.record(Call::resolution_add(endpoint_ip, hardware_addr, interface))
            .await
    }

    async fn remove_resolution(
        &self,
        endpoint_ip: &str,
        interface: &str,
    ) -> Result<(), PortError> {
        self.record(Call::resolution_remove(endpoint_ip, interface))
            .await
    }

    async fn interface_for_address(&self, address: &str) -> Result<Option<String>, PortError> {
        Ok(self.interfaces.lock().unwrap().get(address).cloned())
    }

    async fn hardware_address(&self, interface: &str) -> Result<Option<String>, PortError> {
        Ok(self.hardware.lock().unwrap().get(interface).cloned())
    }
}
