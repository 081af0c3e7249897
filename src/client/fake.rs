//! In-memory etcd test doubles.
//!
//! `FakeEtcdClient` serves a fixed member and alarm list, records mutating
//! calls, and can be told to fail any RPC. Clones share state, so a test can
//! hand a clone to `FakeEtcdClientFactory` and inspect the original after the
//! workload has consumed its connection.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;

use super::etcd::{EtcdClient, EtcdError};
use super::factory::EtcdClientFactory;
use super::types::{Alarm, Member};

#[derive(Debug, Default)]
struct FakeEtcdState {
    members: Vec<Member>,
    alarms: Vec<Alarm>,
    leader_id: u64,
    members_error: Option<String>,
    alarms_error: Option<String>,
    remove_error: Option<String>,
    move_error: Option<String>,
    removed: Vec<u64>,
    moved_leader_to: Vec<u64>,
    rpc_count: usize,
}

/// In-memory `EtcdClient`.
#[derive(Debug, Clone, Default)]
pub struct FakeEtcdClient {
    state: Arc<Mutex<FakeEtcdState>>,
}

impl FakeEtcdClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve this member list.
    pub fn with_members(self, members: Vec<Member>) -> Self {
        self.state().members = members;
        self
    }

    /// Serve this alarm list.
    pub fn with_alarms(self, alarms: Vec<Alarm>) -> Self {
        self.state().alarms = alarms;
        self
    }

    /// Report this leader ID for the connection.
    pub fn with_leader(self, leader_id: u64) -> Self {
        self.state().leader_id = leader_id;
        self
    }

    /// Fail member list calls.
    pub fn fail_members(self, message: impl Into<String>) -> Self {
        self.state().members_error = Some(message.into());
        self
    }

    /// Fail alarm list calls.
    pub fn fail_alarms(self, message: impl Into<String>) -> Self {
        self.state().alarms_error = Some(message.into());
        self
    }

    /// Fail member removal calls.
    pub fn fail_remove(self, message: impl Into<String>) -> Self {
        self.state().remove_error = Some(message.into());
        self
    }

    /// Fail leadership transfer calls.
    pub fn fail_move_leader(self, message: impl Into<String>) -> Self {
        self.state().move_error = Some(message.into());
        self
    }

    /// IDs passed to successful `remove_member` calls, in call order.
    pub fn removed_members(&self) -> Vec<u64> {
        self.state().removed.clone()
    }

    /// Target IDs passed to successful `move_leader` calls, in call order.
    pub fn moved_leader_to(&self) -> Vec<u64> {
        self.state().moved_leader_to.clone()
    }

    /// Current member list, reflecting removals.
    pub fn current_members(&self) -> Vec<Member> {
        self.state().members.clone()
    }

    /// Number of RPCs issued, successful or not.
    pub fn rpc_count(&self) -> usize {
        self.state().rpc_count
    }

    fn state(&self) -> MutexGuard<'_, FakeEtcdState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn injected(error: &Option<String>) -> Result<(), EtcdError> {
    match error {
        Some(message) => Err(EtcdError::Rpc(message.clone())),
        None => Ok(()),
    }
}

#[async_trait]
impl EtcdClient for FakeEtcdClient {
    fn leader_id(&self) -> u64 {
        self.state().leader_id
    }

    async fn members(&mut self) -> Result<Vec<Member>, EtcdError> {
        let mut state = self.state();
        state.rpc_count += 1;
        injected(&state.members_error)?;
        Ok(state.members.clone())
    }

    async fn alarms(&mut self) -> Result<Vec<Alarm>, EtcdError> {
        let mut state = self.state();
        state.rpc_count += 1;
        injected(&state.alarms_error)?;
        Ok(state.alarms.clone())
    }

    async fn remove_member(&mut self, id: u64) -> Result<(), EtcdError> {
        let mut state = self.state();
        state.rpc_count += 1;
        injected(&state.remove_error)?;
        let before = state.members.len();
        state.members.retain(|m| m.id != id);
        if state.members.len() == before {
            return Err(EtcdError::Rpc(format!("member {:x} not found", id)));
        }
        state.removed.push(id);
        Ok(())
    }

    async fn move_leader(&mut self, target_id: u64) -> Result<(), EtcdError> {
        let mut state = self.state();
        state.rpc_count += 1;
        injected(&state.move_error)?;
        state.moved_leader_to.push(target_id);
        state.leader_id = target_id;
        Ok(())
    }
}

/// In-memory `EtcdClientFactory`.
///
/// Hands out clones of one `FakeEtcdClient` per node. Nodes can be marked
/// unreachable individually, or the whole factory can fail.
#[derive(Debug, Clone, Default)]
pub struct FakeEtcdClientFactory {
    default_client: Option<FakeEtcdClient>,
    node_clients: BTreeMap<String, FakeEtcdClient>,
    unreachable: BTreeSet<String>,
    error: Option<String>,
    requested: Arc<Mutex<Vec<String>>>,
}

impl FakeEtcdClientFactory {
    /// Factory handing out `client` for every node.
    pub fn new(client: FakeEtcdClient) -> Self {
        Self {
            default_client: Some(client),
            ..Default::default()
        }
    }

    /// Factory that fails for every node.
    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            error: Some(message.into()),
            ..Default::default()
        }
    }

    /// Hand out `client` for `node` instead of the default client.
    pub fn with_node_client(mut self, node: impl Into<String>, client: FakeEtcdClient) -> Self {
        self.node_clients.insert(node.into(), client);
        self
    }

    /// Fail connections to `node`.
    pub fn with_unreachable(mut self, node: impl Into<String>) -> Self {
        self.unreachable.insert(node.into());
        self
    }

    /// Node names passed to `for_node`, in call order.
    pub fn requested_nodes(&self) -> Vec<String> {
        self.requested
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }
}

#[async_trait]
impl EtcdClientFactory for FakeEtcdClientFactory {
    async fn for_node(&self, node_name: &str) -> Result<Box<dyn EtcdClient>, EtcdError> {
        match self.requested.lock() {
            Ok(mut requested) => requested.push(node_name.to_string()),
            Err(poisoned) => poisoned.into_inner().push(node_name.to_string()),
        }

        if let Some(message) = &self.error {
            return Err(EtcdError::Connection(message.clone()));
        }
        if self.unreachable.contains(node_name) {
            return Err(EtcdError::Connection(format!(
                "etcd on node {} is unreachable",
                node_name
            )));
        }

        self.node_clients
            .get(node_name)
            .or(self.default_client.as_ref())
            .map(|client| Box::new(client.clone()) as Box<dyn EtcdClient>)
            .ok_or_else(|| EtcdError::Connection(format!("no etcd member on node {}", node_name)))
    }
}
