//! etcd leadership forwarding ahead of machine deletion.

use kube::ResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::client::{Member, member_for_name};
use crate::controller::error::{Error, Result};
use crate::controller::membership::member_for_machine;
use crate::controller::workload::{Workload, cancellable};
use crate::crd::Machine;

/// First member in list order that is not the current leader.
pub fn select_leader_target(members: &[Member], leader_id: u64) -> Option<&Member> {
    members.iter().find(|m| m.id != leader_id)
}

/// Resolve a caller-requested candidate to its member.
fn resolve_candidate<'a>(candidate: &Machine, members: &'a [Member]) -> Result<&'a Member> {
    member_for_machine(candidate, members).map_err(|_| Error::CandidateNotFound {
        node: candidate
            .node_name()
            .map(str::to_string)
            .unwrap_or_else(|| candidate.name_any()),
    })
}

impl Workload {
    /// Move etcd leadership off the member backing `machine`.
    ///
    /// Nothing happens unless that member is the current leader. Leadership
    /// goes to `leader_candidate` when given, otherwise to the first other
    /// member in list order.
    #[instrument(skip_all, fields(
        machine = ?machine.map(|m| m.name_any()),
        candidate = ?leader_candidate.map(|m| m.name_any()),
    ))]
    pub async fn forward_etcd_leadership(
        &self,
        machine: Option<&Machine>,
        leader_candidate: Option<&Machine>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        cancellable(cancel, self.forward_leadership(machine, leader_candidate)).await
    }

    async fn forward_leadership(
        &self,
        machine: Option<&Machine>,
        leader_candidate: Option<&Machine>,
    ) -> Result<()> {
        let Some(node) = machine.and_then(Machine::node_name) else {
            debug!("Machine absent or without node reference, nothing to forward");
            return Ok(());
        };

        let mut client =
            self.etcd
                .for_node(node)
                .await
                .map_err(|source| Error::ConnectionFailed {
                    node: node.to_string(),
                    source,
                })?;
        let leader_id = client.leader_id();

        let members = client
            .members()
            .await
            .map_err(|e| Error::rpc("member list", e))?;
        let Some(current) = member_for_name(&members, node) else {
            debug!(node = %node, "No etcd member for machine, nothing to forward");
            return Ok(());
        };
        if current.id != leader_id {
            debug!(
                node = %node,
                member_id = current.id,
                leader_id,
                "Machine is not the etcd leader"
            );
            return Ok(());
        }

        let target = match leader_candidate {
            Some(candidate) => resolve_candidate(candidate, &members)?,
            None => select_leader_target(&members, leader_id)
                .ok_or(Error::NoLeaderCandidate { leader_id })?,
        };

        client
            .move_leader(target.id)
            .await
            .map_err(|e| Error::rpc("move leader", e))?;
        info!(
            from = leader_id,
            to = target.id,
            target_node = %target.name,
            "Moved etcd leadership"
        );
        Ok(())
    }
}
