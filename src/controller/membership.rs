//! Machine to etcd member mapping and quorum-guarded member removal.

use kube::ResourceExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use crate::client::{Member, member_for_name};
use crate::controller::error::{Error, Result};
use crate::controller::workload::{Workload, cancellable, node_name};
use crate::crd::Machine;

/// Minimum number of control-plane nodes for a removal to be attempted.
pub const MIN_CONTROL_PLANE_NODES_FOR_REMOVAL: usize = 2;

/// Resolve a machine to the etcd member running on its node.
///
/// Fails with `Error::NoNodeRef` when the machine never joined, which callers
/// treat as a no-op, and with `Error::MemberNotFound` when no member carries
/// the node's name.
pub fn member_for_machine<'a>(machine: &Machine, members: &'a [Member]) -> Result<&'a Member> {
    let node = machine.node_name().ok_or_else(|| Error::NoNodeRef {
        machine: machine.name_any(),
    })?;
    member_for_name(members, node).ok_or_else(|| Error::MemberNotFound {
        node: node.to_string(),
    })
}

impl Workload {
    /// Remove the etcd member backing `machine`.
    ///
    /// The removal is issued through another control-plane node's etcd. A
    /// machine without a node, or whose member is already gone, is a no-op.
    #[instrument(skip_all, fields(machine = ?machine.map(|m| m.name_any())))]
    pub async fn remove_etcd_member_for_machine(
        &self,
        machine: Option<&Machine>,
        cancel: &CancellationToken,
    ) -> Result<()> {
        cancellable(cancel, self.remove_member(machine)).await
    }

    async fn remove_member(&self, machine: Option<&Machine>) -> Result<()> {
        let Some(machine) = machine else {
            debug!("No machine given, nothing to remove");
            return Ok(());
        };
        let Some(machine_node) = machine.node_name() else {
            debug!("Machine has no node reference, nothing to remove");
            return Ok(());
        };

        let nodes = self.control_plane_nodes().await?;
        if nodes.len() < MIN_CONTROL_PLANE_NODES_FOR_REMOVAL {
            return Err(Error::InsufficientQuorum {
                control_plane_nodes: nodes.len(),
            });
        }

        let Some(via) = nodes
            .iter()
            .filter_map(node_name)
            .find(|name| *name != machine_node)
        else {
            return Err(Error::NoRemainingMember {
                node: machine_node.to_string(),
            });
        };

        let mut client =
            self.etcd
                .for_node(via)
                .await
                .map_err(|source| Error::ConnectionFailed {
                    node: via.to_string(),
                    source,
                })?;

        let members = client
            .members()
            .await
            .map_err(|e| Error::rpc("member list", e))?;
        let Some(member) = member_for_name(&members, machine_node) else {
            debug!(node = %machine_node, via = %via, "etcd member already removed");
            return Ok(());
        };

        client
            .remove_member(member.id)
            .await
            .map_err(|e| Error::rpc("member remove", e))?;
        info!(
            node = %machine_node,
            member_id = member.id,
            via = %via,
            "Removed etcd member"
        );
        Ok(())
    }
}
