//! Node-scoped etcd client construction.

use async_trait::async_trait;
use kube::Client;
use tracing::{debug, instrument};

use super::etcd::{EtcdClient, EtcdClientConfig, EtcdError, NetworkEtcdClient};
use super::port_forward::PortForward;
use crate::config::{EtcdTlsConfig, WorkloadConfig};

/// Opens etcd connections scoped to a single control-plane node.
///
/// Implementations must fail when the node has no running etcd member or its
/// endpoint cannot be reached. Every call opens a fresh connection; nothing
/// is cached between calls.
#[async_trait]
pub trait EtcdClientFactory: Send + Sync {
    async fn for_node(&self, node_name: &str) -> Result<Box<dyn EtcdClient>, EtcdError>;
}

/// Reaches each node's etcd through an API server port-forward to its etcd
/// static pod.
pub struct PortForwardEtcdClientFactory {
    client: Client,
    config: WorkloadConfig,
    tls: Option<EtcdTlsConfig>,
}

impl PortForwardEtcdClientFactory {
    pub fn new(client: Client, config: WorkloadConfig) -> Self {
        Self {
            client,
            config,
            tls: None,
        }
    }

    /// Set the client TLS material used to dial etcd.
    pub fn with_tls(mut self, tls: EtcdTlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }
}

#[async_trait]
impl EtcdClientFactory for PortForwardEtcdClientFactory {
    #[instrument(skip(self))]
    async fn for_node(&self, node_name: &str) -> Result<Box<dyn EtcdClient>, EtcdError> {
        let pod_name = self.config.etcd_pod_name(node_name);
        let port_forward = PortForward::start(
            self.client.clone(),
            &self.config.system_namespace,
            &pod_name,
            self.config.etcd_client_port,
        )
        .await?;

        let scheme = if self.tls.is_some() { "https" } else { "http" };
        let mut client_config = EtcdClientConfig::new(port_forward.endpoint(scheme))
            .with_connect_timeout(self.config.connect_timeout)
            .with_rpc_timeout(self.config.rpc_timeout);
        if let Some(tls) = &self.tls {
            client_config = client_config.with_tls(tls.clone());
        }

        let client = NetworkEtcdClient::connect(&client_config)
            .await?
            .with_port_forward(port_forward);
        debug!(node = %node_name, pod = %pod_name, "Opened etcd client for node");

        Ok(Box::new(client))
    }
}
