//! etcd client capability and its networked implementation.
//!
//! `EtcdClient` is the narrow surface the workload needs from etcd: the
//! member list, the alarm list, member removal, leadership transfer and the
//! leader ID observed when the connection was opened. `NetworkEtcdClient`
//! implements it over the `etcd-client` gRPC crate.

use std::time::Duration;

use async_trait::async_trait;
use etcd_client::{AlarmAction, Certificate, ConnectOptions, Identity, TlsOptions};
use thiserror::Error;
use tracing::{debug, instrument};

use super::port_forward::{PortForward, PortForwardError};
use super::types::{Alarm, Member};
use crate::config::EtcdTlsConfig;

/// Errors that can occur during etcd operations.
#[derive(Error, Debug)]
pub enum EtcdError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("etcd error: {0}")]
    Etcd(#[from] etcd_client::Error),

    #[error("Port forward error: {0}")]
    PortForward(#[from] PortForwardError),

    #[error("Timeout after {duration:?}: {operation}")]
    Timeout {
        operation: String,
        duration: Duration,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("RPC failed: {0}")]
    Rpc(String),
}

/// A connection to etcd scoped to a single control-plane node.
///
/// Connections are owned by the call that opened them and are closed when
/// dropped.
#[async_trait]
pub trait EtcdClient: Send {
    /// ID of the member the connected endpoint considered leader when the
    /// connection was established.
    fn leader_id(&self) -> u64;

    /// List cluster members in the order etcd reports them.
    async fn members(&mut self) -> Result<Vec<Member>, EtcdError>;

    /// List alarms currently raised in the cluster.
    async fn alarms(&mut self) -> Result<Vec<Alarm>, EtcdError>;

    /// Remove the member with the given ID from the cluster.
    async fn remove_member(&mut self, id: u64) -> Result<(), EtcdError>;

    /// Transfer leadership to the member with the given ID.
    async fn move_leader(&mut self, target_id: u64) -> Result<(), EtcdError>;
}

/// Connection settings for a single etcd endpoint.
#[derive(Clone, Debug)]
pub struct EtcdClientConfig {
    /// Endpoint URL, e.g. `https://127.0.0.1:2379`.
    pub endpoint: String,
    /// Client TLS material. Required by kubeadm-managed etcd.
    pub tls: Option<EtcdTlsConfig>,
    /// Connection timeout.
    pub connect_timeout: Duration,
    /// Per-request timeout.
    pub rpc_timeout: Duration,
}

impl EtcdClientConfig {
    /// Create a new configuration for an endpoint.
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            tls: None,
            connect_timeout: Duration::from_secs(10),
            rpc_timeout: Duration::from_secs(30),
        }
    }

    /// Set TLS configuration.
    pub fn with_tls(mut self, tls: EtcdTlsConfig) -> Self {
        self.tls = Some(tls);
        self
    }

    /// Set connection timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Set per-request timeout.
    pub fn with_rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = timeout;
        self
    }

    fn connect_options(&self) -> Result<ConnectOptions, EtcdError> {
        let mut options = ConnectOptions::new()
            .with_connect_timeout(self.connect_timeout)
            .with_timeout(self.rpc_timeout);

        if let Some(tls) = &self.tls {
            if !self.endpoint.starts_with("https://") {
                return Err(EtcdError::InvalidConfig(format!(
                    "TLS configured for non-https endpoint {}",
                    self.endpoint
                )));
            }
            let mut tls_options = TlsOptions::new()
                .ca_certificate(Certificate::from_pem(&tls.ca_cert_pem))
                .domain_name(tls.server_name.clone());
            if let (Some(cert), Some(key)) = (&tls.client_cert_pem, &tls.client_key_pem) {
                tls_options = tls_options.identity(Identity::from_pem(cert, key));
            }
            options = options.with_tls(tls_options);
        }

        Ok(options)
    }
}

/// etcd client backed by a gRPC connection.
///
/// When the connection rides on a port-forward, the forward is held here so
/// that both are released together.
pub struct NetworkEtcdClient {
    client: etcd_client::Client,
    leader_id: u64,
    endpoint: String,
    _port_forward: Option<PortForward>,
}

impl NetworkEtcdClient {
    /// Connect to an endpoint and record the leader it currently follows.
    #[instrument(skip(config), fields(endpoint = %config.endpoint))]
    pub async fn connect(config: &EtcdClientConfig) -> Result<Self, EtcdError> {
        if config.endpoint.is_empty() {
            return Err(EtcdError::InvalidConfig("No endpoint provided".to_string()));
        }

        let options = config.connect_options()?;
        let connect = etcd_client::Client::connect([config.endpoint.as_str()], Some(options));
        let mut client = tokio::time::timeout(config.connect_timeout, connect)
            .await
            .map_err(|_| EtcdError::Timeout {
                operation: format!("connect to {}", config.endpoint),
                duration: config.connect_timeout,
            })??;

        let status = client.status().await?;
        let leader_id = status.leader();
        debug!(leader_id, "Connected to etcd");

        Ok(Self {
            client,
            leader_id,
            endpoint: config.endpoint.clone(),
            _port_forward: None,
        })
    }

    /// Tie a port-forward's lifetime to this client.
    pub fn with_port_forward(mut self, port_forward: PortForward) -> Self {
        self._port_forward = Some(port_forward);
        self
    }

    /// Endpoint this client is connected to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl EtcdClient for NetworkEtcdClient {
    fn leader_id(&self) -> u64 {
        self.leader_id
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn members(&mut self) -> Result<Vec<Member>, EtcdError> {
        let response = self.client.member_list().await?;
        Ok(response.members().iter().map(Member::from).collect())
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn alarms(&mut self) -> Result<Vec<Alarm>, EtcdError> {
        let response = self
            .client
            .alarm(AlarmAction::Get, etcd_client::AlarmType::None, None)
            .await?;
        Ok(response
            .alarms()
            .iter()
            .map(|a| Alarm::new(a.member_id(), a.alarm().into()))
            .collect())
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn remove_member(&mut self, id: u64) -> Result<(), EtcdError> {
        self.client.member_remove(id).await?;
        Ok(())
    }

    #[instrument(skip(self), fields(endpoint = %self.endpoint))]
    async fn move_leader(&mut self, target_id: u64) -> Result<(), EtcdError> {
        self.client.move_leader(target_id).await?;
        Ok(())
    }
}
