//! Workload configuration.
//!
//! Defaults match a kubeadm-bootstrapped control plane. Every value can be
//! overridden through the builder methods or, for the binary, environment
//! variables.

use std::time::Duration;

use crate::controller::error::{Error, Result};

/// Namespace holding the etcd static pods and the kubeadm ConfigMap.
pub const DEFAULT_SYSTEM_NAMESPACE: &str = "kube-system";
/// Name of the ConfigMap kubeadm stores its configuration in.
pub const DEFAULT_KUBEADM_CONFIG_MAP: &str = "kubeadm-config";
/// ConfigMap key of the `ClusterConfiguration` document.
pub const DEFAULT_CLUSTER_CONFIGURATION_KEY: &str = "ClusterConfiguration";
/// Label present on control-plane nodes.
pub const DEFAULT_CONTROL_PLANE_LABEL: &str = "node-role.kubernetes.io/master";
/// Static pod name prefix; the pod for node `n` is `etcd-n`.
pub const DEFAULT_ETCD_POD_PREFIX: &str = "etcd";
/// etcd client port.
pub const DEFAULT_ETCD_CLIENT_PORT: u16 = 2379;

/// Settings shared by all workload operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WorkloadConfig {
    pub system_namespace: String,
    pub kubeadm_config_map: String,
    pub cluster_configuration_key: String,
    /// Label key selecting control-plane nodes. Only presence is checked.
    pub control_plane_label: String,
    pub etcd_pod_prefix: String,
    pub etcd_client_port: u16,
    /// Timeout for establishing an etcd connection.
    pub connect_timeout: Duration,
    /// Timeout for a single etcd request.
    pub rpc_timeout: Duration,
}

impl Default for WorkloadConfig {
    fn default() -> Self {
        Self {
            system_namespace: DEFAULT_SYSTEM_NAMESPACE.to_string(),
            kubeadm_config_map: DEFAULT_KUBEADM_CONFIG_MAP.to_string(),
            cluster_configuration_key: DEFAULT_CLUSTER_CONFIGURATION_KEY.to_string(),
            control_plane_label: DEFAULT_CONTROL_PLANE_LABEL.to_string(),
            etcd_pod_prefix: DEFAULT_ETCD_POD_PREFIX.to_string(),
            etcd_client_port: DEFAULT_ETCD_CLIENT_PORT,
            connect_timeout: Duration::from_secs(10),
            rpc_timeout: Duration::from_secs(30),
        }
    }
}

impl WorkloadConfig {
    /// Build configuration from `ETCD_*` environment variables, falling back
    /// to defaults for anything unset.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(ns) = lookup("ETCD_SYSTEM_NAMESPACE") {
            config.system_namespace = ns;
        }
        if let Some(label) = lookup("ETCD_CONTROL_PLANE_LABEL") {
            config.control_plane_label = label;
        }
        if let Some(port) = lookup("ETCD_CLIENT_PORT") {
            config.etcd_client_port = port.parse().map_err(|_| {
                Error::InvalidConfig(format!("ETCD_CLIENT_PORT is not a port: {}", port))
            })?;
        }
        if let Some(secs) = lookup("ETCD_CONNECT_TIMEOUT_SECS") {
            config.connect_timeout = parse_secs("ETCD_CONNECT_TIMEOUT_SECS", &secs)?;
        }
        if let Some(secs) = lookup("ETCD_RPC_TIMEOUT_SECS") {
            config.rpc_timeout = parse_secs("ETCD_RPC_TIMEOUT_SECS", &secs)?;
        }

        Ok(config)
    }

    /// Set the system namespace.
    pub fn with_system_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.system_namespace = namespace.into();
        self
    }

    /// Set the control-plane node label.
    pub fn with_control_plane_label(mut self, label: impl Into<String>) -> Self {
        self.control_plane_label = label.into();
        self
    }

    /// Set the etcd client port.
    pub fn with_etcd_client_port(mut self, port: u16) -> Self {
        self.etcd_client_port = port;
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

    /// Name of the etcd static pod scheduled on `node_name`.
    pub fn etcd_pod_name(&self, node_name: &str) -> String {
        format!("{}-{}", self.etcd_pod_prefix, node_name)
    }
}

fn parse_secs(key: &str, value: &str) -> Result<Duration> {
    match value.parse::<u64>() {
        Ok(secs) if secs > 0 => Ok(Duration::from_secs(secs)),
        _ => Err(Error::InvalidConfig(format!(
            "{} must be a positive number of seconds, got {}",
            key, value
        ))),
    }
}

/// TLS material for etcd client connections, as PEM data.
#[derive(Clone)]
pub struct EtcdTlsConfig {
    /// CA certificate that signed the etcd server certificates.
    pub ca_cert_pem: Vec<u8>,
    /// Client certificate, for mutual TLS.
    pub client_cert_pem: Option<Vec<u8>>,
    /// Client key, for mutual TLS.
    pub client_key_pem: Option<Vec<u8>>,
    /// Name to verify the server certificate against. kubeadm issues etcd
    /// serving certificates valid for `localhost`.
    pub server_name: String,
}

impl EtcdTlsConfig {
    pub fn new(ca_cert_pem: Vec<u8>) -> Self {
        Self {
            ca_cert_pem,
            client_cert_pem: None,
            client_key_pem: None,
            server_name: "localhost".to_string(),
        }
    }

    /// Set the client certificate and key.
    pub fn with_client_identity(mut self, cert_pem: Vec<u8>, key_pem: Vec<u8>) -> Self {
        self.client_cert_pem = Some(cert_pem);
        self.client_key_pem = Some(key_pem);
        self
    }

    /// Set the server name used for certificate verification.
    pub fn with_server_name(mut self, name: impl Into<String>) -> Self {
        self.server_name = name.into();
        self
    }
}

impl std::fmt::Debug for EtcdTlsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EtcdTlsConfig")
            .field("ca_cert_pem", &format_args!("{} bytes", self.ca_cert_pem.len()))
            .field("client_identity", &self.client_cert_pem.is_some())
            .field("server_name", &self.server_name)
            .finish()
    }
}
