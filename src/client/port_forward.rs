//! Port forwarding to etcd static pods.
//!
//! Provides `PortForward` which uses kube-rs native port-forwarding to reach
//! the etcd client port of a control-plane node through the API server. This
//! works from outside the workload cluster's network, which is where the
//! control-plane lifecycle manager usually runs.
//!
//! When a `PortForward` goes out of scope, it will automatically stop
//! the forwarding (RAII pattern).

use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client};
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Errors that can occur during port forwarding
#[derive(Error, Debug)]
pub enum PortForwardError {
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Pod {namespace}/{name} not found")]
    PodNotFound { namespace: String, name: String },

    #[error("Pod {0} is not running")]
    PodNotRunning(String),

    #[error("Port forward stream for port {0} was not opened")]
    StreamUnavailable(u16),

    #[error("Port forward join error: {0}")]
    JoinError(String),
}

/// RAII wrapper for port forwarding using kube-rs
///
/// When this struct is dropped, it will stop the port-forward.
pub struct PortForward {
    local_port: u16,
    shutdown_tx: Option<oneshot::Sender<()>>,
    _handle: JoinHandle<()>,
    cleanup_initiated: AtomicBool,
}

impl PortForward {
    /// Start forwarding an ephemeral local port to `remote_port` of a pod.
    ///
    /// The pod must exist and be in the `Running` phase. The local listener is
    /// bound before this returns, so the port can be dialed immediately.
    pub async fn start(
        client: Client,
        namespace: &str,
        pod_name: &str,
        remote_port: u16,
    ) -> Result<Self, PortForwardError> {
        let pods: Api<Pod> = Api::namespaced(client, namespace);

        let pod = pods
            .get_opt(pod_name)
            .await?
            .ok_or_else(|| PortForwardError::PodNotFound {
                namespace: namespace.to_string(),
                name: pod_name.to_string(),
            })?;
        let running = pod
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            .is_some_and(|phase| phase == "Running");
        if !running {
            return Err(PortForwardError::PodNotRunning(pod_name.to_string()));
        }

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let local_port = listener.local_addr()?.port();

        tracing::debug!(
            namespace = namespace,
            pod = %pod_name,
            local_port = local_port,
            remote_port = remote_port,
            "Starting port-forward"
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let pod = pod_name.to_string();

        let handle = tokio::spawn(async move {
            if let Err(e) = run_port_forward(pods, &pod, listener, remote_port, shutdown_rx).await
            {
                tracing::warn!(error = %e, "Port forward error");
            }
        });

        Ok(Self {
            local_port,
            shutdown_tx: Some(shutdown_tx),
            _handle: handle,
            cleanup_initiated: AtomicBool::new(false),
        })
    }

    /// Get the local port that is forwarding to the remote target
    pub fn local_port(&self) -> u16 {
        self.local_port
    }

    /// Local endpoint URL for dialing the forwarded port.
    pub fn endpoint(&self, scheme: &str) -> String {
        format!("{}://127.0.0.1:{}", scheme, self.local_port)
    }

    /// Stop the port-forward
    pub fn stop(&mut self) {
        if self.cleanup_initiated.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::debug!(local_port = self.local_port, "Stopping port-forward");

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for PortForward {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Accept local connections until shutdown, tunnelling each one to the pod.
async fn run_port_forward(
    pods: Api<Pod>,
    pod_name: &str,
    listener: TcpListener,
    remote_port: u16,
    mut shutdown_rx: oneshot::Receiver<()>,
) -> Result<(), PortForwardError> {
    loop {
        tokio::select! {
            _ = &mut shutdown_rx => {
                tracing::debug!("Port forward shutdown requested");
                break;
            }
            result = listener.accept() => {
                match result {
                    Ok((stream, addr)) => {
                        tracing::trace!(client_addr = %addr, "New port forward connection");

                        let pods = pods.clone();
                        let pod_name = pod_name.to_string();

                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(pods, &pod_name, remote_port, stream).await {
                                tracing::warn!(error = %e, "Port forward connection error");
                            }
                        });
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Port forward accept error");
                    }
                }
            }
        }
    }

    Ok(())
}

/// Handle a single port-forward connection
async fn handle_connection(
    pods: Api<Pod>,
    pod_name: &str,
    remote_port: u16,
    mut local_stream: TcpStream,
) -> Result<(), PortForwardError> {
    let mut pf = pods.portforward(pod_name, &[remote_port]).await?;

    let upstream = pf
        .take_stream(remote_port)
        .ok_or(PortForwardError::StreamUnavailable(remote_port))?;

    let (mut local_read, mut local_write) = local_stream.split();
    let (mut upstream_read, mut upstream_write) = tokio::io::split(upstream);

    let client_to_server = async {
        tokio::io::copy(&mut local_read, &mut upstream_write).await?;
        upstream_write.shutdown().await?;
        Ok::<_, std::io::Error>(())
    };

    let server_to_client = async {
        let mut buf = vec![0u8; 8192];
        loop {
            let n = upstream_read.read(&mut buf).await?;
            if n == 0 {
                break;
            }
            local_write.write_all(buf.get(..n).unwrap_or_default()).await?;
        }
        local_write.shutdown().await?;
        Ok::<_, std::io::Error>(())
    };

    let _ = tokio::try_join!(client_to_server, server_to_client);

    pf.join()
        .await
        .map_err(|e| PortForwardError::JoinError(e.to_string()))?;

    Ok(())
}
