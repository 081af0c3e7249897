//! controlplane-etcd - one-shot etcd health probe for a kubeadm control plane.
//!
//! This is the main entry point that:
//! - Initializes structured logging
//! - Creates the Kubernetes client
//! - Loads configuration and etcd client TLS material from the environment
//! - Runs a single etcd health check and exits non-zero when any control
//!   plane node is unhealthy

use std::process::ExitCode;
use std::sync::Arc;

use kube::Client;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use controlplane_etcd::{
    EtcdTlsConfig, KubeClusterClient, PortForwardEtcdClientFactory, Workload, WorkloadConfig,
};

/// Environment variables naming the etcd client PEM files
const CA_FILE_ENV: &str = "ETCD_CA_FILE";
const CERT_FILE_ENV: &str = "ETCD_CERT_FILE";
const KEY_FILE_ENV: &str = "ETCD_KEY_FILE";

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    // Initialize tracing subscriber
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("controlplane_etcd=info".parse()?)
                .add_directive("kube=info".parse()?),
        )
        .json()
        .init();

    info!("Starting controlplane-etcd health probe");

    let config = WorkloadConfig::from_env()?;

    // Create Kubernetes client
    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    let mut factory = PortForwardEtcdClientFactory::new(client.clone(), config.clone());
    match load_tls().await? {
        Some(tls) => factory = factory.with_tls(tls),
        None => warn!("{} not set, connecting to etcd without TLS", CA_FILE_ENV),
    }

    let workload = Workload::new(Arc::new(KubeClusterClient::new(client)), Arc::new(factory))
        .with_config(config);

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        info!("Received shutdown signal, cancelling health check");
        on_signal.cancel();
    });

    let report = workload.etcd_is_healthy(&cancel).await?;
    for (node, health) in report.iter() {
        match health {
            Ok(()) => info!(node = %node, "etcd healthy"),
            Err(issue) => error!(node = %node, issue = %issue, "etcd unhealthy"),
        }
    }

    if report.is_healthy() {
        info!(nodes = report.len(), "etcd cluster healthy");
        Ok(ExitCode::SUCCESS)
    } else {
        error!(unhealthy = ?report.unhealthy_nodes(), "etcd cluster unhealthy");
        Ok(ExitCode::FAILURE)
    }
}

/// Read etcd client TLS material from the files named in the environment.
///
/// Returns `None` when no CA file is configured. A client certificate is
/// only loaded when both the certificate and key files are set.
async fn load_tls() -> Result<Option<EtcdTlsConfig>, std::io::Error> {
    let Ok(ca_file) = std::env::var(CA_FILE_ENV) else {
        return Ok(None);
    };
    let mut tls = EtcdTlsConfig::new(tokio::fs::read(&ca_file).await?);

    if let (Ok(cert_file), Ok(key_file)) = (std::env::var(CERT_FILE_ENV), std::env::var(KEY_FILE_ENV))
    {
        tls = tls.with_client_identity(
            tokio::fs::read(&cert_file).await?,
            tokio::fs::read(&key_file).await?,
        );
    }
    Ok(Some(tls))
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
///
/// Note: Signal handler setup failures are fatal; the probe cannot be
/// interrupted cleanly without them.
#[allow(clippy::expect_used)]
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
