use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use kube::Client;
use kube_leader_election::{LeaseLock, LeaseLockParams};
use tokio::signal;
use tracing::{error, info, warn};

use mariadb_operator::OperatorConfig;
use mariadb_operator::health::{HealthState, run_health_server};
use mariadb_operator::{run_controller, run_galera_controller, run_pod_controller};

/// Lease configuration
const LEASE_NAME: &str = "mariadb-operator-leader";
const LEASE_TTL_SECS: u64 = 15;
const LEASE_RENEW_INTERVAL_SECS: u64 = 5;

/// Grace period for in-flight reconciliations to complete during shutdown
const SHUTDOWN_GRACE_PERIOD_SECS: u64 = 5;

fn init_tracing() -> Result<(), Box<dyn std::error::Error>> {
    let filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("mariadb_operator=info".parse()?)
        .add_directive("kube=info".parse()?)
        .add_directive("kube_leader_election=info".parse()?);

    // LOG_FORMAT=json for log collectors, human readable otherwise
    if std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
    Ok(())
}

fn lease_lock(client: Client, config: &OperatorConfig) -> LeaseLock {
    LeaseLock::new(
        client,
        &config.pod_namespace,
        LeaseLockParams {
            holder_id: config.pod_name.clone(),
            lease_name: LEASE_NAME.to_string(),
            lease_ttl: Duration::from_secs(LEASE_TTL_SECS),
        },
    )
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Install the TLS crypto provider before any TLS operations
    if rustls::crypto::aws_lc_rs::default_provider()
        .install_default()
        .is_err()
        && rustls::crypto::CryptoProvider::get_default().is_none()
    {
        return Err("Failed to install rustls crypto provider and no provider is available".into());
    }

    init_tracing()?;
    info!("Starting mariadb-operator");

    let config = OperatorConfig::from_env()?;
    info!(
        cluster_name = %config.cluster_name,
        watch_namespace = config.watch_namespace.as_deref().unwrap_or("all"),
        "Loaded configuration"
    );

    let client = Client::try_default().await?;
    info!("Connected to Kubernetes cluster");

    info!(
        holder_id = %config.pod_name,
        namespace = %config.pod_namespace,
        lease_name = LEASE_NAME,
        "Initializing leader election"
    );

    let health_state = Arc::new(HealthState::new());
    let is_leader = Arc::new(AtomicBool::new(false));

    // Health endpoints must answer even as non-leader
    let health_handle = {
        let health_state = health_state.clone();
        let port = config.health_port;
        tokio::spawn(async move {
            if let Err(e) = run_health_server(health_state, port).await {
                error!("Health server error: {}", e);
            }
        })
    };

    let lock = lease_lock(client.clone(), &config);
    info!("Waiting to acquire leadership...");
    loop {
        match lock.try_acquire_or_renew().await {
            Ok(result) => {
                if result.acquired_lease {
                    info!("Acquired leadership");
                    is_leader.store(true, Ordering::SeqCst);
                    break;
                } else {
                    info!("Another instance is leader, waiting...");
                }
            }
            Err(e) => {
                warn!("Failed to acquire lease: {}, retrying...", e);
            }
        }
        tokio::time::sleep(Duration::from_secs(LEASE_RENEW_INTERVAL_SECS)).await;
    }

    let lease_renewal_handle = {
        let is_leader = is_leader.clone();
        tokio::spawn(async move {
            loop {
                tokio::time::sleep(Duration::from_secs(LEASE_RENEW_INTERVAL_SECS)).await;

                match lock.try_acquire_or_renew().await {
                    Ok(result) => {
                        if !result.acquired_lease {
                            error!("Lost leadership! Shutting down...");
                            is_leader.store(false, Ordering::SeqCst);
                            // Exit so Kubernetes restarts us and we re-enter election
                            std::process::exit(1);
                        }
                    }
                    Err(e) => {
                        error!("Failed to renew lease: {}. Shutting down...", e);
                        is_leader.store(false, Ordering::SeqCst);
                        std::process::exit(1);
                    }
                }
            }
        })
    };

    info!("Watching MariaDB resources (apiVersion: k8s.mariadb.com/v1alpha1)");

    let controller_handle = tokio::spawn(run_controller(
        client.clone(),
        config.clone(),
        Some(health_state.clone()),
    ));
    let galera_handle = tokio::spawn(run_galera_controller(
        client.clone(),
        config.clone(),
        Some(health_state.clone()),
    ));
    let pod_handle = tokio::spawn(run_pod_controller(
        client,
        config,
        Some(health_state.clone()),
    ));

    tokio::select! {
        result = controller_handle => {
            if let Err(e) = result {
                error!("MariaDB controller task panicked: {}", e);
            }
        }
        result = galera_handle => {
            if let Err(e) = result {
                error!("Galera controller task panicked: {}", e);
            }
        }
        result = pod_handle => {
            if let Err(e) = result {
                error!("Pod controller task panicked: {}", e);
            }
        }
        result = health_handle => {
            if let Err(e) = result {
                error!("Health server task panicked: {}", e);
            }
        }
        // Lease renewal only exits via process::exit() or panic
        Err(e) = lease_renewal_handle => {
            error!("Lease renewal task panicked: {}", e);
        }
        _ = shutdown_signal() => {
            info!("Received shutdown signal, initiating graceful shutdown...");

            health_state.set_ready(false).await;
            info!("Marked operator as not ready");

            info!(
                "Waiting {}s for in-flight reconciliations to complete...",
                SHUTDOWN_GRACE_PERIOD_SECS
            );
            tokio::time::sleep(Duration::from_secs(SHUTDOWN_GRACE_PERIOD_SECS)).await;

            info!("Grace period complete, shutting down");
        }
    }

    info!("Operator stopped");
    Ok(())
}

/// Wait for shutdown signal (SIGTERM or SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
