//! ---
//! pb_section: "03-persistence-logging"
//! pb_subsection: "module"
//! pb_type: "source"
//! pb_scope: "code"
//! pb_description: "Prometheus exporter and daemon counters."
//! pb_version: "v0.0.0-prealpha"
//! pb_owner: "tbd"
//! ---
use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, StatusCode};
use axum::routing::get;
use axum::{response::IntoResponse, Router};
use prometheus::{IntCounter, Opts, Registry, TextEncoder, TEXT_FORMAT};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Registry shared by the bus and the exporter.
pub type SharedRegistry = Arc<Registry>;

/// Serve `registry` at `/metrics` on `addr`.
pub fn spawn_http_server(registry: SharedRegistry, addr: SocketAddr) -> Result<MetricsServer> {
    let app = Router::new().route(
        "/metrics",
        get(move || metrics_handler(registry.clone())),
    );

    let std_listener = StdTcpListener::bind(addr)
        .with_context(|| format!("failed to bind metrics listener {addr}"))?;
    std_listener
        .set_nonblocking(true)
        .context("failed to configure metrics listener as non-blocking")?;
    let listener = TcpListener::from_std(std_listener)
        .context("failed to convert std listener into tokio listener")?;
    let addr = listener.local_addr().unwrap_or(addr);

    info!(address = %addr, "metrics server starting");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task: JoinHandle<Result<()>> = tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .context("metrics server encountered an error")?;
        Ok(())
    });

    Ok(MetricsServer {
        addr,
        shutdown: Some(shutdown_tx),
        task,
    })
}

async fn metrics_handler(registry: SharedRegistry) -> impl IntoResponse {
    let families = registry.gather();
    let encoder = TextEncoder::new();
    match encoder.encode_to_string(&families) {
        Ok(body) => (
            StatusCode::OK,
            [(
                header::CONTENT_TYPE,
                HeaderValue::from_static(TEXT_FORMAT),
            )],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "failed to encode metrics");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                String::from("metrics encoding error"),
            )
                .into_response()
        }
    }
}

/// Handle to the running exporter.
#[derive(Debug)]
pub struct MetricsServer {
    addr: SocketAddr,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl MetricsServer {
    /// Bound address.
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    /// Signal shutdown and wait for the server task.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(join_err) => Err(anyhow::Error::new(join_err)),
        }
    }
}

/// Counters owned by the daemon process.
#[derive(Clone)]
pub struct DaemonMetrics {
    starts: IntCounter,
    connects: IntCounter,
    poll_failures: IntCounter,
}

impl DaemonMetrics {
    /// Create and register the daemon counters.
    pub fn new(registry: &Registry) -> Result<Self> {
        let starts = IntCounter::with_opts(Opts::new(
            "poolbusd_starts_total",
            "Times the daemon has initialised",
        ))?;
        let connects = IntCounter::with_opts(Opts::new(
            "poolbusd_connects_total",
            "Successful link connects, reconnects included",
        ))?;
        let poll_failures = IntCounter::with_opts(Opts::new(
            "poolbusd_poll_failures_total",
            "Device polls that ended in an error",
        ))?;
        registry.register(Box::new(starts.clone()))?;
        registry.register(Box::new(connects.clone()))?;
        registry.register(Box::new(poll_failures.clone()))?;
        Ok(Self {
            starts,
            connects,
            poll_failures,
        })
    }

    pub fn inc_start(&self) {
        self.starts.inc();
    }

    pub fn inc_connect(&self) {
        self.connects.inc();
    }

    pub fn add_poll_failures(&self, count: usize) {
        self.poll_failures.inc_by(count as u64);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn daemon_counters_register_once() {
        let registry = Registry::new();
        let metrics = DaemonMetrics::new(&registry).expect("register");
        metrics.inc_start();
        metrics.inc_connect();
        metrics.inc_connect();
        let families = registry.gather();
        let connects = families
            .iter()
            .find(|family| family.get_name() == "poolbusd_connects_total")
            .expect("connects");
        assert_eq!(connects.get_metric()[0].get_counter().get_value(), 2.0);
        assert!(DaemonMetrics::new(&registry).is_err());
    }

    #[tokio::test]
    async fn exporter_binds_and_shuts_down() {
        let registry: SharedRegistry = Arc::new(Registry::new());
        let server = spawn_http_server(registry, SocketAddr::from(([127, 0, 0, 1], 0)))
            .expect("spawn exporter");
        assert_ne!(server.addr().port(), 0);
        server.shutdown().await.expect("shutdown");
    }
}
