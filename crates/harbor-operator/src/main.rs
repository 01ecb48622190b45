//! `harbor-operator` binary
//!
//! Watches `Harbor` resources and creates the database, core, registry,
//! adminserver, jobservice, ingress and portal objects of each instance.

use anyhow::{Context, Result};
use clap::Parser;
use harbor_operator::controller;
use harbor_operator::crd::Harbor;
use harbor_operator::reconciler::ReconcilerSettings;
use kube::{Client, CustomResourceExt};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{error, info, warn, Level};
use tracing_subscriber::fmt::format::FmtSpan;

const LIVENESS_RESPONSE: &[u8] = b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nOK";

/// Command line, with environment fallbacks for in-cluster deployment
#[derive(Parser, Debug)]
#[command(name = "harbor-operator")]
#[command(about = "Kubernetes operator for Harbor container registries")]
#[command(version)]
struct Args {
    /// Listen address of the Prometheus scrape endpoint
    #[arg(long, env = "METRICS_ADDR", default_value = "0.0.0.0:8080")]
    metrics_addr: SocketAddr,

    /// Listen address of the liveness endpoint
    #[arg(long, env = "HEALTH_ADDR", default_value = "0.0.0.0:8081")]
    health_addr: SocketAddr,

    /// Only reconcile Harbor instances in this namespace
    #[arg(long, env = "WATCH_NAMESPACE", default_value = "")]
    namespace: String,

    /// Maximum tracing level
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: Level,

    /// Emit logs as JSON lines
    #[arg(long, env = "LOG_JSON", default_value = "false")]
    log_json: bool,

    /// Validity of issued certificates, in minutes
    #[arg(
        long,
        env = "CERT_VALIDITY_MINUTES",
        default_value = "60",
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    cert_validity_minutes: u64,

    /// Print the Harbor CRD as YAML and exit
    #[arg(long)]
    print_crd: bool,
}

impl Args {
    fn reconciler_settings(&self) -> ReconcilerSettings {
        ReconcilerSettings {
            cert_validity: Duration::from_secs(self.cert_validity_minutes * 60),
            ..Default::default()
        }
    }

    /// `None` watches Harbor instances in every namespace
    fn watch_namespace(&self) -> Option<String> {
        Some(self.namespace.clone()).filter(|ns| !ns.is_empty())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_crd {
        return print_crd();
    }

    install_subscriber(args.log_level, args.log_json);

    let namespace = args.watch_namespace();
    info!(
        version = env!("CARGO_PKG_VERSION"),
        namespace = namespace.as_deref().unwrap_or("all"),
        cert_validity_minutes = args.cert_validity_minutes,
        "harbor-operator starting"
    );

    install_prometheus(args.metrics_addr)?;
    tokio::spawn(serve_liveness(args.health_addr));

    let client = Client::try_default()
        .await
        .context("no usable kubeconfig or in-cluster service account")?;

    controller::run_controller(client, namespace, args.reconciler_settings())
        .await
        .context("Harbor controller stopped")
}

fn install_subscriber(level: Level, json: bool) {
    let subscriber = tracing_subscriber::fmt()
        .with_max_level(level)
        .with_span_events(FmtSpan::CLOSE)
        .with_target(true)
        .with_thread_ids(false)
        .with_line_number(false);

    if json {
        subscriber.json().init();
    } else {
        subscriber.init();
    }
}

/// Expose the `harbor_operator_*` counters and histogram for scraping
fn install_prometheus(addr: SocketAddr) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .with_context(|| format!("cannot serve Prometheus metrics on {addr}"))?;
    info!(address = %addr, "Serving reconciliation metrics");
    Ok(())
}

/// Answer every connection with `200 OK` while the controller runs
async fn serve_liveness(addr: SocketAddr) {
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!(address = %addr, error = %e, "Liveness endpoint unavailable");
            return;
        }
    };
    info!(address = %addr, "Serving liveness endpoint");

    loop {
        let mut socket = match listener.accept().await {
            Ok((socket, _)) => socket,
            Err(e) => {
                warn!(error = %e, "Dropped liveness connection");
                continue;
            }
        };
        tokio::spawn(async move {
            let mut buf = [0; 1024];
            if socket.read(&mut buf).await.is_ok() {
                let _ = socket.write_all(LIVENESS_RESPONSE).await;
            }
        });
    }
}

fn print_crd() -> Result<()> {
    print!("{}", serde_yaml::to_string(&Harbor::crd())?);
    Ok(())
}
