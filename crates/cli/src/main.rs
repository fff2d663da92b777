use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use mesh_dns_domain::CliOverrides;
use mesh_dns_proxy::dns::{DnsProxy, UdpUpstream, Upstream};
use prometheus::Registry;
use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

mod bootstrap;

#[derive(Parser)]
#[command(name = "mesh-dns")]
#[command(version)]
#[command(about = "Embedded DNS proxy for service-mesh data planes")]
struct Cli {
    /// Configuration file path
    #[arg(short = 'c', long, value_name = "FILE")]
    config: Option<String>,

    /// Bind address
    #[arg(short = 'b', long)]
    bind: Option<String>,

    /// DNS port
    #[arg(short = 'p', long)]
    port: Option<u16>,

    /// Upstream resolver (host:port); defaults to the first system nameserver
    #[arg(short = 'u', long)]
    upstream: Option<String>,

    /// JSON record map, loaded at startup and reloaded on SIGHUP
    #[arg(short = 'm', long)]
    map_file: Option<String>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let overrides = CliOverrides {
        bind_address: cli.bind,
        port: cli.port,
        upstream_server: cli.upstream,
        map_file: cli.map_file,
        log_level: cli.log_level,
    };
    let config = bootstrap::load_config(cli.config.as_deref(), overrides)?;

    bootstrap::init_logging(&config);

    info!("Starting mesh-dns v{}", env!("CARGO_PKG_VERSION"));

    let bind_addr: SocketAddr =
        format!("{}:{}", config.server.bind_address, config.server.port).parse()?;
    let timeout = Duration::from_millis(config.dns.query_timeout_ms);

    let registry = Registry::new();
    let proxy = match &config.dns.upstream_server {
        Some(server) => {
            let upstream: Arc<dyn Upstream> =
                Arc::new(UdpUpstream::new(server.parse()?, timeout));
            Arc::new(DnsProxy::with_upstream(bind_addr, upstream, &registry)?)
        }
        None => Arc::new(DnsProxy::new(bind_addr, &registry)?),
    };

    if let Some(path) = config.dns.map_file.clone() {
        reload_from_file(&proxy, &path);
        spawn_sighup_reloader(proxy.clone(), path)?;
    }

    let stop = CancellationToken::new();
    spawn_shutdown_listener(stop.clone())?;

    proxy.start(stop).await?;
    Ok(())
}

fn spawn_shutdown_listener(stop: CancellationToken) -> anyhow::Result<()> {
    let mut sigterm = signal(SignalKind::terminate())?;
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("SIGINT received; shutting down"),
            _ = sigterm.recv() => info!("SIGTERM received; shutting down"),
        }
        stop.cancel();
    });
    Ok(())
}

fn spawn_sighup_reloader(proxy: Arc<DnsProxy>, path: String) -> anyhow::Result<()> {
    let mut sighup = signal(SignalKind::hangup())?;
    tokio::spawn(async move {
        while sighup.recv().await.is_some() {
            info!(map_file = %path, "SIGHUP received; reloading record map");
            reload_from_file(&proxy, &path);
        }
    });
    Ok(())
}

fn reload_from_file(proxy: &DnsProxy, path: &str) {
    match std::fs::File::open(path) {
        Ok(file) => {
            let reader = std::io::BufReader::new(file);
            if let Err(e) = proxy.reload_map(&CancellationToken::new(), reader) {
                error!(map_file = %path, error = %e, "Record map reload failed; keeping current table");
            }
        }
        Err(e) => error!(map_file = %path, error = %e, "Failed to open record map"),
    }
}
