use clap::{Args, Parser, Subcommand};
use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use relayproxy::adapters::{ProxyListener, ReqwestRelayClient, SessionTracker};
use relayproxy::config::{Config, StoredConfig, DEFAULT_PORT};
use relayproxy::domain::{ProxyError, TunnelBridge};

#[derive(Parser, Debug)]
#[command(version = env!("RELAYPROXY_VERSION"), author = env!("CARGO_PKG_AUTHORS"))]
pub struct Opts {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Launch the local HTTP proxy that forwards CONNECT tunnels to the relay
    Run(RunOpts),
}

#[derive(Args, Debug)]
struct RunOpts {
    /// JSON config file with port, address and uuid; overrides those flags
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address of the remote relay, e.g. https://relay.example.net/
    #[arg(long)]
    address: Option<String>,

    /// Local port of the HTTP proxy
    #[arg(long, default_value = DEFAULT_PORT)]
    port: String,

    /// Tunnel credential sent to the relay
    #[arg(long)]
    uuid: Option<String>,

    /// Save port, address and uuid to ./config.json
    #[arg(long)]
    save: bool,

    /// Listen on this network address
    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    /// Seconds to wait for the relay connection to open
    #[arg(long, default_value_t = 10)]
    connect_timeout: u64,
}

impl RunOpts {
    fn stored_config(&self) -> Result<StoredConfig, ProxyError> {
        if let Some(path) = &self.config {
            return StoredConfig::load(path);
        }

        let address = self
            .address
            .clone()
            .ok_or_else(|| ProxyError::Config("--address is required without --config".into()))?;
        let uuid = self
            .uuid
            .clone()
            .ok_or_else(|| ProxyError::Config("--uuid is required without --config".into()))?;

        Ok(StoredConfig {
            port: self.port.clone(),
            address,
            uuid,
        })
    }

    fn resolve(&self) -> Result<Config, ProxyError> {
        let stored = self.stored_config()?;
        let config = stored
            .resolve()?
            .with_listen_host(self.host)
            .with_connect_timeout(Duration::from_secs(self.connect_timeout));

        if self.save && self.config.is_none() {
            let path = Path::new("./config.json");
            stored.save(path)?;
            info!("saved configuration to {}", path.display());
        }

        Ok(config)
    }
}

fn raise_fd_limit() {
    match rlimit::increase_nofile_limit(u64::MAX) {
        Ok(limit) => log::debug!("open file limit set to {}", limit),
        Err(e) => warn!("failed to raise open file limit: {}", e),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let opts = Opts::parse();
    let Command::Run(run) = opts.command;

    // The listener only ever sees a fully resolved configuration
    let config = Arc::new(run.resolve()?);
    info!(
        relay = %config.relay_address,
        "relayproxy {} starting on {}:{}",
        env!("RELAYPROXY_VERSION"),
        config.listen_host,
        config.listen_port
    );

    raise_fd_limit();

    let tracker = Arc::new(SessionTracker::new());
    tracker.start_cleanup();

    let relay = Arc::new(ReqwestRelayClient::new(&config)?);
    let bridge = Arc::new(TunnelBridge::new(config.clone(), relay, tracker));

    let listener = ProxyListener::bind(config, bridge).await?;
    listener.run().await?;

    Ok(())
}
