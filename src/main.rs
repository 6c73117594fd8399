//! wsmux: multiplexed RPC over one websocket per UI client
//!
//! Serves `/ws` for UI clients. Each client connects with a `stableid`
//! query parameter that survives reconnects; RPC traffic on the socket is
//! routed to the in-process command handlers.
//!
//! Usage:
//!   wsmux                                  # Default port 1719, random auth key
//!   wsmux --port 0                         # OS-assigned port
//!   wsmux --auth-key mysecret              # Fixed auth key (or WSMUX_AUTH_KEY)
//!   wsmux --no-auth                        # Accept any client

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;
use wsmux_server::{AuthKeyValidator, CoreHandler, HandlerTable, TrustedRouter, WsEventBus};
use wsmux_transport::{TransportConfig, TransportDeps, TransportServer};

#[derive(Parser, Debug)]
#[command(name = "wsmux", about = "wsmux websocket RPC multiplexer")]
struct Cli {
    /// Port to listen on (0 for OS-assigned)
    #[arg(long, default_value = "1719")]
    port: u16,

    /// Hostname to bind to
    #[arg(long, default_value = "127.0.0.1")]
    hostname: String,

    /// Auth key clients must present (random if not provided)
    #[arg(long, env = "WSMUX_AUTH_KEY")]
    auth_key: Option<String>,

    /// Accept clients without an auth key
    #[arg(long, conflicts_with = "auth_key")]
    no_auth: bool,

    /// Coalescing window for outbound data messages, in milliseconds
    #[arg(long, default_value = "16")]
    batch_window_ms: u64,

    /// Capacity of each connection's outbound queue
    #[arg(long, default_value = "128")]
    channel_size: usize,

    /// Enable verbose logging
    #[arg(long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,

    /// Write logs to a file
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Shut down when stdin reaches EOF (parent process gone)
    #[arg(long)]
    exit_on_stdin_eof: bool,
}

impl Cli {
    fn transport_config(&self) -> TransportConfig {
        TransportConfig {
            port: self.port,
            hostname: self.hostname.clone(),
            batch_window: Duration::from_millis(self.batch_window_ms),
            channel_size: self.channel_size.max(1),
            ..TransportConfig::default()
        }
    }
}

fn init_tracing(cli: &Cli) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        if cli.verbose {
            EnvFilter::new("debug")
        } else {
            EnvFilter::new("info")
        }
    });

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    match (&cli.log_file, cli.log_json) {
        (Some(path), json) => {
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .with_context(|| format!("creating log directory {}", parent.display()))?;
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("opening log file {}", path.display()))?;
            let builder = builder.with_writer(std::sync::Mutex::new(file)).with_ansi(false);
            if json {
                builder.json().init();
            } else {
                builder.init();
            }
            eprintln!("Logging to {}", path.display());
        }
        (None, true) => builder.json().init(),
        (None, false) => builder.init(),
    }
    Ok(())
}

fn resolve_auth_key(cli: &Cli) -> String {
    if cli.no_auth {
        return String::new();
    }
    match &cli.auth_key {
        Some(key) => key.clone(),
        None => {
            use rand::Rng;
            let bytes: [u8; 32] = rand::rng().random();
            hex::encode(bytes)
        }
    }
}

/// Resolves once stdin hits EOF or errors.
async fn stdin_closed() {
    let (tx, rx) = tokio::sync::oneshot::channel::<()>();
    std::thread::spawn(move || {
        use std::io::Read;
        let mut buf = [0u8; 1];
        loop {
            match std::io::stdin().read(&mut buf) {
                Ok(0) | Err(_) => {
                    let _ = tx.send(());
                    return;
                }
                Ok(_) => continue,
            }
        }
    });
    let _ = rx.await;
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli)?;

    let auth_key = resolve_auth_key(&cli);
    let handlers = HandlerTable::new().with(CoreHandler);
    let deps = TransportDeps {
        router: Arc::new(TrustedRouter::new(handlers)),
        auth: Arc::new(AuthKeyValidator::new(auth_key.clone())),
        event_bus: Arc::new(WsEventBus::new()),
    };

    let mut transport = TransportServer::start(cli.transport_config(), deps)
        .await
        .context("failed to start transport")?;
    let ws_url = format!("ws://{}:{}/ws", cli.hostname, transport.port());
    info!(url = %ws_url, auth = !auth_key.is_empty(), "wsmux ready");

    println!("────────────────────────────────────────────────────────────────");
    println!();
    println!("  WebSocket endpoint:");
    println!("    {ws_url}?stableid=<id>");
    println!();
    if auth_key.is_empty() {
        println!("  Auth: disabled");
    } else {
        println!("  Auth key (X-AuthKey header or authkey query):");
        println!("    {auth_key}");
    }
    println!();
    println!("  Press Ctrl+C to stop.");
    println!("────────────────────────────────────────────────────────────────");

    if cli.exit_on_stdin_eof {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {}
            _ = stdin_closed() => info!("stdin closed, shutting down"),
        }
    } else {
        tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    }

    transport.stop().await;
    Ok(())
}
