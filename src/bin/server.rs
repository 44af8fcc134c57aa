//! Mirage Mux Echo Server
//!
//! A demo server that:
//! - Accepts TCP connections
//! - Runs one multiplexing session per connection
//! - Echoes every stream back to the client until it closes

use anyhow::{Context, Result};
use clap::Parser;
use mirage_mux::{
    config::{Config, LoggingConfig},
    obfuscation::RecordObfuscator,
    tunnel::{Session, SessionRole, Stream},
    DEFAULT_PORT,
};
use std::path::Path;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info, warn};

/// Mirage Mux Echo Server - multiplexed streams over disguised records
#[derive(Parser, Debug)]
#[command(name = "mirage-server")]
#[command(about = "Mirage Mux Echo Server - multiplexed streams over disguised records")]
#[command(version)]
struct Args {
    /// Configuration file path (defaults are used if it does not exist)
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Listen address
    #[arg(short, long)]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error); overrides config
    #[arg(short = 'v', long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = if Path::new(&args.config).exists() {
        Config::load(&args.config).context("Failed to load configuration")?
    } else {
        Config::default()
    };

    init_logging(&config.logging, args.log_level.as_deref());

    let listen = args
        .listen
        .unwrap_or_else(|| format!("0.0.0.0:{}", DEFAULT_PORT));
    let listener = TcpListener::bind(&listen)
        .await
        .with_context(|| format!("Failed to bind {}", listen))?;
    info!("Echo server listening on {}", listener.local_addr()?);

    loop {
        let (socket, peer) = match listener.accept().await {
            Ok(accepted) => accepted,
            Err(e) => {
                warn!("Accept failed: {}", e);
                continue;
            }
        };
        info!("Connection from {}", peer);

        let config = config.clone();
        tokio::spawn(async move {
            if let Err(e) = serve_connection(socket, config).await {
                error!("Session with {} failed: {:#}", peer, e);
            }
            info!("Connection from {} finished", peer);
        });
    }
}

/// Run one session over an accepted connection
async fn serve_connection(socket: TcpStream, config: Config) -> Result<()> {
    let local = socket.local_addr()?;
    let remote = socket.peer_addr()?;
    socket.set_nodelay(true)?;
    let (reader, writer) = socket.into_split();

    let session = Session::new(
        SessionRole::Server,
        config.mux,
        RecordObfuscator::new(),
        writer,
    );
    session.set_addrs(local, remote);

    let acceptor = session.clone();
    tokio::spawn(async move {
        while let Some(stream) = acceptor.accept().await {
            tokio::spawn(echo(stream));
        }
    });

    session
        .run_inbound(reader)
        .await
        .context("Inbound loop failed")
}

/// Write back everything read from `stream`, then close it
async fn echo(stream: Stream) {
    let id = stream.id();
    let mut reader = stream.clone();
    let mut writer = stream;

    match tokio::io::copy(&mut reader, &mut writer).await {
        Ok(total) => debug!(stream_id = id, bytes = total, "echo finished"),
        Err(e) => debug!(stream_id = id, "echo failed: {}", e),
    }

    // The peer normally closed first, which shutdown tolerates
    if let Err(e) = writer.shutdown().await {
        debug!(stream_id = id, "echo close failed: {}", e);
    }
}

fn init_logging(logging: &LoggingConfig, override_level: Option<&str>) {
    let level = override_level.unwrap_or(&logging.level);
    let builder = tracing_subscriber::fmt().with_env_filter(level);
    if logging.format == "compact" {
        builder.compact().init();
    } else {
        builder.init();
    }
}
