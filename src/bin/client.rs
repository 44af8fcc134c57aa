//! Mirage Mux Client
//!
//! A demo client that:
//! - Connects to the echo server over TCP
//! - Opens several streams at once over one session
//! - Sends a message on each and checks the echo

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use mirage_mux::{
    config::{Config, LoggingConfig},
    obfuscation::RecordObfuscator,
    tunnel::{Session, SessionRole, Stream},
};
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;
use tracing::{debug, info};

/// Mirage Mux Client - multiplexed streams over disguised records
#[derive(Parser, Debug)]
#[command(name = "mirage-client")]
#[command(about = "Mirage Mux Client - multiplexed streams over disguised records")]
#[command(version)]
struct Args {
    /// Configuration file path (defaults are used if it does not exist)
    #[arg(short, long, default_value = "config.toml")]
    config: String,

    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:443")]
    server: String,

    /// Number of concurrent streams
    #[arg(short = 'n', long, default_value_t = 4)]
    streams: usize,

    /// Bytes to send on each stream
    #[arg(short, long, default_value_t = 64 * 1024)]
    bytes: usize,

    /// Print an example configuration and exit
    #[arg(long)]
    print_config: bool,

    /// Log level (trace, debug, info, warn, error); overrides config
    #[arg(short = 'v', long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if args.print_config {
        let example = mirage_mux::config::generate_example_config();
        println!("{}", toml::to_string_pretty(&example)?);
        return Ok(());
    }

    let config = if Path::new(&args.config).exists() {
        Config::load(&args.config).context("Failed to load configuration")?
    } else {
        Config::default()
    };

    init_logging(&config.logging, args.log_level.as_deref());

    let socket = TcpStream::connect(&args.server)
        .await
        .with_context(|| format!("Failed to connect to {}", args.server))?;
    socket.set_nodelay(true)?;
    let local = socket.local_addr()?;
    let remote = socket.peer_addr()?;
    let (reader, writer) = socket.into_split();

    let session = Session::new(
        SessionRole::Client,
        config.mux,
        RecordObfuscator::new(),
        writer,
    );
    session.set_addrs(local, remote);
    info!("Connected to {} from {}", remote, local);

    let inbound = session.clone();
    let inbound_task = tokio::spawn(async move { inbound.run_inbound(reader).await });

    let started = Instant::now();
    let mut tasks = Vec::with_capacity(args.streams);
    for _ in 0..args.streams {
        let stream = session.open_stream()?;
        tasks.push(tokio::spawn(exchange(stream, args.bytes)));
    }

    for task in tasks {
        task.await.context("Stream task panicked")??;
    }

    let elapsed = started.elapsed();
    info!(
        "Echoed {} bytes on {} streams in {:?}",
        args.bytes * args.streams,
        args.streams,
        elapsed
    );

    session.close().await;
    tokio::time::timeout(Duration::from_secs(5), inbound_task)
        .await
        .map_err(|_| anyhow!("Inbound loop did not stop"))?
        .context("Inbound task panicked")??;
    Ok(())
}

/// Send `len` bytes on `stream`, read the echo back and compare
async fn exchange(stream: Stream, len: usize) -> Result<()> {
    let id = stream.id();
    let message: Vec<u8> = (0..len).map(|i| (i as u32 ^ id) as u8).collect();

    let writer = stream.clone();
    let outgoing = message.clone();
    let send = tokio::spawn(async move { writer.write(&outgoing).await });

    let mut echoed = Vec::with_capacity(len);
    let mut buf = vec![0u8; 16 * 1024];
    while echoed.len() < len {
        let n = stream
            .read(&mut buf)
            .await
            .with_context(|| format!("Stream {} broke after {} bytes", id, echoed.len()))?;
        echoed.extend_from_slice(&buf[..n]);
    }
    send.await.context("Send task panicked")??;

    if echoed != message {
        bail!("Stream {} echo mismatch", id);
    }

    stream.close().await?;
    debug!(stream_id = id, "stream verified");
    Ok(())
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
