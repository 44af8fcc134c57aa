//! # Mirage Mux
//!
//! Multiplexes many reliable, ordered byte streams over one physical
//! connection and dresses every frame up as a TLS application-data record.
//!
//! ## Features
//!
//! - **Per-stream reassembly** of frames that arrive out of order, with
//!   32-bit sequence wraparound
//! - **Read/write/close streams** with a close handshake that cannot overtake
//!   in-flight writes
//! - **Close-frame padding** of randomized length so stream teardown does not
//!   stand out by size
//! - **Record disguise** so the wire looks like ordinary TLS traffic
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Application Layer                   │
//! │            (Stream::read / write / close)            │
//! ├─────────────────────────────────────────────────────┤
//! │                  Reassembly Layer                    │
//! │        (FrameSorter worker → BufferedPipe)           │
//! ├─────────────────────────────────────────────────────┤
//! │                  Session Layer                       │
//! │        (routing table, send path, recv loop)         │
//! ├─────────────────────────────────────────────────────┤
//! │                 Obfuscation Layer                    │
//! │           (TLS record disguise, padding)             │
//! ├─────────────────────────────────────────────────────┤
//! │                  Transport Layer                     │
//! │          (any AsyncRead + AsyncWrite pair)           │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod obfuscation;
pub mod tunnel;

pub use config::Config;
pub use tunnel::{Frame, Session, SessionRole, Stream};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default port for the demo server
pub const DEFAULT_PORT: u16 = 443;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for configuration and other crate-level setup.
///
/// Stream and session operations report [`tunnel::TunnelError`].
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}
