//! Tunnel layer - multiplexed streams over one connection
//!
//! Provides:
//! - Frame encoding/decoding
//! - Per-stream reassembly of out-of-order frames
//! - Stream lifecycle (write/close exclusion, passive close, teardown)
//! - Session routing table and physical send/receive paths

mod frame;
mod pipe;
mod session;
mod sorter;
mod stream;

pub use frame::{Frame, FRAME_HEADER_SIZE, MAX_PAYLOAD_SIZE};
pub use pipe::BufferedPipe;
pub use session::{Session, SessionRole, WRITER_SHUTDOWN_TIMEOUT};
pub use sorter::{seq_before, unwrap_seq, FrameSorter, SortOutcome};
pub use stream::{SessionLink, Stream};

use crate::obfuscation::ObfuscationError;
use thiserror::Error;

/// Tunnel layer errors
#[derive(Debug, Error)]
pub enum TunnelError {
    #[error("broken stream")]
    BrokenStream,

    #[error("stream already closed")]
    AlreadyClosed,

    #[error("pipe closed")]
    PipeClosed,

    #[error("session closed")]
    SessionClosed,

    #[error("Too many open streams")]
    TooManyStreams,

    #[error("Frame too large: {0} > {1}")]
    FrameTooLarge(usize, usize),

    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    #[error("Obfuscation error: {0}")]
    Obfuscation(#[from] ObfuscationError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TunnelError> for std::io::Error {
    fn from(err: TunnelError) -> Self {
        use std::io::ErrorKind;

        match err {
            TunnelError::Io(e) => e,
            TunnelError::BrokenStream
            | TunnelError::AlreadyClosed
            | TunnelError::PipeClosed
            | TunnelError::SessionClosed => std::io::Error::new(ErrorKind::BrokenPipe, err),
            TunnelError::TooManyStreams => std::io::Error::new(ErrorKind::ConnectionRefused, err),
            TunnelError::FrameTooLarge(..)
            | TunnelError::InvalidFrame(_)
            | TunnelError::Obfuscation(_) => std::io::Error::new(ErrorKind::InvalidData, err),
        }
    }
}
