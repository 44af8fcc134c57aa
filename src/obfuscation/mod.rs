//! Traffic obfuscation layer
//!
//! Provides:
//! - TLS record disguise for every frame
//! - Closing-frame padding
//!
//! ## Why records
//!
//! A censor looking at the connection should see what looks like an
//! established TLS session: a run of application-data records whose sizes
//! follow the payload, with nothing that marks multiplexer control traffic.
//! The disguise is framing only. Confidentiality is the job of whatever
//! encrypts the records below this layer.

mod padding;
mod record;

pub use padding::ClosePadding;
pub use record::{read_record, RecordObfuscator, MAX_RECORD_BODY, RECORD_HEADER_SIZE};

use crate::tunnel::Frame;
use bytes::Bytes;
use thiserror::Error;

/// Obfuscation errors
#[derive(Debug, Error)]
pub enum ObfuscationError {
    #[error("Unexpected record content type: {0:#04x}")]
    UnexpectedContentType(u8),

    #[error("Unsupported record version: {0:#06x}")]
    UnsupportedVersion(u16),

    #[error("Record length mismatch: header says {declared}, got {actual}")]
    LengthMismatch { declared: usize, actual: usize },

    #[error("Record too large: {0} bytes")]
    RecordTooLarge(usize),

    #[error("Truncated record: {0} bytes")]
    Truncated(usize),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),
}

/// Turns logical frames into wire bytes and back
pub trait Obfuscator: Send + Sync {
    /// Wrap a frame into one complete record
    fn obfuscate(&self, frame: &Frame) -> Result<Bytes, ObfuscationError>;

    /// Recover the frame from one complete record
    fn deobfuscate(&self, record: &[u8]) -> Result<Frame, ObfuscationError>;
}
