//! Closing-frame padding for anti-fingerprinting

use crate::config::MuxConfig;
use bytes::Bytes;
use rand::{Rng, RngCore};

/// Padding carried by closing frames.
///
/// A closing frame has no data of its own; without padding it would be the
/// smallest frame a stream ever sends and would give away when streams end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClosePadding {
    /// Smallest padding length (inclusive)
    pub min: usize,
    /// Largest padding length (exclusive, unless equal to `min`)
    pub max: usize,
}

impl Default for ClosePadding {
    fn default() -> Self {
        Self { min: 300, max: 500 }
    }
}

impl From<&MuxConfig> for ClosePadding {
    fn from(config: &MuxConfig) -> Self {
        Self {
            min: config.close_padding_min,
            max: config.close_padding_max,
        }
    }
}

impl ClosePadding {
    /// Draw a padding length from a fresh random source
    pub fn padding_len(&self) -> usize {
        if self.max <= self.min {
            return self.min;
        }
        rand::rng().random_range(self.min..self.max)
    }

    /// Generate random padding bytes of a random length
    pub fn generate(&self) -> Bytes {
        let mut padding = vec![0u8; self.padding_len()];
        rand::rng().fill_bytes(&mut padding);
        Bytes::from(padding)
    }
}
