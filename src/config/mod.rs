//! Configuration management

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Multiplexer tuning
    #[serde(default)]
    pub mux: MuxConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file
    pub fn load<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(content: &str) -> crate::Result<Self> {
        let config: Self = toml::from_str(content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> crate::Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| crate::Error::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings the multiplexer cannot run with
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.mux.validate()
    }
}

/// Multiplexer tuning shared by every stream of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MuxConfig {
    /// Capacity of each stream's inbound reassembly queue (frames)
    pub inbound_queue_capacity: usize,
    /// Smallest closing-frame padding (bytes, inclusive)
    pub close_padding_min: usize,
    /// Largest closing-frame padding (bytes, exclusive)
    pub close_padding_max: usize,
    /// Maximum number of concurrently open streams per session
    pub max_streams: usize,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            inbound_queue_capacity: 1024,
            close_padding_min: 300,
            close_padding_max: 500,
            max_streams: 1024,
        }
    }
}

impl MuxConfig {
    fn validate(&self) -> Result<(), crate::Error> {
        if self.inbound_queue_capacity == 0 {
            return Err(crate::Error::Config(
                "inbound_queue_capacity must be at least 1".to_string(),
            ));
        }
        if self.close_padding_min > self.close_padding_max {
            return Err(crate::Error::Config(format!(
                "close_padding_min ({}) exceeds close_padding_max ({})",
                self.close_padding_min, self.close_padding_max
            )));
        }
        if self.close_padding_max > crate::tunnel::MAX_PAYLOAD_SIZE {
            return Err(crate::Error::Config(format!(
                "close_padding_max ({}) exceeds the frame payload limit ({})",
                self.close_padding_max,
                crate::tunnel::MAX_PAYLOAD_SIZE
            )));
        }
        if self.max_streams == 0 {
            return Err(crate::Error::Config("max_streams must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Log format (pretty, compact)
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

/// Generate example configuration
pub fn generate_example_config() -> Config {
    Config::default()
}
