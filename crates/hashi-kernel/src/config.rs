//! Kernel configuration.
//!
//! Loaded from RON. Every field has a default, so `()` is a valid file:
//!
//! ```ron
//! (
//!     display: (
//!         graphic_width: "640px",
//!         graphic_height: "480px",
//!     ),
//!     iopub_capacity: 256,
//! )
//! ```

use std::path::Path;

use hashi_types::{KernelInfo, KernelSpec};
use serde::{Deserialize, Serialize};

/// Default broadcast capacity for side-channel notifications.
pub const DEFAULT_IOPUB_CAPACITY: usize = 1024;

/// Top-level configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HashiConfig {
    /// Static metadata answered to `kernel_info_request`.
    pub kernel_info: KernelInfo,
    /// Spec registered with the host.
    pub kernel_spec: KernelSpec,
    pub display: DisplayConfig,
    /// Broadcast capacity of the IOPub channel. Slow subscribers that fall
    /// further behind than this lose messages.
    pub iopub_capacity: usize,
}

impl Default for HashiConfig {
    fn default() -> Self {
        Self {
            kernel_info: KernelInfo::default(),
            kernel_spec: KernelSpec::default(),
            display: DisplayConfig::default(),
            iopub_capacity: DEFAULT_IOPUB_CAPACITY,
        }
    }
}

/// How display events become payloads.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Width forced onto vector-graphic roots.
    pub graphic_width: String,
    /// Height forced onto vector-graphic roots.
    pub graphic_height: String,
    /// Element id prefix for live-object mount points.
    pub output_id_prefix: String,
    /// Renderer-side global under which the value bus is reachable.
    pub bus_global: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            graphic_width: "480px".to_string(),
            graphic_height: "360px".to_string(),
            output_id_prefix: "hashi-output-".to_string(),
            bus_global: "valueBus".to_string(),
        }
    }
}

/// Errors loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("RON parse error: {0}")]
    Ron(#[from] ron::error::SpannedError),
    #[error("invalid config: {0}")]
    Invalid(String),
}

impl HashiConfig {
    /// Parse configuration from RON text.
    pub fn from_ron(text: &str) -> Result<Self, ConfigError> {
        let config: Self = ron::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Read configuration from a RON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config = Self::from_ron(&text)?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.iopub_capacity == 0 {
            return Err(ConfigError::Invalid("iopub_capacity must be > 0".to_string()));
        }
        if self.kernel_spec.name.is_empty() {
            return Err(ConfigError::Invalid("kernel_spec.name must not be empty".to_string()));
        }
        Ok(())
    }
}
