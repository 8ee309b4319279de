//! Runtime manager configuration.
//!
//! ```toml
//! [runtime]
//! default_scripts = ["scripts/util.lua", "scripts/contracts.lua"]
//! memory_limit = 67108864
//! load_network_bootstrap = true
//!
//! [capabilities]
//! max_exp_bits = 65536
//!
//! [logging]
//! logger_name = "JsRuntime"
//! ```

use crate::error::{RuntimeError, RuntimeResult};
use crate::runtime::RuntimeOptions;
use ate_capability::arith::DEFAULT_MAX_EXP_BITS;
use ate_capability::{CapabilitySurface, TracingLogger};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ManagerConfig {
    #[serde(default)]
    pub runtime: RuntimeSection,

    #[serde(default)]
    pub capabilities: CapabilitySection,

    #[serde(default)]
    pub logging: LoggingSection,
}

/// Settings applied to every runtime the manager creates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeSection {
    /// Script files loaded into every new runtime, in order.
    /// Relative paths resolve against the config file's directory.
    #[serde(default)]
    pub default_scripts: Vec<PathBuf>,

    /// Interpreter memory ceiling in bytes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_limit: Option<usize>,

    /// Load the `network` bootstrap script.
    #[serde(default = "default_true")]
    pub load_network_bootstrap: bool,
}

/// Capability limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilitySection {
    /// Widest result `Exp` may produce, in bits.
    #[serde(default = "default_max_exp_bits")]
    pub max_exp_bits: u64,
}

/// Script logging.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggingSection {
    /// Value of the `logger` field on every script log line.
    #[serde(default = "default_logger_name")]
    pub logger_name: String,
}

fn default_true() -> bool {
    true
}

fn default_max_exp_bits() -> u64 {
    DEFAULT_MAX_EXP_BITS
}

fn default_logger_name() -> String {
    "JsRuntime".to_string()
}

impl Default for RuntimeSection {
    fn default() -> Self {
        Self {
            default_scripts: Vec::new(),
            memory_limit: None,
            load_network_bootstrap: true,
        }
    }
}

impl Default for CapabilitySection {
    fn default() -> Self {
        Self {
            max_exp_bits: DEFAULT_MAX_EXP_BITS,
        }
    }
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            logger_name: default_logger_name(),
        }
    }
}

impl ManagerConfig {
    /// Load and validate a config file.
    ///
    /// Relative `default_scripts` entries are resolved against the file's
    /// directory.
    pub fn load(path: impl AsRef<Path>) -> RuntimeResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let mut config = Self::from_str(&content)?;

        if let Some(base) = path.parent() {
            for script in &mut config.runtime.default_scripts {
                if script.is_relative() {
                    *script = base.join(&*script);
                }
            }
        }
        Ok(config)
    }

    /// Parse and validate config text.
    pub fn from_str(content: &str) -> RuntimeResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no runtime could work with.
    pub fn validate(&self) -> RuntimeResult<()> {
        if self.capabilities.max_exp_bits == 0 {
            return Err(RuntimeError::InvalidConfig(
                "capabilities.max_exp_bits must be greater than zero".to_string(),
            ));
        }
        if self.runtime.memory_limit == Some(0) {
            return Err(RuntimeError::InvalidConfig(
                "runtime.memory_limit must be greater than zero".to_string(),
            ));
        }
        if self.logging.logger_name.trim().is_empty() {
            return Err(RuntimeError::InvalidConfig(
                "logging.logger_name must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// The capability surface described by this config.
    pub fn surface(&self) -> CapabilitySurface {
        CapabilitySurface::new(Arc::new(TracingLogger::new(self.logging.logger_name.clone())))
            .with_max_exp_bits(self.capabilities.max_exp_bits)
    }

    /// Per-runtime options described by this config.
    pub fn runtime_options(&self) -> RuntimeOptions {
        RuntimeOptions {
            memory_limit: self.runtime.memory_limit,
            load_network_bootstrap: self.runtime.load_network_bootstrap,
        }
    }
}
