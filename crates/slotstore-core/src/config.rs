//! Store configuration
//!
//! Loaded from TOML. Every field has a default so an empty file (or no file)
//! yields a usable configuration:
//!
//! ```toml
//! mapped_memory = 20971520
//! grab_size = 1024
//!
//! [mapped_memory_per_store]
//! "nodestore.db" = 67108864
//!
//! [bricks]
//! refresh_threshold = 50000
//! ```

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::Path;

/// Default memory budget for mapped bricks, per store (20MB)
pub const DEFAULT_MAPPED_MEMORY: u64 = 20 * 1024 * 1024;

/// Default number of free ids moved between memory and the id file at once
pub const DEFAULT_GRAB_SIZE: usize = 1024;

/// Brick promotion/eviction tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrickPolicy {
    /// Row-window acquisitions between two brick refreshes
    pub refresh_threshold: u64,
    /// Hit-count divisor applied to mapped bricks on refresh
    pub mapped_decay: f64,
    /// Hit-count divisor applied to unmapped bricks on refresh
    pub unmapped_decay: f64,
    /// Upper bound on the number of bricks a file is divided into
    pub max_brick_count: usize,
}

impl Default for BrickPolicy {
    fn default() -> Self {
        Self {
            refresh_threshold: 50_000,
            mapped_decay: 1.15,
            unmapped_decay: 1.25,
            max_brick_count: 100_000,
        }
    }
}

/// Configuration shared by every store of a database directory
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Master switch; when false every access goes through row windows
    pub use_memory_mapped_buffers: bool,
    /// Default brick memory budget in bytes
    pub mapped_memory: u64,
    /// Id allocator batch size
    pub grab_size: usize,
    /// Data bytes per block in the property string store
    pub string_block_size: usize,
    /// Data bytes per block in the property array store
    pub array_block_size: usize,
    /// Data bytes per block in the relationship type name store
    pub type_name_block_size: usize,
    /// Budget overrides keyed by store file name
    pub mapped_memory_per_store: HashMap<String, u64>,
    /// Brick refresh tuning
    pub bricks: BrickPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            use_memory_mapped_buffers: true,
            mapped_memory: DEFAULT_MAPPED_MEMORY,
            grab_size: DEFAULT_GRAB_SIZE,
            string_block_size: 120,
            array_block_size: 120,
            type_name_block_size: 30,
            mapped_memory_per_store: HashMap::new(),
            bricks: BrickPolicy::default(),
        }
    }
}

impl StoreConfig {
    /// Parse a TOML document
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: StoreConfig =
            toml::from_str(content).map_err(|e| Error::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// Serialize back to TOML
    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::config(e.to_string()))
    }

    /// Configuration with brick mapping turned off
    pub fn without_mapping() -> Self {
        Self {
            use_memory_mapped_buffers: false,
            ..Self::default()
        }
    }

    /// Effective brick budget for the store file named `store_name`
    pub fn mapped_memory_for(&self, store_name: &str) -> u64 {
        if !self.use_memory_mapped_buffers {
            return 0;
        }
        self.mapped_memory_per_store
            .get(store_name)
            .copied()
            .unwrap_or(self.mapped_memory)
    }

    /// Reject values the engine cannot work with
    pub fn validate(&self) -> Result<()> {
        if self.grab_size == 0 {
            return Err(Error::config("grab_size must be > 0"));
        }
        if self.bricks.mapped_decay <= 1.0 || self.bricks.unmapped_decay <= 1.0 {
            return Err(Error::config("brick decay divisors must be > 1.0"));
        }
        if self.bricks.max_brick_count == 0 {
            return Err(Error::config("max_brick_count must be > 0"));
        }
        if self.string_block_size == 0 || self.array_block_size == 0 || self.type_name_block_size == 0
        {
            return Err(Error::config("dynamic block sizes must be > 0"));
        }
        Ok(())
    }
}
