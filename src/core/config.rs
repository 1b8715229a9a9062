// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Emulator configuration
//!
//! Configuration is read from a TOML file. Every field has a default, so a
//! file only needs the values it overrides:
//!
//! ```toml
//! prefetch_enabled = true
//!
//! [memory]
//! rom_size = 0x400000
//!
//! [delays]
//! sdram = 12
//! rom = 31
//!
//! [prefetch]
//! history_limit = 4
//! ```

use crate::core::error::{EmulatorError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Environment variable naming a configuration file
pub const CONFIG_PATH_VAR: &str = "S32X_CONFIG";

/// Environment variable overriding `prefetch_enabled`
pub const PREFETCH_VAR: &str = "S32X_PREFETCH";

/// Top-level configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Route fetches through the block cache (false: straight through memory)
    pub prefetch_enabled: bool,
    /// Region sizes
    pub memory: MemoryConfig,
    /// Access delays per region
    pub delays: DelayConfig,
    /// Block cache tuning
    pub prefetch: PrefetchConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            prefetch_enabled: true,
            memory: MemoryConfig::default(),
            delays: DelayConfig::default(),
            prefetch: PrefetchConfig::default(),
        }
    }
}

/// Region sizes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Cartridge ROM size in bytes (power of two)
    pub rom_size: usize,
}

impl MemoryConfig {
    /// Smallest supported ROM (4KB)
    pub const MIN_ROM_SIZE: usize = 0x1000;

    /// Largest supported ROM (16MB, one address prefix)
    pub const MAX_ROM_SIZE: usize = 0x100_0000;
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            rom_size: 4 * 1024 * 1024,
        }
    }
}

/// Cycles charged for one access to each region
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DelayConfig {
    /// Boot ROM
    pub boot_rom: u32,
    /// Cartridge ROM
    pub rom: u32,
    /// SDRAM
    pub sdram: u32,
    /// Cache data array
    pub cache_array: u32,
    /// Any cache-eligible access
    pub cache_hit: u32,
}

impl Default for DelayConfig {
    fn default() -> Self {
        Self {
            boot_rom: 1,
            rom: 31,
            sdram: 12,
            cache_array: 1,
            cache_hit: 1,
        }
    }
}

/// Block cache tuning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrefetchConfig {
    /// Invalidated blocks kept per address for recycling
    pub history_limit: usize,
}

impl Default for PrefetchConfig {
    fn default() -> Self {
        Self { history_limit: 4 }
    }
}

impl Config {
    /// Check value ranges
    ///
    /// # Errors
    ///
    /// Returns `EmulatorError::InvalidConfig` describing the first bad value
    pub fn validate(&self) -> Result<()> {
        let rom_size = self.memory.rom_size;
        if !rom_size.is_power_of_two()
            || !(MemoryConfig::MIN_ROM_SIZE..=MemoryConfig::MAX_ROM_SIZE).contains(&rom_size)
        {
            return Err(EmulatorError::InvalidConfig(format!(
                "rom_size 0x{:X} must be a power of two between 0x{:X} and 0x{:X}",
                rom_size,
                MemoryConfig::MIN_ROM_SIZE,
                MemoryConfig::MAX_ROM_SIZE
            )));
        }

        if self.prefetch.history_limit == 0 {
            return Err(EmulatorError::InvalidConfig(
                "history_limit must be at least 1".to_string(),
            ));
        }

        Ok(())
    }

    /// Parse and validate a TOML document
    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config = Self::from_toml_str(&contents)?;
        log::debug!("Loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let contents = toml::to_string_pretty(self)
            .map_err(|e| EmulatorError::InvalidConfig(format!("Failed to serialize config: {}", e)))?;
        std::fs::write(path, contents)?;
        Ok(())
    }

    /// Build configuration from the environment
    ///
    /// Loads a `.env` file if one exists, then reads the file named by
    /// `S32X_CONFIG` (defaults otherwise) and applies `S32X_PREFETCH`.
    pub fn from_env() -> Result<Self> {
        if let Ok(path) = dotenvy::dotenv() {
            log::debug!("Loaded environment from {}", path.display());
        }

        let mut config = match std::env::var(CONFIG_PATH_VAR) {
            Ok(path) => Self::load(path)?,
            Err(_) => Self::default(),
        };

        if let Ok(value) = std::env::var(PREFETCH_VAR) {
            config.prefetch_enabled = parse_flag(&value).ok_or_else(|| {
                EmulatorError::InvalidConfig(format!("{PREFETCH_VAR}={value} is not a boolean"))
            })?;
        }

        config.validate()?;
        Ok(config)
    }
}

/// Parse a boolean environment value
fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert!(config.prefetch_enabled);
        assert_eq!(config.prefetch.history_limit, 4);
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = Config::from_toml_str(
            r#"
            prefetch_enabled = false

            [delays]
            sdram = 7
            "#,
        )
        .unwrap();

        assert!(!config.prefetch_enabled);
        assert_eq!(config.delays.sdram, 7);
        assert_eq!(config.delays.rom, DelayConfig::default().rom);
        assert_eq!(config.memory, MemoryConfig::default());
    }

    #[test]
    fn test_invalid_rom_size() {
        let err = Config::from_toml_str("[memory]\nrom_size = 3000\n").unwrap_err();
        assert!(matches!(err, EmulatorError::InvalidConfig(_)));
    }

    #[test]
    fn test_zero_history_limit() {
        let err = Config::from_toml_str("[prefetch]\nhistory_limit = 0\n").unwrap_err();
        assert!(matches!(err, EmulatorError::InvalidConfig(_)));
    }

    #[test]
    fn test_malformed_toml() {
        let err = Config::from_toml_str("prefetch_enabled = maybe").unwrap_err();
        assert!(matches!(err, EmulatorError::ConfigParse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[memory]\nrom_size = 0x100000").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.memory.rom_size, 0x10_0000);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s32x.toml");

        let mut config = Config::default();
        config.delays.cache_hit = 2;
        config.prefetch.history_limit = 8;
        config.save(&path).unwrap();

        assert_eq!(Config::load(&path).unwrap(), config);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(dir.path().join("missing.toml")).unwrap_err();
        assert!(matches!(err, EmulatorError::Io(_)));
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("TRUE"), Some(true));
        assert_eq!(parse_flag(" 0 "), Some(false));
        assert_eq!(parse_flag("perhaps"), None);
    }
}
