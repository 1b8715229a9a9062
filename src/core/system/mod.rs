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

//! System integration module
//!
//! This module ties memory, both on-chip caches and the fetch engine together.
//! The execution loop fetches through [`System::fetch`]; every store goes
//! through [`System::write`], which updates memory and then tells the fetch
//! engine what changed. Cache control goes through the system too, so blocks
//! made stale by a cache reconfiguration or purge are dropped.


use super::config::Config;
use super::cpu::CpuCore;
use super::error::Result;
use super::memory::{AccessSize, CacheMode, EvictedLine, Memory};
use super::prefetch::{create_fetcher, FetchOutcome, InstructionFetch, PrefetchStats};
use std::path::Path;

/// Dual SH-2 fetch front end
///
/// Integrates memory, caches and the fetch engine chosen by configuration.
///
/// # Components
/// - Memory: SDRAM, cartridge ROM, per-core boot ROMs
/// - Caches: one SH-2 on-chip cache per core
/// - Fetch engine: block prefetch or direct fetch
///
/// # Example
/// ```
/// use s32x::core::config::Config;
/// use s32x::core::cpu::CpuCore;
/// use s32x::core::system::System;
///
/// let mut system = System::new(Config::default())?;
/// system.load_sdram(0x400, &[0x00, 0x09, 0x00, 0x0B, 0x00, 0x09])?; // nop; rts; nop
///
/// let outcome = system.fetch(0x0600_0402, CpuCore::Secondary)?;
/// assert_eq!(outcome.opcode, 0x000B);
///
/// let slot = system.fetch_delay_slot(0x0600_0404, &outcome, CpuCore::Secondary)?;
/// assert_eq!(slot, 0x0009);
/// # Ok::<(), s32x::core::error::EmulatorError>(())
/// ```
pub struct System {
    /// Memory and caches
    memory: Memory,
    /// Fetch engine
    fetcher: Box<dyn InstructionFetch + Send>,
    /// Configuration the system was built from
    config: Config,
}

impl System {
    /// Create a new System instance
    ///
    /// Memory starts zeroed, both caches disabled and empty.
    ///
    /// # Errors
    ///
    /// Returns `EmulatorError::InvalidConfig` if the configuration is out of range
    pub fn new(config: Config) -> Result<Self> {
        let memory = Memory::new(&config)?;
        let fetcher = create_fetcher(&config);

        log::info!(
            "System: {} byte ROM, prefetch {}",
            config.memory.rom_size,
            if config.prefetch_enabled { "on" } else { "off" }
        );

        Ok(Self {
            memory,
            fetcher,
            config,
        })
    }

    /// Configuration the system was built from
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Memory and caches
    pub fn memory(&self) -> &Memory {
        &self.memory
    }

    /// Fetch the instruction at `pc` for `core`
    ///
    /// # Errors
    ///
    /// - `EmulatorError::UnmappedFetch` if no region claims `pc` (configuration fault)
    /// - `EmulatorError::UnalignedAccess` for an odd `pc`
    #[inline]
    pub fn fetch(&mut self, pc: u32, core: CpuCore) -> Result<FetchOutcome> {
        self.fetcher.fetch(&mut self.memory, pc, core)
    }

    /// Fetch a branch's delay slot from the block of a previous fetch
    ///
    /// # Errors
    ///
    /// Returns `EmulatorError::DelaySlotDesync` in debug builds if `pc` lies
    /// outside that block
    #[inline]
    pub fn fetch_delay_slot(&mut self, pc: u32, outcome: &FetchOutcome, core: CpuCore) -> Result<u16> {
        self.fetcher
            .fetch_delay_slot(&mut self.memory, pc, outcome, core)
    }

    /// Data read by `core`
    ///
    /// May fill a cache line; a displaced line invalidates the blocks it backed.
    pub fn read(&mut self, core: CpuCore, address: u32, size: AccessSize) -> Result<u32> {
        let read = self.memory.read(core, address, size)?;
        if let Some(line) = read.evicted {
            self.fetcher.invalidate_cache_prefetch(&self.memory, line);
        }
        Ok(read.value)
    }

    /// Store by `core`
    ///
    /// Memory (and any resident cache line) takes the value first, then the
    /// fetch engine drops blocks the store may have changed, on both cores
    /// for shared memory.
    pub fn write(&mut self, core: CpuCore, address: u32, value: u32, size: AccessSize) -> Result<()> {
        self.memory.write(core, address, value, size)?;
        self.fetcher.data_write(&self.memory, core, address, size);
        Ok(())
    }

    /// Enable or disable a core's cache (contents are kept)
    pub fn set_cache_enabled(&mut self, core: CpuCore, enabled: bool) {
        let cache = self.memory.cache_mut(core);
        if cache.config().enabled == enabled {
            return;
        }

        cache.set_enabled(enabled);
        log::debug!(
            "{} core cache {}",
            core,
            if enabled { "enabled" } else { "disabled" }
        );
        self.fetcher.cache_reconfigured(core);
    }

    /// Switch a core's cache associativity (contents are kept)
    pub fn set_cache_mode(&mut self, core: CpuCore, mode: CacheMode) {
        let cache = self.memory.cache_mut(core);
        if cache.config().mode == mode {
            return;
        }

        cache.set_mode(mode);
        log::debug!("{} core cache switched to {:?}", core, mode);
        self.fetcher.cache_reconfigured(core);
    }

    /// Discard every line of a core's cache
    pub fn purge_cache(&mut self, core: CpuCore) {
        let purged = self.memory.cache_mut(core).purge();
        log::debug!("{} core cache purged ({} lines)", core, purged.len());
        self.report_lines(core, purged);
    }

    /// Discard the line of a core's cache holding `address`, if resident
    pub fn purge_cache_line(&mut self, core: CpuCore, address: u32) {
        let address = self
            .memory
            .resolve(address, core)
            .map_or(address, |resolved| resolved.cache_address());
        if let Some(line) = self.memory.cache_mut(core).purge_line(address) {
            self.report_lines(core, [line]);
        }
    }

    /// Write a core's cache control register
    pub fn write_cache_control(&mut self, core: CpuCore, value: u8) {
        let cache = self.memory.cache_mut(core);
        let before = cache.config();
        let purged = cache.write_control(value);
        let reconfigured = cache.config() != before;

        self.report_lines(core, purged);
        if reconfigured {
            self.fetcher.cache_reconfigured(core);
        }
    }

    /// Read a core's cache control register
    pub fn read_cache_control(&self, core: CpuCore) -> u8 {
        self.memory.cache(core).read_control()
    }

    fn report_lines(&mut self, core: CpuCore, lines: impl IntoIterator<Item = u32>) {
        for address in lines {
            self.fetcher
                .invalidate_cache_prefetch(&self.memory, EvictedLine { core, address });
        }
    }

    /// Copy an image into SDRAM at `offset`
    pub fn load_sdram(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        self.memory.load_sdram(offset, data)?;
        self.flush_all();
        Ok(())
    }

    /// Copy a cartridge image into ROM
    pub fn load_rom(&mut self, data: &[u8]) -> Result<()> {
        self.memory.load_rom(data)?;
        self.flush_all();
        Ok(())
    }

    /// Copy a boot ROM image for one core
    pub fn load_boot_rom(&mut self, core: CpuCore, data: &[u8]) -> Result<()> {
        self.memory.load_boot_rom(core, data)?;
        self.flush_all();
        Ok(())
    }

    /// Load a cartridge image from a file
    ///
    /// # Example
    ///
    /// ```no_run
    /// use s32x::core::config::Config;
    /// use s32x::core::system::System;
    ///
    /// let mut system = System::new(Config::default()).unwrap();
    /// system.load_rom_file("game.32x").unwrap();
    /// ```
    pub fn load_rom_file(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let data = std::fs::read(path.as_ref())?;
        log::info!("Loading ROM: {}", path.as_ref().display());
        self.load_rom(&data)
    }

    /// Load an SDRAM image from a file at `offset`
    pub fn load_sdram_file(&mut self, path: impl AsRef<Path>, offset: usize) -> Result<()> {
        let data = std::fs::read(path.as_ref())?;
        log::info!(
            "Loading SDRAM image: {} at 0x{:05X}",
            path.as_ref().display(),
            offset
        );
        self.load_sdram(offset, &data)
    }

    /// Loads bypass the bus, so drop every cache line and block
    fn flush_all(&mut self) {
        for core in CpuCore::ALL {
            self.memory.cache_mut(core).purge();
        }
        self.fetcher.reset();
    }

    /// Frame boundary: log and fold the frame's fetch counters
    pub fn new_frame(&mut self) {
        self.fetcher.new_frame();
    }

    /// Fetch counters including the current frame
    pub fn stats(&self) -> PrefetchStats {
        self.fetcher.stats()
    }

    /// Fetch counters for the current frame
    pub fn frame_stats(&self) -> PrefetchStats {
        self.fetcher.frame_stats()
    }

    /// Fetch cycles charged to `core`
    pub fn fetch_cycles(&self, core: CpuCore) -> u64 {
        self.fetcher.cycles(core)
    }

    /// Number of valid blocks held for `core`
    pub fn block_count(&self, core: CpuCore) -> usize {
        self.fetcher.block_count(core)
    }

    /// Check every valid block against memory as its core would read it
    ///
    /// # Errors
    ///
    /// Returns `EmulatorError::CoherenceViolation` for the first stale word
    pub fn verify_coherence(&self) -> Result<()> {
        self.fetcher.verify(&self.memory)
    }
}
