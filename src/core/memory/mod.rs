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

//! Memory system shared by the two SH-2 cores
//!
//! The Memory owns every backing buffer the cores fetch from and both on-chip
//! caches. It resolves addresses into regions, routes reads through a core's
//! cache when the address is cache-eligible, and implements the bus side of
//! stores (write-through to backing memory, in-place update of resident
//! cache lines).
//!
//! # Memory Map
//!
//! | Address (cached / through)   | Region            | Size        | Access |
//! |------------------------------|-------------------|-------------|--------|
//! | 0x00000000 / 0x20000000      | Boot ROM (per core) | 16KB window | R only |
//! | 0x02000000 / 0x22000000      | Cartridge ROM     | config      | R only |
//! | 0x06000000 / 0x26000000      | SDRAM             | 256KB       | R/W    |
//! | 0xC0000000                   | Cache data array  | 4KB / 2KB   | R/W    |
//!
//! # Example
//!
//! ```
//! use s32x::core::config::Config;
//! use s32x::core::cpu::CpuCore;
//! use s32x::core::memory::{AccessSize, Memory};
//!
//! let mut memory = Memory::new(&Config::default())?;
//!
//! // Write through the cache-through alias
//! memory.write(CpuCore::Primary, 0x2600_0000, 0x1234_5678, AccessSize::Long)?;
//!
//! // Read back through the cached alias (cache disabled, so straight from SDRAM)
//! let read = memory.read(CpuCore::Primary, 0x0600_0000, AccessSize::Long)?;
//! assert_eq!(read.value, 0x1234_5678);
//! # Ok::<(), s32x::core::error::EmulatorError>(())
//! ```

use crate::core::config::{Config, DelayConfig};
use crate::core::cpu::CpuCore;
use crate::core::error::{EmulatorError, Result};

// Sub-modules
mod cache;
mod region;

// Re-export public types
pub use cache::{CacheConfig, CacheControl, CacheMode, CacheRead, Sh2Cache, CACHE_LINE_SIZE};
pub use region::{MemoryRegion, ResolvedAddress, CACHE_THROUGH_BIT};

/// Width of a bus access
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessSize {
    /// 8-bit access
    Byte,
    /// 16-bit access (one instruction word)
    Word,
    /// 32-bit access
    Long,
}

impl AccessSize {
    /// Access width in bytes
    #[inline(always)]
    pub const fn bytes(self) -> u32 {
        match self {
            AccessSize::Byte => 1,
            AccessSize::Word => 2,
            AccessSize::Long => 4,
        }
    }
}

impl TryFrom<u8> for AccessSize {
    type Error = EmulatorError;

    fn try_from(bytes: u8) -> Result<Self> {
        match bytes {
            1 => Ok(AccessSize::Byte),
            2 => Ok(AccessSize::Word),
            4 => Ok(AccessSize::Long),
            other => Err(EmulatorError::InvalidAccessSize(other)),
        }
    }
}

/// Cache line displaced by a fill, purge or flush
///
/// `address` is the line base in the cached alias, which is the address the
/// owning core's cached-fetch blocks were keyed under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EvictedLine {
    /// Core whose cache dropped the line
    pub core: CpuCore,
    /// Line base address (16-byte aligned)
    pub address: u32,
}

/// Result of a read that may have gone through a cache
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemoryRead {
    /// Value read, zero-extended
    pub value: u32,
    /// Valid line replaced to service the read
    pub evicted: Option<EvictedLine>,
}

/// Backing buffers, kept apart from the caches so a cache fill can borrow
/// them while the cache itself is borrowed mutably
struct Backing {
    /// SDRAM (256KB), shared by both cores
    sdram: Vec<u8>,
    /// Cartridge ROM, power-of-two sized
    rom: Vec<u8>,
    /// Boot ROM window per core
    boot_roms: [Vec<u8>; 2],
}

impl Backing {
    /// Buffer behind a region, or `None` for the cache data array
    fn buffer(&self, core: CpuCore, region: MemoryRegion) -> Option<&[u8]> {
        match region {
            MemoryRegion::BootRom => Some(&self.boot_roms[core.index()]),
            MemoryRegion::Rom => Some(&self.rom),
            MemoryRegion::SdRam => Some(&self.sdram),
            MemoryRegion::CacheDataArray => None,
        }
    }
}

/// Memory system for both cores
pub struct Memory {
    /// Backing buffers
    backing: Backing,

    /// On-chip cache per core
    caches: [Sh2Cache; 2],

    /// Access delay per region, in cycles
    delays: DelayConfig,
}

impl Memory {
    /// SDRAM size (256KB)
    pub const SDRAM_SIZE: usize = 256 * 1024;

    /// Boot ROM window size per core (16KB)
    pub const BOOT_ROM_SIZE: usize = 16 * 1024;

    /// Create a memory system from configuration
    ///
    /// All buffers start zeroed and both caches start disabled and empty.
    ///
    /// # Errors
    ///
    /// Returns `EmulatorError::InvalidConfig` if the configured ROM size is
    /// not a supported power of two.
    pub fn new(config: &Config) -> Result<Self> {
        config.validate()?;

        Ok(Self {
            backing: Backing {
                sdram: vec![0u8; Self::SDRAM_SIZE],
                rom: vec![0u8; config.memory.rom_size],
                boot_roms: [
                    vec![0u8; Self::BOOT_ROM_SIZE],
                    vec![0u8; Self::BOOT_ROM_SIZE],
                ],
            },
            caches: [Sh2Cache::new(), Sh2Cache::new()],
            delays: config.delays.clone(),
        })
    }

    /// Get a core's cache
    pub fn cache(&self, core: CpuCore) -> &Sh2Cache {
        &self.caches[core.index()]
    }

    /// Get a core's cache mutably
    ///
    /// Changing the cache configuration through this reference bypasses the
    /// fetch layer; prefer the `System` cache controls, which also demote
    /// blocks that the change made stale.
    pub fn cache_mut(&mut self, core: CpuCore) -> &mut Sh2Cache {
        &mut self.caches[core.index()]
    }

    /// Configured access delays
    pub fn delays(&self) -> &DelayConfig {
        &self.delays
    }

    /// Read through the owning core's view of memory
    ///
    /// Cache-eligible addresses go through the core's cache and may fill a
    /// line, displacing a valid one (reported in the result). Everything
    /// else reads the backing buffer directly.
    ///
    /// # Errors
    ///
    /// - `EmulatorError::UnalignedAccess` if the address is not aligned to `size`
    /// - `EmulatorError::InvalidMemoryAccess` if no region claims the address
    pub fn read(&mut self, core: CpuCore, address: u32, size: AccessSize) -> Result<MemoryRead> {
        check_alignment(address, size)?;
        let resolved = self
            .resolve(address, core)
            .ok_or(EmulatorError::InvalidMemoryAccess { address })?;
        Ok(self.read_resolved(core, &resolved, size))
    }

    /// Read an already resolved address (see [`Memory::read`])
    pub(crate) fn read_resolved(
        &mut self,
        core: CpuCore,
        resolved: &ResolvedAddress,
        size: AccessSize,
    ) -> MemoryRead {
        let cache = &mut self.caches[core.index()];
        let Some(buffer) = self.backing.buffer(core, resolved.region) else {
            return MemoryRead {
                value: cache.read_data_array(resolved.offset, size),
                evicted: None,
            };
        };

        if resolved.cache_eligible {
            let line_base = (resolved.offset as usize) & !(CACHE_LINE_SIZE - 1);
            let fill = || {
                let mut line = [0u8; CACHE_LINE_SIZE];
                line.copy_from_slice(&buffer[line_base..line_base + CACHE_LINE_SIZE]);
                line
            };

            if let Some(read) = cache.read(resolved.cache_address(), size, fill) {
                return MemoryRead {
                    value: read.value,
                    evicted: read.evicted.map(|address| EvictedLine { core, address }),
                };
            }
        }

        MemoryRead {
            value: read_be(buffer, resolved.offset as usize, size),
            evicted: None,
        }
    }

    /// Read what a core would see without disturbing its cache
    ///
    /// Cache-eligible addresses return the resident line's bytes if the line
    /// is present, and backing memory otherwise. No line is filled and no
    /// replacement state changes.
    pub fn read_direct(&self, core: CpuCore, address: u32, size: AccessSize) -> Result<u32> {
        check_alignment(address, size)?;
        let resolved = self
            .resolve(address, core)
            .ok_or(EmulatorError::InvalidMemoryAccess { address })?;

        let cache = &self.caches[core.index()];
        let Some(buffer) = self.backing.buffer(core, resolved.region) else {
            return Ok(cache.read_data_array(resolved.offset, size));
        };

        if resolved.cache_eligible {
            if let Some(value) = cache.direct_read(resolved.cache_address(), size) {
                return Ok(value);
            }
        }

        Ok(read_be(buffer, resolved.offset as usize, size))
    }

    /// Read backing memory, ignoring both caches
    pub fn read_raw(&self, core: CpuCore, address: u32, size: AccessSize) -> Result<u32> {
        check_alignment(address, size)?;
        let resolved = self
            .resolve(address, core)
            .ok_or(EmulatorError::InvalidMemoryAccess { address })?;

        match self.backing.buffer(core, resolved.region) {
            Some(buffer) => Ok(read_be(buffer, resolved.offset as usize, size)),
            None => Ok(self.caches[core.index()].read_data_array(resolved.offset, size)),
        }
    }

    /// Store from a core
    ///
    /// SDRAM writes land in the buffer and update any resident line holding
    /// the address in both cores' caches. ROM and boot ROM are read-only: the
    /// buffer is left alone but the writer's resident line still takes the
    /// value, as on hardware. Data-array writes go to the writer's cache RAM.
    ///
    /// Invalidating blocks is the caller's job (see `System::write`).
    ///
    /// # Returns
    ///
    /// The region that was written
    pub fn write(
        &mut self,
        core: CpuCore,
        address: u32,
        value: u32,
        size: AccessSize,
    ) -> Result<MemoryRegion> {
        check_alignment(address, size)?;
        let resolved = self
            .resolve(address, core)
            .ok_or(EmulatorError::InvalidMemoryAccess { address })?;
        let offset = resolved.offset as usize;
        let line_address = resolved.cache_address();

        match resolved.region {
            MemoryRegion::SdRam => {
                write_be(&mut self.backing.sdram, offset, value, size);
                self.caches[core.index()].write_through(line_address, value, size);
                self.caches[core.sibling().index()].write_through(line_address, value, size);
            }
            MemoryRegion::Rom | MemoryRegion::BootRom => {
                log::trace!(
                    "Attempt to write {:?} to read-only 0x{:08X} (ignored)",
                    size,
                    address
                );
                self.caches[core.index()].write_through(line_address, value, size);
            }
            MemoryRegion::CacheDataArray => {
                self.caches[core.index()].write_data_array(resolved.offset, value, size);
            }
        }

        Ok(resolved.region)
    }

    /// Copy an image into SDRAM at `offset`
    ///
    /// Bypasses caches and the fetch layer; load before fetching or go
    /// through `System::load_sdram`.
    pub fn load_sdram(&mut self, offset: usize, data: &[u8]) -> Result<()> {
        copy_image(&mut self.backing.sdram, offset, data)?;
        log::debug!("Loaded {} bytes into SDRAM at 0x{:05X}", data.len(), offset);
        Ok(())
    }

    /// Copy a cartridge image to the start of ROM
    pub fn load_rom(&mut self, data: &[u8]) -> Result<()> {
        copy_image(&mut self.backing.rom, 0, data)?;
        log::debug!("Loaded {} byte ROM image", data.len());
        Ok(())
    }

    /// Copy a boot ROM image into one core's boot ROM window
    pub fn load_boot_rom(&mut self, core: CpuCore, data: &[u8]) -> Result<()> {
        copy_image(&mut self.backing.boot_roms[core.index()], 0, data)?;
        log::debug!("Loaded {} byte boot ROM for {} core", data.len(), core);
        Ok(())
    }
}

/// Reject accesses not aligned to their size
#[inline(always)]
fn check_alignment(address: u32, size: AccessSize) -> Result<()> {
    if address % size.bytes() != 0 {
        return Err(EmulatorError::UnalignedAccess {
            address,
            size: size.bytes(),
        });
    }
    Ok(())
}

fn copy_image(buffer: &mut [u8], offset: usize, data: &[u8]) -> Result<()> {
    let capacity = buffer.len().saturating_sub(offset);
    if data.len() > capacity {
        return Err(EmulatorError::ImageTooLarge {
            size: data.len(),
            capacity,
        });
    }
    buffer[offset..offset + data.len()].copy_from_slice(data);
    Ok(())
}

/// Big-endian read of `size` bytes at `offset`
#[inline(always)]
pub(crate) fn read_be(buffer: &[u8], offset: usize, size: AccessSize) -> u32 {
    match size {
        AccessSize::Byte => buffer[offset] as u32,
        AccessSize::Word => u16::from_be_bytes([buffer[offset], buffer[offset + 1]]) as u32,
        AccessSize::Long => u32::from_be_bytes([
            buffer[offset],
            buffer[offset + 1],
            buffer[offset + 2],
            buffer[offset + 3],
        ]),
    }
}

/// Big-endian write of the low `size` bytes of `value` at `offset`
#[inline(always)]
pub(crate) fn write_be(buffer: &mut [u8], offset: usize, value: u32, size: AccessSize) {
    match size {
        AccessSize::Byte => buffer[offset] = value as u8,
        AccessSize::Word => {
            buffer[offset..offset + 2].copy_from_slice(&(value as u16).to_be_bytes())
        }
        AccessSize::Long => buffer[offset..offset + 4].copy_from_slice(&value.to_be_bytes()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory() -> Memory {
        Memory::new(&Config::default()).unwrap()
    }

    #[test]
    fn test_access_size_from_bytes() {
        assert_eq!(AccessSize::try_from(1).unwrap(), AccessSize::Byte);
        assert_eq!(AccessSize::try_from(2).unwrap(), AccessSize::Word);
        assert_eq!(AccessSize::try_from(4).unwrap(), AccessSize::Long);
        assert!(matches!(
            AccessSize::try_from(3),
            Err(EmulatorError::InvalidAccessSize(3))
        ));
    }

    #[test]
    fn test_sdram_aliases_share_buffer() {
        let mut mem = memory();

        mem.write(CpuCore::Primary, 0x0600_0100, 0xABCD, AccessSize::Word)
            .unwrap();

        assert_eq!(mem.read_raw(CpuCore::Primary, 0x2600_0100, AccessSize::Word).unwrap(), 0xABCD);
        // Mirrored every 256KB
        assert_eq!(mem.read_raw(CpuCore::Secondary, 0x0604_0100, AccessSize::Word).unwrap(), 0xABCD);
    }

    #[test]
    fn test_big_endian_layout() {
        let mut mem = memory();

        mem.write(CpuCore::Primary, 0x0600_0000, 0x1122_3344, AccessSize::Long)
            .unwrap();

        assert_eq!(mem.read_raw(CpuCore::Primary, 0x0600_0000, AccessSize::Byte).unwrap(), 0x11);
        assert_eq!(mem.read_raw(CpuCore::Primary, 0x0600_0002, AccessSize::Word).unwrap(), 0x3344);
    }

    #[test]
    fn test_unaligned_access_rejected() {
        let mut mem = memory();

        assert!(matches!(
            mem.read(CpuCore::Primary, 0x0600_0001, AccessSize::Word),
            Err(EmulatorError::UnalignedAccess { address: 0x0600_0001, size: 2 })
        ));
        assert!(matches!(
            mem.write(CpuCore::Primary, 0x0600_0002, 0, AccessSize::Long),
            Err(EmulatorError::UnalignedAccess { .. })
        ));
    }

    #[test]
    fn test_unmapped_access_rejected() {
        let mut mem = memory();

        assert!(matches!(
            mem.read(CpuCore::Primary, 0x2000_4000, AccessSize::Word),
            Err(EmulatorError::InvalidMemoryAccess { address: 0x2000_4000 })
        ));
    }

    #[test]
    fn test_rom_is_read_only() {
        let mut mem = memory();
        mem.load_rom(&[0x12, 0x34]).unwrap();

        let region = mem
            .write(CpuCore::Primary, 0x2200_0000, 0xFFFF, AccessSize::Word)
            .unwrap();

        assert_eq!(region, MemoryRegion::Rom);
        assert_eq!(mem.read_raw(CpuCore::Primary, 0x0200_0000, AccessSize::Word).unwrap(), 0x1234);
    }

    #[test]
    fn test_boot_roms_are_per_core() {
        let mut mem = memory();
        mem.load_boot_rom(CpuCore::Primary, &[0xAA, 0xAA]).unwrap();
        mem.load_boot_rom(CpuCore::Secondary, &[0x55, 0x55]).unwrap();

        assert_eq!(mem.read_raw(CpuCore::Primary, 0x0000_0000, AccessSize::Word).unwrap(), 0xAAAA);
        assert_eq!(mem.read_raw(CpuCore::Secondary, 0x0000_0000, AccessSize::Word).unwrap(), 0x5555);
    }

    #[test]
    fn test_load_image_too_large() {
        let mut mem = memory();
        let image = vec![0u8; Memory::BOOT_ROM_SIZE + 1];

        assert!(matches!(
            mem.load_boot_rom(CpuCore::Primary, &image),
            Err(EmulatorError::ImageTooLarge { .. })
        ));
        assert!(mem.load_sdram(Memory::SDRAM_SIZE - 2, &[0, 0, 0]).is_err());
    }

    #[test]
    fn test_cached_read_fills_and_reports_eviction() {
        let mut mem = memory();
        mem.cache_mut(CpuCore::Primary).set_enabled(true);

        // Five lines mapping to set 0 in four-way mode: the fifth evicts the first
        let lines = [0x0600_0000, 0x0600_0400, 0x0600_0800, 0x0600_0C00, 0x0600_1000];
        for (i, &address) in lines.iter().enumerate() {
            let read = mem.read(CpuCore::Primary, address, AccessSize::Word).unwrap();
            if i < 4 {
                assert_eq!(read.evicted, None);
            } else {
                assert_eq!(
                    read.evicted,
                    Some(EvictedLine {
                        core: CpuCore::Primary,
                        address: 0x0600_0000
                    })
                );
            }
        }
    }

    #[test]
    fn test_sdram_write_updates_both_caches() {
        let mut mem = memory();
        for core in CpuCore::ALL {
            mem.cache_mut(core).set_enabled(true);
            mem.read(core, 0x0600_0200, AccessSize::Word).unwrap();
        }

        mem.write(CpuCore::Primary, 0x2600_0200, 0x0028, AccessSize::Word)
            .unwrap();

        for core in CpuCore::ALL {
            assert_eq!(
                mem.cache(core).direct_read(0x0600_0200, AccessSize::Word),
                Some(0x0028)
            );
        }
    }

    #[test]
    fn test_mirrors_share_one_cache_line() {
        let mut mem = memory();
        mem.cache_mut(CpuCore::Primary).set_enabled(true);
        mem.load_sdram(0x100, &[0x00, 0x09]).unwrap();

        mem.read(CpuCore::Primary, 0x0604_0100, AccessSize::Word)
            .unwrap();
        assert_eq!(mem.cache(CpuCore::Primary).len(), 1);

        mem.write(CpuCore::Primary, 0x0600_0100, 0x0028, AccessSize::Word)
            .unwrap();
        assert_eq!(
            mem.cache(CpuCore::Primary)
                .direct_read(0x0600_0100, AccessSize::Word),
            Some(0x0028)
        );
        assert_eq!(
            mem.read_direct(CpuCore::Primary, 0x0604_0100, AccessSize::Word)
                .unwrap(),
            0x0028
        );
        assert_eq!(mem.cache(CpuCore::Primary).len(), 1);
    }

    #[test]
    fn test_read_direct_does_not_fill() {
        let mut mem = memory();
        mem.cache_mut(CpuCore::Primary).set_enabled(true);
        mem.load_sdram(0x300, &[0x00, 0x09]).unwrap();

        assert_eq!(mem.read_direct(CpuCore::Primary, 0x0600_0300, AccessSize::Word).unwrap(), 0x0009);
        assert!(mem.cache(CpuCore::Primary).is_empty());
    }
}
