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

//! Memory region identification and address translation
//!
//! The SH-2 decodes the top three address bits as an access mode: `000`
//! goes through the cache, `001` bypasses it (cache-through), `110` reaches
//! the cache data array directly. Below that the 32X-style map picks a
//! backing buffer from the address prefix and mirrors it with a mask.

use self::MemoryRegion as Region;
use super::Memory;
use crate::core::cpu::CpuCore;

/// Address bit selecting the cache-through alias
pub const CACHE_THROUGH_BIT: u32 = 0x2000_0000;

/// Bits of an address kept verbatim in a slot key (region and alias)
const PREFIX_MASK: u32 = 0xFF00_0000;

/// Memory region identification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MemoryRegion {
    /// Per-core boot ROM
    BootRom,
    /// Cartridge ROM, mirrored by its power-of-two size
    Rom,
    /// SDRAM (256KB), mirrored, shared by both cores
    SdRam,
    /// On-chip cache data array exposed as RAM
    CacheDataArray,
}

impl MemoryRegion {
    /// True if a store by one core must be observed by the other
    #[inline(always)]
    pub fn is_shared(self) -> bool {
        matches!(self, MemoryRegion::SdRam)
    }

    /// True if the region has both a cached and a cache-through alias
    #[inline(always)]
    pub fn has_cache_alias(self) -> bool {
        !matches!(self, MemoryRegion::CacheDataArray)
    }
}

/// Address resolved against one core's view of memory
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedAddress {
    /// Address as issued
    pub address: u32,
    /// Backing region
    pub region: Region,
    /// Region-local byte offset (already masked)
    pub offset: u32,
    /// Region-local address mask
    pub mask: u32,
    /// Cycles one access costs
    pub delay: u32,
    /// Address uses the cache-through alias
    pub cache_through: bool,
    /// Access goes through the core's cache (cached alias and cache enabled)
    pub cache_eligible: bool,
}

impl ResolvedAddress {
    /// Key of the block slot for this address
    ///
    /// Mirrors of one location collapse to the same key; the cached and
    /// cache-through aliases stay distinct.
    #[inline(always)]
    pub fn slot_key(&self) -> u32 {
        (self.address & PREFIX_MASK) | self.offset
    }

    /// Address the on-chip cache tags this location by
    ///
    /// Every mirror and both aliases share one line.
    #[inline(always)]
    pub fn cache_address(&self) -> u32 {
        self.slot_key() & !CACHE_THROUGH_BIT
    }
}

impl Memory {
    /// Boot ROM lives below this offset in the 0x00/0x20 area
    const BOOT_ROM_LIMIT: u32 = Memory::BOOT_ROM_SIZE as u32;

    /// SDRAM mirror mask
    const SDRAM_MASK: u32 = Memory::SDRAM_SIZE as u32 - 1;

    /// Identify the region behind an address for one core
    ///
    /// The data-array window size depends on that core's cache mode, and
    /// cache eligibility on whether its cache is enabled.
    ///
    /// # Returns
    ///
    /// `None` if no region claims the address
    ///
    /// # Example
    ///
    /// ```
    /// use s32x::core::config::Config;
    /// use s32x::core::cpu::CpuCore;
    /// use s32x::core::memory::{Memory, MemoryRegion};
    ///
    /// let memory = Memory::new(&Config::default())?;
    ///
    /// let resolved = memory.resolve(0x2604_0010, CpuCore::Primary).unwrap();
    /// assert_eq!(resolved.region, MemoryRegion::SdRam);
    /// assert_eq!(resolved.offset, 0x10);
    /// assert!(resolved.cache_through);
    ///
    /// assert!(memory.resolve(0x2000_4000, CpuCore::Primary).is_none());
    /// # Ok::<(), s32x::core::error::EmulatorError>(())
    /// ```
    #[inline]
    pub fn resolve(&self, address: u32, core: CpuCore) -> Option<ResolvedAddress> {
        let cache = &self.caches[core.index()];

        let (region, mask) = match address >> 24 {
            0x00 | 0x20 if address & 0x00FF_FFFF < Self::BOOT_ROM_LIMIT => {
                (Region::BootRom, Self::BOOT_ROM_LIMIT - 1)
            }
            0x02 | 0x22 => (Region::Rom, self.backing.rom.len() as u32 - 1),
            0x06 | 0x26 => (Region::SdRam, Self::SDRAM_MASK),
            0xC0 => (Region::CacheDataArray, cache.data_array_mask()),
            _ => return None,
        };

        let cache_through = address & CACHE_THROUGH_BIT != 0;
        let cache_eligible =
            !cache_through && region.has_cache_alias() && cache.config().enabled;

        let delay = if cache_eligible {
            self.delays.cache_hit
        } else {
            match region {
                Region::BootRom => self.delays.boot_rom,
                Region::Rom => self.delays.rom,
                Region::SdRam => self.delays.sdram,
                Region::CacheDataArray => self.delays.cache_array,
            }
        };

        Some(ResolvedAddress {
            address,
            region,
            offset: address & mask,
            mask,
            delay,
            cache_through,
            cache_eligible,
        })
    }

    /// Identify the region behind an address, ignoring per-core state
    pub fn identify_region(&self, address: u32) -> Option<Region> {
        self.resolve(address, CpuCore::Primary)
            .map(|resolved| resolved.region)
    }
}
