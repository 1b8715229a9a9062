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

//! SH-2 on-chip cache
//!
//! Each core carries a 4KB unified cache that the fetch layer reads through
//! for cache-eligible addresses.
//!
//! # Hardware Specifications
//!
//! - **Size**: 4KB data array (64 sets × 4 ways × 16-byte lines)
//! - **Organization**: 4-way set associative, or 2-way with ways 0-1 exposed as RAM
//! - **Replacement**: 6-bit pseudo-LRU per set
//! - **Indexing**: Address bits [9:4] select the set
//! - **Tag**: Address bits [28:10]
//! - **Writes**: Write-through; a write only updates a line that already holds the address
//!
//! Disabling the cache or switching its associativity never clears it. Lines
//! that were resident stay resident, stale or not, and become visible again
//! when the cache is re-enabled.
//!
//! # Example
//!
//! ```
//! use s32x::core::memory::{AccessSize, Sh2Cache};
//!
//! let mut cache = Sh2Cache::new();
//! cache.set_enabled(true);
//!
//! // Miss: the line is filled from the supplied bytes
//! let mut line = [0u8; 16];
//! line[0..2].copy_from_slice(&0x0009u16.to_be_bytes());
//! let read = cache.read(0x0600_0000, AccessSize::Word, || line).unwrap();
//! assert_eq!(read.value, 0x0009);
//!
//! // Hit: served without touching memory
//! assert_eq!(cache.direct_read(0x0600_0000, AccessSize::Word), Some(0x0009));
//! ```

use super::{read_be, write_be, AccessSize};
use bitflags::bitflags;

/// Cache line size in bytes
pub const CACHE_LINE_SIZE: usize = 16;

bitflags! {
    /// Cache control register (CCR)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct CacheControl: u8 {
        /// CE: cache enable
        const ENABLE = 1 << 0;
        /// ID: instruction replacement disable
        const NO_INSTRUCTION_FILL = 1 << 1;
        /// OD: data replacement disable
        const NO_DATA_FILL = 1 << 2;
        /// TW: two-way mode
        const TWO_WAY = 1 << 3;
        /// CP: purge (write-only, always reads back as 0)
        const PURGE = 1 << 4;
        /// W1-W0: way selected for address array access
        const WAY_SELECT = 0b1100_0000;
    }
}

/// Cache associativity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    /// All four ways cache
    #[default]
    FourWay,
    /// Ways 2-3 cache, ways 0-1 are on-chip RAM
    TwoWay,
}

impl CacheMode {
    /// Number of ways used for caching
    pub const fn ways(self) -> usize {
        match self {
            CacheMode::FourWay => 4,
            CacheMode::TwoWay => 2,
        }
    }

    /// First way used for caching
    const fn first_way(self) -> usize {
        match self {
            CacheMode::FourWay => 0,
            CacheMode::TwoWay => 2,
        }
    }
}

/// Enable flag and associativity of one cache
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CacheConfig {
    /// Cache is consulted by cached-alias accesses
    pub enabled: bool,
    /// Associativity
    pub mode: CacheMode,
}

impl CacheConfig {
    /// Number of ways used for caching
    pub fn ways(&self) -> usize {
        self.mode.ways()
    }
}

/// Outcome of a cache read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheRead {
    /// Value read
    pub value: u32,
    /// Base address of the valid line replaced to service a miss
    pub evicted: Option<u32>,
}

/// Tag half of one cache line; the bytes live in the data array
#[derive(Debug, Clone, Copy)]
struct CacheLine {
    /// Address bits [28:10]
    tag: u32,
    /// Valid bit
    valid: bool,
}

impl CacheLine {
    /// Create a new invalid cache line
    #[inline(always)]
    const fn new() -> Self {
        Self {
            tag: 0,
            valid: false,
        }
    }
}

/// SH-2 on-chip cache for one core
pub struct Sh2Cache {
    /// Tags, indexed by `way * SETS + set`
    lines: Vec<CacheLine>,

    /// Data array (4KB); way `w`, set `s` lives at `w << 10 | s << 4`
    ram: Vec<u8>,

    /// Pseudo-LRU bits per set
    lru: Vec<u8>,

    /// Control register, PURGE bit never stored
    control: CacheControl,
}

impl Sh2Cache {
    /// Number of ways
    const WAYS: usize = 4;

    /// Number of sets
    const SETS: usize = 64;

    /// Data array size (4KB)
    const DATA_ARRAY_SIZE: usize = Self::WAYS * Self::SETS * CACHE_LINE_SIZE;

    /// Bit mask for the set index (bits [9:4])
    const SET_MASK: u32 = 0x3F;

    /// Bit shift for the set index
    const SET_SHIFT: u32 = 4;

    /// Bit shift for the tag
    const TAG_SHIFT: u32 = 10;

    /// Physical address bits covered by the tag and index
    const ADDRESS_MASK: u32 = 0x1FFF_FFFF;

    /// Create a disabled, empty, four-way cache
    pub fn new() -> Self {
        Self {
            lines: vec![CacheLine::new(); Self::WAYS * Self::SETS],
            ram: vec![0u8; Self::DATA_ARRAY_SIZE],
            lru: vec![0u8; Self::SETS],
            control: CacheControl::empty(),
        }
    }

    #[inline(always)]
    fn set_index(address: u32) -> usize {
        ((address >> Self::SET_SHIFT) & Self::SET_MASK) as usize
    }

    #[inline(always)]
    fn tag(address: u32) -> u32 {
        (address & Self::ADDRESS_MASK) >> Self::TAG_SHIFT
    }

    #[inline(always)]
    fn line_address(tag: u32, set: usize) -> u32 {
        (tag << Self::TAG_SHIFT) | ((set as u32) << Self::SET_SHIFT)
    }

    #[inline(always)]
    fn ram_offset(way: usize, set: usize, address: u32) -> usize {
        (way << 10) | (set << 4) | ((address as usize) & (CACHE_LINE_SIZE - 1))
    }

    /// Current enable flag and associativity
    pub fn config(&self) -> CacheConfig {
        CacheConfig {
            enabled: self.control.contains(CacheControl::ENABLE),
            mode: if self.control.contains(CacheControl::TWO_WAY) {
                CacheMode::TwoWay
            } else {
                CacheMode::FourWay
            },
        }
    }

    /// Enable or disable the cache without touching its contents
    pub fn set_enabled(&mut self, enabled: bool) {
        self.control.set(CacheControl::ENABLE, enabled);
    }

    /// Switch associativity without touching its contents
    pub fn set_mode(&mut self, mode: CacheMode) {
        self.control
            .set(CacheControl::TWO_WAY, mode == CacheMode::TwoWay);
    }

    /// Read the cache control register
    pub fn read_control(&self) -> u8 {
        self.control.bits()
    }

    /// Write the cache control register
    ///
    /// # Returns
    ///
    /// Base addresses of valid lines discarded by a purge (CP bit set)
    pub fn write_control(&mut self, value: u8) -> Vec<u32> {
        let control = CacheControl::from_bits_truncate(value);
        self.control = control.difference(CacheControl::PURGE);

        log::trace!("CCR write: {value:02X}");
        log::trace!("  Cache enabled: {}", control.contains(CacheControl::ENABLE));
        log::trace!("  Two-way mode: {}", control.contains(CacheControl::TWO_WAY));
        log::trace!("  Cache purged: {}", control.contains(CacheControl::PURGE));

        if control.contains(CacheControl::PURGE) {
            self.purge()
        } else {
            Vec::new()
        }
    }

    /// Way holding `address`, searching only the ways the current mode caches with
    fn lookup(&self, address: u32) -> Option<usize> {
        let set = Self::set_index(address);
        let tag = Self::tag(address);

        (self.config().mode.first_way()..Self::WAYS)
            .rev()
            .find(|&way| {
                let line = &self.lines[way * Self::SETS + set];
                line.valid && line.tag == tag
            })
    }

    /// Read through the cache
    ///
    /// On a miss, the least recently used way of the set is replaced with the
    /// 16 bytes returned by `fill`. If that way held a valid line its base
    /// address is reported so dependants can be invalidated.
    ///
    /// # Returns
    ///
    /// `None` if the cache is disabled
    pub fn read(
        &mut self,
        address: u32,
        size: AccessSize,
        fill: impl FnOnce() -> [u8; CACHE_LINE_SIZE],
    ) -> Option<CacheRead> {
        if !self.control.contains(CacheControl::ENABLE) {
            return None;
        }

        let set = Self::set_index(address);

        if let Some(way) = self.lookup(address) {
            self.update_lru(way, set);
            return Some(CacheRead {
                value: read_be(&self.ram, Self::ram_offset(way, set, address), size),
                evicted: None,
            });
        }

        let way = self.victim(set);
        let slot = &mut self.lines[way * Self::SETS + set];
        let evicted = slot
            .valid
            .then(|| Self::line_address(slot.tag, set));
        *slot = CacheLine {
            tag: Self::tag(address),
            valid: true,
        };
        self.update_lru(way, set);

        let base = Self::ram_offset(way, set, 0);
        self.ram[base..base + CACHE_LINE_SIZE].copy_from_slice(&fill());

        Some(CacheRead {
            value: read_be(&self.ram, Self::ram_offset(way, set, address), size),
            evicted,
        })
    }

    /// Update the resident line holding `address`, if any
    ///
    /// Never fills on a miss. Does nothing while the cache is disabled.
    ///
    /// # Returns
    ///
    /// `true` if a resident line was updated
    pub fn write_through(&mut self, address: u32, value: u32, size: AccessSize) -> bool {
        if !self.control.contains(CacheControl::ENABLE) {
            return false;
        }

        match self.lookup(address) {
            Some(way) => {
                let set = Self::set_index(address);
                self.update_lru(way, set);
                write_be(&mut self.ram, Self::ram_offset(way, set, address), value, size);
                true
            }
            None => false,
        }
    }

    /// Read a resident line without filling or touching replacement state
    ///
    /// Works whether or not the cache is enabled.
    pub fn direct_read(&self, address: u32, size: AccessSize) -> Option<u32> {
        let way = self.lookup(address)?;
        let set = Self::set_index(address);
        Some(read_be(&self.ram, Self::ram_offset(way, set, address), size))
    }

    /// Discard every line without writing anything back
    ///
    /// # Returns
    ///
    /// Base addresses of the valid lines discarded
    pub fn purge(&mut self) -> Vec<u32> {
        let mut purged = Vec::new();
        for (index, line) in self.lines.iter_mut().enumerate() {
            if line.valid {
                purged.push(Self::line_address(line.tag, index % Self::SETS));
                line.valid = false;
            }
        }
        self.lru.fill(0);
        purged
    }

    /// Associative purge: discard the line holding `address`
    ///
    /// # Returns
    ///
    /// Base address of the discarded line, if one was resident
    pub fn purge_line(&mut self, address: u32) -> Option<u32> {
        let way = self.lookup(address)?;
        let set = Self::set_index(address);
        let line = &mut self.lines[way * Self::SETS + set];
        line.valid = false;
        Some(Self::line_address(line.tag, set))
    }

    /// Pick the way to replace in `set`
    fn victim(&self, set: usize) -> usize {
        let lru = self.lru[set];
        match self.config().mode {
            CacheMode::FourWay => {
                if lru & 0b111000 == 0b111000 {
                    0
                } else if lru & 0b100110 == 0b000110 {
                    1
                } else if lru & 0b010101 == 0b000001 {
                    2
                } else if lru & 0b001011 == 0 {
                    3
                } else {
                    0
                }
            }
            CacheMode::TwoWay => {
                if lru & 1 != 0 {
                    2
                } else {
                    3
                }
            }
        }
    }

    /// Mark `way` most recently used in `set`
    #[inline]
    fn update_lru(&mut self, way: usize, set: usize) {
        // Bit 5: 0 -> 1
        // Bit 4: 0 -> 2
        // Bit 3: 0 -> 3
        // Bit 2: 1 -> 2
        // Bit 1: 1 -> 3
        // Bit 0: 2 -> 3
        let (and_mask, or_mask) = match way {
            0 => (!0b111000, 0b000000),
            1 => (!0b000110, 0b100000),
            2 => (!0b000001, 0b010100),
            _ => (!0b000000, 0b001011),
        };

        self.lru[set] &= and_mask;
        self.lru[set] |= or_mask;
    }

    /// Mask of the data-array window (4KB four-way, 2KB two-way)
    pub fn data_array_mask(&self) -> u32 {
        match self.config().mode {
            CacheMode::FourWay => Self::DATA_ARRAY_SIZE as u32 - 1,
            CacheMode::TwoWay => (Self::DATA_ARRAY_SIZE / 2) as u32 - 1,
        }
    }

    /// Read the data array at a window offset
    pub fn read_data_array(&self, offset: u32, size: AccessSize) -> u32 {
        read_be(&self.ram, (offset & self.data_array_mask()) as usize, size)
    }

    /// Write the data array at a window offset
    pub fn write_data_array(&mut self, offset: u32, value: u32, size: AccessSize) {
        let offset = (offset & self.data_array_mask()) as usize;
        write_be(&mut self.ram, offset, value, size);
    }

    /// Number of valid lines
    pub fn len(&self) -> usize {
        self.lines.iter().filter(|line| line.valid).count()
    }

    /// True if no line is valid
    pub fn is_empty(&self) -> bool {
        self.lines.iter().all(|line| !line.valid)
    }
}

impl Default for Sh2Cache {
    fn default() -> Self {
        Self::new()
    }
}
