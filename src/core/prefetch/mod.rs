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

//! Instruction fetch engines
//!
//! The execution loop asks for one instruction word per step. Two engines
//! answer, picked once from configuration:
//!
//! - [`DirectFetch`]: every fetch goes through memory (and the core's cache)
//! - [`BlockFetch`]: fetches are served from pre-scanned blocks of words,
//!   which stores and cache-line evictions invalidate
//!
//! # Example
//!
//! ```
//! use s32x::core::config::Config;
//! use s32x::core::cpu::CpuCore;
//! use s32x::core::memory::Memory;
//! use s32x::core::prefetch::{BlockFetch, InstructionFetch};
//!
//! let config = Config::default();
//! let mut memory = Memory::new(&config)?;
//! memory.load_sdram(0x100, &[0x00, 0x09, 0x00, 0x0B, 0x00, 0x09])?; // nop; rts; nop
//!
//! let mut fetcher = BlockFetch::new(&config);
//! let outcome = fetcher.fetch(&mut memory, 0x0600_0100, CpuCore::Primary)?;
//! assert_eq!(outcome.opcode, 0x0009);
//! assert_eq!(outcome.block.unwrap().len(), 3);
//! # Ok::<(), s32x::core::error::EmulatorError>(())
//! ```

mod block;
mod engine;
mod invalidate;
mod store;


pub use block::{hash_words, Block, BlockEnd, BlockView};
pub use engine::BlockFetch;

use crate::core::config::Config;
use crate::core::cpu::CpuCore;
use crate::core::error::{EmulatorError, Result};
use crate::core::memory::{AccessSize, EvictedLine, Memory, ResolvedAddress};

/// Longest block a scan produces, in words
pub const MAX_BLOCK_WORDS: usize = 32;

/// Bytes scanned backwards from a store for blocks it may overlap
pub const INVALIDATION_WINDOW: u32 = (MAX_BLOCK_WORDS * 2) as u32;

/// Address bits compared by [`intersects`]
pub const INTERSECT_MASK: u32 = 0x0FFF_FFFF;

/// True if the inclusive ranges `[a_start, a_end]` and `[b_start, b_end]`
/// overlap, comparing the low 28 address bits only
#[inline(always)]
pub fn intersects(a_start: u32, a_end: u32, b_start: u32, b_end: u32) -> bool {
    !((a_start & INTERSECT_MASK) > (b_end & INTERSECT_MASK)
        || (a_end & INTERSECT_MASK) < (b_start & INTERSECT_MASK))
}

/// Answer to one `fetch`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchOutcome {
    /// PC as requested
    pub pc: u32,
    /// Instruction word at `pc`
    pub opcode: u16,
    /// Block the word came from (block engine only)
    pub block: Option<BlockView>,
    /// Cycles the fetch cost
    pub cycles: u32,
}

/// Block cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PrefetchStats {
    /// Fetches served by a current block
    pub hits: u64,
    /// Fetches that had to scan
    pub misses: u64,
    /// Scans that revived a block from history
    pub recycled: u64,
    /// Hash matches whose words differed
    pub collisions: u64,
    /// Blocks demoted by stores, evictions or cache reconfiguration
    pub invalidations: u64,
    /// Cache lines reported evicted or purged
    pub evictions: u64,
    /// Delay-slot fetches outside the block they were paired with
    pub desyncs: u64,
}

impl PrefetchStats {
    /// Add another set of counters into this one
    pub fn accumulate(&mut self, other: &PrefetchStats) {
        self.hits += other.hits;
        self.misses += other.misses;
        self.recycled += other.recycled;
        self.collisions += other.collisions;
        self.invalidations += other.invalidations;
        self.evictions += other.evictions;
        self.desyncs += other.desyncs;
    }

    /// Share of fetches served without a scan
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Counters shared by both engines
#[derive(Debug, Default)]
struct FetchCounters {
    /// Current frame
    frame: PrefetchStats,
    /// Completed frames
    totals: PrefetchStats,
    /// Fetch cycles per core
    cycles: [u64; 2],
    /// Frames completed
    frames: u64,
}

impl FetchCounters {
    #[inline(always)]
    fn charge(&mut self, core: CpuCore, cycles: u32) {
        self.cycles[core.index()] += cycles as u64;
    }

    fn new_frame(&mut self) {
        let frame = &self.frame;
        log::debug!(
            "Frame {}: {} hits, {} misses, {} recycled, {} collisions, {} invalidations, {} evictions",
            self.frames,
            frame.hits,
            frame.misses,
            frame.recycled,
            frame.collisions,
            frame.invalidations,
            frame.evictions
        );

        self.totals.accumulate(&self.frame);
        self.frame = PrefetchStats::default();
        self.frames += 1;
    }

    fn stats(&self) -> PrefetchStats {
        let mut stats = self.totals;
        stats.accumulate(&self.frame);
        stats
    }
}

/// Fetch engine interface used by the execution loop and the bus
///
/// Every call is synchronous. Implementations own all per-core fetch state;
/// memory is passed in so both engines see the same backing buffers and
/// caches.
pub trait InstructionFetch {
    /// Instruction word at `pc` for `core`
    ///
    /// # Errors
    ///
    /// - `EmulatorError::UnalignedAccess` for an odd `pc`
    /// - `EmulatorError::UnmappedFetch` if no region claims `pc`
    fn fetch(&mut self, memory: &mut Memory, pc: u32, core: CpuCore) -> Result<FetchOutcome>;

    /// Delay-slot word at `pc`, taken from the block of `outcome`
    ///
    /// Never rescans. A `pc` outside that block is a caller bug.
    fn fetch_delay_slot(
        &mut self,
        memory: &mut Memory,
        pc: u32,
        outcome: &FetchOutcome,
        core: CpuCore,
    ) -> Result<u16>;

    /// A store landed; `memory` already holds the new value
    fn data_write(&mut self, memory: &Memory, core: CpuCore, address: u32, size: AccessSize);

    /// A cache line was replaced or purged
    fn invalidate_cache_prefetch(&mut self, memory: &Memory, line: EvictedLine);

    /// A core's cache was enabled, disabled or switched associativity
    fn cache_reconfigured(&mut self, core: CpuCore);

    /// Drop all fetch state (memory was reloaded)
    fn reset(&mut self);

    /// Periodic diagnostics hook
    fn new_frame(&mut self);

    /// Counters including the current frame
    fn stats(&self) -> PrefetchStats;

    /// Counters for the current frame
    fn frame_stats(&self) -> PrefetchStats;

    /// Fetch cycles charged to `core`
    fn cycles(&self, core: CpuCore) -> u64;

    /// Number of current blocks held for `core`
    fn block_count(&self, _core: CpuCore) -> usize {
        0
    }

    /// Check every held block against memory
    fn verify(&self, _memory: &Memory) -> Result<()> {
        Ok(())
    }
}

/// Build the engine selected by `config.prefetch_enabled`
pub fn create_fetcher(config: &Config) -> Box<dyn InstructionFetch + Send> {
    if config.prefetch_enabled {
        log::info!(
            "Block prefetch enabled (history limit {})",
            config.prefetch.history_limit
        );
        Box::new(BlockFetch::new(config))
    } else {
        log::info!("Block prefetch disabled, fetching through memory");
        Box::new(DirectFetch::new())
    }
}

/// Resolve a fetch address or fail with a configuration fault
#[inline]
fn resolve_fetch(memory: &Memory, pc: u32, core: CpuCore) -> Result<ResolvedAddress> {
    if pc & 1 != 0 {
        return Err(EmulatorError::UnalignedAccess {
            address: pc,
            size: 2,
        });
    }
    memory
        .resolve(pc, core)
        .ok_or(EmulatorError::UnmappedFetch { address: pc, core })
}

/// Engine that reads memory on every fetch
///
/// Holds no blocks, so stores and evictions are only counted.
#[derive(Debug, Default)]
pub struct DirectFetch {
    counters: FetchCounters,
}

impl DirectFetch {
    pub fn new() -> Self {
        Self::default()
    }

    fn read_word(&mut self, memory: &mut Memory, pc: u32, core: CpuCore) -> Result<(u16, u32)> {
        let resolved = resolve_fetch(memory, pc, core)?;
        let read = memory.read_resolved(core, &resolved, AccessSize::Word);
        if read.evicted.is_some() {
            self.counters.frame.evictions += 1;
        }
        self.counters.charge(core, resolved.delay);
        Ok((read.value as u16, resolved.delay))
    }
}

impl InstructionFetch for DirectFetch {
    fn fetch(&mut self, memory: &mut Memory, pc: u32, core: CpuCore) -> Result<FetchOutcome> {
        let (opcode, cycles) = self.read_word(memory, pc, core)?;
        Ok(FetchOutcome {
            pc,
            opcode,
            block: None,
            cycles,
        })
    }

    fn fetch_delay_slot(
        &mut self,
        memory: &mut Memory,
        pc: u32,
        _outcome: &FetchOutcome,
        core: CpuCore,
    ) -> Result<u16> {
        Ok(self.read_word(memory, pc, core)?.0)
    }

    fn data_write(&mut self, _memory: &Memory, _core: CpuCore, _address: u32, _size: AccessSize) {}

    fn invalidate_cache_prefetch(&mut self, _memory: &Memory, _line: EvictedLine) {
        self.counters.frame.evictions += 1;
    }

    fn cache_reconfigured(&mut self, _core: CpuCore) {}

    fn reset(&mut self) {
        self.counters = FetchCounters::default();
    }

    fn new_frame(&mut self) {
        self.counters.new_frame();
    }

    fn stats(&self) -> PrefetchStats {
        self.counters.stats()
    }

    fn frame_stats(&self) -> PrefetchStats {
        self.counters.frame
    }

    fn cycles(&self, core: CpuCore) -> u64 {
        self.counters.cycles[core.index()]
    }
}
