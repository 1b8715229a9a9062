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

//! Block fetch engine
//!
//! A fetch first looks for a current block under the PC's slot key. On a
//! miss it scans memory forward from the PC into the core's scratch buffer,
//! then either revives a block from the slot's history with the same words
//! or commits the scan as a new block.

use super::block::{Block, BlockEnd, BlockView, ScanBuffer};
use super::store::{BlockStore, Recycle};
use super::{
    resolve_fetch, FetchCounters, FetchOutcome, InstructionFetch, PrefetchStats, MAX_BLOCK_WORDS,
};
use crate::core::config::Config;
use crate::core::cpu::{classify, CpuCore, InstructionClass};
use crate::core::error::{EmulatorError, Result};
use crate::core::memory::{
    AccessSize, CacheMode, EvictedLine, Memory, MemoryRegion, ResolvedAddress,
};

/// Fetch engine serving words from pre-scanned blocks
///
/// Each core has its own block store and scratch buffer. The only
/// cross-core traffic is invalidation fan-out for shared regions.
pub struct BlockFetch {
    /// Block store per core
    pub(super) stores: [BlockStore; 2],
    /// Scan scratch per core
    scratch: [ScanBuffer; 2],
    /// Lines evicted while reading, not yet processed
    pub(super) evictions: Vec<EvictedLine>,
    pub(super) counters: FetchCounters,
}

impl BlockFetch {
    pub fn new(config: &Config) -> Self {
        let limit = config.prefetch.history_limit;
        Self {
            stores: [BlockStore::new(limit), BlockStore::new(limit)],
            scratch: [ScanBuffer::new(), ScanBuffer::new()],
            evictions: Vec::new(),
            counters: FetchCounters::default(),
        }
    }

    /// Current block of `core` at a slot key
    pub fn block(&self, core: CpuCore, key: u32) -> Option<&Block> {
        self.stores[core.index()].current(key)
    }

    /// All current blocks of `core`
    pub fn blocks(&self, core: CpuCore) -> impl Iterator<Item = &Block> {
        self.stores[core.index()].blocks()
    }

    /// Count one pass of an idle loop through the block at `key`
    ///
    /// The counter is cleared every time the block is resolved by `fetch`.
    pub fn record_poll(&mut self, core: CpuCore, key: u32) -> Option<u32> {
        let block = self.stores[core.index()].current_mut(key)?;
        block.poll_count += 1;
        Some(block.poll_count)
    }

    /// Four-way cache lines live in the data array, so a fill can change
    /// it without a store; such fetches skip the block layer
    fn bypasses_blocks(memory: &Memory, core: CpuCore, resolved: &ResolvedAddress) -> bool {
        if resolved.region != MemoryRegion::CacheDataArray {
            return false;
        }
        let config = memory.cache(core).config();
        config.enabled && config.mode == CacheMode::FourWay
    }

    /// Read one word through memory, processing any eviction
    fn read_through(
        &mut self,
        memory: &mut Memory,
        core: CpuCore,
        resolved: &ResolvedAddress,
    ) -> u16 {
        let read = memory.read_resolved(core, resolved, AccessSize::Word);
        if let Some(line) = read.evicted {
            self.evictions.push(line);
            self.flush_evictions(memory);
        }
        self.counters.charge(core, resolved.delay);
        read.value as u16
    }

    fn miss(
        &mut self,
        memory: &mut Memory,
        pc: u32,
        core: CpuCore,
        resolved: &ResolvedAddress,
    ) -> FetchOutcome {
        let index = core.index();
        let key = resolved.slot_key();
        self.counters.frame.misses += 1;

        scan_block(memory, core, resolved, &mut self.scratch[index], &mut self.evictions);
        self.flush_evictions(memory);

        let scan = &self.scratch[index];
        let slot = self.stores[index].slot_mut(key);
        let mut block = match slot.recycle(scan) {
            Recycle::Match(mut block) => {
                log::debug!(
                    "Recycled {}-word block at 0x{:08X} on {} core",
                    block.len(),
                    pc,
                    core
                );
                self.counters.frame.recycled += 1;
                block.cache_fetch = scan.cache_fetch;
                block
            }
            Recycle::Collision => {
                log::warn!(
                    "Block hash collision at 0x{:08X} on {} core (hash {:016X}), rescanned",
                    pc,
                    core,
                    scan.hash
                );
                self.counters.frame.collisions += 1;
                scan.commit(core, key, pc)
            }
            Recycle::Miss => {
                log::debug!(
                    "Scanned {}-word block at 0x{:08X} on {} core ({:?})",
                    scan.words.len(),
                    pc,
                    core,
                    scan.end
                );
                scan.commit(core, key, pc)
            }
        };

        block.hits = 0;
        block.poll_count = 0;
        let outcome = FetchOutcome {
            pc,
            opcode: block.words[0],
            block: Some(block.view(pc)),
            cycles: resolved.delay,
        };
        slot.current = Some(block);

        self.counters.charge(core, resolved.delay);
        outcome
    }

    /// Delay slot outside its block: error in debug builds, clamp otherwise
    fn desync(&mut self, pc: u32, view: &BlockView) -> Result<u16> {
        self.counters.frame.desyncs += 1;
        let error = EmulatorError::DelaySlotDesync {
            pc,
            block_pc: view.pc,
            len: view.len(),
        };

        if cfg!(debug_assertions) {
            return Err(error);
        }

        log::error!("{}, clamping to block bounds", error);
        let index = (pc.wrapping_sub(view.pc) as i32 / 2).clamp(0, view.len() as i32 - 1);
        Ok(view.words[index as usize])
    }
}

/// Scan forward from `start` into `scan`
///
/// Stops after an immediate branch, after the delay slot of a delayed
/// branch, after an illegal word, at `MAX_BLOCK_WORDS`, or where the next
/// word leaves the region or wraps its mirror. A delayed branch whose delay
/// slot would not fit is left for the next block.
fn scan_block(
    memory: &mut Memory,
    core: CpuCore,
    start: &ResolvedAddress,
    scan: &mut ScanBuffer,
    evictions: &mut Vec<EvictedLine>,
) {
    scan.clear(start.cache_eligible);
    let mut resolved = *start;
    let mut delay_slot_pending = false;

    loop {
        let read = memory.read_resolved(core, &resolved, AccessSize::Word);
        evictions.extend(read.evicted);
        let word = read.value as u16;
        scan.words.push(word);

        if delay_slot_pending {
            scan.finish(BlockEnd::DelaySlot);
            return;
        }

        match classify(word) {
            InstructionClass::Sequential => {}
            InstructionClass::Branch => {
                scan.finish(BlockEnd::Branch);
                return;
            }
            InstructionClass::DelayedBranch if scan.words.len() == MAX_BLOCK_WORDS => {
                scan.words.pop();
                scan.finish(BlockEnd::Limit);
                return;
            }
            InstructionClass::DelayedBranch => delay_slot_pending = true,
            InstructionClass::Illegal => {
                log::warn!(
                    "Illegal instruction 0x{:04X} at 0x{:08X} on {} core ends block",
                    word,
                    resolved.address,
                    core
                );
                scan.finish(BlockEnd::Illegal);
                return;
            }
        }

        if scan.words.len() == MAX_BLOCK_WORDS {
            scan.finish(BlockEnd::Limit);
            return;
        }

        match memory.resolve(resolved.address.wrapping_add(2), core) {
            Some(next) if next.region == start.region && next.offset == resolved.offset + 2 => {
                resolved = next;
            }
            _ => {
                scan.finish(BlockEnd::RegionEnd);
                return;
            }
        }
    }
}

impl InstructionFetch for BlockFetch {
    fn fetch(&mut self, memory: &mut Memory, pc: u32, core: CpuCore) -> Result<FetchOutcome> {
        let resolved = resolve_fetch(memory, pc, core)?;

        if Self::bypasses_blocks(memory, core, &resolved) {
            let opcode = self.read_through(memory, core, &resolved);
            return Ok(FetchOutcome {
                pc,
                opcode,
                block: None,
                cycles: resolved.delay,
            });
        }

        if let Some(block) = self.stores[core.index()].current_mut(resolved.slot_key()) {
            block.hits += 1;
            block.poll_count = 0;
            let outcome = FetchOutcome {
                pc,
                opcode: block.words[0],
                block: Some(block.view(pc)),
                cycles: resolved.delay,
            };

            self.counters.frame.hits += 1;
            self.counters.charge(core, resolved.delay);
            return Ok(outcome);
        }

        Ok(self.miss(memory, pc, core, &resolved))
    }

    fn fetch_delay_slot(
        &mut self,
        memory: &mut Memory,
        pc: u32,
        outcome: &FetchOutcome,
        core: CpuCore,
    ) -> Result<u16> {
        let Some(view) = outcome.block.as_ref() else {
            let resolved = resolve_fetch(memory, pc, core)?;
            return Ok(self.read_through(memory, core, &resolved));
        };

        let word = match view.word_at(pc) {
            Some(word) => word,
            None => self.desync(pc, view)?,
        };

        let resolved = resolve_fetch(memory, pc, core)?;
        if resolved.cache_eligible {
            self.read_through(memory, core, &resolved);
        } else {
            self.counters.charge(core, resolved.delay);
        }
        Ok(word)
    }

    fn data_write(&mut self, memory: &Memory, core: CpuCore, address: u32, size: AccessSize) {
        self.invalidate_write(memory, core, address, size);
    }

    fn invalidate_cache_prefetch(&mut self, memory: &Memory, line: EvictedLine) {
        self.invalidate_line(memory, line);
    }

    fn cache_reconfigured(&mut self, core: CpuCore) {
        self.sweep_cached(core);
    }

    fn reset(&mut self) {
        for store in &mut self.stores {
            store.clear();
        }
        self.evictions.clear();
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

    fn block_count(&self, core: CpuCore) -> usize {
        self.stores[core.index()].len()
    }

    fn verify(&self, memory: &Memory) -> Result<()> {
        for core in CpuCore::ALL {
            for block in self.stores[core.index()].blocks() {
                for (i, &cached) in block.words.iter().enumerate() {
                    let address = block.pc.wrapping_add(2 * i as u32);
                    let value = if block.cache_fetch {
                        memory.read_direct(core, address, AccessSize::Word)?
                    } else {
                        memory.read_raw(core, address, AccessSize::Word)?
                    } as u16;

                    if value != cached {
                        return Err(EmulatorError::CoherenceViolation {
                            core,
                            address,
                            cached,
                            memory: value,
                        });
                    }
                }
            }
        }
        Ok(())
    }
}
