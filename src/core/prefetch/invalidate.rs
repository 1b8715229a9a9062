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

//! Block invalidation
//!
//! Blocks are keyed by their first word, so a store at `a` can only hit
//! blocks starting in `[a - INVALIDATION_WINDOW, a + size)`. Invalidating
//! demotes a block to its slot's history; nothing is freed.

use super::engine::BlockFetch;
use super::{intersects, INVALIDATION_WINDOW};
use crate::core::cpu::CpuCore;
use crate::core::memory::{
    AccessSize, CacheMode, EvictedLine, Memory, MemoryRegion, CACHE_LINE_SIZE, CACHE_THROUGH_BIT,
};

impl BlockFetch {
    /// Demote every block of `core` overlapping slot keys `[lo, hi]`
    ///
    /// # Returns
    ///
    /// Number of blocks demoted
    pub(super) fn invalidate_keys(&mut self, core: CpuCore, lo: u32, hi: u32) -> usize {
        let store = &mut self.stores[core.index()];
        let mut demoted = 0;

        let mut key = lo.saturating_sub(INVALIDATION_WINDOW) & !1;
        while key <= hi {
            let overlaps = store.current(key).is_some_and(|block| {
                let (start, end) = block.key_range();
                intersects(start, end, lo, hi)
            });
            if overlaps && store.demote(key) {
                demoted += 1;
            }

            match key.checked_add(2) {
                Some(next) => key = next,
                None => break,
            }
        }

        self.counters.frame.invalidations += demoted as u64;
        demoted
    }

    /// Invalidate blocks a store may have changed
    ///
    /// Both aliases of the address are checked for the writer, and for the
    /// sibling too when the region is shared. Unmapped stores are ignored.
    pub(super) fn invalidate_write(
        &mut self,
        memory: &Memory,
        core: CpuCore,
        address: u32,
        size: AccessSize,
    ) {
        let Some(resolved) = memory.resolve(address, core) else {
            return;
        };
        let span = size.bytes() - 1;

        if resolved.region == MemoryRegion::CacheDataArray {
            let key = resolved.slot_key();
            self.invalidate_keys(core, key, key + span);

            // Four-way data array is the live cache lines
            let config = memory.cache(core).config();
            if config.enabled && config.mode == CacheMode::FourWay {
                self.sweep_cached(core);
            }
            return;
        }

        let cached = resolved.slot_key() & !CACHE_THROUGH_BIT;
        let sibling = resolved.region.is_shared().then(|| core.sibling());

        let mut demoted = 0;
        for target in std::iter::once(core).chain(sibling) {
            for key in [cached, cached | CACHE_THROUGH_BIT] {
                demoted += self.invalidate_keys(target, key, key + span);
            }
        }

        if demoted > 0 {
            log::trace!(
                "{:?} store at 0x{:08X} by {} core invalidated {} block(s)",
                size,
                address,
                core,
                demoted
            );
        }
    }

    /// Invalidate the cached-alias blocks an evicted line may back
    pub(super) fn invalidate_line(&mut self, memory: &Memory, line: EvictedLine) {
        self.counters.frame.evictions += 1;

        let Some(resolved) = memory.resolve(line.address, line.core) else {
            return;
        };
        let key = resolved.slot_key() & !CACHE_THROUGH_BIT;
        let demoted = self.invalidate_keys(line.core, key, key + CACHE_LINE_SIZE as u32 - 1);

        if demoted > 0 {
            log::trace!(
                "Eviction of line 0x{:08X} on {} core invalidated {} block(s)",
                line.address,
                line.core,
                demoted
            );
        }
    }

    /// Process lines queued while reading
    pub(super) fn flush_evictions(&mut self, memory: &Memory) {
        while let Some(line) = self.evictions.pop() {
            self.invalidate_line(memory, line);
        }
    }

    /// Demote every block of `core` fetched through the cached alias
    ///
    /// Needed whenever the bytes behind that alias may change wholesale:
    /// cache enable toggles, mode switches, data-array writes to live lines.
    pub(super) fn sweep_cached(&mut self, core: CpuCore) {
        let demoted = self.stores[core.index()].demote_where(|key| key & CACHE_THROUGH_BIT == 0);
        self.counters.frame.invalidations += demoted as u64;
        log::debug!(
            "Cache reconfiguration on {} core invalidated {} block(s)",
            core,
            demoted
        );
    }
}
