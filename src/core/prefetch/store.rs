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

//! Per-core block store
//!
//! Slots are created on first fetch and never removed until reset, so an
//! address that was invalidated is still distinguishable from one that was
//! never visited.

use super::block::{Block, ScanBuffer};
use std::collections::{HashMap, VecDeque};

/// Record for one slot key
#[derive(Debug, Default)]
pub struct BlockSlot {
    /// Valid block, if any
    pub current: Option<Block>,
    /// Previously valid blocks, oldest first
    pub history: VecDeque<Block>,
}

/// Outcome of looking a fresh scan up in a slot's history
#[derive(Debug)]
pub enum Recycle {
    /// A previous block has the same words
    Match(Block),
    /// A previous block has the same hash but different words (dropped)
    Collision,
    /// Nothing with that hash
    Miss,
}

impl BlockSlot {
    /// Look a scan up by hash, removing the entry it hits
    pub fn recycle(&mut self, scan: &ScanBuffer) -> Recycle {
        let Some(index) = self.history.iter().position(|block| block.hash == scan.hash) else {
            return Recycle::Miss;
        };

        match self.history.remove(index) {
            Some(block) if block.matches(scan) => Recycle::Match(block),
            Some(_) => Recycle::Collision,
            None => Recycle::Miss,
        }
    }

    /// Move the current block into history, dropping the oldest beyond `limit`
    ///
    /// # Returns
    ///
    /// `true` if there was a current block
    pub fn demote(&mut self, limit: usize) -> bool {
        let Some(block) = self.current.take() else {
            return false;
        };

        // One entry per content
        self.history.retain(|old| old.hash != block.hash);
        self.history.push_back(block);
        while self.history.len() > limit {
            self.history.pop_front();
        }
        true
    }
}

/// Slots of one core, keyed by slot key
#[derive(Debug)]
pub struct BlockStore {
    slots: HashMap<u32, BlockSlot>,
    history_limit: usize,
}

impl BlockStore {
    pub fn new(history_limit: usize) -> Self {
        Self {
            slots: HashMap::new(),
            history_limit,
        }
    }

    /// Current block at `key`
    #[inline(always)]
    pub fn current_mut(&mut self, key: u32) -> Option<&mut Block> {
        self.slots.get_mut(&key)?.current.as_mut()
    }

    /// Current block at `key`
    #[inline(always)]
    pub fn current(&self, key: u32) -> Option<&Block> {
        self.slots.get(&key)?.current.as_ref()
    }

    /// Slot at `key`, created if never visited
    pub fn slot_mut(&mut self, key: u32) -> &mut BlockSlot {
        self.slots.entry(key).or_default()
    }

    /// True if a slot exists at `key`
    pub fn visited(&self, key: u32) -> bool {
        self.slots.contains_key(&key)
    }

    /// Demote the current block at `key`
    pub fn demote(&mut self, key: u32) -> bool {
        let limit = self.history_limit;
        self.slots
            .get_mut(&key)
            .is_some_and(|slot| slot.demote(limit))
    }

    /// Demote every current block whose key satisfies `predicate`
    ///
    /// # Returns
    ///
    /// Number of blocks demoted
    pub fn demote_where(&mut self, predicate: impl Fn(u32) -> bool) -> usize {
        let limit = self.history_limit;
        let mut demoted = 0;
        for (&key, slot) in self.slots.iter_mut() {
            if predicate(key) && slot.demote(limit) {
                demoted += 1;
            }
        }
        demoted
    }

    /// All current blocks
    pub fn blocks(&self) -> impl Iterator<Item = &Block> {
        self.slots.values().filter_map(|slot| slot.current.as_ref())
    }

    /// Number of current blocks
    pub fn len(&self) -> usize {
        self.blocks().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every slot
    pub fn clear(&mut self) {
        self.slots.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::cpu::CpuCore;
    use crate::core::prefetch::block::BlockEnd;

    fn scan_of(words: &[u16]) -> ScanBuffer {
        let mut scan = ScanBuffer::new();
        scan.clear(false);
        scan.words.extend_from_slice(words);
        scan.finish(BlockEnd::Branch);
        scan
    }

    fn commit(store: &mut BlockStore, key: u32, words: &[u16]) {
        let block = scan_of(words).commit(CpuCore::Primary, key, key);
        store.slot_mut(key).current = Some(block);
    }

    #[test]
    fn test_unvisited_differs_from_invalidated() {
        let mut store = BlockStore::new(4);
        assert!(!store.visited(0x100));

        commit(&mut store, 0x100, &[0x8900]);
        assert!(store.demote(0x100));

        assert!(store.visited(0x100));
        assert!(store.current(0x100).is_none());
        assert!(!store.demote(0x100));
    }

    #[test]
    fn test_recycle_match_removes_from_history() {
        let mut store = BlockStore::new(4);
        commit(&mut store, 0x100, &[0x0009, 0x8900]);
        store.demote(0x100);

        let slot = store.slot_mut(0x100);
        assert!(matches!(slot.recycle(&scan_of(&[0x0009, 0x8900])), Recycle::Match(_)));
        assert!(slot.history.is_empty());
        assert!(matches!(slot.recycle(&scan_of(&[0x0009, 0x8900])), Recycle::Miss));
    }

    #[test]
    fn test_recycle_collision_drops_entry() {
        let mut store = BlockStore::new(4);
        commit(&mut store, 0x100, &[0x0009, 0x8900]);
        store.demote(0x100);

        // Same hash, different words
        let mut scan = scan_of(&[0x000B, 0x8900]);
        scan.hash = store.slot_mut(0x100).history[0].hash;

        let slot = store.slot_mut(0x100);
        assert!(matches!(slot.recycle(&scan), Recycle::Collision));
        assert!(slot.history.is_empty());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut store = BlockStore::new(2);
        for word in 0..4u16 {
            commit(&mut store, 0x100, &[word, 0x8900]);
            store.demote(0x100);
        }

        let slot = store.slot_mut(0x100);
        let kept: Vec<u16> = slot.history.iter().map(|block| block.words[0]).collect();
        assert_eq!(kept, vec![2, 3]);
    }

    #[test]
    fn test_history_deduplicates_content() {
        let mut store = BlockStore::new(4);
        for _ in 0..3 {
            commit(&mut store, 0x100, &[0x0009, 0x8900]);
            store.demote(0x100);
        }
        assert_eq!(store.slot_mut(0x100).history.len(), 1);
    }

    #[test]
    fn test_demote_where() {
        let mut store = BlockStore::new(4);
        commit(&mut store, 0x0600_0000, &[0x8900]);
        commit(&mut store, 0x2600_0000, &[0x8900]);

        assert_eq!(store.demote_where(|key| key & 0x2000_0000 == 0), 1);
        assert_eq!(store.len(), 1);
        assert!(store.current(0x2600_0000).is_some());
    }
}
