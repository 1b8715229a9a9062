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

//! Blocks: validated runs of instruction words
//!
//! A block is what one scan of memory produced, starting at some PC and
//! running up to a branch (plus its delay slot) or `MAX_BLOCK_WORDS`. Its
//! words are shared with every [`BlockView`] handed out, so a hit clones a
//! reference count and never copies or allocates.

use super::MAX_BLOCK_WORDS;
use crate::core::cpu::CpuCore;
use std::sync::Arc;
use xxhash_rust::xxh3::Xxh3;

/// Why a scan stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockEnd {
    /// Last word is an immediate branch
    Branch,
    /// Last word is the delay slot of the branch before it
    DelaySlot,
    /// `MAX_BLOCK_WORDS` reached
    Limit,
    /// Last word is an illegal instruction
    Illegal,
    /// Next word would fall outside any region
    RegionEnd,
}

/// Content hash of a run of instruction words
#[inline]
pub fn hash_words(words: &[u16]) -> u64 {
    let mut hasher = Xxh3::new();
    for word in words {
        hasher.update(&word.to_be_bytes());
    }
    hasher.digest()
}

/// A committed block
#[derive(Debug, Clone)]
pub struct Block {
    /// Core that scanned the block
    pub core: CpuCore,
    /// Slot key the block was committed under
    pub key: u32,
    /// PC the scan started at
    pub pc: u32,
    /// Instruction words, `1..=MAX_BLOCK_WORDS` of them
    pub words: Arc<[u16]>,
    /// Hash of `words`
    pub hash: u64,
    /// Why the scan stopped
    pub end: BlockEnd,
    /// Scan ran to the limit without meeting a branch
    pub no_jump: bool,
    /// Words were read through the core's cache
    pub cache_fetch: bool,
    /// Fast-path fetches served since the block became current
    pub hits: u64,
    /// Idle-loop detection counter, owned by the execution loop
    pub poll_count: u32,
}

impl Block {
    /// Number of words
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Always false for a committed block
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Slot-key range covered, inclusive
    #[inline(always)]
    pub fn key_range(&self) -> (u32, u32) {
        (self.key, self.key + (self.words.len() as u32) * 2 - 1)
    }

    /// Same content as a fresh scan
    #[inline]
    pub fn matches(&self, scan: &ScanBuffer) -> bool {
        self.hash == scan.hash && *self.words == *scan.words
    }

    /// Cheap handle for the execution loop
    #[inline]
    pub fn view(&self, pc: u32) -> BlockView {
        BlockView {
            pc,
            words: Arc::clone(&self.words),
            hash: self.hash,
            end: self.end,
            no_jump: self.no_jump,
            cache_fetch: self.cache_fetch,
        }
    }
}

/// Block as seen from one fetch
///
/// `pc` is the address the fetch asked for, which may be a mirror of the
/// address the block was scanned at; delay-slot indexing is relative to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockView {
    /// Address of `words[0]` as fetched
    pub pc: u32,
    /// Instruction words
    pub words: Arc<[u16]>,
    /// Hash of `words`
    pub hash: u64,
    /// Why the scan stopped
    pub end: BlockEnd,
    /// Scan ran to the limit without meeting a branch
    pub no_jump: bool,
    /// Words were read through the core's cache
    pub cache_fetch: bool,
}

impl BlockView {
    /// Number of words
    #[inline(always)]
    pub fn len(&self) -> usize {
        self.words.len()
    }

    /// Always false for a view of a committed block
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Word at `pc`, if it lies inside the block
    #[inline]
    pub fn word_at(&self, pc: u32) -> Option<u16> {
        let delta = pc.wrapping_sub(self.pc);
        if delta % 2 != 0 {
            return None;
        }
        self.words.get((delta / 2) as usize).copied()
    }
}

/// Per-core scratch a scan writes into
///
/// Reused for every scan on its core. Committing copies the words out, so
/// nothing in a slot ever aliases it.
#[derive(Debug)]
pub struct ScanBuffer {
    /// Words read so far
    pub words: Vec<u16>,
    /// Hash of `words`, valid after `finish`
    pub hash: u64,
    /// Why the scan stopped
    pub end: BlockEnd,
    /// Scan ran to the limit without meeting a branch
    pub no_jump: bool,
    /// Words were read through the core's cache
    pub cache_fetch: bool,
}

impl ScanBuffer {
    pub fn new() -> Self {
        Self {
            words: Vec::with_capacity(MAX_BLOCK_WORDS),
            hash: 0,
            end: BlockEnd::Limit,
            no_jump: false,
            cache_fetch: false,
        }
    }

    /// Start a new scan
    #[inline]
    pub fn clear(&mut self, cache_fetch: bool) {
        self.words.clear();
        self.hash = 0;
        self.end = BlockEnd::Limit;
        self.no_jump = false;
        self.cache_fetch = cache_fetch;
    }

    /// Seal the scan and compute its hash
    #[inline]
    pub fn finish(&mut self, end: BlockEnd) {
        self.end = end;
        self.no_jump = end == BlockEnd::Limit;
        self.hash = hash_words(&self.words);
    }

    /// Copy the scan into a new block
    pub fn commit(&self, core: CpuCore, key: u32, pc: u32) -> Block {
        Block {
            core,
            key,
            pc,
            words: Arc::from(self.words.as_slice()),
            hash: self.hash,
            end: self.end,
            no_jump: self.no_jump,
            cache_fetch: self.cache_fetch,
            hits: 0,
            poll_count: 0,
        }
    }
}

impl Default for ScanBuffer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scanned(words: &[u16], end: BlockEnd) -> ScanBuffer {
        let mut scan = ScanBuffer::new();
        scan.clear(false);
        scan.words.extend_from_slice(words);
        scan.finish(end);
        scan
    }

    #[test]
    fn test_hash_depends_on_order_and_length() {
        assert_ne!(hash_words(&[0x0009, 0x000B]), hash_words(&[0x000B, 0x0009]));
        assert_ne!(hash_words(&[0x0009]), hash_words(&[0x0009, 0x0009]));
        assert_eq!(hash_words(&[0x0009, 0x000B]), hash_words(&[0x0009, 0x000B]));
    }

    #[test]
    fn test_commit_copies_scratch() {
        let mut scan = scanned(&[0x0009, 0x000B, 0x0009], BlockEnd::DelaySlot);
        let block = scan.commit(CpuCore::Primary, 0x0600_0100, 0x0600_0100);

        scan.clear(false);
        scan.words.push(0xFFFF);

        assert_eq!(&*block.words, &[0x0009, 0x000B, 0x0009]);
        assert_eq!(block.key_range(), (0x0600_0100, 0x0600_0105));
        assert!(!block.no_jump);
    }

    #[test]
    fn test_matches_requires_equal_words() {
        let scan = scanned(&[0x0009, 0x000B, 0x0009], BlockEnd::DelaySlot);
        let mut block = scan.commit(CpuCore::Primary, 0, 0);
        assert!(block.matches(&scan));

        // Forged hash collision
        block.words = Arc::from(&[0x0009u16, 0x000B, 0x0008][..]);
        assert!(!block.matches(&scan));
    }

    #[test]
    fn test_view_word_at() {
        let block = scanned(&[1, 2, 3], BlockEnd::DelaySlot).commit(CpuCore::Primary, 0x100, 0x0600_0100);
        let view = block.view(0x0604_0100);

        assert_eq!(view.word_at(0x0604_0104), Some(3));
        assert_eq!(view.word_at(0x0604_0106), None);
        assert_eq!(view.word_at(0x0604_00FE), None);
        assert_eq!(view.word_at(0x0604_0101), None);
    }

    #[test]
    fn test_limit_sets_no_jump() {
        let scan = scanned(&[0x0009; MAX_BLOCK_WORDS], BlockEnd::Limit);
        assert!(scan.no_jump);
    }
}
