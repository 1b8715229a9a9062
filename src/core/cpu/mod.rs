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

//! SH-2 core identification and instruction classification
//!
//! The machine carries two identical SH-2 cores. Nothing in this crate
//! executes instructions; the fetch layer only needs to know which core is
//! asking and where a run of instructions ends.

mod decode;

pub use decode::{classify, InstructionClass};

use std::fmt;

/// One of the two SH-2 cores sharing the memory bus
///
/// # Example
/// ```
/// use s32x::core::cpu::CpuCore;
///
/// assert_eq!(CpuCore::Primary.sibling(), CpuCore::Secondary);
/// assert_eq!(CpuCore::Secondary.index(), 1);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CpuCore {
    /// Primary (master) core
    Primary,
    /// Secondary (slave) core
    Secondary,
}

impl CpuCore {
    /// Both cores, in index order
    pub const ALL: [CpuCore; 2] = [CpuCore::Primary, CpuCore::Secondary];

    /// The other core on the bus
    #[inline(always)]
    pub const fn sibling(self) -> Self {
        match self {
            CpuCore::Primary => CpuCore::Secondary,
            CpuCore::Secondary => CpuCore::Primary,
        }
    }

    /// Index into per-core arrays
    #[inline(always)]
    pub const fn index(self) -> usize {
        match self {
            CpuCore::Primary => 0,
            CpuCore::Secondary => 1,
        }
    }
}

impl fmt::Display for CpuCore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CpuCore::Primary => write!(f, "primary"),
            CpuCore::Secondary => write!(f, "secondary"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sibling_is_involution() {
        for core in CpuCore::ALL {
            assert_ne!(core.sibling(), core);
            assert_eq!(core.sibling().sibling(), core);
        }
    }

    #[test]
    fn test_index_matches_all_order() {
        for (i, core) in CpuCore::ALL.iter().enumerate() {
            assert_eq!(core.index(), i);
        }
    }
}
