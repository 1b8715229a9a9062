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

//! Error types for the fetch front end
//!
//! Every fallible operation returns [`Result<T>`]. Configuration faults (a
//! fetch from an address no region claims) are surfaced as errors rather than
//! panics so the embedding emulator can report them with full context.

use crate::core::cpu::CpuCore;
use thiserror::Error;

/// Result type alias using [`EmulatorError`]
pub type Result<T> = std::result::Result<T, EmulatorError>;

/// Errors raised by the fetch front end
#[derive(Debug, Error)]
pub enum EmulatorError {
    /// Instruction fetch from an address that matches no memory region
    #[error("Unmapped instruction fetch at 0x{address:08X} on {core} core")]
    UnmappedFetch { address: u32, core: CpuCore },

    /// Data access to an address that matches no memory region
    #[error("Invalid memory access at 0x{address:08X}")]
    InvalidMemoryAccess { address: u32 },

    /// Access not aligned to its size
    #[error("Unaligned {size}-byte access at 0x{address:08X}")]
    UnalignedAccess { address: u32, size: u32 },

    /// Access size other than 1, 2 or 4 bytes
    #[error("Invalid access size: {0} bytes")]
    InvalidAccessSize(u8),

    /// Delay slot PC does not lie inside the block of the preceding fetch
    #[error(
        "Delay slot at 0x{pc:08X} outside block fetched at 0x{block_pc:08X} ({len} words)"
    )]
    DelaySlotDesync { pc: u32, block_pc: u32, len: usize },

    /// A valid block no longer matches the bytes its core would fetch
    #[error(
        "Stale block on {core} core at 0x{address:08X}: block has 0x{cached:04X}, memory has 0x{memory:04X}"
    )]
    CoherenceViolation {
        core: CpuCore,
        address: u32,
        cached: u16,
        memory: u16,
    },

    /// Image does not fit the region it is loaded into
    #[error("Image of {size} bytes does not fit in {capacity} bytes")]
    ImageTooLarge { size: usize, capacity: usize },

    /// Configuration value out of range
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Configuration file could not be parsed
    #[error("Failed to parse configuration: {0}")]
    ConfigParse(#[from] toml::de::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unmapped_fetch_message() {
        let err = EmulatorError::UnmappedFetch {
            address: 0x2000_4000,
            core: CpuCore::Secondary,
        };
        assert_eq!(
            err.to_string(),
            "Unmapped instruction fetch at 0x20004000 on secondary core"
        );
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: EmulatorError = io.into();
        assert!(matches!(err, EmulatorError::Io(_)));
    }
}
