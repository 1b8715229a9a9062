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

//! s32x: instruction fetch front end for a dual SH-2 machine
//!
//! Two identical SH-2 cores ("primary" and "secondary") share SDRAM and
//! cartridge ROM. Each core owns a boot ROM and an on-chip cache. This crate
//! turns "give me the instruction at `pc` for core `c`" into fast, correct
//! answers by caching pre-scanned runs of instructions (blocks) on top of an
//! explicit cache model, and invalidating them when memory or cache lines
//! change underneath.
//!
//! # Architecture
//!
//! - [`core::memory`]: Region resolver, backing buffers and the on-chip cache
//! - [`core::prefetch`]: Block store, fetch/decode engine and invalidation
//! - [`core::cpu`]: Core identifiers and the SH-2 control-flow classifier
//! - [`core::system`]: Ties memory and fetch engine together (bus write path)
//! - [`core::config`]: TOML/env configuration
//!
//! # Example
//!
//! ```
//! use s32x::core::config::Config;
//! use s32x::core::cpu::CpuCore;
//! use s32x::core::memory::AccessSize;
//! use s32x::core::system::System;
//!
//! let mut system = System::new(Config::default())?;
//! system.write(CpuCore::Primary, 0x2600_0100, 0x0009, AccessSize::Word)?;
//!
//! let outcome = system.fetch(0x0600_0100, CpuCore::Primary)?;
//! assert_eq!(outcome.opcode, 0x0009);
//! # Ok::<(), s32x::core::error::EmulatorError>(())
//! ```
//!
//! # Error Handling
//!
//! All fallible operations return [`core::error::Result<T>`] which is an alias for
//! `Result<T, EmulatorError>`.

pub mod core;

// Re-export commonly used types
pub use core::error::{EmulatorError, Result};
