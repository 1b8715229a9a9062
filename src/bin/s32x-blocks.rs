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

//! Block scan report
//!
//! Loads a raw big-endian SH-2 image and walks it block by block from a
//! start PC, printing what the fetch engine scanned. Useful for checking
//! where blocks end in a real program.

use clap::{Parser, ValueEnum};
use s32x::core::config::Config;
use s32x::core::cpu::CpuCore;
use s32x::core::system::System;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "s32x-blocks", about = "Walk an SH-2 image block by block")]
struct Args {
    /// Raw big-endian image
    image: PathBuf,

    /// Region the image is loaded into
    #[arg(long, value_enum, default_value_t = Base::Sdram)]
    base: Base,

    /// First PC (defaults to the start of the region's cached alias)
    #[arg(long, value_parser = parse_address)]
    start: Option<u32>,

    /// Number of blocks to walk
    #[arg(long, default_value_t = 16)]
    blocks: usize,

    /// Core to fetch with
    #[arg(long, value_enum, default_value_t = Core::Primary)]
    core: Core,

    /// TOML configuration file (defaults to S32X_CONFIG or built-in defaults)
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Fetch through memory instead of the block cache
    #[arg(long, action = clap::ArgAction::SetTrue)]
    no_prefetch: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Base {
    Sdram,
    Rom,
}

impl Base {
    fn origin(self) -> u32 {
        match self {
            Base::Sdram => 0x0600_0000,
            Base::Rom => 0x0200_0000,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Core {
    Primary,
    Secondary,
}

impl From<Core> for CpuCore {
    fn from(core: Core) -> Self {
        match core {
            Core::Primary => CpuCore::Primary,
            Core::Secondary => CpuCore::Secondary,
        }
    }
}

fn parse_address(value: &str) -> Result<u32, String> {
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) => u32::from_str_radix(hex, 16),
        None => value.parse(),
    };
    parsed.map_err(|e| format!("invalid address '{}': {}", value, e))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::from_env()?,
    };
    if args.no_prefetch {
        config.prefetch_enabled = false;
    }

    let mut system = System::new(config)?;
    let image = std::fs::read(&args.image)?;
    match args.base {
        Base::Sdram => system.load_sdram(0, &image)?,
        Base::Rom => system.load_rom(&image)?,
    }
    log::info!("Loaded {} ({} bytes)", args.image.display(), image.len());

    let core = CpuCore::from(args.core);
    let mut pc = args.start.unwrap_or(args.base.origin());

    println!("{:<10}  {:>5}  {:<10}  {:<16}  first", "pc", "words", "end", "hash");
    for _ in 0..args.blocks {
        let outcome = match system.fetch(pc, core) {
            Ok(outcome) => outcome,
            Err(e) => {
                log::error!("Stopped at 0x{:08X}: {}", pc, e);
                break;
            }
        };

        match &outcome.block {
            Some(block) => {
                println!(
                    "0x{:08X}  {:>5}  {:<10}  {:016X}  0x{:04X}",
                    pc,
                    block.len(),
                    format!("{:?}", block.end),
                    block.hash,
                    outcome.opcode
                );
                pc = pc.wrapping_add(2 * block.len() as u32);
            }
            None => {
                println!("0x{:08X}  {:>5}  {:<10}  {:<16}  0x{:04X}", pc, 1, "-", "-", outcome.opcode);
                pc = pc.wrapping_add(2);
            }
        }
    }

    let stats = system.stats();
    println!();
    println!(
        "{} hits, {} misses, {} recycled, {} collisions, {} fetch cycles",
        stats.hits,
        stats.misses,
        stats.recycled,
        stats.collisions,
        system.fetch_cycles(core)
    );

    Ok(())
}
