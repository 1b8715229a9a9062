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

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use s32x::core::config::Config;
use s32x::core::cpu::CpuCore;
use s32x::core::memory::AccessSize;
use s32x::core::system::System;
use std::hint::black_box;

const PC: u32 = 0x0600_1000;

/// 16 blocks of 7 nops plus bt
fn program() -> Vec<u8> {
    let mut words = Vec::new();
    for _ in 0..16 {
        words.extend_from_slice(&[0x0009u16; 7]);
        words.push(0x8900);
    }
    words.iter().flat_map(|word| word.to_be_bytes()).collect()
}

fn system(prefetch_enabled: bool, cache_enabled: bool) -> System {
    let config = Config {
        prefetch_enabled,
        ..Config::default()
    };
    let mut system = System::new(config).expect("default config is valid");
    system.load_sdram(0x1000, &program()).expect("program fits");
    system.set_cache_enabled(CpuCore::Primary, cache_enabled);
    system
}

fn bench_fetch(c: &mut Criterion) {
    let mut group = c.benchmark_group("fetch");
    group.throughput(Throughput::Elements(128));

    for (name, prefetch, cache) in [
        ("blocks", true, false),
        ("blocks_cached", true, true),
        ("direct", false, false),
        ("direct_cached", false, true),
    ] {
        let mut system = system(prefetch, cache);
        group.bench_function(BenchmarkId::new("walk", name), |b| {
            b.iter(|| {
                for i in 0..128u32 {
                    let outcome = system.fetch(black_box(PC + 2 * i), CpuCore::Primary).unwrap();
                    black_box(outcome.opcode);
                }
            })
        });
    }

    group.finish();
}

fn bench_store_refetch(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_refetch");

    for (name, word) in [("recycle", 0x0009u32), ("toggle", 0x0019u32)] {
        let mut system = system(true, false);
        let mut flip = false;
        group.bench_function(name, |b| {
            b.iter(|| {
                // "recycle" restores the same word, "toggle" alternates content
                let value = if flip { word } else { 0x0009 };
                flip = !flip;
                system
                    .write(CpuCore::Secondary, PC + 6, value, AccessSize::Word)
                    .unwrap();
                black_box(system.fetch(PC, CpuCore::Primary).unwrap().opcode);
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_fetch, bench_store_refetch);
criterion_main!(benches);
