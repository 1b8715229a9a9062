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

//! SH-2 control-flow classification
//!
//! The fetch layer never executes instructions, but it has to know where a
//! straight-line run ends: at a branch (plus its delay slot, for the delayed
//! forms) or at an encoding the core would raise an illegal-instruction
//! exception for.
//!
//! Format: | op (4) | n (4) | m (4) | sub (4) |

/// Control-flow class of a 16-bit SH-2 instruction word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstructionClass {
    /// Falls through to the next word
    Sequential,
    /// Branch that takes effect immediately (BT, BF, TRAPA)
    Branch,
    /// Branch followed by a mandatory delay slot
    /// (BRA, BSR, BRAF, BSRF, JMP, JSR, RTS, RTE, BT/S, BF/S)
    DelayedBranch,
    /// Undefined encoding
    Illegal,
}

impl InstructionClass {
    /// True if a block scan must stop after this word (or its delay slot)
    #[inline(always)]
    pub fn ends_block(self) -> bool {
        !matches!(self, InstructionClass::Sequential)
    }

    /// True for both branch forms
    #[inline(always)]
    pub fn is_branch(self) -> bool {
        matches!(
            self,
            InstructionClass::Branch | InstructionClass::DelayedBranch
        )
    }
}

/// Classify an instruction word
///
/// # Arguments
///
/// * `word` - The 16-bit instruction
///
/// # Example
///
/// ```
/// use s32x::core::cpu::{classify, InstructionClass};
///
/// assert_eq!(classify(0x0009), InstructionClass::Sequential); // nop
/// assert_eq!(classify(0xAFFE), InstructionClass::DelayedBranch); // bra
/// assert_eq!(classify(0x8900), InstructionClass::Branch); // bt
/// assert_eq!(classify(0xFFFF), InstructionClass::Illegal);
/// ```
#[inline]
pub fn classify(word: u16) -> InstructionClass {
    match word >> 12 {
        0x0 => classify_group0(word),
        0x1 | 0x5 | 0x6 | 0x7 | 0x9 | 0xD | 0xE => InstructionClass::Sequential,
        // 2nm3 is unassigned
        0x2 => sequential_unless(word & 0xF == 0x3),
        // 3nm1 and 3nm9 are unassigned
        0x3 => sequential_unless(matches!(word & 0xF, 0x1 | 0x9)),
        0x4 => classify_group4(word),
        0x8 => match (word >> 8) & 0xF {
            0x0 | 0x1 | 0x4 | 0x5 | 0x8 => InstructionClass::Sequential,
            0x9 | 0xB => InstructionClass::Branch,
            0xD | 0xF => InstructionClass::DelayedBranch,
            _ => InstructionClass::Illegal,
        },
        0xA | 0xB => InstructionClass::DelayedBranch,
        // TRAPA #imm
        0xC if (word >> 8) & 0xF == 0x3 => InstructionClass::Branch,
        0xC => InstructionClass::Sequential,
        // No FPU on the SH-2
        _ => InstructionClass::Illegal,
    }
}

#[inline(always)]
fn sequential_unless(illegal: bool) -> InstructionClass {
    if illegal {
        InstructionClass::Illegal
    } else {
        InstructionClass::Sequential
    }
}

/// 0nmX: system register moves, indexed moves, RTS/RTE, BRAF/BSRF
fn classify_group0(word: u16) -> InstructionClass {
    let n = (word >> 8) & 0xF;
    let m = (word >> 4) & 0xF;

    match word & 0xF {
        // STC SR/GBR/VBR,Rn
        0x2 => sequential_unless(m > 2),
        // BSRF Rn / BRAF Rn
        0x3 if m == 0 || m == 2 => InstructionClass::DelayedBranch,
        // MOV.x Rm,@(R0,Rn); MUL.L; MOV.x @(R0,Rm),Rn; MAC.L
        0x4..=0x7 | 0xC..=0xF => InstructionClass::Sequential,
        // CLRT, SETT, CLRMAC
        0x8 => sequential_unless(n != 0 || m > 2),
        // NOP, DIV0U, MOVT Rn
        0x9 => match m {
            0x0 | 0x1 => sequential_unless(n != 0),
            0x2 => InstructionClass::Sequential,
            _ => InstructionClass::Illegal,
        },
        // STS MACH/MACL/PR,Rn
        0xA => sequential_unless(m > 2),
        0xB if n == 0 => match m {
            0x0 | 0x2 => InstructionClass::DelayedBranch, // RTS, RTE
            0x1 => InstructionClass::Sequential,          // SLEEP
            _ => InstructionClass::Illegal,
        },
        _ => InstructionClass::Illegal,
    }
}

/// 4nXX: shifts, control register loads/stores, JMP/JSR, MAC.W
fn classify_group4(word: u16) -> InstructionClass {
    // MAC.W @Rm+,@Rn+
    if word & 0xF == 0xF {
        return InstructionClass::Sequential;
    }

    match word & 0xFF {
        // JSR @Rn, JMP @Rn
        0x0B | 0x2B => InstructionClass::DelayedBranch,
        0x00..=0x0A | 0x0E => InstructionClass::Sequential,
        0x10 | 0x11 | 0x12 | 0x13 | 0x15..=0x1B | 0x1E => InstructionClass::Sequential,
        0x20..=0x2A | 0x2E => InstructionClass::Sequential,
        _ => InstructionClass::Illegal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ========== Branch Tests ==========

    #[test]
    fn test_delayed_branches() {
        let delayed = [
            0xA000, // bra
            0xB123, // bsr
            0x0123, // braf r1
            0x0403, // bsrf r4
            0x402B, // jmp @r0
            0x4E0B, // jsr @r14
            0x000B, // rts
            0x002B, // rte
            0x8D10, // bt/s
            0x8FFE, // bf/s
        ];

        for word in delayed {
            assert_eq!(
                classify(word),
                InstructionClass::DelayedBranch,
                "0x{:04X} should be a delayed branch",
                word
            );
        }
    }

    #[test]
    fn test_immediate_branches() {
        assert_eq!(classify(0x8900), InstructionClass::Branch); // bt
        assert_eq!(classify(0x8BFE), InstructionClass::Branch); // bf
        assert_eq!(classify(0xC320), InstructionClass::Branch); // trapa #0x20
    }

    // ========== Sequential Tests ==========

    #[test]
    fn test_common_sequential_instructions() {
        let sequential = [
            0x0009, // nop
            0x0019, // div0u
            0x0028, // clrmac
            0x001B, // sleep
            0x6103, // mov r0,r1
            0x7001, // add #1,r0
            0xE0FF, // mov #-1,r0
            0xD001, // mov.l @(disp,pc),r0
            0x2008, // tst r0,r0
            0x3010, // cmp/eq r1,r0
            0x4010, // dt r0
            0x400E, // ldc r0,sr
            0xC800, // tst #0,r0
            0x8800, // cmp/eq #0,r0
            0x02AF, // mac.l
            0x4F1F, // mac.w
        ];

        for word in sequential {
            assert_eq!(
                classify(word),
                InstructionClass::Sequential,
                "0x{:04X} should be sequential",
                word
            );
        }
    }

    // ========== Illegal Tests ==========

    #[test]
    fn test_illegal_encodings() {
        let illegal = [
            0x0000, 0x0001, 0x0039, 0x0108, 0x003B, 0x0033, 0x2003, 0x3001, 0x3009,
            0x400C, 0x4014, 0x8200, 0x8E00, 0xF000, 0xFFFD,
        ];

        for word in illegal {
            assert_eq!(
                classify(word),
                InstructionClass::Illegal,
                "0x{:04X} should be illegal",
                word
            );
        }
    }

    #[test]
    fn test_ends_block() {
        assert!(!InstructionClass::Sequential.ends_block());
        assert!(InstructionClass::Branch.ends_block());
        assert!(InstructionClass::DelayedBranch.ends_block());
        assert!(InstructionClass::Illegal.ends_block());

        assert!(!InstructionClass::Illegal.is_branch());
        assert!(InstructionClass::Branch.is_branch());
    }
}
