//! Overwrite pass patterns.
//!
//! One pass writes one pattern over the whole extent. Long schedules use
//! the 27 fixed patterns of Gutmann's method framed by runs of random
//! passes.

use crate::config::PassPolicy;
use rand::rngs::OsRng;
use rand::RngCore;

/// Random passes before and after the fixed patterns.
const RANDOM_RUN: usize = 5;

/// The fixed Gutmann patterns, in order.
const GUTMANN: [Pattern; 27] = [
    Pattern::Byte(0x55),
    Pattern::Byte(0xAA),
    Pattern::Triple([0x92, 0x49, 0x24]),
    Pattern::Triple([0x49, 0x24, 0x92]),
    Pattern::Triple([0x24, 0x92, 0x49]),
    Pattern::Byte(0x00),
    Pattern::Byte(0x11),
    Pattern::Byte(0x22),
    Pattern::Byte(0x33),
    Pattern::Byte(0x44),
    Pattern::Byte(0x55),
    Pattern::Byte(0x66),
    Pattern::Byte(0x77),
    Pattern::Byte(0x88),
    Pattern::Byte(0x99),
    Pattern::Byte(0xAA),
    Pattern::Byte(0xBB),
    Pattern::Byte(0xCC),
    Pattern::Byte(0xDD),
    Pattern::Byte(0xEE),
    Pattern::Byte(0xFF),
    Pattern::Triple([0x92, 0x49, 0x24]),
    Pattern::Triple([0x49, 0x24, 0x92]),
    Pattern::Triple([0x24, 0x92, 0x49]),
    Pattern::Triple([0x6D, 0xB6, 0xDB]),
    Pattern::Triple([0xB6, 0xDB, 0x6D]),
    Pattern::Triple([0xDB, 0x6D, 0xB6]),
];

/// Data written by a single pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Pattern {
    Random,
    Byte(u8),
    Triple([u8; 3]),
}

impl Pattern {
    /// Fill `buf`, which starts `offset` bytes into the extent.
    ///
    /// Three-byte patterns stay aligned to the extent start across chunks.
    pub fn fill(&self, buf: &mut [u8], offset: u64, rng: &mut dyn RngCore) {
        match self {
            Pattern::Random => rng.fill_bytes(buf),
            Pattern::Byte(byte) => buf.fill(*byte),
            Pattern::Triple(triple) => {
                let start = (offset % 3) as usize;
                for (i, slot) in buf.iter_mut().enumerate() {
                    *slot = triple[(start + i) % 3];
                }
            }
        }
    }
}

/// The full 38-pass sequence.
fn full_schedule() -> Vec<Pattern> {
    let mut passes = Vec::with_capacity(1 + 2 * RANDOM_RUN + GUTMANN.len());
    passes.push(Pattern::Byte(0xFF));
    passes.extend(std::iter::repeat(Pattern::Random).take(RANDOM_RUN));
    passes.extend_from_slice(&GUTMANN);
    passes.extend(std::iter::repeat(Pattern::Random).take(RANDOM_RUN));
    passes
}

/// Patterns for every pass of `policy`, final zero pass included.
///
/// The last pattern pass is always random.
pub fn schedule(policy: &PassPolicy) -> Vec<Pattern> {
    let count = policy.pass_count as usize;
    let mut passes = match count {
        0 => Vec::new(),
        1 => vec![Pattern::Random],
        2 => vec![Pattern::Byte(0xFF), Pattern::Random],
        _ => {
            let mut passes: Vec<Pattern> = full_schedule().into_iter().cycle().take(count).collect();
            if let Some(last) = passes.last_mut() {
                *last = Pattern::Random;
            }
            passes
        }
    };

    if policy.final_zero_pass {
        passes.push(Pattern::Byte(0x00));
    }
    passes
}

/// Random source for a policy.
///
/// Fast mode trades the OS entropy source for the thread-local generator.
pub fn rng(fast_mode: bool) -> Box<dyn RngCore> {
    if fast_mode {
        Box::new(rand::thread_rng())
    } else {
        Box::new(OsRng)
    }
}
