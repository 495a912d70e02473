//! The block-diagonal interleavers of GSM 05.03 3.1.3 and 4.1.4.
//!
//! Both the 4-burst control interleave and the 8-burst diagonal traffic
//! interleave use the same intra-burst bit position formula; they differ
//! only in the number of blocks and the alternating block offset of the
//! traffic channel.

use gsm_core::{BitVector, SoftVector};

/// Block and intra-burst position of coded bit `k`:
/// B = (k + blockOffset) mod num_blocks, j = 2((49k) mod 57) + ((k mod 8) div 4).
#[inline]
pub const fn interleave_index(k: usize, block_offset: usize, num_blocks: usize) -> (usize, usize) {
    let b = (k + block_offset) % num_blocks;
    let j = 2 * ((49 * k) % 57) + ((k % 8) / 4);
    (b, j)
}

/// Spread 456 coded bits over the interleaver blocks.
pub fn interleave(c: &BitVector, i: &mut [BitVector], block_offset: usize) {
    assert!(c.len() == 456);
    for k in 0..456 {
        let (b, j) = interleave_index(k, block_offset, i.len());
        i[b].set_bit(j, c.bit(k));
    }
}

/// Gather 456 soft bits back out of the interleaver blocks.
///
/// Each contributing position is reset to 0.5 once read, so a burst that
/// never arrives stays neutral for the decoder and cannot leak into the
/// next frame.
pub fn deinterleave(i: &mut [SoftVector], c: &mut SoftVector, block_offset: usize) {
    assert!(c.len() == 456);
    for k in 0..456 {
        let (b, j) = interleave_index(k, block_offset, i.len());
        c.set(k, i[b].get(j));
        i[b].set(j, 0.5);
    }
}
