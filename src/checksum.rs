#![deny(missing_docs)]

//! OpenType table checksums.

use std::num::Wrapping;

/// Calculate a checksum of `data` according to the OpenType table checksum algorithm
///
/// Data whose length is not a multiple of four is treated as if it were zero padded
/// to the next 32-bit boundary.
///
/// <https://docs.microsoft.com/en-us/typography/opentype/spec/otff#calculating-checksums>
pub fn table_checksum(data: &[u8]) -> Wrapping<u32> {
    let mut chunks = data.chunks_exact(4);
    let mut checksum = chunks
        .by_ref()
        .map(|chunk| {
            // cast is safe as chunks are always 4 bytes
            Wrapping(u32::from_be_bytes(chunk.try_into().unwrap()))
        })
        .sum::<Wrapping<u32>>();

    let tail = chunks.remainder();
    if !tail.is_empty() {
        let mut word = [0u8; 4];
        word[..tail.len()].copy_from_slice(tail);
        checksum += Wrapping(u32::from_be_bytes(word));
    }

    checksum
}
