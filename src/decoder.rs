//! Conversion of WOFF2 files into TrueType/OpenType fonts.

use std::collections::HashMap;
use std::io::{Cursor, Read};

use log::warn;

use crate::binary::read::ReadScope;
use crate::binary::write::WriteBuffer;
use crate::error::{ParseError, ReadWriteError};
use crate::header::{Woff2File, BROTLI_DECODER_BUFFER_SIZE};
use crate::sfnt;

// Over 14k test fonts the max compression ratio seen to date was ~20.
// >100 suggests you wrote a bad uncompressed size.
const MAX_PLAUSIBLE_COMPRESSION_RATIO: f32 = 100.0;

/// Return the size the font is declared to occupy once decoded.
///
/// This is the totalSfntSize field of the WOFF2 header. It is a hint only, the actual
/// output of [`convert_to_ttf`] may differ in size. Returns 0 on short input.
pub fn compute_final_size(data: &[u8]) -> u64 {
    let mut ctxt = ReadScope::new(data).ctxt();
    match ctxt.read_slice(16).and_then(|_| ctxt.read_u32be()) {
        Ok(total_sfnt_size) => u64::from(total_sfnt_size),
        Err(_) => 0,
    }
}

/// Decode a WOFF2 file into a TrueType/OpenType font or font collection.
pub fn convert_to_ttf(data: &[u8]) -> Result<Vec<u8>, ReadWriteError> {
    let woff = ReadScope::new(data).read::<Woff2File<'_>>()?;

    let mut out = WriteBuffer::new();
    let mut fonts = sfnt::write_headers(&woff, &mut out)?;

    let compression_ratio = woff.uncompressed_size as f32 / data.len() as f32;
    if compression_ratio > MAX_PLAUSIBLE_COMPRESSION_RATIO {
        warn!("implausible compression ratio {:.1}", compression_ratio);
        return Err(ReadWriteError::Read(ParseError::LimitExceeded));
    }
    if woff.uncompressed_size < 1 {
        return Err(ReadWriteError::Read(ParseError::BadValue));
    }

    let uncompressed = decompress(woff.compressed, woff.uncompressed_size)?;

    let mut tables = woff.tables;
    let mut checksums = HashMap::new();
    for (font_index, font) in fonts.iter_mut().enumerate() {
        sfnt::reconstruct_font(
            &uncompressed,
            &mut tables,
            font,
            &mut checksums,
            font_index == 0,
            &mut out,
        )?;
    }

    Ok(out.into_inner())
}

/// Brotli decompress the table data block, which must yield exactly
/// `uncompressed_size` bytes.
fn decompress(compressed: &[u8], uncompressed_size: u32) -> Result<Vec<u8>, ParseError> {
    let decompressor = brotli_decompressor::Decompressor::new(
        Cursor::new(compressed),
        BROTLI_DECODER_BUFFER_SIZE,
    );
    let mut uncompressed = Vec::with_capacity(usize::try_from(uncompressed_size)?);
    decompressor
        .take(u64::from(uncompressed_size) + 1)
        .read_to_end(&mut uncompressed)
        .map_err(|_err| ParseError::CompressionError)?;
    if uncompressed.len() != usize::try_from(uncompressed_size)? {
        return Err(ParseError::CompressionError);
    }

    Ok(uncompressed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compute_final_size() {
        let mut data = vec![0u8; 20];
        data[16..20].copy_from_slice(&0x00012345u32.to_be_bytes());
        assert_eq!(compute_final_size(&data), 0x00012345);
        assert_eq!(compute_final_size(&data[..10]), 0);
        assert_eq!(compute_final_size(&[]), 0);
    }

    #[test]
    fn test_decompress_stored_block() {
        // a stored Brotli metablock: header, the literal bytes, empty last block
        let compressed = [0x30, 0x00, 0x10, 1, 2, 3, 4, 0x03];
        assert_eq!(decompress(&compressed, 4).unwrap(), vec![1, 2, 3, 4]);
        assert!(decompress(&compressed, 5).is_err());
        assert!(decompress(&compressed, 3).is_err());
    }
}
