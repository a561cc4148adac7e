//! Reconstruction of the transformed `hmtx` table.
//!
//! <https://www.w3.org/TR/WOFF2/#hmtx_table_format>

use std::num::Wrapping;

use bitflags::bitflags;

use crate::binary::read::ReadScope;
use crate::binary::write::{WriteBinary, WriteBuffer, WriteContext};
use crate::binary::{I16Be, U16Be};
use crate::checksum;
use crate::error::{ParseError, ReadWriteError};

bitflags! {
    pub struct HmtxTableFlag: u8 {
        const LSB_ABSENT = 0b01;
        const LEFT_SIDE_BEARING_ABSENT = 0b10;
    }
}

impl HmtxTableFlag {
    pub fn lsb_is_present(self) -> bool {
        self & Self::LSB_ABSENT == Self::empty()
    }

    pub fn left_side_bearing_is_present(self) -> bool {
        self & Self::LEFT_SIDE_BEARING_ABSENT == Self::empty()
    }
}

/// Reconstruct a transformed `hmtx` table, writing the standard layout to `out`.
///
/// The transformation exploits the built-in redundancy of TrueType glyphs, where the
/// outlines designed according to the TrueType recommendations have left side bearing
/// values equal to the x_min of the glyph bounding box. Left side bearing arrays the
/// encoder omitted are reconstituted from the `x_mins` gathered during `glyf`
/// reconstruction.
pub(crate) fn reconstruct(
    transformed: &[u8],
    num_glyphs: u16,
    num_hmetrics: u16,
    x_mins: &[i16],
    out: &mut WriteBuffer,
) -> Result<(Wrapping<u32>, u32), ReadWriteError> {
    let mut ctxt = ReadScope::new(transformed).ctxt();

    let flags = ctxt.read_u8().map_err(ParseError::from)?;
    // Bits 2 to 7 are reserved and must be zero
    if flags & 0xFC != 0 {
        return Err(ReadWriteError::Read(ParseError::BadValue));
    }
    let flags = HmtxTableFlag::from_bits_truncate(flags);

    // You say you transformed but there is little evidence of it
    if flags.lsb_is_present() && flags.left_side_bearing_is_present() {
        return Err(ReadWriteError::Read(ParseError::BadValue));
    }

    // A zero glyph count is only possible when there is no glyf table, which rules
    // out an hmtx transform. The metrics array is never empty either.
    if num_hmetrics > num_glyphs || num_hmetrics < 1 {
        return Err(ReadWriteError::Read(ParseError::BadIndex));
    }
    if x_mins.len() != usize::from(num_glyphs) {
        return Err(ReadWriteError::Read(ParseError::BadIndex));
    }

    let num_hmetrics = usize::from(num_hmetrics);
    let num_glyphs = usize::from(num_glyphs);

    let advance_widths = ctxt.read_array::<U16Be>(num_hmetrics)?;
    let lsbs = if flags.lsb_is_present() {
        ctxt.read_array::<I16Be>(num_hmetrics)?.to_vec()
    } else {
        x_mins[..num_hmetrics].to_vec()
    };
    let left_side_bearings = if flags.left_side_bearing_is_present() {
        ctxt.read_array::<I16Be>(num_glyphs - num_hmetrics)?.to_vec()
    } else {
        x_mins[num_hmetrics..].to_vec()
    };

    // Bake a shiny new hmtx table
    let mut table = WriteBuffer::new();
    for (advance_width, lsb) in advance_widths.iter().zip(lsbs) {
        U16Be::write(&mut table, advance_width)?;
        I16Be::write(&mut table, lsb)?;
    }
    for lsb in left_side_bearings {
        I16Be::write(&mut table, lsb)?;
    }

    let table_checksum = checksum::table_checksum(table.bytes());
    let length = u32::try_from(table.len()).map_err(ParseError::from)?;
    out.write_bytes(table.bytes())?;

    Ok((table_checksum, length))
}
