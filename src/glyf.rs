//! Reconstruction of the transformed `glyf` table and its `loca` index.
//!
//! The transformed table holds seven interleaved substreams plus an optional overlap
//! bitmap. Reconstruction walks them a glyph at a time, re-encodes each glyph as a
//! standard TrueType glyph record, and produces the `loca` table as a side effect.
//!
//! <https://www.w3.org/TR/WOFF2/#glyf_table_format>

use std::num::Wrapping;

use bitflags::bitflags;
use log::warn;

use crate::binary::read::{ReadBinary, ReadCtxt, ReadScope};
use crate::binary::write::{WriteBinary, WriteBuffer, WriteContext};
use crate::binary::{U16Be, U32Be};
use crate::checksum;
use crate::error::{ParseError, ReadWriteError};
use crate::header::PackedU16;
use crate::lut::{XYTriplet, COORD_LUT};

// 98% of Google Fonts have no glyph above 5k bytes
// Largest glyph ever observed was 72k bytes
const DEFAULT_GLYPH_BUF: usize = 5120;
const HAS_OVERLAP_BITMAP: u16 = 1 << 0;
const COMPOSITE_GLYPH: u16 = 0xFFFF;

bitflags! {
    #[rustfmt::skip]
    pub struct SimpleGlyphFlag: u8 {
        const ON_CURVE_POINT                       = 0b0000_0001;
        const X_SHORT_VECTOR                       = 0b0000_0010;
        const Y_SHORT_VECTOR                       = 0b0000_0100;
        const REPEAT_FLAG                          = 0b0000_1000;
        const X_IS_SAME_OR_POSITIVE_X_SHORT_VECTOR = 0b0001_0000;
        const Y_IS_SAME_OR_POSITIVE_Y_SHORT_VECTOR = 0b0010_0000;
        const OVERLAP_SIMPLE                       = 0b0100_0000;
    }
}

bitflags! {
    pub struct CompositeGlyphFlag: u16 {
        /// Bit 0: If this is set, the arguments are 16-bit (uint16 or int16); otherwise,
        /// they are bytes (uint8 or int8).
        const ARG_1_AND_2_ARE_WORDS = 0x0001;
        /// Bit 3: This indicates that there is a simple scale for the component.
        /// Otherwise, scale = 1.0.
        const WE_HAVE_A_SCALE = 0x0008;
        /// Bit 5: Indicates at least one more glyph after this one.
        const MORE_COMPONENTS = 0x0020;
        /// Bit 6: The x direction will use a different scale from the y direction.
        const WE_HAVE_AN_X_AND_Y_SCALE = 0x0040;
        /// Bit 7: There is a 2 by 2 transformation that will be used to scale the
        /// component.
        const WE_HAVE_A_TWO_BY_TWO = 0x0080;
        /// Bit 8: Following the last component are instructions for the composite
        /// character.
        const WE_HAVE_INSTRUCTIONS = 0x0100;
    }
}

/// An absolute outline point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
    pub on_curve: bool,
}

#[derive(Clone, Copy)]
struct WoffFlag(u8);

pub struct BitSlice<'a> {
    data: &'a [u8],
}

struct TransformedGlyfTable<'a> {
    /// Number of glyphs
    num_glyphs: u16,
    /// Offset format for the reconstructed loca table, 0 for short offsets, 1 for long
    index_format: u16,
    /// Stream of u16 values representing number of contours for each glyph record
    n_contour_scope: ReadScope<'a>,
    /// Stream of values representing number of outline points for each contour
    n_points_scope: ReadScope<'a>,
    /// Stream of u8 values representing flag values for each outline point
    flag_scope: ReadScope<'a>,
    /// Stream of triplet encoded point coordinates and instruction lengths
    glyph_scope: ReadScope<'a>,
    /// Stream of component flag values and associated composite glyph data
    composite_scope: ReadScope<'a>,
    /// Bitmap (a numGlyphs-long bit array) indicating explicit bounding boxes
    bbox_bitmap: BitSlice<'a>,
    /// Stream of i16 values representing glyph bounding box data
    bbox_scope: ReadScope<'a>,
    /// Stream of u8 values representing a set of instructions for each glyph
    instruction_scope: ReadScope<'a>,
    /// Bitmap marking simple glyphs whose first flag should carry OVERLAP_SIMPLE
    overlap_bitmap: Option<BitSlice<'a>>,
}

/// The values produced by reconstructing a transformed `glyf` table.
pub(crate) struct ReconstructedGlyf {
    pub num_glyphs: u16,
    pub index_format: u16,
    /// x_min of each non-empty glyph, zero for empty glyphs
    pub x_mins: Vec<i16>,
    pub glyf_length: u32,
    pub glyf_checksum: Wrapping<u32>,
    pub loca_length: u32,
    pub loca_checksum: Wrapping<u32>,
}

struct Reconstructor<'a> {
    n_contours: ReadCtxt<'a>,
    n_points: ReadCtxt<'a>,
    flags: ReadCtxt<'a>,
    glyphs: ReadCtxt<'a>,
    composites: ReadCtxt<'a>,
    bboxes: ReadCtxt<'a>,
    instructions: ReadCtxt<'a>,
    bbox_bitmap: BitSlice<'a>,
    overlap_bitmap: Option<BitSlice<'a>>,
    // per glyph scratch, reused across the glyph loop
    point_counts: Vec<u16>,
    points: Vec<Point>,
    glyph_buf: Vec<u8>,
}

impl<'a> ReadBinary<'a> for TransformedGlyfTable<'a> {
    type HostType = Self;

    fn read(ctxt: &mut ReadCtxt<'a>) -> Result<Self, ParseError> {
        let _version = ctxt.read_u16be()?;
        let flags = ctxt.read_u16be()?;
        let num_glyphs = ctxt.read_u16be()?;
        let index_format = ctxt.read_u16be()?;

        let n_contour_stream_size = usize::try_from(ctxt.read_u32be()?)?;
        let n_points_stream_size = usize::try_from(ctxt.read_u32be()?)?;
        let flag_stream_size = usize::try_from(ctxt.read_u32be()?)?;
        let glyph_stream_size = usize::try_from(ctxt.read_u32be()?)?;
        let composite_stream_size = usize::try_from(ctxt.read_u32be()?)?;
        let bbox_stream_size = usize::try_from(ctxt.read_u32be()?)?;
        let instruction_stream_size = usize::try_from(ctxt.read_u32be()?)?;

        // Carve the substreams off in order. Each read fails if the declared size
        // exceeds what remains of the transformed table.
        let n_contour_scope = ReadScope::new(ctxt.read_slice(n_contour_stream_size)?);
        let n_points_scope = ReadScope::new(ctxt.read_slice(n_points_stream_size)?);
        let flag_scope = ReadScope::new(ctxt.read_slice(flag_stream_size)?);
        let glyph_scope = ReadScope::new(ctxt.read_slice(glyph_stream_size)?);
        let composite_scope = ReadScope::new(ctxt.read_slice(composite_stream_size)?);

        // The bbox stream leads with a bitmap of ceil(numGlyphs / 8) bytes rounded up
        // to a 32-bit boundary. Bit i set means glyph i has an explicit bounding box.
        let bbox_stream = ctxt.read_slice(bbox_stream_size)?;
        let bitmap_length = 4 * ((usize::from(num_glyphs) + 31) / 32);
        if bitmap_length > bbox_stream.len() {
            return Err(ParseError::BadEof);
        }
        let (bbox_bitmap, bboxes) = bbox_stream.split_at(bitmap_length);

        let instruction_scope = ReadScope::new(ctxt.read_slice(instruction_stream_size)?);

        let overlap_bitmap = if flags & HAS_OVERLAP_BITMAP != 0 {
            let overlap_bitmap_length = (usize::from(num_glyphs) + 7) / 8;
            Some(BitSlice::new(ctxt.read_slice(overlap_bitmap_length)?))
        } else {
            None
        };

        Ok(TransformedGlyfTable {
            num_glyphs,
            index_format,
            n_contour_scope,
            n_points_scope,
            flag_scope,
            glyph_scope,
            composite_scope,
            bbox_bitmap: BitSlice::new(bbox_bitmap),
            bbox_scope: ReadScope::new(bboxes),
            instruction_scope,
            overlap_bitmap,
        })
    }
}

/// Reconstruct the `glyf` and `loca` tables from a transformed `glyf` table.
///
/// The glyph records are written to `out`, each padded to a 4 byte boundary, followed
/// by the `loca` table. `loca_dst_length` is the size the directory declared for the
/// sibling `loca` table, which must agree with the glyph count and index format.
pub(crate) fn reconstruct(
    transformed: &[u8],
    loca_dst_length: u32,
    out: &mut WriteBuffer,
) -> Result<ReconstructedGlyf, ReadWriteError> {
    let table = ReadScope::new(transformed).read::<TransformedGlyfTable<'_>>()?;
    let num_glyphs = usize::from(table.num_glyphs);

    // https://dev.w3.org/webfonts/WOFF2/spec/#conform-mustRejectLoca
    let offset_size: u32 = if table.index_format != 0 { 4 } else { 2 };
    let expected_loca_length = offset_size * (u32::from(table.num_glyphs) + 1);
    if loca_dst_length != expected_loca_length {
        return Err(ReadWriteError::Read(ParseError::BadValue));
    }

    let mut engine = Reconstructor {
        n_contours: table.n_contour_scope.ctxt(),
        n_points: table.n_points_scope.ctxt(),
        flags: table.flag_scope.ctxt(),
        glyphs: table.glyph_scope.ctxt(),
        composites: table.composite_scope.ctxt(),
        bboxes: table.bbox_scope.ctxt(),
        instructions: table.instruction_scope.ctxt(),
        bbox_bitmap: table.bbox_bitmap,
        overlap_bitmap: table.overlap_bitmap,
        point_counts: Vec::new(),
        points: Vec::new(),
        glyph_buf: Vec::with_capacity(DEFAULT_GLYPH_BUF),
    };

    let glyf_start = out.bytes_written();
    let mut loca_values = Vec::with_capacity(num_glyphs + 1);
    let mut x_mins = vec![0i16; num_glyphs];
    let mut glyf_checksum = Wrapping(0);

    for glyph_index in 0..num_glyphs {
        engine.decode_glyph(glyph_index)?;

        let offset = out.bytes_written() - glyf_start;
        loca_values.push(u32::try_from(offset).map_err(ParseError::from)?);
        out.write_bytes(&engine.glyph_buf)?;
        out.pad_to_long()?;
        glyf_checksum += checksum::table_checksum(&engine.glyph_buf);

        // x_min may be needed to reconstruct hmtx. Bytes 2..4 hold it for simple and
        // composite glyphs alike.
        if !engine.glyph_buf.is_empty() {
            x_mins[glyph_index] = i16::from_be_bytes([engine.glyph_buf[2], engine.glyph_buf[3]]);
        }
    }

    let glyf_length =
        u32::try_from(out.bytes_written() - glyf_start).map_err(ParseError::from)?;
    // loca[numGlyphs] is the length of the glyf table
    loca_values.push(glyf_length);
    let (loca_checksum, loca_length) = store_loca(&loca_values, table.index_format, out)?;

    Ok(ReconstructedGlyf {
        num_glyphs: table.num_glyphs,
        index_format: table.index_format,
        x_mins,
        glyf_length,
        glyf_checksum,
        loca_length,
        loca_checksum,
    })
}

impl<'a> Reconstructor<'a> {
    /// Decode the next glyph into the glyph scratch buffer.
    fn decode_glyph(&mut self, glyph_index: usize) -> Result<(), ParseError> {
        self.glyph_buf.clear();
        let have_bbox = self.bbox_bitmap.get(glyph_index) == Some(true);
        let n_contours = self.n_contours.read_u16be()?;

        if n_contours == COMPOSITE_GLYPH {
            // A composite glyph MUST have an explicitly supplied bounding box
            if !have_bbox {
                return Err(ParseError::MissingValue);
            }
            self.decode_composite_glyph()
        } else if n_contours > 0 {
            self.decode_simple_glyph(glyph_index, n_contours, have_bbox)
        } else {
            // empty glyph, which must not have a bounding box
            if have_bbox {
                warn!("empty glyph has a bounding box");
                return Err(ParseError::BadValue);
            }
            Ok(())
        }
    }

    fn decode_composite_glyph(&mut self) -> Result<(), ParseError> {
        let (composite_size, have_instructions) = self.size_of_composite()?;
        let instruction_length = if have_instructions {
            self.glyphs.read::<PackedU16>()?
        } else {
            0
        };

        push_u16(&mut self.glyph_buf, COMPOSITE_GLYPH);
        self.glyph_buf.extend_from_slice(self.bboxes.read_slice(8)?);
        self.glyph_buf
            .extend_from_slice(self.composites.read_slice(composite_size)?);
        if have_instructions {
            push_u16(&mut self.glyph_buf, instruction_length);
            self.glyph_buf
                .extend_from_slice(self.instructions.read_slice(usize::from(instruction_length))?);
        }

        Ok(())
    }

    /// Walk the composite records for one glyph without consuming them.
    ///
    /// Returns the total size of the records and whether any of them carry
    /// instructions.
    fn size_of_composite(&self) -> Result<(usize, bool), ParseError> {
        let mut peek = self.composites.clone();
        let start = peek.offset();
        let mut have_instructions = false;

        let mut flags = CompositeGlyphFlag::MORE_COMPONENTS;
        while flags.contains(CompositeGlyphFlag::MORE_COMPONENTS) {
            flags = CompositeGlyphFlag::from_bits_truncate(peek.read_u16be()?);
            have_instructions |= flags.contains(CompositeGlyphFlag::WE_HAVE_INSTRUCTIONS);

            let mut arg_size = 2; // glyph index
            if flags.contains(CompositeGlyphFlag::ARG_1_AND_2_ARE_WORDS) {
                arg_size += 4;
            } else {
                arg_size += 2;
            }
            if flags.contains(CompositeGlyphFlag::WE_HAVE_A_SCALE) {
                arg_size += 2;
            } else if flags.contains(CompositeGlyphFlag::WE_HAVE_AN_X_AND_Y_SCALE) {
                arg_size += 4;
            } else if flags.contains(CompositeGlyphFlag::WE_HAVE_A_TWO_BY_TWO) {
                arg_size += 8;
            }
            peek.read_slice(arg_size)?;
        }

        Ok((peek.offset() - start, have_instructions))
    }

    fn decode_simple_glyph(
        &mut self,
        glyph_index: usize,
        n_contours: u16,
        have_bbox: bool,
    ) -> Result<(), ParseError> {
        // Read numberOfContours 255UInt16 values from the nPoints stream. Each is the
        // number of points of that contour, the sum is the total number of points.
        self.point_counts.clear();
        let mut total_points = 0u32;
        for _ in 0..n_contours {
            let count = self.n_points.read::<PackedU16>()?;
            total_points = total_points
                .checked_add(u32::from(count))
                .ok_or(ParseError::LimitExceeded)?;
            self.point_counts.push(count);
        }
        if total_points >= 1 << 27 {
            return Err(ParseError::LimitExceeded);
        }

        let flags = self.flags.read_slice(total_points as usize)?;
        self.decode_triplets(flags)?;
        let instruction_length = self.glyphs.read::<PackedU16>()?;

        push_u16(&mut self.glyph_buf, n_contours);
        if have_bbox {
            self.glyph_buf.extend_from_slice(self.bboxes.read_slice(8)?);
        } else {
            push_bbox(&mut self.glyph_buf, &self.points);
        }

        // endPtsOfContours is the cumulative sum of the contour point counts, less one
        let mut end_point = -1i32;
        for &count in &self.point_counts {
            end_point += i32::from(count);
            if end_point >= 65536 {
                return Err(ParseError::LimitExceeded);
            }
            push_u16(&mut self.glyph_buf, end_point as u16);
        }

        push_u16(&mut self.glyph_buf, instruction_length);
        self.glyph_buf
            .extend_from_slice(self.instructions.read_slice(usize::from(instruction_length))?);

        let has_overlap_bit = self
            .overlap_bitmap
            .as_ref()
            .map_or(false, |bitmap| bitmap.get(glyph_index) == Some(true));
        store_points(&self.points, has_overlap_bit, &mut self.glyph_buf);

        Ok(())
    }

    /// Decode `flags.len()` triplet encoded points from the glyph stream.
    ///
    /// The coordinates are deltas against the previous point, the first implicitly
    /// against (0, 0). They are resolved to absolute values here.
    fn decode_triplets(&mut self, flags: &[u8]) -> Result<(), ParseError> {
        self.points.clear();
        let mut x = 0i32;
        let mut y = 0i32;

        for &flag in flags {
            let flag = WoffFlag::new(flag);
            let triplet = flag.xy_triplet();
            let data = self
                .glyphs
                .read_slice(flag.bytes_to_read())?
                .iter()
                .fold(0u32, |data, &byte| (data << 8) | u32::from(byte));

            x = x
                .checked_add(triplet.dx(data))
                .ok_or(ParseError::LimitExceeded)?;
            y = y
                .checked_add(triplet.dy(data))
                .ok_or(ParseError::LimitExceeded)?;
            self.points.push(Point {
                x,
                y,
                on_curve: flag.is_on_curve_point(),
            });
        }

        Ok(())
    }
}

/// Emit the flag and coordinate streams of a simple glyph.
///
/// A delta of zero is elided, deltas in -255..=255 are stored as one unsigned byte
/// with the sign carried in the flag, anything larger as two signed bytes. Runs of
/// equal flags are collapsed with `REPEAT_FLAG` and a count byte.
fn store_points(points: &[Point], has_overlap_bit: bool, buf: &mut Vec<u8>) {
    let mut last_flag = None;
    let mut last_flag_offset = 0;
    let mut repeat_count = 0u8;
    let mut last_x = 0i32;
    let mut last_y = 0i32;

    for (i, point) in points.iter().enumerate() {
        let mut flag = if point.on_curve {
            SimpleGlyphFlag::ON_CURVE_POINT
        } else {
            SimpleGlyphFlag::empty()
        };
        if has_overlap_bit && i == 0 {
            flag |= SimpleGlyphFlag::OVERLAP_SIMPLE;
        }

        let dx = point.x - last_x;
        let dy = point.y - last_y;
        if dx == 0 {
            flag |= SimpleGlyphFlag::X_IS_SAME_OR_POSITIVE_X_SHORT_VECTOR;
        } else if dx > -256 && dx < 256 {
            flag |= SimpleGlyphFlag::X_SHORT_VECTOR;
            if dx > 0 {
                flag |= SimpleGlyphFlag::X_IS_SAME_OR_POSITIVE_X_SHORT_VECTOR;
            }
        }
        if dy == 0 {
            flag |= SimpleGlyphFlag::Y_IS_SAME_OR_POSITIVE_Y_SHORT_VECTOR;
        } else if dy > -256 && dy < 256 {
            flag |= SimpleGlyphFlag::Y_SHORT_VECTOR;
            if dy > 0 {
                flag |= SimpleGlyphFlag::Y_IS_SAME_OR_POSITIVE_Y_SHORT_VECTOR;
            }
        }

        let flag = flag.bits();
        if last_flag == Some(flag) && repeat_count != 255 {
            buf[last_flag_offset] |= SimpleGlyphFlag::REPEAT_FLAG.bits();
            repeat_count += 1;
        } else {
            if repeat_count != 0 {
                buf.push(repeat_count);
            }
            last_flag_offset = buf.len();
            buf.push(flag);
            repeat_count = 0;
        }
        last_flag = Some(flag);
        last_x = point.x;
        last_y = point.y;
    }
    if repeat_count != 0 {
        buf.push(repeat_count);
    }

    // x deltas then y deltas
    let mut last_x = 0i32;
    for point in points {
        let dx = point.x - last_x;
        if dx == 0 {
            // elided
        } else if dx > -256 && dx < 256 {
            buf.push(dx.unsigned_abs() as u8);
        } else {
            // always fits for valid input, truncation is harmless otherwise
            push_u16(buf, dx as u16);
        }
        last_x = point.x;
    }
    let mut last_y = 0i32;
    for point in points {
        let dy = point.y - last_y;
        if dy == 0 {
            // elided
        } else if dy > -256 && dy < 256 {
            buf.push(dy.unsigned_abs() as u8);
        } else {
            push_u16(buf, dy as u16);
        }
        last_y = point.y;
    }
}

/// Store the bounding box of the points, zero extents for an empty point set.
fn push_bbox(buf: &mut Vec<u8>, points: &[Point]) {
    let mut x_min = 0i32;
    let mut x_max = 0i32;
    let mut y_min = 0i32;
    let mut y_max = 0i32;

    if let Some(first) = points.first() {
        x_min = first.x;
        x_max = first.x;
        y_min = first.y;
        y_max = first.y;
    }
    for point in points.iter().skip(1) {
        x_min = x_min.min(point.x);
        x_max = x_max.max(point.x);
        y_min = y_min.min(point.y);
        y_max = y_max.max(point.y);
    }

    push_u16(buf, x_min as u16);
    push_u16(buf, y_min as u16);
    push_u16(buf, x_max as u16);
    push_u16(buf, y_max as u16);
}

/// Build the TrueType `loca` table from the recorded glyph offsets.
fn store_loca(
    loca_values: &[u32],
    index_format: u16,
    out: &mut WriteBuffer,
) -> Result<(Wrapping<u32>, u32), ReadWriteError> {
    let mut loca = WriteBuffer::new();
    for &value in loca_values {
        if index_format != 0 {
            U32Be::write(&mut loca, value)?;
        } else {
            // the 4 byte glyph padding keeps every offset even
            U16Be::write(&mut loca, (value >> 1) as u16)?;
        }
    }

    let loca_checksum = checksum::table_checksum(loca.bytes());
    let loca_length = u32::try_from(loca.len()).map_err(ParseError::from)?;
    out.write_bytes(loca.bytes())?;

    Ok((loca_checksum, loca_length))
}

fn push_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_be_bytes());
}

impl WoffFlag {
    fn new(flag: u8) -> Self {
        WoffFlag(flag)
    }

    fn bytes_to_read(&self) -> usize {
        usize::from(self.xy_triplet().byte_count)
    }

    fn is_on_curve_point(&self) -> bool {
        // In the transformed glyf table a cleared most significant bit indicates an
        // on-curve point, the opposite sense to the OpenType simple glyph flag.
        self.0 & 0x80 == 0
    }

    fn xy_triplet(&self) -> &'static XYTriplet {
        &COORD_LUT[usize::from(self.0 & 0x7F)]
    }
}

impl<'a> BitSlice<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        BitSlice { data }
    }

    pub fn get(&self, index: usize) -> Option<bool> {
        if index >= self.len() {
            return None;
        }

        // The bits are packed so that bit 0 corresponds to the most significant bit of
        // the first byte, bit 7 to the least significant bit of the first byte, bit 8
        // to the most significant bit of the second byte, and so on.
        let byte_index = index / 8;
        let shl = 8 - (index % 8) - 1;
        let mask = 1 << shl;

        Some(self.data[byte_index] & mask == mask)
    }

    pub fn len(&self) -> usize {
        self.data.len() * 8
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}
