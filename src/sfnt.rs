//! Assembly of the output font.
//!
//! Headers and table directories are written first with zeroed placeholders, then the
//! tables themselves. Each directory entry is back-patched once its table's final
//! offset, length, and checksum are known, and `head.checkSumAdjustment` is patched
//! last so that the whole font sums to the checksum magic.

use std::collections::HashMap;
use std::num::Wrapping;

use itertools::Itertools;

use crate::binary::read::{ReadFrom, ReadScope};
use crate::binary::write::{Placeholder, WriteBinary, WriteBuffer, WriteContext};
use crate::binary::{U16Be, U32Be};
use crate::checksum;
use crate::error::{ParseError, ReadWriteError, WriteError};
use crate::glyf;
use crate::header::{TableDirectoryEntry, Woff2File};
use crate::hmtx;
use crate::tag;

const CHECKSUM_ADJUSTMENT_MAGIC: Wrapping<u32> = Wrapping(0xB1B0AFBA);
const CHECKSUM_ADJUSTMENT_OFFSET: usize = 8;
const TTC_VERSION_2: u32 = 0x00020000;
// offset of numberOfHMetrics within hhea
const NUM_H_METRICS_OFFSET: usize = 34;

/// The fields of a table directory record that are back-patched after the table has
/// been written. The tag itself is written up front.
#[derive(Debug, Copy, Clone)]
pub(crate) struct TableEntry {
    checksum: u32,
    offset: u32,
    length: u32,
}

/// State accumulated while reconstructing a single font.
pub(crate) struct FontInfo {
    num_glyphs: u16,
    num_hmetrics: u16,
    x_mins: Vec<i16>,
    table_entries: HashMap<u32, Placeholder<TableEntry, TableEntry>>,
}

/// A font whose headers have been written and whose tables are pending.
pub(crate) struct PreparedFont {
    /// Indices into the shared table array, in tag order.
    table_indices: Vec<usize>,
    /// Checksum of this font's header and table directory as initially written.
    header_checksum: Wrapping<u32>,
    info: FontInfo,
}

impl<'a> ReadFrom<'a> for TableEntry {
    type ReadType = (U32Be, U32Be, U32Be);
    fn from((checksum, offset, length): (u32, u32, u32)) -> Self {
        TableEntry {
            checksum,
            offset,
            length,
        }
    }
}

impl WriteBinary for TableEntry {
    type Output = ();

    fn write<C: WriteContext>(ctxt: &mut C, entry: TableEntry) -> Result<(), WriteError> {
        U32Be::write(ctxt, entry.checksum)?;
        U32Be::write(ctxt, entry.offset)?;
        U32Be::write(ctxt, entry.length)?;

        Ok(())
    }
}

impl FontInfo {
    fn new(table_entries: HashMap<u32, Placeholder<TableEntry, TableEntry>>) -> Self {
        FontInfo {
            num_glyphs: 0,
            num_hmetrics: 0,
            x_mins: Vec::new(),
            table_entries,
        }
    }
}

/// Write the offset table and zeroed table directory of every font.
///
/// For a collection the TTC header comes first. Returns one `PreparedFont` per font,
/// carrying the placeholders for the directory entries and the checksum of the header
/// region as written.
pub(crate) fn write_headers(
    woff: &Woff2File<'_>,
    out: &mut WriteBuffer,
) -> Result<Vec<PreparedFont>, ReadWriteError> {
    match &woff.collection {
        Some(collection) => {
            U32Be::write(out, tag::TTCF)?;
            U32Be::write(out, collection.version)?;
            U32Be::write(
                out,
                u32::try_from(collection.num_fonts()).map_err(WriteError::from)?,
            )?;
            let offset_table_slots =
                out.placeholder_array::<U32Be, u32>(collection.num_fonts())?;
            if collection.version == TTC_VERSION_2 {
                // ulDsigTag, ulDsigLength, ulDsigOffset
                out.write_zeros(12)?;
            }

            let mut fonts = Vec::with_capacity(collection.num_fonts());
            for (font, slot) in collection.fonts().zip(offset_table_slots) {
                let offset_table_start = out.bytes_written();
                out.write_placeholder(
                    slot,
                    u32::try_from(offset_table_start).map_err(WriteError::from)?,
                )?;

                let table_indices = font
                    .table_indices
                    .iter()
                    .copied()
                    .sorted_by_key(|&index| woff.tables[index].tag)
                    .collect_vec();
                let table_entries = write_font_directory(
                    out,
                    font.flavor,
                    &table_indices,
                    &woff.tables,
                )?;
                let header_checksum =
                    checksum::table_checksum(&out.bytes()[offset_table_start..]);

                fonts.push(PreparedFont {
                    table_indices,
                    header_checksum,
                    info: FontInfo::new(table_entries),
                });
            }

            Ok(fonts)
        }
        None => {
            let table_indices = (0..woff.tables.len())
                .sorted_by_key(|&index| woff.tables[index].tag)
                .collect_vec();
            let table_entries =
                write_font_directory(out, woff.header.flavor, &table_indices, &woff.tables)?;
            let header_checksum = checksum::table_checksum(out.bytes());

            Ok(vec![PreparedFont {
                table_indices,
                header_checksum,
                info: FontInfo::new(table_entries),
            }])
        }
    }
}

/// Write one font's offset table and zero-filled directory records.
fn write_font_directory(
    out: &mut WriteBuffer,
    flavor: u32,
    table_indices: &[usize],
    tables: &[TableDirectoryEntry],
) -> Result<HashMap<u32, Placeholder<TableEntry, TableEntry>>, ReadWriteError> {
    let num_tables = u16::try_from(table_indices.len()).map_err(WriteError::from)?;
    write_offset_table(out, flavor, num_tables)?;

    let mut table_entries = HashMap::with_capacity(table_indices.len());
    for &index in table_indices {
        U32Be::write(out, tables[index].tag)?;
        let placeholder = out.placeholder::<TableEntry, TableEntry>()?;
        table_entries.insert(tables[index].tag, placeholder);
    }

    Ok(table_entries)
}

fn write_offset_table(
    out: &mut WriteBuffer,
    flavor: u32,
    num_tables: u16,
) -> Result<(), WriteError> {
    let entry_selector = max_power_of_2(num_tables);
    let search_range = ((1u32 << entry_selector) * 16) as u16;
    let range_shift = (u32::from(num_tables) * 16).wrapping_sub(u32::from(search_range)) as u16;

    U32Be::write(out, flavor)?;
    U16Be::write(out, num_tables)?;
    U16Be::write(out, search_range)?;
    U16Be::write(out, entry_selector)?;
    U16Be::write(out, range_shift)?;

    Ok(())
}

/// Calculate the maximum power of 2 that is <= num
fn max_power_of_2(num: u16) -> u16 {
    15u16.saturating_sub(num.leading_zeros() as u16)
}

/// Write the tables of one font, back-patching its directory as they land.
///
/// Tables are processed in tag order, so `glyf` is reconstructed before `hmtx` needs
/// the gathered x_min values. Tables shared with an earlier font of a collection are
/// not rewritten, their checksum and placement are reused via `checksums`, keyed by
/// `(tag, src_offset)`. A key seen twice within the first font means the directory
/// was malformed.
pub(crate) fn reconstruct_font(
    uncompressed: &[u8],
    tables: &mut [TableDirectoryEntry],
    font: &mut PreparedFont,
    checksums: &mut HashMap<(u32, u32), Wrapping<u32>>,
    first_font: bool,
    out: &mut WriteBuffer,
) -> Result<(), ReadWriteError> {
    let indices = font.table_indices.clone();

    let glyf_index = indices.iter().copied().find(|&i| tables[i].tag == tag::GLYF);
    let loca_index = indices.iter().copied().find(|&i| tables[i].tag == tag::LOCA);
    match (glyf_index, loca_index) {
        (Some(glyf_index), Some(loca_index)) => {
            // cannot transform just one of glyf/loca
            if tables[glyf_index].is_transformed() != tables[loca_index].is_transformed() {
                return Err(ReadWriteError::Read(ParseError::BadValue));
            }
        }
        (None, None) => {}
        // cannot have just one of glyf/loca
        _ => return Err(ReadWriteError::Read(ParseError::MissingValue)),
    }

    let mut font_checksum = font.header_checksum;
    let mut loca_checksum = Wrapping(0);

    for &index in &indices {
        let table_tag = tables[index].tag;
        let checksum_key = (table_tag, tables[index].src_offset);
        let reused = checksums.contains_key(&checksum_key);
        if first_font && reused {
            return Err(ReadWriteError::Read(ParseError::BadValue));
        }

        let src_start = usize::try_from(tables[index].src_offset).map_err(ParseError::from)?;
        let src_end = src_start
            .checked_add(usize::try_from(tables[index].src_length()).map_err(ParseError::from)?)
            .ok_or(ParseError::LimitExceeded)?;
        let transformed = uncompressed
            .get(src_start..src_end)
            .ok_or(ParseError::BadOffset)?;

        if table_tag == tag::HHEA {
            font.info.num_hmetrics = read_num_hmetrics(transformed)?;
        }

        let table_checksum = if reused {
            checksums[&checksum_key]
        } else {
            let table_checksum = if !tables[index].is_transformed() {
                tables[index].dst_offset =
                    u32::try_from(out.bytes_written()).map_err(ParseError::from)?;
                if table_tag == tag::HEAD {
                    if transformed.len() < 12 {
                        return Err(ReadWriteError::Read(ParseError::BadEof));
                    }
                    // head is checksummed with checkSumAdjustment zeroed, the real
                    // value is patched in once the whole font has been summed
                    let mut head = transformed.to_vec();
                    head[CHECKSUM_ADJUSTMENT_OFFSET..CHECKSUM_ADJUSTMENT_OFFSET + 4].fill(0);
                    let table_checksum = checksum::table_checksum(&head);
                    out.write_bytes(&head)?;
                    table_checksum
                } else {
                    let table_checksum = checksum::table_checksum(transformed);
                    out.write_bytes(transformed)?;
                    table_checksum
                }
            } else {
                match table_tag {
                    tag::GLYF => {
                        let dst_offset =
                            u32::try_from(out.bytes_written()).map_err(ParseError::from)?;
                        tables[index].dst_offset = dst_offset;

                        let loca_index = loca_index.ok_or(ParseError::MissingValue)?;
                        let rec = glyf::reconstruct(
                            transformed,
                            tables[loca_index].dst_length,
                            out,
                        )?;

                        tables[index].dst_length = rec.glyf_length;
                        tables[loca_index].dst_offset = dst_offset
                            .checked_add(rec.glyf_length)
                            .ok_or(ParseError::LimitExceeded)?;
                        tables[loca_index].dst_length = rec.loca_length;
                        loca_checksum = rec.loca_checksum;

                        font.info.num_glyphs = rec.num_glyphs;
                        font.info.x_mins = rec.x_mins;

                        rec.glyf_checksum
                    }
                    // all the work was done when glyf was reconstructed
                    tag::LOCA => loca_checksum,
                    tag::HMTX => {
                        tables[index].dst_offset =
                            u32::try_from(out.bytes_written()).map_err(ParseError::from)?;
                        let (table_checksum, _length) = hmtx::reconstruct(
                            transformed,
                            font.info.num_glyphs,
                            font.info.num_hmetrics,
                            &font.info.x_mins,
                            out,
                        )?;
                        table_checksum
                    }
                    // no other table has a transform
                    _ => return Err(ReadWriteError::Read(ParseError::BadValue)),
                }
            };
            checksums.insert(checksum_key, table_checksum);
            table_checksum
        };
        font_checksum += table_checksum;

        // update the table entry with the real values
        let entry = TableEntry {
            checksum: table_checksum.0,
            offset: tables[index].dst_offset,
            length: tables[index].dst_length,
        };
        let placeholder = font
            .info
            .table_entries
            .remove(&table_tag)
            .ok_or(ParseError::MissingValue)?;
        out.write_placeholder(placeholder, entry)?;
        // the entry replaced zeros that were summed into the header checksum
        font_checksum += Wrapping(entry.checksum) + Wrapping(entry.offset) + Wrapping(entry.length);

        out.pad_to_long()?;

        let table_end =
            u64::from(tables[index].dst_offset) + u64::from(tables[index].dst_length);
        if table_end > out.bytes_written() as u64 {
            return Err(ReadWriteError::Read(ParseError::BadOffset));
        }
    }

    // update head checkSumAdjustment, zeroed when the table was written and summed
    if let Some(head_index) = indices.iter().copied().find(|&i| tables[i].tag == tag::HEAD) {
        if tables[head_index].dst_length < 12 {
            return Err(ReadWriteError::Read(ParseError::BadEof));
        }
        let adjustment = CHECKSUM_ADJUSTMENT_MAGIC - font_checksum;
        let offset = usize::try_from(tables[head_index].dst_offset).map_err(ParseError::from)?
            + CHECKSUM_ADJUSTMENT_OFFSET;
        out.write_bytes_at(offset, &adjustment.0.to_be_bytes())?;
    }

    Ok(())
}

// Get numberOfHMetrics, https://www.microsoft.com/typography/otspec/hhea.htm
fn read_num_hmetrics(hhea: &[u8]) -> Result<u16, ParseError> {
    let mut ctxt = ReadScope::new(hhea).ctxt();
    ctxt.read_slice(NUM_H_METRICS_OFFSET)?;
    let num_hmetrics = ctxt.read_u16be()?;
    Ok(num_hmetrics)
}
