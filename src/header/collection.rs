//! The TTC sub-header present in WOFF2 collection files.

use log::warn;

use crate::binary::read::{ReadBinary, ReadCtxt};
use crate::error::ParseError;
use crate::header::{PackedU16, TableDirectoryEntry};
use crate::tag;

#[derive(Debug, PartialEq)]
pub struct Directory {
    pub version: u32,
    entries: Vec<FontEntry>,
}

#[derive(Debug, PartialEq)]
pub struct FontEntry {
    pub flavor: u32,
    pub table_indices: Vec<usize>,
}

impl<'a> ReadBinary<'a> for FontEntry {
    type HostType = Self;

    fn read(ctxt: &mut ReadCtxt<'a>) -> Result<Self, ParseError> {
        let num_tables = ctxt.read::<PackedU16>()?;
        ctxt.check(num_tables != 0)?;
        let flavor = ctxt.read_u32be()?;
        let table_indices = (0..num_tables)
            .map(|_i| ctxt.read::<PackedU16>().map(usize::from))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(FontEntry {
            flavor,
            table_indices,
        })
    }
}

impl<'a> ReadBinary<'a> for Directory {
    type HostType = Self;

    fn read(ctxt: &mut ReadCtxt<'_>) -> Result<Self, ParseError> {
        let version = ctxt.read_u32be()?;
        ctxt.check_version(version == 0x00010000 || version == 0x00020000)?;
        let num_fonts = ctxt.read::<PackedU16>()?;
        ctxt.check(num_fonts != 0)?;
        let entries = (0..num_fonts)
            .map(|_i| ctxt.read::<FontEntry>())
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Directory { version, entries })
    }
}

impl Directory {
    /// Check the font entries against the shared table directory.
    ///
    /// Every index must resolve to a shared table, and when a font references both
    /// `glyf` and `loca` they must be consecutive entries of the shared directory.
    pub fn validate(&self, tables: &[TableDirectoryEntry]) -> Result<(), ParseError> {
        for font in &self.entries {
            let mut glyf_index = None;
            let mut loca_index = None;
            for &index in &font.table_indices {
                let table = tables.get(index).ok_or(ParseError::BadIndex)?;
                match table.tag {
                    tag::GLYF => glyf_index = Some(index),
                    tag::LOCA => loca_index = Some(index),
                    _ => {}
                }
            }

            // A font referencing just one of glyf/loca is rejected during
            // reconstruction.
            if let (Some(glyf_index), Some(loca_index)) = (glyf_index, loca_index) {
                if glyf_index + 1 != loca_index {
                    warn!("collection font has non-consecutive glyf/loca");
                    return Err(ParseError::BadIndex);
                }
            }
        }

        Ok(())
    }

    pub fn fonts(&self) -> impl Iterator<Item = &FontEntry> + '_ {
        self.entries.iter()
    }

    pub fn num_fonts(&self) -> usize {
        self.entries.len()
    }
}
