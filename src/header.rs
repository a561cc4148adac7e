//! Reading of the WOFF2 container format.

pub mod collection;

use std::io::{Cursor, Read};

use crate::binary::read::{ReadBinary, ReadBinaryDep, ReadCtxt, ReadScope};
use crate::error::ParseError;
use crate::lut::KNOWN_TABLE_TAGS;
use crate::tag;

/// The magic number identifying a WOFF2 file: 'wOF2'
pub const MAGIC: u32 = 0x774F4632;
// This is the default size of the buffer in the brotli crate.
// There's no guidance on how to choose this value.
pub(crate) const BROTLI_DECODER_BUFFER_SIZE: usize = 4096;
const BITS_0_TO_5: u8 = 0x3F;
const LOWEST_UCODE: u16 = 253;

/// UIntBase128, Variable-length encoding of 32-bit unsigned integers.
#[derive(Copy, Clone)]
pub enum U32Base128 {}

/// 255UInt16, Variable-length encoding of a 16-bit unsigned integer for optimized intermediate
/// font data storage.
#[derive(Copy, Clone)]
pub enum PackedU16 {}

/// A parsed and validated WOFF2 file, prior to decompression.
#[derive(Debug, PartialEq)]
pub struct Woff2File<'a> {
    pub scope: ReadScope<'a>,
    pub header: Woff2Header,
    pub tables: Vec<TableDirectoryEntry>,
    pub collection: Option<collection::Directory>,
    /// Size of the table data block once Brotli decompressed.
    pub uncompressed_size: u32,
    /// The Brotli compressed table data block.
    pub compressed: &'a [u8],
}

#[derive(Debug, PartialEq)]
pub struct Woff2Header {
    pub flavor: u32,
    pub length: u32,
    pub num_tables: u16,
    pub total_sfnt_size: u32,
    pub total_compressed_size: u32,
    pub meta_offset: u32,
    pub meta_length: u32,
    pub meta_orig_length: u32,
    pub priv_offset: u32,
    pub priv_length: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TableDirectoryEntry {
    pub tag: u32,
    /// `Some` when the table is stored with a transform applied.
    ///
    /// A transformed `loca` always carries a transform length of zero.
    pub transform_length: Option<u32>,
    /// The size this table will occupy in the output font.
    pub dst_length: u32,
    /// Position of the table within the uncompressed table data block.
    pub src_offset: u32,
    /// Position of the table in the output font, assigned during reconstruction.
    pub dst_offset: u32,
}

impl TableDirectoryEntry {
    pub fn is_transformed(&self) -> bool {
        self.transform_length.is_some()
    }

    /// The number of bytes the table occupies in the uncompressed table data block.
    pub fn src_length(&self) -> u32 {
        self.transform_length.unwrap_or(self.dst_length)
    }
}

impl<'a> Woff2File<'a> {
    /// Decompress and return the extended metadata XML if present
    pub fn extended_metadata(&self) -> Result<Option<String>, ParseError> {
        let offset = usize::try_from(self.header.meta_offset)?;
        let length = usize::try_from(self.header.meta_length)?;
        if offset == 0 || length == 0 {
            return Ok(None);
        }

        let compressed_metadata = self.scope.offset_length(offset, length)?;

        let mut input = brotli_decompressor::Decompressor::new(
            Cursor::new(compressed_metadata.data()),
            BROTLI_DECODER_BUFFER_SIZE,
        );
        let mut metadata = String::new();
        input
            .read_to_string(&mut metadata)
            .map_err(|_err| ParseError::CompressionError)?;

        Ok(Some(metadata))
    }

    /// The private data block if present
    pub fn private_data(&self) -> Result<Option<&'a [u8]>, ParseError> {
        let offset = usize::try_from(self.header.priv_offset)?;
        let length = usize::try_from(self.header.priv_length)?;
        if offset == 0 || length == 0 {
            return Ok(None);
        }

        self.scope
            .offset_length(offset, length)
            .map(|scope| Some(scope.data()))
    }

    fn read_table_directory(
        ctxt: &mut ReadCtxt<'_>,
        num_tables: usize,
    ) -> Result<(Vec<TableDirectoryEntry>, u32), ParseError> {
        let mut src_offset = 0u32;
        let mut table_directory = Vec::with_capacity(num_tables);
        for _i in 0..num_tables {
            let entry = ctxt.read_dep::<TableDirectoryEntry>(src_offset)?;
            src_offset = src_offset
                .checked_add(entry.src_length())
                .ok_or(ParseError::LimitExceeded)?;
            table_directory.push(entry);
        }

        // src_offset is now the end of the last table in read order, which is the size
        // of the table data block once decompressed.
        Ok((table_directory, src_offset))
    }
}

impl<'a> ReadBinary<'a> for Woff2File<'a> {
    type HostType = Self;

    fn read(ctxt: &mut ReadCtxt<'a>) -> Result<Self, ParseError> {
        let scope = ctxt.scope();
        let file_length = scope.data().len() as u64;
        let header = ctxt.read::<Woff2Header>()?;
        ctxt.check(u64::from(header.length) == file_length)?;
        check_block_in_file(header.meta_offset, header.meta_length, file_length)?;
        check_block_in_file(header.priv_offset, header.priv_length, file_length)?;

        let (tables, uncompressed_size) =
            Self::read_table_directory(ctxt, usize::from(header.num_tables))?;

        let collection = if header.flavor == tag::TTCF {
            let directory = ctxt.read::<collection::Directory>()?;
            directory.validate(&tables)?;
            Some(directory)
        } else {
            None
        };

        let compressed_offset = ctxt.offset() as u64;
        let compressed = ctxt.read_slice(usize::try_from(header.total_compressed_size)?)?;

        // The compressed data block is followed, each at a 4 byte boundary, by the
        // optional extended metadata and private data blocks, and nothing else.
        let mut end = round4(compressed_offset + u64::from(header.total_compressed_size));
        if end > file_length {
            return Err(ParseError::BadOffset);
        }
        if header.meta_offset != 0 {
            if end != u64::from(header.meta_offset) {
                return Err(ParseError::BadOffset);
            }
            end = round4(u64::from(header.meta_offset) + u64::from(header.meta_length));
        }
        if header.priv_offset != 0 {
            if end != u64::from(header.priv_offset) {
                return Err(ParseError::BadOffset);
            }
            end = round4(u64::from(header.priv_offset) + u64::from(header.priv_length));
        }
        if end != round4(file_length) {
            return Err(ParseError::BadOffset);
        }

        Ok(Woff2File {
            scope,
            header,
            tables,
            collection,
            uncompressed_size,
            compressed,
        })
    }
}

impl<'a> ReadBinary<'a> for Woff2Header {
    type HostType = Self;

    fn read(ctxt: &mut ReadCtxt<'a>) -> Result<Self, ParseError> {
        let signature = ctxt.read_u32be()?;
        ctxt.check_version(signature == MAGIC)?;
        let flavor = ctxt.read_u32be()?;
        let length = ctxt.read_u32be()?;
        let num_tables = ctxt.read_u16be()?;
        ctxt.check(num_tables != 0)?;
        // reserved field, ignored
        let _reserved = ctxt.read_u16be()?;
        // The total size the font will occupy when decoded. We don't believe this,
        // it is recomputed during reconstruction.
        let total_sfnt_size = ctxt.read_u32be()?;
        let total_compressed_size = ctxt.read_u32be()?;
        // The majorVersion and minorVersion fields have no effect on font loading.
        let _major_version = ctxt.read_u16be()?;
        let _minor_version = ctxt.read_u16be()?;
        let meta_offset = ctxt.read_u32be()?;
        let meta_length = ctxt.read_u32be()?;
        let meta_orig_length = ctxt.read_u32be()?;
        let priv_offset = ctxt.read_u32be()?;
        let priv_length = ctxt.read_u32be()?;

        Ok(Woff2Header {
            flavor,
            length,
            num_tables,
            total_sfnt_size,
            total_compressed_size,
            meta_offset,
            meta_length,
            meta_orig_length,
            priv_offset,
            priv_length,
        })
    }
}

impl<'a> ReadBinaryDep<'a> for TableDirectoryEntry {
    type Args = u32;
    type HostType = Self;

    fn read_dep(ctxt: &mut ReadCtxt<'a>, src_offset: u32) -> Result<Self, ParseError> {
        let flags = ctxt.read_u8()?;
        let tag = if flags & BITS_0_TO_5 == 63 {
            // Tag is the following 4 bytes
            ctxt.read_u32be()?
        } else {
            KNOWN_TABLE_TAGS[usize::from(flags & BITS_0_TO_5)]
        };
        let transform_version = (flags >> 6) & 0x03;

        // Transform version 0 means transformed for glyf and loca, for all other
        // tables any non-zero version does.
        let transformed = match tag {
            tag::GLYF | tag::LOCA => transform_version == 0,
            _ => transform_version != 0,
        };

        let dst_length = ctxt.read::<U32Base128>()?;
        let transform_length = if transformed {
            let transform_length = ctxt.read::<U32Base128>()?;
            if tag == tag::LOCA && transform_length != 0 {
                return Err(ParseError::BadValue);
            }
            Some(transform_length)
        } else {
            None
        };

        Ok(TableDirectoryEntry {
            tag,
            transform_length,
            dst_length,
            src_offset,
            dst_offset: 0,
        })
    }
}

// Parse "255UInt16" Data Type
// https://w3c.github.io/woff/woff2/#255UInt16-0
impl<'a> ReadBinary<'a> for PackedU16 {
    type HostType = u16;

    fn read(ctxt: &mut ReadCtxt<'a>) -> Result<u16, ParseError> {
        match ctxt.read_u8()? {
            253 => ctxt.read_u16be(),
            254 => ctxt
                .read_u8()
                .map(|value| u16::from(value) + LOWEST_UCODE * 2),
            255 => ctxt.read_u8().map(|value| u16::from(value) + LOWEST_UCODE),
            code => Ok(u16::from(code)),
        }
        .map_err(ParseError::from)
    }
}

// Parse "UIntBase128" Data Type
// https://w3c.github.io/woff/woff2/#UIntBase128-0
impl<'a> ReadBinary<'a> for U32Base128 {
    type HostType = u32;

    fn read(ctxt: &mut ReadCtxt<'a>) -> Result<u32, ParseError> {
        let mut accum = 0u32;

        for i in 0..5 {
            let byte = ctxt.read_u8()?;

            // No leading 0's
            if i == 0 && byte == 0x80 {
                return Err(ParseError::BadValue);
            }

            // If any of the top 7 bits are set then << 7 would overflow
            if accum & 0xFE000000 != 0 {
                return Err(ParseError::BadValue);
            }

            // value = old value times 128 + (byte bitwise-and 127)
            accum = (accum << 7) | u32::from(byte & 0x7F);

            // Spin until most significant bit of data byte is false
            if byte & 0x80 == 0 {
                return Ok(accum);
            }
        }

        // UIntBase128 sequence exceeds 5 bytes
        Err(ParseError::BadValue)
    }
}

fn check_block_in_file(offset: u32, length: u32, file_length: u64) -> Result<(), ParseError> {
    if offset == 0 {
        return Ok(());
    }
    if u64::from(offset) >= file_length || file_length - u64::from(offset) < u64::from(length) {
        return Err(ParseError::BadOffset);
    }
    Ok(())
}

pub(crate) const fn round4(value: u64) -> u64 {
    (value + 3) & !3
}
