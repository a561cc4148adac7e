//! End to end conversion tests over hand assembled WOFF2 files.

use std::collections::HashMap;
use std::num::Wrapping;

use woff2_decode::binary::read::ReadScope;
use woff2_decode::checksum;
use woff2_decode::error::{ParseError, ReadWriteError};
use woff2_decode::header::MAGIC;
use woff2_decode::tag;
use woff2_decode::{convert_to_ttf, Woff2File};

const TTF_FLAVOR: u32 = 0x00010000;

/// Frame `data` as a Brotli stream holding a single stored (uncompressed) metablock
/// followed by an empty last metablock. See RFC 7932 section 9.
fn brotli_store(data: &[u8]) -> Vec<u8> {
    assert!(!data.is_empty() && data.len() <= 65536, "fixture too large");
    let mlen = data.len() - 1;
    let mut stream = vec![
        ((mlen & 0x0F) << 4) as u8,
        ((mlen >> 4) & 0xFF) as u8,
        (((mlen >> 12) & 0x0F) | 0x10) as u8,
    ];
    stream.extend_from_slice(data);
    stream.push(0x03);
    stream
}

fn base128(mut value: u32) -> Vec<u8> {
    let mut bytes = vec![(value & 0x7F) as u8];
    value >>= 7;
    while value != 0 {
        bytes.insert(0, ((value & 0x7F) as u8) | 0x80);
        value >>= 7;
    }
    bytes
}

fn packed_u16(value: u16) -> Vec<u8> {
    if value < 253 {
        vec![value as u8]
    } else {
        let mut bytes = vec![253];
        bytes.extend_from_slice(&value.to_be_bytes());
        bytes
    }
}

struct TestTable {
    flag_byte: u8,
    dst_length: u32,
    transform_length: Option<u32>,
    data: Vec<u8>,
}

struct TestFont {
    flavor: u32,
    table_indices: Vec<u16>,
}

fn build_woff2(
    flavor: u32,
    tables: &[TestTable],
    collection: Option<(u32, &[TestFont])>,
    metadata: Option<&str>,
) -> Vec<u8> {
    let mut directory = Vec::new();
    let mut uncompressed = Vec::new();
    for table in tables {
        directory.push(table.flag_byte);
        directory.extend(base128(table.dst_length));
        if let Some(transform_length) = table.transform_length {
            directory.extend(base128(transform_length));
        }
        uncompressed.extend_from_slice(&table.data);
    }

    let mut collection_bytes = Vec::new();
    if let Some((version, fonts)) = collection {
        collection_bytes.extend_from_slice(&version.to_be_bytes());
        collection_bytes.extend(packed_u16(fonts.len() as u16));
        for font in fonts {
            collection_bytes.extend(packed_u16(font.table_indices.len() as u16));
            collection_bytes.extend_from_slice(&font.flavor.to_be_bytes());
            for &index in &font.table_indices {
                collection_bytes.extend(packed_u16(index));
            }
        }
    }

    let compressed = brotli_store(&uncompressed);

    let mut file = Vec::new();
    file.extend_from_slice(&MAGIC.to_be_bytes());
    file.extend_from_slice(&flavor.to_be_bytes());
    file.extend_from_slice(&[0; 4]); // length, patched below
    file.extend_from_slice(&(tables.len() as u16).to_be_bytes());
    file.extend_from_slice(&[0; 2]); // reserved
    file.extend_from_slice(&[0; 4]); // totalSfntSize
    file.extend_from_slice(&(compressed.len() as u32).to_be_bytes());
    file.extend_from_slice(&[0; 4]); // major/minor version
    file.extend_from_slice(&[0; 20]); // meta and private blocks, patched below
    file.extend_from_slice(&directory);
    file.extend_from_slice(&collection_bytes);
    file.extend_from_slice(&compressed);

    if let Some(metadata) = metadata {
        while file.len() % 4 != 0 {
            file.push(0);
        }
        let meta = brotli_store(metadata.as_bytes());
        let meta_offset = (file.len() as u32).to_be_bytes();
        let meta_length = (meta.len() as u32).to_be_bytes();
        let meta_orig_length = (metadata.len() as u32).to_be_bytes();
        file[24..28].copy_from_slice(&meta_offset);
        file[28..32].copy_from_slice(&meta_length);
        file[32..36].copy_from_slice(&meta_orig_length);
        file.extend_from_slice(&meta);
    }

    while file.len() % 4 != 0 {
        file.push(0);
    }
    let length = (file.len() as u32).to_be_bytes();
    file[8..12].copy_from_slice(&length);
    file
}

/// A head table with a recognisable byte pattern.
fn head_table() -> Vec<u8> {
    let mut head = vec![0u8; 54];
    for (i, byte) in head.iter_mut().enumerate() {
        *byte = i as u8;
    }
    head[12..16].copy_from_slice(&0x5F0F3CF5u32.to_be_bytes()); // magicNumber
    head[50] = 0;
    head[51] = 0; // indexToLocFormat: short
    head
}

fn hhea_table(num_hmetrics: u16) -> Vec<u8> {
    let mut hhea = vec![0u8; 36];
    hhea[0..4].copy_from_slice(&0x00010000u32.to_be_bytes());
    hhea[34..36].copy_from_slice(&num_hmetrics.to_be_bytes());
    hhea
}

/// Transformed glyf holding one simple glyph, a square of four on-curve points:
/// (0,0) (100,0) (100,100) (0,100). Reconstructs to a 21 byte glyph, padded to 24.
fn transformed_glyf() -> Vec<u8> {
    let streams: [&[u8]; 7] = [
        &[0, 1],                         // nContours
        &[4],                            // nPoints
        &[0x00, 0x0B, 0x01, 0x0A],       // triplet flags
        &[0x00, 0x64, 0x64, 0x64, 0x00], // triplet data + instruction length
        &[],                             // composite
        &[0, 0, 0, 0],                   // bbox bitmap, no explicit boxes
        &[],                             // instructions
    ];
    let mut data = Vec::new();
    data.extend_from_slice(&[0, 0, 0, 0]); // version, flags
    data.extend_from_slice(&1u16.to_be_bytes()); // numGlyphs
    data.extend_from_slice(&0u16.to_be_bytes()); // indexFormat
    for stream in &streams {
        data.extend_from_slice(&(stream.len() as u32).to_be_bytes());
    }
    for stream in &streams {
        data.extend_from_slice(stream);
    }
    data
}

fn empty_transformed_glyf() -> Vec<u8> {
    let streams: [&[u8]; 7] = [&[0, 0], &[], &[], &[], &[], &[0, 0, 0, 0], &[]];
    let mut data = Vec::new();
    data.extend_from_slice(&[0, 0, 0, 0]);
    data.extend_from_slice(&1u16.to_be_bytes());
    data.extend_from_slice(&0u16.to_be_bytes());
    for stream in &streams {
        data.extend_from_slice(&(stream.len() as u32).to_be_bytes());
    }
    for stream in &streams {
        data.extend_from_slice(stream);
    }
    data
}

fn head_entry() -> TestTable {
    TestTable {
        flag_byte: 1, // head
        dst_length: 54,
        transform_length: None,
        data: head_table(),
    }
}

fn glyf_loca_entries() -> Vec<TestTable> {
    let glyf = transformed_glyf();
    vec![
        TestTable {
            flag_byte: 10, // glyf, transform version 0
            dst_length: 24,
            transform_length: Some(glyf.len() as u32),
            data: glyf,
        },
        TestTable {
            flag_byte: 11, // loca, transform version 0
            dst_length: 4,
            transform_length: Some(0),
            data: Vec::new(),
        },
    ]
}

/// Read the table directory of the font whose offset table starts at `offset`,
/// keyed by tag with (checksum, offset, length) values.
fn parse_directory(font: &[u8], offset: usize) -> HashMap<u32, (u32, u32, u32)> {
    let num_tables = u16::from_be_bytes([font[offset + 4], font[offset + 5]]);
    let mut records = HashMap::new();
    for i in 0..usize::from(num_tables) {
        let entry = offset + 12 + 16 * i;
        let field = |at: usize| {
            u32::from_be_bytes([
                font[entry + at],
                font[entry + at + 1],
                font[entry + at + 2],
                font[entry + at + 3],
            ])
        };
        records.insert(field(0), (field(4), field(8), field(12)));
    }
    records
}

#[test]
fn test_convert_single_table_font() {
    let head = head_table();
    let woff = build_woff2(TTF_FLAVOR, &[head_entry()], None, None);
    let font = convert_to_ttf(&woff).unwrap();

    // offset subtable, one directory record, then the padded table
    assert_eq!(font.len(), 12 + 16 + 56);
    assert_eq!(&font[0..4], &TTF_FLAVOR.to_be_bytes());
    assert_eq!(&font[4..12], &[0, 1, 0, 16, 0, 0, 0, 0]);
    assert_eq!(&font[12..16], b"head");

    let records = parse_directory(&font, 0);
    let (checksum, offset, length) = records[&tag::HEAD];
    assert_eq!(offset, 28);
    assert_eq!(length, 54);

    // head went through with checkSumAdjustment patched
    assert_eq!(&font[28..36], &head[..8]);
    assert_eq!(&font[40..82], &head[12..]);
    let mut zeroed = head.clone();
    zeroed[8..12].fill(0);
    assert_eq!(checksum, checksum::table_checksum(&zeroed).0);

    // the whole font sums to the checksum magic
    assert_eq!(checksum::table_checksum(&font), Wrapping(0xB1B0AFBA));
}

#[test]
fn test_convert_simple_glyph_font() {
    let mut tables = vec![head_entry()];
    tables.extend(glyf_loca_entries());
    let woff = build_woff2(TTF_FLAVOR, &tables, None, None);
    let font = convert_to_ttf(&woff).unwrap();

    let records = parse_directory(&font, 0);
    let (glyf_checksum, glyf_offset, glyf_length) = records[&tag::GLYF];
    let (loca_checksum, loca_offset, loca_length) = records[&tag::LOCA];

    // glyf is reconstructed first in tag order and loca lands directly after it,
    // all at 4 byte boundaries
    assert_eq!(glyf_offset, 60);
    assert_eq!(glyf_length, 24);
    assert_eq!(loca_offset, 84);
    assert_eq!(loca_length, 4);
    assert_eq!(records[&tag::HEAD].1, 88);
    assert_eq!(font.len(), 144);

    // loca[numGlyphs] is the glyf length, stored as short offsets
    assert_eq!(&font[84..88], &[0, 0, 0, 12]);

    // the reconstructed glyph has the computed bounding box
    let glyf = &font[60..84];
    assert_eq!(&glyf[0..2], &[0, 1]);
    assert_eq!(&glyf[2..10], &[0, 0, 0, 0, 0, 100, 0, 100]);

    // directory checksums match the written tables
    let glyf_range = glyf_offset as usize..(glyf_offset + glyf_length) as usize;
    assert_eq!(glyf_checksum, checksum::table_checksum(&font[glyf_range]).0);
    let loca_range = loca_offset as usize..(loca_offset + loca_length) as usize;
    assert_eq!(loca_checksum, checksum::table_checksum(&font[loca_range]).0);

    assert_eq!(checksum::table_checksum(&font), Wrapping(0xB1B0AFBA));
}

#[test]
fn test_convert_empty_glyph_font() {
    let empty_glyf = empty_transformed_glyf();
    let tables = vec![
        head_entry(),
        TestTable {
            flag_byte: 10,
            dst_length: 0,
            transform_length: Some(empty_glyf.len() as u32),
            data: empty_glyf,
        },
        TestTable {
            flag_byte: 11,
            dst_length: 4,
            transform_length: Some(0),
            data: Vec::new(),
        },
    ];
    let woff = build_woff2(TTF_FLAVOR, &tables, None, None);
    let font = convert_to_ttf(&woff).unwrap();

    let records = parse_directory(&font, 0);
    // a zero length glyf table followed by a loca of two zero offsets
    assert_eq!(records[&tag::GLYF], (0, 60, 0));
    let (_checksum, loca_offset, loca_length) = records[&tag::LOCA];
    assert_eq!(loca_length, 4);
    let loca_range = loca_offset as usize..(loca_offset + loca_length) as usize;
    assert_eq!(&font[loca_range], &[0, 0, 0, 0]);

    assert_eq!(checksum::table_checksum(&font), Wrapping(0xB1B0AFBA));
}

#[test]
fn test_convert_transformed_hmtx() {
    let mut tables = vec![head_entry()];
    tables.extend(glyf_loca_entries());
    tables.push(TestTable {
        flag_byte: 2, // hhea
        dst_length: 36,
        transform_length: None,
        data: hhea_table(1),
    });
    tables.push(TestTable {
        flag_byte: 3 | 0x40, // hmtx, transform version 1
        dst_length: 4,
        transform_length: Some(3),
        data: vec![0x03, 0x02, 0x58], // both lsb arrays from glyf x_mins
    });
    let woff = build_woff2(TTF_FLAVOR, &tables, None, None);
    let font = convert_to_ttf(&woff).unwrap();

    let records = parse_directory(&font, 0);
    let (_checksum, hmtx_offset, hmtx_length) = records[&tag::HMTX];
    assert_eq!(hmtx_length, 4);
    let hmtx_range = hmtx_offset as usize..(hmtx_offset + hmtx_length) as usize;
    // advance 600 with the lsb taken from the glyph's x_min of zero
    assert_eq!(&font[hmtx_range], &[0x02, 0x58, 0x00, 0x00]);

    assert_eq!(checksum::table_checksum(&font), Wrapping(0xB1B0AFBA));
}

#[test]
fn test_convert_collection_shares_tables() {
    let mut tables = vec![head_entry(), head_entry()];
    tables.extend(glyf_loca_entries()); // shared glyf at index 2, loca at 3
    let fonts = [
        TestFont {
            flavor: TTF_FLAVOR,
            table_indices: vec![0, 2, 3],
        },
        TestFont {
            flavor: TTF_FLAVOR,
            table_indices: vec![1, 2, 3],
        },
    ];
    let woff = build_woff2(tag::TTCF, &tables, Some((0x00020000, &fonts)), None);
    let font = convert_to_ttf(&woff).unwrap();

    // ttcf header with version 2.0, two offset table slots, and the DSIG fields
    assert_eq!(&font[0..4], b"ttcf");
    assert_eq!(&font[4..8], &0x00020000u32.to_be_bytes());
    assert_eq!(&font[8..12], &2u32.to_be_bytes());
    let offset_0 = u32::from_be_bytes(font[12..16].try_into().unwrap());
    let offset_1 = u32::from_be_bytes(font[16..20].try_into().unwrap());
    assert_eq!(offset_0, 32);
    assert_eq!(offset_1, 92);
    assert_eq!(&font[20..32], &[0; 12]); // DSIG triple

    let font_0 = parse_directory(&font, 32);
    let font_1 = parse_directory(&font, 92);

    // the shared glyf and loca were written once and are referenced by both fonts
    assert_eq!(font_0[&tag::GLYF], font_1[&tag::GLYF]);
    assert_eq!(font_0[&tag::LOCA], font_1[&tag::LOCA]);
    assert_ne!(font_0[&tag::HEAD].1, font_1[&tag::HEAD].1);

    // first table directly follows the headers: glyf, loca, head0, then head1
    assert_eq!(font_0[&tag::GLYF], (font_0[&tag::GLYF].0, 152, 24));
    assert_eq!(font_0[&tag::LOCA].1, 176);
    assert_eq!(font_0[&tag::HEAD].1, 180);
    assert_eq!(font_1[&tag::HEAD].1, 236);
    assert_eq!(font.len(), 292);
}

#[test]
fn test_round_trip_stability() {
    let mut tables = vec![head_entry()];
    tables.extend(glyf_loca_entries());
    let woff = build_woff2(TTF_FLAVOR, &tables, None, None);

    let first = convert_to_ttf(&woff).unwrap();
    let second = convert_to_ttf(&woff).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_reject_implausible_compression_ratio() {
    let woff = build_woff2(
        TTF_FLAVOR,
        &[TestTable {
            flag_byte: 1,
            dst_length: 10_000_000,
            transform_length: None,
            data: vec![0xAA],
        }],
        None,
        None,
    );
    assert_eq!(
        convert_to_ttf(&woff),
        Err(ReadWriteError::Read(ParseError::LimitExceeded))
    );
}

#[test]
fn test_reject_uncompressed_size_mismatch() {
    // the directory declares 60 bytes but the compressed block holds 54
    let woff = build_woff2(
        TTF_FLAVOR,
        &[TestTable {
            flag_byte: 1,
            dst_length: 60,
            transform_length: None,
            data: head_table(),
        }],
        None,
        None,
    );
    assert_eq!(
        convert_to_ttf(&woff),
        Err(ReadWriteError::Read(ParseError::CompressionError))
    );
}

#[test]
fn test_reject_transform_on_unexpected_table() {
    let woff = build_woff2(
        TTF_FLAVOR,
        &[TestTable {
            flag_byte: 1 | 0x40, // head, transform version 1
            dst_length: 54,
            transform_length: Some(54),
            data: head_table(),
        }],
        None,
        None,
    );
    assert_eq!(
        convert_to_ttf(&woff),
        Err(ReadWriteError::Read(ParseError::BadValue))
    );
}

#[test]
fn test_reject_lone_glyf() {
    let glyf = transformed_glyf();
    let tables = vec![
        head_entry(),
        TestTable {
            flag_byte: 10,
            dst_length: 24,
            transform_length: Some(glyf.len() as u32),
            data: glyf,
        },
    ];
    let woff = build_woff2(TTF_FLAVOR, &tables, None, None);
    assert_eq!(
        convert_to_ttf(&woff),
        Err(ReadWriteError::Read(ParseError::MissingValue))
    );
}

#[test]
fn test_extended_metadata() {
    let xml = "<?xml version=\"1.0\"?><metadata version=\"1.0\"></metadata>";
    let woff = build_woff2(TTF_FLAVOR, &[head_entry()], None, Some(xml));

    let file = ReadScope::new(&woff).read::<Woff2File<'_>>().unwrap();
    assert_eq!(file.extended_metadata().unwrap().as_deref(), Some(xml));
    assert_eq!(file.private_data().unwrap(), None);

    // the metadata block doesn't disturb conversion
    assert!(convert_to_ttf(&woff).is_ok());
}
