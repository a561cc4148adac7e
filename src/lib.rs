#![warn(rust_2018_idioms)]

//! # WOFF2 decoder
//!
//! This crate decodes fonts in the [WOFF2](https://www.w3.org/TR/WOFF2/) web font
//! format back into TrueType/OpenType fonts. Both single fonts and TrueType
//! collections are supported, including the WOFF2 specific transforms of the `glyf`,
//! `loca`, and `hmtx` tables, which are reversed to reconstruct the original tables.
//!
//! The decoder is strict: any inconsistency in the input is a decode error, and no
//! partial output is produced on failure.
//!
//! ## Example
//!
//! ```
//! use woff2_decode::convert_to_ttf;
//!
//! # fn example(woff2_data: &[u8]) -> Result<(), woff2_decode::ReadWriteError> {
//! let font = convert_to_ttf(woff2_data)?;
//! assert_eq!(&font[0..4], &0x00010000u32.to_be_bytes());
//! # Ok(())
//! # }
//! ```
//!
//! Brotli decompression is provided by the `brotli-decompressor` crate.

pub mod binary;
pub mod checksum;
pub mod decoder;
pub mod error;
pub mod glyf;
pub mod header;
pub mod hmtx;
pub mod lut;
pub mod sfnt;
pub mod size;
pub mod tag;

pub use crate::decoder::{compute_final_size, convert_to_ttf};
pub use crate::error::{ParseError, ReadWriteError, WriteError};
pub use crate::header::Woff2File;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
