//! bcfstm - BCSTM/BFSTM audio container codec in pure Rust
//!
//! BCSTM and BFSTM are chunked binary containers wrapping 4-bit ADPCM
//! multichannel audio. The two flavors share one structure and differ
//! only in byte order and magic tag: BCSTM ("CSTM") is little-endian,
//! BFSTM ("FSTM") is big-endian. Files round-trip byte-for-byte,
//! including alignment padding and every redundant length field the
//! format carries.
//!
//! # Architecture
//!
//! - `audio`: the in-memory stream, channel, and track entities
//! - `dsp`: ADPCM-side routines (seek tables, loop context, alignment)
//! - `format`: layout calculation, interleaving, writing, and parsing
//! - `error`: the crate error type
//!
//! # Usage
//!
//! ```rust,ignore
//! use bcfstm::{read, write, Configuration, Flavor};
//!
//! let mut stream = read(&bytes, Flavor::Bcstm)?;
//! let rewritten = write(&mut stream, &Configuration::default(), Flavor::Bfstm)?;
//! ```

pub mod audio;
pub mod dsp;
pub mod error;
pub mod format;

pub use audio::{AudioStream, Channel, Provenance, SeekTable, Track};
pub use error::{Error, Result};
pub use format::{
    materialize, parse, read, write, Configuration, Flavor, ParsedStructure,
};
