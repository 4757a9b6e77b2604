//! BCSTM/BFSTM container format handling
//!
//! The two flavors share one structure: a 64-byte header with a section
//! table, then INFO, SEEK, and DATA chunks, each tagged, length-prefixed,
//! and padded to a 32-byte boundary. BCSTM is little-endian, BFSTM is
//! big-endian; seek-table entries are little-endian in both.

pub mod binary;
pub mod interleave;
pub mod layout;
pub mod materialize;
pub mod parser;
pub mod writer;

pub use materialize::materialize;
pub use parser::{parse, ParsedChannel, ParsedStructure, ParsedTrack};
pub use writer::write;

use crate::audio::AudioStream;
use crate::error::{Error, Result};
use binary::Endian;

/// BCSTM magic tag
pub const BCSTM_TAG: &[u8; 4] = b"CSTM";
/// BFSTM magic tag
pub const BFSTM_TAG: &[u8; 4] = b"FSTM";
/// INFO chunk tag
pub const INFO_TAG: &[u8; 4] = b"INFO";
/// SEEK chunk tag
pub const SEEK_TAG: &[u8; 4] = b"SEEK";
/// DATA chunk tag
pub const DATA_TAG: &[u8; 4] = b"DATA";

/// Byte-order marker written into every header
pub const BYTE_ORDER_MARK: u16 = 0xfeff;

/// Section type codes in the header table
pub const SECTION_INFO: u16 = 0x4000;
pub const SECTION_SEEK: u16 = 0x4001;
pub const SECTION_DATA: u16 = 0x4002;

/// Reference type codes inside the INFO chunk
pub const REF_STREAM_INFO: u16 = 0x4100;
pub const REF_TRACK_INFO: u16 = 0x4101;
pub const REF_CHANNEL_INFO: u16 = 0x4102;
pub const REF_INFO_PART: u16 = 0x0101;
pub const REF_BYTE_TABLE: u16 = 0x0100;
pub const REF_ADPCM_INFO: u16 = 0x0300;
pub const REF_SAMPLE_DATA: u16 = 0x1f00;

/// Codec byte for 4-bit ADPCM, the only payload this codec handles
pub const CODEC_ADPCM: u8 = 2;

/// Container flavor: identical structure, different byte order and tag
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Flavor {
    /// "CSTM", little-endian
    Bcstm,
    /// "FSTM", big-endian
    Bfstm,
}

impl Flavor {
    /// The flavor's byte order
    pub fn endian(self) -> Endian {
        match self {
            Flavor::Bcstm => Endian::Little,
            Flavor::Bfstm => Endian::Big,
        }
    }

    /// The flavor's 4-byte magic tag
    pub fn tag(self) -> &'static [u8; 4] {
        match self {
            Flavor::Bcstm => BCSTM_TAG,
            Flavor::Bfstm => BFSTM_TAG,
        }
    }

    /// Detect the flavor from a file's magic tag
    pub fn detect(data: &[u8]) -> Option<Flavor> {
        match data.get(0..4)? {
            tag if tag == BCSTM_TAG => Some(Flavor::Bcstm),
            tag if tag == BFSTM_TAG => Some(Flavor::Bfstm),
            _ => None,
        }
    }
}

/// Configuration for one container-writing session
///
/// Fully re-derivable from a parsed file's header, so a parse → write
/// round trip reproduces equivalent structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    /// Samples per interleave block; must be a whole number of ADPCM frames
    pub samples_per_interleave: u32,
    /// Samples between seek-table entries
    pub samples_per_seek_table_entry: u32,
    /// Granularity loop starts are rounded up to; 0 or 1 disables rounding
    pub loop_point_alignment: u32,
    /// Write the track-information sub-chunk
    pub include_track_information: bool,
    /// Write the opaque legacy extra region in INFO part 1
    pub info_part1_extra: bool,
    /// Write unaligned loop points (BFSTM version 4 only)
    pub include_unaligned_loop_points: bool,
    /// Force seek-table recomputation even for externally supplied tables
    pub recalculate_seek_table: bool,
    /// Force loop-context recomputation even for externally supplied values
    pub recalculate_loop_context: bool,
}

impl Default for Configuration {
    fn default() -> Self {
        Configuration {
            samples_per_interleave: 0x3800,
            samples_per_seek_table_entry: 0x80,
            loop_point_alignment: 0x3800,
            include_track_information: true,
            info_part1_extra: false,
            include_unaligned_loop_points: false,
            recalculate_seek_table: false,
            recalculate_loop_context: false,
        }
    }
}

impl Configuration {
    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.samples_per_interleave == 0 {
            return Err(Error::invalid_input("samples per interleave is zero"));
        }
        if self.samples_per_interleave % layout::SAMPLES_PER_FRAME != 0 {
            return Err(Error::invalid_input(format!(
                "samples per interleave {} is not a whole number of {}-sample frames",
                self.samples_per_interleave,
                layout::SAMPLES_PER_FRAME
            )));
        }
        if self.samples_per_seek_table_entry == 0 {
            return Err(Error::invalid_input("samples per seek table entry is zero"));
        }
        Ok(())
    }
}

/// Parse and materialize in one step
pub fn read(data: &[u8], flavor: Flavor) -> Result<AudioStream> {
    materialize(parse(data, flavor, true)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flavor_detect() {
        assert_eq!(Flavor::detect(b"CSTM\xff\xfe"), Some(Flavor::Bcstm));
        assert_eq!(Flavor::detect(b"FSTM\xfe\xff"), Some(Flavor::Bfstm));
        assert_eq!(Flavor::detect(b"RIFF"), None);
        assert_eq!(Flavor::detect(b"CS"), None);
    }

    #[test]
    fn test_configuration_validation() {
        let mut config = Configuration::default();
        assert!(config.validate().is_ok());

        config.samples_per_interleave = 100;
        assert!(config.validate().is_err());

        config.samples_per_interleave = 0;
        assert!(config.validate().is_err());
    }
}
