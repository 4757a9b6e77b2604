//! Layout calculation for BCSTM/BFSTM containers
//!
//! Every chunk length and offset in the container is a pure function of
//! the stream shape (channel count, track count, playable sample count)
//! and the writer configuration. The whole layout is computed in one
//! ordered pass (sample-derived sizes first, then sub-chunk sizes, then
//! cumulative offsets) and returned as an immutable [`Layout`] value so
//! the writer and the tests see exactly the same numbers.

use super::{Configuration, Flavor};
use crate::error::{Error, Result};

/// Samples in one full ADPCM frame
pub const SAMPLES_PER_FRAME: u32 = 14;

/// Bytes in one ADPCM frame: a header byte plus seven nibble-pair bytes
pub const BYTES_PER_FRAME: u32 = 8;

/// Chunk alignment boundary
pub const ALIGNMENT: u32 = 0x20;

/// Fixed size of the outer file header
pub const HEADER_SIZE: u32 = 0x40;

/// INFO chunk tag/length header plus its three-entry reference table
const INFO_HEADER_SIZE: u32 = 8 + 24;

/// Base size of INFO part 1 (stream parameters)
const INFO_PART1_BASE_SIZE: u32 = 0x38;

/// Size of the opaque legacy extra region in INFO part 1
pub const INFO_PART1_EXTRA_SIZE: u32 = 0xc;

/// Size of one track entry in INFO part 2
const TRACK_ENTRY_SIZE: u32 = 0x14;

/// Size of one per-channel ADPCM info block in INFO part 3
const CHANNEL_INFO_SIZE: u32 = 0x2e;

/// Bytes per channel per seek-table entry (one history pair)
pub const BYTES_PER_SEEK_ENTRY: u32 = 4;

/// ADPCM byte count for `samples` samples: every started 14-sample group
/// occupies a full 8-byte frame
pub fn bytes_for_samples(samples: u32) -> u32 {
    samples.div_ceil(SAMPLES_PER_FRAME) * BYTES_PER_FRAME
}

/// Round `value` up to the next chunk alignment boundary
pub fn align(value: u32) -> u32 {
    value.div_ceil(ALIGNMENT) * ALIGNMENT
}

/// Complete, precomputed container layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    /// Sample count the layout is built from (loop end when looping)
    pub playable_samples: u32,
    /// Number of interleave blocks per channel
    pub block_count: u32,
    /// Samples in one full interleave block
    pub block_samples: u32,
    /// Bytes in one full interleave block
    pub block_size: u32,
    /// Samples in the final, possibly short, block
    pub last_block_samples: u32,
    /// Bytes in the final block before padding
    pub last_block_size_raw: u32,
    /// Bytes the final block occupies after padding
    pub last_block_size_padded: u32,
    /// Number of seek-table entries
    pub seek_entry_count: u32,
    /// Samples between seek-table entries
    pub samples_per_seek_entry: u32,

    /// INFO part 1 (stream parameters) size
    pub info_part1_size: u32,
    /// INFO part 2 (tracks) size; zero when tracks are excluded
    pub info_part2_size: u32,
    /// INFO part 3 (channels) size
    pub info_part3_size: u32,
    /// INFO chunk size, aligned
    pub info_size: u32,
    /// SEEK chunk size, aligned
    pub seek_size: u32,
    /// DATA chunk size, aligned
    pub data_size: u32,

    /// INFO chunk offset (always immediately after the header)
    pub info_offset: u32,
    /// SEEK chunk offset
    pub seek_offset: u32,
    /// DATA chunk offset
    pub data_offset: u32,
    /// Total file size
    pub file_size: u32,
    /// Audio payload offset relative to DATA + 8
    pub audio_data_offset: u32,

    /// Version code for the header (stored shifted left by 16)
    pub version: u32,
    /// Effective flags the layout was computed with
    pub include_tracks: bool,
    pub info_part1_extra: bool,
    pub include_unaligned_loop_points: bool,
    /// Track count the layout was computed with
    pub track_count: u32,
    /// Channel count the layout was computed with
    pub channel_count: u32,
}

impl Layout {
    /// Compute the full container layout in one pass
    pub fn compute(
        channel_count: usize,
        track_count: usize,
        playable_samples: u32,
        config: &Configuration,
        flavor: Flavor,
    ) -> Result<Layout> {
        config.validate()?;
        if channel_count == 0 {
            return Err(Error::invalid_input("layout requires at least one channel"));
        }
        if playable_samples == 0 {
            return Err(Error::invalid_input("layout requires at least one sample"));
        }

        let channels = channel_count as u32;
        let include_tracks = config.include_track_information;
        let tracks = if include_tracks { track_count as u32 } else { 0 };
        let extra = config.info_part1_extra;
        let unaligned = flavor == Flavor::Bfstm && config.include_unaligned_loop_points;

        // Sample-derived sizes.
        let block_samples = config.samples_per_interleave;
        let block_size = bytes_for_samples(block_samples);
        let block_count = playable_samples.div_ceil(block_samples);
        let last_block_samples = playable_samples - (block_count - 1) * block_samples;
        let last_block_size_raw = bytes_for_samples(last_block_samples);
        let last_block_size_padded = align(last_block_size_raw);
        let seek_entry_count = playable_samples.div_ceil(config.samples_per_seek_table_entry);

        // Sub-chunk sizes.
        let info_part1_size = INFO_PART1_BASE_SIZE
            + if extra { INFO_PART1_EXTRA_SIZE } else { 0 }
            + if unaligned { 8 } else { 0 };
        let info_part2_size = if include_tracks {
            4 + 8 * tracks + TRACK_ENTRY_SIZE * tracks
        } else {
            0
        };
        let info_part3_size = 4 + 8 * channels + 8 * channels + CHANNEL_INFO_SIZE * channels;

        let info_size =
            align(INFO_HEADER_SIZE + info_part1_size + info_part2_size + info_part3_size);
        let seek_size = align(8 + seek_entry_count * BYTES_PER_SEEK_ENTRY * channels);
        let data_size = align(
            0x20 + ((block_count - 1) * align(block_size) + last_block_size_padded) * channels,
        );

        // Cumulative offsets.
        let info_offset = HEADER_SIZE;
        let seek_offset = info_offset + info_size;
        let data_offset = seek_offset + seek_size;
        let file_size = data_offset + data_size;

        Ok(Layout {
            playable_samples,
            block_count,
            block_samples,
            block_size,
            last_block_samples,
            last_block_size_raw,
            last_block_size_padded,
            seek_entry_count,
            samples_per_seek_entry: config.samples_per_seek_table_entry,
            info_part1_size,
            info_part2_size,
            info_part3_size,
            info_size,
            seek_size,
            data_size,
            info_offset,
            seek_offset,
            data_offset,
            file_size,
            audio_data_offset: 0x18,
            version: version_code(flavor, include_tracks, extra, unaligned),
            include_tracks,
            info_part1_extra: extra,
            include_unaligned_loop_points: unaligned,
            track_count: tracks,
            channel_count: channels,
        })
    }
}

/// Version code selection
///
/// BFSTM uses 4 when unaligned loop points are present, else 3. BCSTM
/// uses one of three legacy codes keyed on the track-information and
/// legacy-extra flags; downstream consumers branch on these, so the table
/// is fixed.
fn version_code(flavor: Flavor, tracks: bool, extra: bool, unaligned: bool) -> u32 {
    match flavor {
        Flavor::Bfstm => {
            if unaligned {
                4
            } else {
                3
            }
        }
        Flavor::Bcstm => {
            if tracks {
                0x200
            } else if extra {
                0x202
            } else {
                0x201
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn default_layout(channels: usize, samples: u32) -> Layout {
        Layout::compute(
            channels,
            1,
            samples,
            &Configuration::default(),
            Flavor::Bcstm,
        )
        .unwrap()
    }

    #[test]
    fn test_bytes_for_samples() {
        assert_eq!(bytes_for_samples(0), 0);
        assert_eq!(bytes_for_samples(14), 8);
        assert_eq!(bytes_for_samples(15), 16);
        assert_eq!(bytes_for_samples(0x3800), 0x2000);
    }

    #[test]
    fn test_chunk_sizes_are_aligned() {
        let layout = default_layout(2, 16000);
        assert_eq!(layout.info_size % ALIGNMENT, 0);
        assert_eq!(layout.seek_size % ALIGNMENT, 0);
        assert_eq!(layout.data_size % ALIGNMENT, 0);
        assert_eq!(layout.last_block_size_padded % ALIGNMENT, 0);
    }

    #[test]
    fn test_offsets_are_cumulative() {
        let layout = default_layout(2, 16000);
        assert_eq!(layout.info_offset, HEADER_SIZE);
        assert_eq!(layout.seek_offset, layout.info_offset + layout.info_size);
        assert_eq!(layout.data_offset, layout.seek_offset + layout.seek_size);
        assert_eq!(layout.file_size, layout.data_offset + layout.data_size);
    }

    #[test]
    fn test_data_size_formula() {
        // 16000 samples, 2 channels, default 0x3800-sample interleave.
        let layout = default_layout(2, 16000);
        assert_eq!(
            layout.data_size,
            32 + align(bytes_for_samples(16000)) * 2
        );
    }

    #[test]
    fn test_last_block() {
        let layout = default_layout(2, 16000);
        assert_eq!(layout.block_count, 2);
        assert_eq!(layout.last_block_samples, 16000 - 0x3800);
        assert_eq!(
            layout.last_block_size_raw,
            bytes_for_samples(layout.last_block_samples)
        );
        assert_eq!(
            layout.last_block_size_padded,
            align(layout.last_block_size_raw)
        );
    }

    #[test]
    fn test_seek_entry_count() {
        let layout = default_layout(2, 16000);
        assert_eq!(layout.seek_entry_count, 16000u32.div_ceil(0x80));
    }

    #[test]
    fn test_version_codes() {
        assert_eq!(version_code(Flavor::Bfstm, false, false, true), 4);
        assert_eq!(version_code(Flavor::Bfstm, true, true, false), 3);
        assert_eq!(version_code(Flavor::Bcstm, true, false, false), 0x200);
        assert_eq!(version_code(Flavor::Bcstm, true, true, false), 0x200);
        assert_eq!(version_code(Flavor::Bcstm, false, true, false), 0x202);
        assert_eq!(version_code(Flavor::Bcstm, false, false, false), 0x201);
    }

    #[test]
    fn test_zero_samples_rejected() {
        let result = Layout::compute(2, 0, 0, &Configuration::default(), Flavor::Bcstm);
        assert!(result.is_err());
    }
}
