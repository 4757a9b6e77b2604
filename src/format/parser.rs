//! BCSTM/BFSTM container parser
//!
//! Parsing is split from materialization: this module walks the chunks,
//! cross-validates every redundant length and offset the format carries,
//! and extracts raw fields into a [`ParsedStructure`]. No domain object
//! is built until validation has finished.

use super::binary::BinaryReader;
use super::layout::{ALIGNMENT, BYTES_PER_SEEK_ENTRY, HEADER_SIZE};
use super::{
    Flavor, BYTE_ORDER_MARK, CODEC_ADPCM, DATA_TAG, INFO_TAG, REF_ADPCM_INFO, REF_BYTE_TABLE,
    REF_CHANNEL_INFO, REF_SAMPLE_DATA, REF_STREAM_INFO, REF_TRACK_INFO, SECTION_DATA, SECTION_INFO,
    SECTION_SEEK, SEEK_TAG,
};
use crate::error::{Error, Result};
use tracing::debug;

/// Raw track fields as stored in INFO part 2
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTrack {
    pub volume: u8,
    pub panning: u8,
    pub channel_count: u8,
    pub channel_left: u8,
    pub channel_right: u8,
}

/// Raw per-channel ADPCM info as stored in INFO part 3
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedChannel {
    pub coefs: [i16; 16],
    pub start_pred_scale: u16,
    pub hist1: i16,
    pub hist2: i16,
    pub loop_pred_scale: u16,
    pub loop_hist1: i16,
    pub loop_hist2: i16,
    pub gain: i16,
}

/// Every raw field of a validated container, prior to materialization
///
/// Write-once during a parse; consumed by the stream materializer. When
/// parsed with `read_audio_data` false the seek and audio payloads are
/// validated but not copied, supporting fast metadata-only inspection.
#[derive(Debug, Clone)]
pub struct ParsedStructure {
    pub flavor: Flavor,
    /// Version code from the header (the stored value shifted right 16)
    pub version: u32,
    pub file_size: u32,

    pub info_offset: u32,
    pub info_size: u32,
    pub seek_offset: u32,
    pub seek_size: u32,
    pub data_offset: u32,
    pub data_size: u32,

    pub codec: u8,
    pub looping: bool,
    pub channel_count: usize,
    pub sample_rate: u32,
    pub loop_start: u32,
    /// Playable sample count (loop end when looping)
    pub sample_count: u32,
    pub block_count: u32,
    pub block_size: u32,
    pub block_samples: u32,
    pub last_block_size_raw: u32,
    pub last_block_samples: u32,
    pub last_block_size_padded: u32,
    pub bytes_per_seek_entry: u32,
    pub samples_per_seek_entry: u32,
    pub audio_data_offset: u32,

    pub info_part1_extra: bool,
    pub include_unaligned_loop_points: bool,
    pub loop_start_unaligned: Option<u32>,
    pub loop_end_unaligned: Option<u32>,
    pub include_track_information: bool,

    pub tracks: Vec<ParsedTrack>,
    pub channels: Vec<ParsedChannel>,

    /// Raw seek-table payload (little-endian pairs), when audio was read
    pub seek_payload: Option<Vec<u8>>,
    /// Raw block-interleaved audio payload, when audio was read
    pub audio_payload: Option<Vec<u8>>,
}

fn read_reference(reader: &mut BinaryReader) -> Result<(u16, i32)> {
    let code = reader.read_u16()?;
    reader.skip(2)?;
    let offset = reader.read_i32()?;
    Ok((code, offset))
}

fn expect_reference(reader: &mut BinaryReader, chunk: &str, expected: u16) -> Result<i32> {
    let (code, offset) = read_reference(reader)?;
    if code != expected {
        return Err(Error::structural(
            chunk,
            format!(
                "reference type {:#06x} where {:#06x} was expected",
                code, expected
            ),
        ));
    }
    Ok(offset)
}

/// Validate a chunk's tag and cross-check its self-declared length
/// against the outer header table, leaving the cursor after the length
fn check_chunk(
    reader: &mut BinaryReader,
    name: &str,
    tag: &[u8; 4],
    offset: u32,
    declared_size: u32,
    file_size: u32,
) -> Result<()> {
    if offset + declared_size > file_size {
        return Err(Error::structural(
            name,
            format!(
                "chunk at {:#x} with length {:#x} extends past the declared file length {:#x}",
                offset, declared_size, file_size
            ),
        ));
    }

    reader.set_position(offset as usize);
    let found = reader.read_tag()?;
    if &found != tag {
        return Err(Error::structural(
            name,
            format!("chunk tag {:?} does not match expected {:?}", found, tag),
        ));
    }

    let self_size = reader.read_u32()?;
    if self_size != declared_size {
        return Err(Error::structural(
            name,
            format!(
                "header table declares {} bytes but the chunk declares {}",
                declared_size, self_size
            ),
        ));
    }

    Ok(())
}

/// Parse a BCSTM or BFSTM container
///
/// With `read_audio_data` false, chunk presence and lengths are still
/// fully validated but the seek and audio payloads are not copied.
pub fn parse(data: &[u8], flavor: Flavor, read_audio_data: bool) -> Result<ParsedStructure> {
    let mut reader = BinaryReader::new(data, flavor.endian());

    // Outer header.
    let tag = reader.read_tag()?;
    if &tag != flavor.tag() {
        return Err(Error::structural(
            "header",
            format!(
                "magic tag {} does not match expected {}",
                String::from_utf8_lossy(&tag),
                String::from_utf8_lossy(flavor.tag())
            ),
        ));
    }
    let bom = reader.read_u16()?;
    if bom != BYTE_ORDER_MARK {
        return Err(Error::structural(
            "header",
            format!("byte-order mark {:#06x}, expected {:#06x}", bom, BYTE_ORDER_MARK),
        ));
    }
    let header_size = reader.read_u16()?;
    if header_size as u32 != HEADER_SIZE {
        return Err(Error::structural(
            "header",
            format!("header size {:#x}, expected {:#x}", header_size, HEADER_SIZE),
        ));
    }
    let version = reader.read_u32()? >> 16;
    let file_size = reader.read_u32()?;
    if file_size as usize > data.len() {
        return Err(Error::structural(
            "header",
            format!(
                "declared file length {} exceeds input length {}",
                file_size,
                data.len()
            ),
        ));
    }

    // Section table.
    let section_count = reader.read_u16()?;
    reader.skip(2)?;
    let mut info_section = None;
    let mut seek_section = None;
    let mut data_section = None;
    for _ in 0..section_count {
        let code = reader.read_u16()?;
        reader.skip(2)?;
        let offset = reader.read_u32()?;
        let size = reader.read_u32()?;
        match code {
            SECTION_INFO => info_section = Some((offset, size)),
            SECTION_SEEK => seek_section = Some((offset, size)),
            SECTION_DATA => data_section = Some((offset, size)),
            other => {
                return Err(Error::structural(
                    "header",
                    format!("unknown section type {:#06x}", other),
                ))
            }
        }
    }
    let (info_offset, info_size) =
        info_section.ok_or_else(|| Error::structural("header", "missing INFO section"))?;
    let (seek_offset, seek_size) =
        seek_section.ok_or_else(|| Error::structural("header", "missing SEEK section"))?;
    let (data_offset, data_size) =
        data_section.ok_or_else(|| Error::structural("header", "missing DATA section"))?;

    // Cross-check each chunk's own header against the section table.
    check_chunk(&mut reader, "INFO", INFO_TAG, info_offset, info_size, file_size)?;
    check_chunk(&mut reader, "SEEK", SEEK_TAG, seek_offset, seek_size, file_size)?;
    check_chunk(&mut reader, "DATA", DATA_TAG, data_offset, data_size, file_size)?;

    debug!(version, file_size, "parsing {:?} container", flavor);

    // INFO part references, relative to INFO + 8.
    let info_base = info_offset + 8;
    reader.set_position(info_base as usize);
    let part1_offset = expect_reference(&mut reader, "INFO", REF_STREAM_INFO)?;
    let (_, part2_offset) = read_reference(&mut reader)?;
    let (_, part3_offset) = read_reference(&mut reader)?;
    if part1_offset < 0 || part3_offset < 0 {
        return Err(Error::structural("INFO", "negative sub-chunk offset"));
    }
    let include_track_information = part2_offset >= 0;

    // Part 1: stream parameters.
    reader.set_position((info_base + part1_offset as u32) as usize);
    let codec = reader.read_u8()?;
    if codec != CODEC_ADPCM {
        return Err(Error::unsupported(format!(
            "codec {} is not 4-bit ADPCM; PCM variants are not supported",
            codec
        )));
    }
    let looping = reader.read_u8()? != 0;
    let channel_count = reader.read_u8()? as usize;
    if channel_count == 0 {
        return Err(Error::structural("INFO", "stream info declares zero channels"));
    }
    reader.skip(1)?;
    let sample_rate = reader.read_u32()?;
    let loop_start = reader.read_u32()?;
    let sample_count = reader.read_u32()?;
    let block_count = reader.read_u32()?;
    let block_size = reader.read_u32()?;
    let block_samples = reader.read_u32()?;
    let last_block_size_raw = reader.read_u32()?;
    let last_block_samples = reader.read_u32()?;
    let last_block_size_padded = reader.read_u32()?;
    let bytes_per_seek_entry = reader.read_u32()?;
    let samples_per_seek_entry = reader.read_u32()?;
    let audio_data_offset = expect_reference(&mut reader, "INFO", REF_SAMPLE_DATA)? as u32;

    validate_block_fields(
        sample_count,
        block_count,
        block_samples,
        last_block_samples,
    )?;
    if samples_per_seek_entry == 0 {
        return Err(Error::structural("INFO", "samples per seek entry is zero"));
    }
    if bytes_per_seek_entry != BYTES_PER_SEEK_ENTRY {
        return Err(Error::unsupported(format!(
            "{} bytes per seek entry; only {}-byte history pairs are supported",
            bytes_per_seek_entry, BYTES_PER_SEEK_ENTRY
        )));
    }

    let include_unaligned_loop_points = flavor == Flavor::Bfstm && version >= 4;

    // Opaque legacy region. The marker alone is ambiguous: an unaligned
    // loop start can begin with the same 0x0100 bytes. The possible
    // part 1 sizes are all distinct, so detection also requires the part
    // to be large enough to hold the extra region.
    let part1_end = if include_track_information {
        part2_offset
    } else {
        part3_offset
    } as u32;
    let part1_size = part1_end
        .checked_sub(part1_offset as u32)
        .ok_or_else(|| Error::structural("INFO", "sub-chunk offsets are out of order"))?;
    let extra_size = super::layout::INFO_PART1_EXTRA_SIZE;
    let size_with_extra =
        0x38 + extra_size + if include_unaligned_loop_points { 8 } else { 0 };
    let mut info_part1_extra = false;
    if part1_size >= size_with_extra && reader.peek_u16()? == REF_BYTE_TABLE {
        info_part1_extra = true;
        reader.skip(extra_size as usize)?;
    }

    let (loop_start_unaligned, loop_end_unaligned) = if include_unaligned_loop_points {
        (Some(reader.read_u32()?), Some(reader.read_u32()?))
    } else {
        (None, None)
    };

    // Part 2: track table.
    let mut tracks = Vec::new();
    if include_track_information {
        let part2_base = info_base + part2_offset as u32;
        reader.set_position(part2_base as usize);
        let track_count = reader.read_u32()?;
        let mut entry_offsets = Vec::with_capacity(track_count as usize);
        for _ in 0..track_count {
            entry_offsets.push(expect_reference(&mut reader, "INFO", REF_TRACK_INFO)?);
        }
        for entry_offset in entry_offsets {
            reader.set_position((part2_base + entry_offset as u32) as usize);
            let volume = reader.read_u8()?;
            let panning = reader.read_u8()?;
            reader.skip(2)?;
            expect_reference(&mut reader, "INFO", REF_BYTE_TABLE)?;
            let count = reader.read_u32()?;
            if !matches!(count, 1 | 2) {
                return Err(Error::structural(
                    "INFO",
                    format!("track channel count {} is not 1 or 2", count),
                ));
            }
            let channel_left = reader.read_u8()?;
            let channel_right = reader.read_u8()?;
            tracks.push(ParsedTrack {
                volume,
                panning,
                channel_count: count as u8,
                channel_left,
                channel_right,
            });
        }
    }

    // Part 3: channel table.
    let part3_base = info_base + part3_offset as u32;
    reader.set_position(part3_base as usize);
    let part3_channels = reader.read_u32()? as usize;
    if part3_channels != channel_count {
        return Err(Error::structural(
            "INFO",
            format!(
                "stream info declares {} channels but the channel table declares {}",
                channel_count, part3_channels
            ),
        ));
    }
    let mut entry_offsets = Vec::with_capacity(channel_count);
    for _ in 0..channel_count {
        entry_offsets.push(expect_reference(&mut reader, "INFO", REF_CHANNEL_INFO)?);
    }
    let mut channels = Vec::with_capacity(channel_count);
    for entry_offset in entry_offsets {
        reader.set_position((part3_base + entry_offset as u32) as usize);
        let coef_offset = expect_reference(&mut reader, "INFO", REF_ADPCM_INFO)?;
        reader.set_position((part3_base + coef_offset as u32) as usize);
        let mut coefs = [0i16; 16];
        for coef in coefs.iter_mut() {
            *coef = reader.read_i16()?;
        }
        channels.push(ParsedChannel {
            coefs,
            start_pred_scale: reader.read_u16()?,
            hist1: reader.read_i16()?,
            hist2: reader.read_i16()?,
            loop_pred_scale: reader.read_u16()?,
            loop_hist1: reader.read_i16()?,
            loop_hist2: reader.read_i16()?,
            gain: reader.read_i16()?,
        });
    }

    // SEEK payload: validate the declared length holds the table.
    let seek_entry_count = sample_count.div_ceil(samples_per_seek_entry);
    let seek_table_bytes =
        seek_entry_count as u64 * bytes_per_seek_entry as u64 * channel_count as u64;
    if 8 + seek_table_bytes > seek_size as u64 {
        return Err(Error::structural(
            "SEEK",
            format!(
                "chunk length {} cannot hold {} table bytes",
                seek_size, seek_table_bytes
            ),
        ));
    }
    let seek_payload = if read_audio_data {
        let start = (seek_offset + 8) as usize;
        Some(data[start..start + seek_table_bytes as usize].to_vec())
    } else {
        None
    };

    // DATA payload: validate the declared block layout fits. The block
    // fields come from the file, so the size math is done in u64.
    let padded_block_size = (block_size as u64).div_ceil(ALIGNMENT as u64) * ALIGNMENT as u64;
    let payload_bytes = ((block_count as u64 - 1) * padded_block_size
        + last_block_size_padded as u64)
        * channel_count as u64;
    if 8 + audio_data_offset as u64 + payload_bytes > data_size as u64 {
        return Err(Error::structural(
            "DATA",
            format!(
                "chunk length {} cannot hold {} payload bytes at offset {}",
                data_size,
                payload_bytes,
                8 + audio_data_offset
            ),
        ));
    }
    let audio_payload = if read_audio_data {
        let start = (data_offset + 8 + audio_data_offset) as usize;
        Some(data[start..start + payload_bytes as usize].to_vec())
    } else {
        None
    };

    Ok(ParsedStructure {
        flavor,
        version,
        file_size,
        info_offset,
        info_size,
        seek_offset,
        seek_size,
        data_offset,
        data_size,
        codec,
        looping,
        channel_count,
        sample_rate,
        loop_start,
        sample_count,
        block_count,
        block_size,
        block_samples,
        last_block_size_raw,
        last_block_samples,
        last_block_size_padded,
        bytes_per_seek_entry,
        samples_per_seek_entry,
        audio_data_offset,
        info_part1_extra,
        include_unaligned_loop_points,
        loop_start_unaligned,
        loop_end_unaligned,
        include_track_information,
        tracks,
        channels,
        seek_payload,
        audio_payload,
    })
}

/// Cross-check the redundant block fields against the sample count
fn validate_block_fields(
    sample_count: u32,
    block_count: u32,
    block_samples: u32,
    last_block_samples: u32,
) -> Result<()> {
    if block_samples == 0 || block_count == 0 {
        return Err(Error::structural(
            "INFO",
            "interleave block count and size must be nonzero",
        ));
    }
    if block_count != sample_count.div_ceil(block_samples) {
        return Err(Error::structural(
            "INFO",
            format!(
                "{} blocks of {} samples cannot cover {} samples",
                block_count, block_samples, sample_count
            ),
        ));
    }
    if last_block_samples != sample_count - (block_count - 1) * block_samples {
        return Err(Error::structural(
            "INFO",
            format!(
                "last block declares {} samples, expected {}",
                last_block_samples,
                sample_count - (block_count - 1) * block_samples
            ),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rejects_short_input() {
        let err = parse(b"CSTM", Flavor::Bcstm, false).unwrap_err();
        assert!(matches!(err, Error::Structural { .. }));
    }

    #[test]
    fn test_parse_rejects_wrong_magic() {
        let mut data = vec![0u8; 0x40];
        data[0..4].copy_from_slice(b"RSTM");
        match parse(&data, Flavor::Bcstm, false) {
            Err(Error::Structural { field, .. }) => assert_eq!(field, "header"),
            other => panic!("expected structural error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_block_fields() {
        assert!(validate_block_fields(16000, 2, 0x3800, 16000 - 0x3800).is_ok());
        assert!(validate_block_fields(16000, 3, 0x3800, 16000 - 0x3800).is_err());
        assert!(validate_block_fields(16000, 2, 0x3800, 100).is_err());
        assert!(validate_block_fields(16000, 0, 0x3800, 0).is_err());
    }
}
