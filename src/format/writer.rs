//! BCSTM/BFSTM container writer
//!
//! Single-shot emission: compute the full layout up front, refresh any
//! stale derived data through the DSP routines, then emit the header and
//! the INFO, SEEK, and DATA chunks into a pre-sized buffer, repositioning
//! the cursor at each chunk boundary.

use super::binary::{BinaryWriter, Endian};
use super::layout::{bytes_for_samples, Layout, BYTES_PER_SEEK_ENTRY, HEADER_SIZE};
use super::{
    Configuration, Flavor, BYTE_ORDER_MARK, DATA_TAG, INFO_TAG, REF_ADPCM_INFO, REF_BYTE_TABLE,
    REF_CHANNEL_INFO, REF_INFO_PART, REF_SAMPLE_DATA, REF_STREAM_INFO, REF_TRACK_INFO, SECTION_DATA,
    SECTION_INFO, SECTION_SEEK, SEEK_TAG,
};
use crate::audio::{AudioStream, Channel, Provenance, Track};
use crate::dsp;
use crate::error::{Error, Result};
use tracing::debug;

/// Write a stream into a BCSTM or BFSTM container
///
/// Channels may be mutated in place: missing or stale seek tables and
/// loop contexts are recomputed (and marked self-computed), and looping
/// streams have their loop points aligned to the configured granularity.
pub fn write(stream: &mut AudioStream, config: &Configuration, flavor: Flavor) -> Result<Vec<u8>> {
    config.validate()?;
    stream.validate()?;

    if stream.looping {
        align_stream_loop(stream, config);
    }
    let playable = stream.playable_samples();

    let tracks: Vec<Track> = if config.include_track_information {
        if stream.tracks.is_empty() {
            AudioStream::default_tracks(stream.channels.len())
        } else {
            stream.tracks.clone()
        }
    } else {
        Vec::new()
    };

    let layout = Layout::compute(stream.channels.len(), tracks.len(), playable, config, flavor)?;

    let needed = bytes_for_samples(playable) as usize;
    for (i, channel) in stream.channels.iter().enumerate() {
        if channel.audio.len() < needed {
            return Err(Error::invalid_input(format!(
                "channel {} has {} bytes of audio but the layout needs {}",
                i,
                channel.audio.len(),
                needed
            )));
        }
    }

    refresh_derived_data(stream, config, &layout);

    debug!(
        file_size = layout.file_size,
        channels = layout.channel_count,
        samples = playable,
        "writing {:?} container",
        flavor
    );

    let mut writer = BinaryWriter::with_capacity(flavor.endian(), layout.file_size as usize)?;
    write_header(&mut writer, &layout, flavor);
    write_info_chunk(&mut writer, &layout, stream, &tracks);
    write_seek_chunk(&mut writer, &layout, &stream.channels)?;
    write_data_chunk(&mut writer, &layout, &stream.channels)?;
    writer.set_position(layout.file_size as usize);

    Ok(writer.into_bytes())
}

/// Align the loop start to the configured granularity, preserving the
/// original values for the optional unaligned-loop-point fields
fn align_stream_loop(stream: &mut AudioStream, config: &Configuration) {
    let (orig_start, orig_end) = (stream.loop_start, stream.loop_end);
    let (start, end) = dsp::align_loop(
        &mut stream.channels,
        config.loop_point_alignment,
        orig_start,
        orig_end,
    );
    if start != orig_start {
        if stream.loop_start_unaligned.is_none() {
            stream.loop_start_unaligned = Some(orig_start);
            stream.loop_end_unaligned = Some(orig_end);
        }
        stream.loop_start = start;
        stream.loop_end = end;
        if stream.sample_count < end {
            stream.sample_count = end;
        }
    }
}

/// Recompute seek tables and loop contexts for channels whose provenance
/// marks them missing or stale; externally supplied data is left alone
/// unless the configuration forces recomputation
fn refresh_derived_data(stream: &mut AudioStream, config: &Configuration, layout: &Layout) {
    let playable = layout.playable_samples;
    for channel in stream.channels.iter_mut() {
        if needs_seek_recompute(channel, config, layout) {
            channel.seek_table = Some(dsp::calculate_seek_table(
                channel,
                layout.samples_per_seek_entry,
                playable,
            ));
            channel.seek_table_provenance = Provenance::SelfComputed;
        }
    }

    if stream.looping {
        let loop_start = stream.loop_start;
        for channel in stream.channels.iter_mut() {
            if needs_loop_recompute(channel, config) {
                dsp::compute_loop_context(std::slice::from_mut(channel), loop_start);
                channel.loop_context_provenance = Provenance::SelfComputed;
            }
        }
    }
}

fn needs_seek_recompute(channel: &Channel, config: &Configuration, layout: &Layout) -> bool {
    let stale = match &channel.seek_table {
        None => return true,
        Some(table) => {
            table.samples_per_entry != layout.samples_per_seek_entry
                || table.entries.len() != layout.seek_entry_count as usize
        }
    };
    if config.recalculate_seek_table {
        return true;
    }
    match channel.seek_table_provenance {
        Provenance::Unset => true,
        Provenance::External => false,
        Provenance::SelfComputed => stale,
    }
}

fn needs_loop_recompute(channel: &Channel, config: &Configuration) -> bool {
    if config.recalculate_loop_context {
        return true;
    }
    match channel.loop_context_provenance {
        Provenance::Unset | Provenance::SelfComputed => true,
        Provenance::External => false,
    }
}

fn write_reference(writer: &mut BinaryWriter, code: u16, offset: i32) {
    writer.write_u16(code);
    writer.write_u16(0);
    writer.write_i32(offset);
}

fn write_header(writer: &mut BinaryWriter, layout: &Layout, flavor: Flavor) {
    writer.write_tag(flavor.tag());
    writer.write_u16(BYTE_ORDER_MARK);
    writer.write_u16(HEADER_SIZE as u16);
    writer.write_u32(layout.version << 16);
    writer.write_u32(layout.file_size);
    writer.write_u16(3);
    writer.write_u16(0);

    for (code, offset, size) in [
        (SECTION_INFO, layout.info_offset, layout.info_size),
        (SECTION_SEEK, layout.seek_offset, layout.seek_size),
        (SECTION_DATA, layout.data_offset, layout.data_size),
    ] {
        writer.write_u16(code);
        writer.write_u16(0);
        writer.write_u32(offset);
        writer.write_u32(size);
    }

    writer.set_position(HEADER_SIZE as usize);
}

fn write_info_chunk(
    writer: &mut BinaryWriter,
    layout: &Layout,
    stream: &AudioStream,
    tracks: &[Track],
) {
    writer.set_position(layout.info_offset as usize);
    writer.write_tag(INFO_TAG);
    writer.write_u32(layout.info_size);

    // Part references, relative to INFO + 8.
    let part1_offset = 0x18;
    let part2_offset = part1_offset + layout.info_part1_size as i32;
    let part3_offset = part2_offset + layout.info_part2_size as i32;
    write_reference(writer, REF_STREAM_INFO, part1_offset);
    write_reference(
        writer,
        REF_INFO_PART,
        if layout.include_tracks { part2_offset } else { -1 },
    );
    write_reference(writer, REF_INFO_PART, part3_offset);

    write_info_part1(writer, layout, stream);
    if layout.include_tracks {
        write_info_part2(writer, tracks);
    }
    write_info_part3(writer, layout, &stream.channels);

    writer.set_position((layout.seek_offset) as usize);
}

fn write_info_part1(writer: &mut BinaryWriter, layout: &Layout, stream: &AudioStream) {
    writer.write_u8(super::CODEC_ADPCM);
    writer.write_u8(stream.looping as u8);
    writer.write_u8(layout.channel_count as u8);
    writer.write_u8(0);
    writer.write_u32(stream.sample_rate);
    writer.write_u32(if stream.looping { stream.loop_start } else { 0 });
    writer.write_u32(layout.playable_samples);
    writer.write_u32(layout.block_count);
    writer.write_u32(layout.block_size);
    writer.write_u32(layout.block_samples);
    writer.write_u32(layout.last_block_size_raw);
    writer.write_u32(layout.last_block_samples);
    writer.write_u32(layout.last_block_size_padded);
    writer.write_u32(BYTES_PER_SEEK_ENTRY);
    writer.write_u32(layout.samples_per_seek_entry);
    write_reference(writer, REF_SAMPLE_DATA, layout.audio_data_offset as i32);

    if layout.info_part1_extra {
        // Opaque legacy region; semantics historically discovered, not
        // specified. Written as its marker plus zeroed payload.
        writer.write_u16(REF_BYTE_TABLE);
        writer.write_u16(0);
        writer.write_u32(0);
        writer.write_u32(0);
    }

    if layout.include_unaligned_loop_points {
        let (start, end) = if stream.looping {
            (
                stream.loop_start_unaligned.unwrap_or(stream.loop_start),
                stream.loop_end_unaligned.unwrap_or(stream.loop_end),
            )
        } else {
            (0, 0)
        };
        writer.write_u32(start);
        writer.write_u32(end);
    }
}

fn write_info_part2(writer: &mut BinaryWriter, tracks: &[Track]) {
    let count = tracks.len() as u32;
    writer.write_u32(count);
    for i in 0..count {
        // Track entries follow the reference table directly.
        write_reference(writer, REF_TRACK_INFO, (4 + 8 * count + 0x14 * i) as i32);
    }
    for track in tracks {
        writer.write_u8(track.volume);
        writer.write_u8(track.panning);
        writer.write_u16(0);
        write_reference(writer, REF_BYTE_TABLE, 0xc);
        writer.write_u32(track.channel_count as u32);
        writer.write_u8(track.channel_left);
        writer.write_u8(if track.channel_count == 2 {
            track.channel_right
        } else {
            0
        });
        writer.write_u16(0);
    }
}

fn write_info_part3(writer: &mut BinaryWriter, layout: &Layout, channels: &[Channel]) {
    let count = layout.channel_count;
    writer.write_u32(count);
    for i in 0..count {
        write_reference(writer, REF_CHANNEL_INFO, (4 + 8 * count + 8 * i) as i32);
    }
    for i in 0..count {
        write_reference(writer, REF_ADPCM_INFO, (4 + 16 * count + 0x2e * i) as i32);
    }
    for channel in channels {
        for coef in channel.coefs {
            writer.write_i16(coef);
        }
        // Start predictor/scale is the first byte of the channel's data.
        writer.write_u16(channel.audio.first().copied().unwrap_or(0) as u16);
        writer.write_i16(channel.hist1);
        writer.write_i16(channel.hist2);
        writer.write_u16(channel.loop_pred_scale as u16);
        writer.write_i16(channel.loop_hist1);
        writer.write_i16(channel.loop_hist2);
        writer.write_i16(channel.gain);
    }
}

fn write_seek_chunk(writer: &mut BinaryWriter, layout: &Layout, channels: &[Channel]) -> Result<()> {
    writer.set_position(layout.seek_offset as usize);
    writer.write_tag(SEEK_TAG);
    writer.write_u32(layout.seek_size);

    // Seek entries are little-endian in both flavors.
    let table = dsp::build_seek_table(channels, layout.seek_entry_count as usize, Endian::Little)?;
    writer.write_bytes(&table);
    writer.set_position(layout.data_offset as usize);
    Ok(())
}

fn write_data_chunk(writer: &mut BinaryWriter, layout: &Layout, channels: &[Channel]) -> Result<()> {
    writer.set_position(layout.data_offset as usize);
    writer.write_tag(DATA_TAG);
    writer.write_u32(layout.data_size);
    writer.set_position((layout.data_offset + 8 + layout.audio_data_offset) as usize);

    let payload_len = ((layout.block_count - 1) * layout.block_size + layout.last_block_size_raw)
        as usize;
    let slices: Vec<&[u8]> = channels
        .iter()
        .map(|channel| &channel.audio[..payload_len])
        .collect();
    let payload = super::interleave::interleave(
        &slices,
        layout.block_size as usize,
        layout.last_block_size_raw as usize,
        layout.last_block_size_padded as usize,
    )?;
    writer.write_bytes(&payload);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::layout::SAMPLES_PER_FRAME;

    fn test_stream(channels: usize, samples: u32) -> AudioStream {
        let bytes = bytes_for_samples(samples) as usize;
        let mut stream = AudioStream::new(32000, samples);
        for i in 0..channels {
            let audio: Vec<u8> = (0..bytes).map(|b| (b + i * 31) as u8).collect();
            let mut coefs = [0i16; 16];
            coefs[0] = 0x100;
            stream.channels.push(Channel::new(coefs, audio));
        }
        stream
    }

    #[test]
    fn test_write_produces_declared_file_size() {
        let mut stream = test_stream(2, 16000);
        let config = Configuration::default();
        let bytes = write(&mut stream, &config, Flavor::Bcstm).unwrap();

        let layout = Layout::compute(2, 1, 16000, &config, Flavor::Bcstm).unwrap();
        assert_eq!(bytes.len(), layout.file_size as usize);
        assert_eq!(&bytes[0..4], b"CSTM");
    }

    #[test]
    fn test_write_marks_derived_data_self_computed() {
        let mut stream = test_stream(1, 1000);
        stream.set_loop(0, 1000);
        write(&mut stream, &Configuration::default(), Flavor::Bfstm).unwrap();
        assert_eq!(
            stream.channels[0].seek_table_provenance,
            Provenance::SelfComputed
        );
        assert_eq!(
            stream.channels[0].loop_context_provenance,
            Provenance::SelfComputed
        );
        assert!(stream.channels[0].seek_table.is_some());
    }

    #[test]
    fn test_write_preserves_external_seek_table() {
        let mut stream = test_stream(1, 256);
        let table = crate::audio::SeekTable {
            samples_per_entry: 0x80,
            entries: vec![[11, 22], [33, 44]],
        };
        stream.channels[0].seek_table = Some(table.clone());
        stream.channels[0].seek_table_provenance = Provenance::External;

        write(&mut stream, &Configuration::default(), Flavor::Bcstm).unwrap();
        assert_eq!(stream.channels[0].seek_table.as_ref(), Some(&table));
        assert_eq!(
            stream.channels[0].seek_table_provenance,
            Provenance::External
        );
    }

    #[test]
    fn test_write_rejects_short_channel() {
        let mut stream = test_stream(1, 16000);
        stream.channels[0].audio.truncate(16);
        let err = write(&mut stream, &Configuration::default(), Flavor::Bcstm);
        assert!(matches!(err, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_loop_alignment_shifts_points() {
        let mut stream = test_stream(1, 16000);
        stream.set_loop(100, 16000);
        let mut config = Configuration::default();
        config.loop_point_alignment = 32;
        write(&mut stream, &config, Flavor::Bcstm).unwrap();
        assert_eq!(stream.loop_start, 128);
        assert_eq!(stream.loop_end, 16028);
        assert_eq!(stream.loop_start_unaligned, Some(100));
    }

    #[test]
    fn test_samples_per_frame_divides_default_interleave() {
        assert_eq!(
            Configuration::default().samples_per_interleave % SAMPLES_PER_FRAME,
            0
        );
    }
}
