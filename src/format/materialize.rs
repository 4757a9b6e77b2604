//! Conversion of validated parse results into audio stream entities
//!
//! Nothing is computed here beyond structural copying: loop state is
//! reconstructed only when the parsed looping flag is set, channel data
//! is de-blocked through the interleave engine, and the configuration
//! that produced the file is derived so a subsequent write reproduces an
//! equivalent container.

use super::binary::{BinaryReader, Endian};
use super::interleave::deinterleave;
use super::parser::ParsedStructure;
use super::Configuration;
use crate::audio::{AudioStream, Channel, Provenance, SeekTable, Track};
use crate::error::Result;

/// Build an [`AudioStream`] from a parsed container
pub fn materialize(parsed: ParsedStructure) -> Result<AudioStream> {
    let mut stream = AudioStream::new(parsed.sample_rate, parsed.sample_count);
    if parsed.looping {
        // The stored sample count is the loop end.
        stream.set_loop(parsed.loop_start, parsed.sample_count);
        stream.loop_start_unaligned = parsed.loop_start_unaligned;
        stream.loop_end_unaligned = parsed.loop_end_unaligned;
    }

    let seek_tables = match &parsed.seek_payload {
        Some(payload) => Some(split_seek_payload(
            payload,
            parsed.channel_count,
            parsed.samples_per_seek_entry,
        )?),
        None => None,
    };

    let mut audio = match &parsed.audio_payload {
        Some(payload) => Some(deinterleave(
            payload,
            parsed.block_size as usize,
            parsed.channel_count,
            parsed.block_count as usize,
            parsed.last_block_size_raw as usize,
            parsed.last_block_size_padded as usize,
        )?),
        None => None,
    };

    for (i, info) in parsed.channels.iter().enumerate() {
        let data = audio
            .as_mut()
            .map(|buffers| std::mem::take(&mut buffers[i]))
            .unwrap_or_default();
        let mut channel = Channel::new(info.coefs, data);
        channel.hist1 = info.hist1;
        channel.hist2 = info.hist2;
        channel.gain = info.gain;
        channel.loop_pred_scale = info.loop_pred_scale as u8;
        channel.loop_hist1 = info.loop_hist1;
        channel.loop_hist2 = info.loop_hist2;
        channel.loop_context_provenance = Provenance::External;
        if let Some(tables) = &seek_tables {
            channel.seek_table = Some(tables[i].clone());
            channel.seek_table_provenance = Provenance::External;
        }
        stream.channels.push(channel);
    }

    stream.tracks = parsed
        .tracks
        .iter()
        .map(|track| Track {
            volume: track.volume,
            panning: track.panning,
            channel_count: track.channel_count,
            channel_left: track.channel_left,
            channel_right: track.channel_right,
        })
        .collect();

    Ok(stream)
}

/// Split the interval-major seek payload into per-channel tables
fn split_seek_payload(
    payload: &[u8],
    channel_count: usize,
    samples_per_entry: u32,
) -> Result<Vec<SeekTable>> {
    let entry_count = payload.len() / (4 * channel_count);
    let mut tables = vec![
        SeekTable {
            samples_per_entry,
            entries: Vec::with_capacity(entry_count),
        };
        channel_count
    ];

    // Always little-endian, independent of container flavor.
    let mut reader = BinaryReader::new(payload, Endian::Little);
    for _ in 0..entry_count {
        for table in tables.iter_mut() {
            let hist1 = reader.read_i16()?;
            let hist2 = reader.read_i16()?;
            table.entries.push([hist1, hist2]);
        }
    }

    Ok(tables)
}

impl ParsedStructure {
    /// Derive the configuration that produced this file
    ///
    /// Loop-point alignment is set to 1: parsed loop points are already
    /// aligned, and re-rounding them would change the stream.
    pub fn configuration(&self) -> Configuration {
        Configuration {
            samples_per_interleave: self.block_samples,
            samples_per_seek_table_entry: self.samples_per_seek_entry,
            loop_point_alignment: 1,
            include_track_information: self.include_track_information,
            info_part1_extra: self.info_part1_extra,
            include_unaligned_loop_points: self.include_unaligned_loop_points,
            recalculate_seek_table: false,
            recalculate_loop_context: false,
        }
    }
}
