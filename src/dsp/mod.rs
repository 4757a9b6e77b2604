//! ADPCM-side collaborator routines
//!
//! The container codec never looks inside nibble data; it only decides
//! when to call these routines and where their output lands. They cover
//! the three derived quantities a container write may need to refresh:
//! the seek table, the loop context, and loop-point alignment.
//!
//! A frame is 8 bytes: one header byte (predictor index in the high
//! nibble, scale shift in the low nibble) followed by 14 sample nibbles,
//! high nibble first.

use crate::audio::{Channel, SeekTable};
use crate::error::Result;
use crate::format::binary::{BinaryWriter, Endian};
use crate::format::layout::{bytes_for_samples, BYTES_PER_FRAME, SAMPLES_PER_FRAME};

fn clamp16(value: i32) -> i16 {
    value.clamp(i16::MIN as i32, i16::MAX as i32) as i16
}

fn nibbles(byte: u8) -> [i32; 2] {
    let sign = |n: u8| -> i32 {
        if n >= 8 {
            n as i32 - 16
        } else {
            n as i32
        }
    };
    [sign(byte >> 4), sign(byte & 0xf)]
}

/// Decode up to `sample_count` samples from raw ADPCM frames
pub(crate) fn decode(
    adpcm: &[u8],
    coefs: &[i16; 16],
    hist1: i16,
    hist2: i16,
    sample_count: usize,
) -> Vec<i16> {
    let mut pcm = Vec::with_capacity(sample_count);
    let mut hist1 = hist1 as i32;
    let mut hist2 = hist2 as i32;

    'frames: for frame in adpcm.chunks(BYTES_PER_FRAME as usize) {
        let header = frame[0];
        let scale = 1i32 << (header & 0xf);
        let coef_index = ((header >> 4) & 0x7) as usize;
        let coef1 = coefs[coef_index * 2] as i32;
        let coef2 = coefs[coef_index * 2 + 1] as i32;

        for byte in &frame[1..] {
            for nibble in nibbles(*byte) {
                if pcm.len() >= sample_count {
                    break 'frames;
                }
                let predicted = coef1 * hist1 + coef2 * hist2;
                let sample = clamp16((((nibble * scale) << 11) + 1024 + predicted) >> 11);
                hist2 = hist1;
                hist1 = sample as i32;
                pcm.push(sample);
            }
        }
    }

    pcm
}

/// Compute a channel's seek table by decoding and snapshotting history
/// at every entry interval
pub fn calculate_seek_table(
    channel: &Channel,
    samples_per_entry: u32,
    sample_count: u32,
) -> SeekTable {
    let entry_count = sample_count.div_ceil(samples_per_entry) as usize;
    let pcm = decode(
        &channel.audio,
        &channel.coefs,
        channel.hist1,
        channel.hist2,
        sample_count as usize,
    );

    let sample_at = |index: i64| -> i16 {
        if index >= 0 {
            pcm.get(index as usize).copied().unwrap_or(0)
        } else if index == -1 {
            channel.hist1
        } else {
            channel.hist2
        }
    };

    let mut entries = Vec::with_capacity(entry_count);
    for i in 0..entry_count as i64 {
        let n = i * samples_per_entry as i64;
        entries.push([sample_at(n - 1), sample_at(n - 2)]);
    }

    SeekTable {
        samples_per_entry,
        entries,
    }
}

/// Serialize the seek-chunk payload from the channels' seek tables
///
/// Entries are emitted interval-major, one history pair per channel per
/// entry. Channels without an entry at a given interval contribute zeros.
pub fn build_seek_table(
    channels: &[Channel],
    entry_count: usize,
    endian: Endian,
) -> Result<Vec<u8>> {
    let mut writer = BinaryWriter::with_capacity(endian, entry_count * 4 * channels.len())?;
    for entry in 0..entry_count {
        for channel in channels {
            let pair = channel
                .seek_table
                .as_ref()
                .and_then(|table| table.entries.get(entry))
                .copied()
                .unwrap_or([0, 0]);
            writer.write_i16(pair[0]);
            writer.write_i16(pair[1]);
        }
    }
    Ok(writer.into_bytes())
}

/// Compute each channel's loop context in place: the predictor/scale byte
/// of the frame containing the loop start and the two history samples
/// preceding it
pub fn compute_loop_context(channels: &mut [Channel], loop_start: u32) {
    for channel in channels {
        let header_index = (loop_start / SAMPLES_PER_FRAME * BYTES_PER_FRAME) as usize;
        channel.loop_pred_scale = channel.audio.get(header_index).copied().unwrap_or(0);

        let pcm = decode(
            &channel.audio,
            &channel.coefs,
            channel.hist1,
            channel.hist2,
            loop_start as usize,
        );
        let sample_at = |index: i64| -> i16 {
            if index >= 0 {
                pcm.get(index as usize).copied().unwrap_or(0)
            } else if index == -1 {
                channel.hist1
            } else {
                channel.hist2
            }
        };
        channel.loop_hist1 = sample_at(loop_start as i64 - 1);
        channel.loop_hist2 = sample_at(loop_start as i64 - 2);
    }
}

/// Round the loop start up to the alignment granularity and shift the
/// loop end by the same delta
///
/// Channel buffers too short to cover the shifted loop end are
/// zero-extended so the container payload math stays total.
pub fn align_loop(
    channels: &mut [Channel],
    alignment: u32,
    loop_start: u32,
    loop_end: u32,
) -> (u32, u32) {
    if alignment <= 1 || loop_start % alignment == 0 {
        return (loop_start, loop_end);
    }

    let aligned_start = loop_start.div_ceil(alignment) * alignment;
    let delta = aligned_start - loop_start;
    let aligned_end = loop_end + delta;

    let needed = bytes_for_samples(aligned_end) as usize;
    for channel in channels {
        if channel.audio.len() < needed {
            channel.audio.resize(needed, 0);
        }
    }

    (aligned_start, aligned_end)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// One frame, zero coefficients, scale shift 0: output equals the
    /// signed nibble values.
    fn identity_frame(nibbles: [i8; 14]) -> Vec<u8> {
        let mut frame = vec![0u8];
        for pair in nibbles.chunks(2) {
            frame.push(((pair[0] as u8 & 0xf) << 4) | (pair[1] as u8 & 0xf));
        }
        frame
    }

    #[test]
    fn test_decode_identity_scale() {
        let frame = identity_frame([1, 2, 3, -1, -2, 0, 7, -8, 5, 6, 0, 0, 1, 1]);
        let pcm = decode(&frame, &[0; 16], 0, 0, 14);
        assert_eq!(pcm, vec![1, 2, 3, -1, -2, 0, 7, -8, 5, 6, 0, 0, 1, 1]);
    }

    #[test]
    fn test_decode_respects_sample_count() {
        let frame = identity_frame([1; 14]);
        assert_eq!(decode(&frame, &[0; 16], 0, 0, 5).len(), 5);
    }

    #[test]
    fn test_seek_table_snapshots_history() {
        let mut audio = identity_frame([1, 2, 3, 4, 5, 6, 7, 7, 6, 5, 4, 3, 2, 1]);
        audio.extend(identity_frame([0; 14]));
        let channel = Channel::new([0; 16], audio);

        let table = calculate_seek_table(&channel, 14, 28);
        assert_eq!(table.entries.len(), 2);
        // Entry 0 carries the stream-start history.
        assert_eq!(table.entries[0], [0, 0]);
        // Entry 1 is the last two samples of frame 0.
        assert_eq!(table.entries[1], [1, 2]);
    }

    #[test]
    fn test_loop_context() {
        let mut audio = identity_frame([1, 2, 3, 4, 5, 6, 7, 7, 6, 5, 4, 3, 2, 9]);
        audio.extend(identity_frame([0; 14]));
        audio[8] = 0x12; // header byte of frame 1
        let mut channels = vec![Channel::new([0; 16], audio)];

        compute_loop_context(&mut channels, 14);
        assert_eq!(channels[0].loop_pred_scale, 0x12);
        assert_eq!(channels[0].loop_hist1, 9);
        assert_eq!(channels[0].loop_hist2, 2);
    }

    #[test]
    fn test_align_loop() {
        let mut channels = vec![Channel::new([0; 16], vec![0; 8])];
        let (start, end) = align_loop(&mut channels, 32, 100, 16000);
        assert_eq!(start, 128);
        assert_eq!(end, 16028);
        assert!(channels[0].audio.len() >= bytes_for_samples(16028) as usize);
    }

    #[test]
    fn test_align_loop_already_aligned() {
        let mut channels = vec![Channel::new([0; 16], vec![0; 8])];
        assert_eq!(align_loop(&mut channels, 32, 96, 16000), (96, 16000));
        assert_eq!(channels[0].audio.len(), 8);
    }

    #[test]
    fn test_build_seek_table_little_endian() {
        let mut channel = Channel::new([0; 16], Vec::new());
        channel.seek_table = Some(SeekTable {
            samples_per_entry: 0x80,
            entries: vec![[0x0102, 0x0304]],
        });
        let bytes = build_seek_table(&[channel], 2, Endian::Little).unwrap();
        // Entry 0 from the table, entry 1 zero-filled.
        assert_eq!(bytes, vec![0x02, 0x01, 0x04, 0x03, 0, 0, 0, 0]);
    }
}
