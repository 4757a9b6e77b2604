//! Audio stream, channel, and track entities

use crate::error::{Error, Result};

/// Provenance of a channel's derived data (seek table, loop context)
///
/// Models the dirty/clean cache the writer consults before asking the DSP
/// routines to recompute anything. Externally supplied data is preserved
/// as-is unless the configuration forces recomputation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Provenance {
    /// Never computed; must be computed before writing
    #[default]
    Unset,
    /// Computed by this library; safe to recompute when stale
    SelfComputed,
    /// Supplied by the caller or read from a file; preserved as-is
    External,
}

/// Per-channel seek table: decoder history snapshots at fixed sample
/// intervals, enabling mid-stream seeking without decoding from the start
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeekTable {
    /// Sample interval between entries
    pub samples_per_entry: u32,
    /// One `[hist1, hist2]` pair per interval, entry 0 at sample 0
    pub entries: Vec<[i16; 2]>,
}

/// A single ADPCM channel and its decoder state
#[derive(Debug, Clone)]
pub struct Channel {
    /// 16 signed prediction coefficients (8 pairs)
    pub coefs: [i16; 16],
    /// First history value at stream start
    pub hist1: i16,
    /// Second history value at stream start
    pub hist2: i16,
    /// Channel gain
    pub gain: i16,
    /// Predictor/scale byte at the loop point
    pub loop_pred_scale: u8,
    /// First history value at the loop point
    pub loop_hist1: i16,
    /// Second history value at the loop point
    pub loop_hist2: i16,
    /// Seek table, if one has been computed or supplied
    pub seek_table: Option<SeekTable>,
    /// Raw 4-bit ADPCM nibble data
    pub audio: Vec<u8>,
    /// Where the seek table came from
    pub seek_table_provenance: Provenance,
    /// Where the loop context came from
    pub loop_context_provenance: Provenance,
}

impl Channel {
    /// Create a channel from its coefficients and raw ADPCM data
    pub fn new(coefs: [i16; 16], audio: Vec<u8>) -> Self {
        Channel {
            coefs,
            hist1: 0,
            hist2: 0,
            gain: 0,
            loop_pred_scale: 0,
            loop_hist1: 0,
            loop_hist2: 0,
            seek_table: None,
            audio,
            seek_table_provenance: Provenance::Unset,
            loop_context_provenance: Provenance::Unset,
        }
    }
}

/// A track: a mono or stereo grouping of channels with playback parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    /// Playback volume (0x7f = full)
    pub volume: u8,
    /// Panning (0x40 = center)
    pub panning: u8,
    /// Number of channels in the track (1 or 2)
    pub channel_count: u8,
    /// Index of the left (or only) channel
    pub channel_left: u8,
    /// Index of the right channel (unused for mono tracks)
    pub channel_right: u8,
}

impl Track {
    /// Create a mono track over one channel
    pub fn mono(channel: u8) -> Self {
        Track {
            volume: 0x7f,
            panning: 0x40,
            channel_count: 1,
            channel_left: channel,
            channel_right: 0,
        }
    }

    /// Create a stereo track over a channel pair
    pub fn stereo(left: u8, right: u8) -> Self {
        Track {
            volume: 0x7f,
            panning: 0x40,
            channel_count: 2,
            channel_left: left,
            channel_right: right,
        }
    }
}

/// A complete multichannel ADPCM audio stream
///
/// Owns its channels and tracks exclusively. Loop fields are ignored by
/// the codec when `looping` is false: they are neither written nor
/// required to be valid.
#[derive(Debug, Clone)]
pub struct AudioStream {
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Total sample count per channel
    pub sample_count: u32,
    /// Whether the stream loops
    pub looping: bool,
    /// Loop start sample index
    pub loop_start: u32,
    /// Loop end sample index
    pub loop_end: u32,
    /// Original loop start before alignment, when known
    pub loop_start_unaligned: Option<u32>,
    /// Original loop end before alignment, when known
    pub loop_end_unaligned: Option<u32>,
    /// Ordered channel list
    pub channels: Vec<Channel>,
    /// Ordered track list; may be empty, in which case a default layout
    /// is synthesized at write time if tracks are requested
    pub tracks: Vec<Track>,
}

impl AudioStream {
    /// Create an empty stream with the given rate and length
    pub fn new(sample_rate: u32, sample_count: u32) -> Self {
        AudioStream {
            sample_rate,
            sample_count,
            looping: false,
            loop_start: 0,
            loop_end: 0,
            loop_start_unaligned: None,
            loop_end_unaligned: None,
            channels: Vec::new(),
            tracks: Vec::new(),
        }
    }

    /// Mark the stream as looping between the given sample indices
    pub fn set_loop(&mut self, start: u32, end: u32) {
        self.looping = true;
        self.loop_start = start;
        self.loop_end = end;
    }

    /// The sample count the container layout is built from: the loop end
    /// when looping, the full stream length otherwise
    pub fn playable_samples(&self) -> u32 {
        if self.looping {
            self.loop_end
        } else {
            self.sample_count
        }
    }

    /// Validate the stream shape before writing
    pub fn validate(&self) -> Result<()> {
        if self.channels.is_empty() {
            return Err(Error::invalid_input("stream has no channels"));
        }

        if self.channels.len() > u8::MAX as usize {
            return Err(Error::invalid_input(format!(
                "too many channels: {}",
                self.channels.len()
            )));
        }

        if self.playable_samples() == 0 {
            return Err(Error::invalid_input("stream has no samples"));
        }

        if self.looping && self.loop_start > self.loop_end {
            return Err(Error::invalid_input(format!(
                "loop start {} is past loop end {}",
                self.loop_start, self.loop_end
            )));
        }

        let first_len = self.channels[0].audio.len();
        for (i, channel) in self.channels.iter().enumerate() {
            if channel.audio.len() != first_len {
                return Err(Error::invalid_input(format!(
                    "channel {} audio length {} differs from channel 0 length {}",
                    i,
                    channel.audio.len(),
                    first_len
                )));
            }
        }

        for (i, track) in self.tracks.iter().enumerate() {
            if !matches!(track.channel_count, 1 | 2) {
                return Err(Error::invalid_input(format!(
                    "track {} has invalid channel count {}",
                    i, track.channel_count
                )));
            }
            let max = track.channel_left.max(if track.channel_count == 2 {
                track.channel_right
            } else {
                0
            });
            if max as usize >= self.channels.len() {
                return Err(Error::invalid_input(format!(
                    "track {} references channel {} but the stream has {}",
                    i,
                    max,
                    self.channels.len()
                )));
            }
        }

        Ok(())
    }

    /// Default track layout: one stereo track per channel pair, with a
    /// trailing mono track for an odd channel
    pub fn default_tracks(channel_count: usize) -> Vec<Track> {
        let mut tracks = Vec::with_capacity(channel_count.div_ceil(2));
        let mut ch = 0u8;
        let mut remaining = channel_count;
        while remaining > 0 {
            if remaining >= 2 {
                tracks.push(Track::stereo(ch, ch + 1));
                ch += 2;
                remaining -= 2;
            } else {
                tracks.push(Track::mono(ch));
                remaining -= 1;
            }
        }
        tracks
    }
}
