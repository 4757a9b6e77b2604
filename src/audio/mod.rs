//! In-memory audio stream entities
//!
//! This module holds the domain objects the container codec reads and
//! writes: the stream, its channels with their ADPCM state, and the track
//! layout mapping tracks onto channels.

pub mod stream;

pub use stream::{AudioStream, Channel, Provenance, SeekTable, Track};
