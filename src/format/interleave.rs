//! Block interleaving of per-channel audio data
//!
//! The DATA chunk stores channel data in interleave blocks: a fixed-size
//! run of one channel's bytes, then the next channel's, repeated per
//! block across the payload. Every block is zero-padded to the chunk
//! alignment boundary; the final block is sized by the declared padded
//! size rather than the nominal block size.

use super::layout::ALIGNMENT;
use crate::error::{Error, Result};

fn pad_to_alignment(size: usize) -> usize {
    size.div_ceil(ALIGNMENT as usize) * ALIGNMENT as usize
}

/// Interleave flat per-channel buffers into one block-interleaved payload
///
/// All channel slices must have identical length. `last_block_raw` and
/// `last_block_padded` are the declared sizes of the final block; the
/// remaining length after the full blocks must match `last_block_raw`.
pub fn interleave(
    channels: &[&[u8]],
    block_size: usize,
    last_block_raw: usize,
    last_block_padded: usize,
) -> Result<Vec<u8>> {
    if channels.is_empty() {
        return Err(Error::invalid_input("interleave requires at least one channel"));
    }
    let len = channels[0].len();
    for (i, channel) in channels.iter().enumerate() {
        if channel.len() != len {
            return Err(Error::invalid_input(format!(
                "channel {} length {} differs from channel 0 length {}",
                i,
                channel.len(),
                len
            )));
        }
    }
    if block_size == 0 {
        return Err(Error::invalid_input("interleave block size is zero"));
    }

    let block_count = len.div_ceil(block_size).max(1);
    if len != (block_count - 1) * block_size + last_block_raw {
        return Err(Error::invalid_input(format!(
            "channel length {} does not match {} blocks of {} plus a final {}",
            len,
            block_count - 1,
            block_size,
            last_block_raw
        )));
    }

    let full_block_padded = pad_to_alignment(block_size);
    let total =
        ((block_count - 1) * full_block_padded + last_block_padded) * channels.len();
    let mut out = Vec::with_capacity(total);

    for block in 0..block_count {
        let start = block * block_size;
        let last = block == block_count - 1;
        for channel in channels {
            if last {
                out.extend_from_slice(&channel[start..start + last_block_raw]);
                out.resize(out.len() + last_block_padded - last_block_raw, 0);
            } else {
                out.extend_from_slice(&channel[start..start + block_size]);
                out.resize(out.len() + full_block_padded - block_size, 0);
            }
        }
    }

    Ok(out)
}

/// Split a block-interleaved payload back into flat per-channel buffers
///
/// Exact inverse of [`interleave`]: padding bytes are consumed but not
/// copied, and the final block stops at its declared unpadded size.
pub fn deinterleave(
    data: &[u8],
    block_size: usize,
    channel_count: usize,
    block_count: usize,
    last_block_raw: usize,
    last_block_padded: usize,
) -> Result<Vec<Vec<u8>>> {
    if channel_count == 0 || block_count == 0 {
        return Err(Error::invalid_input(
            "deinterleave requires at least one channel and one block",
        ));
    }

    let channel_len = (block_count - 1) * block_size + last_block_raw;
    let full_block_padded = pad_to_alignment(block_size);
    let needed = ((block_count - 1) * full_block_padded + last_block_padded) * channel_count;
    if data.len() < needed {
        return Err(Error::structural(
            "DATA",
            format!(
                "audio payload is {} bytes but the declared block layout needs {}",
                data.len(),
                needed
            ),
        ));
    }

    let mut channels = vec![Vec::with_capacity(channel_len); channel_count];
    let mut pos = 0usize;

    for block in 0..block_count {
        let last = block == block_count - 1;
        let (take, stride) = if last {
            (last_block_raw, last_block_padded)
        } else {
            (block_size, full_block_padded)
        };
        for channel in channels.iter_mut() {
            channel.extend_from_slice(&data[pos..pos + take]);
            pos += stride;
        }
    }

    Ok(channels)
}
