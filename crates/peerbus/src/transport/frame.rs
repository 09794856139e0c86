// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Length-prefix framing for the streaming transport.
//!
//! TCP is a stream protocol without message boundaries. Every logical frame
//! is delimited as:
//!
//! ```text
//! +----------------+-----------+-----------------+
//! | Length (4B BE) | More (1B) | Payload         |
//! +----------------+-----------+-----------------+
//! ```
//!
//! The more flag chains frames into one multipart message: `1` means another
//! frame of the same message follows, `0` closes the message. A topic update
//! is the two-frame message `[filter][payload]`; control and service messages
//! use three or four frames.

use std::io::{self, Read, Write};

/// Frame header size: 4-byte length + 1-byte more flag.
pub const FRAME_HEADER_SIZE: usize = 5;

/// Maximum accepted frame payload (anti-OOM guard).
pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// Maximum frames accepted in one multipart message.
pub const MAX_FRAMES_PER_MESSAGE: usize = 8;

/// Write one frame.
pub fn write_frame<W: Write + ?Sized>(w: &mut W, payload: &[u8], more: bool) -> io::Result<()> {
    let len = payload.len() as u32;
    let mut header = [0u8; FRAME_HEADER_SIZE];
    header[..4].copy_from_slice(&len.to_be_bytes());
    header[4] = u8::from(more);
    w.write_all(&header)?;
    w.write_all(payload)
}

/// Write a complete multipart message: the more flag is set on every frame
/// but the last.
pub fn write_message<W: Write + ?Sized>(w: &mut W, frames: &[&[u8]]) -> io::Result<()> {
    for (i, frame) in frames.iter().enumerate() {
        write_frame(w, frame, i + 1 < frames.len())?;
    }
    w.flush()
}

/// Read one frame. Returns the payload and the more flag.
///
/// # Errors
///
/// `UnexpectedEof` when the peer closed mid-frame; `InvalidData` when the
/// announced length exceeds [`MAX_FRAME_SIZE`].
pub fn read_frame<R: Read + ?Sized>(r: &mut R) -> io::Result<(Vec<u8>, bool)> {
    let mut header = [0u8; FRAME_HEADER_SIZE];
    r.read_exact(&mut header)?;

    let len = u32::from_be_bytes([header[0], header[1], header[2], header[3]]) as usize;
    if len > MAX_FRAME_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("frame of {} bytes exceeds limit", len),
        ));
    }
    let more = header[4] != 0;

    let mut payload = vec![0u8; len];
    r.read_exact(&mut payload)?;
    Ok((payload, more))
}

/// Read a complete multipart message.
///
/// # Errors
///
/// I/O errors from [`read_frame`], plus `InvalidData` when a message chains
/// more than [`MAX_FRAMES_PER_MESSAGE`] frames.
pub fn read_message<R: Read + ?Sized>(r: &mut R) -> io::Result<Vec<Vec<u8>>> {
    let mut frames = Vec::with_capacity(2);
    loop {
        let (payload, more) = read_frame(r)?;
        frames.push(payload);
        if !more {
            return Ok(frames);
        }
        if frames.len() >= MAX_FRAMES_PER_MESSAGE {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                "multipart message has too many frames",
            ));
        }
    }
}
