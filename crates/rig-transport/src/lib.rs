//! rig-transport: length-prefixed framing over a byte stream.
//!
//! Frame layout: a 4-byte unsigned little-endian length `L` followed by
//! exactly `L` bytes of opaque payload. `L = 0` is rejected; the maximum
//! payload is 1 MiB. Framing is symmetric: whatever `write_frame` emits,
//! `read_frame` accepts unchanged.

use std::io::{ErrorKind, Read, Write};

use thiserror::Error;

/// Maximum payload size: 1 MiB.
pub const MAX_FRAME_BYTES: u32 = 1024 * 1024;

pub type FrameResult<T> = Result<T, FrameError>;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("invalid frame length: 0")]
    ZeroLength,

    #[error("frame length {len} exceeds max {max}")]
    Oversize { len: u32, max: u32 },

    #[error("unexpected EOF while reading frame header")]
    TruncatedHeader,

    #[error("unexpected EOF while reading frame payload")]
    TruncatedPayload,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Read one frame.
///
/// Returns `Ok(None)` on a clean end-of-stream: zero bytes were available
/// before the header began. EOF after a partial header or payload is a
/// protocol failure, not a shutdown signal.
pub fn read_frame<R: Read>(reader: &mut R) -> FrameResult<Option<Vec<u8>>> {
    let mut header = [0u8; 4];

    // One-byte probe so clean EOF is distinguishable from a torn header.
    if read_one(reader, &mut header[..1])? == 0 {
        return Ok(None);
    }
    read_exact_or(reader, &mut header[1..], FrameError::TruncatedHeader)?;

    let len = u32::from_le_bytes(header);
    if len == 0 {
        return Err(FrameError::ZeroLength);
    }
    if len > MAX_FRAME_BYTES {
        return Err(FrameError::Oversize {
            len,
            max: MAX_FRAME_BYTES,
        });
    }

    let mut payload = vec![0u8; len as usize];
    read_exact_or(reader, &mut payload, FrameError::TruncatedPayload)?;
    Ok(Some(payload))
}

/// Write one frame and flush.
///
/// Partial writes due to signals are retried transparently; the call does not
/// return success until the payload is flushed.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> FrameResult<()> {
    if payload.is_empty() {
        return Err(FrameError::ZeroLength);
    }
    if payload.len() as u64 > MAX_FRAME_BYTES as u64 {
        return Err(FrameError::Oversize {
            len: payload.len().min(u32::MAX as usize) as u32,
            max: MAX_FRAME_BYTES,
        });
    }

    let header = (payload.len() as u32).to_le_bytes();
    writer.write_all(&header)?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Read up to one byte, retrying on `Interrupted`. Returns the byte count.
fn read_one<R: Read>(reader: &mut R, buf: &mut [u8]) -> FrameResult<usize> {
    loop {
        match reader.read(buf) {
            Ok(n) => return Ok(n),
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(err) => return Err(FrameError::Io(err)),
        }
    }
}

/// `read_exact` that reports a torn stream as the given frame error.
fn read_exact_or<R: Read>(reader: &mut R, buf: &mut [u8], on_eof: FrameError) -> FrameResult<()> {
    match reader.read_exact(buf) {
        Ok(()) => Ok(()),
        Err(err) if err.kind() == ErrorKind::UnexpectedEof => Err(on_eof),
        Err(err) => Err(FrameError::Io(err)),
    }
}
