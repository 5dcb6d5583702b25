// Length-prefixed frames over any byte stream.
//
// Wire format: a 4-byte big-endian payload length, then the payload. The
// raw functions move bytes only; `send`/`recv` add the JSON encoding of a
// message on top.
//
// `MAX_FRAME_SIZE` caps what a reader will allocate for one frame. Mission
// control traffic is tiny, so 1 MB leaves plenty of room.

use std::io::{self, Read, Write};

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Largest payload a single frame may carry.
pub const MAX_FRAME_SIZE: u32 = 1024 * 1024;

fn too_large(kind: io::ErrorKind, len: usize) -> io::Error {
    io::Error::new(
        kind,
        format!("frame of {len} bytes exceeds limit of {MAX_FRAME_SIZE}"),
    )
}

/// Write one frame and flush.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let len = u32::try_from(payload.len())
        .ok()
        .filter(|len| *len <= MAX_FRAME_SIZE)
        .ok_or_else(|| too_large(io::ErrorKind::InvalidInput, payload.len()))?;
    writer.write_all(&len.to_be_bytes())?;
    writer.write_all(payload)?;
    writer.flush()
}

/// Read one frame. A stream that closes mid-frame yields `UnexpectedEof`;
/// an oversized length prefix yields `InvalidData` before allocating.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut prefix = [0u8; 4];
    reader.read_exact(&mut prefix)?;
    let len = u32::from_be_bytes(prefix);
    if len > MAX_FRAME_SIZE {
        return Err(too_large(io::ErrorKind::InvalidData, len as usize));
    }
    let mut payload = vec![0u8; len as usize];
    reader.read_exact(&mut payload)?;
    Ok(payload)
}

/// Encode `message` as JSON and write it as one frame.
pub fn send<W: Write, T: Serialize>(writer: &mut W, message: &T) -> io::Result<()> {
    let payload = serde_json::to_vec(message).map_err(io::Error::from)?;
    write_frame(writer, &payload)
}

/// Read one frame and decode it as JSON. Malformed JSON is `InvalidData`.
pub fn recv<R: Read, T: DeserializeOwned>(reader: &mut R) -> io::Result<T> {
    let payload = read_frame(reader)?;
    serde_json::from_slice(&payload).map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))
}
