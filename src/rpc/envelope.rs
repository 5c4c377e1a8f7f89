// ===========================================================================
// Streaming Envelopes
// ===========================================================================
//
// Every message in a streaming call is framed as:
//
//   +-------+----------------------+-----------------+
//   | flags | length (u32, BE)     | payload         |
//   +-------+----------------------+-----------------+
//     1 byte        4 bytes           length bytes

use std::io::{ErrorKind, Read};

use super::{Error, Result};

pub const FLAG_COMPRESSED: u8 = 0b0000_0001;
pub const FLAG_END_STREAM: u8 = 0b0000_0010;

const HEADER_LEN: usize = 5;

/// Upper bound on a single message; larger frames are treated as corrupt
pub const MAX_MESSAGE_SIZE: usize = 64 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub flags: u8,
    pub data: Vec<u8>,
}

impl Envelope {
    pub fn message(data: Vec<u8>) -> Self {
        Self { flags: 0, data }
    }

    #[cfg(test)]
    pub(crate) fn end_stream(data: Vec<u8>) -> Self {
        Self {
            flags: FLAG_END_STREAM,
            data,
        }
    }

    pub fn is_end_stream(&self) -> bool {
        self.flags & FLAG_END_STREAM != 0
    }

    pub fn is_compressed(&self) -> bool {
        self.flags & FLAG_COMPRESSED != 0
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(HEADER_LEN + self.data.len());
        out.push(self.flags);
        out.extend_from_slice(&(self.data.len() as u32).to_be_bytes());
        out.extend_from_slice(&self.data);
        out
    }
}

/// Read the next envelope. Returns `Ok(None)` on a clean end of input.
pub fn read_envelope<R: Read>(reader: &mut R) -> Result<Option<Envelope>> {
    let mut header = [0u8; HEADER_LEN];
    let mut filled = 0;
    while filled < HEADER_LEN {
        match reader.read(&mut header[filled..]) {
            Ok(0) if filled == 0 => return Ok(None),
            Ok(0) => return Err(Error::Protocol("truncated envelope header".into())),
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        }
    }

    let flags = header[0];
    let len = u32::from_be_bytes([header[1], header[2], header[3], header[4]]) as usize;
    if len > MAX_MESSAGE_SIZE {
        return Err(Error::Protocol(format!(
            "message of {len} bytes exceeds limit of {MAX_MESSAGE_SIZE}"
        )));
    }

    let mut data = vec![0u8; len];
    reader.read_exact(&mut data).map_err(|e| match e.kind() {
        ErrorKind::UnexpectedEof => Error::Protocol("truncated envelope payload".into()),
        _ => Error::Io(e),
    })?;

    Ok(Some(Envelope { flags, data }))
}
