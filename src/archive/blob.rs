// Record framing for bucket files: [len: u32 LE][version: u8][wincode payload].
// len covers version byte + payload. Version prefix allows the payload schema to evolve.

use std::io::{self, Read};

use crate::models::SnapshotRecord;

pub(super) const RECORD_VERSION: u8 = 1;

/// Upper bound on one framed record; anything larger is treated as corruption.
const MAX_RECORD_LEN: usize = 64 * 1024 * 1024;

pub(super) enum Frame {
    Record(Vec<u8>),
    /// Clean end of file on a record boundary.
    End,
    /// File ends inside a record (interrupted append).
    Truncated,
}

/// Serializes one record including its length prefix, ready for a single append.
pub(super) fn encode_record(record: &SnapshotRecord) -> io::Result<Vec<u8>> {
    let payload = wincode::serialize(record)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("wincode: {}", e)))?;
    let len = u32::try_from(payload.len() + 1)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "record too large"))?;
    let mut out = Vec::with_capacity(4 + 1 + payload.len());
    out.extend_from_slice(&len.to_le_bytes());
    out.push(RECORD_VERSION);
    out.extend_from_slice(&payload);
    Ok(out)
}

pub(super) fn read_frame<R: Read>(reader: &mut R) -> io::Result<Frame> {
    let mut len_bytes = [0u8; 4];
    match read_full(reader, &mut len_bytes)? {
        0 => return Ok(Frame::End),
        4 => {}
        _ => return Ok(Frame::Truncated),
    }
    let len = u32::from_le_bytes(len_bytes) as usize;
    if len == 0 || len > MAX_RECORD_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("bad record length {}", len),
        ));
    }
    let mut body = vec![0u8; len];
    if read_full(reader, &mut body)? < len {
        return Ok(Frame::Truncated);
    }
    Ok(Frame::Record(body))
}

/// Decodes a frame body produced by `encode_record`.
pub(super) fn decode_record(body: &[u8]) -> io::Result<SnapshotRecord> {
    match body.split_first() {
        Some((&RECORD_VERSION, payload)) => wincode::deserialize(payload).map_err(|e| {
            io::Error::new(
                io::ErrorKind::InvalidData,
                format!("wincode deserialize snapshot: {}", e),
            )
        }),
        Some((&version, _)) => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unknown record version {}", version),
        )),
        None => Err(io::Error::new(io::ErrorKind::InvalidData, "empty record")),
    }
}

/// Reads until `buf` is full or EOF; returns bytes read.
fn read_full<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
