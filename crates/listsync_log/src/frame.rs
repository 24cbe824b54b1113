//! Checksummed frames making up the log file.
//!
//! ```text
//! | magic (4) | version (2) | kind (1) | length (4) | payload | crc32 (4) |
//! ```
//!
//! The CRC covers header and payload. All integers are little-endian.

use crate::error::{LogError, LogResult};
use crate::record::{EventRow, Timestamp};
use listsync_storage::StorageBackend;

/// Magic bytes at the start of every frame.
pub const FRAME_MAGIC: [u8; 4] = *b"LSEV";

/// Current frame format version.
pub const FRAME_VERSION: u16 = 1;

/// magic (4) + version (2) + kind (1) + length (4)
pub const HEADER_SIZE: usize = 11;

/// Trailing checksum size.
pub const CRC_SIZE: usize = 4;

/// Frame kind byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum FrameKind {
    Insert = 1,
    Acknowledge = 2,
    Delete = 3,
}

impl FrameKind {
    fn from_byte(b: u8) -> Option<Self> {
        match b {
            1 => Some(Self::Insert),
            2 => Some(Self::Acknowledge),
            3 => Some(Self::Delete),
            _ => None,
        }
    }
}

/// One decoded frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A new record.
    Insert(EventRow),
    /// The record with this timestamp is now `Remote`.
    Acknowledge(Timestamp),
    /// These records are gone.
    Delete(Vec<Timestamp>),
}

impl Frame {
    fn kind(&self) -> FrameKind {
        match self {
            Frame::Insert(_) => FrameKind::Insert,
            Frame::Acknowledge(_) => FrameKind::Acknowledge,
            Frame::Delete(_) => FrameKind::Delete,
        }
    }

    fn encode_payload(&self) -> LogResult<Vec<u8>> {
        match self {
            Frame::Insert(row) => Ok(serde_json::to_vec(row)?),
            Frame::Acknowledge(ts) => Ok(ts.0.to_le_bytes().to_vec()),
            Frame::Delete(timestamps) => {
                let mut buf = Vec::with_capacity(timestamps.len() * 8);
                for ts in timestamps {
                    buf.extend_from_slice(&ts.0.to_le_bytes());
                }
                Ok(buf)
            }
        }
    }

    fn decode_payload(kind: FrameKind, payload: &[u8], offset: u64) -> LogResult<Self> {
        match kind {
            FrameKind::Insert => serde_json::from_slice(payload)
                .map(Frame::Insert)
                .map_err(|e| LogError::corrupted(offset, format!("unreadable row: {e}"))),
            FrameKind::Acknowledge => {
                let bytes: [u8; 8] = payload.try_into().map_err(|_| {
                    LogError::corrupted(
                        offset,
                        format!("acknowledge payload is {} bytes, expected 8", payload.len()),
                    )
                })?;
                Ok(Frame::Acknowledge(Timestamp(u64::from_le_bytes(bytes))))
            }
            FrameKind::Delete => {
                if payload.len() % 8 != 0 {
                    return Err(LogError::corrupted(
                        offset,
                        format!("delete payload of {} bytes has trailing data", payload.len()),
                    ));
                }
                let timestamps = payload
                    .chunks_exact(8)
                    .map(|chunk| {
                        let mut bytes = [0u8; 8];
                        bytes.copy_from_slice(chunk);
                        Timestamp(u64::from_le_bytes(bytes))
                    })
                    .collect();
                Ok(Frame::Delete(timestamps))
            }
        }
    }

    /// Encodes the frame with header and checksum.
    pub fn encode(&self) -> LogResult<Vec<u8>> {
        let payload = self.encode_payload()?;
        let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len() + CRC_SIZE);
        buf.extend_from_slice(&FRAME_MAGIC);
        buf.extend_from_slice(&FRAME_VERSION.to_le_bytes());
        buf.push(self.kind() as u8);
        buf.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        buf.extend_from_slice(&payload);
        let crc = compute_crc32(&buf);
        buf.extend_from_slice(&crc.to_le_bytes());
        Ok(buf)
    }
}

/// Result of reading at one offset.
#[derive(Debug)]
pub enum ReadOutcome {
    /// A valid frame and the offset just past it.
    Frame(Frame, u64),
    /// Clean end of log.
    End,
    /// The last frame was only partly written.
    Torn,
}

/// Reads the frame starting at `offset`.
///
/// An incomplete frame at the tail, or a checksum failure on the final
/// frame, is reported as [`ReadOutcome::Torn`]. Anything wrong earlier in
/// the log is corruption.
pub fn read_frame(backend: &dyn StorageBackend, offset: u64, size: u64) -> LogResult<ReadOutcome> {
    if offset == size {
        return Ok(ReadOutcome::End);
    }
    if offset + HEADER_SIZE as u64 > size {
        return Ok(ReadOutcome::Torn);
    }

    let header = backend.read_at(offset, HEADER_SIZE)?;
    if header[0..4] != FRAME_MAGIC {
        return Err(LogError::corrupted(offset, "bad frame magic"));
    }
    let version = u16::from_le_bytes([header[4], header[5]]);
    if version != FRAME_VERSION {
        return Err(LogError::corrupted(
            offset,
            format!("unsupported frame version {version}"),
        ));
    }
    let kind = FrameKind::from_byte(header[6])
        .ok_or_else(|| LogError::corrupted(offset, format!("unknown frame kind {}", header[6])))?;
    let len = u32::from_le_bytes([header[7], header[8], header[9], header[10]]) as usize;

    let end = offset + (HEADER_SIZE + len + CRC_SIZE) as u64;
    if end > size {
        return torn_or_corrupted(backend, offset, size, "frame length runs past end of log");
    }

    let rest = backend.read_at(offset + HEADER_SIZE as u64, len + CRC_SIZE)?;
    let (payload, crc_bytes) = rest.split_at(len);
    let stored_crc = u32::from_le_bytes([crc_bytes[0], crc_bytes[1], crc_bytes[2], crc_bytes[3]]);

    let mut covered = header;
    covered.extend_from_slice(payload);
    if compute_crc32(&covered) != stored_crc {
        if end == size {
            return torn_or_corrupted(backend, offset, size, "checksum mismatch");
        }
        return Err(LogError::corrupted(offset, "checksum mismatch"));
    }

    Ok(ReadOutcome::Frame(
        Frame::decode_payload(kind, payload, offset)?,
        end,
    ))
}

/// A damaged frame is only a torn tail if nothing that looks like a frame
/// header follows it. Otherwise its length field is wrong and the frames
/// after it would be lost by truncating.
fn torn_or_corrupted(
    backend: &dyn StorageBackend,
    offset: u64,
    size: u64,
    reason: &str,
) -> LogResult<ReadOutcome> {
    let from = offset + HEADER_SIZE as u64;
    let rest = backend.read_at(from, (size - from) as usize)?;
    let mut marker = FRAME_MAGIC.to_vec();
    marker.extend_from_slice(&FRAME_VERSION.to_le_bytes());

    match rest.windows(marker.len()).position(|w| w == marker.as_slice()) {
        Some(at) => Err(LogError::corrupted(
            offset,
            format!("{reason}; another frame starts at offset {}", from + at as u64),
        )),
        None => Ok(ReadOutcome::Torn),
    }
}

/// Computes a CRC32 (IEEE) checksum.
pub fn compute_crc32(data: &[u8]) -> u32 {
    const CRC32_TABLE: [u32; 256] = {
        let mut table = [0u32; 256];
        let mut i = 0;
        while i < 256 {
            let mut crc = i as u32;
            let mut j = 0;
            while j < 8 {
                if crc & 1 != 0 {
                    crc = (crc >> 1) ^ 0xEDB8_8320;
                } else {
                    crc >>= 1;
                }
                j += 1;
            }
            table[i] = crc;
            i += 1;
        }
        table
    };

    let mut crc = 0xFFFF_FFFF_u32;
    for &byte in data {
        crc = (crc >> 8) ^ CRC32_TABLE[((crc ^ u32::from(byte)) & 0xFF) as usize];
    }
    !crc
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Source;
    use listsync_storage::InMemoryBackend;

    fn row(ts: u64) -> EventRow {
        EventRow {
            action: "suggestions.update".into(),
            timestamp: Timestamp(ts),
            source: Source::Remote,
            json: r#"{"action":"suggestions.update"}"#.into(),
        }
    }

    fn backend_with(frames: &[Frame]) -> InMemoryBackend {
        let mut backend = InMemoryBackend::new();
        for frame in frames {
            backend.append(&frame.encode().unwrap()).unwrap();
        }
        backend
    }

    #[test]
    fn crc32_known_value() {
        assert_eq!(compute_crc32(b"123456789"), 0xCBF4_3926);
        assert_eq!(compute_crc32(b""), 0);
    }

    #[test]
    fn reads_frames_in_sequence() {
        let frames = vec![
            Frame::Insert(row(1)),
            Frame::Acknowledge(Timestamp(1)),
            Frame::Delete(vec![Timestamp(1), Timestamp(7)]),
        ];
        let backend = backend_with(&frames);
        let size = backend.size().unwrap();

        let mut offset = 0;
        let mut decoded = Vec::new();
        loop {
            match read_frame(&backend, offset, size).unwrap() {
                ReadOutcome::Frame(frame, next) => {
                    decoded.push(frame);
                    offset = next;
                }
                ReadOutcome::End => break,
                ReadOutcome::Torn => panic!("unexpected torn frame"),
            }
        }
        assert_eq!(decoded, frames);
    }

    #[test]
    fn partial_tail_is_torn() {
        let encoded = Frame::Insert(row(1)).encode().unwrap();
        for cut in [3, HEADER_SIZE, encoded.len() - 1] {
            let backend = InMemoryBackend::with_data(encoded[..cut].to_vec());
            let outcome = read_frame(&backend, 0, cut as u64).unwrap();
            assert!(matches!(outcome, ReadOutcome::Torn), "cut at {cut}");
        }
    }

    #[test]
    fn bad_checksum_on_last_frame_is_torn() {
        let mut data = Frame::Insert(row(1)).encode().unwrap();
        let at = HEADER_SIZE + 2;
        data[at] ^= 0xFF;
        let size = data.len() as u64;
        let backend = InMemoryBackend::with_data(data);
        assert!(matches!(
            read_frame(&backend, 0, size).unwrap(),
            ReadOutcome::Torn
        ));
    }

    #[test]
    fn bad_checksum_mid_log_is_corruption() {
        let mut data = Frame::Insert(row(1)).encode().unwrap();
        data[HEADER_SIZE + 2] ^= 0xFF;
        data.extend(Frame::Acknowledge(Timestamp(1)).encode().unwrap());
        let size = data.len() as u64;
        let backend = InMemoryBackend::with_data(data);

        let err = read_frame(&backend, 0, size).unwrap_err();
        assert!(matches!(err, LogError::Corrupted { offset: 0, .. }));
    }

    #[test]
    fn damaged_length_before_valid_frames_is_corruption() {
        let mut data = Frame::Insert(row(1)).encode().unwrap();
        data.extend(Frame::Insert(row(2)).encode().unwrap());
        data.extend(Frame::Acknowledge(Timestamp(2)).encode().unwrap());
        data[10] = 0x7f;
        let size = data.len() as u64;
        let backend = InMemoryBackend::with_data(data);

        assert!(matches!(
            read_frame(&backend, 0, size),
            Err(LogError::Corrupted { offset: 0, .. })
        ));
    }

    #[test]
    fn item_named_like_magic_still_reads_as_torn() {
        let mut tail = row(1);
        tail.json = r#"{"action":"item.add","listId":"g","item":{"id":"i","name":"LSEV"}}"#.into();
        let encoded = Frame::Insert(tail).encode().unwrap();
        let cut = encoded.len() - 2;
        let backend = InMemoryBackend::with_data(encoded[..cut].to_vec());

        assert!(matches!(
            read_frame(&backend, 0, cut as u64).unwrap(),
            ReadOutcome::Torn
        ));
    }

    #[test]
    fn bad_magic_is_corruption() {
        let mut data = Frame::Acknowledge(Timestamp(3)).encode().unwrap();
        data[0] = b'X';
        let size = data.len() as u64;
        let backend = InMemoryBackend::with_data(data);
        assert!(matches!(
            read_frame(&backend, 0, size),
            Err(LogError::Corrupted { .. })
        ));
    }
}
