//! TLS application-data record framing
//!
//! Record format:
//! ```text
//! +--------+--------+--------+--------+--------+
//! |  0x17  |  0x03     0x03  |   Length (2B)   |
//! +--------+--------+--------+--------+--------+
//! |           Encoded frame (Length)           |
//! +--------+--------+--------+--------+--------+
//! ```

use super::{ObfuscationError, Obfuscator};
use crate::tunnel::Frame;
use bytes::{BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Record header size in bytes
pub const RECORD_HEADER_SIZE: usize = 5;

/// Largest record body TLS allows (2^14)
pub const MAX_RECORD_BODY: usize = 16384;

const APPLICATION_DATA: u8 = 0x17;
const TLS12_VERSION: u16 = 0x0303;

/// Disguises each frame as a TLS 1.2 application-data record
#[derive(Debug, Clone, Copy, Default)]
pub struct RecordObfuscator;

impl RecordObfuscator {
    /// Create a new record obfuscator
    pub fn new() -> Self {
        Self
    }
}

impl Obfuscator for RecordObfuscator {
    fn obfuscate(&self, frame: &Frame) -> Result<Bytes, ObfuscationError> {
        let body_len = frame.encoded_size();
        if body_len > MAX_RECORD_BODY {
            return Err(ObfuscationError::RecordTooLarge(body_len));
        }

        let mut buf = BytesMut::with_capacity(RECORD_HEADER_SIZE + body_len);
        buf.put_u8(APPLICATION_DATA);
        buf.put_u16(TLS12_VERSION);
        buf.put_u16(body_len as u16);
        buf.extend_from_slice(&frame.encode());
        Ok(buf.freeze())
    }

    fn deobfuscate(&self, record: &[u8]) -> Result<Frame, ObfuscationError> {
        let declared = parse_header(record)?;
        let actual = record.len() - RECORD_HEADER_SIZE;
        if declared != actual {
            return Err(ObfuscationError::LengthMismatch { declared, actual });
        }

        let body = Bytes::copy_from_slice(&record[RECORD_HEADER_SIZE..]);
        Frame::decode(body).map_err(|e| ObfuscationError::MalformedFrame(e.to_string()))
    }
}

/// Validate a record header and return the body length it declares
fn parse_header(header: &[u8]) -> Result<usize, ObfuscationError> {
    if header.len() < RECORD_HEADER_SIZE {
        return Err(ObfuscationError::Truncated(header.len()));
    }
    if header[0] != APPLICATION_DATA {
        return Err(ObfuscationError::UnexpectedContentType(header[0]));
    }
    let version = u16::from_be_bytes([header[1], header[2]]);
    if version != TLS12_VERSION {
        return Err(ObfuscationError::UnsupportedVersion(version));
    }
    let len = u16::from_be_bytes([header[3], header[4]]) as usize;
    if len > MAX_RECORD_BODY {
        return Err(ObfuscationError::RecordTooLarge(len));
    }
    Ok(len)
}

/// Read one complete record (header included) from `reader`.
///
/// Returns `Ok(None)` when the reader is at EOF on a record boundary.
pub async fn read_record<R>(reader: &mut R) -> Result<Option<BytesMut>, crate::tunnel::TunnelError>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; RECORD_HEADER_SIZE];
    let mut filled = 0;
    while filled < RECORD_HEADER_SIZE {
        let n = reader.read(&mut header[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(ObfuscationError::Truncated(filled).into());
        }
        filled += n;
    }

    let body_len = parse_header(&header)?;
    let mut record = BytesMut::with_capacity(RECORD_HEADER_SIZE + body_len);
    record.extend_from_slice(&header);
    record.resize(RECORD_HEADER_SIZE + body_len, 0);
    reader.read_exact(&mut record[RECORD_HEADER_SIZE..]).await?;

    Ok(Some(record))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_frame() -> Frame {
        Frame::data(5, 9, Bytes::from_static(b"record body"))
    }

    #[test]
    fn test_record_header_looks_like_tls() {
        let record = RecordObfuscator::new().obfuscate(&sample_frame()).unwrap();

        assert_eq!(&record[..3], &[0x17, 0x03, 0x03]);
        let len = u16::from_be_bytes([record[3], record[4]]) as usize;
        assert_eq!(len, record.len() - RECORD_HEADER_SIZE);
    }

    #[test]
    fn test_deobfuscate_recovers_frame() {
        let obfs = RecordObfuscator::new();
        let record = obfs.obfuscate(&sample_frame()).unwrap();
        assert_eq!(obfs.deobfuscate(&record).unwrap(), sample_frame());
    }

    #[test]
    fn test_rejects_wrong_content_type() {
        let obfs = RecordObfuscator::new();
        let mut record = obfs.obfuscate(&sample_frame()).unwrap().to_vec();
        record[0] = 0x16;
        assert!(matches!(
            obfs.deobfuscate(&record),
            Err(ObfuscationError::UnexpectedContentType(0x16))
        ));
    }

    #[test]
    fn test_rejects_wrong_version() {
        let obfs = RecordObfuscator::new();
        let mut record = obfs.obfuscate(&sample_frame()).unwrap().to_vec();
        record[2] = 0x01;
        assert!(matches!(
            obfs.deobfuscate(&record),
            Err(ObfuscationError::UnsupportedVersion(0x0301))
        ));
    }

    #[test]
    fn test_rejects_length_mismatch() {
        let obfs = RecordObfuscator::new();
        let mut record = obfs.obfuscate(&sample_frame()).unwrap().to_vec();
        record.push(0);
        assert!(matches!(
            obfs.deobfuscate(&record),
            Err(ObfuscationError::LengthMismatch { .. })
        ));
    }

    #[test]
    fn test_rejects_oversized_frame() {
        let frame = Frame::data(1, 0, Bytes::from(vec![0u8; MAX_RECORD_BODY]));
        assert!(matches!(
            RecordObfuscator::new().obfuscate(&frame),
            Err(ObfuscationError::RecordTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn test_read_record_splits_stream() {
        let obfs = RecordObfuscator::new();
        let mut wire = Vec::new();
        wire.extend_from_slice(&obfs.obfuscate(&sample_frame()).unwrap());
        wire.extend_from_slice(
            &obfs
                .obfuscate(&Frame::closing(5, 10, Bytes::from_static(b"pad")))
                .unwrap(),
        );

        let mut reader = &wire[..];
        let first = read_record(&mut reader).await.unwrap().unwrap();
        let second = read_record(&mut reader).await.unwrap().unwrap();
        assert!(read_record(&mut reader).await.unwrap().is_none());

        assert_eq!(obfs.deobfuscate(&first).unwrap(), sample_frame());
        assert!(obfs.deobfuscate(&second).unwrap().closing);
    }

    #[tokio::test]
    async fn test_read_record_truncated_header() {
        let mut reader = &[0x17u8, 0x03][..];
        assert!(read_record(&mut reader).await.is_err());
    }
}
