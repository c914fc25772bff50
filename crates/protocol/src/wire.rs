//! Codec for the TCP transfer stream.
//!
//! # Wire format
//!
//! ```text
//! METADATA (sender -> receiver): [JSON object][0x0A]
//! PAYLOAD  (sender -> receiver): [size bytes of raw file data]
//! ```
//!
//! The metadata line is the only framing on the stream: everything after
//! the first `\n` is file content. Readers therefore must not over-read:
//! [`read_meta`] works on an `AsyncBufRead` so that any payload bytes
//! pulled in alongside the header stay in the reader's buffer for the
//! caller to drain into the destination.

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};

use crate::frames::TransferMeta;
use crate::{METADATA_LIMIT, ProtocolError};

/// Writes the metadata line and flushes it to the kernel.
///
/// The flush is part of the contract: a cancellation observed before it
/// returns must not have produced a parseable header on the peer.
pub async fn write_meta<W: AsyncWrite + Unpin>(
    writer: &mut W,
    meta: &TransferMeta,
) -> Result<(), ProtocolError> {
    let mut line = serde_json::to_vec(meta).map_err(|e| ProtocolError::BadHeader(e.to_string()))?;
    line.push(b'\n');
    writer.write_all(&line).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads the metadata line from the head of a transfer stream.
///
/// Consumes bytes up to and including the first `\n`. Fails with
/// [`ProtocolError::HeaderTooLong`] once [`METADATA_LIMIT`] bytes have
/// accumulated without a terminator, and [`ProtocolError::Truncated`] if
/// the stream ends first.
pub async fn read_meta<R: AsyncBufRead + Unpin>(
    reader: &mut R,
) -> Result<TransferMeta, ProtocolError> {
    let mut line: Vec<u8> = Vec::with_capacity(256);
    loop {
        let (used, done) = {
            let available = reader.fill_buf().await?;
            if available.is_empty() {
                return Err(ProtocolError::Truncated);
            }
            match available.iter().position(|&b| b == b'\n') {
                Some(pos) => {
                    line.extend_from_slice(&available[..pos]);
                    (pos + 1, true)
                }
                None => {
                    line.extend_from_slice(available);
                    (available.len(), false)
                }
            }
        };
        reader.consume(used);

        if line.len() > METADATA_LIMIT {
            return Err(ProtocolError::HeaderTooLong);
        }
        if done {
            break;
        }
    }

    serde_json::from_slice(&line).map_err(|e| ProtocolError::BadHeader(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, BufReader};

    fn meta(name: &str, size: u64) -> TransferMeta {
        TransferMeta {
            transfer_id: Some("t-1".into()),
            name: name.into(),
            size,
        }
    }

    #[tokio::test]
    async fn meta_roundtrip() {
        let mut buf = Vec::new();
        write_meta(&mut buf, &meta("photo.jpg", 12345)).await.unwrap();
        assert_eq!(*buf.last().unwrap(), b'\n');

        let mut reader = BufReader::new(&buf[..]);
        let parsed = read_meta(&mut reader).await.unwrap();
        assert_eq!(parsed, meta("photo.jpg", 12345));
    }

    #[tokio::test]
    async fn payload_after_newline_stays_buffered() {
        let mut buf = Vec::new();
        write_meta(&mut buf, &meta("a.bin", 5)).await.unwrap();
        buf.extend_from_slice(b"01234");

        let mut reader = BufReader::new(&buf[..]);
        read_meta(&mut reader).await.unwrap();

        let mut payload = Vec::new();
        reader.read_to_end(&mut payload).await.unwrap();
        assert_eq!(payload, b"01234");
    }

    #[tokio::test]
    async fn payload_resembling_header_is_not_consumed() {
        // A payload whose first bytes look like a second metadata line must
        // come through byte-identical.
        let evil = b"{\"name\":\"x\",\"size\":1}\ntrailing";
        let mut buf = Vec::new();
        write_meta(&mut buf, &meta("evil.bin", evil.len() as u64))
            .await
            .unwrap();
        buf.extend_from_slice(evil);

        let mut reader = BufReader::new(&buf[..]);
        let parsed = read_meta(&mut reader).await.unwrap();
        assert_eq!(parsed.name, "evil.bin");

        let mut payload = Vec::new();
        reader.read_to_end(&mut payload).await.unwrap();
        assert_eq!(payload, evil);
    }

    #[tokio::test]
    async fn header_too_long_rejected() {
        let big = vec![b'{'; METADATA_LIMIT + 1];
        let mut reader = BufReader::new(&big[..]);
        let err = read_meta(&mut reader).await.unwrap_err();
        assert!(matches!(err, ProtocolError::HeaderTooLong));
    }

    #[tokio::test]
    async fn missing_terminator_is_truncated() {
        let partial = br#"{"name":"a.bin","#;
        let mut reader = BufReader::new(&partial[..]);
        let err = read_meta(&mut reader).await.unwrap_err();
        assert!(matches!(err, ProtocolError::Truncated));
    }

    #[tokio::test]
    async fn malformed_json_rejected() {
        let bad = b"this is not json\n";
        let mut reader = BufReader::new(&bad[..]);
        let err = read_meta(&mut reader).await.unwrap_err();
        assert!(matches!(err, ProtocolError::BadHeader(_)));
    }

    #[tokio::test]
    async fn tiny_buffer_reader_accumulates() {
        let mut buf = Vec::new();
        write_meta(&mut buf, &meta("chunky.bin", 1)).await.unwrap();
        buf.push(b'Z');

        // A 4-byte buffer forces many fill_buf/consume rounds.
        let mut reader = BufReader::with_capacity(4, &buf[..]);
        let parsed = read_meta(&mut reader).await.unwrap();
        assert_eq!(parsed.name, "chunky.bin");

        let mut rest = Vec::new();
        reader.read_to_end(&mut rest).await.unwrap();
        assert_eq!(rest, b"Z");
    }
}
