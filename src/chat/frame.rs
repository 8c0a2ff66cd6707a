//! Length-prefixed framing for the data stream.
//!
//! Each frame is a 4-byte big-endian length followed by exactly that many
//! payload bytes. A zero-length frame carries no payload and is used as a
//! presence marker.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::chat::codec::CodecError;

/// Size of the length prefix.
pub const LEN_PREFIX_SIZE: usize = 4;

/// Largest accepted payload (10 MiB).
pub const MAX_FRAME_LEN: usize = 10 * 1024 * 1024;

/// Prepends the length prefix to `payload`.
pub fn encode_frame(payload: &[u8]) -> Result<Vec<u8>, CodecError> {
    let len = checked_len(payload.len())?;
    let mut frame = Vec::with_capacity(LEN_PREFIX_SIZE + payload.len());
    frame.extend_from_slice(&len.to_be_bytes());
    frame.extend_from_slice(payload);
    Ok(frame)
}

/// Splits one frame off the front of `buf`, returning `(payload, rest)`.
pub fn decode_frame(buf: &[u8]) -> Result<(&[u8], &[u8]), CodecError> {
    if buf.len() < LEN_PREFIX_SIZE {
        return Err(CodecError::Truncated {
            expected: LEN_PREFIX_SIZE,
            got: buf.len(),
        });
    }

    let (prefix, body) = buf.split_at(LEN_PREFIX_SIZE);
    let len = declared_len(prefix)?;
    if body.len() < len {
        return Err(CodecError::Truncated {
            expected: len,
            got: body.len(),
        });
    }

    Ok(body.split_at(len))
}

/// Writes one frame and flushes.
pub async fn write_frame<W: AsyncWrite + Unpin>(
    writer: &mut W,
    payload: &[u8],
) -> Result<(), CodecError> {
    let len = checked_len(payload.len())?;
    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(payload).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one frame. Returns `None` if the stream ends cleanly between frames.
pub async fn read_frame<R: AsyncRead + Unpin>(
    reader: &mut R,
) -> Result<Option<Vec<u8>>, CodecError> {
    let mut prefix = [0u8; LEN_PREFIX_SIZE];
    let mut filled = 0;
    while filled < LEN_PREFIX_SIZE {
        let n = reader.read(&mut prefix[filled..]).await?;
        if n == 0 {
            if filled == 0 {
                return Ok(None);
            }
            return Err(CodecError::Truncated {
                expected: LEN_PREFIX_SIZE,
                got: filled,
            });
        }
        filled += n;
    }

    let len = declared_len(&prefix)?;
    let mut payload = vec![0u8; len];
    let mut read = 0;
    while read < len {
        let n = reader.read(&mut payload[read..]).await?;
        if n == 0 {
            return Err(CodecError::Truncated {
                expected: len,
                got: read,
            });
        }
        read += n;
    }
    Ok(Some(payload))
}

fn checked_len(len: usize) -> Result<u32, CodecError> {
    if len > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge(len));
    }
    Ok(len as u32)
}

fn declared_len(prefix: &[u8]) -> Result<usize, CodecError> {
    let mut bytes = [0u8; LEN_PREFIX_SIZE];
    bytes.copy_from_slice(&prefix[..LEN_PREFIX_SIZE]);
    let len = u32::from_be_bytes(bytes) as usize;
    if len > MAX_FRAME_LEN {
        return Err(CodecError::FrameTooLarge(len));
    }
    Ok(len)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prefix_is_big_endian() {
        let frame = encode_frame(b"abc").unwrap();
        assert_eq!(frame, [0, 0, 0, 3, b'a', b'b', b'c']);
    }

    #[test]
    fn test_empty_frame() {
        let frame = encode_frame(&[]).unwrap();
        assert_eq!(frame, [0, 0, 0, 0]);

        let (payload, rest) = decode_frame(&frame).unwrap();
        assert!(payload.is_empty());
        assert!(rest.is_empty());
    }

    #[test]
    fn test_decode_takes_exactly_declared_length() {
        let mut buf = encode_frame(b"first").unwrap();
        buf.extend(encode_frame(b"second").unwrap());

        let (payload, rest) = decode_frame(&buf).unwrap();
        assert_eq!(payload, b"first");
        let (payload, rest) = decode_frame(rest).unwrap();
        assert_eq!(payload, b"second");
        assert!(rest.is_empty());
    }

    #[test]
    fn test_truncated() {
        assert!(matches!(
            decode_frame(&[0, 0]),
            Err(CodecError::Truncated { expected: 4, got: 2 })
        ));
        assert!(matches!(
            decode_frame(&[0, 0, 0, 5, 1, 2]),
            Err(CodecError::Truncated { expected: 5, got: 2 })
        ));
    }

    #[test]
    fn test_oversized_length_rejected() {
        let prefix = ((MAX_FRAME_LEN + 1) as u32).to_be_bytes();
        assert!(matches!(
            decode_frame(&prefix),
            Err(CodecError::FrameTooLarge(_))
        ));
        assert!(matches!(
            encode_frame(&vec![0u8; MAX_FRAME_LEN + 1]),
            Err(CodecError::FrameTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn test_async_frames_over_pipe() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        write_frame(&mut client, &[]).await.unwrap();
        write_frame(&mut client, b"hello").await.unwrap();
        drop(client);

        assert_eq!(read_frame(&mut server).await.unwrap(), Some(Vec::new()));
        assert_eq!(
            read_frame(&mut server).await.unwrap(),
            Some(b"hello".to_vec())
        );
        assert_eq!(read_frame(&mut server).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_eof_mid_frame_is_truncated() {
        let (mut client, mut server) = tokio::io::duplex(64);
        client.write_all(&[0, 0, 0, 9, 1, 2, 3]).await.unwrap();
        drop(client);

        assert!(matches!(
            read_frame(&mut server).await,
            Err(CodecError::Truncated { expected: 9, got: 3 })
        ));
    }
}
