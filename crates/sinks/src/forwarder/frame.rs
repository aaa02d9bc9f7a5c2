//! Forwarder wire format
//!
//! One request frame per batch, answered by a single ack byte:
//!
//! ```text
//! request:  [u32 BE item count] ( [u32 BE item length][item bytes] ) * count
//! response: [u8 ack]   0 = accepted, anything else = rejected
//! ```

use bytes::{Buf, BufMut, Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::ForwarderError;

/// Ack byte for an accepted batch
pub const ACK_OK: u8 = 0;

/// Ack byte for a batch the receiver refused
pub const ACK_REJECTED: u8 = 1;

/// Largest item count a frame may carry
pub const MAX_FRAME_ITEMS: usize = 1 << 20;

/// Largest single item (16MB)
pub const MAX_ITEM_LEN: usize = 16 * 1024 * 1024;

/// Items preallocated for a received frame; larger frames grow as they arrive
const PREALLOC_ITEMS: usize = 1024;

/// Encode a batch into one request frame
///
/// # Errors
///
/// Returns `ForwarderError::FrameTooLarge` if the batch has more than
/// [`MAX_FRAME_ITEMS`] items or an item exceeds [`MAX_ITEM_LEN`].
pub fn encode_batch<T: AsRef<[u8]>>(items: &[T]) -> Result<Bytes, ForwarderError> {
    if items.len() > MAX_FRAME_ITEMS {
        return Err(ForwarderError::FrameTooLarge(format!(
            "{} items, limit {}",
            items.len(),
            MAX_FRAME_ITEMS
        )));
    }

    let mut size = 4;
    for item in items {
        let len = item.as_ref().len();
        if len > MAX_ITEM_LEN {
            return Err(ForwarderError::FrameTooLarge(format!(
                "item of {len} bytes, limit {MAX_ITEM_LEN}"
            )));
        }
        size += 4 + len;
    }

    let mut frame = BytesMut::with_capacity(size);
    frame.put_u32(items.len() as u32);
    for item in items {
        let item = item.as_ref();
        frame.put_u32(item.len() as u32);
        frame.put_slice(item);
    }

    Ok(frame.freeze())
}

/// Decode a complete in-memory request frame
///
/// # Errors
///
/// Returns `ForwarderError::Protocol` for truncated or trailing data and
/// `ForwarderError::FrameTooLarge` when a limit is exceeded.
pub fn decode_batch(frame: &[u8]) -> Result<Vec<Bytes>, ForwarderError> {
    let mut buf = frame;
    let count = take_len(&mut buf, "item count")?;
    check_count(count)?;

    let mut items = Vec::with_capacity(count.min(PREALLOC_ITEMS));
    for _ in 0..count {
        let len = take_len(&mut buf, "item length")?;
        check_item_len(len)?;
        if buf.remaining() < len {
            return Err(ForwarderError::Protocol(format!(
                "truncated item: expected {len} bytes, have {}",
                buf.remaining()
            )));
        }
        items.push(Bytes::copy_from_slice(&buf[..len]));
        buf.advance(len);
    }

    if buf.has_remaining() {
        return Err(ForwarderError::Protocol(format!(
            "{} trailing bytes after frame",
            buf.remaining()
        )));
    }
    Ok(items)
}

/// Read one request frame from a stream
///
/// Returns `Ok(None)` if the peer closed the connection cleanly between
/// frames.
///
/// # Errors
///
/// Returns `ForwarderError::Io` for read failures (including EOF inside a
/// frame) and the limit errors of [`decode_batch`].
pub async fn read_batch<R>(reader: &mut R) -> Result<Option<Vec<Bytes>>, ForwarderError>
where
    R: AsyncRead + Unpin,
{
    let count = match reader.read_u32().await {
        Ok(count) => count as usize,
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    };
    check_count(count)?;

    let mut items = Vec::with_capacity(count.min(PREALLOC_ITEMS));
    for _ in 0..count {
        let len = reader.read_u32().await? as usize;
        check_item_len(len)?;

        let mut item = vec![0u8; len];
        reader.read_exact(&mut item).await?;
        items.push(Bytes::from(item));
    }

    Ok(Some(items))
}

/// Answer a request frame
///
/// # Errors
///
/// Returns `ForwarderError::Io` if the ack cannot be written.
pub async fn write_ack<W>(writer: &mut W, ack: u8) -> Result<(), ForwarderError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_u8(ack).await?;
    writer.flush().await?;
    Ok(())
}

fn take_len(buf: &mut &[u8], what: &str) -> Result<usize, ForwarderError> {
    if buf.remaining() < 4 {
        return Err(ForwarderError::Protocol(format!("truncated {what}")));
    }
    Ok(buf.get_u32() as usize)
}

fn check_count(count: usize) -> Result<(), ForwarderError> {
    if count > MAX_FRAME_ITEMS {
        return Err(ForwarderError::FrameTooLarge(format!(
            "{count} items, limit {MAX_FRAME_ITEMS}"
        )));
    }
    Ok(())
}

fn check_item_len(len: usize) -> Result<(), ForwarderError> {
    if len > MAX_ITEM_LEN {
        return Err(ForwarderError::FrameTooLarge(format!(
            "item of {len} bytes, limit {MAX_ITEM_LEN}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_layout() {
        let frame = encode_batch(&["ab", ""]).unwrap();
        assert_eq!(
            frame.as_ref(),
            &[0, 0, 0, 2, 0, 0, 0, 2, b'a', b'b', 0, 0, 0, 0][..]
        );
    }

    #[test]
    fn test_encode_empty_batch() {
        let frame = encode_batch::<&str>(&[]).unwrap();
        assert_eq!(frame.as_ref(), &[0, 0, 0, 0][..]);
        assert!(decode_batch(&frame).unwrap().is_empty());
    }

    #[test]
    fn test_decode_matches_encode() {
        let items = vec!["first line".to_string(), "second".to_string()];
        let decoded = decode_batch(&encode_batch(&items).unwrap()).unwrap();

        assert_eq!(decoded, vec![Bytes::from("first line"), Bytes::from("second")]);
    }

    #[test]
    fn test_decode_rejects_truncated_item() {
        let frame = [0, 0, 0, 1, 0, 0, 0, 5, b'a', b'b'];
        let err = decode_batch(&frame).unwrap_err();
        assert!(matches!(err, ForwarderError::Protocol(_)));
    }

    #[test]
    fn test_decode_rejects_trailing_bytes() {
        let frame = [0, 0, 0, 0, 9];
        assert!(matches!(
            decode_batch(&frame),
            Err(ForwarderError::Protocol(_))
        ));
    }

    #[test]
    fn test_decode_rejects_oversized_count() {
        let frame = (MAX_FRAME_ITEMS as u32 + 1).to_be_bytes();
        assert!(matches!(
            decode_batch(&frame),
            Err(ForwarderError::FrameTooLarge(_))
        ));
    }

    #[test]
    fn test_encode_rejects_oversized_item() {
        let item = vec![0u8; MAX_ITEM_LEN + 1];
        assert!(matches!(
            encode_batch(&[item]),
            Err(ForwarderError::FrameTooLarge(_))
        ));
    }

    #[tokio::test]
    async fn test_read_batch_from_stream() {
        let mut stream = Vec::new();
        stream.extend_from_slice(&encode_batch(&["x", "yz"]).unwrap());
        stream.extend_from_slice(&encode_batch(&["next"]).unwrap());
        let mut reader = stream.as_slice();

        let first = read_batch(&mut reader).await.unwrap().unwrap();
        assert_eq!(first, vec![Bytes::from("x"), Bytes::from("yz")]);

        let second = read_batch(&mut reader).await.unwrap().unwrap();
        assert_eq!(second, vec![Bytes::from("next")]);

        // Clean EOF between frames
        assert!(read_batch(&mut reader).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_read_batch_eof_inside_frame_is_error() {
        let frame = encode_batch(&["abcdef"]).unwrap();
        let mut reader = &frame[..frame.len() - 2];

        assert!(matches!(
            read_batch(&mut reader).await,
            Err(ForwarderError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_read_batch_count_larger_than_stream() {
        // Claims the maximum item count but carries a single item
        let mut stream = (MAX_FRAME_ITEMS as u32).to_be_bytes().to_vec();
        stream.extend_from_slice(&2u32.to_be_bytes());
        stream.extend_from_slice(b"ok");
        let mut reader = stream.as_slice();

        assert!(matches!(
            read_batch(&mut reader).await,
            Err(ForwarderError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_write_ack() {
        let mut out = Vec::new();
        write_ack(&mut out, ACK_REJECTED).await.unwrap();
        assert_eq!(out, vec![ACK_REJECTED]);
    }
}
