//! Buffered reads for incremental parsers.

use std::io;

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};

#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("short read: needed {needed} bytes, stream ended after {got}")]
    ShortRead { needed: usize, got: usize },
    #[error("io: {0}")]
    Io(#[from] io::Error),
}

/// Pull chunks from `reader` into `buf` until it holds at least `n` bytes.
///
/// Whatever arrives beyond `n` stays in `buf`; the caller owns slicing.
/// End-of-stream before `n` bytes fails with `ShortRead`, which is the
/// parser-facing `short_read` condition for truncated headers.
pub async fn read_at_least<R>(
    reader: &mut R,
    buf: &mut BytesMut,
    n: usize,
) -> Result<(), ReadError>
where
    R: AsyncRead + Unpin + ?Sized,
{
    while buf.len() < n {
        if reader.read_buf(buf).await? == 0 {
            return Err(ReadError::ShortRead {
                needed: n,
                got: buf.len(),
            });
        }
    }
    Ok(())
}
