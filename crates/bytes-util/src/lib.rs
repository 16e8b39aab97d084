//! Tiny `bytes`/`io::Cursor` helpers shared by the codec crates.

use std::io::{self, Cursor};

use bytes::Bytes;

/// Extends [`Cursor<Bytes>`] with zero-copy slicing.
///
/// `Cursor::read_exact` would force a copy into a caller-provided buffer;
/// `extract_bytes` instead hands back a cheap [`Bytes`] slice that shares the
/// underlying allocation, which matters on the hot frame-demux path.
pub trait BytesCursorExt {
    /// Advance the cursor by `len` bytes, returning them as a `Bytes` slice.
    ///
    /// Fails with `UnexpectedEof` if fewer than `len` bytes remain.
    fn extract_bytes(&mut self, len: usize) -> io::Result<Bytes>;
}

impl BytesCursorExt for Cursor<Bytes> {
    fn extract_bytes(&mut self, len: usize) -> io::Result<Bytes> {
        let pos = self.position() as usize;
        let inner = self.get_ref();
        if pos + len > inner.len() {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("requested {len} bytes, only {} remain", inner.len() - pos),
            ));
        }
        let slice = inner.slice(pos..pos + len);
        self.set_position((pos + len) as u64);
        Ok(slice)
    }
}
