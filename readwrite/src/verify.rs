//! Integrity checks for downloaded objects.
//!
//! Every object written by the harness carries its own checksum: the last
//! [`DIGEST_LEN`] bytes are the MD5 digest of everything before them. Objects
//! shorter than a digest consist of a prefix of the digest of the empty body.
//! The [`FileVerifier`] is a byte sink that reconstructs the digest while the
//! object is streamed into it, so it never needs to buffer the full payload.

use std::pin::Pin;
use std::{fmt, io, task};

use tokio::io::AsyncWrite;

/// Length of the checksum trailer embedded at the end of every object.
pub const DIGEST_LEN: usize = 16;

/// A sink that checks streamed content against its embedded checksum.
///
/// Write the downloaded object into the verifier, then query [`valid`](Self::valid).
#[derive(Clone)]
pub struct FileVerifier {
    hash: md5::Context,
    /// The most recent bytes, which may still turn out to be the trailer.
    tail: Vec<u8>,
    len: u64,
}

impl FileVerifier {
    /// Creates an empty verifier.
    pub fn new() -> Self {
        Self {
            hash: md5::Context::new(),
            tail: Vec::with_capacity(2 * DIGEST_LEN),
            len: 0,
        }
    }

    /// Feeds the next chunk of the object.
    pub fn update(&mut self, data: &[u8]) {
        self.len += data.len() as u64;
        self.tail.extend_from_slice(data);

        if self.tail.len() > DIGEST_LEN {
            let split = self.tail.len() - DIGEST_LEN;
            self.hash.consume(&self.tail[..split]);
            self.tail.drain(..split);
        }
    }

    /// The number of bytes written so far.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Returns `true` if nothing has been written yet.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Returns `true` if the streamed content matches its embedded checksum.
    pub fn valid(&self) -> bool {
        let digest = self.hash.clone().compute().0;
        if self.tail.len() < DIGEST_LEN {
            digest.starts_with(&self.tail)
        } else {
            self.tail[..] == digest[..]
        }
    }
}

impl Default for FileVerifier {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FileVerifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileVerifier")
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

impl AsyncWrite for FileVerifier {
    fn poll_write(
        mut self: Pin<&mut Self>,
        _cx: &mut task::Context<'_>,
        buf: &[u8],
    ) -> task::Poll<io::Result<usize>> {
        self.update(buf);
        task::Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut task::Context<'_>) -> task::Poll<io::Result<()>> {
        task::Poll::Ready(Ok(()))
    }

    fn poll_shutdown(
        self: Pin<&mut Self>,
        _cx: &mut task::Context<'_>,
    ) -> task::Poll<io::Result<()>> {
        task::Poll::Ready(Ok(()))
    }
}
