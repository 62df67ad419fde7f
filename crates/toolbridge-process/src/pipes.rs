//! Child stdio plumbing
//!
//! Every child output stream is drained by a pump task for the whole process
//! lifetime. The pump tees bytes into the [`OutputCapture`] (when enabled) and,
//! for stdout in pipe mode, forwards them to the adapter's [`OutputReader`].
//! The forward channel is unbounded so a slow or absent adapter never stalls
//! the child or the watcher.

use std::io;
use std::pin::Pin;
use std::task::{ready, Context, Poll};

use tokio::io::{AsyncBufRead, AsyncRead, AsyncReadExt, ReadBuf};
use tokio::process::ChildStdin;
use tokio::sync::mpsc;
use tracing::debug;

use crate::capture::OutputCapture;

const READ_CHUNK_SIZE: usize = 8192;

/// Live handles handed to the pipe-mode adapter
#[derive(Debug)]
pub struct ProcessPipes {
    /// Commands in
    pub stdin: ChildStdin,
    /// Responses out
    pub stdout: OutputReader,
}

/// Tool stdout as seen by the adapter.
///
/// Reaches end of stream once the child closed its stdout and every
/// forwarded byte has been read.
#[derive(Debug)]
pub struct OutputReader {
    chunks: mpsc::UnboundedReceiver<Vec<u8>>,
    current: Vec<u8>,
    pos: usize,
}

impl OutputReader {
    pub(crate) fn channel() -> (mpsc::UnboundedSender<Vec<u8>>, Self) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            tx,
            Self {
                chunks: rx,
                current: Vec::new(),
                pos: 0,
            },
        )
    }

    fn poll_chunk(&mut self, cx: &mut Context<'_>) -> Poll<bool> {
        while self.pos >= self.current.len() {
            match ready!(self.chunks.poll_recv(cx)) {
                Some(chunk) => {
                    self.current = chunk;
                    self.pos = 0;
                }
                None => return Poll::Ready(false),
            }
        }
        Poll::Ready(true)
    }
}

impl AsyncRead for OutputReader {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        if !ready!(this.poll_chunk(cx)) {
            return Poll::Ready(Ok(()));
        }

        let available = &this.current[this.pos..];
        let n = available.len().min(buf.remaining());
        buf.put_slice(&available[..n]);
        this.pos += n;
        Poll::Ready(Ok(()))
    }
}

impl AsyncBufRead for OutputReader {
    fn poll_fill_buf(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<&[u8]>> {
        let this = self.get_mut();
        if !ready!(this.poll_chunk(cx)) {
            return Poll::Ready(Ok(&[]));
        }
        Poll::Ready(Ok(&this.current[this.pos..]))
    }

    fn consume(self: Pin<&mut Self>, amt: usize) {
        let this = self.get_mut();
        this.pos = (this.pos + amt).min(this.current.len());
    }
}

/// Drain `source` until end of stream.
pub(crate) async fn pump<R>(
    mut source: R,
    capture: Option<OutputCapture>,
    mut forward: Option<mpsc::UnboundedSender<Vec<u8>>>,
) where
    R: AsyncRead + Unpin,
{
    let mut chunk = vec![0u8; READ_CHUNK_SIZE];
    loop {
        let n = match source.read(&mut chunk).await {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(error = %e, "Output pump read failed");
                break;
            }
        };

        if let Some(capture) = &capture {
            capture.write(&chunk[..n]);
        }

        // The adapter may drop its reader early; keep draining for the capture.
        if let Some(tx) = &forward {
            if tx.send(chunk[..n].to_vec()).is_err() {
                forward = None;
            }
        }
    }
}
