//! Combined output capture

use std::io;
use std::sync::Arc;

use parking_lot::Mutex;

/// Append-only byte sink shared between output pumps and the watcher.
///
/// Clones share the same buffer. Growth is unbounded; enabling capture for a
/// chatty tool is the caller's trade-off.
#[derive(Debug, Clone, Default)]
pub struct OutputCapture {
    buffer: Arc<Mutex<Vec<u8>>>,
}

impl OutputCapture {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes
    pub fn write(&self, bytes: &[u8]) {
        self.buffer.lock().extend_from_slice(bytes);
    }

    /// Accumulated output as text (invalid UTF-8 is replaced)
    pub fn snapshot(&self) -> String {
        String::from_utf8_lossy(&self.buffer.lock()).into_owned()
    }

    pub fn len(&self) -> usize {
        self.buffer.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.lock().is_empty()
    }
}

impl io::Write for OutputCapture {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        OutputCapture::write(self, buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}
