//! Lazy line-oriented target feed.

use crate::Target;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::warn;

/// Yields the IPv4 targets of a line-oriented source, one at a time.
/// Lines that are not IPv4 literals, including lines that are not valid
/// UTF-8, are skipped without a trace.
pub struct TargetFeed<R> {
    reader: R,
    buf: Vec<u8>,
    lines_read: u64,
    yielded: u64,
    done: bool,
}

impl<R: AsyncBufRead + Unpin> TargetFeed<R> {
    pub fn new(reader: R) -> Self {
        TargetFeed { reader, buf: Vec::new(), lines_read: 0, yielded: 0, done: false }
    }

    /// Next valid target, or `None` once the source is exhausted or fails.
    pub async fn next(&mut self) -> Option<Target> {
        while !self.done {
            self.buf.clear();
            match self.reader.read_until(b'\n', &mut self.buf).await {
                Ok(0) => self.done = true,
                Ok(_) => {
                    self.lines_read += 1;
                    let parsed = std::str::from_utf8(&self.buf).ok().and_then(Target::parse);
                    if let Some(t) = parsed {
                        self.yielded += 1;
                        return Some(t);
                    }
                }
                Err(e) => {
                    warn!(line = self.lines_read + 1, error = %e, "stopped reading targets");
                    self.done = true;
                }
            }
        }
        None
    }

    pub fn lines_read(&self) -> u64 {
        self.lines_read
    }

    pub fn targets_yielded(&self) -> u64 {
        self.yielded
    }
}
