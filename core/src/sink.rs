//! Append-only result file, written from a single thread.

use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::net::Ipv4Addr;
use std::path::Path;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::warn;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SinkStats {
    pub written: u64,
    pub failed: u64,
}

/// Serializes result lines from any number of workers into one destination.
///
/// Workers hold a [`Recorder`] and never touch the destination themselves; a
/// dedicated writer thread appends and flushes one whole line per record.
pub struct ResultSink {
    tx: mpsc::UnboundedSender<Ipv4Addr>,
    writer: JoinHandle<SinkStats>,
}

impl ResultSink {
    /// Open `path` for appending, creating it if it does not exist.
    pub fn open_append(path: &Path) -> io::Result<ResultSink> {
        let mut opts = OpenOptions::new();
        opts.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            opts.mode(0o644);
        }
        Ok(ResultSink::new(opts.open(path)?))
    }

    pub fn new<W: Write + Send + 'static>(dest: W) -> ResultSink {
        let (tx, mut rx) = mpsc::unbounded_channel::<Ipv4Addr>();
        let writer = std::thread::spawn(move || {
            let mut w = BufWriter::new(dest);
            let mut stats = SinkStats::default();
            while let Some(ip) = rx.blocking_recv() {
                match writeln!(w, "{}", ip).and_then(|_| w.flush()) {
                    Ok(()) => stats.written += 1,
                    Err(e) => {
                        warn!(%ip, error = %e, "failed to append result");
                        stats.failed += 1;
                    }
                }
            }
            stats
        });
        ResultSink { tx, writer }
    }

    pub fn recorder(&self) -> Recorder {
        Recorder { tx: self.tx.clone() }
    }

    /// Close the sink and wait for pending lines. Blocks until every
    /// [`Recorder`] has been dropped.
    pub fn finish(self) -> SinkStats {
        let ResultSink { tx, writer } = self;
        drop(tx);
        writer.join().unwrap_or_default()
    }
}

/// Cheap handle workers use to report a reachable address.
#[derive(Clone)]
pub struct Recorder {
    tx: mpsc::UnboundedSender<Ipv4Addr>,
}

impl Recorder {
    pub fn record(&self, ip: Ipv4Addr) {
        if self.tx.send(ip).is_err() {
            warn!(%ip, "result sink already closed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::fs;

    #[test]
    fn appends_one_line_per_record() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let sink = ResultSink::open_append(&path).unwrap();
        let rec = sink.recorder();
        rec.record(Ipv4Addr::new(10, 0, 0, 2));
        rec.record(Ipv4Addr::new(192, 0, 2, 33));
        drop(rec);
        let stats = sink.finish();
        assert_eq!(stats, SinkStats { written: 2, failed: 0 });
        assert_eq!(fs::read_to_string(&path).unwrap(), "10.0.0.2\n192.0.2.33\n");
    }

    #[test]
    fn keeps_previous_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        fs::write(&path, "198.51.100.1\n").unwrap();
        let sink = ResultSink::open_append(&path).unwrap();
        sink.recorder().record(Ipv4Addr::new(198, 51, 100, 1));
        sink.finish();
        assert_eq!(fs::read_to_string(&path).unwrap(), "198.51.100.1\n198.51.100.1\n");
    }

    #[test]
    fn concurrent_records_never_interleave() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.txt");
        let sink = ResultSink::open_append(&path).unwrap();
        let threads: Vec<_> = (0..8u8)
            .map(|t| {
                let rec = sink.recorder();
                std::thread::spawn(move || {
                    for i in 0..100u8 {
                        rec.record(Ipv4Addr::new(10, t, i, 1));
                    }
                })
            })
            .collect();
        for t in threads {
            t.join().unwrap();
        }
        assert_eq!(sink.finish().written, 800);
        let text = fs::read_to_string(&path).unwrap();
        let lines: HashSet<Ipv4Addr> = text.lines().map(|l| l.parse().unwrap()).collect();
        assert_eq!(lines.len(), 800);
    }

    struct Broken;

    impl Write for Broken {
        fn write(&mut self, _buf: &[u8]) -> io::Result<usize> {
            Err(io::Error::other("disk full"))
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn write_errors_do_not_stop_the_sink() {
        let sink = ResultSink::new(Broken);
        let rec = sink.recorder();
        rec.record(Ipv4Addr::new(10, 0, 0, 1));
        rec.record(Ipv4Addr::new(10, 0, 0, 2));
        drop(rec);
        assert_eq!(sink.finish(), SinkStats { written: 0, failed: 2 });
    }
}
