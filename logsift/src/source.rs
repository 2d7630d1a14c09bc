use crossbeam_channel::{bounded, select, Receiver, Sender};
use flate2::read::MultiGzDecoder;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::Path;
use std::thread;
use tracing::debug;

use crate::errors::{SiftError, SiftResult};
use crate::filter::Cancellation;

/// Read buffer per source
pub const DEFAULT_BUFFER_SIZE: usize = 64 * 1024;

/// Lines per batch handed to the chunked pipeline
pub const DEFAULT_CHUNK_SIZE: usize = 1000;

const LINE_CHANNEL_CAPACITY: usize = 1000;
const CHUNK_CHANNEL_CAPACITY: usize = 10;

/// Path that selects standard input
pub const STDIN_PATH: &str = "-";

/// Streams lines out of a file, a gzip file or standard input.
///
/// Every read runs on its own thread and feeds a bounded channel, so a slow
/// consumer throttles the reader. A second channel carries at most one error:
/// the failure that ended the read, or [`SiftError::Cancelled`].
#[derive(Debug, Clone, Copy)]
pub struct LineReader {
    buffer_size: usize,
}

impl LineReader {
    pub fn new() -> Self {
        Self::with_buffer_size(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_buffer_size(buffer_size: usize) -> Self {
        Self {
            buffer_size: buffer_size.max(1),
        }
    }

    /// Opens `path` for line reading; `-` is stdin and `.gz` files are decompressed
    pub fn open(&self, path: &Path) -> SiftResult<Box<dyn BufRead + Send>> {
        if path.as_os_str() == STDIN_PATH {
            return Ok(Box::new(BufReader::with_capacity(
                self.buffer_size,
                io::stdin(),
            )));
        }

        let file = File::open(path).map_err(|e| SiftError::from_open(path, e))?;
        if path.extension().is_some_and(|ext| ext == "gz") {
            debug!("Reading {} as gzip", path.display());
            Ok(Box::new(BufReader::with_capacity(
                self.buffer_size,
                MultiGzDecoder::new(file),
            )))
        } else {
            Ok(Box::new(BufReader::with_capacity(self.buffer_size, file)))
        }
    }

    pub fn read_lines(
        &self,
        cancel: &Cancellation,
        path: impl AsRef<Path>,
    ) -> (Receiver<String>, Receiver<SiftError>) {
        let (tx, rx) = bounded(LINE_CHANNEL_CAPACITY);
        let (err_tx, err_rx) = bounded(1);
        let reader = *self;
        let path = path.as_ref().to_path_buf();
        let cancel = cancel.clone();

        thread::spawn(move || {
            let result = reader.pump(&path, &cancel, |line| deliver(&cancel, &tx, line));
            report(&path, result, &err_tx);
        });

        (rx, err_rx)
    }

    /// Like [`read_lines`](Self::read_lines) but batched; the last chunk may be short
    pub fn read_chunks(
        &self,
        cancel: &Cancellation,
        path: impl AsRef<Path>,
        chunk_size: usize,
    ) -> (Receiver<Vec<String>>, Receiver<SiftError>) {
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        let (tx, rx) = bounded(CHUNK_CHANNEL_CAPACITY);
        let (err_tx, err_rx) = bounded(1);
        let reader = *self;
        let path = path.as_ref().to_path_buf();
        let cancel = cancel.clone();

        thread::spawn(move || {
            let mut chunk = Vec::with_capacity(chunk_size);
            let result = reader.pump(&path, &cancel, |line| {
                chunk.push(line);
                if chunk.len() < chunk_size {
                    return Ok(true);
                }
                let full = std::mem::replace(&mut chunk, Vec::with_capacity(chunk_size));
                deliver(&cancel, &tx, full)
            });
            let result = match result {
                Ok(true) if !chunk.is_empty() => deliver(&cancel, &tx, chunk),
                other => other,
            };
            report(&path, result, &err_tx);
        });

        (rx, err_rx)
    }

    /// Collects every line of a small source
    pub fn read_all(&self, path: impl AsRef<Path>) -> SiftResult<Vec<String>> {
        let mut input = self.open(path.as_ref())?;
        let mut lines = Vec::new();
        while let Some(line) = next_line(&mut input)? {
            lines.push(line);
        }
        Ok(lines)
    }

    /// Feeds every line of `path` to `sink` until it returns false.
    ///
    /// `Ok(false)` means the consumer went away and the read stopped early.
    fn pump<F>(&self, path: &Path, cancel: &Cancellation, mut sink: F) -> SiftResult<bool>
    where
        F: FnMut(String) -> SiftResult<bool>,
    {
        let mut input = self.open(path)?;
        while let Some(line) = next_line(&mut input)? {
            if cancel.is_cancelled() {
                return Err(SiftError::Cancelled);
            }
            if !sink(line)? {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

impl Default for LineReader {
    fn default() -> Self {
        Self::new()
    }
}

/// Next line without its terminator; invalid UTF-8 is replaced rather than rejected
fn next_line(input: &mut dyn BufRead) -> io::Result<Option<String>> {
    let mut buf = Vec::new();
    if input.read_until(b'\n', &mut buf)? == 0 {
        return Ok(None);
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    }
    Ok(Some(match String::from_utf8(buf) {
        Ok(line) => line,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }))
}

/// Blocking send that gives up on cancellation or a dropped receiver
fn deliver<T>(cancel: &Cancellation, tx: &Sender<T>, item: T) -> SiftResult<bool> {
    select! {
        recv(cancel.signal()) -> _ => Err(SiftError::Cancelled),
        send(tx, item) -> res => Ok(res.is_ok()),
    }
}

fn report(path: &Path, result: SiftResult<bool>, errors: &Sender<SiftError>) {
    match result {
        Ok(true) => debug!("Finished reading {}", path.display()),
        Ok(false) => debug!("Stopped reading {}: consumer closed", path.display()),
        Err(e) => {
            if !matches!(e, SiftError::Cancelled) {
                debug!("Failed reading {}: {}", path.display(), e);
            }
            let _ = errors.send(e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;
    use tempfile::tempdir;

    fn drain(
        (lines, errors): (Receiver<String>, Receiver<SiftError>),
    ) -> (Vec<String>, Option<SiftError>) {
        let collected: Vec<String> = lines.iter().collect();
        (collected, errors.recv().ok())
    }

    #[test]
    fn test_plain_and_gzip_yield_same_lines() {
        let dir = tempdir().unwrap();
        let content = "first\nsecond\r\n\nlast without newline";

        let plain = dir.path().join("app.log");
        std::fs::write(&plain, content).unwrap();

        let gz = dir.path().join("app.log.gz");
        let mut encoder = GzEncoder::new(File::create(&gz).unwrap(), Compression::default());
        encoder.write_all(content.as_bytes()).unwrap();
        encoder.finish().unwrap();

        let reader = LineReader::new();
        let cancel = Cancellation::new();
        let (plain_lines, plain_err) = drain(reader.read_lines(&cancel, &plain));
        let (gz_lines, gz_err) = drain(reader.read_lines(&cancel, &gz));

        assert!(plain_err.is_none());
        assert!(gz_err.is_none());
        assert_eq!(plain_lines, vec!["first", "second", "", "last without newline"]);
        assert_eq!(plain_lines, gz_lines);
    }

    #[test]
    fn test_multi_member_gzip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("rotated.gz");
        let mut file = File::create(&path).unwrap();
        for part in ["a\nb\n", "c\n"] {
            let mut encoder = GzEncoder::new(Vec::new(), Compression::fast());
            encoder.write_all(part.as_bytes()).unwrap();
            file.write_all(&encoder.finish().unwrap()).unwrap();
        }
        drop(file);

        let lines = LineReader::new().read_all(&path).unwrap();
        assert_eq!(lines, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_missing_file() {
        let reader = LineReader::new();
        let (lines, err) = drain(reader.read_lines(&Cancellation::new(), "/no/such/file.log"));
        assert!(lines.is_empty());
        assert!(matches!(err, Some(SiftError::FileNotFound(_))));

        assert!(matches!(
            reader.read_all("/no/such/file.log"),
            Err(SiftError::FileNotFound(_))
        ));
    }

    #[test]
    fn test_chunks() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        let content: String = (1..=25).map(|i| format!("line {}\n", i)).collect();
        std::fs::write(&path, content).unwrap();

        let (chunks, errors) = LineReader::new().read_chunks(&Cancellation::new(), &path, 10);
        let sizes: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![10, 10, 5]);
        assert!(errors.recv().is_err());
    }

    #[test]
    fn test_zero_chunk_size_uses_default() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("app.log");
        let content: String = (1..=1500).map(|i| format!("{}\n", i)).collect();
        std::fs::write(&path, content).unwrap();

        let (chunks, _) = LineReader::new().read_chunks(&Cancellation::new(), &path, 0);
        let sizes: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![DEFAULT_CHUNK_SIZE, 500]);
    }

    #[test]
    fn test_cancelled_read_reports_cancelled() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("big.log");
        let content: String = (0..10_000).map(|i| format!("{}\n", i)).collect();
        std::fs::write(&path, content).unwrap();

        let cancel = Cancellation::new();
        let (lines, errors) = LineReader::new().read_lines(&cancel, &path);
        assert!(lines.recv().is_ok());
        cancel.cancel();

        // The channel still drains what was buffered, then closes
        let rest = lines.iter().count();
        assert!(rest <= LINE_CHANNEL_CAPACITY + 1);
        assert!(matches!(errors.recv(), Ok(SiftError::Cancelled)));
    }

    #[test]
    fn test_invalid_utf8_is_replaced() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bin.log");
        std::fs::write(&path, b"ok\nbad \xff byte\n").unwrap();

        let lines = LineReader::new().read_all(&path).unwrap();
        assert_eq!(lines[0], "ok");
        assert!(lines[1].starts_with("bad "));
        assert!(lines[1].contains('\u{FFFD}'));
    }
}
