use crate::util::{append_with_backoff, open_with_backoff};
use anyhow::{Context, Result};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Line reader for the record log. Lines are returned as raw bytes so a line torn
/// inside a multi-byte character reaches the caller instead of failing the read.
/// Blank lines come back empty so callers can skip them.
pub struct NdjsonReader {
    rdr: BufReader<File>,
}

impl NdjsonReader {
    pub fn open(path: &Path, buf_bytes: usize) -> io::Result<Self> {
        let f = open_with_backoff(path, 16, 50)?;
        Ok(Self { rdr: BufReader::with_capacity(buf_bytes.max(8 * 1024), f) })
    }

    /// Bytes consumed, 0 at EOF. The line terminator is stripped.
    pub fn read_line(&mut self, buf: &mut Vec<u8>) -> io::Result<usize> {
        buf.clear();
        let n = self.rdr.read_until(b'\n', buf)?;
        if n == 0 { return Ok(0); }
        if buf.ends_with(b"\n") {
            buf.pop();
            if buf.ends_with(b"\r") { buf.pop(); }
        }
        if buf.iter().all(u8::is_ascii_whitespace) { buf.clear(); }
        Ok(n)
    }
}

/// Append-only NDJSON writer. Each `commit()` flushes the buffer and syncs file data,
/// so everything written before a commit survives a crash.
pub struct NdjsonAppender {
    path: PathBuf,
    w: BufWriter<File>,
}

impl NdjsonAppender {
    pub fn open(path: &Path, buf_bytes: usize) -> io::Result<Self> {
        let needs_newline = ends_without_newline(path)?;
        let f = append_with_backoff(path, 16, 50)?;
        let mut w = BufWriter::with_capacity(buf_bytes.max(8 * 1024), f);
        // A crash mid-write leaves a torn last line; start ours on a fresh line.
        if needs_newline {
            w.write_all(b"\n")?;
        }
        Ok(Self { path: path.to_path_buf(), w })
    }

    #[inline]
    pub fn write_line(&mut self, s: &str) -> io::Result<()> {
        self.w.write_all(s.as_bytes())?;
        self.w.write_all(b"\n")
    }

    /// Flush buffered lines and make them durable.
    pub fn commit(&mut self) -> Result<()> {
        self.w.flush().with_context(|| format!("flush {}", self.path.display()))?;
        self.w.get_ref().sync_data().with_context(|| format!("sync {}", self.path.display()))
    }
}

fn ends_without_newline(path: &Path) -> io::Result<bool> {
    let mut f = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e),
    };
    let len = f.metadata()?.len();
    if len == 0 {
        return Ok(false);
    }
    f.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    f.read_exact(&mut last)?;
    Ok(last[0] != b'\n')
}
