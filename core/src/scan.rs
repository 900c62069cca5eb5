//! Byte-stream pattern scanner
//!
//! This module locates occurrences of a marker pattern in a file of
//! unbounded size using bounded memory. The file is read in fixed-size
//! sequential chunks; a carry-over window of `pattern.len() - 1` bytes is
//! kept between chunks so a match spanning a chunk boundary is still found.
//!
//! The scanner is used two ways: an unanchored search for the next
//! statement-opening marker, and an anchored, accumulating search for the
//! nearest statement terminator that carves out exactly one insert block.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::Result;

/// Default read chunk size (64 KiB)
pub const DEFAULT_CHUNK_SIZE: usize = 64 * 1024;

/// Options for a single scan
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Absolute byte offset at which the scan begins
    pub start: u64,

    /// Whether to retain and return all bytes between `start` and the match
    pub accumulate: bool,
}

/// Result of a single scan
#[derive(Debug, Clone)]
pub struct ScanResult {
    /// Absolute byte offset of the first match at or after `start`,
    /// or `None` if the pattern does not occur before end-of-file.
    /// Not-found is a normal loop-termination condition, not an error.
    pub position: Option<u64>,

    /// The exact byte span `[start, position)` when accumulation was
    /// requested and a match was found
    pub bytes: Option<Vec<u8>>,
}

/// Chunked pattern scanner over a file
#[derive(Debug, Clone)]
pub struct Scanner {
    /// Read chunk size in bytes
    chunk_size: usize,
}

impl Default for Scanner {
    fn default() -> Self {
        Scanner::new()
    }
}

impl Scanner {
    /// Create a scanner with the default chunk size
    pub fn new() -> Self {
        Scanner {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    /// Create a scanner with a specific chunk size
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        assert!(chunk_size > 0, "chunk size must be positive");
        Scanner { chunk_size }
    }

    /// Find the first occurrence of `pattern` in `path` at or after
    /// `options.start`.
    ///
    /// Holds at most one chunk plus a `pattern.len() - 1` byte carry-over
    /// window in memory, unless accumulation was requested, in which case
    /// the bytes up to the match are additionally retained (bounded by the
    /// size of one insert block in practice).
    pub fn find_first(
        &self,
        path: impl AsRef<Path>,
        pattern: &[u8],
        options: &ScanOptions,
    ) -> Result<ScanResult> {
        assert!(!pattern.is_empty(), "pattern must be non-empty");

        let mut file = File::open(path.as_ref())?;
        file.seek(SeekFrom::Start(options.start))?;

        let mut chunk = vec![0u8; self.chunk_size];
        let mut tail: Vec<u8> = Vec::new();
        let mut accumulated: Vec<u8> = Vec::new();
        // Bytes consumed before the current chunk, relative to `start`.
        let mut consumed: u64 = 0;

        loop {
            let read = read_full(&mut file, &mut chunk)?;
            if read == 0 {
                return Ok(ScanResult {
                    position: None,
                    bytes: None,
                });
            }
            let chunk = &chunk[..read];

            let mut examine = Vec::with_capacity(tail.len() + read);
            examine.extend_from_slice(&tail);
            examine.extend_from_slice(chunk);

            if let Some(loc) = find_subsequence(&examine, pattern) {
                let position = options.start + consumed - tail.len() as u64 + loc as u64;
                let bytes = if options.accumulate {
                    accumulated.extend_from_slice(chunk);
                    accumulated.truncate((position - options.start) as usize);
                    Some(accumulated)
                } else {
                    None
                };
                debug!(
                    "pattern of {} bytes found at offset {}",
                    pattern.len(),
                    position
                );
                return Ok(ScanResult {
                    position: Some(position),
                    bytes,
                });
            }

            if options.accumulate {
                accumulated.extend_from_slice(chunk);
            }
            consumed += read as u64;
            let keep = pattern.len().saturating_sub(1).min(examine.len());
            tail = examine[examine.len() - keep..].to_vec();
        }
    }

    /// Iterate the absolute positions of every occurrence of `pattern`,
    /// advancing one byte past each hit so overlapping occurrences are
    /// all visited.
    pub fn occurrences(
        &self,
        path: impl Into<PathBuf>,
        pattern: impl Into<Vec<u8>>,
    ) -> Occurrences<'_> {
        Occurrences {
            scanner: self,
            path: path.into(),
            pattern: pattern.into(),
            cursor: 0,
            done: false,
        }
    }

    /// Iterate the raw insert blocks for one table: each item is the byte
    /// span from an occurrence of `open_marker` up to (but excluding) the
    /// following `terminator`.
    pub fn blocks(
        &self,
        path: impl Into<PathBuf>,
        open_marker: impl Into<Vec<u8>>,
        terminator: impl Into<Vec<u8>>,
    ) -> Blocks<'_> {
        Blocks {
            scanner: self,
            path: path.into(),
            open_marker: open_marker.into(),
            terminator: terminator.into(),
            cursor: 0,
            done: false,
        }
    }
}

/// Read `position..position + length` from a file, clamped to end-of-file.
pub fn read_file_part(path: impl AsRef<Path>, position: u64, length: usize) -> Result<Vec<u8>> {
    let mut file = File::open(path.as_ref())?;
    file.seek(SeekFrom::Start(position))?;
    let mut buffer = vec![0u8; length];
    let read = read_full(&mut file, &mut buffer)?;
    buffer.truncate(read);
    Ok(buffer)
}

/// Iterator over every occurrence of a pattern in a file
///
/// The cursor is explicit state of the iterator, not shared mutable
/// state, so scans stay composable and testable in isolation.
#[derive(Debug)]
pub struct Occurrences<'a> {
    scanner: &'a Scanner,
    path: PathBuf,
    pattern: Vec<u8>,
    cursor: u64,
    done: bool,
}

impl Iterator for Occurrences<'_> {
    type Item = Result<u64>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let options = ScanOptions {
            start: self.cursor,
            accumulate: false,
        };
        match self.scanner.find_first(&self.path, &self.pattern, &options) {
            Ok(ScanResult {
                position: Some(position),
                ..
            }) => {
                self.cursor = position + 1;
                Some(Ok(position))
            }
            Ok(ScanResult { position: None, .. }) => {
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// One raw insert block carved out of a dump file
#[derive(Debug, Clone)]
pub struct RawBlock {
    /// Absolute offset of the block's first byte
    pub offset: u64,

    /// The block bytes, from the opening marker up to (excluding) the
    /// statement terminator
    pub bytes: Vec<u8>,
}

/// Lazy iterator over the insert blocks of one table
#[derive(Debug)]
pub struct Blocks<'a> {
    scanner: &'a Scanner,
    path: PathBuf,
    open_marker: Vec<u8>,
    terminator: Vec<u8>,
    cursor: u64,
    done: bool,
}

impl Iterator for Blocks<'_> {
    type Item = Result<RawBlock>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let unanchored = ScanOptions {
            start: self.cursor,
            accumulate: false,
        };
        let start = match self.scanner.find_first(&self.path, &self.open_marker, &unanchored) {
            Ok(ScanResult {
                position: Some(position),
                ..
            }) => position,
            Ok(ScanResult { position: None, .. }) => {
                self.done = true;
                return None;
            }
            Err(e) => {
                self.done = true;
                return Some(Err(e));
            }
        };

        let anchored = ScanOptions {
            start,
            accumulate: true,
        };
        match self.scanner.find_first(&self.path, &self.terminator, &anchored) {
            Ok(ScanResult {
                position: Some(end),
                bytes: Some(bytes),
            }) => {
                self.cursor = end + 1;
                Some(Ok(RawBlock {
                    offset: start,
                    bytes,
                }))
            }
            Ok(_) => {
                // Opening marker with no terminator before EOF: the trailing
                // statement is truncated. Stop rather than yield a partial block.
                warn!(
                    "unterminated statement at offset {} in {}; ignoring remainder",
                    start,
                    self.path.display()
                );
                self.done = true;
                None
            }
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}

/// Fill `buf` as far as possible, tolerating short reads.
fn read_full(file: &mut File, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        let n = file.read(&mut buf[filled..])?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    Ok(filled)
}

/// First offset of `needle` within `haystack`, if any.
fn find_subsequence(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.len() > haystack.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}
