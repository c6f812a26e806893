//! C9: I/O channel.
//!
//! `in`/`out` talk to a caller-supplied byte stream (stdin/stdout by
//! default), following the convention of a small trait wrapping
//! `Read`/`Write` for CLI-fronted emulators so the core stays embeddable
//! and testable without a real terminal.

use std::io::{self, Read, Write};

/// A byte-granular, blocking I/O channel plus terminal cursor control
/// (§4.5 `seek`). A non-terminal channel (e.g. the in-memory test channel)
/// reports a fixed nominal terminal size so `seek` stays total (§9 open
/// question (b)).
pub trait IoChannel {
    fn read_byte(&mut self) -> io::Result<Option<u8>>;
    fn write_byte(&mut self, byte: u8) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;
    fn terminal_size(&self) -> (u64, u64);
    fn seek(&mut self, col: u64, row: u64);
}

/// Default channel: host stdin/stdout.
pub struct StdIoChannel {
    stdin: io::Stdin,
    stdout: io::Stdout,
}

impl StdIoChannel {
    pub fn new() -> Self {
        StdIoChannel {
            stdin: io::stdin(),
            stdout: io::stdout(),
        }
    }
}

impl Default for StdIoChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl IoChannel for StdIoChannel {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut buf = [0u8; 1];
        let mut lock = self.stdin.lock();
        match lock.read(&mut buf)? {
            0 => Ok(None),
            _ => Ok(Some(buf[0])),
        }
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        let mut lock = self.stdout.lock();
        lock.write_all(&[byte])
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stdout.lock().flush()
    }

    fn terminal_size(&self) -> (u64, u64) {
        // No portable terminal-size query without an extra dependency; a
        // generous nominal size keeps `seek` total without clamping real
        // small terminals incorrectly in the common case.
        (80, 24)
    }

    fn seek(&mut self, col: u64, row: u64) {
        let (cols, rows) = self.terminal_size();
        let col = col.min(cols.saturating_sub(1));
        let row = row.min(rows.saturating_sub(1));
        let _ = write!(self.stdout.lock(), "\x1b[{};{}H", row + 1, col + 1);
    }
}

/// In-memory channel for tests and embedding: reads from a fixed input
/// buffer, writes to a growable output buffer.
pub struct BufferChannel {
    input: std::collections::VecDeque<u8>,
    pub output: Vec<u8>,
    pub cursor: (u64, u64),
    term_size: (u64, u64),
}

impl BufferChannel {
    pub fn new(input: impl Into<Vec<u8>>) -> Self {
        BufferChannel {
            input: input.into().into(),
            output: Vec::new(),
            cursor: (0, 0),
            term_size: (80, 24),
        }
    }

    pub fn with_terminal_size(mut self, cols: u64, rows: u64) -> Self {
        self.term_size = (cols, rows);
        self
    }
}

impl IoChannel for BufferChannel {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        Ok(self.input.pop_front())
    }

    fn write_byte(&mut self, byte: u8) -> io::Result<()> {
        self.output.push(byte);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn terminal_size(&self) -> (u64, u64) {
        self.term_size
    }

    fn seek(&mut self, col: u64, row: u64) {
        let (cols, rows) = self.term_size;
        self.cursor = (col.min(cols.saturating_sub(1)), row.min(rows.saturating_sub(1)));
    }
}
