// Copyright (C) 2025 Ryan Daum <ryan.daum@gmail.com> This program is free
// software: you can redistribute it and/or modify it under the terms of the GNU
// General Public License as published by the Free Software Foundation, version
// 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//

//! The terminal seam.
//!
//! The editor only ever talks to a [`Term`] for output and a [`TermReader`]
//! for input. The real crossterm-backed implementation lives in the
//! `ril-terminal` crate; tests use a capturing fake. Output calls queue
//! bytes; nothing reaches the device until [`Term::flush`], so a repaint is
//! a single write.

use async_trait::async_trait;
use std::io;

pub trait Term: Send + 'static {
    type Reader: TermReader;

    /// Hand out the input half. Called once by the interface loop.
    fn take_reader(&mut self) -> Self::Reader;

    fn raw_mode(&mut self, on: bool) -> io::Result<()>;
    fn width(&self) -> usize;
    fn height(&self) -> usize;

    /// Clear the row the cursor is on.
    fn clear_line(&mut self) -> io::Result<()>;
    fn cmove_up(&mut self, n: usize) -> io::Result<()>;
    fn cmove_down(&mut self, n: usize) -> io::Result<()>;
    /// Move to an absolute column, 0-based.
    fn cmove_col(&mut self, col: usize) -> io::Result<()>;
    fn cmove_left(&mut self, n: usize) -> io::Result<()>;

    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;
    fn flush(&mut self) -> io::Result<()>;

    fn enable_bracketed_paste(&mut self) -> io::Result<()>;
    fn disable_bracketed_paste(&mut self) -> io::Result<()>;
    fn hascolor(&self) -> bool;

    /// Ring the bell.
    fn beep(&mut self) -> io::Result<()> {
        self.write(b"\x07")
    }

    /// Raise OS job-control stop. Backends without job control no-op.
    fn suspend(&mut self) -> io::Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait TermReader: Send + 'static {
    /// The next decoded character from the keystroke stream, or `None` at
    /// end of input. This is the interface loop's only blocking point.
    async fn read_char(&mut self) -> io::Result<Option<char>>;
}

/// In-memory terminal for tests: scripted input, captured output, fixed
/// geometry.
#[cfg(test)]
pub use testing::TestTerm;
