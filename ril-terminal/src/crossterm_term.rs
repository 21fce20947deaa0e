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

//! The crossterm-backed terminal.
//!
//! Output commands queue into an internal buffer via `crossterm::queue!`
//! and reach the device in a single write on flush. Input bypasses the
//! crossterm event system: the editor's keymaps are tries over the raw
//! byte stream, so the reader pulls bytes from stdin and decodes UTF-8
//! incrementally.

use async_trait::async_trait;
use crossterm::cursor::{MoveLeft, MoveToColumn, MoveUp};
use crossterm::event::{DisableBracketedPaste, EnableBracketedPaste};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode, Clear, ClearType};
use crossterm::queue;
use ril_core::term::{Term, TermReader};
use std::collections::VecDeque;
use std::io::{self, Write};
use tokio::io::AsyncReadExt;

pub struct CrosstermTerm<W: Write + Send + 'static> {
    device: W,
    queued: Vec<u8>,
    reader: Option<StdinReader>,
    color: bool,
}

impl CrosstermTerm<io::Stdout> {
    /// The usual configuration: stdout for output, stdin for input.
    pub fn stdout() -> Self {
        CrosstermTerm::new(io::stdout())
    }
}

impl<W: Write + Send + 'static> CrosstermTerm<W> {
    pub fn new(device: W) -> Self {
        let color = std::env::var("TERM").map(|t| t != "dumb").unwrap_or(false);
        CrosstermTerm {
            device,
            queued: Vec::new(),
            reader: Some(StdinReader::new()),
            color,
        }
    }
}

impl<W: Write + Send + 'static> Term for CrosstermTerm<W> {
    type Reader = StdinReader;

    fn take_reader(&mut self) -> StdinReader {
        self.reader.take().expect("reader already taken")
    }

    fn raw_mode(&mut self, on: bool) -> io::Result<()> {
        if on {
            enable_raw_mode()?;
        } else {
            disable_raw_mode()?;
        }
        Ok(())
    }

    fn width(&self) -> usize {
        crossterm::terminal::size().map(|(w, _)| w as usize).unwrap_or(80)
    }

    fn height(&self) -> usize {
        crossterm::terminal::size().map(|(_, h)| h as usize).unwrap_or(24)
    }

    fn clear_line(&mut self) -> io::Result<()> {
        queue!(self.queued, Clear(ClearType::CurrentLine))
    }

    fn cmove_up(&mut self, n: usize) -> io::Result<()> {
        if n > 0 {
            queue!(self.queued, MoveUp(n as u16))?;
        }
        Ok(())
    }

    fn cmove_down(&mut self, n: usize) -> io::Result<()> {
        if n > 0 {
            // crossterm's MoveDown clamps at the screen edge, which is what
            // the renderer expects
            queue!(self.queued, crossterm::cursor::MoveDown(n as u16))?;
        }
        Ok(())
    }

    fn cmove_col(&mut self, col: usize) -> io::Result<()> {
        queue!(self.queued, MoveToColumn(col as u16))
    }

    fn cmove_left(&mut self, n: usize) -> io::Result<()> {
        if n > 0 {
            queue!(self.queued, MoveLeft(n as u16))?;
        }
        Ok(())
    }

    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.queued.extend_from_slice(bytes);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.device.write_all(&self.queued)?;
        self.queued.clear();
        self.device.flush()
    }

    fn enable_bracketed_paste(&mut self) -> io::Result<()> {
        queue!(self.queued, EnableBracketedPaste)
    }

    fn disable_bracketed_paste(&mut self) -> io::Result<()> {
        queue!(self.queued, DisableBracketedPaste)
    }

    fn hascolor(&self) -> bool {
        self.color
    }

    fn suspend(&mut self) -> io::Result<()> {
        #[cfg(unix)]
        unsafe {
            libc::raise(libc::SIGTSTP);
        }
        Ok(())
    }
}

/// Incremental UTF-8 decoder over raw stdin bytes. Malformed bytes decode
/// to U+FFFD rather than stalling the stream.
pub struct StdinReader {
    stdin: tokio::io::Stdin,
    buf: [u8; 1024],
    pending: VecDeque<u8>,
}

impl Default for StdinReader {
    fn default() -> Self {
        Self::new()
    }
}

impl StdinReader {
    pub fn new() -> Self {
        StdinReader {
            stdin: tokio::io::stdin(),
            buf: [0; 1024],
            pending: VecDeque::new(),
        }
    }

    fn decode_pending(&mut self) -> Option<char> {
        let first = *self.pending.front()?;
        let need = match first {
            0x00..=0x7f => 1,
            0xc0..=0xdf => 2,
            0xe0..=0xef => 3,
            0xf0..=0xf7 => 4,
            _ => {
                self.pending.pop_front();
                return Some(char::REPLACEMENT_CHARACTER);
            }
        };
        if self.pending.len() < need {
            return None;
        }
        let bytes: Vec<u8> = self.pending.iter().take(need).copied().collect();
        match std::str::from_utf8(&bytes) {
            Ok(s) => {
                for _ in 0..need {
                    self.pending.pop_front();
                }
                s.chars().next()
            }
            Err(_) => {
                self.pending.pop_front();
                Some(char::REPLACEMENT_CHARACTER)
            }
        }
    }
}

#[async_trait]
impl TermReader for StdinReader {
    async fn read_char(&mut self) -> io::Result<Option<char>> {
        loop {
            if let Some(c) = self.decode_pending() {
                return Ok(Some(c));
            }
            let n = self.stdin.read(&mut self.buf).await?;
            if n == 0 {
                return Ok(None);
            }
            self.pending.extend(&self.buf[..n]);
        }
    }
}
