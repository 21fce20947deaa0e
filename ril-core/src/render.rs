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

//! The multi-line prompt renderer.
//!
//! A repaint erases the previously painted area (bottom row upward, never
//! scrolling), rewrites the prompt and buffer with explicit wraps at the
//! terminal width, and tracks the on-screen row/column of the cursor while
//! writing. Region highlighting interpolates reverse-video escapes at byte
//! offsets; a pending hint is painted dim after the cursor. Everything is
//! queued and flushed as one write.

use crate::complete::Completion;
use crate::edit_buffer::EditBuffer;
use crate::term::Term;
use std::io;
use unicode_width::UnicodeWidthChar;

pub const REVERSE_ON: &[u8] = b"\x1b[7m";
pub const REVERSE_OFF: &[u8] = b"\x1b[27m";
const DIM_ON: &[u8] = b"\x1b[2m";
const DIM_OFF: &[u8] = b"\x1b[22m";

/// What the renderer knows about the previously painted area: how many
/// terminal rows it spans and which of them (1-based) holds the cursor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputAreaState {
    pub num_rows: usize,
    pub curs_row: usize,
}

impl Default for InputAreaState {
    fn default() -> Self {
        InputAreaState {
            num_rows: 0,
            curs_row: 1,
        }
    }
}

/// Display-only trailing text after the cursor. `Clear` is the one-shot
/// sentinel: emit a clear-to-end-of-line on the next paint, then fall back
/// to `Off`.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Hint {
    #[default]
    Off,
    Clear,
    Show(String),
}

/// Everything one repaint needs, borrowed from the active mode.
pub struct RenderPlan<'a> {
    pub prompt_prefix: &'a str,
    pub prompt: &'a str,
    pub prompt_suffix: &'a str,
    pub buf: &'a EditBuffer,
    pub region: Option<(usize, usize)>,
    pub hint: &'a Hint,
    pub tabwidth: usize,
    /// SGR color index flashed over the prompt by the beep animation.
    pub beep_color: Option<u8>,
}

/// Display width of a string, skipping CSI escape sequences.
pub fn str_width(s: &str) -> usize {
    let mut width = 0;
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\x1b' {
            if chars.peek() == Some(&'[') {
                chars.next();
                for c2 in chars.by_ref() {
                    if ('\x40'..='\x7e').contains(&c2) {
                        break;
                    }
                }
            }
            continue;
        }
        width += c.width().unwrap_or(0);
    }
    width
}

/// Erase the previously painted area: move down to its last row, clear each
/// row walking up, and land in column 0 of its first row. Only cursor
/// motion and line clears, never a scroll.
pub fn clear_input_area<T: Term>(term: &mut T, prior: InputAreaState) -> io::Result<()> {
    if prior.num_rows > 0 {
        term.cmove_down(prior.num_rows - prior.curs_row)?;
        for _ in 1..prior.num_rows {
            term.clear_line()?;
            term.cmove_up(1)?;
        }
        term.clear_line()?;
    }
    term.cmove_col(0)
}

struct Painter<'t, T: Term> {
    term: &'t mut T,
    cols: usize,
    row: usize,
    col: usize,
}

impl<'t, T: Term> Painter<'t, T> {
    fn newline(&mut self) -> io::Result<()> {
        self.term.write(b"\r\n")?;
        self.row += 1;
        self.col = 0;
        Ok(())
    }

    /// Write one cell-advancing unit, wrapping explicitly before overflow
    /// so the painter never depends on the terminal's deferred wrap.
    fn put(&mut self, bytes: &[u8], width: usize) -> io::Result<()> {
        if width > 0 && self.col + width > self.cols {
            self.newline()?;
        }
        self.term.write(bytes)?;
        self.col += width;
        Ok(())
    }

    fn put_char(&mut self, ch: char) -> io::Result<()> {
        let mut utf8 = [0u8; 4];
        let s = ch.encode_utf8(&mut utf8);
        let width = ch.width().unwrap_or(0);
        self.put(s.as_bytes(), width)
    }
}

/// Repaint the prompt and buffer, returning the new area state. The
/// terminal cursor ends at the buffer position's on-screen row/column.
pub fn refresh_multi_line<T: Term>(
    term: &mut T,
    prior: InputAreaState,
    plan: &RenderPlan<'_>,
) -> io::Result<InputAreaState> {
    clear_input_area(term, prior)?;

    let cols = term.width().max(1);
    let rows_budget = term.height().max(1);
    let single_row = rows_budget == 1;
    let hascolor = term.hascolor();

    term.write(plan.prompt_prefix.as_bytes())?;
    if let Some(color) = plan.beep_color.filter(|_| hascolor) {
        term.write(format!("\x1b[{}m", 30 + (color % 8)).as_bytes())?;
        term.write(plan.prompt.as_bytes())?;
        term.write(b"\x1b[39m")?;
    } else {
        term.write(plan.prompt.as_bytes())?;
    }
    term.write(plan.prompt_suffix.as_bytes())?;

    let prompt_width = str_width(plan.prompt);
    let mut p = Painter {
        term,
        cols,
        row: 1 + prompt_width / cols,
        col: prompt_width % cols,
    };

    let text = plan.buf.as_str();
    let position = plan.buf.position();
    let region = plan.region.filter(|(lo, hi)| lo < hi);
    let mut curs: Option<(usize, usize)> = None;
    let mut dropped_newline = false;
    let mut truncated = false;
    let mut region_open = false;

    for (idx, ch) in text.char_indices() {
        if let Some((lo, hi)) = region {
            if idx == hi && region_open {
                p.term.write(REVERSE_OFF)?;
                region_open = false;
            }
            if idx == lo {
                p.term.write(REVERSE_ON)?;
                region_open = true;
            }
        }
        if idx == position {
            curs = Some((p.row, p.col));
        }
        if let Some((crow, _)) = curs {
            // center under height pressure: lines before the cursor are all
            // emitted, display stops half a screen past it
            if !single_row && p.row > crow + rows_budget / 2 {
                truncated = true;
                break;
            }
        }
        match ch {
            '\n' => {
                // a one-row terminal drops the newline terminating the
                // cursor's own line
                if single_row && curs.is_some() && !dropped_newline {
                    dropped_newline = true;
                    continue;
                }
                if let Some((crow, _)) = curs {
                    if !single_row && p.row + 1 > crow + rows_budget / 2 {
                        truncated = true;
                        break;
                    }
                }
                p.newline()?;
            }
            '\t' => {
                let tabwidth = plan.tabwidth.max(1);
                let n = tabwidth - p.col % tabwidth;
                for _ in 0..n {
                    p.put(b" ", 1)?;
                }
            }
            ch => p.put_char(ch)?,
        }
    }
    // close the highlight even when the region ran to the end of the
    // buffer or the paint was truncated inside it
    if region_open {
        p.term.write(REVERSE_OFF)?;
    }
    let (mut curs_row, mut curs_col) = curs.unwrap_or((p.row, p.col));

    // a cursor exactly on the wrap boundary sits at the start of the next row
    if curs_col >= cols {
        curs_row += 1;
        curs_col = 0;
        if curs_row > p.row {
            p.newline()?;
        }
    }

    if let Hint::Show(hint) = plan.hint {
        if !truncated && !hint.is_empty() {
            p.term.write(DIM_ON)?;
            for ch in hint.chars() {
                p.put_char(ch)?;
            }
            p.term.write(DIM_OFF)?;
        }
    }

    let num_rows = p.row.max(curs_row);
    let up = p.row - curs_row;
    let term = p.term;
    term.cmove_up(up)?;
    term.cmove_col(curs_col)?;
    if matches!(plan.hint, Hint::Clear) {
        term.write(b"\x1b[0K")?;
    }
    term.flush()?;

    Ok(InputAreaState { num_rows, curs_row })
}

/// Print the candidate table below the input area. The caller repaints
/// afterwards with a fresh (zero-row) area state so the prompt reappears
/// under the listing.
pub fn print_completions<T: Term>(
    term: &mut T,
    prior: InputAreaState,
    candidates: &[Completion],
) -> io::Result<()> {
    term.cmove_down(prior.num_rows.saturating_sub(prior.curs_row))?;
    term.write(b"\r\n")?;
    let cols = term.width().max(1);
    let colw = candidates
        .iter()
        .map(|c| str_width(&c.display))
        .max()
        .unwrap_or(0)
        + 2;
    let per_row = (cols / colw.max(1)).max(1);
    for chunk in candidates.chunks(per_row) {
        for c in chunk {
            term.write(c.display.as_bytes())?;
            for _ in 0..colw - str_width(&c.display) {
                term.write(b" ")?;
            }
        }
        term.write(b"\r\n")?;
    }
    term.flush()
}
