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

//! Paste handling: normalizing bracketed-paste payloads, and the timing
//! heuristic that spots pastes on terminals without bracketed paste.

use std::time::{Duration, Instant};

/// The byte sequences framing a bracketed paste.
pub const PASTE_BEGIN: &str = "\x1b[200~";
pub const PASTE_END: &str = "\x1b[201~";

/// Normalize a bracketed-paste payload: CR becomes LF, the common leading
/// indentation of non-blank lines is stripped, and tabs expand to spaces.
pub fn process_bracketed_paste(input: &str, tabwidth: usize) -> String {
    let unified = input.replace("\r\n", "\n").replace('\r', "\n");

    // common leading whitespace prefix across non-blank lines
    let mut common: Option<&str> = None;
    for line in unified.lines() {
        if line.trim().is_empty() {
            continue;
        }
        let indent_len = line.len() - line.trim_start_matches([' ', '\t']).len();
        let indent = &line[..indent_len];
        common = Some(match common {
            None => indent,
            Some(prev) => {
                let mut n = 0;
                for (a, b) in prev.chars().zip(indent.chars()) {
                    if a != b {
                        break;
                    }
                    n += a.len_utf8();
                }
                &prev[..n]
            }
        });
    }
    let strip = common.unwrap_or("");

    let mut out = String::with_capacity(unified.len());
    for (i, line) in unified.split('\n').enumerate() {
        if i > 0 {
            out.push('\n');
        }
        let line = line.strip_prefix(strip).unwrap_or(line);
        expand_tabs_into(&mut out, line, tabwidth);
    }
    out
}

fn expand_tabs_into(out: &mut String, line: &str, tabwidth: usize) {
    let tabwidth = tabwidth.max(1);
    let mut col = 0usize;
    for c in line.chars() {
        if c == '\t' {
            let n = tabwidth - col % tabwidth;
            for _ in 0..n {
                out.push(' ');
            }
            col += n;
        } else {
            out.push(c);
            col += 1;
        }
    }
}

/// Clock seam so the paste heuristic can be tested deterministically.
pub trait Clock: Send {
    fn now(&self) -> Duration;
}

/// Wall clock measured from construction.
#[derive(Debug, Clone)]
pub struct SystemClock {
    origin: Instant,
}

impl Default for SystemClock {
    fn default() -> Self {
        SystemClock {
            origin: Instant::now(),
        }
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Detects paste-speed typing: two consecutive non-space insertions inside
/// the configured window arm the suppression flag, and the next slow
/// non-space insertion clears it. The flag itself lives in the shared
/// options record (`auto_indent_tmp_off`).
#[derive(Debug, Default)]
pub struct PasteDetector {
    last_nonspace: Option<Duration>,
}

impl PasteDetector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an insertion. Returns the new value of the suppression flag,
    /// or `None` when the inserted text was all spaces (flag unchanged).
    pub fn note_insert(
        &mut self,
        text: &str,
        now: Duration,
        threshold: Duration,
    ) -> Option<bool> {
        if text.chars().all(|c| c == ' ') {
            return None;
        }
        let suppress = matches!(self.last_nonspace, Some(prev) if now.saturating_sub(prev) < threshold);
        self.last_nonspace = Some(now);
        Some(suppress)
    }

    pub fn reset(&mut self) {
        self.last_nonspace = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cr_becomes_lf() {
        assert_eq!(process_bracketed_paste("a\r\nb\rc", 4), "a\nb\nc");
    }

    #[test]
    fn test_common_indent_stripped() {
        let pasted = "    if x\n        y\n    end";
        assert_eq!(process_bracketed_paste(pasted, 4), "if x\n    y\nend");
    }

    #[test]
    fn test_blank_lines_do_not_defeat_dedent() {
        let pasted = "  a\n\n  b";
        assert_eq!(process_bracketed_paste(pasted, 4), "a\n\nb");
    }

    #[test]
    fn test_tabs_expand_to_stops() {
        assert_eq!(process_bracketed_paste("\tx", 4), "    x");
        assert_eq!(process_bracketed_paste("ab\tx", 4), "ab  x");
    }

    #[test]
    fn test_fast_inserts_arm_suppression() {
        let mut det = PasteDetector::new();
        let threshold = Duration::from_millis(50);
        assert_eq!(
            det.note_insert("a", Duration::from_millis(0), threshold),
            Some(false)
        );
        assert_eq!(
            det.note_insert("b", Duration::from_millis(10), threshold),
            Some(true)
        );
        // a later, slow insert clears the flag again
        assert_eq!(
            det.note_insert("c", Duration::from_millis(500), threshold),
            Some(false)
        );
    }

    #[test]
    fn test_spaces_do_not_touch_the_flag() {
        let mut det = PasteDetector::new();
        let threshold = Duration::from_millis(50);
        det.note_insert("a", Duration::from_millis(0), threshold);
        assert_eq!(
            det.note_insert("  ", Duration::from_millis(5), threshold),
            None
        );
    }
}
