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

//! The history seam, plus a plain in-memory provider.
//!
//! Storage (files, databases, dedup policy) belongs to the outer REPL; the
//! editor drives navigation and search through this trait. Operations that
//! move through history write the selected entry into the buffer they are
//! handed and report whether they moved at all.

use crate::edit_buffer::EditBuffer;

pub trait History: Send {
    /// Step to the previous (older) entry. False at the top.
    fn prev(&mut self, buf: &mut EditBuffer) -> bool;
    /// Step to the next (newer) entry, restoring the in-progress line when
    /// walking off the newest entry. False when already there.
    fn next(&mut self, buf: &mut EditBuffer) -> bool;
    /// Jump to the oldest entry.
    fn first(&mut self, buf: &mut EditBuffer) -> bool;
    /// Jump back to the in-progress line.
    fn last(&mut self, buf: &mut EditBuffer) -> bool;

    /// Incremental substring search. Writes the matched entry into
    /// `response` with the cursor at the match and updates the navigation
    /// point. `skip_current` advances past the current match first (repeat
    /// search). False leaves `response` untouched.
    fn search(
        &mut self,
        query: &str,
        response: &mut EditBuffer,
        backward: bool,
        skip_current: bool,
    ) -> bool;

    /// Like [`Self::search`] but anchored at line start.
    fn prefix_search(&mut self, prefix: &str, response: &mut EditBuffer, backward: bool) -> bool;

    fn add(&mut self, entry: &str);

    /// Forget the navigation point (called when a line is committed).
    fn reset(&mut self);
}

/// Session-local history, used by tests and the demo REPL.
#[derive(Debug, Default)]
pub struct MemHistory {
    entries: Vec<String>,
    /// Navigation point; `entries.len()` means the live line.
    cur: usize,
    /// The in-progress line saved when navigation leaves it.
    draft: Option<String>,
}

impl MemHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_entries(entries: &[&str]) -> Self {
        let entries: Vec<String> = entries.iter().map(|s| s.to_string()).collect();
        MemHistory {
            cur: entries.len(),
            entries,
            draft: None,
        }
    }

    fn load_current(&self, buf: &mut EditBuffer) {
        if self.cur < self.entries.len() {
            buf.load(&self.entries[self.cur]);
        } else {
            buf.load(self.draft.as_deref().unwrap_or(""));
        }
    }
}

impl History for MemHistory {
    fn prev(&mut self, buf: &mut EditBuffer) -> bool {
        if self.cur == 0 {
            return false;
        }
        if self.cur == self.entries.len() {
            self.draft = Some(buf.as_str().to_string());
        }
        self.cur -= 1;
        self.load_current(buf);
        true
    }

    fn next(&mut self, buf: &mut EditBuffer) -> bool {
        if self.cur >= self.entries.len() {
            return false;
        }
        self.cur += 1;
        self.load_current(buf);
        true
    }

    fn first(&mut self, buf: &mut EditBuffer) -> bool {
        if self.entries.is_empty() {
            return false;
        }
        if self.cur == self.entries.len() {
            self.draft = Some(buf.as_str().to_string());
        }
        self.cur = 0;
        self.load_current(buf);
        true
    }

    fn last(&mut self, buf: &mut EditBuffer) -> bool {
        if self.cur == self.entries.len() {
            return false;
        }
        self.cur = self.entries.len();
        self.load_current(buf);
        true
    }

    fn search(
        &mut self,
        query: &str,
        response: &mut EditBuffer,
        backward: bool,
        skip_current: bool,
    ) -> bool {
        if query.is_empty() {
            return false;
        }
        let len = self.entries.len();
        if backward {
            let mut i = self.cur.min(len);
            if !skip_current && i < len {
                i += 1;
            }
            while i > 0 {
                i -= 1;
                if let Some(at) = self.entries[i].find(query) {
                    self.cur = i;
                    response.load(&self.entries[i]);
                    response.set_position(at);
                    return true;
                }
            }
            false
        } else {
            let mut i = self.cur;
            if skip_current {
                i += 1;
            }
            while i < len {
                if let Some(at) = self.entries[i].find(query) {
                    self.cur = i;
                    response.load(&self.entries[i]);
                    response.set_position(at);
                    return true;
                }
                i += 1;
            }
            false
        }
    }

    fn prefix_search(&mut self, prefix: &str, response: &mut EditBuffer, backward: bool) -> bool {
        let len = self.entries.len();
        let current = response.as_str().to_string();
        if backward {
            let mut i = self.cur.min(len);
            while i > 0 {
                i -= 1;
                if self.entries[i].starts_with(prefix) && self.entries[i] != current {
                    self.cur = i;
                    response.load(&self.entries[i]);
                    return true;
                }
            }
            false
        } else {
            let mut i = self.cur + 1;
            while i < len {
                if self.entries[i].starts_with(prefix) && self.entries[i] != current {
                    self.cur = i;
                    response.load(&self.entries[i]);
                    return true;
                }
                i += 1;
            }
            false
        }
    }

    fn add(&mut self, entry: &str) {
        if entry.is_empty() {
            return;
        }
        if self.entries.last().map(String::as_str) != Some(entry) {
            self.entries.push(entry.to_string());
        }
        self.cur = self.entries.len();
        self.draft = None;
    }

    fn reset(&mut self) {
        self.cur = self.entries.len();
        self.draft = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prev_next_round_trip_keeps_draft() {
        let mut hist = MemHistory::with_entries(&["one", "two"]);
        let mut buf = EditBuffer::from_str("half-typed");

        assert!(hist.prev(&mut buf));
        assert_eq!(buf.as_str(), "two");
        assert!(hist.prev(&mut buf));
        assert_eq!(buf.as_str(), "one");
        assert!(!hist.prev(&mut buf));

        assert!(hist.next(&mut buf));
        assert_eq!(buf.as_str(), "two");
        assert!(hist.next(&mut buf));
        assert_eq!(buf.as_str(), "half-typed");
        assert!(!hist.next(&mut buf));
    }

    #[test]
    fn test_first_and_last() {
        let mut hist = MemHistory::with_entries(&["one", "two", "three"]);
        let mut buf = EditBuffer::from_str("draft");
        assert!(hist.first(&mut buf));
        assert_eq!(buf.as_str(), "one");
        assert!(hist.last(&mut buf));
        assert_eq!(buf.as_str(), "draft");
        assert!(!hist.last(&mut buf));
    }

    #[test]
    fn test_search_backward_and_repeat() {
        let mut hist = MemHistory::with_entries(&["echo alpha", "print(x)", "echo beta"]);
        let mut response = EditBuffer::new();

        assert!(hist.search("echo", &mut response, true, false));
        assert_eq!(response.as_str(), "echo beta");
        assert_eq!(response.position(), 0);

        assert!(hist.search("echo", &mut response, true, true));
        assert_eq!(response.as_str(), "echo alpha");

        // no further match; response untouched
        assert!(!hist.search("echo", &mut response, true, true));
        assert_eq!(response.as_str(), "echo alpha");
    }

    #[test]
    fn test_search_forward_reverses_direction() {
        let mut hist = MemHistory::with_entries(&["echo alpha", "print(x)", "echo beta"]);
        let mut response = EditBuffer::new();
        assert!(hist.search("echo", &mut response, true, false));
        assert!(hist.search("echo", &mut response, true, true));
        assert_eq!(response.as_str(), "echo alpha");

        assert!(hist.search("echo", &mut response, false, true));
        assert_eq!(response.as_str(), "echo beta");
    }

    #[test]
    fn test_search_cursor_sits_on_match() {
        let mut hist = MemHistory::with_entries(&["let value = 1"]);
        let mut response = EditBuffer::new();
        assert!(hist.search("value", &mut response, true, false));
        assert_eq!(response.position(), 4);
    }

    #[test]
    fn test_prefix_search_walks_matches_only() {
        let mut hist =
            MemHistory::with_entries(&["plot(x)", "sum(v)", "plot(y)", "mean(v)"]);
        let mut response = EditBuffer::from_str("plot");

        assert!(hist.prefix_search("plot", &mut response, true));
        assert_eq!(response.as_str(), "plot(y)");
        assert!(hist.prefix_search("plot", &mut response, true));
        assert_eq!(response.as_str(), "plot(x)");
        assert!(!hist.prefix_search("plot", &mut response, true));

        assert!(hist.prefix_search("plot", &mut response, false));
        assert_eq!(response.as_str(), "plot(y)");
        assert!(!hist.prefix_search("plot", &mut response, false));
    }

    #[test]
    fn test_add_dedups_consecutive_and_resets_point() {
        let mut hist = MemHistory::new();
        hist.add("x");
        hist.add("x");
        hist.add("y");
        let mut buf = EditBuffer::new();
        assert!(hist.prev(&mut buf));
        assert_eq!(buf.as_str(), "y");
        assert!(hist.prev(&mut buf));
        assert_eq!(buf.as_str(), "x");
        assert!(!hist.prev(&mut buf));
    }
}
