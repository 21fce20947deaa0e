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

//! The completion seam. Candidate generation is language-specific and
//! lives outside this crate; the editor only consumes the provider trait.

use async_trait::async_trait;
use std::ops::Range;

/// A candidate: the text to splice in versus the text to show in the list.
/// They coincide for ordinary completions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub completion: String,
    pub display: String,
}

impl Completion {
    pub fn simple(text: impl Into<String>) -> Self {
        let completion = text.into();
        Completion {
            display: completion.clone(),
            completion,
        }
    }

    pub fn named(completion: impl Into<String>, display: impl Into<String>) -> Self {
        Completion {
            completion: completion.into(),
            display: display.into(),
        }
    }
}

/// What a provider returns: candidates, the byte range of the buffer they
/// replace, and whether splicing is appropriate at all. A false
/// `should_complete` means "show the list, do not splice".
#[derive(Debug, Clone, Default)]
pub struct Completed {
    pub candidates: Vec<Completion>,
    pub range: Range<usize>,
    pub should_complete: bool,
}

#[async_trait]
pub trait Completer: Send + Sync {
    /// Complete at `position` in `line`. `scope` is an ambient module or
    /// namespace token from the outer REPL. `hint` grants permission to
    /// return fast, possibly partial, results.
    async fn complete_line(&self, line: &str, position: usize, scope: &str, hint: bool)
        -> Completed;
}

/// Longest common prefix of the candidates' completion texts, on character
/// boundaries.
pub fn common_prefix(candidates: &[Completion]) -> String {
    let Some(first) = candidates.first() else {
        return String::new();
    };
    let mut prefix = first.completion.as_str();
    for c in &candidates[1..] {
        while !c.completion.starts_with(prefix) {
            let cut = prefix
                .char_indices()
                .last()
                .map(|(i, _)| i)
                .unwrap_or(0);
            prefix = &prefix[..cut];
            if prefix.is_empty() {
                return String::new();
            }
        }
    }
    prefix.to_string()
}
