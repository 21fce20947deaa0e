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

//! The hint worker: completion raced against further keystrokes.
//!
//! After an action leaves the cursor at end of buffer, a worker task asks
//! the provider for completions in hint mode and paints the unambiguous
//! suffix dim after the cursor. The worker records the keystroke counter up
//! front and re-checks it around every slow step; if the user kept typing,
//! the result is discarded without touching the screen. Provider failures
//! clear the hint and end the worker quietly.

use crate::complete::common_prefix;
use crate::interface::Shared;
use crate::term::Term;
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::Ordering;
use tracing::debug;

/// Spawn one hint generation attempt for the current prompt state.
pub fn spawn_hint_worker<T: Term>(shared: &Shared<T>) {
    let shared = shared.clone();
    tokio::spawn(async move {
        let n0 = shared.n_keys_pressed.load(Ordering::SeqCst);

        // serialize provider calls across workers
        let _guard = shared.hint_lock.lock().await;
        if shared.n_keys_pressed.load(Ordering::SeqCst) != n0
            || shared.aborted.load(Ordering::SeqCst)
        {
            return;
        }

        let context = {
            let m = shared.modal.lock().await;
            if !m.cursor_at_end() {
                return;
            }
            m.hint_context()
        };
        let Some((completer, line, position, scope)) = context else {
            return;
        };

        let completed =
            match AssertUnwindSafe(completer.complete_line(&line, position, &scope, true))
                .catch_unwind()
                .await
            {
                Ok(completed) => completed,
                Err(_) => {
                    debug!("hint completion provider panicked; clearing hint");
                    clear(&shared, n0).await;
                    return;
                }
            };

        let range = completed.range.clone();
        if range.start > range.end || range.end > line.len() {
            clear(&shared, n0).await;
            return;
        }
        let partial = &line[range];

        // a hint is shown for exactly one candidate, or when the common
        // prefix is itself one of the candidates
        let target = if completed.candidates.len() == 1 {
            Some(completed.candidates[0].completion.clone())
        } else if !completed.candidates.is_empty() {
            let prefix = common_prefix(&completed.candidates);
            completed
                .candidates
                .iter()
                .any(|c| c.completion == prefix)
                .then_some(prefix)
        } else {
            None
        };
        let suffix = target
            .and_then(|t| t.strip_prefix(partial).map(str::to_string))
            .filter(|s| !s.is_empty());

        let mut m = shared.modal.lock().await;
        if shared.n_keys_pressed.load(Ordering::SeqCst) != n0
            || shared.aborted.load(Ordering::SeqCst)
        {
            return;
        }
        let _ = m.set_hint(suffix.unwrap_or_default());
    });
}

async fn clear<T: Term>(shared: &Shared<T>, n0: u64) {
    let mut m = shared.modal.lock().await;
    if shared.n_keys_pressed.load(Ordering::SeqCst) != n0
        || shared.aborted.load(Ordering::SeqCst)
    {
        return;
    }
    let _ = m.set_hint(String::new());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complete::{Completed, Completer, Completion};
    use crate::modal::ModalInterface;
    use crate::mode::{default_prompt_keymap, PromptSpec};
    use crate::options::EditorOptions;
    use crate::term::testing::Captured;
    use crate::term::TestTerm;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::time::Duration;

    struct FixedCompleter {
        delay: Duration,
        candidates: Vec<&'static str>,
    }

    #[async_trait]
    impl Completer for FixedCompleter {
        async fn complete_line(
            &self,
            line: &str,
            position: usize,
            _scope: &str,
            _hint: bool,
        ) -> Completed {
            tokio::time::sleep(self.delay).await;
            Completed {
                candidates: self
                    .candidates
                    .iter()
                    .map(|c| Completion::simple(*c))
                    .collect(),
                range: 0..position,
                should_complete: true,
            }
        }
    }

    async fn shared_with(
        input_line: &str,
        delay: Duration,
        candidates: Vec<&'static str>,
    ) -> (Shared<TestTerm>, Captured) {
        let term = TestTerm::new(80, 24);
        let out = term.out.clone();
        let mut modal = ModalInterface::new(term, EditorOptions::default());
        let spec = PromptSpec::new("> ", Arc::new(default_prompt_keymap()));
        let key = modal.add_prompt(spec);
        modal.set_completer(key, Arc::new(FixedCompleter { delay, candidates }));
        // simulate typed text with the cursor at the end
        let chars: Vec<char> = input_line.chars().collect();
        modal
            .dispatch(&crate::actions::Action::SelfInsert, &chars)
            .await
            .unwrap();
        (Shared::new(modal), out)
    }

    #[tokio::test]
    async fn test_hint_painted_for_unique_completion() {
        let (shared, out) = shared_with("hel", Duration::ZERO, vec!["hello"]).await;
        spawn_hint_worker(&shared);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(out.as_string().contains("\x1b[2mlo\x1b[22m"));
    }

    #[tokio::test]
    async fn test_hint_for_common_prefix_candidate() {
        // "print" is both a candidate and the common prefix
        let (shared, out) = shared_with("pri", Duration::ZERO, vec!["print", "println"]).await;
        spawn_hint_worker(&shared);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(out.as_string().contains("\x1b[2mnt\x1b[22m"));
    }

    #[tokio::test]
    async fn test_ambiguous_candidates_give_no_hint() {
        let (shared, out) = shared_with("x", Duration::ZERO, vec!["xa", "xb"]).await;
        spawn_hint_worker(&shared);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!out.as_string().contains("\x1b[2m"));
    }

    #[tokio::test]
    async fn test_newer_keystroke_discards_hint() {
        let (shared, out) = shared_with("hel", Duration::from_millis(30), vec!["hello"]).await;
        spawn_hint_worker(&shared);
        // a keystroke lands while the provider is still thinking
        shared.n_keys_pressed.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!out.as_string().contains("\x1b[2mlo"));
    }

    #[tokio::test]
    async fn test_aborted_session_discards_hint() {
        let (shared, out) = shared_with("hel", Duration::from_millis(30), vec!["hello"]).await;
        spawn_hint_worker(&shared);
        shared.aborted.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(!out.as_string().contains("\x1b[2mlo"));
    }
}
