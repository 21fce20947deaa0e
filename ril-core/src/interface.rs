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

//! The interface loop: the one place that reads the terminal.
//!
//! Reading a character is the only blocking point. Every resolved action
//! runs with the line-modify mutex held; the auxiliary tasks (the deferred
//! action inbox and the hint workers) take the same mutex, so the rendered
//! line never races. Decoding walks the current mode's keymap trie one
//! character at a time; aliases and accept-and-replay actions feed a replay
//! queue that is drained before the terminal is read again.

use crate::actions::{Action, Outcome};
use crate::hint;
use crate::keymap::{Keymap, Leaf, Traverse};
use crate::modal::{DeferredAction, LineResult, ModalInterface};
use crate::paste::PASTE_END;
use crate::term::{Term, TermReader};
use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::debug;

/// The shared bundle behind the two locks and the keystroke counter.
pub struct Shared<T: Term> {
    /// The line-modify lock: any mutation of mode state, buffer, or the
    /// rendered area happens inside it.
    pub modal: Arc<Mutex<ModalInterface<T>>>,
    /// Serializes completion calls from hint workers.
    pub hint_lock: Arc<Mutex<()>>,
    /// Bumped for every terminal keystroke; hint workers compare it to
    /// detect staleness.
    pub n_keys_pressed: Arc<AtomicU64>,
    pub aborted: Arc<AtomicBool>,
}

impl<T: Term> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Shared {
            modal: self.modal.clone(),
            hint_lock: self.hint_lock.clone(),
            n_keys_pressed: self.n_keys_pressed.clone(),
            aborted: self.aborted.clone(),
        }
    }
}

impl<T: Term> Shared<T> {
    pub fn new(modal: ModalInterface<T>) -> Self {
        Shared {
            modal: Arc::new(Mutex::new(modal)),
            hint_lock: Arc::new(Mutex::new(())),
            n_keys_pressed: Arc::new(AtomicU64::new(0)),
            aborted: Arc::new(AtomicBool::new(false)),
        }
    }
}

/// Split a configured modal interface into the shared handle and the input
/// half, ready for repeated [`run_interface`] calls.
pub fn prepare<T: Term>(mut modal: ModalInterface<T>) -> (Shared<T>, T::Reader) {
    let reader = modal.term.take_reader();
    (Shared::new(modal), reader)
}

/// Convenience for single-shot use: prepare, run one session, done.
pub async fn run_once<T: Term>(modal: ModalInterface<T>) -> io::Result<LineResult> {
    let (shared, mut reader) = prepare(modal);
    run_interface(&shared, &mut reader).await
}

/// Run one prompt session: raw mode on, bracketed paste installed, decode
/// and dispatch until the line commits or aborts, invoke `on_done`, tear
/// down. On suspend the session yields to job control and repaints on
/// return. Call again on the same handles for the next line.
pub async fn run_interface<T: Term>(
    shared: &Shared<T>,
    reader: &mut T::Reader,
) -> io::Result<LineResult> {
    let (tx, mut inbox) = tokio::sync::mpsc::unbounded_channel::<DeferredAction<T>>();
    {
        let mut m = shared.modal.lock().await;
        m.deferred_tx = Some(tx.clone());
        m.term.raw_mode(true)?;
        m.term.enable_bracketed_paste()?;
        m.refresh()?;
    }
    shared.aborted.store(false, Ordering::SeqCst);

    // the action-inbox task: external requests run under the line-modify
    // mutex, never racing the renderer
    let inbox_shared = shared.clone();
    let inbox_tx = tx.clone();
    let inbox_task = tokio::spawn(async move {
        while let Some(action) = inbox.recv().await {
            match action {
                DeferredAction::Repaint => {
                    let mut m = inbox_shared.modal.lock().await;
                    let _ = m.refresh();
                }
                DeferredAction::BeepTick => {
                    let (again, duration) = {
                        let mut m = inbox_shared.modal.lock().await;
                        (m.beep_tick().unwrap_or(false), m.options.beep_duration)
                    };
                    if again {
                        let tx = inbox_tx.clone();
                        tokio::spawn(async move {
                            tokio::time::sleep(duration).await;
                            let _ = tx.send(DeferredAction::BeepTick);
                        });
                    }
                }
                DeferredAction::Run(f) => {
                    let mut m = inbox_shared.modal.lock().await;
                    f(&mut m);
                }
            }
        }
    });

    let result = event_loop(shared, reader).await;

    shared.aborted.store(true, Ordering::SeqCst);
    inbox_task.abort();

    let mut m = shared.modal.lock().await;
    m.deferred_tx = None;
    m.term.disable_bracketed_paste()?;
    m.term.raw_mode(false)?;
    m.term.flush()?;

    let result = result?;
    if let Some(on_done) = m.home_on_done() {
        on_done(&result.line, result.accepted);
    }
    m.reset_after_session();
    Ok(result)
}

async fn event_loop<T: Term>(
    shared: &Shared<T>,
    reader: &mut T::Reader,
) -> io::Result<LineResult> {
    enum Decision {
        Pending,
        Drop,
        Ignore,
        Run(Action),
        Alias(Vec<char>),
    }

    let mut replay: VecDeque<char> = VecDeque::new();
    let mut pending: Vec<char> = Vec::new();
    let mut keymap: Arc<Keymap> = shared.modal.lock().await.current_keymap();

    loop {
        let c = match replay.pop_front() {
            Some(c) => c,
            None => match reader.read_char().await? {
                Some(c) => {
                    shared.n_keys_pressed.fetch_add(1, Ordering::SeqCst);
                    c
                }
                None => {
                    // end of input: hand back whatever was typed, unaccepted
                    let m = shared.modal.lock().await;
                    return Ok(LineResult {
                        line: m.current_line(),
                        accepted: false,
                    });
                }
            },
        };
        pending.push(c);

        let decision = match keymap.traverse(&pending) {
            Traverse::Pending => Decision::Pending,
            Traverse::Unbound => Decision::Drop,
            Traverse::Match(Leaf::Ignore) => Decision::Ignore,
            Traverse::Match(Leaf::Run(action)) => Decision::Run(action.clone()),
            Traverse::Match(Leaf::Alias(keys)) => Decision::Alias(keys.clone()),
        };

        match decision {
            Decision::Pending => continue,
            Decision::Drop => {
                // every keystroke either commits a visible change or is
                // dropped cleanly
                debug!(seq = ?pending, "dropping unbound key sequence");
                pending.clear();
            }
            Decision::Ignore => pending.clear(),
            Decision::Alias(keys) => {
                // lazy: re-decode against the current (post-merge) map
                pending.clear();
                for key in keys.into_iter().rev() {
                    replay.push_front(key);
                }
            }
            Decision::Run(action) => {
                let matched = std::mem::take(&mut pending);
                if action == Action::BracketedPaste {
                    let payload = read_paste_payload(reader).await?;
                    let mut m = shared.modal.lock().await;
                    m.insert_paste(&payload)?;
                    continue;
                }

                let mut m = shared.modal.lock().await;
                let outcome = m.dispatch(&action, &matched).await?;
                for key in m.take_replay().into_iter().rev() {
                    replay.push_front(key);
                }
                keymap = m.current_keymap();
                match outcome {
                    Outcome::Ok | Outcome::Ignore => {
                        let wants_hint = m.cursor_at_end() && m.hint_context().is_some();
                        drop(m);
                        if wants_hint {
                            hint::spawn_hint_worker(shared);
                        }
                    }
                    Outcome::Done => {
                        return Ok(LineResult {
                            line: m.current_line(),
                            accepted: true,
                        });
                    }
                    Outcome::Abort => {
                        return Ok(LineResult {
                            line: m.current_line(),
                            accepted: false,
                        });
                    }
                    Outcome::Suspend => {
                        m.term.raw_mode(false)?;
                        m.term.flush()?;
                        m.term.suspend()?;
                        m.term.raw_mode(true)?;
                        m.refresh()?;
                    }
                }
            }
        }
    }
}

/// Consume a bracketed paste up to (and excluding) its terminator. Bounded
/// by the terminator sequence; there is no timeout.
async fn read_paste_payload<R: TermReader>(reader: &mut R) -> io::Result<String> {
    let mut out = String::new();
    loop {
        match reader.read_char().await? {
            Some(c) => {
                out.push(c);
                if out.ends_with(PASTE_END) {
                    out.truncate(out.len() - PASTE_END.len());
                    return Ok(out);
                }
            }
            None => return Ok(out),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complete::{Completed, Completer, Completion};
    use crate::history::MemHistory;
    use crate::mode::{default_prompt_keymap, PromptSpec};
    use crate::options::EditorOptions;
    use crate::term::testing::Captured;
    use crate::term::TestTerm;
    use async_trait::async_trait;
    use std::time::Duration;

    fn session(input: &str) -> (ModalInterface<TestTerm>, Captured) {
        let term = TestTerm::with_input(80, 24, input);
        let out = term.out.clone();
        let mut modal = ModalInterface::new(term, EditorOptions::default());
        let spec = PromptSpec::new("julia> ", Arc::new(default_prompt_keymap()));
        modal.add_prompt(spec);
        (modal, out)
    }

    #[tokio::test]
    async fn test_plain_line_commits() {
        let (modal, out) = session("1 + 1\r");
        let result = run_once(modal).await.unwrap();
        assert_eq!(result.line, "1 + 1");
        assert!(result.accepted);
        assert!(out.as_string().contains("julia> 1 + 1"));
    }

    #[tokio::test]
    async fn test_newline_alias_chain_commits() {
        // "\n" redirects to "\r" in the default map
        let (modal, _out) = session("ok\n");
        let result = run_once(modal).await.unwrap();
        assert_eq!(result.line, "ok");
        assert!(result.accepted);
    }

    #[tokio::test]
    async fn test_interrupt_aborts() {
        let (modal, _out) = session("abc\x03");
        let result = run_once(modal).await.unwrap();
        assert_eq!(result.line, "abc");
        assert!(!result.accepted);
    }

    #[tokio::test]
    async fn test_backspace_and_edit() {
        let (modal, _out) = session("abx\x7fc\r");
        let result = run_once(modal).await.unwrap();
        assert_eq!(result.line, "abc");
    }

    #[tokio::test]
    async fn test_kill_and_yank_round_trip() {
        // C-a to line start, C-k kills "abc", C-y yanks it back twice
        let (modal, _out) = session("abc\x01\x0b\x19\x19\r");
        let result = run_once(modal).await.unwrap();
        assert_eq!(result.line, "abcabc");
    }

    #[tokio::test]
    async fn test_undo_restores_typed_text() {
        // type abc, kill to start, undo brings it back
        let (modal, _out) = session("abc\x01\x0b\x1f\r");
        let result = run_once(modal).await.unwrap();
        assert_eq!(result.line, "abc");
    }

    #[tokio::test]
    async fn test_multiline_via_on_enter() {
        let term = TestTerm::with_input(80, 24, "(1,\r2)\r");
        let mut modal = ModalInterface::new(term, EditorOptions::default());
        let mut spec = PromptSpec::new("> ", Arc::new(default_prompt_keymap()));
        // the line is complete once parens balance
        spec.on_enter = Some(Arc::new(|line: &str| {
            line.matches('(').count() == line.matches(')').count()
        }));
        modal.add_prompt(spec);
        let result = run_once(modal).await.unwrap();
        assert_eq!(result.line, "(1,\n2)");
        assert!(result.accepted);
    }

    #[tokio::test]
    async fn test_history_prefix_search_on_up_arrow() {
        let (mut modal, _out) = session("\x1b[A\r\r");
        let key = modal.current_mode();
        modal.set_history(
            key,
            Box::new(MemHistory::with_entries(&["first line", "second line"])),
        );
        // Up from an empty prompt walks history; Enter replays into the
        // prompt and the second Enter commits
        let result = run_once(modal).await.unwrap();
        assert_eq!(result.line, "second line");
        assert!(result.accepted);
    }

    #[tokio::test]
    async fn test_incremental_search_accept() {
        let (mut modal, out) = session("\x12fir\r\r");
        let key = modal.current_mode();
        modal.set_history(
            key,
            Box::new(MemHistory::with_entries(&["first", "second"])),
        );
        let result = run_once(modal).await.unwrap();
        assert_eq!(result.line, "first");
        assert!(out.as_string().contains("(reverse-i-search)`fir':"));
    }

    #[tokio::test]
    async fn test_search_motion_accepts_and_replays() {
        let (mut modal, _out) = session("\x12sec\x01x\r");
        let key = modal.current_mode();
        modal.set_history(
            key,
            Box::new(MemHistory::with_entries(&["first", "second"])),
        );
        // C-a accepts "second" and moves to line start in the prompt; "x"
        // self-inserts there
        let result = run_once(modal).await.unwrap();
        assert_eq!(result.line, "xsecond");
    }

    #[tokio::test]
    async fn test_bracketed_paste_single_edit() {
        let (modal, _out) = session("\x1b[200~  if x\n    y\x1b[201~\r");
        let result = run_once(modal).await.unwrap();
        // common indent stripped, inserted as one edit
        assert_eq!(result.line, "if x\n  y");
    }

    #[tokio::test]
    async fn test_unbound_sequences_drop_cleanly() {
        // unknown escape sequences and stray control bytes are swallowed,
        // typing continues
        let (modal, _out) = session("\x1bq\x1b[2J\x1dab\r");
        let result = run_once(modal).await.unwrap();
        assert_eq!(result.line, "ab");
    }

    struct SlowCompleter {
        delay: Duration,
        candidates: Vec<&'static str>,
    }

    #[async_trait]
    impl Completer for SlowCompleter {
        async fn complete_line(
            &self,
            line: &str,
            position: usize,
            _scope: &str,
            _hint: bool,
        ) -> Completed {
            tokio::time::sleep(self.delay).await;
            let start = line[..position]
                .rfind(|c: char| c.is_whitespace())
                .map(|i| i + 1)
                .unwrap_or(0);
            let partial = &line[start..position];
            Completed {
                candidates: self
                    .candidates
                    .iter()
                    .filter(|c| c.starts_with(partial))
                    .map(|c| Completion::simple(*c))
                    .collect(),
                range: start..position,
                should_complete: true,
            }
        }
    }

    #[tokio::test]
    async fn test_tab_completes_unique_candidate() {
        let (mut modal, _out) = session("hel\t\r");
        let key = modal.current_mode();
        modal.set_completer(
            key,
            Arc::new(SlowCompleter {
                delay: Duration::ZERO,
                candidates: vec!["hello"],
            }),
        );
        let result = run_once(modal).await.unwrap();
        assert_eq!(result.line, "hello");
    }

    #[tokio::test]
    async fn test_tab_splices_common_prefix() {
        let (mut modal, _out) = session("pri\t\r");
        let key = modal.current_mode();
        modal.set_completer(
            key,
            Arc::new(SlowCompleter {
                delay: Duration::ZERO,
                candidates: vec!["print", "println", "printf"],
            }),
        );
        let result = run_once(modal).await.unwrap();
        assert_eq!(result.line, "print");
    }

    #[tokio::test]
    async fn test_stale_hint_never_painted() {
        // the provider answers slowly; further keystrokes arrive first, so
        // the suffix "lo" must never appear dim on screen
        let (mut modal, out) = session("help\r");
        let key = modal.current_mode();
        modal.set_completer(
            key,
            Arc::new(SlowCompleter {
                delay: Duration::from_millis(50),
                candidates: vec!["hello"],
            }),
        );
        let result = run_once(modal).await.unwrap();
        assert_eq!(result.line, "help");
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(!out.as_string().contains("\x1b[2mlo"));
    }
}
