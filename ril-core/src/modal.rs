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

//! The modal interface: one small state machine owning every mode's state,
//! the shared kill ring, and the terminal writer.
//!
//! Keystrokes resolve to [`Action`]s in the current mode's keymap; the
//! dispatcher here sets up region activation and undo pre-images, applies
//! the action, and reports an [`Outcome`] to the event loop. Mode
//! transitions clear the old mode's painted area, switch, and repaint.
//! Mutation only ever happens with the line-modify lock held; the interface
//! loop and every auxiliary task share this struct through a mutex.

use crate::actions::{Action, Outcome};
use crate::complete::{common_prefix, Completer};
use crate::edit_buffer::{is_whitespace_delimiter, is_word_delimiter, EditBuffer};
use crate::history::History;
use crate::keymap::Keymap;
use crate::kill_ring::{KillDirection, KillRing};
use crate::mode::{
    prefix_search_keymap, search_keymap, ModeState, PrefixSearchState, PromptSpec, PromptState,
    RegionActive, SearchState,
};
use crate::options::EditorOptions;
use crate::paste::{Clock, SystemClock};
use crate::render::{
    clear_input_area, print_completions, refresh_multi_line, Hint, InputAreaState, RenderPlan,
};
use crate::term::Term;
use crate::undo::UndoRecord;
use crate::ModeKey;
use futures::FutureExt;
use slotmap::{SecondaryMap, SlotMap};
use std::io;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::warn;

/// Deferred work posted to the interface loop's inbox; executed under the
/// line-modify lock. `Run` lets external subsystems (an async history
/// index, say) request line-level updates without racing the renderer.
pub enum DeferredAction<T: Term> {
    Repaint,
    BeepTick,
    Run(Box<dyn FnOnce(&mut ModalInterface<T>) + Send>),
}

/// What the session hands back to the outer REPL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineResult {
    pub line: String,
    pub accepted: bool,
}

pub struct ModalInterface<T: Term> {
    pub term: T,
    pub options: EditorOptions,
    modes: SlotMap<ModeKey, ModeState>,
    histories: SecondaryMap<ModeKey, Box<dyn History + Send>>,
    completers: SecondaryMap<ModeKey, Arc<dyn Completer>>,
    current: ModeKey,
    /// Lazily created auxiliary modes.
    search_mode: Option<ModeKey>,
    prefix_mode: Option<ModeKey>,
    /// Repeat detection over raw key sequences.
    previous_key: Vec<char>,
    key_repeats: usize,
    last_action: &'static str,
    current_action: &'static str,
    kill_ring: KillRing,
    /// Byte range of the text the last yank spliced in.
    yank_range: Option<(usize, usize)>,
    /// Ambient scope token handed to the completion provider.
    scope: String,
    clock: Box<dyn Clock>,
    /// Keys queued by accept-and-replay actions, drained by the loop.
    pending_replay: Vec<char>,
    /// Sender for deferred actions; installed by the interface loop.
    pub(crate) deferred_tx: Option<tokio::sync::mpsc::UnboundedSender<DeferredAction<T>>>,
    /// Set when transitioning to the abort pseudo-mode.
    pub aborted: bool,
}

impl<T: Term> ModalInterface<T> {
    pub fn new(term: T, options: EditorOptions) -> Self {
        let kill_ring = KillRing::with_capacity(options.kill_ring_max);
        ModalInterface {
            term,
            options,
            modes: SlotMap::with_key(),
            histories: SecondaryMap::new(),
            completers: SecondaryMap::new(),
            current: ModeKey::default(),
            search_mode: None,
            prefix_mode: None,
            previous_key: Vec::new(),
            key_repeats: 0,
            last_action: "",
            current_action: "",
            kill_ring,
            yank_range: None,
            scope: String::new(),
            clock: Box::new(SystemClock::default()),
            pending_replay: Vec::new(),
            deferred_tx: None,
            aborted: false,
        }
    }

    /// Register a prompt mode. The first one becomes current.
    pub fn add_prompt(&mut self, spec: PromptSpec) -> ModeKey {
        let key = self.modes.insert(ModeState::Prompt(PromptState::new(spec)));
        if self.current == ModeKey::default() {
            self.current = key;
        }
        key
    }

    pub fn set_history(&mut self, mode: ModeKey, history: Box<dyn History + Send>) {
        self.histories.insert(mode, history);
    }

    pub fn set_completer(&mut self, mode: ModeKey, completer: Arc<dyn Completer>) {
        self.completers.insert(mode, completer);
    }

    pub fn set_scope(&mut self, scope: impl Into<String>) {
        self.scope = scope.into();
    }

    /// Swap the clock; tests inject a scripted one.
    pub fn set_clock(&mut self, clock: Box<dyn Clock>) {
        self.clock = clock;
    }

    pub fn current_mode(&self) -> ModeKey {
        self.current
    }

    pub fn current_keymap(&self) -> Arc<Keymap> {
        self.modes[self.current].keymap()
    }

    pub fn take_replay(&mut self) -> Vec<char> {
        std::mem::take(&mut self.pending_replay)
    }

    /// Handle for posting deferred actions from outside the session; live
    /// while `run_interface` runs.
    pub fn deferred_sender(
        &self,
    ) -> Option<tokio::sync::mpsc::UnboundedSender<DeferredAction<T>>> {
        self.deferred_tx.clone()
    }

    pub fn last_action(&self) -> &'static str {
        self.last_action
    }

    /// The prompt state a search mode will return to, or the current one.
    fn home_prompt(&self) -> ModeKey {
        match &self.modes[self.current] {
            ModeState::Prompt(_) => self.current,
            ModeState::Search(s) => s.parent,
            ModeState::PrefixSearch(p) => p.parent,
        }
    }

    fn prompt_mut(&mut self) -> Option<&mut PromptState> {
        self.modes.get_mut(self.current)?.as_prompt_mut()
    }

    /// The committed or aborted line of the home prompt.
    pub fn current_line(&self) -> String {
        let home = self.home_prompt();
        match &self.modes[home] {
            ModeState::Prompt(p) => p.buf.as_str().to_string(),
            _ => String::new(),
        }
    }

    pub fn prompt_spec(&self, mode: ModeKey) -> Option<&PromptSpec> {
        match self.modes.get(mode)? {
            ModeState::Prompt(p) => Some(&p.spec),
            _ => None,
        }
    }

    /// True when the current mode is a prompt with the cursor at the end of
    /// its buffer: the precondition for hint generation.
    pub fn cursor_at_end(&self) -> bool {
        match &self.modes[self.current] {
            ModeState::Prompt(p) => p.buf.position() == p.buf.len() && !p.buf.is_empty(),
            _ => false,
        }
    }

    /// Context handed to the hint worker: provider, buffer snapshot,
    /// cursor, scope.
    pub fn hint_context(&self) -> Option<(Arc<dyn Completer>, String, usize, String)> {
        let p = match &self.modes[self.current] {
            ModeState::Prompt(p) => p,
            _ => return None,
        };
        let completer = self.completers.get(self.current)?.clone();
        Some((
            completer,
            p.buf.as_str().to_string(),
            p.buf.position(),
            self.scope.clone(),
        ))
    }

    /// Install a hint and repaint. Called by the hint worker with the
    /// line-modify lock held, after its staleness re-checks.
    pub fn set_hint(&mut self, hint: String) -> io::Result<()> {
        if !self.cursor_at_end() {
            return Ok(());
        }
        if let Some(p) = self.prompt_mut() {
            p.hint = if hint.is_empty() {
                Hint::Clear
            } else {
                Hint::Show(hint)
            };
        }
        self.refresh()
    }

    pub fn clear_hint(&mut self) {
        if let Some(p) = self.prompt_mut() {
            if matches!(p.hint, Hint::Show(_)) {
                p.hint = Hint::Clear;
            }
        }
    }

    // ------------------------------------------------------------------
    // Painting

    /// Repaint the current mode.
    pub fn refresh(&mut self) -> io::Result<()> {
        let key = self.current;
        let prior = self.modes[key].area();
        let area = {
            let Self {
                ref mut term,
                ref modes,
                ref options,
                ..
            } = *self;
            match &modes[key] {
                ModeState::Prompt(p) => {
                    let prompt = p.spec.prompt.text();
                    let beep_colors = &options.beep_colors;
                    // the final blink shows the prompt's own color when
                    // beep_use_current is set
                    let flash = p.beep_level > 0
                        && !beep_colors.is_empty()
                        && !(options.beep_use_current && p.beep_level == 1);
                    let plan = RenderPlan {
                        prompt_prefix: &p.spec.prompt_prefix,
                        prompt: &prompt,
                        prompt_suffix: &p.spec.prompt_suffix,
                        buf: &p.buf,
                        region: p.active_region(),
                        hint: &p.hint,
                        tabwidth: options.tabwidth,
                        beep_color: flash
                            .then(|| beep_colors[(p.beep_level as usize - 1) % beep_colors.len()]),
                    };
                    refresh_multi_line(term, prior, &plan)?
                }
                ModeState::Search(s) => {
                    let prompt = s.prompt();
                    let plan = RenderPlan {
                        prompt_prefix: "",
                        prompt: &prompt,
                        prompt_suffix: "",
                        buf: &s.response,
                        region: None,
                        hint: &Hint::Off,
                        tabwidth: options.tabwidth,
                        beep_color: None,
                    };
                    refresh_multi_line(term, prior, &plan)?
                }
                ModeState::PrefixSearch(p) => {
                    let parent = match &modes[p.parent] {
                        ModeState::Prompt(parent) => parent,
                        _ => unreachable!("prefix search parents a prompt"),
                    };
                    let prompt = parent.spec.prompt.text();
                    let plan = RenderPlan {
                        prompt_prefix: &parent.spec.prompt_prefix,
                        prompt: &prompt,
                        prompt_suffix: &parent.spec.prompt_suffix,
                        buf: &p.response,
                        region: None,
                        hint: &Hint::Off,
                        tabwidth: options.tabwidth,
                        beep_color: None,
                    };
                    refresh_multi_line(term, prior, &plan)?
                }
            }
        };
        // the one-shot clear sentinel has now been emitted
        if let Some(p) = self.prompt_mut() {
            if p.hint == Hint::Clear {
                p.hint = Hint::Off;
            }
        }
        self.modes[key].set_area(area);
        Ok(())
    }

    /// Audible beep, plus arming the prompt-flash animation that the
    /// interface loop drives through the deferred inbox.
    pub fn beep(&mut self) -> io::Result<()> {
        self.term.beep()?;
        self.term.flush()?;
        if self.options.beep_blink > 0 && self.term.hascolor() {
            let blinks = self.options.beep_blink.min(u8::MAX as u32) as u8;
            let max_ticks = (self.options.beep_maxduration.as_millis()
                / self.options.beep_duration.as_millis().max(1))
                as u8;
            if let Some(p) = self.prompt_mut() {
                p.beep_level = blinks.min(max_ticks.max(1));
            }
            if let Some(tx) = &self.deferred_tx {
                let _ = tx.send(DeferredAction::BeepTick);
            }
        }
        Ok(())
    }

    /// One step of the beep flash: repaint with the level's color, then
    /// decay. The interface loop sleeps `beep_duration` between ticks.
    pub fn beep_tick(&mut self) -> io::Result<bool> {
        let level = match self.prompt_mut() {
            Some(p) if p.beep_level > 0 => {
                p.beep_level -= 1;
                p.beep_level
            }
            _ => return Ok(false),
        };
        self.refresh()?;
        Ok(level > 0)
    }

    /// Cancel any pending beep animation.
    fn cancel_beep(&mut self) {
        if let Some(p) = self.prompt_mut() {
            p.beep_level = 0;
        }
    }

    fn beep_ignore(&mut self) -> io::Result<Outcome> {
        self.beep()?;
        Ok(Outcome::Ignore)
    }

    // ------------------------------------------------------------------
    // Transitions

    /// The transition protocol: cancel beeps, clear the old mode's area,
    /// switch, run `setup` inside the transition, repaint the new mode.
    pub fn transition_with(
        &mut self,
        target: ModeKey,
        setup: impl FnOnce(&mut Self),
    ) -> io::Result<()> {
        self.cancel_beep();
        let old = self.current;
        let old_area = self.modes[old].area();
        clear_input_area(&mut self.term, old_area)?;
        self.modes[old].set_area(InputAreaState::default());
        self.current = target;
        setup(self);
        self.refresh()?;
        self.term.flush()
    }

    pub fn transition(&mut self, target: ModeKey) -> io::Result<()> {
        self.transition_with(target, |_| {})
    }

    /// Transition to the abort pseudo-mode: set the flag and return.
    pub fn transition_abort(&mut self) {
        self.cancel_beep();
        self.aborted = true;
    }

    /// Transition to the reset pseudo-mode: back to the home prompt with a
    /// fresh line.
    pub fn transition_reset(&mut self) -> io::Result<()> {
        let home = self.home_prompt();
        self.transition_with(home, |this| {
            if let Some(p) = this.prompt_mut() {
                p.reset_line();
            }
        })
    }

    fn ensure_search_mode(&mut self) -> ModeKey {
        match self.search_mode {
            Some(key) => key,
            None => {
                let key = self.modes.insert(ModeState::Search(SearchState::new(
                    self.current,
                    true,
                    Arc::new(search_keymap()),
                )));
                self.search_mode = Some(key);
                key
            }
        }
    }

    fn ensure_prefix_mode(&mut self) -> ModeKey {
        match self.prefix_mode {
            Some(key) => key,
            None => {
                let key = self.modes.insert(ModeState::PrefixSearch(PrefixSearchState::new(
                    self.current,
                    Arc::new(prefix_search_keymap()),
                )));
                self.prefix_mode = Some(key);
                key
            }
        }
    }

    fn enter_search(&mut self, backward: bool) -> io::Result<Outcome> {
        let parent = self.current;
        if !self.histories.contains_key(parent) {
            return self.beep_ignore();
        }
        let target = self.ensure_search_mode();
        let (content, position) = match &self.modes[parent] {
            ModeState::Prompt(p) => (p.buf.as_str().to_string(), p.buf.position()),
            _ => return Ok(Outcome::Ignore),
        };
        self.transition_with(target, |this| {
            if let ModeState::Search(s) = &mut this.modes[target] {
                s.parent = parent;
                s.backward = backward;
                s.failed = false;
                s.query = EditBuffer::new();
                s.response.load(&content);
                s.response.set_position(position);
            }
        })?;
        Ok(Outcome::Ok)
    }

    fn enter_prefix_search(&mut self, backward: bool) -> io::Result<Outcome> {
        let parent = self.current;
        if !self.histories.contains_key(parent) {
            return self.beep_ignore();
        }
        let target = self.ensure_prefix_mode();
        let (content, position) = match &self.modes[parent] {
            ModeState::Prompt(p) => (p.buf.as_str().to_string(), p.buf.position()),
            _ => return Ok(Outcome::Ignore),
        };
        self.transition_with(target, |this| {
            if let ModeState::PrefixSearch(p) = &mut this.modes[target] {
                p.parent = parent;
                p.prefix = content[..position].to_string();
                p.origin = content.clone();
                p.response.load(&content);
                p.response.set_position(position);
            }
        })?;
        self.prefix_step(backward)
    }

    /// Copy a search result into the parent's buffer and go back.
    fn accept_search(&mut self) -> io::Result<()> {
        let (parent, content, position) = match &self.modes[self.current] {
            ModeState::Search(s) => (
                s.parent,
                s.response.as_str().to_string(),
                s.response.position(),
            ),
            ModeState::PrefixSearch(p) => (
                p.parent,
                p.response.as_str().to_string(),
                p.response.position(),
            ),
            ModeState::Prompt(_) => return Ok(()),
        };
        self.transition_with(parent, |this| {
            if let Some(p) = this.prompt_mut() {
                p.undo.push(UndoRecord::of(&p.buf));
                p.buf.load(&content);
                p.buf.set_position(position);
            }
        })
    }

    fn cancel_search(&mut self) -> io::Result<()> {
        let parent = match &self.modes[self.current] {
            ModeState::Search(s) => s.parent,
            ModeState::PrefixSearch(p) => p.parent,
            ModeState::Prompt(_) => return Ok(()),
        };
        self.transition(parent)
    }

    // ------------------------------------------------------------------
    // Dispatch

    /// Run one resolved action. `matched` is the raw key sequence that
    /// selected it.
    pub async fn dispatch(&mut self, action: &Action, matched: &[char]) -> io::Result<Outcome> {
        // repeat detection over contiguous identical sequences
        if matched == self.previous_key.as_slice() {
            self.key_repeats += 1;
        } else {
            self.key_repeats = 0;
            self.previous_key = matched.to_vec();
        }
        self.current_action = action.name();

        // a pending coalesced repaint dies with the next action
        if let Some(p) = self.prompt_mut() {
            if let Some(handle) = p.pending_repaint.take() {
                handle.abort();
            }
        }

        // a visible hint goes stale the moment anything else happens
        if !matches!(action, Action::Complete) {
            self.clear_hint();
        }

        // region activation per the shift_ naming rule
        let name = action.name();
        if let Some(p) = self.prompt_mut() {
            if name.starts_with("shift_") {
                if p.region_active != RegionActive::Shift {
                    p.buf.set_mark();
                    p.region_active = RegionActive::Shift;
                }
            } else if (action.is_motion() && p.region_active == RegionActive::Mark)
                || action.preserves_region()
                || *action == Action::SetMark
            {
                // preserved
            } else {
                p.region_active = RegionActive::Off;
            }
        }

        // undo pre-image, with consecutive self-inserts grouped
        let mut pushed_undo = false;
        if action.mutates_buffer() {
            let grouped =
                *action == Action::SelfInsert && self.last_action == Action::SelfInsert.name();
            if let Some(p) = self.prompt_mut() {
                if !grouped {
                    p.undo.push(UndoRecord::of(&p.buf));
                    pushed_undo = true;
                }
            }
        }

        let outcome = self.apply(action, matched).await?;

        if outcome == Outcome::Ignore {
            // nothing happened: drop the speculative pre-image and leave
            // last_action alone
            if pushed_undo {
                if let Some(p) = self.prompt_mut() {
                    p.undo.drop_last();
                }
            }
        } else {
            self.last_action = self.current_action;
        }
        if !matches!(action, Action::Yank | Action::YankPop) {
            self.yank_range = None;
        }
        Ok(outcome)
    }

    async fn apply(&mut self, action: &Action, matched: &[char]) -> io::Result<Outcome> {
        use Action::*;
        match action {
            SelfInsert => self.edit_insert(&matched.iter().collect::<String>()),
            InsertNewline => self.edit_insert_newline(),
            Backspace => self.edit_backspace(),
            Delete => self.edit_delete(),
            DeleteOrEof => {
                let empty = self
                    .prompt_mut()
                    .map(|p| p.buf.is_empty())
                    .unwrap_or(false);
                if empty {
                    // with confirm_exit, the first press only beeps and a
                    // repeated press ends the session
                    if self.options.confirm_exit && self.key_repeats == 0 {
                        return self.beep_ignore();
                    }
                    self.finish_area()?;
                    Ok(Outcome::Abort)
                } else {
                    self.edit_delete()
                }
            }
            Clear => self.edit_clear(),

            MoveLeft | ShiftMoveLeft => self.motion(|buf| {
                let pos = buf.char_left(buf.position());
                let moved = pos != buf.position();
                buf.set_position(pos);
                moved
            }),
            MoveRight | ShiftMoveRight => self.motion(|buf| {
                let pos = buf.char_right(buf.position());
                let moved = pos != buf.position();
                buf.set_position(pos);
                moved
            }),
            MoveUp => {
                let moved = match self.prompt_mut() {
                    Some(p) => p.buf.move_up(),
                    None => false,
                };
                if moved {
                    self.refresh()?;
                    Ok(Outcome::Ok)
                } else {
                    // first line: fall through to prefix history search
                    self.enter_prefix_search(true)
                }
            }
            MoveDown => {
                let moved = match self.prompt_mut() {
                    Some(p) => p.buf.move_down(),
                    None => false,
                };
                if moved {
                    self.refresh()?;
                    Ok(Outcome::Ok)
                } else {
                    self.enter_prefix_search(false)
                }
            }
            ShiftMoveUp => self.motion(|buf| buf.move_up()),
            ShiftMoveDown => self.motion(|buf| buf.move_down()),
            MoveWordLeft | ShiftMoveWordLeft => self.motion(|buf| {
                let pos = buf.word_left_from(buf.position(), is_word_delimiter);
                let moved = pos != buf.position();
                buf.set_position(pos);
                moved
            }),
            MoveWordRight | ShiftMoveWordRight => self.motion(|buf| {
                let pos = buf.word_right_from(buf.position(), is_word_delimiter);
                let moved = pos != buf.position();
                buf.set_position(pos);
                moved
            }),
            MoveLineStart | ShiftMoveLineStart => self.motion(|buf| {
                buf.set_position(buf.begin_of_line(buf.position()));
                true
            }),
            MoveLineEnd | ShiftMoveLineEnd => self.motion(|buf| {
                buf.set_position(buf.end_of_line(buf.position()));
                true
            }),
            MoveInputStart => self.motion(|buf| {
                buf.set_position(0);
                true
            }),
            MoveInputEnd => self.motion(|buf| {
                buf.set_position(buf.len());
                true
            }),

            SetMark => {
                // the mark always lands on the point; a repeated set-mark
                // additionally activates the region, so that following
                // motion extends it
                let repeated = self.key_repeats > 0;
                let visible = match self.prompt_mut() {
                    Some(p) => {
                        let was_active = p.region_active != RegionActive::Off;
                        p.buf.set_mark();
                        p.region_active = if repeated {
                            RegionActive::Mark
                        } else {
                            RegionActive::Off
                        };
                        was_active || repeated
                    }
                    None => false,
                };
                if visible {
                    self.refresh()?;
                }
                Ok(Outcome::Ok)
            }
            ExchangeMark => self.edit_exchange_point_and_mark(),

            KillLine => self.kill(|buf| {
                let pos = buf.position();
                let eol = buf.end_of_line(pos);
                if eol > pos {
                    Some((pos, eol, KillDirection::Forward))
                } else if pos < buf.len() {
                    // sitting on the newline: the newline itself is killed
                    Some((pos, pos + 1, KillDirection::Forward))
                } else {
                    None
                }
            }),
            KillLineBackward => self.kill(|buf| {
                let pos = buf.position();
                let bol = buf.begin_of_line(pos);
                if bol < pos {
                    Some((bol, pos, KillDirection::Backward))
                } else if pos > 0 {
                    // at line start: one preceding character is killed
                    Some((buf.char_left(pos), pos, KillDirection::Backward))
                } else {
                    None
                }
            }),
            KillWordLeft => self.kill(|buf| {
                let pos = buf.position();
                let lo = buf.word_left_from(pos, is_word_delimiter);
                (lo < pos).then_some((lo, pos, KillDirection::Backward))
            }),
            KillWordRight => self.kill(|buf| {
                let pos = buf.position();
                let hi = buf.word_right_from(pos, is_word_delimiter);
                (hi > pos).then_some((pos, hi, KillDirection::Forward))
            }),
            Werase => self.kill(|buf| {
                let pos = buf.position();
                let lo = buf.word_left_from(pos, is_whitespace_delimiter);
                (lo < pos).then_some((lo, pos, KillDirection::Backward))
            }),
            KillRegion => self.kill(|buf| {
                let (lo, hi) = buf.region()?;
                (lo < hi).then_some((lo, hi, KillDirection::Forward))
            }),
            CopyRegion => {
                let text = match self.prompt_mut() {
                    Some(p) => p
                        .buf
                        .region()
                        .filter(|(lo, hi)| lo < hi)
                        .map(|(lo, hi)| p.buf.as_str()[lo..hi].to_string()),
                    None => None,
                };
                match text {
                    Some(text) => {
                        self.kill_ring.set_concat(false);
                        self.kill_ring.push_kill(text, KillDirection::Forward);
                        Ok(Outcome::Ok)
                    }
                    None => self.beep_ignore(),
                }
            }
            Yank => {
                let Some(text) = self.kill_ring.yank().map(str::to_string) else {
                    return self.beep_ignore();
                };
                let range = match self.prompt_mut() {
                    Some(p) => {
                        let start = p.buf.position();
                        p.buf.insert(&text);
                        Some((start, start + text.len()))
                    }
                    None => None,
                };
                self.yank_range = range;
                self.refresh()?;
                Ok(Outcome::Ok)
            }
            YankPop => {
                let was_yank = matches!(self.last_action, "edit_yank" | "edit_yank_pop");
                let (Some((lo, hi)), true) = (self.yank_range, was_yank) else {
                    return self.beep_ignore();
                };
                let Some(text) = self.kill_ring.yank_pop().map(str::to_string) else {
                    return self.beep_ignore();
                };
                let range = match self.prompt_mut() {
                    Some(p) => {
                        p.buf.splice(lo, hi, &text);
                        p.buf.set_position(lo + text.len());
                        Some((lo, lo + text.len()))
                    }
                    None => None,
                };
                self.yank_range = range;
                self.refresh()?;
                Ok(Outcome::Ok)
            }

            TransposeChars => self.buffer_edit(|buf| buf.transpose_chars()),
            TransposeWords => self.buffer_edit(|buf| buf.transpose_words()),
            TransposeLinesUp => {
                let region = self.prompt_mut().and_then(|p| p.active_region());
                self.buffer_edit(|buf| buf.transpose_lines_up(region))
            }
            TransposeLinesDown => {
                let region = self.prompt_mut().and_then(|p| p.active_region());
                self.buffer_edit(|buf| buf.transpose_lines_down(region))
            }
            UppercaseWord => self.buffer_edit(|buf| buf.case_next_word(|w| w.to_uppercase())),
            LowercaseWord => self.buffer_edit(|buf| buf.case_next_word(|w| w.to_lowercase())),
            TitlecaseWord => self.buffer_edit(|buf| {
                buf.case_next_word(|w| {
                    let mut chars = w.chars();
                    match chars.next() {
                        Some(first) => {
                            first.to_uppercase().collect::<String>() + &chars.as_str().to_lowercase()
                        }
                        None => String::new(),
                    }
                })
            }),
            IndentRegion => self.edit_indent(true),
            OutdentRegion => self.edit_indent(false),

            Undo => {
                let restored = match self.prompt_mut() {
                    Some(p) => match p.undo.undo(UndoRecord::of(&p.buf)) {
                        Some(record) => {
                            record.restore(&mut p.buf);
                            true
                        }
                        None => false,
                    },
                    None => false,
                };
                if restored {
                    self.refresh()?;
                    Ok(Outcome::Ok)
                } else {
                    self.beep_ignore()
                }
            }
            Redo => {
                // legal only straight after an undo or redo
                if !matches!(self.last_action, "edit_undo" | "edit_redo") {
                    return self.beep_ignore();
                }
                let restored = match self.prompt_mut() {
                    Some(p) => match p.undo.redo() {
                        Some(record) => {
                            record.restore(&mut p.buf);
                            true
                        }
                        None => false,
                    },
                    None => false,
                };
                if restored {
                    self.refresh()?;
                    Ok(Outcome::Ok)
                } else {
                    self.beep_ignore()
                }
            }

            HistoryPrev => self.history_move(|h, buf| h.prev(buf)),
            HistoryNext => self.history_move(|h, buf| h.next(buf)),
            HistoryFirst => self.history_move(|h, buf| h.first(buf)),
            HistoryLast => self.history_move(|h, buf| h.last(buf)),

            Complete => self.complete_line().await,

            SearchBackward | SearchForward => {
                let backward = *action == SearchBackward;
                if matches!(self.modes[self.current], ModeState::Search(_)) {
                    self.search_step(backward)
                } else if matches!(self.modes[self.current], ModeState::Prompt(_)) {
                    self.enter_search(backward)
                } else {
                    Ok(Outcome::Ignore)
                }
            }
            PrefixSearchPrev | PrefixSearchNext => {
                let backward = *action == PrefixSearchPrev;
                if matches!(self.modes[self.current], ModeState::PrefixSearch(_)) {
                    self.prefix_step(backward)
                } else {
                    self.enter_prefix_search(backward)
                }
            }

            AcceptLine => self.accept_line(),
            Interrupt => {
                self.finish_area()?;
                Ok(Outcome::Abort)
            }
            Suspend => Ok(Outcome::Suspend),
            // the interface loop consumes the payload before dispatching
            BracketedPaste => Ok(Outcome::Ok),

            SearchSelfInsert => {
                let text: String = matched.iter().collect();
                if let ModeState::Search(s) = &mut self.modes[self.current] {
                    s.query.insert(&text);
                }
                self.run_search(false)
            }
            SearchBackspace => {
                let erased = match &mut self.modes[self.current] {
                    ModeState::Search(s) => {
                        let pos = s.query.position();
                        let lo = s.query.char_left(pos);
                        if lo < pos {
                            s.query.splice(lo, pos, "");
                            true
                        } else {
                            false
                        }
                    }
                    _ => false,
                };
                if erased {
                    self.run_search(false)
                } else {
                    self.beep_ignore()
                }
            }
            SearchAccept => {
                self.accept_search()?;
                Ok(Outcome::Ok)
            }
            SearchCancel => {
                self.cancel_search()?;
                Ok(Outcome::Ok)
            }
            SearchAcceptReplay | PrefixAcceptReplay => {
                self.accept_search()?;
                self.pending_replay = matched.to_vec();
                Ok(Outcome::Ok)
            }
        }
    }

    // ------------------------------------------------------------------
    // Prompt-mode edits

    fn edit_insert(&mut self, text: &str) -> io::Result<Outcome> {
        if text.is_empty() {
            return Ok(Outcome::Ignore);
        }
        let now = self.clock.now();
        let threshold = self.options.auto_indent_time_threshold;
        let delay = self.options.auto_refresh_time_delay;
        let (suppress, at_end, no_hint) = match self.prompt_mut() {
            Some(p) => {
                let suppress = p.paste_detector.note_insert(text, now, threshold);
                p.buf.insert(text);
                (
                    suppress,
                    p.buf.position() == p.buf.len(),
                    p.hint == Hint::Off,
                )
            }
            None => return Ok(Outcome::Ignore),
        };
        if let Some(suppress) = suppress {
            self.options.auto_indent_tmp_off = suppress;
        }
        // during a fast burst at end of buffer, paint just the character and
        // coalesce the real repaint
        if at_end && no_hint && !delay.is_zero() && text.chars().all(|c| c != '\n' && c != '\t') {
            self.term.write(text.as_bytes())?;
            self.term.flush()?;
            if let Some(tx) = self.deferred_tx.clone() {
                let handle = tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    let _ = tx.send(DeferredAction::Repaint);
                });
                if let Some(p) = self.prompt_mut() {
                    p.pending_repaint = Some(handle);
                }
            }
            return Ok(Outcome::Ok);
        }
        self.refresh()?;
        Ok(Outcome::Ok)
    }

    /// Swap point and mark, highlighting the region for
    /// `region_animation_duration` before the flash decays.
    fn edit_exchange_point_and_mark(&mut self) -> io::Result<Outcome> {
        let duration = self.options.region_animation_duration;
        let swapped = match self.prompt_mut() {
            Some(p) => match p.buf.mark() {
                Some(mark) => {
                    let pos = p.buf.position();
                    p.buf.set_mark_at(pos);
                    p.buf.set_position(mark);
                    p.region_active = RegionActive::Mark;
                    true
                }
                None => false,
            },
            None => false,
        };
        if !swapped {
            return self.beep_ignore();
        }
        self.refresh()?;
        if let (Some(tx), false) = (self.deferred_tx.clone(), duration.is_zero()) {
            tokio::spawn(async move {
                tokio::time::sleep(duration).await;
                let _ = tx.send(DeferredAction::Run(Box::new(
                    |m: &mut ModalInterface<T>| {
                        let faded = match m.prompt_mut() {
                            Some(p) if p.region_active == RegionActive::Mark => {
                                p.region_active = RegionActive::Off;
                                true
                            }
                            _ => false,
                        };
                        if faded {
                            let _ = m.refresh();
                        }
                    },
                )));
            });
        }
        Ok(Outcome::Ok)
    }

    fn edit_insert_newline(&mut self) -> io::Result<Outcome> {
        let auto_indent =
            self.options.auto_indent >= 0 && !self.options.auto_indent_tmp_off;
        let Some(p) = self.prompt_mut() else {
            return Ok(Outcome::Ignore);
        };
        if auto_indent {
            let pos = p.buf.position();
            let line_start = p.buf.begin_of_line(pos);
            let leading = p.buf.leading_whitespace(line_start);
            let column = pos - line_start;
            let indent = leading.min(column);
            let text = format!("\n{}", " ".repeat(indent));
            p.buf.insert(&text);
            p.indent = indent as i32;
        } else {
            p.buf.insert("\n");
            p.indent = 0;
        }
        self.refresh()?;
        Ok(Outcome::Ok)
    }

    fn edit_backspace(&mut self) -> io::Result<Outcome> {
        let align = self.options.backspace_align;
        let adjust = self.options.backspace_adjust;
        let changed = match self.prompt_mut() {
            Some(p) => {
                if let Some((lo, hi)) = p.active_region().filter(|(lo, hi)| lo < hi) {
                    p.buf.splice(lo, hi, "");
                    p.region_active = RegionActive::Off;
                    true
                } else {
                    let pos = p.buf.position();
                    if pos == 0 {
                        false
                    } else {
                        let line_start = p.buf.begin_of_line(pos);
                        let before = &p.buf.as_str()[line_start..pos];
                        if align && !before.is_empty() && before.chars().all(|c| c == ' ') {
                            // land the remaining indent on a multiple-of-four
                            // column
                            let col = pos - line_start;
                            let n = ((col - 1) % 4) + 1;
                            p.buf.splice(pos - n, pos, "");
                            if adjust {
                                // eat spaces to the right to keep the
                                // following text's relative column
                                let pos = p.buf.position();
                                let after = &p.buf.as_str()[pos..];
                                let avail =
                                    after.chars().take_while(|&c| c == ' ').count().min(n);
                                if avail > 0 {
                                    p.buf.splice(pos, pos + avail, "");
                                    p.buf.set_position(pos);
                                }
                            }
                            true
                        } else {
                            let lo = p.buf.char_left(pos);
                            p.buf.splice(lo, pos, "");
                            true
                        }
                    }
                }
            }
            None => false,
        };
        if changed {
            self.refresh()?;
            Ok(Outcome::Ok)
        } else {
            self.beep_ignore()
        }
    }

    fn edit_delete(&mut self) -> io::Result<Outcome> {
        let changed = match self.prompt_mut() {
            Some(p) => {
                let pos = p.buf.position();
                if pos < p.buf.len() {
                    let hi = p.buf.char_right(pos);
                    p.buf.splice(pos, hi, "");
                    true
                } else {
                    false
                }
            }
            None => false,
        };
        if changed {
            self.refresh()?;
            Ok(Outcome::Ok)
        } else {
            self.beep_ignore()
        }
    }

    fn edit_clear(&mut self) -> io::Result<Outcome> {
        let killed = match self.prompt_mut() {
            Some(p) if !p.buf.is_empty() => Some(p.buf.take()),
            _ => None,
        };
        match killed {
            Some(text) => {
                self.kill_ring.set_concat(false);
                self.kill_ring.push_kill(text, KillDirection::Forward);
                self.refresh()?;
                Ok(Outcome::Ok)
            }
            None => self.beep_ignore(),
        }
    }

    fn motion(&mut self, f: impl FnOnce(&mut EditBuffer) -> bool) -> io::Result<Outcome> {
        let moved = match self.prompt_mut() {
            Some(p) => f(&mut p.buf),
            None => false,
        };
        if moved {
            self.refresh()?;
            Ok(Outcome::Ok)
        } else {
            self.beep_ignore()
        }
    }

    fn buffer_edit(&mut self, f: impl FnOnce(&mut EditBuffer) -> bool) -> io::Result<Outcome> {
        let changed = match self.prompt_mut() {
            Some(p) => f(&mut p.buf),
            None => false,
        };
        if changed {
            self.refresh()?;
            Ok(Outcome::Ok)
        } else {
            self.beep_ignore()
        }
    }

    /// Shared kill plumbing: delete the range, feed the ring, repaint.
    /// Repeats of the same kill command merge into the tail entry.
    fn kill(
        &mut self,
        f: impl FnOnce(&EditBuffer) -> Option<(usize, usize, KillDirection)>,
    ) -> io::Result<Outcome> {
        let repeat = self.last_action == self.current_action;
        let killed = match self.prompt_mut() {
            Some(p) => match f(&p.buf) {
                Some((lo, hi, dir)) => {
                    let text = p.buf.splice(lo, hi, "");
                    Some((text, dir))
                }
                None => None,
            },
            None => None,
        };
        match killed {
            Some((text, dir)) => {
                self.kill_ring.set_concat(repeat);
                self.kill_ring.push_kill(text, dir);
                self.refresh()?;
                Ok(Outcome::Ok)
            }
            None => self.beep_ignore(),
        }
    }

    fn edit_indent(&mut self, indent: bool) -> io::Result<Outcome> {
        let unit = self.options.tabwidth.max(1);
        let changed = match self.prompt_mut() {
            Some(p) => {
                let (lo, hi) = p
                    .active_region()
                    .unwrap_or((p.buf.position(), p.buf.position()));
                // collect affected line starts, then splice bottom-up so
                // earlier offsets stay valid
                let mut starts = Vec::new();
                let mut line = p.buf.begin_of_line(lo);
                loop {
                    starts.push(line);
                    let eol = p.buf.end_of_line(line);
                    if eol >= hi || eol >= p.buf.len() {
                        break;
                    }
                    line = eol + 1;
                }
                if indent {
                    let pad = " ".repeat(unit);
                    for &start in starts.iter().rev() {
                        p.buf.splice_rigid(start, start, &pad);
                    }
                    true
                } else {
                    // refused outright if any line is too shallow
                    let deep_enough = starts.iter().all(|&start| {
                        p.buf.as_str()[start..]
                            .chars()
                            .take_while(|&c| c == ' ')
                            .count()
                            >= unit
                    });
                    if deep_enough {
                        for &start in starts.iter().rev() {
                            p.buf.splice(start, start + unit, "");
                        }
                        true
                    } else {
                        false
                    }
                }
            }
            None => false,
        };
        if changed {
            self.refresh()?;
            Ok(Outcome::Ok)
        } else {
            self.beep_ignore()
        }
    }

    fn history_move(
        &mut self,
        f: impl FnOnce(&mut dyn History, &mut EditBuffer) -> bool,
    ) -> io::Result<Outcome> {
        let key = self.current;
        let Self {
            ref mut modes,
            ref mut histories,
            ..
        } = *self;
        let moved = match (modes.get_mut(key), histories.get_mut(key)) {
            (Some(ModeState::Prompt(p)), Some(hist)) => f(hist.as_mut(), &mut p.buf),
            _ => false,
        };
        if moved {
            self.refresh()?;
            Ok(Outcome::Ok)
        } else {
            self.beep_ignore()
        }
    }

    // ------------------------------------------------------------------
    // Completion

    async fn complete_line(&mut self) -> io::Result<Outcome> {
        // a displayed hint completes directly when configured to
        if self.options.hint_tab_completes {
            let hint = match self.prompt_mut() {
                Some(p) => match &p.hint {
                    Hint::Show(h) => Some(h.clone()),
                    _ => None,
                },
                None => None,
            };
            if let Some(hint) = hint {
                if let Some(p) = self.prompt_mut() {
                    p.buf.insert(&hint);
                    p.hint = Hint::Off;
                }
                self.refresh()?;
                return Ok(Outcome::Ok);
            }
        }
        // tab over an active region indents instead
        let region_active = self
            .prompt_mut()
            .map(|p| p.active_region().filter(|(lo, hi)| lo < hi).is_some())
            .unwrap_or(false);
        if region_active {
            return self.edit_indent(true);
        }

        let Some((completer, line, position)) = self
            .completers
            .get(self.current)
            .cloned()
            .and_then(|c| {
                let p = self.modes[self.current].as_prompt()?;
                Some((c, p.buf.as_str().to_string(), p.buf.position()))
            })
        else {
            return self.beep_ignore();
        };

        // a misbehaving provider must not take the session down: restore
        // the pre-action state and keep the loop alive
        let completed = match AssertUnwindSafe(
            completer.complete_line(&line, position, &self.scope, false),
        )
        .catch_unwind()
        .await
        {
            Ok(completed) => completed,
            Err(_) => {
                warn!("completion provider panicked during tab completion");
                return self.beep_ignore();
            }
        };
        let range = completed.range.clone();
        if range.end > line.len() || range.start > range.end {
            warn!(
                start = range.start,
                end = range.end,
                "completion provider returned a bad replacement range"
            );
            return self.beep_ignore();
        }

        match completed.candidates.len() {
            0 => self.beep_ignore(),
            1 if completed.should_complete => {
                let text = completed.candidates[0].completion.clone();
                if let Some(p) = self.prompt_mut() {
                    p.buf.splice(range.start, range.end, &text);
                    p.buf.set_position(range.start + text.len());
                }
                self.refresh()?;
                Ok(Outcome::Ok)
            }
            _ => {
                let partial = &line[range.clone()];
                let prefix = common_prefix(&completed.candidates);
                if completed.should_complete && prefix.len() > partial.len() {
                    if let Some(p) = self.prompt_mut() {
                        p.buf.splice(range.start, range.end, &prefix);
                        p.buf.set_position(range.start + prefix.len());
                    }
                    self.refresh()?;
                    Ok(Outcome::Ok)
                } else if !completed.should_complete || self.key_repeats > 0 {
                    // no progress to be made: list the candidates under the
                    // prompt and repaint below them
                    let area = self.modes[self.current].area();
                    print_completions(&mut self.term, area, &completed.candidates)?;
                    self.modes[self.current].set_area(InputAreaState::default());
                    self.refresh()?;
                    Ok(Outcome::Ok)
                } else {
                    self.beep_ignore()
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Search plumbing

    fn run_search(&mut self, skip_current: bool) -> io::Result<Outcome> {
        let key = self.current;
        let Self {
            ref mut modes,
            ref mut histories,
            ..
        } = *self;
        let hit = match modes.get_mut(key) {
            Some(ModeState::Search(s)) => match histories.get_mut(s.parent) {
                Some(hist) => {
                    let query = s.query.as_str().to_string();
                    let hit = hist.search(&query, &mut s.response, s.backward, skip_current);
                    s.failed = !hit && !query.is_empty();
                    Some(hit)
                }
                None => None,
            },
            _ => None,
        };
        match hit {
            None => self.beep_ignore(),
            Some(hit) => {
                self.refresh()?;
                if !hit {
                    self.term.beep()?;
                    self.term.flush()?;
                }
                Ok(Outcome::Ok)
            }
        }
    }

    fn search_step(&mut self, backward: bool) -> io::Result<Outcome> {
        if let ModeState::Search(s) = &mut self.modes[self.current] {
            s.backward = backward;
        }
        self.run_search(true)
    }

    fn prefix_step(&mut self, backward: bool) -> io::Result<Outcome> {
        let key = self.current;
        let Self {
            ref mut modes,
            ref mut histories,
            ..
        } = *self;
        let stepped = match modes.get_mut(key) {
            Some(ModeState::PrefixSearch(p)) => match histories.get_mut(p.parent) {
                Some(hist) => {
                    if hist.prefix_search(&p.prefix, &mut p.response, backward) {
                        true
                    } else if !backward && p.response.as_str() != p.origin {
                        // walking forward past the newest match restores the
                        // line being edited at entry
                        let origin = p.origin.clone();
                        p.response.load(&origin);
                        true
                    } else {
                        false
                    }
                }
                None => false,
            },
            _ => false,
        };
        if stepped {
            self.refresh()?;
            Ok(Outcome::Ok)
        } else {
            self.beep_ignore()
        }
    }

    // ------------------------------------------------------------------
    // Session boundaries

    fn accept_line(&mut self) -> io::Result<Outcome> {
        let complete = {
            let Some(p) = self.prompt_mut() else {
                return Ok(Outcome::Ignore);
            };
            match &p.spec.on_enter {
                Some(on_enter) => on_enter(p.buf.as_str()),
                None => true,
            }
        };
        if !complete {
            // the continuation newline is an edit like any other
            if let Some(p) = self.prompt_mut() {
                p.undo.push(UndoRecord::of(&p.buf));
            }
            return self.edit_insert_newline();
        }
        if let Some(p) = self.prompt_mut() {
            p.region_active = RegionActive::Off;
            p.hint = Hint::Off;
            let end = p.buf.len();
            p.buf.set_position(end);
        }
        self.finish_area()?;
        Ok(Outcome::Done)
    }

    /// Repaint with the cursor at the end and step below the input area, so
    /// whatever the outer REPL prints next starts on a fresh line.
    fn finish_area(&mut self) -> io::Result<()> {
        self.refresh()?;
        let area = self.modes[self.current].area();
        self.term.cmove_down(area.num_rows.saturating_sub(area.curs_row))?;
        self.term.write(b"\r\n")?;
        self.term.flush()?;
        self.modes[self.current].set_area(InputAreaState::default());
        Ok(())
    }

    /// Append a committed line to the home prompt's history provider.
    pub fn add_history(&mut self, entry: &str) {
        let home = self.home_prompt();
        if let Some(hist) = self.histories.get_mut(home) {
            hist.add(entry);
        }
    }

    /// The home prompt's completion callback, if any.
    pub fn home_on_done(&self) -> Option<crate::mode::OnDone> {
        let home = self.home_prompt();
        match &self.modes[home] {
            ModeState::Prompt(p) => p.spec.on_done.clone(),
            _ => None,
        }
    }

    /// Return to the home prompt with a fresh line, ready for the next
    /// `run_interface` call.
    pub fn reset_after_session(&mut self) {
        let home = self.home_prompt();
        self.current = home;
        if let Some(ModeState::Prompt(p)) = self.modes.get_mut(home) {
            p.reset_line();
        }
        self.previous_key.clear();
        self.key_repeats = 0;
        self.last_action = "";
        self.yank_range = None;
        if let Some(hist) = self.histories.get_mut(home) {
            hist.reset();
        }
    }

    /// Insert a processed bracketed-paste payload as a single edit.
    pub fn insert_paste(&mut self, payload: &str) -> io::Result<()> {
        let text = if self.options.auto_indent_bracketed_paste {
            crate::paste::process_bracketed_paste(payload, self.options.tabwidth)
        } else {
            payload.to_string()
        };
        if let Some(p) = self.prompt_mut() {
            p.undo.push(UndoRecord::of(&p.buf));
            p.buf.insert(&text);
        }
        self.refresh()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::complete::{Completed, Completion};
    use crate::mode::default_prompt_keymap;
    use crate::term::TestTerm;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;
    use std::time::Duration;

    /// Clock whose reading the test advances by hand.
    #[derive(Clone, Default)]
    struct StepClock(Arc<StdMutex<Duration>>);

    impl Clock for StepClock {
        fn now(&self) -> Duration {
            *self.0.lock().unwrap()
        }
    }

    impl StepClock {
        fn advance_to(&self, ms: u64) {
            *self.0.lock().unwrap() = Duration::from_millis(ms);
        }
    }

    fn modal() -> ModalInterface<TestTerm> {
        let term = TestTerm::new(80, 24);
        let mut m = ModalInterface::new(term, EditorOptions::default());
        m.add_prompt(PromptSpec::new("> ", Arc::new(default_prompt_keymap())));
        m
    }

    async fn run(m: &mut ModalInterface<TestTerm>, action: Action) -> Outcome {
        let matched: Vec<char> = match &action {
            Action::Complete => vec!['\t'],
            _ => vec!['\u{0}'],
        };
        m.dispatch(&action, &matched).await.unwrap()
    }

    async fn type_str(m: &mut ModalInterface<TestTerm>, s: &str) {
        for c in s.chars() {
            m.dispatch(&Action::SelfInsert, &[c]).await.unwrap();
        }
    }

    fn buffer(m: &ModalInterface<TestTerm>) -> String {
        m.current_line()
    }

    #[tokio::test]
    async fn test_auto_indent_copies_leading_whitespace() {
        let mut m = modal();
        type_str(&mut m, "    x").await;
        run(&mut m, Action::InsertNewline).await;
        assert_eq!(buffer(&m), "    x\n    ");
    }

    #[tokio::test]
    async fn test_paste_speed_typing_suppresses_indent() {
        let mut m = modal();
        let clock = StepClock::default();
        m.set_clock(Box::new(clock.clone()));

        clock.advance_to(0);
        type_str(&mut m, "  a").await;
        clock.advance_to(10); // within the 50ms threshold
        type_str(&mut m, "b").await;
        run(&mut m, Action::InsertNewline).await;
        assert_eq!(buffer(&m), "  ab\n");
        assert!(m.options.auto_indent_tmp_off);

        // a later slow insertion clears the flag again
        clock.advance_to(500);
        type_str(&mut m, "c").await;
        assert!(!m.options.auto_indent_tmp_off);
    }

    #[tokio::test]
    async fn test_kill_chain_and_yank_pop_wrap() {
        let mut m = modal();
        for word in ["one", "two", "three"] {
            type_str(&mut m, word).await;
            run(&mut m, Action::KillLineBackward).await;
        }
        assert_eq!(m.kill_ring.len(), 3);

        run(&mut m, Action::Yank).await;
        assert_eq!(buffer(&m), "three");
        run(&mut m, Action::YankPop).await;
        assert_eq!(buffer(&m), "two");
        run(&mut m, Action::YankPop).await;
        assert_eq!(buffer(&m), "one");
        run(&mut m, Action::YankPop).await;
        assert_eq!(buffer(&m), "three");
    }

    #[tokio::test]
    async fn test_yank_pop_illegal_without_preceding_yank() {
        let mut m = modal();
        type_str(&mut m, "zap").await;
        run(&mut m, Action::KillLineBackward).await;
        let outcome = run(&mut m, Action::YankPop).await;
        assert_eq!(outcome, Outcome::Ignore);
        assert_eq!(buffer(&m), "");
    }

    #[tokio::test]
    async fn test_repeated_kills_merge_directionally() {
        let mut m = modal();
        type_str(&mut m, "aa bb cc").await;
        run(&mut m, Action::KillWordLeft).await;
        run(&mut m, Action::KillWordLeft).await;
        run(&mut m, Action::Yank).await;
        // backward kills prepend: the merged entry reads left to right
        assert_eq!(buffer(&m), "aa bb cc");
        assert_eq!(m.kill_ring.len(), 1);
    }

    #[tokio::test]
    async fn test_shift_motion_activates_region_and_plain_motion_drops_it() {
        let mut m = modal();
        type_str(&mut m, "abc").await;
        run(&mut m, Action::ShiftMoveLeft).await;
        {
            let p = m.modes[m.current].as_prompt().unwrap();
            assert_eq!(p.region_active, RegionActive::Shift);
            assert_eq!(p.active_region(), Some((2, 3)));
        }
        run(&mut m, Action::MoveLeft).await;
        let p = m.modes[m.current].as_prompt().unwrap();
        assert_eq!(p.region_active, RegionActive::Off);
    }

    #[tokio::test]
    async fn test_mark_region_survives_plain_motion() {
        let mut m = modal();
        type_str(&mut m, "abc").await;
        // double set-mark activates the region
        run(&mut m, Action::SetMark).await;
        run(&mut m, Action::SetMark).await;
        run(&mut m, Action::MoveLeft).await;
        let p = m.modes[m.current].as_prompt().unwrap();
        assert_eq!(p.region_active, RegionActive::Mark);
        assert_eq!(p.active_region(), Some((2, 3)));
    }

    #[tokio::test]
    async fn test_single_set_mark_leaves_region_inactive() {
        let mut m = modal();
        type_str(&mut m, "abc").await;
        run(&mut m, Action::SetMark).await;
        let p = m.modes[m.current].as_prompt().unwrap();
        assert_eq!(p.region_active, RegionActive::Off);
        assert_eq!(p.buf.mark(), Some(3));
    }

    #[tokio::test]
    async fn test_repeated_set_mark_activates_region() {
        let mut m = modal();
        type_str(&mut m, "abc").await;
        run(&mut m, Action::SetMark).await;
        {
            let p = m.modes[m.current].as_prompt().unwrap();
            assert_eq!(p.region_active, RegionActive::Off);
        }
        // the contiguous repeat is the consumer of key_repeats here:
        // the region comes alive so motion will extend it
        run(&mut m, Action::SetMark).await;
        {
            let p = m.modes[m.current].as_prompt().unwrap();
            assert_eq!(p.region_active, RegionActive::Mark);
        }
        run(&mut m, Action::MoveWordLeft).await;
        let p = m.modes[m.current].as_prompt().unwrap();
        assert_eq!(p.active_region(), Some((0, 3)));
    }

    #[tokio::test]
    async fn test_set_mark_idempotent() {
        let mut m = modal();
        type_str(&mut m, "ab").await;
        run(&mut m, Action::SetMark).await;
        run(&mut m, Action::SetMark).await;
        let p = m.modes[m.current].as_prompt().unwrap();
        assert_eq!(p.buf.mark(), Some(p.buf.position()));
    }

    #[tokio::test]
    async fn test_exchange_mark_swaps_and_highlights() {
        let mut m = modal();
        type_str(&mut m, "abcd").await;
        run(&mut m, Action::SetMark).await;
        run(&mut m, Action::MoveInputStart).await;
        run(&mut m, Action::ExchangeMark).await;
        let p = m.modes[m.current].as_prompt().unwrap();
        assert_eq!(p.buf.position(), 4);
        assert_eq!(p.buf.mark(), Some(0));
        assert_eq!(p.region_active, RegionActive::Mark);
        assert_eq!(p.active_region(), Some((0, 4)));
    }

    #[tokio::test]
    async fn test_exchange_mark_without_mark_beeps() {
        let mut m = modal();
        type_str(&mut m, "ab").await;
        let outcome = run(&mut m, Action::ExchangeMark).await;
        assert_eq!(outcome, Outcome::Ignore);
    }

    #[tokio::test]
    async fn test_exchange_mark_highlight_fades() {
        use crate::interface::{prepare, run_interface};
        // C-SPC, to start, C-x C-x, then typed text once the flash fades
        let term = TestTerm::with_input(80, 24, "abcd\x00\x01\x18\x18zz\r");
        let out = term.out.clone();
        let mut m = ModalInterface::new(term, EditorOptions::default());
        m.add_prompt(PromptSpec::new("> ", Arc::new(default_prompt_keymap())));
        let (shared, mut reader) = prepare(m);
        let result = run_interface(&shared, &mut reader).await.unwrap();
        assert_eq!(result.line, "abcdzz");
        // the swap painted the region in reverse video
        assert!(out.as_string().contains("\x1b[7mabcd\x1b[27m"));
        // and the deferred fade finds the region already dropped by the
        // later keystrokes, leaving the session consistent
        tokio::time::sleep(std::time::Duration::from_millis(250)).await;
        let p = shared.modal.lock().await;
        assert_eq!(p.current_line(), "");
    }

    #[tokio::test]
    async fn test_kill_region_and_copy_region() {
        let mut m = modal();
        type_str(&mut m, "hello world").await;
        run(&mut m, Action::MoveWordLeft).await;
        run(&mut m, Action::SetMark).await;
        run(&mut m, Action::MoveLineEnd).await;
        run(&mut m, Action::CopyRegion).await;
        assert_eq!(buffer(&m), "hello world");
        run(&mut m, Action::KillRegion).await;
        assert_eq!(buffer(&m), "hello ");
        run(&mut m, Action::Yank).await;
        assert_eq!(buffer(&m), "hello world");
    }

    #[tokio::test]
    async fn test_backspace_align_lands_on_tab_stop() {
        let mut m = modal();
        type_str(&mut m, "      ").await; // six spaces
        run(&mut m, Action::Backspace).await;
        assert_eq!(buffer(&m), "    ");
        run(&mut m, Action::Backspace).await;
        assert_eq!(buffer(&m), "");
    }

    #[tokio::test]
    async fn test_backspace_adjust_eats_right_hand_spaces() {
        let mut m = modal();
        type_str(&mut m, "        x").await;
        // cursor back to column 4, inside the indent
        for _ in 0..5 {
            run(&mut m, Action::MoveLeft).await;
        }
        run(&mut m, Action::Backspace).await;
        // four spaces deleted on the left, and up to four eaten on the right
        assert_eq!(buffer(&m), "x");
    }

    #[tokio::test]
    async fn test_indent_and_outdent_region() {
        let mut m = modal();
        type_str(&mut m, "a").await;
        run(&mut m, Action::InsertNewline).await;
        type_str(&mut m, "b").await;
        run(&mut m, Action::MoveInputStart).await;
        run(&mut m, Action::SetMark).await;
        run(&mut m, Action::SetMark).await;
        run(&mut m, Action::MoveInputEnd).await;
        run(&mut m, Action::IndentRegion).await;
        assert_eq!(buffer(&m), "    a\n    b");
        run(&mut m, Action::OutdentRegion).await;
        assert_eq!(buffer(&m), "a\nb");
    }

    #[tokio::test]
    async fn test_outdent_refused_when_a_line_is_shallow() {
        let mut m = modal();
        type_str(&mut m, "    a").await;
        run(&mut m, Action::InsertNewline).await;
        // the auto-indent gave line two four spaces; remove them
        run(&mut m, Action::Backspace).await;
        type_str(&mut m, "b").await;
        run(&mut m, Action::MoveInputStart).await;
        run(&mut m, Action::SetMark).await;
        run(&mut m, Action::SetMark).await;
        run(&mut m, Action::MoveInputEnd).await;
        let outcome = run(&mut m, Action::OutdentRegion).await;
        assert_eq!(outcome, Outcome::Ignore);
        assert_eq!(buffer(&m), "    a\nb");
    }

    #[tokio::test]
    async fn test_undo_redo_round_trip() {
        let mut m = modal();
        type_str(&mut m, "hello").await;
        run(&mut m, Action::KillLineBackward).await;
        type_str(&mut m, "bye").await;

        run(&mut m, Action::Undo).await;
        assert_eq!(buffer(&m), "");
        run(&mut m, Action::Undo).await;
        assert_eq!(buffer(&m), "hello");
        run(&mut m, Action::Redo).await;
        assert_eq!(buffer(&m), "");
        run(&mut m, Action::Redo).await;
        assert_eq!(buffer(&m), "bye");
    }

    #[tokio::test]
    async fn test_redo_illegal_after_other_action() {
        let mut m = modal();
        type_str(&mut m, "abc").await;
        run(&mut m, Action::Undo).await;
        run(&mut m, Action::MoveLineEnd).await;
        let outcome = run(&mut m, Action::Redo).await;
        assert_eq!(outcome, Outcome::Ignore);
    }

    #[tokio::test]
    async fn test_failed_action_leaves_no_undo_entry() {
        let mut m = modal();
        let outcome = run(&mut m, Action::Delete).await; // empty buffer
        assert_eq!(outcome, Outcome::Ignore);
        let outcome = run(&mut m, Action::Undo).await;
        assert_eq!(outcome, Outcome::Ignore);
    }

    #[tokio::test]
    async fn test_transpose_dispatch() {
        let mut m = modal();
        type_str(&mut m, "ba").await;
        run(&mut m, Action::TransposeChars).await;
        assert_eq!(buffer(&m), "ab");
    }

    struct ListCompleter;

    #[async_trait]
    impl Completer for ListCompleter {
        async fn complete_line(
            &self,
            _line: &str,
            position: usize,
            _scope: &str,
            _hint: bool,
        ) -> Completed {
            Completed {
                candidates: vec![Completion::simple("alpha"), Completion::simple("beta")],
                range: position..position,
                should_complete: true,
            }
        }
    }

    #[tokio::test]
    async fn test_second_tab_lists_candidates() {
        let mut m = modal();
        let key = m.current_mode();
        m.set_completer(key, Arc::new(ListCompleter));
        // no shared prefix, so the first tab makes no progress
        let first = run(&mut m, Action::Complete).await;
        assert_eq!(first, Outcome::Ignore);
        assert!(!m.term.out.as_string().contains("alpha"));
        let second = run(&mut m, Action::Complete).await;
        assert_eq!(second, Outcome::Ok);
        let out = m.term.out.as_string();
        assert!(out.contains("alpha"));
        assert!(out.contains("beta"));
    }

    #[tokio::test]
    async fn test_invariants_hold_after_dispatch_storm() {
        let mut m = modal();
        let actions = [
            Action::SelfInsert,
            Action::InsertNewline,
            Action::Backspace,
            Action::MoveLeft,
            Action::KillLine,
            Action::Yank,
            Action::SetMark,
            Action::MoveWordRight,
            Action::KillRegion,
            Action::Undo,
            Action::TransposeChars,
        ];
        for round in 0..30 {
            let action = actions[round % actions.len()].clone();
            let _ = m.dispatch(&action, &['x']).await.unwrap();
            let p = m.modes[m.current].as_prompt().unwrap();
            assert!(p.buf.position() <= p.buf.len());
            if let Some(mark) = p.buf.mark() {
                assert!(mark <= p.buf.len());
            }
            assert!(p.undo.index() >= 1);
            assert!(p.undo.index() <= p.undo.depth() + 1);
            assert!(m.kill_ring.len() <= m.options.kill_ring_max);
        }
    }
}

