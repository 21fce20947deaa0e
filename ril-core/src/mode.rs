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

//! Input modes and their per-mode state.
//!
//! Three modes cooperate over one terminal: the prompt itself, incremental
//! history search, and prefix-anchored history search. Each owns its
//! buffer, its painted-area record, and its keymap; the modal interface
//! routes keystrokes to whichever is current and brokers transitions.

use crate::actions::Action;
use crate::edit_buffer::EditBuffer;
use crate::keymap::{Keymap, KeymapLayer};
use crate::paste::PasteDetector;
use crate::render::{Hint, InputAreaState};
use crate::undo::UndoStack;
use crate::ModeKey;
use std::sync::Arc;

/// Whether a region is live, and what activated it. Shift-activated
/// regions die on the next plain command; mark-activated regions survive
/// plain motion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RegionActive {
    #[default]
    Off,
    Shift,
    Mark,
}

/// Prompt text, fixed or recomputed every repaint.
#[derive(Clone)]
pub enum PromptText {
    Static(String),
    Dynamic(Arc<dyn Fn() -> String + Send + Sync>),
}

impl PromptText {
    pub fn text(&self) -> String {
        match self {
            PromptText::Static(s) => s.clone(),
            PromptText::Dynamic(f) => f(),
        }
    }
}

impl std::fmt::Debug for PromptText {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PromptText::Static(s) => f.debug_tuple("Static").field(s).finish(),
            PromptText::Dynamic(_) => f.debug_tuple("Dynamic").finish(),
        }
    }
}

pub type OnEnter = Arc<dyn Fn(&str) -> bool + Send + Sync>;
pub type OnDone = Arc<dyn Fn(&str, bool) + Send + Sync>;

/// Everything the outer REPL configures about a prompt mode.
#[derive(Clone)]
pub struct PromptSpec {
    pub prompt: PromptText,
    /// Written before the prompt, typically color escapes.
    pub prompt_prefix: String,
    /// Written after the prompt, typically a color reset.
    pub prompt_suffix: String,
    /// Prefix the outer loop prints before results; carried for it.
    pub output_prefix: String,
    pub output_prefix_prefix: String,
    pub output_prefix_suffix: String,
    pub keymap: Arc<Keymap>,
    /// Decides whether Enter commits the line or inserts a newline.
    /// `None` always commits.
    pub on_enter: Option<OnEnter>,
    /// Invoked once per session with the line and whether it was accepted.
    pub on_done: Option<OnDone>,
    /// The mode stays current after a commit instead of resetting.
    pub sticky: bool,
}

impl PromptSpec {
    pub fn new(prompt: impl Into<String>, keymap: Arc<Keymap>) -> Self {
        PromptSpec {
            prompt: PromptText::Static(prompt.into()),
            prompt_prefix: String::new(),
            prompt_suffix: String::new(),
            output_prefix: String::new(),
            output_prefix_prefix: String::new(),
            output_prefix_suffix: String::new(),
            keymap,
            on_enter: None,
            on_done: None,
            sticky: false,
        }
    }
}

/// Per-prompt mutable state.
pub struct PromptState {
    pub spec: PromptSpec,
    pub buf: EditBuffer,
    pub region_active: RegionActive,
    pub hint: Hint,
    pub undo: UndoStack,
    pub area: InputAreaState,
    /// Column auto-indent last used, -1 when unknown.
    pub indent: i32,
    pub beep_level: u8,
    pub paste_detector: PasteDetector,
    /// A scheduled coalesced repaint; the next action cancels it.
    pub pending_repaint: Option<tokio::task::JoinHandle<()>>,
}

impl PromptState {
    pub fn new(spec: PromptSpec) -> Self {
        PromptState {
            spec,
            buf: EditBuffer::new(),
            region_active: RegionActive::Off,
            hint: Hint::Off,
            undo: UndoStack::new(),
            area: InputAreaState::default(),
            indent: -1,
            beep_level: 0,
            paste_detector: PasteDetector::new(),
            pending_repaint: None,
        }
    }

    /// The ordered region when one is active.
    pub fn active_region(&self) -> Option<(usize, usize)> {
        match self.region_active {
            RegionActive::Off => None,
            _ => self.buf.region(),
        }
    }

    /// Reset per-line state after a commit or abort.
    pub fn reset_line(&mut self) {
        self.buf = EditBuffer::new();
        self.region_active = RegionActive::Off;
        self.hint = Hint::Off;
        self.undo.clear();
        self.area = InputAreaState::default();
        self.indent = -1;
        self.paste_detector.reset();
    }
}

/// Incremental history search state.
pub struct SearchState {
    pub query: EditBuffer,
    pub response: EditBuffer,
    pub backward: bool,
    pub failed: bool,
    pub parent: ModeKey,
    pub area: InputAreaState,
    pub keymap: Arc<Keymap>,
}

impl SearchState {
    pub fn new(parent: ModeKey, backward: bool, keymap: Arc<Keymap>) -> Self {
        SearchState {
            query: EditBuffer::new(),
            response: EditBuffer::new(),
            backward,
            failed: false,
            parent,
            area: InputAreaState::default(),
            keymap,
        }
    }

    /// The search prompt, in the classic readline form.
    pub fn prompt(&self) -> String {
        let dir = if self.backward {
            "reverse-i-search"
        } else {
            "i-search"
        };
        let failed = if self.failed { "failed " } else { "" };
        format!("({failed}{dir})`{}': ", self.query.as_str())
    }
}

/// Prefix-anchored history search state.
pub struct PrefixSearchState {
    /// Buffer content up to the cursor at entry.
    pub prefix: String,
    /// The full line at entry, restored when walking past the newest match.
    pub origin: String,
    pub response: EditBuffer,
    pub parent: ModeKey,
    pub area: InputAreaState,
    pub keymap: Arc<Keymap>,
}

impl PrefixSearchState {
    pub fn new(parent: ModeKey, keymap: Arc<Keymap>) -> Self {
        PrefixSearchState {
            prefix: String::new(),
            origin: String::new(),
            response: EditBuffer::new(),
            parent,
            area: InputAreaState::default(),
            keymap,
        }
    }
}

pub enum ModeState {
    Prompt(PromptState),
    Search(SearchState),
    PrefixSearch(PrefixSearchState),
}

impl ModeState {
    pub fn keymap(&self) -> Arc<Keymap> {
        match self {
            ModeState::Prompt(p) => p.spec.keymap.clone(),
            ModeState::Search(s) => s.keymap.clone(),
            ModeState::PrefixSearch(p) => p.keymap.clone(),
        }
    }

    pub fn area(&self) -> InputAreaState {
        match self {
            ModeState::Prompt(p) => p.area,
            ModeState::Search(s) => s.area,
            ModeState::PrefixSearch(p) => p.area,
        }
    }

    pub fn set_area(&mut self, area: InputAreaState) {
        match self {
            ModeState::Prompt(p) => p.area = area,
            ModeState::Search(s) => s.area = area,
            ModeState::PrefixSearch(p) => p.area = area,
        }
    }

    pub fn as_prompt(&self) -> Option<&PromptState> {
        match self {
            ModeState::Prompt(p) => Some(p),
            _ => None,
        }
    }

    pub fn as_prompt_mut(&mut self) -> Option<&mut PromptState> {
        match self {
            ModeState::Prompt(p) => Some(p),
            _ => None,
        }
    }
}

/// The emacs-flavored default binding layer for prompt modes. Callers
/// stack their own layers on top via [`Keymap::compile`].
pub fn default_prompt_layer() -> KeymapLayer {
    KeymapLayer::new()
        // committing
        .run("\r", Action::AcceptLine)
        .redirect("\n", "\r")
        // plain typing
        .run("*", Action::SelfInsert)
        // char and word motion
        .run("\x1b[D", Action::MoveLeft)
        .run("\x1b[C", Action::MoveRight)
        .run("\x1b[A", Action::MoveUp)
        .run("\x1b[B", Action::MoveDown)
        .run("^B", Action::MoveLeft)
        .run("^F", Action::MoveRight)
        .run("\\M-b", Action::MoveWordLeft)
        .run("\\M-f", Action::MoveWordRight)
        .run("\x1b[1;5D", Action::MoveWordLeft)
        .run("\x1b[1;5C", Action::MoveWordRight)
        .run("^A", Action::MoveLineStart)
        .run("^E", Action::MoveLineEnd)
        .run("\x1b[H", Action::MoveLineStart)
        .run("\x1b[F", Action::MoveLineEnd)
        .redirect("\x1b[1~", "\x1b[H")
        .redirect("\x1b[4~", "\x1b[F")
        .run("\\M-<", Action::MoveInputStart)
        .run("\\M->", Action::MoveInputEnd)
        // shift motion activates the region
        .run("\x1b[1;2D", Action::ShiftMoveLeft)
        .run("\x1b[1;2C", Action::ShiftMoveRight)
        .run("\x1b[1;2A", Action::ShiftMoveUp)
        .run("\x1b[1;2B", Action::ShiftMoveDown)
        .run("\x1b[1;6D", Action::ShiftMoveWordLeft)
        .run("\x1b[1;6C", Action::ShiftMoveWordRight)
        .run("\x1b[1;2H", Action::ShiftMoveLineStart)
        .run("\x1b[1;2F", Action::ShiftMoveLineEnd)
        // deletion and killing
        .run("\x7f", Action::Backspace)
        .run("^H", Action::Backspace)
        .run("\x1b[3~", Action::Delete)
        .run("^D", Action::DeleteOrEof)
        .run("^K", Action::KillLine)
        .run("^U", Action::KillLineBackward)
        .run("^W", Action::Werase)
        .run("\\M-d", Action::KillWordRight)
        .run("\x1b\x7f", Action::KillWordLeft)
        // mark, region, yank
        .run("\x00", Action::SetMark) // C-SPC
        .run("^X^X", Action::ExchangeMark)
        .run("\\M-w", Action::CopyRegion)
        .run("\\M-W", Action::KillRegion)
        .run("^Y", Action::Yank)
        .run("\\M-y", Action::YankPop)
        // reordering and case
        .run("^T", Action::TransposeChars)
        .run("\\M-t", Action::TransposeWords)
        .run("\x1b[1;3A", Action::TransposeLinesUp)
        .run("\x1b[1;3B", Action::TransposeLinesDown)
        .run("\\M-u", Action::UppercaseWord)
        .run("\\M-l", Action::LowercaseWord)
        .run("\\M-c", Action::TitlecaseWord)
        .run("\x1b[Z", Action::OutdentRegion) // shift-tab
        // undo, history, search, completion
        .run("^_", Action::Undo)
        .run("\\M-_", Action::Redo)
        .run("^P", Action::HistoryPrev)
        .run("^N", Action::HistoryNext)
        .run("\x1b[5~", Action::HistoryPrev)
        .run("\x1b[6~", Action::HistoryNext)
        .run("^R", Action::SearchBackward)
        .run("^S", Action::SearchForward)
        .run("\t", Action::Complete)
        // session control
        .run("^C", Action::Interrupt)
        .run("^Z", Action::Suspend)
        .run("^L", Action::Clear)
        .bind(crate::paste::PASTE_BEGIN, crate::keymap::KeySpec::Run(Action::BracketedPaste))
}

/// Unrecognized escape sequences are swallowed instead of self-inserting
/// garbage. Application-mode arrows alias to their CSI forms lazily, so
/// they pick up any rebinding of the arrows.
pub fn escape_layer() -> KeymapLayer {
    let mut layer = KeymapLayer::new()
        .alias("\x1bOA", "\x1b[A")
        .alias("\x1bOB", "\x1b[B")
        .alias("\x1bOC", "\x1b[C")
        .alias("\x1bOD", "\x1b[D")
        .alias("\x1bOH", "\x1b[H")
        .alias("\x1bOF", "\x1b[F")
        .ignore("\x1b*")
        .ignore("\x1b[*");
    for n in 1..=8 {
        layer = layer.ignore(&format!("\x1b[{n}*"));
        layer = layer.ignore(&format!("\x1b[{n};*"));
        for m in 2..=8 {
            layer = layer.ignore(&format!("\x1b[{n};{m}*"));
        }
    }
    // unbound control bytes are swallowed rather than self-inserted; ^X is
    // a chord prefix, so its continuations are swallowed instead
    for b in 0u8..0x20 {
        if b != 0x1b && b != 0x18 {
            layer = layer.ignore(&(b as char).to_string());
        }
    }
    layer = layer.ignore("\x18*");
    layer = layer.ignore("\x7f");
    layer
}

/// The stock prompt keymap: defaults plus the escape fallbacks.
pub fn default_prompt_keymap() -> Keymap {
    Keymap::compile(&[default_prompt_layer(), escape_layer()])
        .expect("default prompt keymap compiles")
}

/// Keymap for incremental history search. Printable keys grow the query;
/// motion accepts the match and replays in the parent.
pub fn search_keymap() -> Keymap {
    let accept_replay = [
        "\x1b[A", "\x1b[B", "\x1b[C", "\x1b[D", "\x1b[H", "\x1b[F", "^A", "^E", "^B", "^F", "^P",
        "^N", "^K", "^Y", "^T", "^D", "\t",
    ];
    let mut layer = KeymapLayer::new()
        .run("*", Action::SearchSelfInsert)
        .run("^R", Action::SearchBackward)
        .run("^S", Action::SearchForward)
        .run("\r", Action::SearchAccept)
        .redirect("\n", "\r")
        .run("\x7f", Action::SearchBackspace)
        .run("^H", Action::SearchBackspace)
        .run("^G", Action::SearchCancel)
        .run("^C", Action::SearchCancel)
        .run("\x1b\x1b", Action::SearchCancel);
    for key in accept_replay {
        layer = layer.run(key, Action::SearchAcceptReplay);
    }
    Keymap::compile(&[layer, escape_layer()]).expect("search keymap compiles")
}

/// Keymap for prefix history search: arrows walk matches, anything else
/// falls through to the parent after accepting.
pub fn prefix_search_keymap() -> Keymap {
    let layer = KeymapLayer::new()
        .run("\x1b[A", Action::PrefixSearchPrev)
        .run("\x1b[B", Action::PrefixSearchNext)
        .run("^P", Action::PrefixSearchPrev)
        .run("^N", Action::PrefixSearchNext)
        .run("*", Action::PrefixAcceptReplay);
    Keymap::compile(&[layer]).expect("prefix search keymap compiles")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keymap::{Leaf, Traverse};

    fn resolve(km: &Keymap, chars: &[char]) -> Option<Action> {
        match km.traverse(chars) {
            Traverse::Match(Leaf::Run(a)) => Some(a.clone()),
            _ => None,
        }
    }

    #[test]
    fn test_default_keymap_compiles_and_binds() {
        let km = default_prompt_keymap();
        assert_eq!(resolve(&km, &['q']), Some(Action::SelfInsert));
        assert_eq!(resolve(&km, &['\r']), Some(Action::AcceptLine));
        // "\n" redirected to "\r"
        assert_eq!(resolve(&km, &['\n']), Some(Action::AcceptLine));
        assert_eq!(resolve(&km, &['\x1b', '[', 'A']), Some(Action::MoveUp));
        assert_eq!(resolve(&km, &['\x12']), Some(Action::SearchBackward));
    }

    #[test]
    fn test_unknown_escape_sequences_are_ignored() {
        let km = default_prompt_keymap();
        assert_eq!(
            km.traverse(&['\x1b', '[', '9']),
            Traverse::Match(&Leaf::Ignore)
        );
        assert_eq!(km.traverse(&['\x1b', 'q']), Traverse::Match(&Leaf::Ignore));
        // a modified key we do not bind: ignored, not self-inserted
        assert_eq!(
            km.traverse(&['\x1b', '[', '1', ';', '7', 'D']),
            Traverse::Match(&Leaf::Ignore)
        );
    }

    #[test]
    fn test_exchange_mark_chord() {
        let km = default_prompt_keymap();
        assert_eq!(km.traverse(&['\x18']), Traverse::Pending);
        assert_eq!(
            resolve(&km, &['\x18', '\x18']),
            Some(Action::ExchangeMark)
        );
        // other ^X continuations are swallowed, not self-inserted
        assert_eq!(km.traverse(&['\x18', 'q']), Traverse::Match(&Leaf::Ignore));
    }

    #[test]
    fn test_application_mode_arrows_alias_csi() {
        let km = default_prompt_keymap();
        match km.traverse(&['\x1b', 'O', 'A']) {
            Traverse::Match(Leaf::Alias(chars)) => {
                assert_eq!(chars, &vec!['\x1b', '[', 'A'])
            }
            other => panic!("expected alias, got {other:?}"),
        }
    }

    #[test]
    fn test_search_prompt_format() {
        let km = Arc::new(search_keymap());
        let mut s = SearchState::new(ModeKey::default(), true, km);
        s.query.load("foo");
        assert_eq!(s.prompt(), "(reverse-i-search)`foo': ");
        s.failed = true;
        s.backward = false;
        assert_eq!(s.prompt(), "(failed i-search)`foo': ");
    }

    #[test]
    fn test_prompt_state_reset() {
        let spec = PromptSpec::new("> ", Arc::new(default_prompt_keymap()));
        let mut state = PromptState::new(spec);
        state.buf.insert("abc");
        state.buf.set_mark();
        state.region_active = RegionActive::Mark;
        state.hint = Hint::Show("x".into());
        state.reset_line();
        assert!(state.buf.is_empty());
        assert_eq!(state.region_active, RegionActive::Off);
        assert_eq!(state.hint, Hint::Off);
        assert!(!state.undo.can_undo());
    }
}
