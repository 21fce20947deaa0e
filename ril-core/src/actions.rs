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

//! The editing commands a keymap can bind, and the outcomes they produce.
//!
//! Keymap leaves carry these as plain data; the modal interface interprets
//! them against the current mode's state. Action names are stable symbols:
//! the dispatcher keys repeat detection and the `shift_` region rule off
//! them, and they show up in logs.

/// Every command the editor knows, across all modes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    // Plain insertion and structural edits
    SelfInsert,
    InsertNewline,
    Backspace,
    Delete,
    /// C-d: delete forward, or end the session on an empty buffer.
    DeleteOrEof,
    Clear,

    // Motion
    MoveLeft,
    MoveRight,
    MoveUp,
    MoveDown,
    MoveWordLeft,
    MoveWordRight,
    MoveLineStart,
    MoveLineEnd,
    MoveInputStart,
    MoveInputEnd,

    // Shift-modified motion: activates the region before moving
    ShiftMoveLeft,
    ShiftMoveRight,
    ShiftMoveUp,
    ShiftMoveDown,
    ShiftMoveWordLeft,
    ShiftMoveWordRight,
    ShiftMoveLineStart,
    ShiftMoveLineEnd,

    // Mark, region, kill ring
    SetMark,
    /// Swap point and mark, flashing the region.
    ExchangeMark,
    KillLine,
    KillLineBackward,
    KillWordLeft,
    KillWordRight,
    /// Backward word kill with whitespace-only delimiters.
    Werase,
    KillRegion,
    CopyRegion,
    Yank,
    YankPop,

    // Reordering and case
    TransposeChars,
    TransposeWords,
    TransposeLinesUp,
    TransposeLinesDown,
    UppercaseWord,
    LowercaseWord,
    TitlecaseWord,
    IndentRegion,
    OutdentRegion,

    // History
    Undo,
    Redo,
    HistoryPrev,
    HistoryNext,
    HistoryFirst,
    HistoryLast,

    // Completion
    Complete,

    // Mode transitions and session control
    SearchBackward,
    SearchForward,
    PrefixSearchPrev,
    PrefixSearchNext,
    AcceptLine,
    Interrupt,
    Suspend,
    BracketedPaste,

    // Search-mode commands
    SearchSelfInsert,
    SearchBackspace,
    SearchAccept,
    SearchCancel,
    /// Accept the match, then replay the matched keys in the parent mode.
    SearchAcceptReplay,
    /// Leave prefix search and replay the matched keys in the parent mode.
    PrefixAcceptReplay,
}

impl Action {
    /// Stable symbol used for repeat detection, region handling, and logs.
    pub fn name(&self) -> &'static str {
        use Action::*;
        match self {
            SelfInsert => "edit_insert",
            InsertNewline => "edit_insert_newline",
            Backspace => "edit_backspace",
            Delete => "edit_delete",
            DeleteOrEof => "edit_delete_or_eof",
            Clear => "edit_clear",
            MoveLeft => "edit_move_left",
            MoveRight => "edit_move_right",
            MoveUp => "edit_move_up",
            MoveDown => "edit_move_down",
            MoveWordLeft => "edit_move_word_left",
            MoveWordRight => "edit_move_word_right",
            MoveLineStart => "edit_move_begin_of_line",
            MoveLineEnd => "edit_move_end_of_line",
            MoveInputStart => "edit_move_begin_of_input",
            MoveInputEnd => "edit_move_end_of_input",
            ShiftMoveLeft => "shift_move_left",
            ShiftMoveRight => "shift_move_right",
            ShiftMoveUp => "shift_move_up",
            ShiftMoveDown => "shift_move_down",
            ShiftMoveWordLeft => "shift_move_word_left",
            ShiftMoveWordRight => "shift_move_word_right",
            ShiftMoveLineStart => "shift_move_begin_of_line",
            ShiftMoveLineEnd => "shift_move_end_of_line",
            SetMark => "edit_set_mark",
            ExchangeMark => "edit_exchange_point_and_mark",
            KillLine => "edit_kill_line",
            KillLineBackward => "edit_kill_line_backward",
            KillWordLeft => "edit_kill_word_left",
            KillWordRight => "edit_kill_word_right",
            Werase => "edit_werase",
            KillRegion => "edit_kill_region",
            CopyRegion => "edit_copy_region",
            Yank => "edit_yank",
            YankPop => "edit_yank_pop",
            TransposeChars => "edit_transpose_chars",
            TransposeWords => "edit_transpose_words",
            TransposeLinesUp => "edit_transpose_lines_up",
            TransposeLinesDown => "edit_transpose_lines_down",
            UppercaseWord => "edit_upper_case",
            LowercaseWord => "edit_lower_case",
            TitlecaseWord => "edit_title_case",
            IndentRegion => "edit_indent_region",
            OutdentRegion => "edit_outdent_region",
            Undo => "edit_undo",
            Redo => "edit_redo",
            HistoryPrev => "history_prev",
            HistoryNext => "history_next",
            HistoryFirst => "history_first",
            HistoryLast => "history_last",
            Complete => "complete_line",
            SearchBackward => "history_search_backward",
            SearchForward => "history_search_forward",
            PrefixSearchPrev => "history_prefix_prev",
            PrefixSearchNext => "history_prefix_next",
            AcceptLine => "accept_line",
            Interrupt => "interrupt_line",
            Suspend => "suspend_session",
            BracketedPaste => "bracketed_paste",
            SearchSelfInsert => "search_insert",
            SearchBackspace => "search_backspace",
            SearchAccept => "search_accept",
            SearchCancel => "search_cancel",
            SearchAcceptReplay => "search_accept_replay",
            PrefixAcceptReplay => "prefix_accept_replay",
        }
    }

    /// Plain cursor motion (shift variants excluded): these preserve a
    /// region that was activated by an explicit set-mark.
    pub fn is_motion(&self) -> bool {
        use Action::*;
        matches!(
            self,
            MoveLeft
                | MoveRight
                | MoveUp
                | MoveDown
                | MoveWordLeft
                | MoveWordRight
                | MoveLineStart
                | MoveLineEnd
                | MoveInputStart
                | MoveInputEnd
        )
    }

    /// Commands that keep a shift-activated region alive even though they
    /// are not motions themselves.
    pub fn preserves_region(&self) -> bool {
        use Action::*;
        matches!(
            self,
            IndentRegion | OutdentRegion | TransposeLinesUp | TransposeLinesDown
        )
    }

    /// Whether running this action can change the buffer, and therefore
    /// needs a pre-image pushed for undo.
    pub fn mutates_buffer(&self) -> bool {
        use Action::*;
        matches!(
            self,
            SelfInsert
                | InsertNewline
                | Backspace
                | Delete
                | DeleteOrEof
                | Clear
                | KillLine
                | KillLineBackward
                | KillWordLeft
                | KillWordRight
                | Werase
                | KillRegion
                | Yank
                | YankPop
                | TransposeChars
                | TransposeWords
                | TransposeLinesUp
                | TransposeLinesDown
                | UppercaseWord
                | LowercaseWord
                | TitlecaseWord
                | IndentRegion
                | OutdentRegion
                | Complete
                | HistoryPrev
                | HistoryNext
                | HistoryFirst
                | HistoryLast
                | BracketedPaste
        )
    }
}

/// What a dispatched action tells the event loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Keep going; the action took effect.
    Ok,
    /// Keep going, but do not update `last_action` (nothing happened).
    Ignore,
    /// Commit the line.
    Done,
    /// Terminate the loop without committing.
    Abort,
    /// Yield to OS job control, then resume.
    Suspend,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_names_carry_prefix() {
        assert!(Action::ShiftMoveLeft.name().starts_with("shift_"));
        assert!(Action::ShiftMoveLineEnd.name().starts_with("shift_"));
        assert!(!Action::MoveLeft.name().starts_with("shift_"));
    }

    #[test]
    fn test_motion_classification() {
        assert!(Action::MoveWordLeft.is_motion());
        assert!(!Action::ShiftMoveLeft.is_motion());
        assert!(!Action::Backspace.is_motion());
        assert!(Action::IndentRegion.preserves_region());
        assert!(Action::TransposeLinesUp.preserves_region());
        assert!(!Action::MoveLeft.preserves_region());
    }

    #[test]
    fn test_mutation_classification() {
        assert!(Action::SelfInsert.mutates_buffer());
        assert!(Action::Yank.mutates_buffer());
        assert!(!Action::MoveLeft.mutates_buffer());
        assert!(!Action::Undo.mutates_buffer());
        assert!(!Action::SetMark.mutates_buffer());
    }
}
