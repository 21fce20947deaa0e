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

use slotmap::new_key_type;

pub mod actions;
pub mod complete;
pub mod edit_buffer;
pub mod hint;
pub mod history;
pub mod interface;
pub mod keymap;
pub mod kill_ring;
pub mod modal;
pub mod mode;
pub mod options;
pub mod paste;
pub mod render;
pub mod term;
pub mod undo;

new_key_type! {
    pub struct ModeKey;
}

pub use actions::{Action, Outcome};
pub use complete::{Completed, Completer, Completion};
pub use edit_buffer::EditBuffer;
pub use history::{History, MemHistory};
pub use interface::{prepare, run_interface, run_once, Shared};
pub use keymap::{Keymap, KeymapError, KeymapLayer, KeySpec};
pub use kill_ring::KillRing;
pub use modal::{DeferredAction, LineResult, ModalInterface};
pub use mode::{default_prompt_keymap, PromptSpec, PromptText};
pub use options::EditorOptions;
pub use render::{Hint, InputAreaState};
pub use term::{Term, TermReader};
