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

use std::time::Duration;

/// User preferences read by the editor. One record is shared per session;
/// the editor borrows it rather than consulting any global.
///
/// `auto_indent_tmp_off` is runtime state rather than configuration proper:
/// the paste heuristic flips it on and the next non-space insertion clears
/// it. It lives here because every consumer already has the options record
/// in hand.
#[derive(Debug, Clone)]
pub struct EditorOptions {
    /// How long one beep blink lasts.
    pub beep_duration: Duration,
    /// Number of color blinks per beep. Zero disables the flash.
    pub beep_blink: u32,
    /// Hard upper bound on a whole beep animation.
    pub beep_maxduration: Duration,
    /// Colors cycled by the beep flash, as SGR color indices.
    pub beep_colors: Vec<u8>,
    /// Use the prompt's current color as the last blink instead of resetting.
    pub beep_use_current: bool,
    /// Backspace in leading spaces deletes back to a multiple-of-four column.
    pub backspace_align: bool,
    /// With `backspace_align`, also eat spaces right of the cursor.
    /// Only meaningful when `backspace_align` is set.
    pub backspace_adjust: bool,
    /// Default indent for auto-indented newlines. Negative disables.
    pub auto_indent: i32,
    /// Whether bracketed paste re-indents pasted text.
    pub auto_indent_bracketed_paste: bool,
    /// Set by the paste heuristic to suppress indent for one newline.
    pub auto_indent_tmp_off: bool,
    /// Two non-space insertions within this window look like a paste.
    pub auto_indent_time_threshold: Duration,
    /// Coalescing window for repaints during bursts of plain insertions.
    pub auto_refresh_time_delay: Duration,
    /// Tab splices a displayed hint instead of running completion.
    pub hint_tab_completes: bool,
    /// How long a region flash lasts after mark exchange.
    pub region_animation_duration: Duration,
    /// Maximum kill ring entries.
    pub kill_ring_max: usize,
    /// Ctrl-D on an empty line asks before ending the session.
    pub confirm_exit: bool,
    /// Display width of a tab stop.
    pub tabwidth: usize,
}

impl Default for EditorOptions {
    fn default() -> Self {
        EditorOptions {
            beep_duration: Duration::from_millis(200),
            beep_blink: 2,
            beep_maxduration: Duration::from_millis(1000),
            beep_colors: vec![1], // red
            beep_use_current: true,
            backspace_align: true,
            backspace_adjust: true,
            auto_indent: 0,
            auto_indent_bracketed_paste: true,
            auto_indent_tmp_off: false,
            auto_indent_time_threshold: Duration::from_millis(50),
            auto_refresh_time_delay: Duration::from_millis(0),
            hint_tab_completes: true,
            region_animation_duration: Duration::from_millis(200),
            kill_ring_max: 100,
            confirm_exit: false,
            tabwidth: 4,
        }
    }
}
