//! The terminal engine: screen buffers, cursor, modes, SGR/OSC state, and
//! the sequence handlers that translate parsed control functions into grid
//! operations.
//!
//! The parser and the engine form one isolation domain: [`Terminal::feed`]
//! applies a chunk of bytes synchronously and completely before returning,
//! and handlers call grid methods as ordinary function calls. The only
//! asynchronous handoff is the immutable snapshot the renderer consumes.

use std::sync::Arc;

use tracing::{debug, trace};

use crate::cell::{Cell, Color, HyperlinkId, HyperlinkRegistry, SgrAttrs, SgrFlags, UnderlineStyle};
use crate::charset::{Charset, CharsetState};
use crate::cursor::{Cursor, CursorStyle, SavedCursor};
use crate::grid::Grid;
use crate::modes::{Modes, MouseEncoding, MouseTracking};
use crate::palette::{self, Palette, Rgb};
use crate::parser::{Params, Parser, Perform};
use crate::reflow::reflow;
use crate::scrollback::Scrollback;
use crate::selection::{Selection, selection_text};
use crate::snapshot::{FrameSource, Snapshot, build_frame};
use crate::width::char_width;

/// Callback through which the engine emits response bytes (DA, DSR, OSC
/// color queries). Invoked synchronously inside `feed`; it must not
/// re-enter the terminal.
pub type ResponseHandler = Box<dyn FnMut(&[u8]) + Send>;

/// Dirty row tracking consumed by the snapshot producer.
#[derive(Debug, Clone, Copy, Default)]
struct DirtyRows {
    min: u16,
    max: u16,
    any: bool,
}

impl DirtyRows {
    fn mark(&mut self, row: u16) {
        if self.any {
            self.min = self.min.min(row);
            self.max = self.max.max(row);
        } else {
            self.min = row;
            self.max = row;
            self.any = true;
        }
    }

    fn mark_span(&mut self, from: u16, to: u16) {
        self.mark(from);
        self.mark(to);
    }

    fn clear(&mut self) {
        self.any = false;
    }

    fn range(&self) -> Option<(u16, u16)> {
        self.any.then_some((self.min, self.max))
    }
}

/// The engine state behind [`Terminal`].
///
/// Split from the parser so the parser can dispatch into it mutably while
/// it advances.
struct Engine {
    cols: u16,
    rows: u16,
    primary: Grid,
    alternate: Grid,
    using_alternate: bool,
    scrollback: Scrollback,
    max_scrollback: usize,

    cursor: Cursor,
    saved_primary: Option<SavedCursor>,
    saved_alternate: Option<SavedCursor>,

    /// Scroll region rows, both inclusive. `0 <= top < bottom < rows`.
    scroll_top: u16,
    scroll_bottom: u16,

    modes: Modes,
    charsets: CharsetState,
    tab_stops: Vec<bool>,
    /// Live SGR state stamped onto printed cells.
    attrs: SgrAttrs,

    title: String,
    icon_name: String,
    working_directory: Option<String>,
    hyperlinks: HyperlinkRegistry,
    current_hyperlink: HyperlinkId,
    palette: Palette,

    selection: Option<Selection>,
    dirty: DirtyRows,
    last_snapshot: Option<Arc<Snapshot>>,
    /// Out-of-band frame published when sync mode engages over dirty state.
    sync_exit_snapshot: Option<Arc<Snapshot>>,
    bell_count: u32,
    /// Last printed scalar, for REP.
    last_printed: Option<char>,
    response: Option<ResponseHandler>,
}

impl Engine {
    fn new(cols: u16, rows: u16, max_scrollback: usize) -> Self {
        Self {
            cols,
            rows,
            primary: Grid::new(cols, rows),
            alternate: Grid::new(cols, rows),
            using_alternate: false,
            scrollback: Scrollback::new(max_scrollback),
            max_scrollback,
            cursor: Cursor::default(),
            saved_primary: None,
            saved_alternate: None,
            scroll_top: 0,
            scroll_bottom: rows.saturating_sub(1),
            modes: Modes::default(),
            charsets: CharsetState::default(),
            tab_stops: default_tab_stops(cols),
            attrs: SgrAttrs::default(),
            title: String::new(),
            icon_name: String::new(),
            working_directory: None,
            hyperlinks: HyperlinkRegistry::new(),
            current_hyperlink: 0,
            palette: Palette::default(),
            selection: None,
            dirty: DirtyRows::default(),
            last_snapshot: None,
            sync_exit_snapshot: None,
            bell_count: 0,
            last_printed: None,
            response: None,
        }
    }

    fn grid(&self) -> &Grid {
        if self.using_alternate {
            &self.alternate
        } else {
            &self.primary
        }
    }

    fn grid_mut(&mut self) -> &mut Grid {
        if self.using_alternate {
            &mut self.alternate
        } else {
            &mut self.primary
        }
    }

    fn respond(&mut self, bytes: &[u8]) {
        if let Some(handler) = self.response.as_mut() {
            handler(bytes);
        }
    }

    // ── Cursor motion ───────────────────────────────────────────────

    /// Absolute move honoring origin mode. Inputs are 0-based.
    fn move_cursor_to(&mut self, row: u16, col: u16) {
        let (base, limit) = if self.modes.origin {
            (self.scroll_top, self.scroll_bottom)
        } else {
            (0, self.rows - 1)
        };
        self.cursor.row = base.saturating_add(row).min(limit);
        self.cursor.col = col.min(self.cols - 1);
        self.cursor.pending_wrap = false;
    }

    fn cursor_up(&mut self, n: u16) {
        let limit = if self.cursor.row >= self.scroll_top {
            self.scroll_top
        } else {
            0
        };
        self.cursor.row = self.cursor.row.saturating_sub(n).max(limit);
        self.cursor.pending_wrap = false;
    }

    fn cursor_down(&mut self, n: u16) {
        let limit = if self.cursor.row <= self.scroll_bottom {
            self.scroll_bottom
        } else {
            self.rows - 1
        };
        self.cursor.row = self.cursor.row.saturating_add(n).min(limit);
        self.cursor.pending_wrap = false;
    }

    fn cursor_forward(&mut self, n: u16) {
        self.cursor.col = self.cursor.col.saturating_add(n).min(self.cols - 1);
        self.cursor.pending_wrap = false;
    }

    fn cursor_back(&mut self, n: u16) {
        self.cursor.col = self.cursor.col.saturating_sub(n);
        self.cursor.pending_wrap = false;
    }

    fn carriage_return(&mut self) {
        self.cursor.col = 0;
        self.cursor.pending_wrap = false;
    }

    /// IND / LF: move down one row, scrolling at the region bottom.
    fn linefeed(&mut self) {
        self.cursor.pending_wrap = false;
        if self.cursor.row == self.scroll_bottom {
            self.scroll_up(1);
        } else if self.cursor.row + 1 < self.rows {
            self.cursor.row += 1;
        }
    }

    /// RI: move up one row, scrolling down at the region top.
    fn reverse_index(&mut self) {
        self.cursor.pending_wrap = false;
        if self.cursor.row == self.scroll_top {
            self.scroll_down(1);
        } else {
            self.cursor.row = self.cursor.row.saturating_sub(1);
        }
    }

    fn tab_forward(&mut self, n: u16) {
        self.cursor.pending_wrap = false;
        for _ in 0..n {
            let mut col = self.cursor.col;
            let next = (col + 1..self.cols).find(|&c| self.tab_stops[c as usize]);
            col = next.unwrap_or(self.cols - 1);
            self.cursor.col = col;
            if col == self.cols - 1 {
                break;
            }
        }
    }

    fn tab_backward(&mut self, n: u16) {
        self.cursor.pending_wrap = false;
        for _ in 0..n {
            let prev = (0..self.cursor.col).rev().find(|&c| self.tab_stops[c as usize]);
            self.cursor.col = prev.unwrap_or(0);
            if self.cursor.col == 0 {
                break;
            }
        }
    }

    // ── Scrolling ───────────────────────────────────────────────────

    /// Scroll the region up by `n`. On the primary buffer with a
    /// full-screen region, evicted rows feed the scrollback; an inner
    /// region never does.
    fn scroll_up(&mut self, n: u16) {
        let top = self.scroll_top;
        let bottom_ex = self.scroll_bottom + 1;
        let bg = self.attrs.bg;
        let full_screen = top == 0 && self.scroll_bottom == self.rows - 1;
        if !self.using_alternate && full_screen {
            let evicted = self
                .primary
                .scroll_up_into(top, bottom_ex, n, &mut self.scrollback, bg);
            for line in evicted {
                self.hyperlinks.release_cells(&line.cells);
            }
        } else {
            self.grid_mut().scroll_up(top, bottom_ex, n, bg);
        }
        self.dirty.mark_span(top, self.scroll_bottom);
    }

    fn scroll_down(&mut self, n: u16) {
        let top = self.scroll_top;
        let bottom_ex = self.scroll_bottom + 1;
        let bg = self.attrs.bg;
        self.grid_mut().scroll_down(top, bottom_ex, n, bg);
        self.dirty.mark_span(top, self.scroll_bottom);
    }

    // ── Printing ────────────────────────────────────────────────────

    fn wrap_to_next_row(&mut self) {
        let row = self.cursor.row;
        self.grid_mut().set_row_wrapped(row, true);
        self.dirty.mark(row);
        self.cursor.col = 0;
        if self.cursor.row == self.scroll_bottom {
            self.scroll_up(1);
        } else if self.cursor.row + 1 < self.rows {
            self.cursor.row += 1;
        }
    }

    fn print_char(&mut self, ch: char) {
        let ch = self.charsets.translate(ch);
        let width = char_width(ch);

        if self.cursor.pending_wrap {
            if self.modes.autowrap {
                self.wrap_to_next_row();
            }
            self.cursor.pending_wrap = false;
        }

        // A wide character with no room at the margin wraps early (or is
        // dropped when wrapping is off or impossible).
        if width == 2 && self.cursor.col + 1 >= self.cols {
            if self.modes.autowrap && self.cols >= 2 {
                self.wrap_to_next_row();
            } else {
                return;
            }
        }

        let (row, col) = (self.cursor.row, self.cursor.col);
        if self.modes.insert {
            let bg = self.attrs.bg;
            self.grid_mut().insert_chars(row, col, u16::from(width), bg);
        }

        let mut attrs = self.attrs;
        if attrs.flags.contains(SgrFlags::BOLD) {
            attrs.fg = attrs.fg.brightened();
        }

        let written = self.grid_mut().write_printable(row, col, ch, attrs);
        if written == 0 {
            return;
        }
        if self.current_hyperlink != 0 {
            self.hyperlinks.acquire_id(self.current_hyperlink);
            let link = self.current_hyperlink;
            if let Some(cell) = self.grid_mut().cell_mut(row, col) {
                cell.hyperlink = link;
            }
        }
        self.dirty.mark(row);
        self.last_printed = Some(ch);

        let advance = u16::from(written);
        if col + advance >= self.cols {
            if self.modes.autowrap {
                self.cursor.pending_wrap = true;
            }
            self.cursor.col = self.cols - 1;
        } else {
            self.cursor.col = col + advance;
        }
    }

    // ── Save / restore (DECSC, DECRC) ───────────────────────────────

    fn save_cursor(&mut self) {
        let saved = SavedCursor {
            row: self.cursor.row,
            col: self.cursor.col,
            attrs: self.attrs,
            origin_mode: self.modes.origin,
            autowrap: self.modes.autowrap,
            charsets: self.charsets,
        };
        if self.using_alternate {
            self.saved_alternate = Some(saved);
        } else {
            self.saved_primary = Some(saved);
        }
    }

    fn restore_cursor(&mut self) {
        let slot = if self.using_alternate {
            self.saved_alternate
        } else {
            self.saved_primary
        };
        // DECRC without a prior DECSC is a no-op.
        let Some(saved) = slot else { return };
        self.cursor.row = saved.row.min(self.rows - 1);
        self.cursor.col = saved.col.min(self.cols - 1);
        self.cursor.pending_wrap = false;
        self.attrs = saved.attrs;
        self.modes.origin = saved.origin_mode;
        self.modes.autowrap = saved.autowrap;
        self.charsets = saved.charsets;
    }

    // ── Alternate screen (mode 1049) ────────────────────────────────

    fn enter_alternate(&mut self) {
        if self.using_alternate {
            return;
        }
        self.save_cursor();
        self.using_alternate = true;
        self.alternate.clear();
        self.cursor.row = 0;
        self.cursor.col = 0;
        self.cursor.pending_wrap = false;
        self.dirty.mark_span(0, self.rows - 1);
    }

    fn leave_alternate(&mut self) {
        if !self.using_alternate {
            return;
        }
        self.using_alternate = false;
        // A TUI app that dies mid-update must not leave the frame frozen.
        self.modes.synchronized_output = false;
        self.restore_cursor();
        self.dirty.mark_span(0, self.rows - 1);
    }

    // ── Resets ──────────────────────────────────────────────────────

    /// DECSTR: soft reset.
    fn soft_reset(&mut self) {
        self.attrs.reset();
        self.charsets.reset();
        self.modes.origin = false;
        self.modes.insert = false;
        self.modes.autowrap = true;
        self.cursor.visible = true;
        self.cursor.pending_wrap = false;
        self.scroll_top = 0;
        self.scroll_bottom = self.rows - 1;
    }

    /// RIS: hard reset, reinitializing in place at the current size.
    fn full_reset(&mut self) {
        let (cols, rows) = (self.cols, self.rows);
        self.primary.clear();
        self.alternate.clear();
        self.using_alternate = false;
        self.scrollback.clear();
        self.cursor = Cursor::default();
        self.saved_primary = None;
        self.saved_alternate = None;
        self.scroll_top = 0;
        self.scroll_bottom = rows.saturating_sub(1);
        self.modes.reset();
        self.charsets.reset();
        self.tab_stops = default_tab_stops(cols);
        self.attrs = SgrAttrs::default();
        self.hyperlinks.clear();
        self.current_hyperlink = 0;
        self.palette.reset_all();
        self.selection = None;
        self.last_snapshot = None;
        self.sync_exit_snapshot = None;
        self.last_printed = None;
        self.dirty.mark_span(0, rows.saturating_sub(1));
    }

    // ── Mode changes ────────────────────────────────────────────────

    fn set_dec_private_mode(&mut self, mode: u16, enable: bool) {
        match mode {
            1 => self.modes.cursor_keys_app = enable,
            6 => {
                self.modes.origin = enable;
                self.move_cursor_to(0, 0);
            }
            7 => {
                self.modes.autowrap = enable;
                if !enable {
                    self.cursor.pending_wrap = false;
                }
            }
            25 => {
                self.cursor.visible = enable;
                self.dirty.mark(self.cursor.row);
            }
            1000 => {
                self.modes.mouse_tracking = if enable {
                    MouseTracking::Normal
                } else {
                    MouseTracking::Off
                };
            }
            1002 => {
                self.modes.mouse_tracking = if enable {
                    MouseTracking::ButtonEvent
                } else {
                    MouseTracking::Off
                };
            }
            1003 => {
                self.modes.mouse_tracking = if enable {
                    MouseTracking::AnyEvent
                } else {
                    MouseTracking::Off
                };
            }
            1005 => {
                self.modes.mouse_encoding = if enable {
                    MouseEncoding::Utf8
                } else if self.modes.mouse_encoding == MouseEncoding::Utf8 {
                    MouseEncoding::Default
                } else {
                    self.modes.mouse_encoding
                };
            }
            1006 => {
                self.modes.mouse_encoding = if enable {
                    MouseEncoding::Sgr
                } else if self.modes.mouse_encoding == MouseEncoding::Sgr {
                    MouseEncoding::Default
                } else {
                    self.modes.mouse_encoding
                };
            }
            1049 => {
                if enable {
                    self.enter_alternate();
                } else {
                    self.leave_alternate();
                }
            }
            2004 => self.modes.bracketed_paste = enable,
            2026 => self.set_synchronized_output(enable),
            _ => debug!(mode, enable, "unhandled DEC private mode"),
        }
    }

    fn set_synchronized_output(&mut self, enable: bool) {
        if enable && !self.modes.synchronized_output {
            // Engaging sync over dirty cells publishes the intermediate
            // frame out-of-band: a sync-off / draw / sync-on triple inside
            // one chunk must not lose the drawn state.
            if self.dirty.any {
                let frame = Arc::new(self.build_frame(0, self.dirty.range()));
                self.sync_exit_snapshot = Some(frame.clone());
                self.last_snapshot = Some(frame);
                self.dirty.clear();
            }
        }
        self.modes.synchronized_output = enable;
    }

    fn set_ansi_mode(&mut self, mode: u16, enable: bool) {
        match mode {
            4 => self.modes.insert = enable,
            20 => self.modes.linefeed_newline = enable,
            _ => debug!(mode, enable, "unhandled ANSI mode"),
        }
    }

    // ── SGR ─────────────────────────────────────────────────────────

    fn handle_sgr(&mut self, params: &Params) {
        if params.is_empty() {
            self.attrs.reset();
            return;
        }
        let mut i = 0;
        while i < params.len() {
            let sub = params.subparams(i);
            let code = sub.first().copied().unwrap_or(0);
            match code {
                0 => self.attrs.reset(),
                1 => self.attrs.flags.insert(SgrFlags::BOLD),
                2 => self.attrs.flags.insert(SgrFlags::DIM),
                3 => self.attrs.flags.insert(SgrFlags::ITALIC),
                4 => self.set_underline(sub.get(1).copied()),
                5 => self.attrs.flags.insert(SgrFlags::BLINK),
                7 => self.attrs.flags.insert(SgrFlags::INVERSE),
                8 => self.attrs.flags.insert(SgrFlags::HIDDEN),
                9 => self.attrs.flags.insert(SgrFlags::STRIKETHROUGH),
                21 => self.set_underline(Some(2)),
                22 => self.attrs.flags.remove(SgrFlags::BOLD | SgrFlags::DIM),
                23 => self.attrs.flags.remove(SgrFlags::ITALIC),
                24 => self.set_underline(Some(0)),
                25 => self.attrs.flags.remove(SgrFlags::BLINK),
                27 => self.attrs.flags.remove(SgrFlags::INVERSE),
                28 => self.attrs.flags.remove(SgrFlags::HIDDEN),
                29 => self.attrs.flags.remove(SgrFlags::STRIKETHROUGH),
                30..=37 => self.attrs.fg = Color::Indexed((code - 30) as u8),
                38 => {
                    let (color, consumed) = extended_color(params, i);
                    if let Some(c) = color {
                        self.attrs.fg = c;
                    }
                    i += consumed;
                }
                39 => self.attrs.fg = Color::Default,
                40..=47 => self.attrs.bg = Color::Indexed((code - 40) as u8),
                48 => {
                    let (color, consumed) = extended_color(params, i);
                    if let Some(c) = color {
                        self.attrs.bg = c;
                    }
                    i += consumed;
                }
                49 => self.attrs.bg = Color::Default,
                53 => self.attrs.flags.insert(SgrFlags::OVERLINE),
                55 => self.attrs.flags.remove(SgrFlags::OVERLINE),
                58 => {
                    let (color, consumed) = extended_color(params, i);
                    if let Some(c) = color {
                        self.attrs.ul = c;
                    }
                    i += consumed;
                }
                59 => self.attrs.ul = Color::Default,
                90..=97 => self.attrs.fg = Color::Indexed((code - 90 + 8) as u8),
                100..=107 => self.attrs.bg = Color::Indexed((code - 100 + 8) as u8),
                _ => debug!(code, "unhandled SGR parameter"),
            }
            i += 1;
        }
    }

    /// SGR 4 with optional sub-style: 4:0 clears, 4:1..4:5 select a style.
    fn set_underline(&mut self, style: Option<u16>) {
        self.attrs
            .flags
            .remove(SgrFlags::UNDERLINE | SgrFlags::DOUBLE_UNDERLINE);
        let style = match style {
            None | Some(1) => UnderlineStyle::Single,
            Some(0) => UnderlineStyle::None,
            Some(2) => UnderlineStyle::Double,
            Some(3) => UnderlineStyle::Curly,
            Some(4) => UnderlineStyle::Dotted,
            Some(5) => UnderlineStyle::Dashed,
            Some(other) => {
                debug!(style = other, "unknown underline sub-style");
                UnderlineStyle::Single
            }
        };
        match style {
            UnderlineStyle::None => {}
            UnderlineStyle::Double => {
                self.attrs.flags.insert(SgrFlags::DOUBLE_UNDERLINE);
            }
            _ => {
                self.attrs.flags.insert(SgrFlags::UNDERLINE);
            }
        }
        self.attrs.ul_style = style;
    }

    // ── OSC ─────────────────────────────────────────────────────────

    fn handle_osc(&mut self, payload: &[u8]) {
        let text = String::from_utf8_lossy(payload);
        let (number, rest) = match text.split_once(';') {
            Some((n, rest)) => (n, rest),
            None => (text.as_ref(), ""),
        };
        let Ok(number) = number.parse::<u16>() else {
            debug!(payload = %text, "OSC without numeric selector");
            return;
        };

        match number {
            0 => {
                self.title = rest.to_string();
                self.icon_name = rest.to_string();
            }
            1 => self.icon_name = rest.to_string(),
            2 => self.title = rest.to_string(),
            4 => self.handle_osc_palette(rest),
            7 => {
                self.working_directory = if rest.is_empty() {
                    None
                } else {
                    Some(rest.to_string())
                };
            }
            8 => {
                // params ; URI — empty URI ends the hyperlink.
                let uri = rest.split_once(';').map_or("", |(_, uri)| uri);
                self.current_hyperlink = self.hyperlinks.intern(uri);
            }
            10 => self.handle_osc_default_color(10, rest),
            11 => self.handle_osc_default_color(11, rest),
            12 => self.handle_osc_default_color(12, rest),
            52 => trace!("ignoring OSC 52 clipboard operation"),
            104 => {
                if rest.is_empty() {
                    self.palette.reset_all();
                } else {
                    for idx in rest.split(';') {
                        if let Ok(idx) = idx.parse::<u8>() {
                            self.palette.reset_indexed(idx);
                        }
                    }
                }
            }
            _ => debug!(number, "unhandled OSC"),
        }
    }

    /// OSC 4: `idx;spec` pairs; a `?` spec queries the current value.
    fn handle_osc_palette(&mut self, rest: &str) {
        let mut parts = rest.split(';');
        while let (Some(idx), Some(spec)) = (parts.next(), parts.next()) {
            let Ok(idx) = idx.parse::<u8>() else { continue };
            if spec == "?" {
                let rgb = self.palette.indexed(idx);
                let reply = format!(
                    "\x1b]4;{};{}\x1b\\",
                    idx,
                    palette::format_color_response(rgb)
                );
                self.respond(reply.as_bytes());
            } else if let Some(rgb) = palette::parse_color_spec(spec) {
                self.palette.set_indexed(idx, rgb);
                self.dirty.mark_span(0, self.rows - 1);
            }
        }
    }

    /// OSC 10/11/12: set or query default foreground/background/cursor.
    fn handle_osc_default_color(&mut self, number: u16, rest: &str) {
        if rest == "?" {
            let rgb = match number {
                10 => self.palette.default_fg,
                11 => self.palette.default_bg,
                _ => self.palette.cursor_color,
            };
            let reply = format!(
                "\x1b]{};{}\x1b\\",
                number,
                palette::format_color_response(rgb)
            );
            self.respond(reply.as_bytes());
            return;
        }
        if let Some(rgb) = palette::parse_color_spec(rest) {
            match number {
                10 => self.palette.default_fg = rgb,
                11 => self.palette.default_bg = rgb,
                _ => self.palette.cursor_color = rgb,
            }
            self.dirty.mark_span(0, self.rows - 1);
        }
    }

    // ── Frame production ────────────────────────────────────────────

    fn build_frame(&self, scroll_offset: usize, dirty: Option<(u16, u16)>) -> Snapshot {
        build_frame(&FrameSource {
            grid: self.grid(),
            scrollback: &self.scrollback,
            palette: &self.palette,
            cursor: &self.cursor,
            selection: self.selection,
            dirty,
            scroll_offset,
        })
    }

    fn snapshot(&mut self) -> Arc<Snapshot> {
        if self.modes.synchronized_output {
            if let Some(frame) = &self.last_snapshot {
                return frame.clone();
            }
            let frame = Arc::new(self.build_frame(0, self.dirty.range()));
            self.last_snapshot = Some(frame.clone());
            return frame;
        }
        let frame = Arc::new(self.build_frame(0, self.dirty.range()));
        self.dirty.clear();
        self.last_snapshot = Some(frame.clone());
        frame
    }

    // ── Resize ──────────────────────────────────────────────────────

    fn resize(&mut self, cols: u16, rows: u16) {
        if cols == 0 || rows == 0 || (cols == self.cols && rows == self.rows) {
            return;
        }

        // The primary buffer reflows; its cursor is either the live one or
        // the saved slot while the alternate screen is up.
        let (pr, pc) = if self.using_alternate {
            self.saved_primary
                .map_or((0, 0), |saved| (saved.row, saved.col))
        } else {
            (self.cursor.row, self.cursor.col)
        };
        let result = reflow(&self.scrollback, &self.primary, pr, pc, cols, rows);

        let mut new_scrollback = Scrollback::new(self.max_scrollback);
        for line in result.scrollback {
            if let Some(evicted) = new_scrollback.push(line) {
                self.hyperlinks.release_cells(&evicted.cells);
            }
        }
        self.scrollback = new_scrollback;
        self.primary
            .install_rows(result.screen_rows, result.screen_overrides, cols, rows);

        // The alternate buffer pads/truncates; TUIs repaint on SIGWINCH.
        self.alternate.resize(cols, rows);

        if self.using_alternate {
            if let Some(saved) = self.saved_primary.as_mut() {
                saved.row = result.cursor_row;
                saved.col = result.cursor_col;
            }
            self.cursor.clamp(rows, cols);
        } else {
            self.cursor.row = result.cursor_row;
            self.cursor.col = result.cursor_col;
        }
        self.cursor.pending_wrap = false;

        self.cols = cols;
        self.rows = rows;
        self.scroll_top = 0;
        self.scroll_bottom = rows - 1;
        self.tab_stops = default_tab_stops(cols);
        self.selection = None;
        self.last_snapshot = None;
        self.dirty.mark_span(0, rows - 1);
    }
}

fn default_tab_stops(cols: u16) -> Vec<bool> {
    (0..cols).map(|c| c % 8 == 0 && c != 0).collect()
}

/// Extended color for SGR 38/48/58.
///
/// Handles both the colon form (sub-parameters, optional colorspace ID:
/// `38:2::r:g:b`) and the legacy semicolon form (`38;2;r;g;b`). Returns the
/// color and how many *extra* parameters the semicolon form consumed.
fn extended_color(params: &Params, i: usize) -> (Option<Color>, usize) {
    let sub = params.subparams(i);
    if sub.len() > 1 {
        // Colon form: everything lives in this parameter's subparams.
        let color = match sub.get(1).copied() {
            Some(5) => sub.get(2).map(|&n| Color::Indexed(clamp_u8(n))),
            Some(2) => match sub.len() {
                // 38:2:r:g:b
                5 => Some(Color::Rgb(
                    clamp_u8(sub[2]),
                    clamp_u8(sub[3]),
                    clamp_u8(sub[4]),
                )),
                // 38:2:<colorspace>:r:g:b
                6.. => Some(Color::Rgb(
                    clamp_u8(sub[3]),
                    clamp_u8(sub[4]),
                    clamp_u8(sub[5]),
                )),
                _ => None,
            },
            _ => None,
        };
        return (color, 0);
    }
    // Semicolon form: mode and payload follow as separate parameters.
    match params.get(i + 1) {
        5 => (
            (i + 2 < params.len()).then(|| Color::Indexed(clamp_u8(params.get(i + 2)))),
            2,
        ),
        2 => (
            (i + 4 < params.len()).then(|| {
                Color::Rgb(
                    clamp_u8(params.get(i + 2)),
                    clamp_u8(params.get(i + 3)),
                    clamp_u8(params.get(i + 4)),
                )
            }),
            4,
        ),
        _ => (None, 0),
    }
}

fn clamp_u8(v: u16) -> u8 {
    v.min(255) as u8
}

impl Perform for Engine {
    fn print(&mut self, ch: char) {
        self.print_char(ch);
    }

    fn execute(&mut self, byte: u8) {
        match byte {
            0x07 => self.bell_count = self.bell_count.saturating_add(1),
            0x08 => {
                self.cursor.pending_wrap = false;
                self.cursor.col = self.cursor.col.saturating_sub(1);
            }
            0x09 => self.tab_forward(1),
            0x0A | 0x0B | 0x0C => {
                self.linefeed();
                if self.modes.linefeed_newline {
                    self.carriage_return();
                }
            }
            0x0D => self.carriage_return(),
            0x0E => self.charsets.active = 1,
            0x0F => self.charsets.active = 0,
            // NUL, DEL, CAN, SUB and the rest are ignored.
            _ => {}
        }
    }

    fn csi_dispatch(
        &mut self,
        params: &Params,
        intermediates: &[u8],
        private: Option<u8>,
        final_byte: u8,
    ) {
        if let Some(marker) = private {
            match (marker, final_byte) {
                (b'?', b'h') => {
                    for i in 0..params.len().max(1) {
                        self.set_dec_private_mode(params.get(i), true);
                    }
                }
                (b'?', b'l') => {
                    for i in 0..params.len().max(1) {
                        self.set_dec_private_mode(params.get(i), false);
                    }
                }
                _ => debug!(marker, final_byte, "unhandled private CSI"),
            }
            return;
        }

        match (intermediates, final_byte) {
            ([], b'A') => self.cursor_up(params.get_or(0, 1)),
            ([], b'B' | b'e') => self.cursor_down(params.get_or(0, 1)),
            ([], b'C') => self.cursor_forward(params.get_or(0, 1)),
            ([], b'D') => self.cursor_back(params.get_or(0, 1)),
            ([], b'E') => {
                self.cursor_down(params.get_or(0, 1));
                self.carriage_return();
            }
            ([], b'F') => {
                self.cursor_up(params.get_or(0, 1));
                self.carriage_return();
            }
            ([], b'G' | b'`') => {
                self.cursor.col = (params.get_or(0, 1) - 1).min(self.cols - 1);
                self.cursor.pending_wrap = false;
            }
            ([], b'H' | b'f') => {
                self.move_cursor_to(params.get_or(0, 1) - 1, params.get_or(1, 1) - 1);
            }
            ([], b'I') => self.tab_forward(params.get_or(0, 1)),
            ([], b'J') => {
                let (row, col) = (self.cursor.row, self.cursor.col);
                let bg = self.attrs.bg;
                match params.get(0) {
                    0 => self.grid_mut().erase_below(row, col, bg),
                    1 => self.grid_mut().erase_above(row, col, bg),
                    2 => self.grid_mut().erase_all(bg),
                    3 => {
                        self.grid_mut().erase_all(bg);
                        self.scrollback.clear();
                    }
                    other => {
                        debug!(mode = other, "unhandled ED mode");
                        return;
                    }
                }
                self.dirty.mark_span(0, self.rows - 1);
            }
            ([], b'K') => {
                let (row, col) = (self.cursor.row, self.cursor.col);
                let bg = self.attrs.bg;
                match params.get(0) {
                    0 => self.grid_mut().erase_line_right(row, col, bg),
                    1 => self.grid_mut().erase_line_left(row, col, bg),
                    2 => self.grid_mut().erase_line(row, bg),
                    other => {
                        debug!(mode = other, "unhandled EL mode");
                        return;
                    }
                }
                self.dirty.mark(row);
            }
            ([], b'L') => {
                let n = params.get_or(0, 1);
                let (row, top, bottom) = (self.cursor.row, self.scroll_top, self.scroll_bottom);
                let bg = self.attrs.bg;
                self.grid_mut().insert_lines(row, n, top, bottom + 1, bg);
                self.dirty.mark_span(row.min(bottom), bottom);
                self.cursor.pending_wrap = false;
            }
            ([], b'M') => {
                let n = params.get_or(0, 1);
                let (row, top, bottom) = (self.cursor.row, self.scroll_top, self.scroll_bottom);
                let bg = self.attrs.bg;
                self.grid_mut().delete_lines(row, n, top, bottom + 1, bg);
                self.dirty.mark_span(row.min(bottom), bottom);
                self.cursor.pending_wrap = false;
            }
            ([], b'P') => {
                let (row, col) = (self.cursor.row, self.cursor.col);
                let bg = self.attrs.bg;
                self.grid_mut().delete_chars(row, col, params.get_or(0, 1), bg);
                self.dirty.mark(row);
            }
            ([], b'@') => {
                let (row, col) = (self.cursor.row, self.cursor.col);
                let bg = self.attrs.bg;
                self.grid_mut().insert_chars(row, col, params.get_or(0, 1), bg);
                self.dirty.mark(row);
            }
            ([], b'S') => self.scroll_up(params.get_or(0, 1)),
            ([], b'T') => self.scroll_down(params.get_or(0, 1)),
            ([], b'X') => {
                let (row, col) = (self.cursor.row, self.cursor.col);
                let bg = self.attrs.bg;
                self.grid_mut().erase_chars(row, col, params.get_or(0, 1), bg);
                self.dirty.mark(row);
            }
            ([], b'Z') => self.tab_backward(params.get_or(0, 1)),
            ([], b'b') => {
                if let Some(ch) = self.last_printed {
                    for _ in 0..params.get_or(0, 1) {
                        self.print_char(ch);
                    }
                }
            }
            ([], b'c') => {
                // Primary DA: VT220 with color and selective erase.
                self.respond(b"\x1b[?62;1;2;6;9c");
            }
            ([], b'd') => {
                let row = params.get_or(0, 1) - 1;
                self.move_cursor_to(row, self.cursor.col);
            }
            ([], b'g') => match params.get(0) {
                0 => {
                    let col = self.cursor.col as usize;
                    if col < self.tab_stops.len() {
                        self.tab_stops[col] = false;
                    }
                }
                3 => self.tab_stops.fill(false),
                other => debug!(mode = other, "unhandled TBC mode"),
            },
            ([], b'h') => {
                for i in 0..params.len() {
                    self.set_ansi_mode(params.get(i), true);
                }
            }
            ([], b'l') => {
                for i in 0..params.len() {
                    self.set_ansi_mode(params.get(i), false);
                }
            }
            ([], b'm') => self.handle_sgr(params),
            ([], b'n') => match params.get(0) {
                5 => self.respond(b"\x1b[0n"),
                6 => {
                    let row = if self.modes.origin {
                        self.cursor.row - self.scroll_top + 1
                    } else {
                        self.cursor.row + 1
                    };
                    let col = self.cursor.col + 1;
                    let reply = format!("\x1b[{row};{col}R");
                    self.respond(reply.as_bytes());
                }
                other => debug!(kind = other, "unhandled DSR"),
            },
            ([], b'r') => {
                let top = params.get_or(0, 1) - 1;
                let bottom = params.get_or(1, self.rows) - 1;
                let bottom = bottom.min(self.rows - 1);
                // DECSTBM with an empty or inverted region is a no-op.
                if top >= bottom {
                    return;
                }
                self.scroll_top = top;
                self.scroll_bottom = bottom;
                self.move_cursor_to(0, 0);
            }
            ([], b's') => self.save_cursor(),
            ([], b'u') => self.restore_cursor(),
            ([b' '], b'q') => {
                let (style, blink) = CursorStyle::from_decscusr(params.get(0));
                self.cursor.style = style;
                self.cursor.blink = blink;
                self.dirty.mark(self.cursor.row);
            }
            ([b'!'], b'p') => self.soft_reset(),
            _ => debug!(?intermediates, final_byte, "unhandled CSI"),
        }
    }

    fn esc_dispatch(&mut self, intermediates: &[u8], final_byte: u8) {
        match (intermediates, final_byte) {
            ([], b'7') => self.save_cursor(),
            ([], b'8') => self.restore_cursor(),
            ([], b'D') => self.linefeed(),
            ([], b'E') => {
                self.linefeed();
                self.carriage_return();
            }
            ([], b'H') => {
                let col = self.cursor.col as usize;
                if col < self.tab_stops.len() {
                    self.tab_stops[col] = true;
                }
            }
            ([], b'M') => self.reverse_index(),
            ([], b'=') => self.modes.keypad_app = true,
            ([], b'>') => self.modes.keypad_app = false,
            ([], b'c') => self.full_reset(),
            ([], b'\\') => {} // ST after an already-terminated string
            ([b'#'], b'8') => {
                // DECALN: E-fill, full region, home.
                self.grid_mut().fill_all('E');
                self.scroll_top = 0;
                self.scroll_bottom = self.rows - 1;
                self.cursor.row = 0;
                self.cursor.col = 0;
                self.cursor.pending_wrap = false;
                self.dirty.mark_span(0, self.rows - 1);
            }
            ([b'('], designator) => {
                self.charsets.g0 = Charset::from_designator(designator);
            }
            ([b')'], designator) => {
                self.charsets.g1 = Charset::from_designator(designator);
            }
            _ => debug!(?intermediates, final_byte, "unhandled ESC sequence"),
        }
    }

    fn osc_dispatch(&mut self, payload: &[u8], _bell_terminated: bool) {
        self.handle_osc(payload);
    }

    fn dcs_hook(&mut self, _params: &Params, _intermediates: &[u8], final_byte: u8) {
        // DCS payloads (terminfo queries, sixel, ...) are consumed and
        // discarded for compatibility.
        trace!(final_byte, "discarding DCS string");
    }
}

/// The terminal core: a VT parser and grid engine in one isolation domain.
///
/// Bytes go in through [`Terminal::feed`]; immutable packed frames come out
/// through [`Terminal::snapshot`]. Everything in between (cursor state,
/// scrollback, modes, reflow on resize) is internal and mutated only by the
/// byte stream and the few control calls documented here.
pub struct Terminal {
    parser: Parser,
    engine: Engine,
}

impl std::fmt::Debug for Terminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Terminal")
            .field("cols", &self.engine.cols)
            .field("rows", &self.engine.rows)
            .field("scrollback", &self.engine.scrollback.len())
            .finish_non_exhaustive()
    }
}

impl Terminal {
    /// Create a terminal with blank cells everywhere.
    ///
    /// Zero dimensions are clamped to 1 so the grid invariants hold.
    #[must_use]
    pub fn new(cols: u16, rows: u16, max_scrollback: usize) -> Self {
        Self {
            parser: Parser::new(),
            engine: Engine::new(cols.max(1), rows.max(1), max_scrollback),
        }
    }

    /// Register the callback that receives response bytes (DA, DSR, OSC
    /// queries). The callback runs synchronously inside `feed` and must not
    /// call back into this terminal.
    pub fn set_response_handler(&mut self, handler: ResponseHandler) {
        self.engine.response = Some(handler);
    }

    /// Consume a chunk of PTY output. Returns when the chunk is fully
    /// applied; bytes fed in order are applied in order.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.parser.advance(&mut self.engine, bytes);
    }

    /// Resize to `cols` x `rows`. The primary screen reflows (scrollback
    /// included); the alternate screen pads/truncates. Zero dimensions are
    /// a no-op.
    pub fn resize(&mut self, cols: u16, rows: u16) {
        self.engine.resize(cols, rows);
    }

    /// Produce the current frame.
    ///
    /// Consumes dirty state. While synchronized output (mode 2026) is
    /// active, returns the cached frame unchanged.
    pub fn snapshot(&mut self) -> Arc<Snapshot> {
        self.engine.snapshot()
    }

    /// Produce a frame with the viewport scrolled back by `offset` lines.
    ///
    /// Scrollback lines composite into the top of the frame. Does not
    /// consume dirty state; `offset` 0 is equivalent to [`Self::snapshot`].
    pub fn snapshot_at(&mut self, offset: usize) -> Arc<Snapshot> {
        if offset == 0 {
            return self.snapshot();
        }
        let offset = offset.min(self.engine.scrollback.len());
        Arc::new(self.engine.build_frame(offset, None))
    }

    /// The out-of-band frame captured when synchronized output engaged
    /// over undrawn changes, if any. Consuming it clears it.
    pub fn take_sync_exit_snapshot(&mut self) -> Option<Arc<Snapshot>> {
        self.engine.sync_exit_snapshot.take()
    }

    // ── Read-only queries ───────────────────────────────────────────

    #[must_use]
    pub fn cols(&self) -> u16 {
        self.engine.cols
    }

    #[must_use]
    pub fn rows(&self) -> u16 {
        self.engine.rows
    }

    /// Cursor position as `(row, col)`.
    #[must_use]
    pub fn cursor_position(&self) -> (u16, u16) {
        (self.engine.cursor.row, self.engine.cursor.col)
    }

    #[must_use]
    pub fn cursor_visible(&self) -> bool {
        self.engine.cursor.visible
    }

    #[must_use]
    pub fn cursor_style(&self) -> CursorStyle {
        self.engine.cursor.style
    }

    /// The cell at `(row, col)` of the active screen.
    #[must_use]
    pub fn cell(&self, row: u16, col: u16) -> Option<&Cell> {
        self.engine.grid().cell(row, col)
    }

    /// Active screen content as rows of trimmed strings.
    #[must_use]
    pub fn visible_text(&self) -> Vec<String> {
        (0..self.engine.rows)
            .map(|r| self.engine.grid().row_text(r))
            .collect()
    }

    #[must_use]
    pub fn window_title(&self) -> &str {
        &self.engine.title
    }

    #[must_use]
    pub fn icon_name(&self) -> &str {
        &self.engine.icon_name
    }

    #[must_use]
    pub fn working_directory(&self) -> Option<&str> {
        self.engine.working_directory.as_deref()
    }

    /// URI of the hyperlink new prints attach to, if one is open.
    #[must_use]
    pub fn current_hyperlink(&self) -> Option<&str> {
        self.engine.hyperlinks.get(self.engine.current_hyperlink)
    }

    /// Hyperlink URI under a screen cell, for click/hover hit testing.
    #[must_use]
    pub fn hyperlink_at(&self, row: u16, col: u16) -> Option<&str> {
        let id = self.engine.grid().cell(row, col)?.hyperlink;
        self.engine.hyperlinks.get(id)
    }

    /// Bell rings since the last call. Consuming.
    pub fn take_bell_count(&mut self) -> u32 {
        std::mem::take(&mut self.engine.bell_count)
    }

    #[must_use]
    pub fn is_using_alternate(&self) -> bool {
        self.engine.using_alternate
    }

    /// Scroll region as inclusive `(top, bottom)` rows.
    #[must_use]
    pub fn scroll_region(&self) -> (u16, u16) {
        (self.engine.scroll_top, self.engine.scroll_bottom)
    }

    #[must_use]
    pub fn mouse_tracking(&self) -> MouseTracking {
        self.engine.modes.mouse_tracking
    }

    #[must_use]
    pub fn mouse_encoding(&self) -> MouseEncoding {
        self.engine.modes.mouse_encoding
    }

    #[must_use]
    pub fn application_cursor_keys(&self) -> bool {
        self.engine.modes.cursor_keys_app
    }

    #[must_use]
    pub fn application_keypad(&self) -> bool {
        self.engine.modes.keypad_app
    }

    #[must_use]
    pub fn bracketed_paste(&self) -> bool {
        self.engine.modes.bracketed_paste
    }

    #[must_use]
    pub fn synchronized_output(&self) -> bool {
        self.engine.modes.synchronized_output
    }

    #[must_use]
    pub fn default_foreground(&self) -> Rgb {
        self.engine.palette.default_fg
    }

    #[must_use]
    pub fn default_background(&self) -> Rgb {
        self.engine.palette.default_bg
    }

    /// Resolved palette color for an index, honoring OSC 4 overrides.
    #[must_use]
    pub fn palette_color(&self, index: u8) -> Rgb {
        self.engine.palette.indexed(index)
    }

    #[must_use]
    pub fn scrollback_len(&self) -> usize {
        self.engine.scrollback.len()
    }

    /// Search scrollback lines for a substring.
    #[must_use]
    pub fn search_scrollback(&self, query: &str, case_sensitive: bool) -> Vec<usize> {
        self.engine.scrollback.search(query, case_sensitive)
    }

    // ── Selection ───────────────────────────────────────────────────

    /// Set the active selection (combined-buffer coordinates).
    pub fn set_selection(&mut self, selection: Selection) {
        self.engine.selection = Some(selection.normalized());
        self.engine.dirty.mark_span(0, self.engine.rows - 1);
    }

    /// Clear the active selection.
    pub fn clear_selection(&mut self) {
        if self.engine.selection.take().is_some() {
            self.engine.dirty.mark_span(0, self.engine.rows - 1);
        }
    }

    #[must_use]
    pub fn selection(&self) -> Option<Selection> {
        self.engine.selection
    }

    /// Extract the selected text, if a selection is active.
    #[must_use]
    pub fn selection_text(&self) -> Option<String> {
        self.engine.selection.map(|sel| {
            selection_text(sel, &self.engine.primary, &self.engine.scrollback)
        })
    }

    /// Install a multi-scalar grapheme cluster at a screen cell.
    ///
    /// This is the host-side path for content whose cluster segmentation
    /// happens upstream of the byte stream.
    pub fn set_grapheme_override(&mut self, row: u16, col: u16, cluster: String) {
        self.engine.grid_mut().set_grapheme_override(row, col, cluster);
        self.engine.dirty.mark(row);
    }
}
