//! Cursor position, style, and DECSC/DECRC save slots.

use crate::cell::SgrAttrs;
use crate::charset::CharsetState;

/// Cursor shape for rendering (DECSCUSR).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CursorStyle {
    /// Block cursor (default).
    #[default]
    Block,
    /// Underline cursor.
    Underline,
    /// Bar/beam cursor.
    Bar,
}

impl CursorStyle {
    /// Map a DECSCUSR parameter to `(style, blink)`.
    ///
    /// 0 and 1 are both "blinking block" (0 is the terminal default).
    #[must_use]
    pub fn from_decscusr(param: u16) -> (Self, bool) {
        match param {
            0 | 1 => (CursorStyle::Block, true),
            2 => (CursorStyle::Block, false),
            3 => (CursorStyle::Underline, true),
            4 => (CursorStyle::Underline, false),
            5 => (CursorStyle::Bar, true),
            6 => (CursorStyle::Bar, false),
            _ => (CursorStyle::Block, true),
        }
    }
}

/// The live cursor.
///
/// `pending_wrap` is the deferred-autowrap state: the last print landed in
/// the final column, the cursor visually sits there, and the next printable
/// character wraps before printing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Cursor {
    pub row: u16,
    pub col: u16,
    pub visible: bool,
    pub style: CursorStyle,
    pub blink: bool,
    pub pending_wrap: bool,
}

impl Default for Cursor {
    fn default() -> Self {
        Self {
            row: 0,
            col: 0,
            visible: true,
            style: CursorStyle::Block,
            blink: true,
            pending_wrap: false,
        }
    }
}

impl Cursor {
    /// Clamp the position into `rows x cols`.
    pub fn clamp(&mut self, rows: u16, cols: u16) {
        self.row = self.row.min(rows.saturating_sub(1));
        self.col = self.col.min(cols.saturating_sub(1));
    }
}

/// Context captured by DECSC and restored by DECRC.
///
/// Each screen buffer (primary, alternate) holds an independent slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SavedCursor {
    pub row: u16,
    pub col: u16,
    pub attrs: SgrAttrs,
    pub origin_mode: bool,
    pub autowrap: bool,
    pub charsets: CharsetState,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_cursor_at_origin_visible() {
        let c = Cursor::default();
        assert_eq!((c.row, c.col), (0, 0));
        assert!(c.visible);
        assert!(!c.pending_wrap);
    }

    #[test]
    fn clamp_pulls_into_bounds() {
        let mut c = Cursor {
            row: 50,
            col: 120,
            ..Cursor::default()
        };
        c.clamp(24, 80);
        assert_eq!((c.row, c.col), (23, 79));
    }

    #[test]
    fn decscusr_mapping() {
        assert_eq!(CursorStyle::from_decscusr(0), (CursorStyle::Block, true));
        assert_eq!(CursorStyle::from_decscusr(1), (CursorStyle::Block, true));
        assert_eq!(CursorStyle::from_decscusr(2), (CursorStyle::Block, false));
        assert_eq!(
            CursorStyle::from_decscusr(3),
            (CursorStyle::Underline, true)
        );
        assert_eq!(
            CursorStyle::from_decscusr(4),
            (CursorStyle::Underline, false)
        );
        assert_eq!(CursorStyle::from_decscusr(5), (CursorStyle::Bar, true));
        assert_eq!(CursorStyle::from_decscusr(6), (CursorStyle::Bar, false));
        assert_eq!(CursorStyle::from_decscusr(99), (CursorStyle::Block, true));
    }
}
