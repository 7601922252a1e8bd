//! Snapshot producer: packs grid state into a flat, GPU-ready frame.
//!
//! Snapshots are immutable values; once built they can cross threads
//! freely. The renderer consumes the packed cell instances directly as an
//! instance buffer, so the layout here is the upload format: fixed-size
//! integers, colors pre-resolved to RGBA.

use std::ops::Range;

use crate::cell::{Cell, Color, SgrFlags};
use crate::cursor::{Cursor, CursorStyle};
use crate::grid::Grid;
use crate::palette::{Palette, Rgb};
use crate::scrollback::Scrollback;
use crate::selection::Selection;

/// Packed attribute bits beyond the SGR flags.
///
/// Bits 0-9 mirror [`SgrFlags`]; the cell-structure bits follow.
pub const ATTR_WIDE_CHAR: u16 = 1 << 10;
pub const ATTR_WIDE_CONTINUATION: u16 = 1 << 11;
pub const ATTR_WRAPPED: u16 = 1 << 12;

/// Per-cell snapshot flags.
pub const FLAG_DIRTY: u8 = 1 << 0;
pub const FLAG_CURSOR: u8 = 1 << 1;
pub const FLAG_SELECTED: u8 = 1 << 2;

/// One packed cell instance in the upload format.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellInstance {
    pub row: u16,
    pub col: u16,
    /// Primary Unicode scalar. Multi-scalar clusters are delivered through
    /// the grapheme-override side channel, keyed by (row, col).
    pub glyph: u32,
    /// RGBA; 0 means "terminal default".
    pub fg: u32,
    pub bg: u32,
    /// RGBA underline color; 0 means "use fg".
    pub ul: u32,
    pub attrs: u16,
    pub flags: u8,
    pub underline_style: u8,
}

/// An immutable, renderer-ready frame.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Row-major `rows x columns` packed cells.
    pub cells: Vec<CellInstance>,
    /// Flat index range touched since the previous snapshot, if tracked.
    pub dirty_range: Option<Range<usize>>,
    pub cursor_row: u16,
    pub cursor_col: u16,
    pub cursor_visible: bool,
    pub cursor_style: CursorStyle,
    pub columns: u16,
    pub rows: u16,
}

impl Snapshot {
    /// The packed cell at `(row, col)`.
    #[must_use]
    pub fn cell_at(&self, row: u16, col: u16) -> Option<&CellInstance> {
        if row < self.rows && col < self.columns {
            self.cells
                .get(row as usize * self.columns as usize + col as usize)
        } else {
            None
        }
    }
}

/// Everything the producer reads. Borrowed from the engine for the
/// duration of one build; the engine stays untouched.
pub(crate) struct FrameSource<'a> {
    pub grid: &'a Grid,
    pub scrollback: &'a Scrollback,
    pub palette: &'a Palette,
    pub cursor: &'a Cursor,
    pub selection: Option<Selection>,
    /// Dirty row span `(min, max)`, both inclusive.
    pub dirty: Option<(u16, u16)>,
    /// Lines of scrollback composited into the top of the frame.
    pub scroll_offset: usize,
}

fn pack_rgb(rgb: Rgb) -> u32 {
    let (r, g, b) = rgb;
    (u32::from(r) << 24) | (u32::from(g) << 16) | (u32::from(b) << 8) | 0xFF
}

fn pack_color(color: Color, palette: &Palette) -> u32 {
    match color {
        Color::Default => 0,
        Color::Indexed(i) => pack_rgb(palette.indexed(i)),
        Color::Rgb(r, g, b) => pack_rgb((r, g, b)),
    }
}

fn pack_attrs(cell: &Cell) -> u16 {
    let mut attrs = cell.attrs.flags.bits();
    if cell.is_wide() {
        attrs |= ATTR_WIDE_CHAR;
    }
    if cell.is_wide_continuation() {
        attrs |= ATTR_WIDE_CONTINUATION;
    }
    if cell.is_wrapped() {
        attrs |= ATTR_WRAPPED;
    }
    attrs
}

/// Build a frame from the source state.
pub(crate) fn build_frame(src: &FrameSource<'_>) -> Snapshot {
    let cols = src.grid.cols();
    let rows = src.grid.rows();
    let sb_len = src.scrollback.len();
    let offset = src.scroll_offset.min(sb_len);

    let mut cells = Vec::with_capacity(cols as usize * rows as usize);
    let default_cell = Cell::default();

    // Cursor position in frame coordinates; scrolled back, the cursor
    // shifts down and may leave the frame entirely.
    let cursor_frame_row = src.cursor.row as usize + offset;
    let cursor_on_frame = src.cursor.visible && cursor_frame_row < rows as usize;

    for frame_row in 0..rows {
        // The top `offset` frame rows come from the tail of scrollback.
        let (line_cells, buffer_line): (&[Cell], usize) = if (frame_row as usize) < offset {
            let sb_index = sb_len - offset + frame_row as usize;
            let line = src.scrollback.get(sb_index);
            (line.map_or(&[][..], |l| &l.cells), sb_index)
        } else {
            let screen_row = frame_row - offset as u16;
            (
                src.grid.row_cells(screen_row).unwrap_or(&[]),
                sb_len + screen_row as usize,
            )
        };

        let row_dirty = offset > 0
            || src
                .dirty
                .is_some_and(|(min, max)| frame_row >= min && frame_row <= max);

        for col in 0..cols {
            let cell = line_cells.get(col as usize).unwrap_or(&default_cell);

            // Bold + indexed 0-7 brightens. Print already stores the
            // brightened value; this also covers cells whose flags were
            // merged later (e.g. selection-preserving rewrites).
            let mut fg = cell.attrs.fg;
            if cell.attrs.flags.contains(SgrFlags::BOLD) {
                fg = fg.brightened();
            }

            let mut flags = 0u8;
            if row_dirty {
                flags |= FLAG_DIRTY;
            }
            if cursor_on_frame
                && frame_row as usize == cursor_frame_row
                && col == src.cursor.col
            {
                flags |= FLAG_CURSOR;
            }
            if src
                .selection
                .is_some_and(|sel| sel.contains(buffer_line as u32, col))
            {
                flags |= FLAG_SELECTED;
            }

            cells.push(CellInstance {
                row: frame_row,
                col,
                glyph: cell.content() as u32,
                fg: pack_color(fg, src.palette),
                bg: pack_color(cell.attrs.bg, src.palette),
                ul: pack_color(cell.attrs.ul, src.palette),
                attrs: pack_attrs(cell),
                flags,
                underline_style: cell.attrs.ul_style as u8,
            });
        }
    }

    let dirty_range = if offset > 0 {
        Some(0..cells.len())
    } else {
        src.dirty.map(|(min, max)| {
            let cols = cols as usize;
            min as usize * cols..(max as usize + 1) * cols
        })
    };

    Snapshot {
        cells,
        dirty_range,
        cursor_row: cursor_frame_row.min(u16::MAX as usize) as u16,
        cursor_col: src.cursor.col,
        cursor_visible: cursor_on_frame,
        cursor_style: src.cursor.style,
        columns: cols,
        rows,
    }
}
