//! Reflow: recompute line wrapping across scrollback + screen when the
//! terminal width changes.
//!
//! Physical rows are unwrapped into logical lines by following the
//! soft-wrap continuation flags, then rewrapped at the new width. The
//! cursor is tracked through the transformation as an offset into its
//! logical line. The caller (the terminal engine) installs the result
//! atomically: reflow itself only reads.

use std::collections::HashMap;

use crate::cell::{Cell, CellFlags};
use crate::grid::Grid;
use crate::scrollback::{Scrollback, ScrollbackLine};

/// Output of a reflow pass.
#[derive(Debug, Clone)]
pub struct ReflowResult {
    /// New scrollback contents, oldest first.
    pub scrollback: Vec<ScrollbackLine>,
    /// New screen rows, top first; at most `new_rows`, padded on install.
    pub screen_rows: Vec<Vec<Cell>>,
    /// Grapheme overrides rebased to screen coordinates.
    pub screen_overrides: HashMap<(u16, u16), String>,
    pub cursor_row: u16,
    pub cursor_col: u16,
}

/// One unwrapped logical line.
#[derive(Debug, Default)]
struct LogicalLine {
    cells: Vec<Cell>,
    /// Grapheme overrides keyed by offset into `cells`.
    overrides: HashMap<usize, String>,
}

impl LogicalLine {
    fn append_row(&mut self, cells: &[Cell], overrides: Option<&HashMap<u16, String>>) {
        let base = self.cells.len();
        for cell in cells {
            let mut cell = *cell;
            // Wrap flags are rebuilt at the new width.
            cell.flags.remove(CellFlags::WRAPPED);
            self.cells.push(cell);
        }
        if let Some(map) = overrides {
            for (&col, cluster) in map {
                self.overrides.insert(base + col as usize, cluster.clone());
            }
        }
    }

    fn trim(&mut self) {
        let mut len = self.cells.len();
        while len > 0 && self.cells[len - 1].is_blank() {
            len -= 1;
        }
        self.cells.truncate(len);
        self.overrides.retain(|&off, _| off < len);
    }
}

/// A rewrapped output row, not yet assigned to scrollback or screen.
#[derive(Debug)]
struct OutRow {
    cells: Vec<Cell>,
    overrides: HashMap<u16, String>,
    wrapped: bool,
}

impl OutRow {
    fn new(width: usize) -> Self {
        Self {
            cells: Vec::with_capacity(width),
            overrides: HashMap::new(),
            wrapped: false,
        }
    }

    fn is_blank(&self) -> bool {
        !self.wrapped && self.overrides.is_empty() && self.cells.iter().all(Cell::is_blank)
    }
}

/// Finish a row: pad to width, stamp the wrap flag, and push it.
fn close_row(out: &mut Vec<OutRow>, row: &mut OutRow, wrapped: bool, width: usize) {
    let mut finished = std::mem::replace(row, OutRow::new(width));
    while finished.cells.len() < width {
        finished.cells.push(Cell::default());
    }
    if wrapped && let Some(last) = finished.cells.last_mut() {
        last.flags.insert(CellFlags::WRAPPED);
    }
    finished.wrapped = wrapped;
    out.push(finished);
}

/// Reflow scrollback + screen to `new_cols` x `new_rows`.
///
/// `cursor_row`/`cursor_col` are screen coordinates of the live cursor.
/// `new_cols` and `new_rows` must be non-zero; zero-dimension resizes are
/// rejected by the caller as no-ops.
#[must_use]
pub fn reflow(
    scrollback: &Scrollback,
    screen: &Grid,
    cursor_row: u16,
    cursor_col: u16,
    new_cols: u16,
    new_rows: u16,
) -> ReflowResult {
    debug_assert!(new_cols > 0 && new_rows > 0);
    let old_cols = screen.cols() as usize;
    let cursor_global = scrollback.len() + cursor_row as usize;

    // ── Gather physical rows: scrollback first, then the screen ─────
    struct PhysRow<'a> {
        cells: &'a [Cell],
        overrides: Option<HashMap<u16, String>>,
        wrapped: bool,
    }

    let mut phys: Vec<PhysRow<'_>> =
        Vec::with_capacity(scrollback.len() + screen.rows() as usize);
    for line in scrollback.iter() {
        phys.push(PhysRow {
            cells: &line.cells,
            overrides: line.grapheme_overrides.clone(),
            wrapped: line.wrapped,
        });
    }
    for row in 0..screen.rows() {
        phys.push(PhysRow {
            cells: screen.row_cells(row).unwrap_or(&[]),
            overrides: screen.row_overrides(row),
            wrapped: screen.row_wrapped(row),
        });
    }

    // ── Unwrap into logical lines, mapping the cursor as we go ──────
    let mut lines: Vec<LogicalLine> = Vec::new();
    let mut current = LogicalLine::default();
    // (logical line index, offset within it)
    let mut cursor_map: Option<(usize, usize)> = None;

    for (i, row) in phys.iter().enumerate() {
        let base = current.cells.len();
        if i == cursor_global {
            cursor_map = Some((lines.len(), base + cursor_col as usize));
        }
        current.append_row(row.cells, row.overrides.as_ref());
        if row.wrapped {
            // Wrapped rows are full-width by construction; pad defensively
            // so continuation offsets stay aligned.
            while current.cells.len() < base + old_cols {
                current.cells.push(Cell::default());
            }
        } else {
            let mut line = std::mem::take(&mut current);
            line.trim();
            lines.push(line);
        }
    }
    if !current.cells.is_empty() {
        // Final physical row carried a dangling wrap flag.
        current.trim();
        lines.push(current);
    }
    drop(phys);

    // Fallback: cursor on the last logical line at its stated column.
    let (cursor_line, cursor_offset) =
        cursor_map.unwrap_or((lines.len().saturating_sub(1), cursor_col as usize));

    // ── Rewrap each logical line at the new width ───────────────────
    let width = new_cols as usize;
    let mut out: Vec<OutRow> = Vec::new();
    let mut cursor_out: Option<(usize, u16)> = None;

    let blank = Cell::default();
    for (li, line) in lines.iter().enumerate() {
        let mut row = OutRow::new(width);
        let track = li == cursor_line;

        for (off, cell) in line.cells.iter().enumerate() {
            // A single-column grid cannot hold wide pairs at all; both
            // halves degrade to blanks.
            let cell = if width < 2 && (cell.is_wide() || cell.is_wide_continuation()) {
                &blank
            } else {
                cell
            };
            // A wide lead that would straddle the boundary moves to the
            // next row; a blank spacer fills the last column.
            if cell.is_wide() && row.cells.len() + 1 == width {
                row.cells.push(Cell::default());
                close_row(&mut out, &mut row, true, width);
            }
            if track && off == cursor_offset {
                cursor_out = Some((out.len(), row.cells.len() as u16));
            }
            if let Some(cluster) = line.overrides.get(&off) {
                row.overrides.insert(row.cells.len() as u16, cluster.clone());
            }
            row.cells.push(*cell);
            if row.cells.len() == width && off + 1 < line.cells.len() {
                close_row(&mut out, &mut row, true, width);
            }
        }

        if track && cursor_out.is_none() {
            // Cursor past the trimmed content: park it where the content
            // ends, clamped into the line's final row.
            let extra = cursor_offset.saturating_sub(line.cells.len());
            let end_col = row.cells.len().min(width - 1);
            let col = (end_col + extra).min(width - 1);
            cursor_out = Some((out.len(), col as u16));
        }

        close_row(&mut out, &mut row, false, width);
    }

    if out.is_empty() {
        out.push(OutRow::new(width));
    }
    let (mut cursor_global_new, cursor_col_new) =
        cursor_out.unwrap_or((out.len() - 1, cursor_col.min(new_cols - 1)));

    // ── Drop trailing blank rows below the cursor ───────────────────
    // Shrinking the window must not shove blank screen area into
    // scrollback above real content.
    while out.len() > cursor_global_new + 1 && out.last().is_some_and(OutRow::is_blank) {
        out.pop();
    }

    // ── Split into scrollback and screen ────────────────────────────
    let sb_count = out.len().saturating_sub(new_rows as usize);
    let mut scrollback_out = Vec::with_capacity(sb_count);
    let mut screen_rows = Vec::with_capacity(out.len() - sb_count);
    let mut screen_overrides = HashMap::new();

    for (i, row) in out.into_iter().enumerate() {
        if i < sb_count {
            scrollback_out.push(ScrollbackLine {
                cells: row.cells,
                wrapped: row.wrapped,
                grapheme_overrides: if row.overrides.is_empty() {
                    None
                } else {
                    Some(row.overrides)
                },
            });
        } else {
            let r = (i - sb_count) as u16;
            for (col, cluster) in row.overrides {
                screen_overrides.insert((r, col), cluster);
            }
            screen_rows.push(row.cells);
        }
    }

    // ── Clamp the cursor into the new screen ────────────────────────
    cursor_global_new = cursor_global_new.max(sb_count);
    let cursor_row_new = ((cursor_global_new - sb_count) as u16).min(new_rows - 1);

    ReflowResult {
        scrollback: scrollback_out,
        screen_rows,
        screen_overrides,
        cursor_row: cursor_row_new,
        cursor_col: cursor_col_new.min(new_cols - 1),
    }
}
