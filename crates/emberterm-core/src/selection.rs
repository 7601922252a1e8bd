//! Selection model + copy extraction over the combined buffer.
//!
//! Selection coordinates span scrollback and viewport as one line space:
//! `0..scrollback.len()` are scrollback lines (oldest first), followed by
//! the screen rows. The snapshot producer consults the active selection to
//! stamp the `selected` flag on packed cells; [`selection_text`] extracts
//! the selected content for the clipboard, honoring soft-wrap continuation
//! (no synthetic newline inside a wrapped logical line).

use crate::cell::Cell;
use crate::grid::Grid;
use crate::scrollback::Scrollback;

/// A cell position in the combined buffer (scrollback + viewport).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferPos {
    /// 0-indexed line in the combined buffer.
    pub line: u32,
    /// 0-indexed column.
    pub col: u16,
}

impl BufferPos {
    #[must_use]
    pub const fn new(line: u32, col: u16) -> Self {
        Self { line, col }
    }

    /// Convert a viewport (row, col) into a combined-buffer position.
    #[must_use]
    pub fn from_viewport(scrollback_lines: usize, row: u16, col: u16) -> Self {
        Self {
            line: scrollback_lines as u32 + u32::from(row),
            col,
        }
    }
}

/// Inclusive selection over the combined buffer.
///
/// Invariant: after [`Selection::normalized`], `start <= end`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub start: BufferPos,
    pub end: BufferPos,
}

impl Selection {
    #[must_use]
    pub const fn new(start: BufferPos, end: BufferPos) -> Self {
        Self { start, end }
    }

    /// Normalize start/end ordering.
    #[must_use]
    pub fn normalized(self) -> Self {
        if self.start <= self.end {
            self
        } else {
            Self {
                start: self.end,
                end: self.start,
            }
        }
    }

    /// Whether the (normalized) selection covers `(line, col)`.
    ///
    /// Stream semantics: on interior lines every column is covered; on the
    /// first/last line the selection runs from `start.col` / to `end.col`.
    #[must_use]
    pub fn contains(&self, line: u32, col: u16) -> bool {
        let s = self.normalized();
        if line < s.start.line || line > s.end.line {
            return false;
        }
        if s.start.line == s.end.line {
            return col >= s.start.col && col <= s.end.col;
        }
        if line == s.start.line {
            return col >= s.start.col;
        }
        if line == s.end.line {
            return col <= s.end.col;
        }
        true
    }
}

/// A line of the combined buffer, borrowed from scrollback or screen.
struct CombinedLine<'a> {
    cells: &'a [Cell],
    wrapped: bool,
    /// Screen row index when the line is on screen (for override lookup).
    screen_row: Option<u16>,
}

fn combined_line<'a>(
    grid: &'a Grid,
    scrollback: &'a Scrollback,
    line: u32,
) -> Option<CombinedLine<'a>> {
    let sb_len = scrollback.len() as u32;
    if line < sb_len {
        let sl = scrollback.get(line as usize)?;
        Some(CombinedLine {
            cells: &sl.cells,
            wrapped: sl.wrapped,
            screen_row: None,
        })
    } else {
        let row = (line - sb_len) as u16;
        let cells = grid.row_cells(row)?;
        Some(CombinedLine {
            cells,
            wrapped: grid.row_wrapped(row),
            screen_row: Some(row),
        })
    }
}

/// Total number of lines in the combined buffer.
#[must_use]
pub fn total_lines(grid: &Grid, scrollback: &Scrollback) -> u32 {
    scrollback.len() as u32 + u32::from(grid.rows())
}

/// Extract the selected text.
///
/// Wide continuations are skipped, grapheme overrides substitute their
/// scalar, trailing blanks per line are dropped, and a newline is inserted
/// only between lines that are not soft-wrap continuations of each other.
#[must_use]
pub fn selection_text(selection: Selection, grid: &Grid, scrollback: &Scrollback) -> String {
    let s = selection.normalized();
    let last_line = total_lines(grid, scrollback).saturating_sub(1);
    if s.start.line > last_line {
        return String::new();
    }
    let end_line = s.end.line.min(last_line);

    let mut out = String::new();
    for line_idx in s.start.line..=end_line {
        let Some(line) = combined_line(grid, scrollback, line_idx) else {
            continue;
        };

        let from = if line_idx == s.start.line {
            s.start.col as usize
        } else {
            0
        };
        let mut to = if line_idx == end_line {
            (s.end.col as usize + 1).min(line.cells.len())
        } else {
            line.cells.len()
        };
        // Trim trailing blanks inside the selected span.
        while to > from && line.cells[to - 1].is_blank() {
            to -= 1;
        }

        for (i, cell) in line.cells[from..to].iter().enumerate() {
            if cell.is_wide_continuation() {
                continue;
            }
            let col = (from + i) as u16;
            let over = line
                .screen_row
                .and_then(|r| grid.grapheme_override(r, col))
                .or_else(|| {
                    if line.screen_row.is_some() {
                        None
                    } else {
                        scrollback
                            .get(line_idx as usize)
                            .and_then(|sl| sl.grapheme_overrides.as_ref())
                            .and_then(|m| m.get(&col))
                            .map(String::as_str)
                    }
                });
            match over {
                Some(cluster) => out.push_str(cluster),
                None => out.push(cell.content()),
            }
        }

        // Soft-wrapped lines continue on the next row without a newline.
        if line_idx != end_line && !line.wrapped {
            out.push('\n');
        }
    }
    out
}
