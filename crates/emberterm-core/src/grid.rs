//! Screen buffer: a flat 2D cell matrix plus the row operations the
//! sequence handlers drive (print, erase, insert/delete, scroll).
//!
//! Cells are stored row-major in one contiguous `Vec<Cell>`; row operations
//! mutate in place. Rare multi-scalar grapheme clusters live in a side map
//! keyed by `(row, col)` so the print path stays allocation-free.

use std::collections::HashMap;

use crate::cell::{Cell, CellFlags, Color, SgrAttrs};
use crate::scrollback::{Scrollback, ScrollbackLine};
use crate::width::char_width;

/// One screen buffer (primary or alternate).
#[derive(Debug, Clone)]
pub struct Grid {
    cells: Vec<Cell>,
    cols: u16,
    rows: u16,
    /// Multi-scalar grapheme clusters by cell position.
    overrides: HashMap<(u16, u16), String>,
}

impl Grid {
    /// Create a new grid filled with default (blank) cells.
    #[must_use]
    pub fn new(cols: u16, rows: u16) -> Self {
        let len = (cols as usize) * (rows as usize);
        Self {
            cells: vec![Cell::default(); len],
            cols,
            rows,
            overrides: HashMap::new(),
        }
    }

    /// Number of columns.
    #[must_use]
    pub fn cols(&self) -> u16 {
        self.cols
    }

    /// Number of rows.
    #[must_use]
    pub fn rows(&self) -> u16 {
        self.rows
    }

    /// Get a reference to the cell at `(row, col)`.
    #[must_use]
    pub fn cell(&self, row: u16, col: u16) -> Option<&Cell> {
        if row < self.rows && col < self.cols {
            Some(&self.cells[self.index(row, col)])
        } else {
            None
        }
    }

    /// Get a mutable reference to the cell at `(row, col)`.
    pub fn cell_mut(&mut self, row: u16, col: u16) -> Option<&mut Cell> {
        if row < self.rows && col < self.cols {
            let idx = self.index(row, col);
            Some(&mut self.cells[idx])
        } else {
            None
        }
    }

    /// Get a slice of cells for the given row.
    #[must_use]
    pub fn row_cells(&self, row: u16) -> Option<&[Cell]> {
        if row < self.rows {
            let start = (row as usize) * (self.cols as usize);
            Some(&self.cells[start..start + self.cols as usize])
        } else {
            None
        }
    }

    /// Get a mutable slice of cells for the given row.
    pub fn row_cells_mut(&mut self, row: u16) -> Option<&mut [Cell]> {
        if row < self.rows {
            let start = (row as usize) * (self.cols as usize);
            Some(&mut self.cells[start..start + self.cols as usize])
        } else {
            None
        }
    }

    // ── Grapheme overrides ──────────────────────────────────────────

    /// The grapheme cluster overriding the scalar at `(row, col)`, if any.
    #[must_use]
    pub fn grapheme_override(&self, row: u16, col: u16) -> Option<&str> {
        self.overrides.get(&(row, col)).map(String::as_str)
    }

    /// Install a multi-scalar grapheme cluster at `(row, col)`.
    ///
    /// The cell keeps its first scalar as `content`; consumers that can
    /// render full clusters substitute the override.
    pub fn set_grapheme_override(&mut self, row: u16, col: u16, cluster: String) {
        if row < self.rows && col < self.cols {
            self.overrides.insert((row, col), cluster);
        }
    }

    /// Remove the override at `(row, col)`, if any.
    pub fn clear_grapheme_override(&mut self, row: u16, col: u16) {
        self.overrides.remove(&(row, col));
    }

    /// Collect one row's overrides keyed by column (for scrollback).
    #[must_use]
    pub fn row_overrides(&self, row: u16) -> Option<HashMap<u16, String>> {
        let map: HashMap<u16, String> = self
            .overrides
            .iter()
            .filter(|((r, _), _)| *r == row)
            .map(|((_, c), s)| (*c, s.clone()))
            .collect();
        if map.is_empty() { None } else { Some(map) }
    }

    fn drop_overrides_in_row_span(&mut self, row: u16, start_col: u16, end_col: u16) {
        self.overrides
            .retain(|&(r, c), _| r != row || c < start_col || c >= end_col);
    }

    fn drop_overrides_in_rows(&mut self, start_row: u16, end_row: u16) {
        self.overrides
            .retain(|&(r, _), _| r < start_row || r >= end_row);
    }

    /// Shift override rows by `delta` within `[top, bottom)`, dropping
    /// entries that leave the region.
    fn shift_override_rows(&mut self, top: u16, bottom: u16, delta: i32) {
        if self.overrides.is_empty() {
            return;
        }
        let old = std::mem::take(&mut self.overrides);
        for ((r, c), s) in old {
            if r < top || r >= bottom {
                self.overrides.insert((r, c), s);
                continue;
            }
            let shifted = i32::from(r) + delta;
            if shifted >= i32::from(top) && shifted < i32::from(bottom) {
                self.overrides.insert((shifted as u16, c), s);
            }
        }
    }

    /// Shift override columns by `delta` at or right of `start` in `row`.
    fn shift_override_cols(&mut self, row: u16, start: u16, delta: i32) {
        if self.overrides.is_empty() {
            return;
        }
        let cols = self.cols;
        let old = std::mem::take(&mut self.overrides);
        for ((r, c), s) in old {
            if r != row || c < start {
                self.overrides.insert((r, c), s);
                continue;
            }
            let shifted = i32::from(c) + delta;
            if shifted >= 0 && shifted < i32::from(cols) {
                self.overrides.insert((r, shifted as u16), s);
            }
        }
    }

    // ── Wrap flags ──────────────────────────────────────────────────

    /// Whether `row` soft-wraps onto the next row.
    #[must_use]
    pub fn row_wrapped(&self, row: u16) -> bool {
        if self.cols == 0 {
            return false;
        }
        self.cell(row, self.cols - 1).is_some_and(Cell::is_wrapped)
    }

    /// Set or clear the wrap flag on the row's last cell.
    pub fn set_row_wrapped(&mut self, row: u16, wrapped: bool) {
        if self.cols == 0 {
            return;
        }
        let last = self.cols - 1;
        if let Some(cell) = self.cell_mut(row, last) {
            cell.flags.set(CellFlags::WRAPPED, wrapped);
        }
    }

    // ── Erase operations ────────────────────────────────────────────

    /// ED 0: Erase from cursor to end of display.
    pub fn erase_below(&mut self, row: u16, col: u16, bg: Color) {
        if row >= self.rows {
            return;
        }
        self.erase_row_span(row, col, self.cols, bg);
        if row + 1 < self.rows {
            self.erase_rows(row + 1, self.rows, bg);
        }
    }

    /// ED 1: Erase from start of display to cursor (inclusive).
    pub fn erase_above(&mut self, row: u16, col: u16, bg: Color) {
        if row >= self.rows {
            return;
        }
        if row > 0 {
            self.erase_rows(0, row, bg);
        }
        self.erase_row_span(row, 0, (col + 1).min(self.cols), bg);
    }

    /// ED 2: Erase entire display.
    pub fn erase_all(&mut self, bg: Color) {
        for cell in &mut self.cells {
            cell.erase(bg);
        }
        self.overrides.clear();
    }

    /// EL 0: Erase from cursor to end of line.
    pub fn erase_line_right(&mut self, row: u16, col: u16, bg: Color) {
        self.erase_row_span(row, col, self.cols, bg);
    }

    /// EL 1: Erase from start of line to cursor (inclusive).
    pub fn erase_line_left(&mut self, row: u16, col: u16, bg: Color) {
        self.erase_row_span(row, 0, (col + 1).min(self.cols), bg);
    }

    /// EL 2: Erase entire line.
    pub fn erase_line(&mut self, row: u16, bg: Color) {
        self.erase_row_span(row, 0, self.cols, bg);
    }

    /// ECH: Erase `count` cells starting at `(row, col)` without moving
    /// the cursor.
    pub fn erase_chars(&mut self, row: u16, col: u16, count: u16, bg: Color) {
        if row >= self.rows || col >= self.cols {
            return;
        }
        let end = col.saturating_add(count).min(self.cols);
        self.erase_row_span(row, col, end, bg);
    }

    /// Erase `[start_col, end_col)` of one row, fixing up wide pairs that
    /// straddle the span boundary.
    fn erase_row_span(&mut self, row: u16, start_col: u16, end_col: u16, bg: Color) {
        if row >= self.rows {
            return;
        }
        let sc = start_col.min(self.cols);
        let ec = end_col.min(self.cols);
        if sc >= ec {
            return;
        }

        // A continuation at the left edge means its head sits just outside
        // the span and would be orphaned.
        if sc > 0 {
            let idx = self.index(row, sc);
            if self.cells[idx].is_wide_continuation() {
                let head = self.index(row, sc - 1);
                self.cells[head].erase(bg);
                self.overrides.remove(&(row, sc - 1));
            }
        }
        // A continuation just past the right edge loses its head.
        if ec < self.cols {
            let idx = self.index(row, ec);
            if self.cells[idx].is_wide_continuation() {
                self.cells[idx].erase(bg);
            }
        }

        for c in sc..ec {
            let idx = self.index(row, c);
            self.cells[idx].erase(bg);
        }
        self.drop_overrides_in_row_span(row, sc, ec);
    }

    /// Erase the full rows `[start_row, end_row)`.
    fn erase_rows(&mut self, start_row: u16, end_row: u16, bg: Color) {
        let sr = start_row.min(self.rows);
        let er = end_row.min(self.rows);
        let start = sr as usize * self.cols as usize;
        let end = er as usize * self.cols as usize;
        for cell in &mut self.cells[start..end] {
            cell.erase(bg);
        }
        self.drop_overrides_in_rows(sr, er);
    }

    /// Clear the entire grid to default cells.
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            cell.clear();
        }
        self.overrides.clear();
    }

    /// Fill every cell with the given character and default attributes.
    ///
    /// Used by DECALN (Screen Alignment Test) which fills the screen
    /// with 'E'.
    pub fn fill_all(&mut self, ch: char) {
        for cell in &mut self.cells {
            cell.clear();
            cell.set_content(ch, 1);
        }
        self.overrides.clear();
    }

    // ── Insert / delete characters ──────────────────────────────────

    /// ICH: Insert `count` blank cells at `(row, col)`, shifting existing
    /// cells right. Cells past the right margin are lost.
    pub fn insert_chars(&mut self, row: u16, col: u16, count: u16, bg: Color) {
        if row >= self.rows || col >= self.cols || count == 0 {
            return;
        }
        let cols = self.cols as usize;
        let c = col as usize;
        let n = (count as usize).min(cols - c);
        let start = self.index(row, 0);
        let row_slice = &mut self.cells[start..start + cols];

        // Inserting at a continuation cell orphans the head at col-1.
        let was_continuation = row_slice[c].is_wide_continuation();
        if was_continuation && c > 0 {
            row_slice[c - 1].erase(bg);
        }

        for i in (c + n..cols).rev() {
            row_slice[i] = row_slice[i - n];
        }
        for cell in &mut row_slice[c..c + n] {
            cell.erase(bg);
        }

        // The continuation that shifted right lost its head.
        if was_continuation && c + n < cols && row_slice[c + n].is_wide_continuation() {
            row_slice[c + n].erase(bg);
        }
        // A wide head shifted into the last column loses its continuation.
        if row_slice[cols - 1].is_wide() {
            row_slice[cols - 1].erase(bg);
        }

        self.shift_override_cols(row, col, n as i32);
        self.drop_overrides_in_row_span(row, col, col + n as u16);
    }

    /// DCH: Delete `count` cells at `(row, col)`, shifting the tail left.
    /// Blank cells fill in at the right margin.
    pub fn delete_chars(&mut self, row: u16, col: u16, count: u16, bg: Color) {
        if row >= self.rows || col >= self.cols || count == 0 {
            return;
        }
        let cols = self.cols as usize;
        let c = col as usize;
        let n = (count as usize).min(cols - c);
        let start = self.index(row, 0);
        let row_slice = &mut self.cells[start..start + cols];

        if row_slice[c].is_wide_continuation() && c > 0 {
            row_slice[c - 1].erase(bg);
        }

        for i in c..cols - n {
            row_slice[i] = row_slice[i + n];
        }
        for cell in &mut row_slice[cols - n..] {
            cell.erase(bg);
        }

        // An orphaned continuation pulled to col means its head was deleted.
        if row_slice[c].is_wide_continuation() {
            row_slice[c].erase(bg);
        }

        self.drop_overrides_in_row_span(row, col, col + n as u16);
        self.shift_override_cols(row, col + n as u16, -(n as i32));
    }

    // ── Scroll operations ───────────────────────────────────────────

    /// Scroll rows `[top, bottom)` up by `count`; vacated rows at the
    /// bottom are blanked with `bg` (background-color-erase).
    pub fn scroll_up(&mut self, top: u16, bottom: u16, count: u16, bg: Color) {
        let top = top.min(self.rows);
        let bottom = bottom.min(self.rows);
        if top >= bottom || count == 0 {
            return;
        }
        let count = count.min(bottom - top);
        let cols = self.cols as usize;

        let src_start = (top + count) as usize * cols;
        let dst_start = top as usize * cols;
        let move_len = (bottom - top - count) as usize * cols;
        self.cells
            .copy_within(src_start..src_start + move_len, dst_start);

        let blank_start = (bottom - count) as usize * cols;
        let blank_end = bottom as usize * cols;
        for cell in &mut self.cells[blank_start..blank_end] {
            cell.erase(bg);
        }

        self.shift_override_rows(top, bottom, -i32::from(count));
    }

    /// Scroll rows `[top, bottom)` down by `count`; vacated rows at the
    /// top are blanked with `bg`.
    pub fn scroll_down(&mut self, top: u16, bottom: u16, count: u16, bg: Color) {
        let top = top.min(self.rows);
        let bottom = bottom.min(self.rows);
        if top >= bottom || count == 0 {
            return;
        }
        let count = count.min(bottom - top);
        let cols = self.cols as usize;

        let src_start = top as usize * cols;
        let src_len = (bottom - top - count) as usize * cols;
        let dst_start = (top + count) as usize * cols;
        self.cells
            .copy_within(src_start..src_start + src_len, dst_start);

        let blank_end = (top + count) as usize * cols;
        for cell in &mut self.cells[top as usize * cols..blank_end] {
            cell.erase(bg);
        }

        self.shift_override_rows(top, bottom, i32::from(count));
    }

    /// Scroll up, pushing the evicted top rows into scrollback.
    ///
    /// Each pushed line takes its wrap flag from its last cell and carries
    /// its grapheme overrides along. Evicted scrollback lines are returned
    /// so the caller can release hyperlink references.
    pub fn scroll_up_into(
        &mut self,
        top: u16,
        bottom: u16,
        count: u16,
        scrollback: &mut Scrollback,
        bg: Color,
    ) -> Vec<ScrollbackLine> {
        let top = top.min(self.rows);
        let bottom = bottom.min(self.rows);
        let mut evicted = Vec::new();
        if top >= bottom || count == 0 {
            return evicted;
        }
        let count = count.min(bottom - top);

        for r in top..top + count {
            let wrapped = self.row_wrapped(r);
            let overrides = self.row_overrides(r);
            if let Some(row) = self.row_cells(r) {
                let mut line = ScrollbackLine::new(row, wrapped);
                line.grapheme_overrides = overrides;
                if let Some(old) = scrollback.push(line) {
                    evicted.push(old);
                }
            }
        }

        self.scroll_up(top, bottom, count, bg);
        evicted
    }

    /// IL: Insert `count` blank lines at `row` within `[top, bottom)`.
    pub fn insert_lines(&mut self, row: u16, count: u16, top: u16, bottom: u16, bg: Color) {
        if row < top || row >= bottom {
            return;
        }
        self.scroll_down(row, bottom, count, bg);
    }

    /// DL: Delete `count` lines at `row` within `[top, bottom)`.
    pub fn delete_lines(&mut self, row: u16, count: u16, top: u16, bottom: u16, bg: Color) {
        if row < top || row >= bottom {
            return;
        }
        self.scroll_up(row, bottom, count, bg);
    }

    // ── Writing ─────────────────────────────────────────────────────

    /// Write a wide (2-column) character at `(row, col)`.
    ///
    /// Requires `col + 1 < cols`; otherwise no write occurs. Clears any
    /// wide pair this write would partially overwrite.
    pub fn write_wide_char(&mut self, row: u16, col: u16, ch: char, attrs: SgrAttrs) {
        if row >= self.rows || col + 1 >= self.cols {
            return;
        }
        // Overwriting a continuation orphans the head to the left.
        if col > 0 {
            let prev = self.index(row, col - 1);
            if self.cells[prev].is_wide() {
                self.cells[prev].clear();
                self.overrides.remove(&(row, col - 1));
            }
        }
        // Overwriting a head at col+1 orphans its continuation at col+2.
        let next = self.index(row, col + 1);
        if self.cells[next].is_wide() && col + 2 < self.cols {
            let cont = self.index(row, col + 2);
            self.cells[cont].clear();
        }

        let (lead, cont) = Cell::wide(ch, attrs);
        let lead_idx = self.index(row, col);
        self.cells[lead_idx] = lead;
        self.cells[next] = cont;
        self.overrides.remove(&(row, col));
        self.overrides.remove(&(row, col + 1));
    }

    /// Write one printable scalar with terminal-width semantics.
    ///
    /// Returns the width written (1 or 2), or 0 when a wide character does
    /// not fit at `col`. Wrap policy belongs to the caller.
    pub fn write_printable(&mut self, row: u16, col: u16, ch: char, attrs: SgrAttrs) -> u8 {
        if row >= self.rows || col >= self.cols {
            return 0;
        }

        match char_width(ch) {
            1 => {
                // Overwriting a continuation orphans the head to the left.
                if col > 0 {
                    let prev = self.index(row, col - 1);
                    if self.cells[prev].is_wide() {
                        self.cells[prev].clear();
                        self.overrides.remove(&(row, col - 1));
                    }
                }
                // Overwriting a head orphans its continuation.
                let idx = self.index(row, col);
                if self.cells[idx].is_wide() && col + 1 < self.cols {
                    let cont = self.index(row, col + 1);
                    self.cells[cont].clear();
                }

                let cell = &mut self.cells[idx];
                cell.set_content(ch, 1);
                cell.attrs = attrs;
                cell.hyperlink = 0;
                self.overrides.remove(&(row, col));
                1
            }
            _ => {
                if col + 1 >= self.cols {
                    return 0;
                }
                self.write_wide_char(row, col, ch, attrs);
                2
            }
        }
    }

    // ── Text extraction ─────────────────────────────────────────────

    /// Materialize a row as text, trimming trailing blanks and applying
    /// grapheme overrides.
    #[must_use]
    pub fn row_text(&self, row: u16) -> String {
        let Some(cells) = self.row_cells(row) else {
            return String::new();
        };
        let mut len = cells.len();
        while len > 0 && cells[len - 1].is_blank() {
            len -= 1;
        }
        let mut out = String::new();
        for (col, cell) in cells[..len].iter().enumerate() {
            if cell.is_wide_continuation() {
                continue;
            }
            match self.grapheme_override(row, col as u16) {
                Some(cluster) => out.push_str(cluster),
                None => out.push(cell.content()),
            }
        }
        out
    }

    // ── Resize ──────────────────────────────────────────────────────

    /// Pad/truncate resize: rows and columns that fit are kept, extras are
    /// dropped, new space is blank.
    ///
    /// This is the alternate-screen policy; the primary screen reflows
    /// through [`crate::reflow`] instead.
    pub fn resize(&mut self, new_cols: u16, new_rows: u16) {
        if new_cols == self.cols && new_rows == self.rows {
            return;
        }
        let mut new_cells = vec![Cell::default(); new_cols as usize * new_rows as usize];
        let copy_rows = self.rows.min(new_rows);
        let copy_cols = self.cols.min(new_cols) as usize;

        for r in 0..copy_rows {
            let old_start = (r as usize) * (self.cols as usize);
            let new_start = (r as usize) * (new_cols as usize);
            new_cells[new_start..new_start + copy_cols]
                .copy_from_slice(&self.cells[old_start..old_start + copy_cols]);
            // Truncation can cut a wide pair at the new right edge; clear
            // the orphaned head.
            if copy_cols > 0 {
                let last = &mut new_cells[new_start + copy_cols - 1];
                if last.is_wide() {
                    last.clear();
                }
            }
        }

        self.cells = new_cells;
        self.overrides
            .retain(|&(r, c), _| r < new_rows && c < new_cols);
        self.cols = new_cols;
        self.rows = new_rows;
    }

    /// Replace the buffer contents with prebuilt rows (reflow install).
    ///
    /// Rows shorter than the width are padded with blanks; extra rows are
    /// ignored. Overrides are replaced wholesale.
    pub fn install_rows(
        &mut self,
        rows: Vec<Vec<Cell>>,
        overrides: HashMap<(u16, u16), String>,
        new_cols: u16,
        new_rows: u16,
    ) {
        let mut cells = vec![Cell::default(); new_cols as usize * new_rows as usize];
        for (r, row) in rows.into_iter().take(new_rows as usize).enumerate() {
            let start = r * new_cols as usize;
            let n = row.len().min(new_cols as usize);
            cells[start..start + n].copy_from_slice(&row[..n]);
        }
        self.cells = cells;
        self.cols = new_cols;
        self.rows = new_rows;
        self.overrides = overrides;
        self.overrides
            .retain(|&(r, c), _| r < new_rows && c < new_cols);
    }

    #[inline]
    fn index(&self, row: u16, col: u16) -> usize {
        (row as usize) * (self.cols as usize) + (col as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill_grid_letters(g: &mut Grid) {
        for r in 0..g.rows() {
            let ch = (b'A' + r as u8) as char;
            for c in 0..g.cols() {
                g.cell_mut(r, c).unwrap().set_content(ch, 1);
            }
        }
    }

    fn row_string(g: &Grid, row: u16) -> String {
        g.row_cells(row)
            .unwrap()
            .iter()
            .map(Cell::content)
            .collect()
    }

    #[test]
    fn new_grid_has_correct_dimensions() {
        let g = Grid::new(80, 24);
        assert_eq!(g.cols(), 80);
        assert_eq!(g.rows(), 24);
        assert_eq!(g.cell(0, 0).unwrap().content(), ' ');
        assert!(g.cell(24, 0).is_none());
        assert!(g.cell(0, 80).is_none());
    }

    #[test]
    fn scroll_up_shifts_and_blanks_with_bg() {
        let mut g = Grid::new(3, 4);
        fill_grid_letters(&mut g);
        g.scroll_up(0, 4, 1, Color::Indexed(4));
        assert_eq!(row_string(&g, 0), "BBB");
        assert_eq!(row_string(&g, 2), "DDD");
        assert_eq!(g.cell(3, 0).unwrap().content(), ' ');
        assert_eq!(g.cell(3, 0).unwrap().attrs.bg, Color::Indexed(4));
    }

    #[test]
    fn scroll_down_shifts_and_blanks() {
        let mut g = Grid::new(3, 4);
        fill_grid_letters(&mut g);
        g.scroll_down(0, 4, 1, Color::Default);
        assert_eq!(row_string(&g, 0), "   ");
        assert_eq!(row_string(&g, 1), "AAA");
        assert_eq!(row_string(&g, 3), "CCC");
    }

    #[test]
    fn scroll_up_into_preserves_wrap_flag() {
        let mut g = Grid::new(3, 2);
        fill_grid_letters(&mut g);
        g.set_row_wrapped(0, true);
        let mut sb = Scrollback::new(10);
        g.scroll_up_into(0, 2, 1, &mut sb, Color::Default);
        assert_eq!(sb.len(), 1);
        assert!(sb.get(0).unwrap().wrapped);
    }

    #[test]
    fn scroll_up_into_carries_overrides() {
        let mut g = Grid::new(3, 2);
        g.cell_mut(0, 1).unwrap().set_content('e', 1);
        g.set_grapheme_override(0, 1, "e\u{0301}".to_string());
        let mut sb = Scrollback::new(10);
        g.scroll_up_into(0, 2, 1, &mut sb, Color::Default);
        let line = sb.get(0).unwrap();
        assert_eq!(
            line.grapheme_overrides.as_ref().unwrap().get(&1).unwrap(),
            "e\u{0301}"
        );
        assert!(g.grapheme_override(0, 1).is_none());
    }

    #[test]
    fn erase_below_from_mid_row() {
        let mut g = Grid::new(5, 3);
        for r in 0..3u16 {
            for c in 0..5u16 {
                g.cell_mut(r, c).unwrap().set_content('X', 1);
            }
        }
        g.erase_below(1, 2, Color::Default);
        assert_eq!(g.cell(0, 4).unwrap().content(), 'X');
        assert_eq!(g.cell(1, 1).unwrap().content(), 'X');
        assert_eq!(g.cell(1, 2).unwrap().content(), ' ');
        assert_eq!(g.cell(2, 0).unwrap().content(), ' ');
    }

    #[test]
    fn erase_above_from_mid_row() {
        let mut g = Grid::new(5, 3);
        for r in 0..3u16 {
            for c in 0..5u16 {
                g.cell_mut(r, c).unwrap().set_content('X', 1);
            }
        }
        g.erase_above(1, 2, Color::Default);
        assert_eq!(g.cell(0, 0).unwrap().content(), ' ');
        assert_eq!(g.cell(1, 2).unwrap().content(), ' ');
        assert_eq!(g.cell(1, 3).unwrap().content(), 'X');
        assert_eq!(g.cell(2, 0).unwrap().content(), 'X');
    }

    #[test]
    fn erase_honors_sgr_background() {
        let mut g = Grid::new(3, 1);
        g.erase_line(0, Color::Indexed(2));
        assert_eq!(g.cell(0, 0).unwrap().attrs.bg, Color::Indexed(2));
    }

    #[test]
    fn erase_chars_within_row() {
        let mut g = Grid::new(5, 1);
        for c in 0..5u16 {
            g.cell_mut(0, c).unwrap().set_content('X', 1);
        }
        g.erase_chars(0, 1, 2, Color::Default);
        assert_eq!(row_string(&g, 0), "X  XX");
    }

    #[test]
    fn erase_span_fixes_straddled_wide_char() {
        let mut g = Grid::new(6, 1);
        g.write_wide_char(0, 1, '中', SgrAttrs::default());
        // Erase starting at the continuation: the head must go too.
        g.erase_chars(0, 2, 1, Color::Default);
        assert_eq!(g.cell(0, 1).unwrap().content(), ' ');
        assert!(!g.cell(0, 1).unwrap().is_wide());
    }

    #[test]
    fn insert_chars_shifts_right() {
        let mut g = Grid::new(5, 1);
        for c in 0..5u16 {
            g.cell_mut(0, c)
                .unwrap()
                .set_content((b'A' + c as u8) as char, 1);
        }
        g.insert_chars(0, 1, 2, Color::Default);
        assert_eq!(row_string(&g, 0), "A  BC");
    }

    #[test]
    fn delete_chars_shifts_left() {
        let mut g = Grid::new(5, 1);
        for c in 0..5u16 {
            g.cell_mut(0, c)
                .unwrap()
                .set_content((b'A' + c as u8) as char, 1);
        }
        g.delete_chars(0, 1, 2, Color::Default);
        assert_eq!(row_string(&g, 0), "ADE  ");
    }

    #[test]
    fn insert_delete_lines_within_region() {
        let mut g = Grid::new(2, 4);
        fill_grid_letters(&mut g);
        g.insert_lines(1, 1, 0, 4, Color::Default);
        assert_eq!(row_string(&g, 0), "AA");
        assert_eq!(row_string(&g, 1), "  ");
        assert_eq!(row_string(&g, 2), "BB");

        let mut g = Grid::new(2, 4);
        fill_grid_letters(&mut g);
        g.delete_lines(1, 1, 0, 4, Color::Default);
        assert_eq!(row_string(&g, 1), "CC");
        assert_eq!(row_string(&g, 3), "  ");
    }

    #[test]
    fn lines_outside_region_are_noop() {
        let mut g = Grid::new(2, 4);
        fill_grid_letters(&mut g);
        g.insert_lines(0, 1, 1, 3, Color::Default);
        assert_eq!(row_string(&g, 0), "AA");
        g.delete_lines(3, 1, 1, 3, Color::Default);
        assert_eq!(row_string(&g, 3), "DD");
    }

    #[test]
    fn write_wide_char_sets_pair() {
        let mut g = Grid::new(10, 1);
        g.write_wide_char(0, 3, '中', SgrAttrs::default());
        assert!(g.cell(0, 3).unwrap().is_wide());
        assert_eq!(g.cell(0, 3).unwrap().content(), '中');
        assert!(g.cell(0, 4).unwrap().is_wide_continuation());
    }

    #[test]
    fn write_wide_at_margin_is_noop() {
        let mut g = Grid::new(5, 1);
        g.write_wide_char(0, 4, '中', SgrAttrs::default());
        assert_eq!(g.cell(0, 4).unwrap().content(), ' ');
    }

    #[test]
    fn overwrite_wide_continuation_clears_leading() {
        let mut g = Grid::new(10, 1);
        g.write_wide_char(0, 2, '中', SgrAttrs::default());
        g.write_wide_char(0, 3, '国', SgrAttrs::default());
        assert_eq!(g.cell(0, 2).unwrap().content(), ' ');
        assert!(!g.cell(0, 2).unwrap().is_wide());
        assert!(g.cell(0, 3).unwrap().is_wide());
        assert!(g.cell(0, 4).unwrap().is_wide_continuation());
    }

    #[test]
    fn write_printable_narrow_over_wide_fixes_continuation() {
        let mut g = Grid::new(6, 1);
        g.write_wide_char(0, 1, '中', SgrAttrs::default());
        assert_eq!(g.write_printable(0, 1, 'X', SgrAttrs::default()), 1);
        assert_eq!(g.cell(0, 1).unwrap().content(), 'X');
        assert!(!g.cell(0, 2).unwrap().is_wide_continuation());
    }

    #[test]
    fn write_printable_wide_reports_width() {
        let mut g = Grid::new(6, 1);
        assert_eq!(g.write_printable(0, 0, '中', SgrAttrs::default()), 2);
        assert_eq!(g.write_printable(0, 5, '中', SgrAttrs::default()), 0);
    }

    #[test]
    fn row_text_trims_and_applies_overrides() {
        let mut g = Grid::new(8, 1);
        g.write_printable(0, 0, 'h', SgrAttrs::default());
        g.write_printable(0, 1, 'e', SgrAttrs::default());
        g.set_grapheme_override(0, 1, "e\u{0301}".to_string());
        assert_eq!(g.row_text(0), "he\u{0301}");
    }

    #[test]
    fn row_text_skips_wide_continuation() {
        let mut g = Grid::new(8, 1);
        g.write_wide_char(0, 0, '中', SgrAttrs::default());
        g.write_printable(0, 2, '!', SgrAttrs::default());
        assert_eq!(g.row_text(0), "中!");
    }

    #[test]
    fn wrap_flag_round_trip() {
        let mut g = Grid::new(4, 2);
        assert!(!g.row_wrapped(0));
        g.set_row_wrapped(0, true);
        assert!(g.row_wrapped(0));
        g.set_row_wrapped(0, false);
        assert!(!g.row_wrapped(0));
    }

    #[test]
    fn resize_pad_truncate() {
        let mut g = Grid::new(3, 2);
        g.cell_mut(0, 0).unwrap().set_content('A', 1);
        g.cell_mut(1, 2).unwrap().set_content('Z', 1);
        g.resize(5, 4);
        assert_eq!(g.cell(0, 0).unwrap().content(), 'A');
        assert_eq!(g.cell(1, 2).unwrap().content(), 'Z');
        assert_eq!(g.cell(3, 4).unwrap().content(), ' ');
        g.resize(2, 1);
        assert_eq!(g.cell(0, 0).unwrap().content(), 'A');
        assert!(g.cell(1, 0).is_none());
    }

    #[test]
    fn resize_truncation_clears_cut_wide_pair() {
        let mut g = Grid::new(6, 1);
        g.write_wide_char(0, 2, '中', SgrAttrs::default());
        // New width 3 cuts the pair between head (col 2) and tail (col 3).
        g.resize(3, 1);
        assert!(!g.cell(0, 2).unwrap().is_wide());
        assert_eq!(g.cell(0, 2).unwrap().content(), ' ');
    }

    #[test]
    fn install_rows_pads_short_rows() {
        let mut g = Grid::new(2, 2);
        g.install_rows(
            vec![vec![Cell::new('a')], vec![Cell::new('b'), Cell::new('c')]],
            HashMap::new(),
            3,
            2,
        );
        assert_eq!(g.cols(), 3);
        assert_eq!(row_string(&g, 0), "a  ");
        assert_eq!(row_string(&g, 1), "bc ");
    }

    #[test]
    fn scroll_shifts_overrides() {
        let mut g = Grid::new(3, 3);
        g.set_grapheme_override(1, 0, "x\u{0301}".to_string());
        g.scroll_up(0, 3, 1, Color::Default);
        assert!(g.grapheme_override(1, 0).is_none());
        assert_eq!(g.grapheme_override(0, 0), Some("x\u{0301}"));
    }

    #[test]
    fn out_of_bounds_operations_are_safe() {
        let mut g = Grid::new(5, 3);
        g.erase_below(99, 99, Color::Default);
        g.erase_above(99, 99, Color::Default);
        g.erase_chars(99, 99, 10, Color::Default);
        g.insert_chars(99, 0, 1, Color::Default);
        g.delete_chars(0, 99, 1, Color::Default);
        g.scroll_up(2, 1, 5, Color::Default);
        g.write_printable(99, 0, 'x', SgrAttrs::default());
    }
}
