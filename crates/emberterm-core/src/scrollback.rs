//! Scrollback: a fixed-capacity ring of lines scrolled off the viewport.
//!
//! Storage is a single flat `Vec` addressed with `head + count` ring
//! arithmetic, so push, index, and pop are all O(1) with no per-line
//! allocation beyond the cells themselves. Rows are stored exactly as they
//! left the viewport; trailing-blank trimming happens lazily on read paths
//! (text extraction, search, reflow), never on the push path.

use std::collections::HashMap;

use crate::cell::Cell;

/// A single line in the scrollback buffer.
///
/// `wrapped` records whether the row's last cell carried the wrap flag when
/// it scrolled off, i.e. whether the next line logically continues it.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ScrollbackLine {
    pub cells: Vec<Cell>,
    pub wrapped: bool,
    /// Multi-scalar grapheme clusters by column, for the rare cells whose
    /// content does not fit a single scalar.
    pub grapheme_overrides: Option<HashMap<u16, String>>,
}

impl ScrollbackLine {
    /// Create a line from a cell slice.
    #[must_use]
    pub fn new(cells: &[Cell], wrapped: bool) -> Self {
        Self {
            cells: cells.to_vec(),
            wrapped,
            grapheme_overrides: None,
        }
    }

    /// Number of stored cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    /// Whether this line has zero cells.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Cell count ignoring the trailing run of blanks.
    #[must_use]
    pub fn trimmed_len(&self) -> usize {
        let mut len = self.cells.len();
        while len > 0 && self.cells[len - 1].is_blank() {
            len -= 1;
        }
        len
    }

    /// Materialize the line as text: wide continuations are skipped and
    /// grapheme overrides substitute their column's scalar.
    #[must_use]
    pub fn text(&self) -> String {
        let mut out = String::new();
        for (col, cell) in self.cells[..self.trimmed_len()].iter().enumerate() {
            if cell.is_wide_continuation() {
                continue;
            }
            let over = self
                .grapheme_overrides
                .as_ref()
                .and_then(|m| m.get(&(col as u16)));
            match over {
                Some(cluster) => out.push_str(cluster),
                None => out.push(cell.content()),
            }
        }
        out
    }
}

/// Fixed-capacity scrollback ring.
///
/// Logical index 0 is the oldest line. When full, pushes evict the oldest.
#[derive(Debug, Clone)]
pub struct Scrollback {
    storage: Vec<ScrollbackLine>,
    /// Storage index of logical index 0.
    head: usize,
    /// Number of valid entries.
    count: usize,
    capacity: usize,
}

impl Scrollback {
    /// Create a scrollback holding at most `capacity` lines.
    ///
    /// A capacity of 0 disables scrollback (all pushes are dropped).
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            storage: Vec::with_capacity(capacity.min(4096)),
            head: 0,
            count: 0,
            capacity,
        }
    }

    /// Maximum number of lines this ring can hold.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Current number of stored lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.count
    }

    /// Whether the ring is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    fn slot(&self, logical: usize) -> usize {
        (self.head + logical) % self.capacity.max(1)
    }

    /// Push a line, evicting (and returning) the oldest when full. O(1).
    pub fn push(&mut self, line: ScrollbackLine) -> Option<ScrollbackLine> {
        if self.capacity == 0 {
            return None;
        }
        if self.count == self.capacity {
            let evicted = std::mem::replace(&mut self.storage[self.head], line);
            self.head = (self.head + 1) % self.capacity;
            return Some(evicted);
        }
        let idx = self.slot(self.count);
        if idx < self.storage.len() {
            self.storage[idx] = line;
        } else {
            self.storage.push(line);
        }
        self.count += 1;
        None
    }

    /// Push a viewport row. `wrapped` mirrors the row's wrap flag.
    pub fn push_row(&mut self, cells: &[Cell], wrapped: bool) -> Option<ScrollbackLine> {
        self.push(ScrollbackLine::new(cells, wrapped))
    }

    /// Get a line by logical index (0 = oldest). O(1).
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&ScrollbackLine> {
        if index < self.count {
            self.storage.get(self.slot(index))
        } else {
            None
        }
    }

    /// Remove and return the most recently pushed line.
    ///
    /// Used when the screen grows on resize and lines are pulled back into
    /// view. Emptying the ring resets `head` to 0.
    pub fn pop_last(&mut self) -> Option<ScrollbackLine> {
        if self.count == 0 {
            return None;
        }
        self.count -= 1;
        let idx = self.slot(self.count);
        let line = std::mem::take(&mut self.storage[idx]);
        if self.count == 0 {
            self.head = 0;
        }
        Some(line)
    }

    /// Iterate stored lines from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &ScrollbackLine> {
        (0..self.count).map(|i| &self.storage[self.slot(i)])
    }

    /// Clear all stored lines.
    pub fn clear(&mut self) {
        self.storage.clear();
        self.head = 0;
        self.count = 0;
    }

    /// Linear substring search over materialized lines.
    ///
    /// Returns the logical indices of matching lines, oldest first.
    #[must_use]
    pub fn search(&self, query: &str, case_sensitive: bool) -> Vec<usize> {
        if query.is_empty() {
            return Vec::new();
        }
        let folded_query;
        let query = if case_sensitive {
            query
        } else {
            folded_query = query.to_lowercase();
            &folded_query
        };
        let mut hits = Vec::new();
        for i in 0..self.count {
            let text = self.storage[self.slot(i)].text();
            let matched = if case_sensitive {
                text.contains(query)
            } else {
                text.to_lowercase().contains(query)
            };
            if matched {
                hits.push(i);
            }
        }
        hits
    }
}
