//! Property-based invariant tests.
//!
//! These verify the structural guarantees that must hold for **any** input:
//!
//! 1. No byte stream panics the engine or desynchronizes the parser.
//! 2. The cursor stays inside the grid after any feed.
//! 3. Wide cells always pair with a continuation cell.
//! 4. Scrollback never exceeds its cap.
//! 5. Identical input produces identical state (determinism).
//! 6. Resize (reflow) keeps invariants and is idempotent.

use emberterm_core::Terminal;
use proptest::prelude::*;

/// Small-but-interesting terminal dimensions.
fn dims() -> impl Strategy<Value = (u16, u16)> {
    (1u16..=120, 1u16..=50)
}

/// Byte streams weighted toward escape-sequence bytes so the parser's
/// non-Ground states actually get exercised.
fn dense_bytes() -> impl Strategy<Value = Vec<u8>> {
    proptest::collection::vec(
        prop_oneof![
            3 => any::<u8>(),
            2 => Just(0x1B_u8),
            1 => prop_oneof![
                Just(b'['), Just(b']'), Just(b';'), Just(b'?'),
                Just(b'm'), Just(b'H'), Just(b'J'), Just(b'K'),
                Just(b'h'), Just(b'l'), Just(b'r'), Just(0x07_u8),
                Just(0x9C_u8), Just(0xE4_u8), Just(0xB8_u8),
            ],
            1 => b'0'..=b'9',
        ],
        0..512,
    )
}

fn assert_invariants(t: &Terminal, max_scrollback: usize) {
    let (rows, cols) = (t.rows(), t.cols());
    let (cur_row, cur_col) = t.cursor_position();
    assert!(cur_row < rows, "cursor row {cur_row} out of {rows}");
    assert!(cur_col < cols, "cursor col {cur_col} out of {cols}");
    assert!(t.scrollback_len() <= max_scrollback);

    for row in 0..rows {
        for col in 0..cols {
            let cell = t.cell(row, col).expect("dimension invariant");
            if cell.width() == 2 {
                let next = t
                    .cell(row, col + 1)
                    .expect("wide cell must not sit on the last column");
                assert_eq!(next.width(), 0, "unpaired wide at ({row},{col})");
            }
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn arbitrary_bytes_never_panic((cols, rows) in dims(), bytes in dense_bytes()) {
        let mut t = Terminal::new(cols, rows, 50);
        t.feed(&bytes);
        assert_invariants(&t, 50);
        // The engine must still function after garbage.
        t.feed(b"\x1b[H ok");
        assert_invariants(&t, 50);
    }

    #[test]
    fn chunked_feed_is_deterministic(bytes in dense_bytes(), chunk in 1usize..17) {
        let mut whole = Terminal::new(60, 20, 50);
        whole.feed(&bytes);

        let mut split = Terminal::new(60, 20, 50);
        for piece in bytes.chunks(chunk) {
            split.feed(piece);
        }

        prop_assert_eq!(whole.visible_text(), split.visible_text());
        prop_assert_eq!(whole.cursor_position(), split.cursor_position());
        prop_assert_eq!(whole.scrollback_len(), split.scrollback_len());
        prop_assert_eq!(whole.window_title(), split.window_title());
    }

    #[test]
    fn printable_text_survives(text in "[ -~]{0,200}") {
        let mut t = Terminal::new(200, 4, 50);
        t.feed(text.as_bytes());
        let visible = t.visible_text().join("");
        prop_assert_eq!(visible.trim_end(), text.trim_end());
    }

    #[test]
    fn utf8_streams_never_desync(text in ".{0,100}", (cols, rows) in dims()) {
        let mut t = Terminal::new(cols, rows, 50);
        t.feed(text.as_bytes());
        assert_invariants(&t, 50);
    }

    #[test]
    fn resize_storm_keeps_invariants(
        bytes in dense_bytes(),
        sizes in proptest::collection::vec((1u16..=100, 1u16..=40), 1..6),
    ) {
        let mut t = Terminal::new(80, 24, 50);
        t.feed(&bytes);
        for (cols, rows) in sizes {
            t.resize(cols, rows);
            assert_invariants(&t, 50);
        }
        t.feed(b"after");
        assert_invariants(&t, 50);
    }

    #[test]
    fn reflow_idempotent((cols, rows) in (5u16..=100, 2u16..=40), text in "[ -~\\n]{0,300}") {
        let mut t = Terminal::new(80, 24, 200);
        // LF alone does not return the carriage; emulate CRLF discipline.
        let normalized = text.replace('\n', "\r\n");
        t.feed(normalized.as_bytes());

        t.resize(cols, rows);
        let text_once = t.visible_text();
        let cursor_once = t.cursor_position();
        let sb_once = t.scrollback_len();

        t.resize(cols, rows);
        prop_assert_eq!(t.visible_text(), text_once);
        prop_assert_eq!(t.cursor_position(), cursor_once);
        prop_assert_eq!(t.scrollback_len(), sb_once);
    }

    #[test]
    fn snapshot_after_feed_reflects_dimensions((cols, rows) in dims(), bytes in dense_bytes()) {
        let mut t = Terminal::new(cols, rows, 50);
        t.feed(&bytes);
        let frame = t.snapshot();
        prop_assert_eq!(frame.columns, cols);
        prop_assert_eq!(frame.rows, rows);
        prop_assert_eq!(frame.cells.len(), cols as usize * rows as usize);
    }
}
