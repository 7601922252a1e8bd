//! End-to-end conformance scenarios driven through the public feed path.
//!
//! Each test drives a blank 80x24 terminal with a literal byte sequence and
//! checks the observable state: cells, cursor, responses, snapshots.

use std::sync::{Arc, Mutex};

use emberterm_core::snapshot::FLAG_CURSOR;
use emberterm_core::{CellFlags, Color, SgrFlags, Terminal};

fn term() -> Terminal {
    Terminal::new(80, 24, 1000)
}

/// Terminal wired to a response recorder.
fn term_with_responses() -> (Terminal, Arc<Mutex<Vec<u8>>>) {
    let mut t = term();
    let responses = Arc::new(Mutex::new(Vec::new()));
    let sink = responses.clone();
    t.set_response_handler(Box::new(move |bytes| {
        sink.lock().unwrap().extend_from_slice(bytes);
    }));
    (t, responses)
}

fn codepoints(t: &Terminal, row: u16, cols: std::ops::Range<u16>) -> String {
    cols.filter_map(|c| t.cell(row, c)).map(|c| c.content()).collect()
}

#[test]
fn plain_print() {
    let mut t = term();
    t.feed(b"Hello");
    assert_eq!(codepoints(&t, 0, 0..5), "Hello");
    assert_eq!(t.cursor_position(), (0, 5));
}

#[test]
fn bold_brighten_is_applied_at_write_time() {
    let mut t = term();
    t.feed(b"\x1b[1;31mX");
    let x = t.cell(0, 0).unwrap();
    assert!(x.attrs.flags.contains(SgrFlags::BOLD));
    // SGR 31 selects indexed 1; bold stores the brightened index.
    assert_eq!(x.attrs.fg, Color::Indexed(9));

    t.feed(b"\x1b[22mY");
    let y = t.cell(0, 1).unwrap();
    assert!(!y.attrs.flags.contains(SgrFlags::BOLD));
    assert_eq!(y.attrs.fg, Color::Indexed(1));
}

#[test]
fn wrap_then_autowrap() {
    let mut t = term();
    t.feed(&b"A".repeat(80));
    assert_eq!(t.cursor_position(), (0, 79));

    t.feed(b"B");
    assert!(t.cell(0, 79).unwrap().flags.contains(CellFlags::WRAPPED));
    assert_eq!(t.cell(1, 0).unwrap().content(), 'B');
    assert_eq!(t.cursor_position(), (1, 1));
}

#[test]
fn alt_screen_enter_and_restore() {
    let mut t = term();
    t.feed(b"primary\x1b[?1049h");
    assert!(t.is_using_alternate());
    t.feed(b"alt\x1b[?1049l");
    assert!(!t.is_using_alternate());
    assert_eq!(codepoints(&t, 0, 0..7), "primary");
}

#[test]
fn scroll_region_scroll_up_leaves_scrollback_alone() {
    let mut t = term();
    // Paint distinct markers on rows 0..5.
    for row in 0..5 {
        let cmd = format!("\x1b[{};1Hrow{}", row + 1, row);
        t.feed(cmd.as_bytes());
    }
    let before_outside: Vec<String> = (4..24).map(|r| codepoints(&t, r, 0..10)).collect();

    // Region rows 2..4 (1-based); park the cursor at the region bottom
    // and trigger two scrolls.
    t.feed(b"\x1b[2;4r\x1b[4;1H\n\n");

    assert_eq!(codepoints(&t, 0, 0..4), "row0");
    assert_eq!(codepoints(&t, 1, 0..4), "row3");
    assert_eq!(codepoints(&t, 2, 0..10), " ".repeat(10));
    assert_eq!(codepoints(&t, 3, 0..10), " ".repeat(10));
    let after_outside: Vec<String> = (4..24).map(|r| codepoints(&t, r, 0..10)).collect();
    assert_eq!(before_outside, after_outside);
    // Scrolling inside a region never feeds scrollback.
    assert_eq!(t.scrollback_len(), 0);
}

#[test]
fn reflow_narrow_to_wide_unwraps() {
    let mut t = term();
    t.feed(&b"A".repeat(120));
    assert!(t.cell(0, 79).unwrap().flags.contains(CellFlags::WRAPPED));
    assert_eq!(t.cursor_position(), (1, 40));

    t.resize(130, 24);
    assert_eq!(codepoints(&t, 0, 0..120), "A".repeat(120));
    assert_eq!(t.cell(0, 120).unwrap().content(), ' ');
    assert!(!t.cell(0, 119).unwrap().flags.contains(CellFlags::WRAPPED));
    assert!(!t.cell(0, 129).unwrap().flags.contains(CellFlags::WRAPPED));
    assert_eq!(t.cursor_position(), (0, 120));
}

#[test]
fn dec_special_graphics_box_corners() {
    let mut t = term();
    t.feed(b"\x1b(0lqk\x1b(B");
    assert_eq!(t.cell(0, 0).unwrap().content(), '\u{250C}');
    assert_eq!(t.cell(0, 1).unwrap().content(), '\u{2500}');
    assert_eq!(t.cell(0, 2).unwrap().content(), '\u{2510}');
}

#[test]
fn osc_title_with_bel_and_utf8_payload() {
    let mut t = term();
    t.feed(b"\x1b]0;Hello\x07");
    assert_eq!(t.window_title(), "Hello");

    // "✳" encodes as E2 9C B3: the 0x9C continuation byte must not be
    // taken for C1 ST and terminate the string early.
    t.feed("\x1b]0;✳\x07".as_bytes());
    assert_eq!(t.window_title(), "✳");
}

#[test]
fn synchronized_output_freezes_snapshots() {
    let mut t = term();
    t.feed(b"dirty content");
    t.feed(b"\x1b[?2026h");

    let first = t.snapshot();
    let second = t.snapshot();
    let third = t.snapshot();
    assert_eq!(*first, *second);
    assert_eq!(*first, *third);

    // Mutations while frozen do not surface.
    t.feed(b"\x1b[5;5Hmore");
    let frozen = t.snapshot();
    assert_eq!(*first, *frozen);

    t.feed(b"\x1b[?2026l");
    t.feed(b"x");
    let live = t.snapshot();
    assert_ne!(*first, *live);
}

#[test]
fn sync_exit_snapshot_captures_intermediate_frame() {
    let mut t = term();
    assert!(t.take_sync_exit_snapshot().is_none());
    // sync-off draw, then sync-on within one chunk.
    t.feed(b"\x1b[?2026l42\x1b[?2026h");
    let frame = t.take_sync_exit_snapshot().expect("dirty state was pending");
    assert_eq!(frame.cell_at(0, 0).unwrap().glyph, '4' as u32);
    assert!(t.take_sync_exit_snapshot().is_none());
}

#[test]
fn dsr_reports_cursor_position() {
    let (mut t, responses) = term_with_responses();
    t.feed(b"\x1b[5;10H\x1b[6n");
    assert_eq!(responses.lock().unwrap().as_slice(), b"\x1b[5;10R");
}

#[test]
fn primary_device_attributes() {
    let (mut t, responses) = term_with_responses();
    t.feed(b"\x1b[c");
    assert_eq!(responses.lock().unwrap().as_slice(), b"\x1b[?62;1;2;6;9c");
}

// ── Quantified invariants, deterministic editions ───────────────────────

#[test]
fn cursor_stays_clamped_through_hostile_motion() {
    let mut t = term();
    t.feed(b"\x1b[999;999H\x1b[500C\x1b[500B\x1b[65535;65535H\x1b[999S\x1b[999T");
    let (row, col) = t.cursor_position();
    assert!(row < 24);
    assert!(col < 80);
}

#[test]
fn wide_cells_always_pair() {
    let mut t = term();
    t.feed("中中中\r\n日本語テスト\x1b[3;79H中".as_bytes());
    for row in 0..24 {
        for col in 0..80 {
            let cell = t.cell(row, col).unwrap();
            if cell.width() == 2 {
                let next = t.cell(row, col + 1).expect("wide cell at margin");
                assert_eq!(next.width(), 0, "unpaired wide cell at ({row},{col})");
                assert!(next.is_wide_continuation());
            }
        }
    }
}

#[test]
fn scrollback_never_exceeds_cap() {
    let mut t = Terminal::new(20, 4, 10);
    for i in 0..100 {
        let line = format!("line {i}\r\n");
        t.feed(line.as_bytes());
    }
    assert!(t.scrollback_len() <= 10);
    assert_eq!(t.scrollback_len(), 10);
}

#[test]
fn snapshot_consumes_dirty() {
    let mut t = term();
    t.feed(b"paint");
    let first = t.snapshot();
    assert!(first.dirty_range.is_some());

    let second = t.snapshot();
    assert!(second.dirty_range.is_none());

    t.feed(b"!");
    let third = t.snapshot();
    assert!(third.dirty_range.is_some());
}

#[test]
fn reflow_is_idempotent_through_resize() {
    let mut t = Terminal::new(40, 10, 100);
    for i in 0..8 {
        let line = format!("{} {}\r\n", "word".repeat(i), i);
        t.feed(line.as_bytes());
    }
    t.resize(25, 10);
    let text_once = t.visible_text();
    let cursor_once = t.cursor_position();
    let sb_once = t.scrollback_len();

    t.resize(25, 10);
    assert_eq!(t.visible_text(), text_once);
    assert_eq!(t.cursor_position(), cursor_once);
    assert_eq!(t.scrollback_len(), sb_once);
}

#[test]
fn reflow_round_trip_preserves_visible_content() {
    let mut t = Terminal::new(40, 10, 1000);
    t.feed(b"alpha beta gamma delta epsilon zeta eta theta\r\n");
    t.feed(b"second line\r\n");
    t.feed(b"third");
    let before = t.visible_text().join("\n");
    let before = before.trim_end();

    t.resize(23, 10);
    t.resize(40, 10);
    let after = t.visible_text().join("\n");
    assert_eq!(after.trim_end(), before);
}

#[test]
fn wrap_continuity_next_print_lands_on_next_row() {
    let mut t = term();
    t.feed(&b"Z".repeat(80));
    assert!(!t.cell(0, 79).unwrap().flags.contains(CellFlags::WRAPPED));
    t.feed(b"Q");
    assert!(t.cell(0, 79).unwrap().flags.contains(CellFlags::WRAPPED));
    assert_eq!(t.cell(1, 0).unwrap().content(), 'Q');
}

#[test]
fn snapshot_cursor_flag_tracks_position() {
    let mut t = term();
    t.feed(b"\x1b[3;4Hx");
    let frame = t.snapshot();
    assert_eq!((frame.cursor_row, frame.cursor_col), (2, 4));
    assert!(frame.cell_at(2, 4).unwrap().flags & FLAG_CURSOR != 0);
}

#[test]
fn scrolled_snapshot_composites_history() {
    let mut t = Terminal::new(10, 3, 100);
    t.feed(b"one\r\ntwo\r\nthree\r\nfour\r\nfive");
    assert_eq!(t.scrollback_len(), 2);

    let frame = t.snapshot_at(2);
    assert_eq!(frame.cell_at(0, 0).unwrap().glyph, 'o' as u32);
    assert_eq!(frame.cell_at(1, 0).unwrap().glyph, 't' as u32);
    assert_eq!(frame.cell_at(2, 0).unwrap().glyph, 't' as u32);

    // Offset 0 is the live view.
    let live = t.snapshot_at(0);
    assert_eq!(live.cell_at(0, 0).unwrap().glyph, 't' as u32);
    assert_eq!(live.cell_at(2, 0).unwrap().glyph, 'f' as u32);
}

#[test]
fn feed_chunking_is_transparent() {
    let script: &[u8] =
        "\x1b[2J\x1b[1;1H\x1b[1;32mgreen\x1b[0m \x1b]0;t✳\x07中文\r\n\x1b[4:3munder\x1b[0m"
            .as_bytes();

    let mut whole = term();
    whole.feed(script);

    let mut split = term();
    for chunk in script.chunks(3) {
        split.feed(chunk);
    }

    assert_eq!(whole.visible_text(), split.visible_text());
    assert_eq!(whole.cursor_position(), split.cursor_position());
    assert_eq!(whole.window_title(), split.window_title());
}
