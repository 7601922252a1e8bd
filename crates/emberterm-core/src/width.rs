//! Terminal column width classifier.
//!
//! Decides whether a scalar occupies one cell or two, matching the behavior
//! of the mainstream wcwidth tables (xterm/iTerm2/VTE) rather than raw
//! Unicode East Asian Width: EAW Ambiguous is narrow, emoji-presentation
//! blocks are wide.
//!
//! Combining marks are not merged into a base cell; they occupy their own
//! (narrow) cell like any other scalar.

/// Inclusive scalar ranges that render two columns wide.
///
/// Sorted by start; lookup is a binary search. Covers the EAW
/// Wide/Fullwidth blocks plus the emoji blocks that every modern wcwidth
/// treats as wide.
const WIDE_RANGES: &[(u32, u32)] = &[
    (0x1100, 0x115F),   // Hangul Jamo (leading consonants)
    (0x2E80, 0x2FDF),   // CJK Radicals Supplement, Kangxi Radicals
    (0x2FF0, 0x33FF),   // IDC, CJK punctuation, Hiragana..CJK Compatibility
    (0x3400, 0x4DBF),   // CJK Unified Ideographs Extension A
    (0x4E00, 0x9FFF),   // CJK Unified Ideographs
    (0xA000, 0xA4CF),   // Yi Syllables, Yi Radicals
    (0xA960, 0xA97C),   // Hangul Jamo Extended-A
    (0xAC00, 0xD7AF),   // Hangul Syllables
    (0xF900, 0xFAFF),   // CJK Compatibility Ideographs
    (0xFF01, 0xFF60),   // Fullwidth Forms
    (0xFFE0, 0xFFE6),   // Fullwidth Signs
    (0x1F1E0, 0x1F1FF), // Regional Indicator Symbols
    (0x1F200, 0x1F251), // Enclosed Ideographic Supplement
    (0x1F300, 0x1F64F), // Misc Symbols and Pictographs, Emoticons
    (0x1F680, 0x1F6FF), // Transport and Map Symbols
    (0x1F900, 0x1F9FF), // Supplemental Symbols and Pictographs
    (0x1FA00, 0x1FAFF), // Symbols and Pictographs Extended-A
    (0x20000, 0x2FA1F), // CJK Extension B..F, CJK Compat Supplement
    (0x30000, 0x3134F), // CJK Extension G
];

/// Emoji-presentation singletons outside the contiguous wide blocks.
///
/// These are scattered through the legacy symbol blocks (U+2300..U+2BFF);
/// wcwidth implementations agree they occupy two columns. Sorted for
/// binary search.
const WIDE_SINGLETONS: &[u32] = &[
    0x231A, 0x231B, // watch, hourglass
    0x23E9, 0x23EA, 0x23EB, 0x23EC, 0x23F0, 0x23F3,
    0x2614, 0x2615, // umbrella with rain, hot beverage
    0x2648, 0x2649, 0x264A, 0x264B, 0x264C, 0x264D, // zodiac
    0x264E, 0x264F, 0x2650, 0x2651, 0x2652, 0x2653,
    0x267F, 0x2693, 0x26A1, 0x26AA, 0x26AB, 0x26BD, 0x26BE, 0x26C4, 0x26C5,
    0x26CE, 0x26D4, 0x26EA, 0x26F2, 0x26F3, 0x26F5, 0x26FA, 0x26FD,
    0x2705, 0x270A, 0x270B, 0x2728, 0x274C, 0x274E,
    0x2753, 0x2754, 0x2755, 0x2757,
    0x2795, 0x2796, 0x2797, 0x27B0, 0x27BF,
    0x2B1B, 0x2B1C, 0x2B50, 0x2B55,
    0x1F004, 0x1F0CF, 0x1F18E,
    0x1F191, 0x1F192, 0x1F193, 0x1F194, 0x1F195, 0x1F196, 0x1F197, 0x1F198,
    0x1F199, 0x1F19A,
];

/// Whether `ch` occupies two terminal columns.
#[must_use]
pub fn is_wide(ch: char) -> bool {
    let v = ch as u32;
    // Fast path: everything below the first Hangul Jamo is narrow, which
    // covers ASCII, Latin supplements, and most European text.
    if v < 0x1100 {
        return false;
    }
    if WIDE_RANGES
        .binary_search_by(|&(start, end)| {
            if v < start {
                std::cmp::Ordering::Greater
            } else if v > end {
                std::cmp::Ordering::Less
            } else {
                std::cmp::Ordering::Equal
            }
        })
        .is_ok()
    {
        return true;
    }
    WIDE_SINGLETONS.binary_search(&v).is_ok()
}

/// Terminal column width of `ch`: 2 for wide scalars, 1 otherwise.
#[must_use]
pub fn char_width(ch: char) -> u8 {
    if is_wide(ch) { 2 } else { 1 }
}
