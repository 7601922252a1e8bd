//! Terminal mode state: DEC private modes and ANSI modes.
//!
//! Only the modes the engine itself honors are stored as fields; the mouse
//! and keyboard modes exist so the host's input encoders can query them
//! (the grid never encodes input itself).

/// Mouse tracking level (DECSET 1000/1002/1003).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MouseTracking {
    #[default]
    Off,
    /// Button press/release only (mode 1000).
    Normal,
    /// Presses plus drag motion (mode 1002).
    ButtonEvent,
    /// All motion (mode 1003).
    AnyEvent,
}

/// Mouse coordinate encoding (DECSET 1005/1006).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MouseEncoding {
    /// Legacy X10 single-byte coordinates.
    #[default]
    Default,
    /// UTF-8 extended coordinates (mode 1005).
    Utf8,
    /// SGR extended coordinates (mode 1006).
    Sgr,
}

/// The mode flags of one terminal instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Modes {
    /// DECCKM (mode 1): application cursor keys.
    pub cursor_keys_app: bool,
    /// DECOM (mode 6): cursor addressing relative to the scroll region.
    pub origin: bool,
    /// DECAWM (mode 7): wrap at the right margin.
    pub autowrap: bool,
    /// IRM (ANSI mode 4): printed characters shift the row tail right.
    pub insert: bool,
    /// LNM (ANSI mode 20): LF implies CR.
    pub linefeed_newline: bool,
    /// DECPAM / DECPNM (ESC = / ESC >): application keypad.
    pub keypad_app: bool,
    /// Mode 2004: hosts wrap pastes in ESC [ 200~ / ESC [ 201~.
    pub bracketed_paste: bool,
    /// Mode 2026: snapshots freeze until the application ends the update.
    pub synchronized_output: bool,
    pub mouse_tracking: MouseTracking,
    pub mouse_encoding: MouseEncoding,
}

impl Default for Modes {
    fn default() -> Self {
        Self {
            cursor_keys_app: false,
            origin: false,
            autowrap: true,
            insert: false,
            linefeed_newline: false,
            keypad_app: false,
            bracketed_paste: false,
            synchronized_output: false,
            mouse_tracking: MouseTracking::default(),
            mouse_encoding: MouseEncoding::default(),
        }
    }
}

impl Modes {
    /// Reset to power-on defaults.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
