//! The 256-color palette and its OSC-driven overrides.
//!
//! Indexed cell colors resolve to RGB here when a snapshot is packed.
//! OSC 4 overrides individual entries, OSC 104 restores them, and
//! OSC 10/11/12 adjust the default foreground/background/cursor colors.

/// An RGB triple.
pub type Rgb = (u8, u8, u8);

/// The standard 16 ANSI colors (xterm defaults).
const ANSI_16: [Rgb; 16] = [
    (0x00, 0x00, 0x00), // black
    (0xCD, 0x00, 0x00), // red
    (0x00, 0xCD, 0x00), // green
    (0xCD, 0xCD, 0x00), // yellow
    (0x00, 0x00, 0xEE), // blue
    (0xCD, 0x00, 0xCD), // magenta
    (0x00, 0xCD, 0xCD), // cyan
    (0xE5, 0xE5, 0xE5), // white
    (0x7F, 0x7F, 0x7F), // bright black
    (0xFF, 0x00, 0x00), // bright red
    (0x00, 0xFF, 0x00), // bright green
    (0xFF, 0xFF, 0x00), // bright yellow
    (0x5C, 0x5C, 0xFF), // bright blue
    (0xFF, 0x00, 0xFF), // bright magenta
    (0x00, 0xFF, 0xFF), // bright cyan
    (0xFF, 0xFF, 0xFF), // bright white
];

/// Base value of the 256-color palette entry `index` (no overrides).
#[must_use]
pub fn base_color(index: u8) -> Rgb {
    match index {
        0..=15 => ANSI_16[index as usize],
        16..=231 => {
            // 6x6x6 color cube: component n maps to 0 or 55 + 40n.
            let idx = index as u16 - 16;
            let r = (idx / 36) as u8;
            let g = ((idx / 6) % 6) as u8;
            let b = (idx % 6) as u8;
            let level = |c: u8| if c == 0 { 0 } else { 55 + 40 * c };
            (level(r), level(g), level(b))
        }
        232..=255 => {
            // 24-step grayscale ramp from 8 to 238.
            let v = 8 + 10 * (index - 232);
            (v, v, v)
        }
    }
}

/// Palette state: 256 indexed slots plus the default fg/bg/cursor colors.
#[derive(Debug, Clone)]
pub struct Palette {
    /// Override slots; `None` falls through to [`base_color`].
    overrides: [Option<Rgb>; 256],
    pub default_fg: Rgb,
    pub default_bg: Rgb,
    pub cursor_color: Rgb,
}

const DEFAULT_FG: Rgb = (0xE5, 0xE5, 0xE5);
const DEFAULT_BG: Rgb = (0x00, 0x00, 0x00);
const DEFAULT_CURSOR: Rgb = (0xE5, 0xE5, 0xE5);

impl Default for Palette {
    fn default() -> Self {
        Self {
            overrides: [None; 256],
            default_fg: DEFAULT_FG,
            default_bg: DEFAULT_BG,
            cursor_color: DEFAULT_CURSOR,
        }
    }
}

impl Palette {
    /// Resolve an indexed color, honoring overrides.
    #[must_use]
    pub fn indexed(&self, index: u8) -> Rgb {
        self.overrides[index as usize].unwrap_or_else(|| base_color(index))
    }

    /// Override a palette slot (OSC 4).
    pub fn set_indexed(&mut self, index: u8, rgb: Rgb) {
        self.overrides[index as usize] = Some(rgb);
    }

    /// Restore a palette slot to its default (OSC 104 with an index).
    pub fn reset_indexed(&mut self, index: u8) {
        self.overrides[index as usize] = None;
    }

    /// Restore every slot and the default colors (OSC 104 bare, RIS).
    pub fn reset_all(&mut self) {
        *self = Self::default();
    }
}

/// Parse an X11 color spec as used by OSC 4/10/11/12.
///
/// Accepts `rgb:RR/GG/BB` (1-4 hex digits per channel, scaled to 8 bits)
/// and `#RRGGBB`.
#[must_use]
pub fn parse_color_spec(spec: &str) -> Option<Rgb> {
    if let Some(rest) = spec.strip_prefix("rgb:") {
        let mut channels = rest.split('/');
        let r = scale_channel(channels.next()?)?;
        let g = scale_channel(channels.next()?)?;
        let b = scale_channel(channels.next()?)?;
        if channels.next().is_some() {
            return None;
        }
        return Some((r, g, b));
    }
    if let Some(hex) = spec.strip_prefix('#') {
        if hex.len() == 6 {
            let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
            let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
            let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
            return Some((r, g, b));
        }
        return None;
    }
    None
}

/// Scale a 1-4 digit hex channel to 8 bits.
fn scale_channel(digits: &str) -> Option<u8> {
    if digits.is_empty() || digits.len() > 4 {
        return None;
    }
    let value = u16::from_str_radix(digits, 16).ok()?;
    let max = (1u32 << (4 * digits.len() as u32)) - 1;
    Some(((u32::from(value) * 255 + max / 2) / max) as u8)
}

/// Format a color for an OSC query response: 16-bit channel expansion,
/// repeating each 8-bit value as high and low byte.
#[must_use]
pub fn format_color_response(rgb: Rgb) -> String {
    let (r, g, b) = rgb;
    format!(
        "rgb:{:02x}{:02x}/{:02x}{:02x}/{:02x}{:02x}",
        r, r, g, g, b, b
    )
}
