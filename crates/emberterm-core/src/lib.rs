#![forbid(unsafe_code)]

//! Host-agnostic VT terminal engine.
//!
//! `emberterm-core` is the platform-independent terminal model at the heart
//! of EmberTerm. It turns a raw PTY/SSH byte stream into a consistent,
//! snapshot-able 2D cell model — without any host I/O dependencies.
//!
//! # Primary responsibilities
//!
//! - **Parser**: VT500 state machine (Paul Flo Williams model) with a
//!   strict UTF-8 overlay and CSI/OSC/DCS/SOS dispatch.
//! - **Grid**: primary/alternate cell buffers, scroll region, charset
//!   translation, SGR/OSC state, dirty tracking.
//! - **Cursor**: position, style, pending-wrap semantics, save/restore.
//! - **Scrollback**: fixed-capacity flat ring preserving wrap continuation.
//! - **Reflow**: width-change unwrap/rewrap across scrollback + screen
//!   with cursor tracking.
//! - **Snapshot**: immutable packed frames for a GPU renderer, gated by
//!   synchronized output (mode 2026).
//!
//! # Design principles
//!
//! - **No I/O**: all types are pure data + logic; the host adapter
//!   supplies bytes and consumes frames and responses.
//! - **Deterministic**: identical byte sequences always produce identical
//!   state.
//! - **Total on input**: no byte stream panics or desynchronizes the
//!   engine; malformed input is consumed and discarded.

pub mod cell;
pub mod charset;
pub mod cursor;
pub mod grid;
pub mod modes;
pub mod palette;
pub mod parser;
pub mod reflow;
pub mod scrollback;
pub mod selection;
pub mod snapshot;
pub mod term;
pub mod width;

pub use cell::{Cell, CellFlags, Color, HyperlinkId, HyperlinkRegistry, SgrAttrs, SgrFlags, UnderlineStyle};
pub use charset::{Charset, CharsetState, translate};
pub use cursor::{Cursor, CursorStyle, SavedCursor};
pub use grid::Grid;
pub use modes::{Modes, MouseEncoding, MouseTracking};
pub use palette::{Palette, Rgb, parse_color_spec};
pub use parser::{Params, Parser, Perform};
pub use reflow::{ReflowResult, reflow};
pub use scrollback::{Scrollback, ScrollbackLine};
pub use selection::{BufferPos, Selection, selection_text};
pub use snapshot::{CellInstance, Snapshot};
pub use term::{ResponseHandler, Terminal};
pub use width::{char_width, is_wide};
