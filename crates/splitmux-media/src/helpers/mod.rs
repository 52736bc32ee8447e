// crates/splitmux-media/src/helpers/mod.rs
//
// Internal helper modules for splitmux-media.
// Not re-exported from lib.rs — these are decode/encode implementation
// details, not part of the public API consumed by the presentation layer.

pub mod hwaccel;
pub mod seek;
