// crates/splitmux-core/src/lib.rs
//
// Plain data types shared across the channel between splitmux-media and
// whatever presentation layer sits on top. No FFmpeg, no GUI — a frontend
// crate can depend on this without pulling in native libraries.

pub mod media_types;

pub mod helpers {
    pub mod time;
}

pub use media_types::{MediaEvent, MediaInfo, PlaybackState, RgbFrame};
