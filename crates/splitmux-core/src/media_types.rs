// crates/splitmux-core/src/media_types.rs
//
// Types that flow across the channel between splitmux-media and the
// presentation layer. No FFmpeg — just plain data.

use uuid::Uuid;

/// Events sent from the media worker threads to the controller.
///
/// Playback frames travel on their own bounded channel (see
/// `splitmux_media::MediaWorker`) so a slow event consumer never delays
/// frame delivery, and vice versa.
pub enum MediaEvent {
    /// Total duration of the opened source, in milliseconds.
    DurationKnown { ms: i64 },
    /// Human-readable info block for the opened source (see `MediaInfo::report`).
    InfoReady { text: String },
    /// Playback position advanced, in milliseconds.
    PositionChanged { ms: i64 },
    /// The playback source ran out of packets.
    EndOfStream,
    /// Job progress, 0–100, monotonically non-decreasing within one job.
    Progress { job_id: Uuid, percent: u8 },
    /// Terminal job outcome. `message` carries output paths on success and
    /// the cause on failure.
    JobFinished { job_id: Uuid, success: bool, message: String },
    /// Non-job error (playback open failure etc.).
    Error { message: String },
}

/// One decoded frame in the interchange format: packed RGB24, strides removed.
///
/// Presentation timestamps are monotonic non-decreasing within one decode
/// session.
pub struct RgbFrame {
    pub width:  u32,
    pub height: u32,
    /// Presentation timestamp in milliseconds.
    pub pts_ms: i64,
    /// `width * height * 3` bytes, row-major RGB.
    pub data:   Vec<u8>,
}

/// Stream metadata for an opened media source.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub width:        u32,
    pub height:       u32,
    pub frame_rate:   f64,
    /// Container bit rate in bits per second.
    pub bit_rate:     i64,
    pub total_frames: i64,
    pub duration_ms:  i64,
    pub codec_name:   String,
}

impl MediaInfo {
    /// Render the structured info block shown to the user.
    pub fn report(&self) -> String {
        format!(
            "Resolution:   {} x {}\n\
             Frame rate:   {:.2} fps\n\
             Bit rate:     {} kbps\n\
             Total frames: {}\n\
             Duration:     {} s\n\
             Codec:        {}",
            self.width,
            self.height,
            self.frame_rate,
            self.bit_rate / 1000,
            self.total_frames,
            self.duration_ms / 1000,
            self.codec_name,
        )
    }
}

/// Playback scheduler state machine.
///
/// ```text
/// Idle ──open()──▶ Paused ◀──play()/pause()──▶ Playing
///                    │                            │
///                    │        seek()              │ packets exhausted
///                    ├──▶ Seeking (transient, ◀───┤
///                    │    resolves next loop      ▼
///                    │    iteration)          EndOfStream
///                    │                            │
///                    └────────── stop() ──────────┴──▶ Stopped (terminal;
///                                                       re-open to resume)
/// ```
///
/// Written only by the playback worker thread; the controller observes it and
/// expresses intent through separate flags (play/pause/seek/stop requests).
/// Stored as an atomic u8 — see `as_u8`/`from_u8`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing,
    Paused,
    Seeking,
    EndOfStream,
    Stopped,
}

impl PlaybackState {
    pub fn as_u8(self) -> u8 {
        match self {
            PlaybackState::Idle        => 0,
            PlaybackState::Playing     => 1,
            PlaybackState::Paused      => 2,
            PlaybackState::Seeking     => 3,
            PlaybackState::EndOfStream => 4,
            PlaybackState::Stopped     => 5,
        }
    }

    /// Inverse of `as_u8`. Unknown values map to `Idle` — the atomic is only
    /// ever written from `as_u8` so this is unreachable in practice.
    pub fn from_u8(v: u8) -> Self {
        match v {
            1 => PlaybackState::Playing,
            2 => PlaybackState::Paused,
            3 => PlaybackState::Seeking,
            4 => PlaybackState::EndOfStream,
            5 => PlaybackState::Stopped,
            _ => PlaybackState::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_u8_round_trip() {
        for s in [
            PlaybackState::Idle,
            PlaybackState::Playing,
            PlaybackState::Paused,
            PlaybackState::Seeking,
            PlaybackState::EndOfStream,
            PlaybackState::Stopped,
        ] {
            assert_eq!(PlaybackState::from_u8(s.as_u8()), s);
        }
    }

    #[test]
    fn unknown_state_maps_to_idle() {
        assert_eq!(PlaybackState::from_u8(200), PlaybackState::Idle);
    }

    #[test]
    fn report_formats_all_fields() {
        let info = MediaInfo {
            width:        640,
            height:       480,
            frame_rate:   25.0,
            bit_rate:     2_000_000,
            total_frames: 250,
            duration_ms:  10_000,
            codec_name:   "h264".into(),
        };
        let report = info.report();
        assert!(report.contains("640 x 480"));
        assert!(report.contains("25.00 fps"));
        assert!(report.contains("2000 kbps"));
        assert!(report.contains("250"));
        assert!(report.contains("10 s"));
        assert!(report.contains("h264"));
    }
}
