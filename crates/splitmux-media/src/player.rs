// crates/splitmux-media/src/player.rs
//
// VideoPlayer: paced playback of one media source on a dedicated worker
// thread.
//
// The controller thread never touches native handles — the worker opens its
// own VideoDecoder and keeps it for the life of the session. Coordination is
// a handful of independent atomics with single-writer discipline per field:
// the controller writes intent (playing / should_stop / seek request), the
// worker writes observations (state / position). Seeks and stops are
// requests observed at the next loop iteration, giving at most one iteration
// of latency.
//
// Pacing sleeps a flat 1000/fps ms after each emitted frame without
// subtracting decode time, so sustained slow decoding drifts the effective
// rate below real time.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use anyhow::Result;
use crossbeam_channel::Sender;

use splitmux_core::media_types::{MediaEvent, MediaInfo, PlaybackState, RgbFrame};

use crate::decode::VideoDecoder;
use crate::probe::probe;

/// Poll interval while paused.
const PAUSE_POLL: Duration = Duration::from_millis(10);

/// Flags shared between the controller and the playback worker.
///
/// Single-writer discipline: `playing`, `should_stop`, `seek_requested` and
/// `seek_target_ms` are written by the controller and read by the worker;
/// `position_ms` and `state` are written by the worker and read by the
/// controller. `seek_requested` is the one exception — the worker clears it
/// after servicing the seek, which is safe because the controller only ever
/// sets it.
struct PlayerShared {
    playing:        AtomicBool,
    should_stop:    AtomicBool,
    seek_requested: AtomicBool,
    seek_target_ms: AtomicI64,
    position_ms:    AtomicI64,
    state:          AtomicU8,
}

impl PlayerShared {
    fn new() -> Self {
        Self {
            playing:        AtomicBool::new(false),
            should_stop:    AtomicBool::new(false),
            seek_requested: AtomicBool::new(false),
            seek_target_ms: AtomicI64::new(0),
            position_ms:    AtomicI64::new(0),
            state:          AtomicU8::new(PlaybackState::Idle.as_u8()),
        }
    }

    fn set_state(&self, s: PlaybackState) {
        self.state.store(s.as_u8(), Ordering::Relaxed);
    }

    fn state(&self) -> PlaybackState {
        PlaybackState::from_u8(self.state.load(Ordering::Relaxed))
    }
}

pub struct VideoPlayer {
    shared: Arc<PlayerShared>,
    worker: Option<JoinHandle<()>>,
    events: Sender<MediaEvent>,
    frames: Sender<RgbFrame>,
    info:   Option<MediaInfo>,
}

impl VideoPlayer {
    /// `events` carries duration/info/position/end-of-stream; `frames`
    /// carries decoded playback frames on its own bounded channel.
    pub fn new(events: Sender<MediaEvent>, frames: Sender<RgbFrame>) -> Self {
        Self {
            shared: Arc::new(PlayerShared::new()),
            worker: None,
            events,
            frames,
            info: None,
        }
    }

    /// Open `path` for playback. Any previous session is stopped first.
    ///
    /// Metadata is probed on the calling thread and published as
    /// `DurationKnown` + `InfoReady`; the worker thread then opens its own
    /// decoder, publishes the first frame, and parks in `Paused`.
    pub fn open(&mut self, path: &Path) -> Result<()> {
        self.stop();

        let info = probe(path)?;
        let _ = self.events.send(MediaEvent::DurationKnown { ms: info.duration_ms });
        let _ = self.events.send(MediaEvent::InfoReady { text: info.report() });

        self.shared = Arc::new(PlayerShared::new());
        self.shared.set_state(PlaybackState::Paused);

        let shared   = Arc::clone(&self.shared);
        let events   = self.events.clone();
        let frames   = self.frames.clone();
        let path_buf = path.to_path_buf();
        let frame_rate  = info.frame_rate;
        let duration_ms = info.duration_ms;

        self.worker = Some(thread::spawn(move || {
            decode_loop(shared, path_buf, frame_rate, duration_ms, events, frames);
        }));

        self.info = Some(info);
        Ok(())
    }

    /// Request playback. Takes effect at the next worker iteration.
    pub fn play(&self) {
        if self.worker.is_some() {
            self.shared.playing.store(true, Ordering::Relaxed);
        }
    }

    /// Request pause. The worker parks after finishing the current frame.
    pub fn pause(&self) {
        self.shared.playing.store(false, Ordering::Relaxed);
    }

    /// Record a seek target. Non-blocking — the worker performs the actual
    /// container seek (keyframe-approximate) at its next iteration and then
    /// returns to the prior play/pause state.
    pub fn seek_ms(&self, target_ms: i64) {
        self.shared.seek_target_ms.store(target_ms, Ordering::Relaxed);
        self.shared.seek_requested.store(true, Ordering::Relaxed);
    }

    /// Stop the session and join the worker. No frame is delivered after
    /// this returns. A new `open()` is required to resume playback.
    pub fn stop(&mut self) {
        self.shared.should_stop.store(true, Ordering::Relaxed);
        self.shared.playing.store(false, Ordering::Relaxed);
        if let Some(handle) = self.worker.take() {
            let _ = handle.join();
        }
    }

    pub fn state(&self) -> PlaybackState {
        self.shared.state()
    }

    /// Current playback position in milliseconds (written by the worker).
    pub fn position_ms(&self) -> i64 {
        self.shared.position_ms.load(Ordering::Relaxed)
    }

    pub fn info(&self) -> Option<&MediaInfo> {
        self.info.as_ref()
    }
}

impl Drop for VideoPlayer {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Worker loop ───────────────────────────────────────────────────────────────

fn decode_loop(
    shared:      Arc<PlayerShared>,
    path:        PathBuf,
    frame_rate:  f64,
    duration_ms: i64,
    events:      Sender<MediaEvent>,
    frames:      Sender<RgbFrame>,
) {
    let mut decoder = match VideoDecoder::open(&path) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("[player] open '{}': {e:#}", path.display());
            let _ = events.send(MediaEvent::Error { message: format!("{e:#}") });
            shared.set_state(PlaybackState::Idle);
            return;
        }
    };

    // Show the first frame before playback starts, then rewind so play()
    // begins at zero.
    match decoder.decode_next() {
        Ok(Some(frame)) => {
            let _ = frames.try_send(frame);
            decoder.reset();
        }
        Ok(None) => {}
        Err(e) => eprintln!("[player] first frame: {e:#}"),
    }

    let frame_delay = Duration::from_millis((1000.0 / frame_rate.max(1.0)) as u64);
    let mut at_eos = false;

    loop {
        if shared.should_stop.load(Ordering::Relaxed) {
            break;
        }

        // (a) pending seek — resolved within this iteration.
        if shared.seek_requested.load(Ordering::Relaxed) {
            shared.set_state(PlaybackState::Seeking);
            let target = shared.seek_target_ms.load(Ordering::Relaxed);
            decoder.seek_ms(target);
            shared.position_ms.store(target, Ordering::Relaxed);
            let _ = events.try_send(MediaEvent::PositionChanged { ms: target });
            shared.seek_requested.store(false, Ordering::Relaxed);
            at_eos = false;
            shared.set_state(if shared.playing.load(Ordering::Relaxed) {
                PlaybackState::Playing
            } else {
                PlaybackState::Paused
            });
            continue;
        }

        // (b) paused — sleep briefly and re-check.
        if !shared.playing.load(Ordering::Relaxed) {
            if !at_eos {
                shared.set_state(PlaybackState::Paused);
            }
            thread::sleep(PAUSE_POLL);
            continue;
        }

        // (c) decode, publish, pace.
        shared.set_state(PlaybackState::Playing);
        at_eos = false;
        match decoder.decode_next() {
            Ok(Some(frame)) => {
                let pos = frame.pts_ms;
                shared.position_ms.store(pos, Ordering::Relaxed);
                // Drop frames the consumer is too slow to take; pacing is
                // wall-clock, not consumer-clock.
                let _ = frames.try_send(frame);
                let _ = events.try_send(MediaEvent::PositionChanged { ms: pos });
                thread::sleep(frame_delay);
            }
            Ok(None) => {
                at_eos = true;
                shared.playing.store(false, Ordering::Relaxed);
                shared.position_ms.store(duration_ms, Ordering::Relaxed);
                shared.set_state(PlaybackState::EndOfStream);
                let _ = events.try_send(MediaEvent::PositionChanged { ms: duration_ms });
                let _ = events.try_send(MediaEvent::EndOfStream);
                // The loop stays alive: a seek can revive the session.
            }
            Err(e) => {
                eprintln!("[player] decode: {e:#}");
                let _ = events.send(MediaEvent::Error { message: format!("{e:#}") });
                shared.playing.store(false, Ordering::Relaxed);
            }
        }
    }

    shared.set_state(PlaybackState::Stopped);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn open_nonexistent_path_is_an_error() {
        let (etx, _erx) = bounded(16);
        let (ftx, _frx) = bounded(4);
        let mut player = VideoPlayer::new(etx, ftx);
        assert!(player.open(Path::new("/nonexistent/clip.mp4")).is_err());
        assert_eq!(player.state(), PlaybackState::Idle);
    }

    #[test]
    fn stop_without_open_is_a_no_op() {
        let (etx, _erx) = bounded(16);
        let (ftx, _frx) = bounded(4);
        let mut player = VideoPlayer::new(etx, ftx);
        player.stop();
        player.stop();
        assert_eq!(player.position_ms(), 0);
        assert!(player.info().is_none());
    }

    #[test]
    fn seek_only_records_intent() {
        let (etx, _erx) = bounded(16);
        let (ftx, _frx) = bounded(4);
        let player = VideoPlayer::new(etx, ftx);
        player.seek_ms(5_000);
        assert!(player.shared.seek_requested.load(Ordering::Relaxed));
        assert_eq!(player.shared.seek_target_ms.load(Ordering::Relaxed), 5_000);
        // No worker thread exists — nothing performed the seek.
        assert_eq!(player.position_ms(), 0);
    }
}
