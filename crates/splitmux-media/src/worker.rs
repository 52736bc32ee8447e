// crates/splitmux-media/src/worker.rs
//
// MediaWorker: the operations surface the presentation layer holds.
// Owns the event and playback-frame channels, the playback scheduler, and
// the per-job cancel flags. All public API the frontend calls lives here.
//
// One dedicated thread per long-running operation: the player keeps its own
// worker, and every split/merge job gets a fresh thread that dies with the
// job. Preventing two simultaneous jobs over the same output paths is the
// caller's responsibility.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender};
use uuid::Uuid;

use splitmux_core::media_types::{MediaEvent, MediaInfo, PlaybackState, RgbFrame};

use crate::merge::{merge_video, MergeJob};
use crate::player::VideoPlayer;
use crate::split::{split_video, SplitJob};

pub struct MediaWorker {
    /// Shared event channel: duration/info/position, job progress, outcomes.
    pub rx: Receiver<MediaEvent>,
    tx:     Sender<MediaEvent>,

    /// Dedicated bounded channel for playback frames, so frame delivery and
    /// event delivery never block each other.
    pub frame_rx: Receiver<RgbFrame>,

    player: VideoPlayer,

    shutdown: Arc<AtomicBool>,
    /// Per-job cancel flags, keyed by job id so cancellation is targeted.
    /// Entries are inserted by start_split/start_merge and removed when the
    /// job thread finishes.
    job_cancels: Arc<Mutex<HashMap<Uuid, Arc<AtomicBool>>>>,
}

impl MediaWorker {
    pub fn new() -> Self {
        let (tx, rx) = bounded(512);
        let (frame_tx, frame_rx) = bounded::<RgbFrame>(32);

        let player = VideoPlayer::new(tx.clone(), frame_tx);

        Self {
            rx,
            tx,
            frame_rx,
            player,
            shutdown: Arc::new(AtomicBool::new(false)),
            job_cancels: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    // ── Playback ──────────────────────────────────────────────────────────────

    /// Open `path` for playback. Emits `DurationKnown` + `InfoReady` on
    /// success, `Error` on failure.
    pub fn open(&mut self, path: &Path) -> bool {
        // Drain stale frames from the previous session.
        while self.frame_rx.try_recv().is_ok() {}
        match self.player.open(path) {
            Ok(()) => true,
            Err(e) => {
                eprintln!("[worker] open '{}': {e:#}", path.display());
                let _ = self.tx.send(MediaEvent::Error { message: format!("{e:#}") });
                false
            }
        }
    }

    pub fn play(&self) {
        self.player.play();
    }

    pub fn pause(&self) {
        self.player.pause();
    }

    /// Record a seek target; the playback worker services it at its next
    /// iteration.
    pub fn seek_ms(&self, target_ms: i64) {
        self.player.seek_ms(target_ms);
    }

    /// Stop playback and join its worker. No frame arrives after this
    /// returns.
    pub fn stop_playback(&mut self) {
        self.player.stop();
    }

    pub fn playback_state(&self) -> PlaybackState {
        self.player.state()
    }

    pub fn position_ms(&self) -> i64 {
        self.player.position_ms()
    }

    pub fn media_info(&self) -> Option<&MediaInfo> {
        self.player.info()
    }

    // ── Jobs ──────────────────────────────────────────────────────────────────

    /// Split `video_path` into `<output_dir>/frames/*.jpg` + `<output_dir>/audio.mp3`
    /// on a dedicated thread. Returns the job id used in progress/outcome events.
    pub fn start_split(&self, video_path: PathBuf, output_dir: PathBuf) -> Uuid {
        let job_id = Uuid::new_v4();
        let job = SplitJob { job_id, video_path, output_dir };
        let cancel = self.register_job(job_id);
        let tx = self.tx.clone();
        let cancels = Arc::clone(&self.job_cancels);
        thread::spawn(move || {
            split_video(job, cancel, tx);
            cancels.lock().unwrap().remove(&job_id);
        });
        job_id
    }

    /// Merge the images of `image_dir` (plus `audio_path`, when given) into
    /// `output_path` on a dedicated thread. Returns the job id.
    pub fn start_merge(
        &self,
        image_dir:   PathBuf,
        audio_path:  Option<PathBuf>,
        output_path: PathBuf,
    ) -> Uuid {
        let job_id = Uuid::new_v4();
        let job = MergeJob { job_id, image_dir, audio_path, output_path };
        let cancel = self.register_job(job_id);
        let tx = self.tx.clone();
        let cancels = Arc::clone(&self.job_cancels);
        thread::spawn(move || {
            merge_video(job, cancel, tx);
            cancels.lock().unwrap().remove(&job_id);
        });
        job_id
    }

    /// Signal the job to stop. It finishes its current frame and reports
    /// `JobFinished { success: false }`.
    pub fn cancel_job(&self, job_id: Uuid) {
        if let Some(flag) = self.job_cancels.lock().unwrap().get(&job_id) {
            flag.store(true, Ordering::Relaxed);
        }
    }

    /// Cancel every in-flight job and stop playback.
    pub fn shutdown(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        for flag in self.job_cancels.lock().unwrap().values() {
            flag.store(true, Ordering::Relaxed);
        }
        self.player.stop();
    }

    /// Register the cancel flag before spawning — closes the window where
    /// cancel_job could run before the job thread inserted its own flag.
    fn register_job(&self, job_id: Uuid) -> Arc<AtomicBool> {
        let cancel = Arc::new(AtomicBool::new(self.shutdown.load(Ordering::Relaxed)));
        self.job_cancels
            .lock()
            .unwrap()
            .insert(job_id, Arc::clone(&cancel));
        cancel
    }
}

impl Default for MediaWorker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn wait_for_outcome(worker: &MediaWorker, job_id: Uuid) -> (bool, String) {
        let deadline = std::time::Instant::now() + Duration::from_secs(10);
        while std::time::Instant::now() < deadline {
            if let Ok(event) = worker.rx.recv_timeout(Duration::from_millis(100)) {
                if let MediaEvent::JobFinished { job_id: id, success, message } = event {
                    if id == job_id {
                        return (success, message);
                    }
                }
            }
        }
        panic!("job {job_id} never finished");
    }

    #[test]
    fn split_job_on_bad_input_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let worker = MediaWorker::new();
        let job_id = worker.start_split(
            PathBuf::from("/nonexistent/clip.mp4"),
            dir.path().join("out"),
        );
        let (success, _message) = wait_for_outcome(&worker, job_id);
        assert!(!success);
        // The job removed its cancel flag on the way out.
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        while worker.job_cancels.lock().unwrap().contains_key(&job_id) {
            assert!(std::time::Instant::now() < deadline);
            std::thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn merge_job_on_empty_dir_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let worker = MediaWorker::new();
        let job_id = worker.start_merge(
            dir.path().to_path_buf(),
            None,
            dir.path().join("out.mp4"),
        );
        let (success, message) = wait_for_outcome(&worker, job_id);
        assert!(!success);
        assert!(message.contains("no image files"));
    }

    #[test]
    fn cancel_unknown_job_is_a_no_op() {
        let worker = MediaWorker::new();
        worker.cancel_job(Uuid::new_v4());
    }

    #[test]
    fn shutdown_is_idempotent() {
        let mut worker = MediaWorker::new();
        worker.shutdown();
        worker.shutdown();
    }
}
