// crates/splitmux-media/src/split.rs
//
// Split job: decode every frame of a source into a numbered JPEG sequence
// plus a sidecar audio file extracted by stream copy.
//
// Blocking — run on a dedicated thread (MediaWorker::start_split does).
// Progress weighting: frame extraction owns 10→60, audio extraction jumps
// to 100. Partial output from a failed job stays on disk; there is no
// rollback.

use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use image::codecs::jpeg::JpegEncoder;
use image::ImageEncoder;
use uuid::Uuid;

use splitmux_core::media_types::{MediaEvent, RgbFrame};

use crate::audio::extract_audio;
use crate::decode::VideoDecoder;

/// JPEG quality for extracted frames.
const JPEG_QUALITY: u8 = 95;

/// Everything needed to run one split job.
pub struct SplitJob {
    pub job_id:     Uuid,
    pub video_path: PathBuf,
    /// Frames land in `<output_dir>/frames/`, audio in `<output_dir>/audio.mp3`.
    pub output_dir: PathBuf,
}

/// Run `job` to completion. Sends `Progress` along the way and exactly one
/// terminal `JobFinished`.
pub fn split_video(job: SplitJob, cancel: Arc<AtomicBool>, tx: Sender<MediaEvent>) {
    let job_id = job.job_id;
    match run_split(&job, &cancel, &tx) {
        Ok(message) => {
            let _ = tx.send(MediaEvent::JobFinished { job_id, success: true, message });
        }
        Err(message) => {
            eprintln!("[split] job {job_id} failed: {message}");
            let _ = tx.send(MediaEvent::JobFinished { job_id, success: false, message });
        }
    }
}

fn run_split(
    job:    &SplitJob,
    cancel: &Arc<AtomicBool>,
    tx:     &Sender<MediaEvent>,
) -> Result<String, String> {
    let frames_dir = job.output_dir.join("frames");
    std::fs::create_dir_all(&frames_dir)
        .map_err(|e| format!("create '{}': {e}", frames_dir.display()))?;

    let mut last_progress = 0u8;
    let mut emit = |percent: u8| {
        if percent > last_progress {
            last_progress = percent;
            let _ = tx.send(MediaEvent::Progress { job_id: job.job_id, percent });
        }
    };
    emit(10);

    let mut decoder = VideoDecoder::open(&job.video_path).map_err(|e| format!("{e:#}"))?;
    let total = decoder.info().total_frames;

    let mut count: i64 = 0;
    loop {
        if cancel.load(Ordering::Relaxed) {
            return Err("cancelled".into());
        }
        match decoder.decode_next().map_err(|e| format!("decode frame {count}: {e:#}"))? {
            Some(frame) => {
                let path = frames_dir.join(frame_file_name(count));
                save_jpeg(&frame, &path)?;
                count += 1;
                if total > 0 {
                    emit(extract_progress(count, total));
                }
            }
            None => break,
        }
    }

    if count == 0 {
        return Err(format!("no frames extracted from '{}'", job.video_path.display()));
    }
    emit(60);

    let audio_path = job.output_dir.join("audio.mp3");
    extract_audio(&job.video_path, &audio_path)
        .map_err(|e| format!("audio extraction failed: {e}"))?;
    emit(100);

    eprintln!("[split] {count} frames + audio ← {}", job.video_path.display());
    Ok(format!(
        "split complete\nframes: {}\naudio: {}",
        frames_dir.display(),
        audio_path.display(),
    ))
}

/// `frame_000000.jpg`, `frame_000001.jpg`, …
pub(crate) fn frame_file_name(index: i64) -> String {
    format!("frame_{index:06}.jpg")
}

/// Frame extraction owns the 10→60 band, proportional to frames written.
fn extract_progress(done: i64, total: i64) -> u8 {
    (10 + done * 50 / total).clamp(10, 60) as u8
}

fn save_jpeg(frame: &RgbFrame, path: &Path) -> Result<(), String> {
    let file = File::create(path).map_err(|e| format!("create '{}': {e}", path.display()))?;
    let writer = BufWriter::new(file);
    let encoder = JpegEncoder::new_with_quality(writer, JPEG_QUALITY);
    encoder
        .write_image(&frame.data, frame.width, frame.height, image::ExtendedColorType::Rgb8)
        .map_err(|e| format!("write '{}': {e}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn frame_names_are_zero_padded_to_six_digits() {
        assert_eq!(frame_file_name(0), "frame_000000.jpg");
        assert_eq!(frame_file_name(249), "frame_000249.jpg");
        assert_eq!(frame_file_name(1_000_000), "frame_1000000.jpg");
    }

    #[test]
    fn extract_progress_is_monotonic_and_capped() {
        let total = 250;
        let mut last = 0;
        for done in 1..=total {
            let p = extract_progress(done, total);
            assert!(p >= last);
            assert!((10..=60).contains(&p));
            last = p;
        }
        assert_eq!(extract_progress(total, total), 60);
        // Estimated totals can undershoot the real frame count.
        assert_eq!(extract_progress(total * 2, total), 60);
    }

    #[test]
    fn failed_job_reports_failure_with_monotonic_progress() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = bounded(64);
        let job = SplitJob {
            job_id:     Uuid::new_v4(),
            video_path: PathBuf::from("/nonexistent/clip.mp4"),
            output_dir: dir.path().join("out"),
        };
        split_video(job, Arc::new(AtomicBool::new(false)), tx);

        let mut last = 0u8;
        let mut finished = None;
        for event in rx.try_iter() {
            match event {
                MediaEvent::Progress { percent, .. } => {
                    assert!(percent > last);
                    last = percent;
                }
                MediaEvent::JobFinished { success, message, .. } => {
                    finished = Some((success, message));
                }
                _ => {}
            }
        }
        let (success, message) = finished.expect("job must finish");
        assert!(!success);
        assert!(message.contains("/nonexistent/clip.mp4"));
        // Output directory was still created — partial state is not rolled back.
        assert!(dir.path().join("out/frames").is_dir());
    }

    #[test]
    fn cancelled_job_reports_cancellation() {
        // Cancel flag set up front: the job must still end in exactly one
        // JobFinished { success: false }, whatever failure wins the race.
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = bounded(64);
        let job = SplitJob {
            job_id:     Uuid::new_v4(),
            video_path: PathBuf::from("/nonexistent/clip.mp4"),
            output_dir: dir.path().join("out"),
        };
        split_video(job, Arc::new(AtomicBool::new(true)), tx);
        let outcome = rx
            .try_iter()
            .find_map(|e| match e {
                MediaEvent::JobFinished { success, message, .. } => Some((success, message)),
                _ => None,
            })
            .expect("job must finish");
        assert!(!outcome.0);
    }
}
