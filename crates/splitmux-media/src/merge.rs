// crates/splitmux-media/src/merge.rs
//
// Merge job: encode a sorted image sequence into an mp4, then mux an audio
// track in. Audio failure is degraded, not fatal — the job still succeeds
// with the video-only file.
//
// Blocking — run on a dedicated thread (MediaWorker::start_merge does).
// Progress: 10 at start, 10→90 proportional during encoding, 100 at the end.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_channel::Sender;
use image::imageops::FilterType;
use uuid::Uuid;

use splitmux_core::media_types::MediaEvent;

use crate::encode::{EncodeConfig, VideoEncoder};
use crate::remux::remux_with_audio;

/// Everything needed to run one merge job.
pub struct MergeJob {
    pub job_id:      Uuid,
    /// Directory holding the frame images (`*.jpg`, `*.jpeg`, `*.png`).
    pub image_dir:   PathBuf,
    /// Optional audio track to mux in after encoding.
    pub audio_path:  Option<PathBuf>,
    pub output_path: PathBuf,
}

/// Run `job` to completion. Sends `Progress` along the way and exactly one
/// terminal `JobFinished`.
pub fn merge_video(job: MergeJob, cancel: Arc<AtomicBool>, tx: Sender<MediaEvent>) {
    let job_id = job.job_id;
    match run_merge(&job, &cancel, &tx) {
        Ok(message) => {
            let _ = tx.send(MediaEvent::JobFinished { job_id, success: true, message });
        }
        Err(message) => {
            eprintln!("[merge] job {job_id} failed: {message}");
            let _ = tx.send(MediaEvent::JobFinished { job_id, success: false, message });
        }
    }
}

fn run_merge(
    job:    &MergeJob,
    cancel: &Arc<AtomicBool>,
    tx:     &Sender<MediaEvent>,
) -> Result<String, String> {
    let mut last_progress = 0u8;
    let mut emit = |percent: u8| {
        if percent > last_progress {
            last_progress = percent;
            let _ = tx.send(MediaEvent::Progress { job_id: job.job_id, percent });
        }
    };
    emit(10);

    let images = collect_frame_files(&job.image_dir)?;

    // The first image fixes the canonical output dimensions.
    let first = image::open(&images[0])
        .map_err(|e| format!("read '{}': {e}", images[0].display()))?
        .to_rgb8();
    let (width, height) = first.dimensions();

    let config = EncodeConfig::new(width, height);
    let mut encoder = VideoEncoder::open(&job.output_path, &config)?;

    let total = images.len();
    for (i, path) in images.iter().enumerate() {
        if cancel.load(Ordering::Relaxed) {
            return Err("cancelled".into());
        }

        // An unreadable image is skipped, not fatal.
        let img = match image::open(path) {
            Ok(img) => img.to_rgb8(),
            Err(e) => {
                eprintln!("[merge] skipping unreadable '{}': {e}", path.display());
                continue;
            }
        };

        // Images that differ from the canonical dimensions are resized
        // before submission — the encode session rejects mismatches.
        let img = if img.dimensions() != (width, height) {
            image::imageops::resize(&img, width, height, FilterType::Triangle)
        } else {
            img
        };

        encoder.encode_frame(img.as_raw(), width, height)?;
        emit(encode_progress(i + 1, total));
    }

    encoder.finalize()?;
    let frames_encoded = encoder.frame_count();
    encoder.close();

    if let Some(audio) = job.audio_path.as_deref() {
        if audio.exists() {
            let temp = temp_output_path(&job.output_path);
            std::fs::rename(&job.output_path, &temp)
                .map_err(|e| format!("rename to '{}': {e}", temp.display()))?;

            match remux_with_audio(&temp, audio, &job.output_path) {
                Ok(()) => {
                    let _ = std::fs::remove_file(&temp);
                }
                Err(e) => {
                    // Degrade to the video-only artifact.
                    eprintln!("[merge] audio mux failed: {e} — keeping video-only output");
                    std::fs::rename(&temp, &job.output_path)
                        .map_err(|e| format!("restore '{}': {e}", job.output_path.display()))?;
                    emit(100);
                    return Ok(format!(
                        "merge complete ({frames_encoded} frames, video only — audio mux failed)\noutput: {}",
                        job.output_path.display(),
                    ));
                }
            }
        }
    }

    emit(100);
    eprintln!("[merge] {frames_encoded} frames → {}", job.output_path.display());
    Ok(format!(
        "merge complete ({frames_encoded} frames)\noutput: {}",
        job.output_path.display(),
    ))
}

/// Image files in `dir`, sorted by file name. Empty is an error.
fn collect_frame_files(dir: &Path) -> Result<Vec<PathBuf>, String> {
    let entries = std::fs::read_dir(dir)
        .map_err(|e| format!("read '{}': {e}", dir.display()))?;

    let mut files: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .and_then(|e| e.to_str())
                    .map(|e| {
                        let e = e.to_ascii_lowercase();
                        e == "jpg" || e == "jpeg" || e == "png"
                    })
                    .unwrap_or(false)
        })
        .collect();

    if files.is_empty() {
        return Err(format!("no image files in '{}'", dir.display()));
    }
    files.sort();
    Ok(files)
}

/// Encoding owns the 10→90 band, proportional to images processed.
fn encode_progress(done: usize, total: usize) -> u8 {
    (10 + done * 80 / total).clamp(10, 90) as u8
}

/// `out.mp4` → `out.mp4.temp.mp4` — the parking spot for the video-only file
/// while the remux writes the real output.
fn temp_output_path(output: &Path) -> PathBuf {
    let mut s = output.as_os_str().to_os_string();
    s.push(".temp.mp4");
    PathBuf::from(s)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::bounded;

    #[test]
    fn frame_files_are_filtered_and_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["c.jpg", "a.png", "b.jpeg", "notes.txt", "clip.mp4"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        let files = collect_frame_files(dir.path()).unwrap();
        let names: Vec<_> = files
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, ["a.png", "b.jpeg", "c.jpg"]);
    }

    #[test]
    fn empty_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(collect_frame_files(dir.path()).is_err());
    }

    #[test]
    fn encode_progress_is_monotonic_from_10_to_90() {
        let total = 250;
        let mut last = 0;
        for done in 1..=total {
            let p = encode_progress(done, total);
            assert!(p >= last);
            assert!((10..=90).contains(&p));
            last = p;
        }
        assert_eq!(encode_progress(total, total), 90);
    }

    #[test]
    fn temp_path_appends_suffix() {
        assert_eq!(
            temp_output_path(Path::new("/tmp/out.mp4")),
            PathBuf::from("/tmp/out.mp4.temp.mp4"),
        );
    }

    #[test]
    fn merge_on_empty_directory_reports_failure() {
        let dir = tempfile::tempdir().unwrap();
        let (tx, rx) = bounded(16);
        let job = MergeJob {
            job_id:      Uuid::new_v4(),
            image_dir:   dir.path().to_path_buf(),
            audio_path:  None,
            output_path: dir.path().join("out.mp4"),
        };
        merge_video(job, Arc::new(AtomicBool::new(false)), tx);
        let outcome = rx
            .try_iter()
            .find_map(|e| match e {
                MediaEvent::JobFinished { success, message, .. } => Some((success, message)),
                _ => None,
            })
            .expect("job must finish");
        assert!(!outcome.0);
        assert!(outcome.1.contains("no image files"));
    }
}
