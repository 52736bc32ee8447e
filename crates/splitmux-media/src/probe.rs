// crates/splitmux-media/src/probe.rs
//
// In-process stream metadata probing: resolution, frame rate, bit rate,
// frame count, duration, codec name. Opens its own short-lived input
// context; nothing is kept alive after the probe returns.

use std::path::Path;

use anyhow::{anyhow, Result};

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::input;
use ffmpeg::media::Type;

use splitmux_core::media_types::MediaInfo;

/// Frame rate assumed when the container reports no average frame rate.
pub const FALLBACK_FRAME_RATE: f64 = 25.0;

/// Average frame rate of `stream`, falling back to 25.0 when the container
/// carries none.
pub fn stream_frame_rate(stream: &ffmpeg::format::stream::Stream) -> f64 {
    let afr = stream.avg_frame_rate();
    if afr.denominator() != 0 && afr.numerator() != 0 {
        f64::from(afr)
    } else {
        FALLBACK_FRAME_RATE
    }
}

/// Total frame count: container metadata when present, else estimated from
/// duration and frame rate.
pub fn total_frames(stream: &ffmpeg::format::stream::Stream, duration_ms: i64, frame_rate: f64) -> i64 {
    let nb = stream.frames();
    if nb > 0 {
        nb
    } else {
        (duration_ms as f64 / 1000.0 * frame_rate) as i64
    }
}

/// Index of the first video stream in `ictx`, or an error when none exists.
pub fn first_video_stream(ictx: &ffmpeg::format::context::Input) -> Result<usize> {
    ictx.streams()
        .find(|s| s.parameters().medium() == Type::Video)
        .map(|s| s.index())
        .ok_or_else(|| anyhow!("no video stream"))
}

/// Probe `path` for the metadata block shown to the user and used to size
/// playback pacing.
pub fn probe(path: &Path) -> Result<MediaInfo> {
    let ictx = input(path)
        .map_err(|e| anyhow!("open '{}': {e}", path.display()))?;

    let video_idx = first_video_stream(&ictx)?;
    let stream = ictx.stream(video_idx).unwrap();
    let params = stream.parameters();

    let duration_ms = ictx.duration() * 1000 / ffmpeg::ffi::AV_TIME_BASE as i64;
    let frame_rate  = stream_frame_rate(&stream);
    let frames      = total_frames(&stream, duration_ms, frame_rate);

    // No safe accessor for the container bit rate in this binding version.
    let bit_rate = unsafe { (*ictx.as_ptr()).bit_rate };

    let codec_ctx = ffmpeg::codec::context::Context::from_parameters(stream.parameters())?;
    let codec_name = ffmpeg::decoder::find(codec_ctx.id())
        .map(|c| c.name().to_string())
        .unwrap_or_else(|| format!("{:?}", codec_ctx.id()).to_lowercase());

    Ok(MediaInfo {
        width: params.width() as u32,
        height: params.height() as u32,
        frame_rate,
        bit_rate,
        total_frames: frames,
        duration_ms,
        codec_name,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_nonexistent_path_is_an_error() {
        assert!(probe(Path::new("/nonexistent/clip.mp4")).is_err());
    }
}
