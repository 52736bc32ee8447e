// crates/splitmux-media/src/helpers/seek.rs
//
// Container seek helper with consistent soft-fail behaviour.
//
// All seeks are *backward* seeks: `..=ts` lands on the keyframe at or before
// the target, never after it. A forward seek would skip every frame between
// the target and the next keyframe, which for a mid-GOP target can be seconds
// of missing video. The pre-roll frames a backward seek produces are the
// caller's problem (playback simply shows them; they pass in under a frame
// interval).
//
// `avformat_seek_file` can fail on some containers that don't support random
// access. Seek failure here is soft: the demuxer keeps decoding from wherever
// it is, and the caller decides whether that is acceptable.

use ffmpeg_the_third as ffmpeg;

/// Seek `ictx` to `target_ms` milliseconds from the start of the container
/// (in `AV_TIME_BASE` units, nearest preceding keyframe).
///
/// Returns `true` on success. On failure logs a warning and returns `false`
/// without touching the context — decoding continues from the current
/// position.
pub fn seek_to_ms(
    ictx: &mut ffmpeg::format::context::Input,
    target_ms: i64,
    label: &str,
) -> bool {
    let seek_ts = target_ms * ffmpeg::ffi::AV_TIME_BASE as i64 / 1000;
    match ictx.seek(seek_ts, ..=seek_ts) {
        Ok(()) => true,
        Err(e) => {
            eprintln!("[seek] soft-fail in {label} at {target_ms} ms: {e} — decoding from current position");
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use ffmpeg_the_third as ffmpeg;

    #[test]
    fn ms_to_av_time_base_units() {
        // 2500 ms in AV_TIME_BASE (microsecond) units.
        let ts = 2_500i64 * ffmpeg::ffi::AV_TIME_BASE as i64 / 1000;
        assert_eq!(ts, 2_500_000);
    }
}
