// crates/splitmux-media/src/audio.rs
//
// Audio track extraction by stream copy — packets move from the source
// container to the output container unchanged, no decode or re-encode.
// The output format is inferred from the destination extension.

use std::path::Path;

use ffmpeg_the_third as ffmpeg;
use ffmpeg::format::{input, output};
use ffmpeg::media::Type as MediaType;

/// Copy the first audio stream of `src` into a standalone file at `dst`.
///
/// Codec parameters are copied byte-for-byte (codec tag cleared so the
/// output container accepts them); every packet of the stream is rescaled
/// to the output time base and written interleaved.
pub fn extract_audio(src: &Path, dst: &Path) -> Result<(), String> {
    let mut ictx = input(src)
        .map_err(|e| format!("open '{}': {e}", src.display()))?;

    let audio_idx = ictx
        .streams()
        .find(|s| s.parameters().medium() == MediaType::Audio)
        .map(|s| s.index())
        .ok_or_else(|| format!("no audio stream in '{}'", src.display()))?;

    let in_tb = ictx.stream(audio_idx).unwrap().time_base();

    let mut octx = output(dst)
        .map_err(|e| format!("could not open output '{}': {e}", dst.display()))?;

    {
        let ist = ictx.stream(audio_idx).unwrap();
        let mut ost = octx
            .add_stream(ffmpeg::encoder::find(ffmpeg::codec::Id::None))
            .map_err(|e| format!("add audio stream: {e}"))?;
        ost.set_parameters(ist.parameters());
        // Codec tags are container-specific; a copied tag can be rejected by
        // the output format.
        unsafe {
            (*ost.parameters().as_mut_ptr()).codec_tag = 0;
        }
    }

    octx.write_header()
        .map_err(|e| format!("write output header: {e}"))?;

    let out_tb = octx.stream(0).unwrap().time_base();

    for result in ictx.packets() {
        let (stream, mut packet) = match result {
            Ok(p) => p,
            Err(e) => return Err(format!("read packet from '{}': {e}", src.display())),
        };
        if stream.index() != audio_idx {
            continue;
        }
        packet.rescale_ts(in_tb, out_tb);
        packet.set_stream(0);
        packet.set_position(-1);
        packet
            .write_interleaved(&mut octx)
            .map_err(|e| format!("write audio packet: {e}"))?;
    }

    octx.write_trailer()
        .map_err(|e| format!("write trailer: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_from_nonexistent_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let dst = dir.path().join("audio.mp3");
        assert!(extract_audio(Path::new("/nonexistent/clip.mp4"), &dst).is_err());
    }
}
