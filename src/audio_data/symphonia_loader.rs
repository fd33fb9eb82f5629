use crate::audio_data::{DecodedAudio, LoadOptions};
use crate::error::{Result, SoftMixError};
use std::fs::File;
use std::path::Path;
use symphonia::{
    core::{
        audio::SampleBuffer, codecs::DecoderOptions, errors::Error, formats::FormatOptions,
        io::MediaSourceStream, meta::MetadataOptions, probe::Hint,
    },
    default::{get_codecs, get_probe},
};

/// Decodes the default track of `path` into interleaved f32.
pub fn load_audio_file(path: impl AsRef<Path>, options: &LoadOptions) -> Result<DecodedAudio> {
    let path = path.as_ref();
    let file = File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| SoftMixError::AudioLoading(format!("Failed to probe audio format: {}", e)))?;
    let mut format = probed.format;

    let track = format
        .default_track()
        .ok_or_else(|| SoftMixError::AudioLoading("No default audio track found".to_string()))?;
    let track_id = track.id;

    let sample_rate = track
        .codec_params
        .sample_rate
        .ok_or_else(|| SoftMixError::AudioLoading("Sample rate not found".to_string()))?;
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(0);

    let mut decoder = get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| SoftMixError::AudioLoading(format!("Failed to create decoder: {}", e)))?;

    let max_frames = options.max_frames(sample_rate);
    let mut samples: Vec<f32> = Vec::new();

    loop {
        if channels > 0 && samples.len() / channels as usize >= max_frames {
            break;
        }

        let packet = match format.next_packet() {
            Ok(packet) => packet,
            // end of stream
            Err(Error::IoError(_)) => break,
            Err(e) => {
                return Err(SoftMixError::AudioLoading(format!(
                    "Error reading packet: {}",
                    e
                )));
            }
        };
        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(decoded) => decoded,
            Err(Error::IoError(_)) => break,
            Err(Error::DecodeError(e)) => {
                log::debug!("Skipping corrupt packet in {}: {}", path.display(), e);
                continue;
            }
            Err(e) => {
                return Err(SoftMixError::AudioLoading(format!(
                    "Error decoding packet: {}",
                    e
                )));
            }
        };

        let spec = *decoded.spec();
        if channels == 0 {
            channels = spec.channels.count() as u16;
        }
        let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        buffer.copy_interleaved_ref(decoded);
        samples.extend_from_slice(buffer.samples());
    }

    if channels == 0 {
        return Err(SoftMixError::AudioLoading(
            "Channel count not found".to_string(),
        ));
    }

    let mut audio = DecodedAudio::new(samples, sample_rate, channels)?;
    audio.truncate_frames(max_frames);

    if options.convert_to_mono {
        audio = audio.downmix_to_mono();
    }
    if let Some(target_rate) = options.target_sample_rate {
        audio = audio.resample(target_rate)?;
    }

    log::debug!(
        "Loaded {}: {} frames, {} Hz, {} channel(s)",
        path.display(),
        audio.frames(),
        audio.sample_rate(),
        audio.channels()
    );

    Ok(audio)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_io_error() {
        let result = load_audio_file("does/not/exist.wav", &LoadOptions::default());
        assert!(matches!(result, Err(SoftMixError::Io(_))));
    }
}
