//! WAV asset loading via `hound`.
//!
//! Integer PCM is scaled by the largest positive value for its bit depth, so
//! 16-bit `i16::MAX` maps to `1.0`. Channels stay interleaved; mixdown happens
//! in [`super::normalize`].

use std::io::Read;
use std::path::Path;

use tracing::info;

use super::RawAudio;
use crate::error::{BlendsyncError, Result};

/// Open and decode a WAV file from disk.
pub fn read_wav(path: impl AsRef<Path>) -> Result<RawAudio> {
    let path = path.as_ref();
    if !path.exists() {
        return Err(BlendsyncError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("audio file not found: {}", path.display()),
        )));
    }
    let reader = hound::WavReader::open(path).map_err(|e| BlendsyncError::Wav(e.to_string()))?;
    let audio = decode(reader)?;
    info!(
        path = %path.display(),
        channels = audio.channels,
        sample_rate = audio.sample_rate,
        frames = audio.frames(),
        "loaded WAV"
    );
    Ok(audio)
}

/// Decode WAV bytes from any reader (in-memory buffers, network bodies).
pub fn decode_wav<R: Read>(reader: R) -> Result<RawAudio> {
    let reader = hound::WavReader::new(reader).map_err(|e| BlendsyncError::Wav(e.to_string()))?;
    decode(reader)
}

fn decode<R: Read>(mut reader: hound::WavReader<R>) -> Result<RawAudio> {
    let spec = reader.spec();

    let samples: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => {
            if spec.bits_per_sample != 32 {
                return Err(BlendsyncError::UnsupportedFormat(format!(
                    "{}-bit float PCM",
                    spec.bits_per_sample
                )));
            }
            reader
                .samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| BlendsyncError::Wav(e.to_string()))?
        }
        hound::SampleFormat::Int => {
            if spec.bits_per_sample == 0 || spec.bits_per_sample > 32 {
                return Err(BlendsyncError::UnsupportedFormat(format!(
                    "{}-bit integer PCM",
                    spec.bits_per_sample
                )));
            }
            let max = ((1_i64 << (spec.bits_per_sample - 1)) - 1) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 / max))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| BlendsyncError::Wav(e.to_string()))?
        }
    };

    Ok(RawAudio::new(samples, spec.channels, spec.sample_rate))
}
