//! WAV corpus loading.

use std::path::Path;

use hound::{SampleFormat, WavReader};

use crate::types::AudioSource;

/// Header facts for a WAV file, read without decoding any samples.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WaveInfo {
    pub sample_rate: u32,
    pub bit_depth: u16,
    /// Per-channel length in milliseconds.
    pub duration_ms: f64,
}

/// Read just the WAV header. Sizing a patch grid over a corpus needs only
/// rate and duration, so recordings that will be reopened per fetch are
/// probed instead of decoded.
pub fn probe_wave_file(path: impl AsRef<Path>) -> Result<WaveInfo, hound::Error> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    Ok(WaveInfo {
        sample_rate: spec.sample_rate,
        bit_depth: spec.bits_per_sample,
        duration_ms: reader.duration() as f64 * 1000.0 / spec.sample_rate as f64,
    })
}

/// Read a WAV file into an [`AudioSource`], averaging multi-channel audio
/// down to mono.
///
/// Integer samples keep their native converter scale instead of being
/// normalized to [-1, 1]; frame extraction rescales sources wider than
/// 16 bits and the spectrogram clip range assumes that convention. IEEE
/// float samples are brought to the same convention by scaling [-1, 1] up
/// to 16-bit range, and the source reports 16 as the scale it carries.
pub fn read_wave_file(path: impl AsRef<Path>) -> Result<AudioSource, hound::Error> {
    let mut reader = WavReader::open(path)?;
    let spec = reader.spec();

    let (interleaved, scale_bits): (Vec<f32>, u16) = match spec.sample_format {
        SampleFormat::Int => (
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32))
                .collect::<Result<_, _>>()?,
            spec.bits_per_sample,
        ),
        SampleFormat::Float => (
            reader
                .samples::<f32>()
                .map(|s| s.map(|v| v * 32768.0))
                .collect::<Result<_, _>>()?,
            16,
        ),
    };

    let channels = spec.channels as usize;
    let samples = if channels <= 1 {
        interleaved
    } else {
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() / channels as f32)
            .collect()
    };

    Ok(AudioSource {
        samples,
        sample_rate: spec.sample_rate,
        bit_depth: scale_bits,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use hound::{WavSpec, WavWriter};

    use crate::dsp::extract_frames;
    use crate::types::RenderParams;

    fn spec(channels: u16, bits: u16, format: SampleFormat) -> WavSpec {
        WavSpec {
            channels,
            sample_rate: 16000,
            bits_per_sample: bits,
            sample_format: format,
        }
    }

    #[test]
    fn test_reads_mono_int_at_native_scale() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mono.wav");
        let mut writer = WavWriter::create(&path, spec(1, 16, SampleFormat::Int)).unwrap();
        for value in [100i16, -200, 300] {
            writer.write_sample(value).unwrap();
        }
        writer.finalize().unwrap();

        let audio = read_wave_file(&path).unwrap();
        assert_eq!(audio.samples, vec![100.0, -200.0, 300.0]);
        assert_eq!(audio.sample_rate, 16000);
        assert_eq!(audio.bit_depth, 16);
    }

    #[test]
    fn test_averages_stereo_to_mono() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let mut writer = WavWriter::create(&path, spec(2, 16, SampleFormat::Int)).unwrap();
        for value in [100i16, 200, -100, 100] {
            writer.write_sample(value).unwrap();
        }
        writer.finalize().unwrap();

        let audio = read_wave_file(&path).unwrap();
        assert_eq!(audio.samples, vec![150.0, 0.0]);
    }

    #[test]
    fn test_scales_float_samples_to_converter_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("float.wav");
        let mut writer = WavWriter::create(&path, spec(1, 32, SampleFormat::Float)).unwrap();
        for value in [0.5f32, -0.25] {
            writer.write_sample(value).unwrap();
        }
        writer.finalize().unwrap();

        let audio = read_wave_file(&path).unwrap();
        assert_eq!(audio.samples, vec![16384.0, -8192.0]);
        assert_eq!(audio.bit_depth, 16);
    }

    #[test]
    fn test_float_source_frames_at_converter_scale() {
        // A half-amplitude float sine must frame like a 16384-peak integer
        // one, not get floor-divided down as a 32-bit-wide source.
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sine.wav");
        let mut writer = WavWriter::create(&path, spec(1, 32, SampleFormat::Float)).unwrap();
        for n in 0..1600 {
            let phase = 2.0 * std::f32::consts::PI * 1000.0 * n as f32 / 16000.0;
            writer.write_sample(0.5 * phase.sin()).unwrap();
        }
        writer.finalize().unwrap();

        let audio = read_wave_file(&path).unwrap();
        let frames = extract_frames(&audio, &RenderParams::default(), 0.0, 100.0, None);
        assert!(!frames.is_empty());
        let peak = frames.data.iter().fold(0.0f32, |m, &s| m.max(s));
        assert!((peak - 16384.0).abs() < 50.0, "peak framed sample {peak}");
    }

    #[test]
    fn test_probe_matches_decoded_duration() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stereo.wav");
        let mut writer = WavWriter::create(&path, spec(2, 16, SampleFormat::Int)).unwrap();
        for value in [100i16, 200, -100, 100, 0, 0] {
            writer.write_sample(value).unwrap();
        }
        writer.finalize().unwrap();

        let info = probe_wave_file(&path).unwrap();
        let audio = read_wave_file(&path).unwrap();
        assert_eq!(info.sample_rate, audio.sample_rate);
        assert_eq!(info.bit_depth, audio.bit_depth);
        assert_eq!(info.duration_ms, audio.duration_ms());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_wave_file(dir.path().join("absent.wav")).is_err());
    }
}
