use std::{
    fs::File,
    io::{BufWriter, Write},
    path::Path,
};

use hound::{SampleFormat, WavReader};
use ndarray::Array1;
use rubato::{Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction};

use crate::error::{Result, TranscribeError};

/// Decode a WAV file into mono samples in `[-1, 1]` at its native sample rate.
fn load_mono<P: AsRef<Path>>(path: P) -> Result<(Vec<f64>, u32)> {
    let reader = WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f64> = match spec.sample_format {
        SampleFormat::Float => reader
            .into_samples::<f32>()
            .map(|s| s.map(f64::from))
            .collect::<std::result::Result<_, _>>()?,
        SampleFormat::Int => {
            let max_sample_value = 2.0_f64.powi(spec.bits_per_sample as i32 - 1) - 1.0;
            reader
                .into_samples::<i32>()
                .map(|s| s.map(|v| v as f64 / max_sample_value))
                .collect::<std::result::Result<_, _>>()?
        }
    };

    // Average the channels of each frame down to mono
    let mono = interleaved
        .chunks_exact(channels)
        .map(|frame| frame.iter().sum::<f64>() / channels as f64)
        .collect();

    Ok((mono, spec.sample_rate))
}

fn resample(samples: Vec<f64>, from_rate: u32, to_rate: u32) -> Result<Vec<f64>> {
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples);
    }

    let params = SincInterpolationParameters {
        sinc_len: 256,
        f_cutoff: 0.95,
        interpolation: SincInterpolationType::Linear,
        oversampling_factor: 256,
        window: WindowFunction::BlackmanHarris2,
    };

    let resample_ratio = to_rate as f64 / from_rate as f64;
    let expected_len = (samples.len() as f64 * resample_ratio) as usize;
    let mut resampler = SincFixedIn::<f64>::new(resample_ratio, 2.0, params, samples.len(), 1)
        .map_err(|e| TranscribeError::Resample(e.to_string()))?;

    let channel_data = vec![samples];
    let mut resampled = resampler
        .process(&channel_data, None)
        .map_err(|e| TranscribeError::Resample(e.to_string()))?;

    let mut channel = resampled.swap_remove(0);
    channel.truncate(expected_len);
    Ok(channel)
}

/// Load a WAV file as mono audio resampled to `target_sample_rate`.
pub fn load_and_convert_audio<P: AsRef<Path>>(path: P, target_sample_rate: u32) -> Result<Array1<f32>> {
    let (mono, sample_rate) = load_mono(path)?;
    log::debug!("decoded {} frames at {} Hz", mono.len(), sample_rate);

    let resampled = resample(mono, sample_rate, target_sample_rate)?;
    Ok(resampled.into_iter().map(|s| s as f32).collect())
}

/// Write samples as a headerless little-endian float32 file.
pub fn write_raw_audio<P: AsRef<Path>>(path: P, samples: &Array1<f32>) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    for sample in samples.iter() {
        writer.write_all(&sample.to_le_bytes())?;
    }
    writer.flush()?;
    Ok(())
}

/// Convert a WAV file into the raw float32 format read by the transcriber.
///
/// # Returns
///
/// * The number of samples written.
pub fn convert_wav_to_raw<P: AsRef<Path>, Q: AsRef<Path>>(
    wav_path: P,
    raw_path: Q,
    target_sample_rate: u32,
) -> Result<usize> {
    let samples = load_and_convert_audio(wav_path, target_sample_rate)?;
    write_raw_audio(raw_path, &samples)?;
    log::info!("wrote {} samples at {} Hz", samples.len(), target_sample_rate);
    Ok(samples.len())
}
