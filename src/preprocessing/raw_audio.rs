use std::{
    fs::{self, File},
    io::{Read, Seek, SeekFrom},
    path::Path,
};

use ndarray::Array1;

use crate::constants::{NORM_EPSILON, SIZE_OF_FLOAT};
use crate::error::{Result, TranscribeError};

fn decode_samples(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(SIZE_OF_FLOAT)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

/// Divide `samples` by their L2 norm plus a small epsilon, so silent input stays finite.
pub fn normalize(samples: &mut Array1<f32>) {
    let norm = samples.iter().map(|v| v * v).sum::<f32>().sqrt();
    samples.mapv_inplace(|v| v / (norm + NORM_EPSILON));
}

/// Number of samples stored in a raw float32 file.
pub fn sample_count<P: AsRef<Path>>(path: P) -> Result<usize> {
    let path = path.as_ref();
    let len = fs::metadata(path)?.len();
    if len % SIZE_OF_FLOAT as u64 != 0 {
        return Err(TranscribeError::TrailingBytes { path: path.to_path_buf(), len });
    }
    Ok((len / SIZE_OF_FLOAT as u64) as usize)
}

/// Read a normalized segment of audio from a raw float32 file.
///
/// # Arguments
///
/// * `path` - Path to the bin file.
/// * `start` - Index of the first sample of the segment.
/// * `window` - Number of samples to read.
///
/// # Returns
///
/// * The `window` samples starting at `start`, scaled to (almost) unit L2 norm.
pub fn get_audio_segment<P: AsRef<Path>>(path: P, start: usize, window: usize) -> Result<Array1<f32>> {
    let path = path.as_ref();
    let mut file = File::open(path)?;
    file.seek(SeekFrom::Start((start * SIZE_OF_FLOAT) as u64))?;

    let wanted_bytes = window * SIZE_OF_FLOAT;
    let mut buffer = Vec::with_capacity(wanted_bytes);
    file.take(wanted_bytes as u64).read_to_end(&mut buffer)?;
    if buffer.len() < wanted_bytes {
        return Err(TranscribeError::ShortRead {
            path: path.to_path_buf(),
            start,
            wanted: window,
            got: buffer.len() / SIZE_OF_FLOAT,
        });
    }

    let mut segment = Array1::from(decode_samples(&buffer));
    normalize(&mut segment);

    Ok(segment)
}

/// Read every sample of a raw float32 file, without normalization.
pub fn access_full<P: AsRef<Path>>(path: P) -> Result<Array1<f32>> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    if bytes.len() % SIZE_OF_FLOAT != 0 {
        return Err(TranscribeError::TrailingBytes {
            path: path.to_path_buf(),
            len: bytes.len() as u64,
        });
    }
    log::debug!("{}: {} bytes", path.display(), bytes.len());

    Ok(Array1::from(decode_samples(&bytes)))
}
