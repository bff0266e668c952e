use std::path::PathBuf;

use thiserror::Error;

/// Errors produced while reading audio, running the model or writing MIDI.
#[derive(Error, Debug)]
pub enum TranscribeError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Fewer samples than requested were left in the file.
    #[error("short read in {path}: wanted {wanted} samples at sample {start}, got {got}")]
    ShortRead {
        path: PathBuf,
        start: usize,
        wanted: usize,
        got: usize,
    },

    #[error("{path} is {len} bytes long, not a whole number of 32-bit floats")]
    TrailingBytes { path: PathBuf, len: u64 },

    /// The file is too short for even one segment at the requested offset.
    #[error("audio too short: {total} samples leave no room for a {window}-sample window after offset {offset}")]
    InsufficientAudio {
        total: usize,
        offset: usize,
        window: usize,
    },

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("model error: {0}")]
    Model(#[from] ort::Error),

    #[error("model returned shape {got:?}, expected {expected:?}")]
    ModelOutput {
        expected: Vec<usize>,
        got: Vec<usize>,
    },

    #[error("piano roll must have {expected} pitch columns, got {got}")]
    PitchDimension { expected: usize, got: usize },

    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),

    #[error("resampling error: {0}")]
    Resample(String),

    #[error("configuration error: {0}")]
    Config(#[from] toml::de::Error),

    #[error("array shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

pub type Result<T> = std::result::Result<T, TranscribeError>;
