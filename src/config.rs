use std::{fmt, fs, path::Path, str::FromStr};

use serde::Deserialize;

use crate::constants::{
    DEFAULT_BATCH_SIZE, DEFAULT_BEAT_RESOLUTION, DEFAULT_COUNT, DEFAULT_OFFSET, DEFAULT_PITCH_CLASSES,
    DEFAULT_PROGRAM, DEFAULT_STRIDE, DEFAULT_TEMPO, DEFAULT_TRACK_NAME, DEFAULT_WINDOW,
};
use crate::error::Result;

/// Step between consecutive segment starts.
///
/// `Auto` spreads exactly `count` segments across the file. It is written
/// `-1` or `"auto"` in config files and on the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawStride")]
pub enum Stride {
    Auto,
    Fixed(usize),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawStride {
    Number(i64),
    Text(String),
}

impl TryFrom<RawStride> for Stride {
    type Error = String;

    fn try_from(raw: RawStride) -> std::result::Result<Self, Self::Error> {
        match raw {
            RawStride::Number(-1) => Ok(Stride::Auto),
            RawStride::Number(n) if n > 0 => Ok(Stride::Fixed(n as usize)),
            RawStride::Number(n) => Err(format!("stride must be positive or -1, got {n}")),
            RawStride::Text(text) => text.parse(),
        }
    }
}

impl FromStr for Stride {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim() {
            "-1" | "auto" => Ok(Stride::Auto),
            other => match other.parse::<usize>() {
                Ok(0) | Err(_) => Err(format!("stride must be a positive integer, -1 or \"auto\", got {other:?}")),
                Ok(n) => Ok(Stride::Fixed(n)),
            },
        }
    }
}

impl fmt::Display for Stride {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stride::Auto => write!(f, "auto"),
            Stride::Fixed(n) => write!(f, "{n}"),
        }
    }
}

/// What to do with the rows left over when `count` is not a multiple of the batch size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemainderPolicy {
    /// Run the leftover rows as one smaller batch.
    #[default]
    Process,
    /// Skip the leftover rows; their predictions stay zero.
    Drop,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct TranscribeConfig {
    /// Samples per segment.
    pub window: usize,
    pub stride: Stride,
    /// Sample index of the first segment.
    pub offset: usize,
    /// Number of segments. Only used with `Stride::Auto`.
    pub count: usize,
    pub batch_size: usize,
    /// Output values per segment (pitch classes).
    pub m: usize,
    pub remainder: RemainderPolicy,
}

impl Default for TranscribeConfig {
    fn default() -> Self {
        Self {
            window: DEFAULT_WINDOW,
            stride: Stride::Fixed(DEFAULT_STRIDE),
            offset: DEFAULT_OFFSET,
            count: DEFAULT_COUNT,
            batch_size: DEFAULT_BATCH_SIZE,
            m: DEFAULT_PITCH_CLASSES,
            remainder: RemainderPolicy::default(),
        }
    }
}

/// Metadata attached to the exported piano-roll track.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub program: u8,
    pub is_drum: bool,
    pub name: String,
    /// Beats per minute.
    pub tempo: f64,
    /// Piano-roll time steps per beat.
    pub beat_resolution: u16,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_PROGRAM,
            is_drum: false,
            name: DEFAULT_TRACK_NAME.to_string(),
            tempo: DEFAULT_TEMPO,
            beat_resolution: DEFAULT_BEAT_RESOLUTION,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub transcribe: TranscribeConfig,
    pub export: ExportConfig,
}

impl Config {
    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_toml_str(&text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stride_parses_sentinel_and_numbers() {
        assert_eq!("-1".parse::<Stride>(), Ok(Stride::Auto));
        assert_eq!("auto".parse::<Stride>(), Ok(Stride::Auto));
        assert_eq!("250".parse::<Stride>(), Ok(Stride::Fixed(250)));
        assert!("0".parse::<Stride>().is_err());
        assert!("-3".parse::<Stride>().is_err());
    }

    #[test]
    fn empty_config_uses_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.transcribe.window, 16384);
        assert_eq!(config.transcribe.stride, Stride::Fixed(1000));
        assert_eq!(config.export.beat_resolution, 86);
        assert_eq!(config.export.name, "my awesome piano");
    }

    #[test]
    fn toml_overrides_selected_fields() {
        let config = Config::from_toml_str(
            r#"
            [transcribe]
            stride = -1
            count = 42
            remainder = "drop"

            [export]
            tempo = 120.0
            is_drum = true
            "#,
        )
        .unwrap();

        assert_eq!(config.transcribe.stride, Stride::Auto);
        assert_eq!(config.transcribe.count, 42);
        assert_eq!(config.transcribe.remainder, RemainderPolicy::Drop);
        assert_eq!(config.transcribe.batch_size, 500);
        assert_eq!(config.export.tempo, 120.0);
        assert!(config.export.is_drum);
    }

    #[test]
    fn shipped_config_matches_defaults() {
        let config = Config::load(concat!(env!("CARGO_MANIFEST_DIR"), "/config/default.toml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn toml_rejects_bad_stride() {
        assert!(Config::from_toml_str("[transcribe]\nstride = 0\n").is_err());
        assert!(Config::from_toml_str("[transcribe]\nstride = \"auto\"\n")
            .map(|c| c.transcribe.stride == Stride::Auto)
            .unwrap());
    }
}
