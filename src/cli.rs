use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use pianoroll_transcriber::constants::{DEFAULT_INTRA_THREADS, PREPARE_SAMPLE_RATE};
use pianoroll_transcriber::{Config, Device, RemainderPolicy, Stride};

/// Transcribe raw float32 audio into a piano-roll MIDI file.
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log level: error, warn, info, debug, trace.
    #[arg(long, default_value = "info", global = true)]
    pub log_level: log::LevelFilter,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a model over a raw audio file and export the piano roll as MIDI.
    Transcribe(TranscribeArgs),
    /// Convert a WAV file to the raw float32 format.
    Prepare(PrepareArgs),
}

#[derive(Args, Debug)]
pub struct TranscribeArgs {
    /// Raw little-endian float32 audio file.
    pub input: PathBuf,

    /// ONNX model mapping (batch, window) audio to (batch, m) activations.
    #[arg(long)]
    pub model: PathBuf,

    /// Destination MIDI file.
    #[arg(short, long)]
    pub output: PathBuf,

    /// TOML file with [transcribe] and [export] tables.
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// cpu, cuda or cuda:N.
    #[arg(long, default_value = "cpu")]
    pub device: Device,

    #[arg(long, default_value_t = DEFAULT_INTRA_THREADS)]
    pub threads: usize,

    /// Samples per segment.
    #[arg(long)]
    pub window: Option<usize>,

    /// Samples between segment starts, or -1 / auto to spread `count` segments over the file.
    #[arg(long, allow_hyphen_values = true)]
    pub stride: Option<Stride>,

    /// First sample of the first segment.
    #[arg(long)]
    pub offset: Option<usize>,

    /// Number of segments when the stride is automatic.
    #[arg(long)]
    pub count: Option<usize>,

    #[arg(long)]
    pub batch_size: Option<usize>,

    /// Output values per segment.
    #[arg(short)]
    pub m: Option<usize>,

    /// Skip the final partial batch instead of running it.
    #[arg(long, default_value_t = false)]
    pub drop_remainder: bool,
}

#[derive(Args, Debug)]
pub struct PrepareArgs {
    pub input: PathBuf,
    pub output: PathBuf,

    #[arg(long, default_value_t = PREPARE_SAMPLE_RATE)]
    pub sample_rate: u32,
}

impl TranscribeArgs {
    /// Load the config file, if any, and apply command-line overrides.
    pub fn resolve_config(&self) -> anyhow::Result<Config> {
        let mut config = match &self.config {
            Some(path) => Config::load(path)?,
            None => Config::default(),
        };

        let transcribe = &mut config.transcribe;
        if let Some(window) = self.window {
            transcribe.window = window;
        }
        if let Some(stride) = self.stride {
            transcribe.stride = stride;
        }
        if let Some(offset) = self.offset {
            transcribe.offset = offset;
        }
        if let Some(count) = self.count {
            transcribe.count = count;
        }
        if let Some(batch_size) = self.batch_size {
            transcribe.batch_size = batch_size;
        }
        if let Some(m) = self.m {
            transcribe.m = m;
        }
        if self.drop_remainder {
            transcribe.remainder = RemainderPolicy::Drop;
        }

        Ok(config)
    }
}
