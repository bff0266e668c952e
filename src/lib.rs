pub mod config;
pub mod constants;
pub mod error;
pub mod inference;
pub mod preprocessing {
    pub mod load_audio;
    pub mod raw_audio;
    pub mod windowed_audio;
}
pub mod postprocessing {
    pub mod midi;
    pub mod piano_roll;
}

pub use config::{Config, ExportConfig, RemainderPolicy, Stride, TranscribeConfig};
pub use error::{Result, TranscribeError};
pub use inference::{get_piano_roll, Device, OnnxModel, PianoRollModel};
pub use postprocessing::midi::export_midi;
pub use preprocessing::raw_audio::{access_full, get_audio_segment};
