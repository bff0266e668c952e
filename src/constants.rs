// Raw audio
pub const SIZE_OF_FLOAT: usize = 4;
pub const NORM_EPSILON: f32 = 10e-8;
pub const PREPARE_SAMPLE_RATE: u32 = 44100;

// Windowing and inference
pub const DEFAULT_WINDOW: usize = 16384;
pub const DEFAULT_STRIDE: usize = 1000;
pub const DEFAULT_OFFSET: usize = 44100;
pub const DEFAULT_COUNT: usize = 7500;
pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const DEFAULT_PITCH_CLASSES: usize = 128;
pub const DEFAULT_INTRA_THREADS: usize = 4;

// MIDI Conversion
pub const MAX_VELOCITY: f32 = 127.0;
pub const N_PITCHES: usize = 128;
pub const DRUM_CHANNEL: u8 = 9;
pub const DEFAULT_PROGRAM: u8 = 0;
pub const DEFAULT_TRACK_NAME: &str = "my awesome piano";
pub const DEFAULT_TEMPO: f64 = 60.0;
pub const DEFAULT_BEAT_RESOLUTION: u16 = 86;
pub const MAX_MICROSECONDS_PER_BEAT: u32 = 0xFF_FFFF;
