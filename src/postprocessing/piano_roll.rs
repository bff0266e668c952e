use ndarray::{Array2, ArrayView2, Axis};

use crate::config::ExportConfig;
use crate::constants::{MAX_MICROSECONDS_PER_BEAT, MAX_VELOCITY, N_PITCHES};
use crate::error::{Result, TranscribeError};

/// A note found in a piano roll, in time steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PianoRollNote {
    pub pitch: u8,
    pub start_step: u32,
    /// One past the last active step.
    pub end_step: u32,
    pub velocity: u8,
}

/// One instrument's piano roll, `(time, 128)` velocities in `0..=127`.
#[derive(Debug, Clone, PartialEq)]
pub struct Track {
    pub pianoroll: Array2<u8>,
    pub program: u8,
    pub is_drum: bool,
    pub name: String,
}

/// Scale activations in `[0, 1]` to velocities: `round(x * 127)`, clipped to `0..=127`.
pub fn to_velocities(prediction: ArrayView2<f32>) -> Array2<u8> {
    prediction.mapv(|v| {
        let velocity = (v * MAX_VELOCITY).round();
        if velocity.is_nan() {
            0
        } else {
            velocity.clamp(0.0, MAX_VELOCITY) as u8
        }
    })
}

impl Track {
    pub fn new(pianoroll: Array2<u8>, program: u8, is_drum: bool, name: impl Into<String>) -> Result<Self> {
        if pianoroll.ncols() != N_PITCHES {
            return Err(TranscribeError::PitchDimension {
                expected: N_PITCHES,
                got: pianoroll.ncols(),
            });
        }

        Ok(Self {
            pianoroll,
            program,
            is_drum,
            name: name.into(),
        })
    }

    /// Build a track from model predictions, scaled by 127.
    pub fn from_prediction(prediction: ArrayView2<f32>, export: &ExportConfig) -> Result<Self> {
        Self::new(to_velocities(prediction), export.program, export.is_drum, export.name.clone())
    }

    pub fn n_steps(&self) -> usize {
        self.pianoroll.nrows()
    }

    /// Every maximal run of non-zero velocity at one pitch becomes a note.
    ///
    /// The note velocity is the mean velocity over the run, truncated. Notes are
    /// ordered by pitch, then by start.
    pub fn notes(&self) -> Vec<PianoRollNote> {
        let mut notes = vec![];

        for (pitch, column) in self.pianoroll.axis_iter(Axis(1)).enumerate() {
            let mut run_start: Option<usize> = None;
            let mut run_sum: u64 = 0;

            for (step, &velocity) in column.iter().chain(std::iter::once(&0)).enumerate() {
                match (velocity > 0, run_start) {
                    (true, None) => {
                        run_start = Some(step);
                        run_sum = velocity as u64;
                    }
                    (true, Some(_)) => run_sum += velocity as u64,
                    (false, Some(start)) => {
                        let length = (step - start) as u64;
                        notes.push(PianoRollNote {
                            pitch: pitch as u8,
                            start_step: start as u32,
                            end_step: step as u32,
                            velocity: (run_sum / length) as u8,
                        });
                        run_start = None;
                    }
                    (false, None) => {}
                }
            }
        }

        notes
    }
}

/// Tracks sharing one tempo and time grid.
#[derive(Debug, Clone, PartialEq)]
pub struct Multitrack {
    pub tracks: Vec<Track>,
    /// Beats per minute.
    pub tempo: f64,
    /// Time steps per beat.
    pub beat_resolution: u16,
}

impl Multitrack {
    pub fn new(tracks: Vec<Track>, tempo: f64, beat_resolution: u16) -> Result<Self> {
        tempo_to_microseconds(tempo)?;
        if beat_resolution == 0 || beat_resolution > 0x7FFF {
            return Err(TranscribeError::InvalidParameter(format!(
                "beat resolution must be in 1..=32767, got {beat_resolution}"
            )));
        }

        Ok(Self { tracks, tempo, beat_resolution })
    }

    /// Single-track multitrack with the tempo and resolution from `export`.
    pub fn from_prediction(prediction: ArrayView2<f32>, export: &ExportConfig) -> Result<Self> {
        let track = Track::from_prediction(prediction, export)?;
        Self::new(vec![track], export.tempo, export.beat_resolution)
    }

    pub fn microseconds_per_beat(&self) -> Result<u32> {
        tempo_to_microseconds(self.tempo)
    }
}

/// Microseconds per beat for a tempo in BPM. The MIDI tempo event stores this in 24 bits.
fn tempo_to_microseconds(tempo: f64) -> Result<u32> {
    if !(tempo.is_finite() && tempo > 0.0) {
        return Err(TranscribeError::InvalidParameter(format!("tempo must be positive, got {tempo}")));
    }

    let microseconds_per_beat = (60_000_000.0 / tempo).round();
    if !(1.0..=MAX_MICROSECONDS_PER_BEAT as f64).contains(&microseconds_per_beat) {
        return Err(TranscribeError::InvalidParameter(format!(
            "tempo {tempo} bpm is {microseconds_per_beat} us per beat, outside 1..={MAX_MICROSECONDS_PER_BEAT}"
        )));
    }

    Ok(microseconds_per_beat as u32)
}

#[cfg(test)]
mod tests {
    use ndarray::array;

    use super::*;

    fn roll_with(steps: usize, cells: &[(usize, usize, u8)]) -> Array2<u8> {
        let mut roll = Array2::zeros((steps, N_PITCHES));
        for &(step, pitch, velocity) in cells {
            roll[[step, pitch]] = velocity;
        }
        roll
    }

    #[test]
    fn velocities_are_rounded_and_clipped() {
        let prediction = array![[0.0f32, 0.5, 1.0, 1.5], [-0.2, 0.004, 0.996, f32::NAN]];
        let velocities = to_velocities(prediction.view());
        assert_eq!(velocities, array![[0u8, 64, 127, 127], [0, 1, 126, 0]]);
    }

    #[test]
    fn track_requires_128_pitches() {
        let result = Track::new(Array2::zeros((4, 88)), 0, false, "piano");
        assert!(matches!(result, Err(TranscribeError::PitchDimension { expected: 128, got: 88 })));
    }

    #[test]
    fn runs_become_notes_with_mean_velocity() {
        let roll = roll_with(6, &[(0, 60, 100), (1, 60, 50), (3, 60, 20), (5, 64, 127)]);
        let track = Track::new(roll, 0, false, "piano").unwrap();

        assert_eq!(
            track.notes(),
            vec![
                PianoRollNote { pitch: 60, start_step: 0, end_step: 2, velocity: 75 },
                PianoRollNote { pitch: 60, start_step: 3, end_step: 4, velocity: 20 },
                PianoRollNote { pitch: 64, start_step: 5, end_step: 6, velocity: 127 },
            ]
        );
    }

    #[test]
    fn mean_velocity_truncates() {
        let roll = roll_with(2, &[(0, 10, 1), (1, 10, 2)]);
        let track = Track::new(roll, 0, false, "piano").unwrap();
        assert_eq!(track.notes()[0].velocity, 1);
    }

    #[test]
    fn multitrack_from_prediction_uses_export_metadata() {
        let prediction = Array2::from_elem((3, N_PITCHES), 0.5f32);
        let multitrack = Multitrack::from_prediction(prediction.view(), &ExportConfig::default()).unwrap();

        assert_eq!(multitrack.tempo, 60.0);
        assert_eq!(multitrack.beat_resolution, 86);
        assert_eq!(multitrack.microseconds_per_beat().unwrap(), 1_000_000);

        let track = &multitrack.tracks[0];
        assert_eq!(track.name, "my awesome piano");
        assert_eq!(track.program, 0);
        assert!(!track.is_drum);
        assert_eq!(track.n_steps(), 3);
        assert!(track.pianoroll.iter().all(|v| *v == 64));
    }

    #[test]
    fn multitrack_rejects_bad_timing() {
        assert!(Multitrack::new(vec![], 0.0, 86).is_err());
        assert!(Multitrack::new(vec![], 2.0, 86).is_err());
        assert!(Multitrack::new(vec![], 1e9, 86).is_err());
        assert_eq!(Multitrack::new(vec![], 4.0, 86).unwrap().microseconds_per_beat().unwrap(), 15_000_000);
        assert!(Multitrack::new(vec![], 60.0, 0).is_err());
    }
}
