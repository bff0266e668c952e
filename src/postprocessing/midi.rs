use midly::num::{u4, u7};
use midly::Format;
use midly::Header;
use midly::MetaMessage;
use midly::MidiMessage;
use midly::Smf;
use midly::Timing;
use midly::Track as MidiTrack;
use midly::TrackEvent;
use midly::TrackEventKind;

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use ndarray::ArrayView2;

use crate::config::ExportConfig;
use crate::constants::DRUM_CHANNEL;
use crate::error::Result;

use super::piano_roll::{Multitrack, Track};

#[derive(Debug, Clone)]
struct TrackEventAbsolute<'a> {
    tick: u32,
    kind: TrackEventKind<'a>,
}

/// Turn a piano-roll track into delta-timed MIDI events, one tick per time step.
pub fn generate_ordered_midi_events(track: &Track) -> Vec<TrackEvent<'_>> {
    let channel: u4 = if track.is_drum { DRUM_CHANNEL.into() } else { 0.into() };

    let mut track_events_absolute: Vec<TrackEventAbsolute> = vec![];
    for note in track.notes() {
        track_events_absolute.push(TrackEventAbsolute {
            tick: note.start_step,
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOn {
                    key: u7::new(note.pitch),
                    vel: u7::new(note.velocity),
                },
            },
        });

        track_events_absolute.push(TrackEventAbsolute {
            tick: note.end_step,
            kind: TrackEventKind::Midi {
                channel,
                message: MidiMessage::NoteOff {
                    key: u7::new(note.pitch),
                    vel: u7::new(0),
                },
            },
        });
    }

    // Stable sort, and note-offs before note-ons on the same tick so re-struck keys aren't cut short
    track_events_absolute.sort_by_key(|event| {
        let is_note_on = matches!(event.kind, TrackEventKind::Midi { message: MidiMessage::NoteOn { .. }, .. });
        (event.tick, is_note_on)
    });

    let mut track_events = vec![];
    let mut previous_tick = 0;
    for track_event_absolute in track_events_absolute {
        track_events.push(TrackEvent {
            delta: (track_event_absolute.tick - previous_tick).into(),
            kind: track_event_absolute.kind,
        });
        previous_tick = track_event_absolute.tick;
    }

    track_events
}

fn build_track<'a>(track: &'a Track, tempo: Option<u32>) -> MidiTrack<'a> {
    let channel: u4 = if track.is_drum { DRUM_CHANNEL.into() } else { 0.into() };
    let mut midi_track = MidiTrack::new();

    if let Some(microseconds_per_beat) = tempo {
        midi_track.push(TrackEvent {
            delta: 0.into(),
            kind: TrackEventKind::Meta(MetaMessage::Tempo(microseconds_per_beat.into())),
        });
    }
    midi_track.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::TrackName(track.name.as_bytes())),
    });
    midi_track.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Midi {
            channel,
            message: MidiMessage::ProgramChange { program: u7::new(track.program.min(127)) },
        },
    });

    midi_track.extend(generate_ordered_midi_events(track));

    midi_track.push(TrackEvent {
        delta: 0.into(),
        kind: TrackEventKind::Meta(MetaMessage::EndOfTrack),
    });

    midi_track
}

impl Multitrack {
    /// Serialize to Standard MIDI File bytes.
    ///
    /// Timing is metrical with `beat_resolution` ticks per beat, so a piano-roll
    /// step is one tick. The tempo is written to the first track.
    pub fn to_midi_bytes(&self) -> Result<Vec<u8>> {
        let format = if self.tracks.len() > 1 { Format::Parallel } else { Format::SingleTrack };
        let mut smf = Smf::new(Header {
            format,
            timing: Timing::Metrical(self.beat_resolution.into()),
        });

        let microseconds_per_beat = self.microseconds_per_beat()?;
        for (i, track) in self.tracks.iter().enumerate() {
            let tempo = if i == 0 { Some(microseconds_per_beat) } else { None };
            smf.tracks.push(build_track(track, tempo));
        }

        let mut buffer = Vec::new();
        smf.write_std(&mut buffer)?;

        Ok(buffer)
    }

    pub fn write<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let buffer = self.to_midi_bytes()?;
        let mut writer = BufWriter::new(File::create(path)?);
        writer.write_all(&buffer)?;
        writer.flush()?;
        Ok(())
    }
}

/// Piano-roll MIDI bytes for a prediction matrix, without touching the filesystem.
pub fn write_midi(prediction: ArrayView2<f32>, export: &ExportConfig) -> Result<Vec<u8>> {
    Multitrack::from_prediction(prediction, export)?.to_midi_bytes()
}

/// Export model predictions as a piano-roll MIDI file.
///
/// # Arguments
///
/// * `prediction` - `(time, 128)` activations in `[0, 1]`.
/// * `path` - Destination file.
/// * `export` - Track metadata, tempo and beat resolution.
pub fn export_midi<P: AsRef<Path>>(prediction: ArrayView2<f32>, path: P, export: &ExportConfig) -> Result<()> {
    let multitrack = Multitrack::from_prediction(prediction, export)?;
    multitrack.write(path)?;
    log::info!(
        "exported {} steps at {} bpm, {} steps per beat",
        prediction.nrows(),
        multitrack.tempo,
        multitrack.beat_resolution
    );
    Ok(())
}
