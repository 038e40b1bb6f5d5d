use std::collections::{HashMap, VecDeque};

use tracing::{debug, warn};

use super::tempo::{DEFAULT_MICROS_PER_BEAT, TempoMap};
use crate::error::RenderError;
use crate::events::{EventKind, RawEvent};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NoteInterval {
    pub start_tick: u64,
    /// `None` while the note never received its note off.
    pub end_tick: Option<u64>,
    pub start_us: u64,
    pub end_us: Option<u64>,
    pub track: usize,
    pub pitch: u8,
    pub velocity: u8,
}

impl NoteInterval {
    pub fn is_sounding(&self, time_us: u64) -> bool {
        self.start_us <= time_us && self.end_us.is_none_or(|end| time_us < end)
    }

    pub fn has_ended(&self, time_us: u64) -> bool {
        self.end_us.is_some_and(|end| end <= time_us)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Limits {
    pub max_tracks: usize,
    pub max_notes: usize,
    pub max_tempo_events: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_tracks: 64,
            max_notes: 8192,
            max_tempo_events: 4096,
        }
    }
}

/// An event of the merged stream. `delta` is relative to the previous merged
/// event, whatever its track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedEvent<'a> {
    pub abs_tick: u64,
    pub delta: u64,
    pub track: usize,
    pub kind: &'a EventKind,
}

/// Merges all tracks into one stream ordered by absolute tick. Ties keep
/// track order, then event order. Trailing non-note events are dropped.
pub fn merge_tracks(tracks: &[Vec<RawEvent>]) -> Vec<MergedEvent<'_>> {
    let mut stream: Vec<(u64, &RawEvent)> = Vec::new();
    for track in tracks {
        let mut abs_tick: u64 = 0;
        for event in track {
            abs_tick = abs_tick.saturating_add(event.tick);
            stream.push((abs_tick, event));
        }
    }

    // stable: equal ticks stay in track, then event, order
    stream.sort_by_key(|(abs_tick, _)| *abs_tick);

    let mut previous = 0;
    let mut merged: Vec<MergedEvent> = stream
        .into_iter()
        .map(|(abs_tick, event)| {
            let delta = abs_tick - previous;
            previous = abs_tick;
            MergedEvent {
                abs_tick,
                delta,
                track: event.track,
                kind: &event.kind,
            }
        })
        .collect();

    while merged.last().is_some_and(|e| !e.kind.is_note()) {
        merged.pop();
    }
    merged
}

/// Elapsed real time, accumulated one delta at a time.
///
/// `scaled` is the exact sum of `delta_ticks * micros_per_beat`; it is only
/// divided by the resolution when read, so nothing drifts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TempoClock {
    pub micros_per_beat: u64,
    ticks_per_beat: u64,
    scaled: u128,
}

impl TempoClock {
    pub fn new(ticks_per_beat: u16) -> Self {
        Self {
            micros_per_beat: DEFAULT_MICROS_PER_BEAT,
            ticks_per_beat: ticks_per_beat.max(1) as u64,
            scaled: 0,
        }
    }

    pub fn advance(self, delta_ticks: u64) -> Self {
        Self {
            scaled: self.scaled + delta_ticks as u128 * self.micros_per_beat as u128,
            ..self
        }
    }

    pub fn with_tempo(self, micros_per_beat: u64) -> Self {
        Self {
            micros_per_beat,
            ..self
        }
    }

    pub fn micros(&self) -> u64 {
        (self.scaled / self.ticks_per_beat as u128) as u64
    }
}

/// Open note indices per `(track, pitch)`, closed first-open first-closed.
#[derive(Debug, Default)]
pub struct VoiceSlots {
    open: HashMap<(usize, u8), VecDeque<usize>>,
    count: usize,
}

impl VoiceSlots {
    pub fn open(&mut self, track: usize, pitch: u8, index: usize) {
        self.open.entry((track, pitch)).or_default().push_back(index);
        self.count += 1;
    }

    pub fn close(&mut self, track: usize, pitch: u8) -> Option<usize> {
        let index = self.open.get_mut(&(track, pitch))?.pop_front()?;
        self.count -= 1;
        Some(index)
    }

    pub fn open_count(&self) -> usize {
        self.count
    }
}

#[derive(Debug, Clone)]
pub struct Timeline {
    /// Ordered by start time, ties in the order the notes were opened.
    pub intervals: Vec<NoteInterval>,
    pub max_us: u64,
    pub tempo: TempoMap,
    pub dangling_note_offs: usize,
    pub unterminated: usize,
}

impl Timeline {
    /// Tempo and signature events count from every track, in merged order.
    pub fn build(
        tracks: &[Vec<RawEvent>],
        ticks_per_beat: u16,
        limits: &Limits,
    ) -> Result<Self, RenderError> {
        if tracks.len() > limits.max_tracks {
            return Err(RenderError::TrackCapacityExceeded {
                count: tracks.len(),
                limit: limits.max_tracks,
            });
        }

        let merged = merge_tracks(tracks);
        let tempo = TempoMap::build(
            merged.iter().map(|event| (event.abs_tick, event.kind)),
            ticks_per_beat,
            limits.max_tempo_events,
        )?;

        let mut slots = VoiceSlots::default();
        let mut clock = TempoClock::new(ticks_per_beat);
        let mut notes: Vec<Option<NoteInterval>> = Vec::new();
        let mut dangling_note_offs = 0;

        for event in &merged {
            clock = clock.advance(event.delta);

            match *event.kind {
                EventKind::Tempo { micros_per_beat } if micros_per_beat > 0 => {
                    clock = clock.with_tempo(micros_per_beat);
                }
                EventKind::NoteOn { pitch, velocity } if velocity > 0 => {
                    if slots.open_count() == limits.max_notes {
                        return Err(RenderError::NoteCapacityExceeded {
                            limit: limits.max_notes,
                            tick: event.abs_tick,
                        });
                    }
                    slots.open(event.track, pitch, notes.len());
                    notes.push(Some(NoteInterval {
                        start_tick: event.abs_tick,
                        end_tick: None,
                        start_us: clock.micros(),
                        end_us: None,
                        track: event.track,
                        pitch,
                        velocity,
                    }));
                }
                EventKind::NoteOn { pitch, .. } | EventKind::NoteOff { pitch } => {
                    let Some(index) = slots.close(event.track, pitch) else {
                        dangling_note_offs += 1;
                        warn!(
                            "{}",
                            RenderError::DanglingNoteOff {
                                track: event.track,
                                pitch,
                                tick: event.abs_tick,
                            }
                        );
                        continue;
                    };
                    let Some(note) = notes[index].as_mut() else {
                        continue;
                    };
                    if note.start_tick == event.abs_tick {
                        debug!(
                            "dropping zero-length note: track {}, pitch {}, tick {}",
                            event.track, pitch, event.abs_tick
                        );
                        notes[index] = None;
                    } else {
                        note.end_tick = Some(event.abs_tick);
                        note.end_us = Some(clock.micros());
                    }
                }
                _ => {}
            }
        }

        let intervals: Vec<NoteInterval> = notes.into_iter().flatten().collect();
        let unterminated = intervals.iter().filter(|n| n.end_us.is_none()).count();
        if unterminated > 0 {
            warn!("{} notes never received a note off", unterminated);
        }

        let max_us = intervals
            .iter()
            .map(|n| n.end_us.unwrap_or(n.start_us))
            .max()
            .unwrap_or(0);

        Ok(Self {
            intervals,
            max_us,
            tempo,
            dangling_note_offs,
            unterminated,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn on(track: usize, tick: u64, pitch: u8, velocity: u8) -> RawEvent {
        RawEvent::new(track, tick, EventKind::NoteOn { pitch, velocity })
    }

    fn off(track: usize, tick: u64, pitch: u8) -> RawEvent {
        RawEvent::new(track, tick, EventKind::NoteOff { pitch })
    }

    fn tempo(tick: u64, micros_per_beat: u64) -> RawEvent {
        RawEvent::new(0, tick, EventKind::Tempo { micros_per_beat })
    }

    #[test]
    fn merges_by_absolute_tick_with_stable_ties() {
        let tracks = vec![
            vec![tempo(0, 500_000), tempo(10, 400_000)],
            vec![on(1, 5, 60, 100), off(1, 5, 60)],
            vec![on(2, 10, 62, 100), off(2, 0, 62)],
        ];
        let merged = merge_tracks(&tracks);
        let order: Vec<(u64, u64, usize)> = merged
            .iter()
            .map(|e| (e.abs_tick, e.delta, e.track))
            .collect();
        assert_eq!(
            order,
            vec![
                (0, 0, 0),
                (5, 5, 1),
                (10, 5, 0),
                (10, 0, 1),
                (10, 0, 2),
                (10, 0, 2),
            ]
        );
    }

    #[test]
    fn drops_trailing_meta_events() {
        let tracks = vec![
            vec![tempo(0, 500_000), RawEvent::new(0, 5000, EventKind::EndOfTrack)],
            vec![on(1, 0, 60, 90), off(1, 480, 60), RawEvent::new(1, 0, EventKind::EndOfTrack)],
        ];
        let merged = merge_tracks(&tracks);
        assert_eq!(merged.last().map(|e| e.abs_tick), Some(480));
        assert!(merged.last().is_some_and(|e| e.kind.is_note()));
    }

    #[test]
    fn clock_folds_deltas() {
        let clock = TempoClock::new(480)
            .advance(480)
            .with_tempo(1_000_000)
            .advance(240);
        assert_eq!(clock.micros(), 500_000 + 500_000);
    }

    #[test]
    fn clock_does_not_drift() {
        // 1 tick at 3 µs/beat with 7 ticks per beat is not a whole microsecond
        let mut clock = TempoClock::new(7).with_tempo(3);
        for _ in 0..7_000 {
            clock = clock.advance(1);
        }
        assert_eq!(clock.micros(), 3_000);
    }

    #[test]
    fn matches_overlapping_notes_first_in_first_out() {
        let tracks = vec![
            vec![],
            vec![
                on(1, 0, 60, 10),
                on(1, 100, 60, 20),
                off(1, 100, 60),
                off(1, 100, 60),
            ],
        ];
        let timeline = Timeline::build(&tracks, 480, &Limits::default()).unwrap();
        assert_eq!(timeline.intervals.len(), 2);

        let first = &timeline.intervals[0];
        assert_eq!(first.velocity, 10);
        assert_eq!((first.start_tick, first.end_tick), (0, Some(200)));

        let second = &timeline.intervals[1];
        assert_eq!(second.velocity, 20);
        assert_eq!((second.start_tick, second.end_tick), (100, Some(300)));
    }

    #[test]
    fn velocity_zero_note_on_closes() {
        let tracks = vec![vec![], vec![on(1, 0, 64, 80), on(1, 480, 64, 0)]];
        let timeline = Timeline::build(&tracks, 480, &Limits::default()).unwrap();
        assert_eq!(timeline.intervals[0].end_us, Some(500_000));
        assert_eq!(timeline.max_us, 500_000);
    }

    #[test]
    fn dangling_note_off_is_recovered() {
        let tracks = vec![vec![], vec![off(1, 0, 61), on(1, 10, 61, 64), off(1, 10, 61)]];
        let timeline = Timeline::build(&tracks, 480, &Limits::default()).unwrap();
        assert_eq!(timeline.dangling_note_offs, 1);
        assert_eq!(timeline.intervals.len(), 1);
    }

    #[test]
    fn note_offs_only_match_their_own_track() {
        let tracks = vec![vec![], vec![on(1, 0, 60, 90)], vec![off(2, 10, 60)]];
        let timeline = Timeline::build(&tracks, 480, &Limits::default()).unwrap();
        assert_eq!(timeline.dangling_note_offs, 1);
        assert_eq!(timeline.unterminated, 1);
        assert_eq!(timeline.intervals[0].end_us, None);
    }

    #[test]
    fn closed_intervals_end_after_they_start() {
        let tracks = vec![
            vec![],
            vec![on(1, 0, 60, 90), off(1, 0, 60), on(1, 5, 60, 90), off(1, 3, 60)],
        ];
        let timeline = Timeline::build(&tracks, 480, &Limits::default()).unwrap();
        assert_eq!(timeline.intervals.len(), 1);
        for note in &timeline.intervals {
            if let Some(end) = note.end_tick {
                assert!(end > note.start_tick);
            }
        }
    }

    #[test]
    fn applies_tempo_changes_across_tracks() {
        let tracks = vec![
            vec![tempo(0, 500_000), tempo(480, 666_667)],
            vec![on(1, 0, 60, 90), off(1, 960, 60)],
        ];
        let timeline = Timeline::build(&tracks, 480, &Limits::default()).unwrap();
        let note = &timeline.intervals[0];
        assert_eq!(note.start_us, 0);
        assert_eq!(note.end_us, Some(1_166_667));
        assert_eq!(timeline.tempo.tick_to_micros(960), 1_166_667);
    }

    #[test]
    fn overlay_tempo_follows_tempo_events_outside_track_zero() {
        let tracks = vec![
            vec![RawEvent::new(0, 0, EventKind::EndOfTrack)],
            vec![
                RawEvent::new(1, 0, EventKind::Tempo { micros_per_beat: 1_000_000 }),
                on(1, 0, 60, 90),
                off(1, 480, 60),
            ],
        ];
        let timeline = Timeline::build(&tracks, 480, &Limits::default()).unwrap();
        assert_eq!(timeline.intervals[0].end_us, Some(1_000_000));
        assert_eq!(timeline.tempo.tick_to_micros(480), 1_000_000);
        assert_eq!(timeline.tempo.breakpoint_at_micros(500_000).bpm, 60.0);
    }

    #[test]
    fn fails_loudly_on_note_capacity() {
        let tracks = vec![vec![], vec![on(1, 0, 60, 90), on(1, 0, 61, 90), on(1, 0, 62, 90)]];
        let limits = Limits {
            max_notes: 2,
            ..Limits::default()
        };
        let err = Timeline::build(&tracks, 480, &limits).unwrap_err();
        assert!(matches!(err, RenderError::NoteCapacityExceeded { limit: 2, .. }));
    }

    #[test]
    fn capacity_counts_simultaneous_notes_only() {
        let tracks = vec![
            vec![],
            vec![on(1, 0, 60, 90), off(1, 10, 60), on(1, 0, 61, 90), off(1, 10, 61)],
        ];
        let limits = Limits {
            max_notes: 1,
            ..Limits::default()
        };
        let timeline = Timeline::build(&tracks, 480, &limits).unwrap();
        assert_eq!(timeline.intervals.len(), 2);
    }

    #[test]
    fn rejects_too_many_tracks() {
        let tracks = vec![vec![], vec![], vec![]];
        let limits = Limits {
            max_tracks: 2,
            ..Limits::default()
        };
        let err = Timeline::build(&tracks, 480, &limits).unwrap_err();
        assert!(matches!(err, RenderError::TrackCapacityExceeded { count: 3, limit: 2 }));
    }
}
