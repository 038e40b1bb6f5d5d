use crate::error::RenderError;
use crate::events::{EventKind, key_name};

/// 120 BPM, used until the file says otherwise.
pub const DEFAULT_MICROS_PER_BEAT: u64 = 500_000;

pub fn bpm(micros_per_beat: u64) -> f64 {
    60_000_000.0 / micros_per_beat as f64
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TempoBreakpoint {
    pub abs_tick: u64,
    pub micros_per_beat: u64,
    pub bpm: f64,
    /// Real time at which this tempo takes effect.
    pub time_us: u64,
}

#[derive(Debug, Clone)]
pub struct TempoMap {
    ticks_per_beat: u64,
    breakpoints: Vec<TempoBreakpoint>,
    /// Exact `ticks * micros_per_beat` sum at each breakpoint.
    scaled_offsets: Vec<u128>,
    key_signature: Option<String>,
    time_signature: Option<String>,
}

impl TempoMap {
    /// Builds the map from `(abs_tick, kind)` pairs in tick order, such as
    /// the merged stream of every track.
    pub fn build<'a>(
        events: impl IntoIterator<Item = (u64, &'a EventKind)>,
        ticks_per_beat: u16,
        max_tempo_events: usize,
    ) -> Result<Self, RenderError> {
        let mut points = Vec::new();
        let mut key_signature = None;
        let mut time_signature = None;

        for (tick, kind) in events {
            match *kind {
                EventKind::Tempo { micros_per_beat } => {
                    if points.len() == max_tempo_events {
                        return Err(RenderError::TempoCapacityExceeded {
                            limit: max_tempo_events,
                        });
                    }
                    points.push((tick, micros_per_beat));
                }
                EventKind::KeySignature { sharps, minor } => {
                    key_signature = Some(key_name(sharps, minor));
                }
                EventKind::TimeSignature {
                    numerator,
                    denominator,
                } => {
                    time_signature = Some(format!("{}/{}", numerator, denominator));
                }
                _ => {}
            }
        }

        let mut map = Self::from_breakpoints(&points, ticks_per_beat)?;
        map.key_signature = key_signature;
        map.time_signature = time_signature;
        Ok(map)
    }

    /// Builds the map from `(abs_tick, micros_per_beat)` pairs, which must be
    /// in non-decreasing tick order.
    pub fn from_breakpoints(
        points: &[(u64, u64)],
        ticks_per_beat: u16,
    ) -> Result<Self, RenderError> {
        if ticks_per_beat == 0 {
            return Err(RenderError::InvalidTempo {
                reason: "zero ticks per beat".into(),
            });
        }

        let mut raw: Vec<(u64, u64)> = vec![(0, DEFAULT_MICROS_PER_BEAT)];
        for &(tick, micros_per_beat) in points {
            if micros_per_beat == 0 {
                return Err(RenderError::InvalidTempo {
                    reason: format!("zero tempo at tick {}", tick),
                });
            }
            // raw is never empty
            let last = raw.len() - 1;
            let previous = raw[last].0;
            if tick < previous {
                return Err(RenderError::MalformedTempoMap { tick, previous });
            }
            if tick == previous {
                raw[last].1 = micros_per_beat;
            } else {
                raw.push((tick, micros_per_beat));
            }
        }

        let ticks_per_beat = ticks_per_beat as u64;
        let mut breakpoints = Vec::with_capacity(raw.len());
        let mut scaled_offsets = Vec::with_capacity(raw.len());
        let mut scaled: u128 = 0;
        let mut prev: Option<(u64, u64)> = None;

        for (tick, micros_per_beat) in raw {
            if let Some((prev_tick, prev_tempo)) = prev {
                scaled += (tick - prev_tick) as u128 * prev_tempo as u128;
            }
            breakpoints.push(TempoBreakpoint {
                abs_tick: tick,
                micros_per_beat,
                bpm: bpm(micros_per_beat),
                time_us: (scaled / ticks_per_beat as u128) as u64,
            });
            scaled_offsets.push(scaled);
            prev = Some((tick, micros_per_beat));
        }

        Ok(Self {
            ticks_per_beat,
            breakpoints,
            scaled_offsets,
            key_signature: None,
            time_signature: None,
        })
    }

    pub fn breakpoints(&self) -> &[TempoBreakpoint] {
        &self.breakpoints
    }

    pub fn key_signature(&self) -> Option<&str> {
        self.key_signature.as_deref()
    }

    pub fn time_signature(&self) -> Option<&str> {
        self.time_signature.as_deref()
    }

    fn index_at_tick(&self, tick: u64) -> usize {
        // breakpoints[0] sits at tick 0, so the partition point is >= 1
        self.breakpoints.partition_point(|b| b.abs_tick <= tick) - 1
    }

    pub fn breakpoint_at_tick(&self, tick: u64) -> &TempoBreakpoint {
        &self.breakpoints[self.index_at_tick(tick)]
    }

    pub fn breakpoint_at_micros(&self, time_us: u64) -> &TempoBreakpoint {
        let idx = self.breakpoints.partition_point(|b| b.time_us <= time_us) - 1;
        &self.breakpoints[idx]
    }

    /// Piecewise tempo integration from tick 0.
    pub fn tick_to_micros(&self, tick: u64) -> u64 {
        let idx = self.index_at_tick(tick);
        let bp = &self.breakpoints[idx];
        let scaled =
            self.scaled_offsets[idx] + (tick - bp.abs_tick) as u128 * bp.micros_per_beat as u128;
        (scaled / self.ticks_per_beat as u128) as u64
    }
}

/// Forward-only position in a tempo map, for callers that walk time in order.
#[derive(Debug, Clone, Copy, Default)]
pub struct TempoCursor {
    idx: usize,
}

impl TempoCursor {
    pub fn advance<'a>(&mut self, map: &'a TempoMap, time_us: u64) -> &'a TempoBreakpoint {
        let breakpoints = map.breakpoints();
        while self.idx + 1 < breakpoints.len() && breakpoints[self.idx + 1].time_us <= time_us {
            self.idx += 1;
        }
        &breakpoints[self.idx]
    }

    pub fn reset(&mut self) {
        self.idx = 0;
    }
}
