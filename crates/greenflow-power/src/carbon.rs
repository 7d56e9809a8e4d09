//! Carbon intensity traces.
//!
//! A trace is a sorted list of non-overlapping fragments, each holding one
//! intensity value over a half-open `[start, end)` window. Gaps between
//! fragments are allowed; no intensity is defined inside a gap.

use greenflow_core::clock::Millis;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CarbonTraceError {
    #[error("fragment {index} has an empty window [{start}, {end})")]
    EmptyWindow {
        index: usize,
        start: Millis,
        end: Millis,
    },
    #[error("fragment {index} overlaps the previous fragment")]
    Overlap { index: usize },
    #[error("fragment {index} has invalid intensity {intensity}")]
    InvalidIntensity { index: usize, intensity: f64 },
    #[error("fragment {index} ends past the last representable millisecond")]
    TimeOverflow { index: usize },
}

/// One intensity value (gCO2/kWh) valid over `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CarbonFragment {
    pub start: Millis,
    pub end: Millis,
    pub intensity: f64,
}

/// Parameters of a sinusoidal trace: `periods` full waves between `valley`
/// and `hill` over `points` fixed-width fragments.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sinusoid {
    pub start: Millis,
    pub interval: Millis,
    pub points: usize,
    pub periods: f64,
    pub hill: f64,
    pub valley: f64,
}

impl Default for Sinusoid {
    fn default() -> Self {
        Self {
            start: 0,
            interval: 15 * 60 * 1_000,
            points: 4 * 24 * 30,
            periods: 12.0,
            hill: 150.0,
            valley: 50.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<CarbonFragment>", into = "Vec<CarbonFragment>")]
pub struct CarbonTrace {
    fragments: Vec<CarbonFragment>,
}

impl CarbonTrace {
    /// Build a trace, sorting fragments by start time.
    pub fn new(mut fragments: Vec<CarbonFragment>) -> Result<Self, CarbonTraceError> {
        fragments.sort_by_key(|f| f.start);
        for (index, f) in fragments.iter().enumerate() {
            if f.start >= f.end {
                return Err(CarbonTraceError::EmptyWindow {
                    index,
                    start: f.start,
                    end: f.end,
                });
            }
            if !(f.intensity.is_finite() && f.intensity >= 0.0) {
                return Err(CarbonTraceError::InvalidIntensity {
                    index,
                    intensity: f.intensity,
                });
            }
            if index > 0 && fragments[index - 1].end > f.start {
                return Err(CarbonTraceError::Overlap { index });
            }
        }
        Ok(Self { fragments })
    }

    /// A trace holding one intensity forever.
    pub fn constant(intensity: f64) -> Result<Self, CarbonTraceError> {
        Self::new(vec![CarbonFragment {
            start: 0,
            end: Millis::MAX,
            intensity,
        }])
    }

    /// Generate a smooth wave: sample `points` values of
    /// `(hill - valley) / 2 * sin(x) + (hill + valley) / 2` with `x` spread
    /// evenly over `[0, 2π·periods]`.
    pub fn sinusoidal(params: Sinusoid) -> Result<Self, CarbonTraceError> {
        let amplitude = (params.hill - params.valley) / 2.0;
        let midline = (params.hill + params.valley) / 2.0;
        let span = 2.0 * std::f64::consts::PI * params.periods;
        let steps = params.points.saturating_sub(1).max(1) as f64;

        let fragments = (0..params.points)
            .map(|index| {
                let x = span * index as f64 / steps;
                let start = (index as Millis)
                    .checked_mul(params.interval)
                    .and_then(|offset| params.start.checked_add(offset));
                let end = start.and_then(|start| start.checked_add(params.interval));
                match (start, end) {
                    (Some(start), Some(end)) => Ok(CarbonFragment {
                        start,
                        end,
                        intensity: (amplitude * x.sin() + midline).max(0.0),
                    }),
                    _ => Err(CarbonTraceError::TimeOverflow { index }),
                }
            })
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(fragments)
    }

    pub fn fragments(&self) -> &[CarbonFragment] {
        &self.fragments
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }

    /// Start of the first fragment.
    pub fn start(&self) -> Option<Millis> {
        self.fragments.first().map(|f| f.start)
    }

    /// End of the last fragment.
    pub fn end(&self) -> Option<Millis> {
        self.fragments.last().map(|f| f.end)
    }

    /// Intensity valid at `t`, if a fragment covers it.
    pub fn intensity_at(&self, t: Millis) -> Option<f64> {
        let idx = self.fragments.partition_point(|f| f.start <= t);
        let fragment = self.fragments.get(idx.checked_sub(1)?)?;
        (t < fragment.end).then_some(fragment.intensity)
    }

    /// The first fragment boundary strictly after `t`.
    pub fn next_change_after(&self, t: Millis) -> Option<Millis> {
        let idx = self.fragments.partition_point(|f| f.start <= t);
        let current_end = idx
            .checked_sub(1)
            .and_then(|i| self.fragments.get(i))
            .map(|f| f.end)
            .filter(|&end| end > t);
        let next_start = self.fragments.get(idx).map(|f| f.start);
        let next = match (current_end, next_start) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        };
        next.filter(|&at| at != Millis::MAX)
    }
}

impl TryFrom<Vec<CarbonFragment>> for CarbonTrace {
    type Error = CarbonTraceError;

    fn try_from(fragments: Vec<CarbonFragment>) -> Result<Self, Self::Error> {
        Self::new(fragments)
    }
}

impl From<CarbonTrace> for Vec<CarbonFragment> {
    fn from(trace: CarbonTrace) -> Self {
        trace.fragments
    }
}
