/// CMJ event segmentation.
///
/// Both historical conventions live behind [`SegmentationPolicy`]: the
/// baseline/threshold search and the flight-anchored search. Failed searches
/// inherit the previous boundary and are tagged [`BoundarySource::Fallback`] so
/// the metrics engine can report the dependent values as undefined.
use std::fmt;

use tracing::debug;

use crate::config::{AnalysisConfig, SegmentationPolicy};
use crate::flight_detector::{select_flight, FlightInterval};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundarySource {
    Detected,
    /// Search failed; index copied from the previous boundary.
    Fallback,
    Manual,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Boundary {
    pub index: usize,
    pub source: BoundarySource,
}

impl Boundary {
    pub fn detected(index: usize) -> Self {
        Boundary { index, source: BoundarySource::Detected }
    }

    pub fn fallback(index: usize) -> Self {
        Boundary { index, source: BoundarySource::Fallback }
    }

    pub fn manual(index: usize) -> Self {
        Boundary { index, source: BoundarySource::Manual }
    }

    pub fn is_defined(&self) -> bool {
        self.source != BoundarySource::Fallback
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundaryKind {
    OnsetEccentric,
    OnsetConcentric,
    Takeoff,
    Landing,
}

impl fmt::Display for BoundaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BoundaryKind::OnsetEccentric => "eccentric onset",
            BoundaryKind::OnsetConcentric => "concentric onset",
            BoundaryKind::Takeoff => "take-off",
            BoundaryKind::Landing => "landing",
        };
        f.write_str(name)
    }
}

/// Boundaries a user may place by hand.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverrideTarget {
    OnsetEccentric,
    OnsetConcentric,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PhaseBoundaries {
    pub onset_eccentric: Boundary,
    pub onset_concentric: Boundary,
    pub takeoff: Boundary,
    pub landing: Boundary,
    pub policy: SegmentationPolicy,
    /// The flight interval the boundaries were anchored to, if any.
    pub flight: Option<FlightInterval>,
}

impl PhaseBoundaries {
    pub fn get(&self, kind: BoundaryKind) -> Boundary {
        match kind {
            BoundaryKind::OnsetEccentric => self.onset_eccentric,
            BoundaryKind::OnsetConcentric => self.onset_concentric,
            BoundaryKind::Takeoff => self.takeoff,
            BoundaryKind::Landing => self.landing,
        }
    }

    /// Substitute one boundary, leaving every other one as it was.
    pub fn with_override(&self, target: OverrideTarget, index: usize) -> PhaseBoundaries {
        let mut next = self.clone();
        match target {
            OverrideTarget::OnsetEccentric => next.onset_eccentric = Boundary::manual(index),
            OverrideTarget::OnsetConcentric => next.onset_concentric = Boundary::manual(index),
        }
        next
    }

    /// Adjacent pairs that are out of order. Empty for auto-detected sets.
    pub fn ordering_violations(&self) -> Vec<(BoundaryKind, BoundaryKind)> {
        use BoundaryKind::*;
        [
            (OnsetEccentric, OnsetConcentric),
            (OnsetConcentric, Takeoff),
            (Takeoff, Landing),
        ]
        .into_iter()
        .filter(|&(a, b)| self.get(a).index > self.get(b).index)
        .collect()
    }
}

/// Maps a time coordinate (seconds) to a sample index.
pub trait OverrideResolver {
    fn resolve_override(&self, query_time: f64) -> usize;
}

/// Default resolver: the sample closest in time, earliest on ties.
pub struct NearestSample<'a> {
    time_s: &'a [f64],
}

impl<'a> NearestSample<'a> {
    pub fn new(time_s: &'a [f64]) -> Self {
        NearestSample { time_s }
    }
}

impl OverrideResolver for NearestSample<'_> {
    fn resolve_override(&self, query_time: f64) -> usize {
        nearest_sample_index(self.time_s, query_time).unwrap_or(0)
    }
}

pub fn nearest_sample_index(time_s: &[f64], query_time: f64) -> Option<usize> {
    time_s
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &t)| {
            let distance = (t - query_time).abs();
            match best {
                Some((_, d)) if d <= distance => best,
                _ => Some((i, distance)),
            }
        })
        .map(|(i, _)| i)
}

/// `flights` are all confirmed intervals. The flight-anchored policy uses the
/// one picked by `config.flight_selection`; the baseline/threshold policy
/// lands at the end of whichever interval contains its take-off.
pub fn segment(
    force_filt: &[f64],
    flights: &[FlightInterval],
    config: &AnalysisConfig,
) -> PhaseBoundaries {
    match config.segmentation_policy {
        SegmentationPolicy::BaselineThreshold => segment_baseline_threshold(force_filt, flights, config),
        SegmentationPolicy::FlightAnchored => {
            segment_flight_anchored(force_filt, select_flight(flights, config.flight_selection), config)
        }
    }
}

fn first_index_where(
    force_filt: &[f64],
    range: std::ops::Range<usize>,
    predicate: impl Fn(f64) -> bool,
) -> Option<usize> {
    let end = range.end.min(force_filt.len());
    (range.start..end).find(|&i| predicate(force_filt[i]))
}

/// Search `onset_eccentric` then `onset_concentric` in `[0, limit)`.
fn find_onsets(force_filt: &[f64], limit: usize, baseline: f64, delta: f64) -> (Boundary, Boundary) {
    let eccentric = match first_index_where(force_filt, 0..limit, |f| f < baseline - delta) {
        Some(i) => Boundary::detected(i),
        None => {
            debug!("no sample below baseline - delta; eccentric onset falls back to 0");
            Boundary::fallback(0)
        }
    };

    let concentric = match first_index_where(force_filt, eccentric.index + 1..limit, |f| f > baseline + delta) {
        Some(i) => Boundary::detected(i),
        None => {
            debug!("no sample above baseline + delta after eccentric onset");
            Boundary::fallback(eccentric.index)
        }
    };

    (eccentric, concentric)
}

fn segment_baseline_threshold(
    force_filt: &[f64],
    flights: &[FlightInterval],
    config: &AnalysisConfig,
) -> PhaseBoundaries {
    let baseline = config.effective_baseline();
    let (onset_eccentric, onset_concentric) =
        find_onsets(force_filt, force_filt.len(), baseline, config.baseline_delta);

    let takeoff = match first_index_where(
        force_filt,
        onset_concentric.index + 1..force_filt.len(),
        |f| f < config.flight_threshold,
    ) {
        Some(i) => Boundary::detected(i),
        None => {
            debug!("force never drops below flight threshold after concentric onset");
            Boundary::fallback(onset_concentric.index)
        }
    };

    let flight = flights
        .iter()
        .find(|f| takeoff.is_defined() && f.start_index <= takeoff.index && takeoff.index <= f.end_index)
        .copied();
    let landing = match flight {
        Some(f) => Boundary::detected(f.end_index),
        None => {
            debug!("take-off is not inside a confirmed flight interval");
            Boundary::fallback(takeoff.index)
        }
    };

    PhaseBoundaries {
        onset_eccentric,
        onset_concentric,
        takeoff,
        landing,
        policy: SegmentationPolicy::BaselineThreshold,
        flight,
    }
}

fn segment_flight_anchored(
    force_filt: &[f64],
    flight: Option<FlightInterval>,
    config: &AnalysisConfig,
) -> PhaseBoundaries {
    let Some(f) = flight else {
        debug!("no flight interval; flight-anchored boundaries undefined");
        return PhaseBoundaries {
            onset_eccentric: Boundary::fallback(0),
            onset_concentric: Boundary::fallback(0),
            takeoff: Boundary::fallback(0),
            landing: Boundary::fallback(0),
            policy: SegmentationPolicy::FlightAnchored,
            flight: None,
        };
    };

    let (onset_eccentric, onset_concentric) = find_onsets(
        force_filt,
        f.start_index,
        config.effective_baseline(),
        config.baseline_delta,
    );

    PhaseBoundaries {
        onset_eccentric,
        onset_concentric,
        takeoff: Boundary::detected(f.start_index),
        landing: Boundary::detected(f.end_index),
        policy: SegmentationPolicy::FlightAnchored,
        flight: Some(f),
    }
}
