/// Airborne phase detection on the smoothed total force.
///
/// A run of samples below the flight threshold is only committed as a flight
/// once it has closed and its duration is known, so short unweighting dips
/// never become jumps.
use crate::config::FlightSelection;

/// Absorbs `0.3 - 0.1 < 0.2` style rounding when comparing durations.
const DURATION_TOLERANCE_S: f64 = 1e-9;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FlightInterval {
    pub start_index: usize,
    /// Last airborne sample, inclusive.
    pub end_index: usize,
    pub duration_s: f64,
    /// Lowest smoothed force inside the interval.
    pub min_force: f64,
}

pub fn detect_flight_intervals(
    force_filt: &[f64],
    time_s: &[f64],
    flight_threshold: f64,
    min_duration: f64,
) -> Vec<FlightInterval> {
    let len = force_filt.len().min(time_s.len());
    let mut intervals = Vec::new();
    let mut current_start: Option<usize> = None;

    for i in 0..len {
        let is_below = force_filt[i] < flight_threshold;

        match (current_start, is_below) {
            (None, true) => current_start = Some(i),
            (Some(start), false) => {
                if let Some(interval) = confirm_run(start, i - 1, force_filt, time_s, min_duration) {
                    intervals.push(interval);
                }
                current_start = None;
            }
            _ => {}
        }
    }

    if let Some(start) = current_start {
        if let Some(interval) = confirm_run(start, len - 1, force_filt, time_s, min_duration) {
            intervals.push(interval);
        }
    }

    intervals
}

fn confirm_run(
    start: usize,
    end: usize,
    force_filt: &[f64],
    time_s: &[f64],
    min_duration: f64,
) -> Option<FlightInterval> {
    let duration_s = time_s[end] - time_s[start];
    if duration_s + DURATION_TOLERANCE_S < min_duration {
        return None;
    }

    let min_force = force_filt[start..=end]
        .iter()
        .copied()
        .fold(f64::INFINITY, f64::min);

    Some(FlightInterval {
        start_index: start,
        end_index: end,
        duration_s,
        min_force,
    })
}

/// Per-sample airborne flag for plotting and trace export.
pub fn airborne_mask(len: usize, intervals: &[FlightInterval]) -> Vec<bool> {
    let mut mask = vec![false; len];
    for interval in intervals {
        let end = interval.end_index.min(len.saturating_sub(1));
        for flag in mask.iter_mut().take(end + 1).skip(interval.start_index) {
            *flag = true;
        }
    }
    mask
}

pub fn select_flight(
    intervals: &[FlightInterval],
    selection: FlightSelection,
) -> Option<FlightInterval> {
    match selection {
        FlightSelection::First => intervals.first().copied(),
        FlightSelection::GlobalMinimum => intervals
            .iter()
            .copied()
            .fold(None, |best: Option<FlightInterval>, candidate| match best {
                Some(b) if b.min_force <= candidate.min_force => Some(b),
                _ => Some(candidate),
            }),
    }
}
