/// CMJ performance metrics from a segmented force trace.
///
/// Every function here is pure. A metric whose input window is missing (an
/// undetected boundary, a reversed manual window) comes out as `NaN` so the
/// export layer can render it as undefined; nothing in here panics or errors.
use std::sync::Arc;

use crate::config::{SegmentationPolicy, GRAVITY};
use crate::force_plate_reader::CorrectedSample;
use crate::phase_segmenter::PhaseBoundaries;

/// Guards the asymmetry denominator when both plates read zero.
const ASYMMETRY_EPSILON: f64 = 1e-6;
/// Total force at or below which the subject is treated as off the plates.
pub const IN_CONTACT_FORCE: f64 = 3.0;

#[derive(Debug, Clone)]
pub struct CmjMetrics {
    /// Eccentric onset to concentric onset, s
    pub tempo_eccentrico: f64,
    /// Concentric onset to take-off, s
    pub tempo_spinta: f64,
    /// Take-off to landing, s
    pub tempo_volo: f64,
    pub fmax: f64,
    pub fmax_time_s: f64,
    pub mean_concentric_force: f64,
    /// Net impulse over the concentric window, N·s
    pub impulso: f64,
    /// Net impulse divided by body weight, s
    pub impulse_per_body_weight: f64,
    pub takeoff_velocity: f64,
    pub pmax: f64,
    pub pmean: f64,
    /// Closed-form legacy power estimate
    pub pmax_approx: f64,
    pub jump_height_m: f64,
    /// `v_takeoff² / 2g`
    pub jump_height_impulse_m: f64,
    pub asymmetry_contact_pct: f64,
    pub asymmetry_concentric_pct: f64,
    pub balance_right_pct: f64,
    pub mass_kg: f64,
    pub baseline_force: f64,
    pub boundaries: PhaseBoundaries,
    pub samples: Arc<[CorrectedSample]>,
}

impl CmjMetrics {
    pub fn jump_height_cm(&self) -> f64 {
        self.jump_height_m * 100.0
    }

    pub fn jump_height_impulse_cm(&self) -> f64 {
        self.jump_height_impulse_m * 100.0
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VelocityProfile {
    pub velocity: Vec<f64>,
    pub power: Vec<f64>,
}

/// `h = g·t²/8` from a ballistic flight time.
pub fn jump_height_from_flight(flight_time_s: f64) -> f64 {
    GRAVITY * flight_time_s.powi(2) / 8.0
}

pub fn trapezoid(time_s: &[f64], values: &[f64]) -> f64 {
    time_s
        .windows(2)
        .zip(values.windows(2))
        .map(|(t, v)| (v[0] + v[1]) / 2.0 * (t[1] - t[0]))
        .sum()
}

/// Integrate `(F − m·g)/m` into a zero-clamped velocity, then `P = F·v`.
pub fn velocity_profile(time_s: &[f64], total_force: &[f64], mass_kg: f64) -> VelocityProfile {
    let body_weight = mass_kg * GRAVITY;
    let acceleration: Vec<f64> = total_force.iter().map(|f| (f - body_weight) / mass_kg).collect();

    let mut velocity: Vec<f64> = Vec::with_capacity(acceleration.len());
    for i in 0..acceleration.len() {
        let v = if i == 0 {
            0.0
        } else {
            let dt = time_s[i] - time_s[i - 1];
            (velocity[i - 1] + (acceleration[i - 1] + acceleration[i]) / 2.0 * dt).max(0.0)
        };
        velocity.push(v);
    }

    let power = total_force.iter().zip(&velocity).map(|(f, v)| f * v).collect();
    VelocityProfile { velocity, power }
}

/// Per-sample signed right-vs-left imbalance, zero while off the plates.
pub fn asymmetry_series(samples: &[CorrectedSample]) -> Vec<f64> {
    samples
        .iter()
        .map(|s| {
            if s.total_force > IN_CONTACT_FORCE {
                100.0 * (s.right_n - s.left_n) / (0.5 * (s.right_n + s.left_n) + ASYMMETRY_EPSILON)
            } else {
                0.0
            }
        })
        .collect()
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

fn max_with_index(values: &[f64], offset: usize) -> Option<(usize, f64)> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, f64)>, (i, &v)| match best {
            Some((_, b)) if b >= v => best,
            _ => Some((offset + i, v)),
        })
}

/// `[onset_concentric, takeoff]`, when both ends exist and are in order.
fn concentric_window(boundaries: &PhaseBoundaries, len: usize) -> Option<(usize, usize)> {
    let start = boundaries.onset_concentric;
    let end = boundaries.takeoff;
    if !start.is_defined() || !end.is_defined() || start.index > end.index || end.index >= len {
        return None;
    }
    Some((start.index, end.index))
}

fn elapsed(samples: &[CorrectedSample], from: usize, to: usize) -> f64 {
    match (samples.get(from), samples.get(to)) {
        (Some(a), Some(b)) => b.time_s - a.time_s,
        _ => f64::NAN,
    }
}

pub fn compute_metrics(
    samples: Arc<[CorrectedSample]>,
    force_filt: &[f64],
    boundaries: &PhaseBoundaries,
    mass_kg: f64,
    baseline_force: f64,
) -> CmjMetrics {
    let len = samples.len().min(force_filt.len());
    let time_s: Vec<f64> = samples.iter().map(|s| s.time_s).collect();
    let total: Vec<f64> = samples.iter().map(|s| s.total_force).collect();

    let ecc = boundaries.onset_eccentric;
    let conc = boundaries.onset_concentric;
    let takeoff = boundaries.takeoff;
    let landing = boundaries.landing;

    let tempo_eccentrico = if ecc.is_defined() && conc.is_defined() {
        elapsed(&samples, ecc.index, conc.index)
    } else {
        f64::NAN
    };
    let tempo_spinta = if conc.is_defined() && takeoff.is_defined() {
        elapsed(&samples, conc.index, takeoff.index)
    } else {
        f64::NAN
    };
    let tempo_volo = match (boundaries.policy, boundaries.flight) {
        (SegmentationPolicy::FlightAnchored, Some(flight)) => flight.duration_s,
        _ if takeoff.is_defined() && landing.is_defined() => elapsed(&samples, takeoff.index, landing.index),
        _ => f64::NAN,
    };

    let window = concentric_window(boundaries, len);

    let fmax_range = match boundaries.policy {
        SegmentationPolicy::BaselineThreshold => window,
        SegmentationPolicy::FlightAnchored if takeoff.is_defined() && takeoff.index < len => {
            Some((0, takeoff.index))
        }
        SegmentationPolicy::FlightAnchored => None,
    };
    let (fmax, fmax_time_s) = fmax_range
        .and_then(|(a, b)| max_with_index(&force_filt[a..=b], a))
        .map(|(i, f)| (f, time_s[i]))
        .unwrap_or((f64::NAN, f64::NAN));

    let mut mean_concentric_force = f64::NAN;
    let mut impulso = f64::NAN;
    let mut takeoff_velocity = f64::NAN;
    let mut pmax = f64::NAN;
    let mut pmean = f64::NAN;
    let mut asymmetry_concentric_pct = f64::NAN;

    let asymmetry = asymmetry_series(&samples);

    if let Some((a, b)) = window {
        let t = &time_s[a..=b];
        let filt = &force_filt[a..=b];

        mean_concentric_force = mean(filt.iter().copied());
        let net: Vec<f64> = filt.iter().map(|f| f - baseline_force).collect();
        impulso = trapezoid(t, &net);

        let profile = velocity_profile(t, &total[a..=b], mass_kg);
        takeoff_velocity = profile.velocity.last().copied().unwrap_or(f64::NAN);
        pmax = profile.power.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let duration = t[t.len() - 1] - t[0];
        pmean = if duration > 0.0 {
            trapezoid(t, &profile.power) / duration
        } else {
            0.0
        };

        asymmetry_concentric_pct = mean(
            (a..=b)
                .filter(|&i| samples[i].total_force > IN_CONTACT_FORCE)
                .map(|i| asymmetry[i]),
        );
    }

    let pmax_approx = if fmax.is_nan() || impulso.is_nan() || tempo_spinta.is_nan() {
        f64::NAN
    } else if tempo_spinta > 0.0 {
        fmax * (impulso / mass_kg) / tempo_spinta
    } else {
        0.0
    };

    let in_contact = || samples.iter().enumerate().filter(|(_, s)| s.total_force > IN_CONTACT_FORCE);
    let asymmetry_contact_pct = mean(in_contact().map(|(i, _)| asymmetry[i]));
    let balance_right_pct = mean(in_contact().map(|(_, s)| 100.0 * s.right_n / (s.left_n + s.right_n)));

    CmjMetrics {
        tempo_eccentrico,
        tempo_spinta,
        tempo_volo,
        fmax,
        fmax_time_s,
        mean_concentric_force,
        impulso,
        impulse_per_body_weight: impulso / (mass_kg * GRAVITY),
        takeoff_velocity,
        pmax,
        pmean,
        pmax_approx,
        jump_height_m: jump_height_from_flight(tempo_volo),
        jump_height_impulse_m: takeoff_velocity.powi(2) / (2.0 * GRAVITY),
        asymmetry_contact_pct,
        asymmetry_concentric_pct,
        balance_right_pct,
        mass_kg,
        baseline_force,
        boundaries: boundaries.clone(),
        samples,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flight_detector::FlightInterval;
    use crate::phase_segmenter::Boundary;
    use approx::assert_abs_diff_eq;

    fn sample(time_ms: f64, left: f64, right: f64) -> CorrectedSample {
        CorrectedSample {
            time_ms,
            time_s: time_ms / 1000.0,
            left_raw: left,
            right_raw: right,
            left_n: left,
            right_n: right,
            total_force: left + right,
        }
    }

    fn boundaries(ecc: usize, conc: usize, takeoff: usize, landing: usize) -> PhaseBoundaries {
        PhaseBoundaries {
            onset_eccentric: Boundary::detected(ecc),
            onset_concentric: Boundary::detected(conc),
            takeoff: Boundary::detected(takeoff),
            landing: Boundary::detected(landing),
            policy: SegmentationPolicy::BaselineThreshold,
            flight: None,
        }
    }

    #[test]
    fn test_jump_height_from_flight_time() {
        assert_abs_diff_eq!(jump_height_from_flight(0.4472), 0.2452, epsilon = 1e-4);
        assert_abs_diff_eq!(jump_height_from_flight(0.4515), 0.25, epsilon = 1e-3);
        assert_eq!(jump_height_from_flight(0.0), 0.0);
    }

    #[test]
    fn test_trapezoid() {
        assert_abs_diff_eq!(trapezoid(&[0.0, 1.0, 3.0], &[0.0, 2.0, 2.0]), 5.0, epsilon = 1e-12);
        assert_eq!(trapezoid(&[1.0], &[4.0]), 0.0);
    }

    #[test]
    fn test_velocity_profile_is_clamped() {
        // 10 kg subject, 50 N is below body weight so velocity stays at zero
        let profile = velocity_profile(&[0.0, 0.1, 0.2], &[50.0, 50.0, 298.1], 10.0);
        assert_eq!(profile.velocity[1], 0.0);
        assert_abs_diff_eq!(profile.velocity[2], 0.05 * (-4.81 + 20.0), epsilon = 1e-9);
        assert_abs_diff_eq!(profile.power[2], 298.1 * profile.velocity[2], epsilon = 1e-9);
    }

    #[test]
    fn test_symmetric_loading_has_zero_asymmetry() {
        let samples: Vec<_> = (0..5).map(|i| sample(i as f64 * 10.0, 300.0, 300.0)).collect();
        let series = asymmetry_series(&samples);
        assert!(series.iter().all(|&a| a == 0.0));
    }

    #[test]
    fn test_one_sided_loading() {
        let samples: Arc<[CorrectedSample]> =
            (0..4).map(|i| sample(i as f64 * 10.0, 0.0, 100.0)).collect::<Vec<_>>().into();
        let force: Vec<f64> = samples.iter().map(|s| s.total_force).collect();
        let m = compute_metrics(samples, &force, &boundaries(0, 0, 3, 3), 10.0, 98.1);
        // normalised by the mean of both plates
        assert_abs_diff_eq!(m.asymmetry_contact_pct, 200.0, epsilon = 1e-4);
        assert_abs_diff_eq!(m.balance_right_pct, 100.0, epsilon = 1e-9);
    }

    #[test]
    fn test_off_plate_samples_ignored_for_asymmetry() {
        let samples: Arc<[CorrectedSample]> = vec![
            sample(0.0, 200.0, 200.0),
            sample(10.0, 0.0, 0.0),
            sample(20.0, 1.0, 2.0),
            sample(30.0, 200.0, 200.0),
        ]
        .into();
        let force: Vec<f64> = samples.iter().map(|s| s.total_force).collect();
        let m = compute_metrics(samples, &force, &boundaries(0, 0, 3, 3), 40.0, 392.4);
        assert_eq!(m.asymmetry_contact_pct, 0.0);
    }

    #[test]
    fn test_concentric_window_metrics() {
        let samples: Arc<[CorrectedSample]> = vec![
            sample(0.0, 350.0, 350.0),
            sample(100.0, 250.0, 250.0),
            sample(200.0, 500.0, 500.0),
            sample(300.0, 600.0, 600.0),
            sample(400.0, 0.0, 0.0),
            sample(500.0, 0.0, 0.0),
            sample(600.0, 0.0, 0.0),
            sample(700.0, 400.0, 400.0),
        ]
        .into();
        let force: Vec<f64> = samples.iter().map(|s| s.total_force).collect();
        let m = compute_metrics(samples, &force, &boundaries(1, 2, 4, 6), 70.0, 700.0);

        assert_abs_diff_eq!(m.tempo_eccentrico, 0.1, epsilon = 1e-9);
        assert_abs_diff_eq!(m.tempo_spinta, 0.2, epsilon = 1e-9);
        assert_abs_diff_eq!(m.tempo_volo, 0.2, epsilon = 1e-9);
        assert_eq!(m.fmax, 1200.0);
        assert_abs_diff_eq!(m.fmax_time_s, 0.3, epsilon = 1e-12);
        // (300 + 500)/2·0.1 + (500 − 700)/2·0.1
        assert_abs_diff_eq!(m.impulso, 30.0, epsilon = 1e-9);
        assert_abs_diff_eq!(m.mean_concentric_force, 2200.0 / 3.0, epsilon = 1e-9);
        assert_abs_diff_eq!(m.pmax_approx, 1200.0 * (30.0 / 70.0) / 0.2, epsilon = 1e-6);
        assert_abs_diff_eq!(m.jump_height_m, 9.81 * 0.04 / 8.0, epsilon = 1e-9);
        assert!(m.pmax >= 0.0);
        assert!(m.takeoff_velocity >= 0.0);
    }

    #[test]
    fn test_undetected_takeoff_gives_undefined_metrics() {
        let samples: Arc<[CorrectedSample]> =
            (0..6).map(|i| sample(i as f64 * 100.0, 350.0, 350.0)).collect::<Vec<_>>().into();
        let force: Vec<f64> = samples.iter().map(|s| s.total_force).collect();
        let mut b = boundaries(1, 2, 2, 2);
        b.takeoff = Boundary::fallback(2);
        b.landing = Boundary::fallback(2);
        let m = compute_metrics(samples, &force, &b, 70.0, 700.0);

        assert_abs_diff_eq!(m.tempo_eccentrico, 0.1, epsilon = 1e-9);
        assert!(m.tempo_spinta.is_nan());
        assert!(m.impulso.is_nan());
        assert!(m.fmax.is_nan());
        assert!(m.pmax_approx.is_nan());
        assert!(m.jump_height_m.is_nan());
        assert_abs_diff_eq!(m.asymmetry_contact_pct, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn test_flight_anchored_fmax_ignores_landing_spike() {
        let samples: Arc<[CorrectedSample]> = vec![
            sample(0.0, 350.0, 350.0),
            sample(100.0, 600.0, 600.0),
            sample(200.0, 0.0, 0.0),
            sample(300.0, 0.0, 0.0),
            sample(400.0, 0.0, 0.0),
            sample(500.0, 1500.0, 1500.0),
        ]
        .into();
        let force: Vec<f64> = samples.iter().map(|s| s.total_force).collect();
        let flight = FlightInterval { start_index: 2, end_index: 4, duration_s: 0.2, min_force: 0.0 };
        let b = PhaseBoundaries {
            onset_eccentric: Boundary::fallback(0),
            onset_concentric: Boundary::fallback(0),
            takeoff: Boundary::detected(2),
            landing: Boundary::detected(4),
            policy: SegmentationPolicy::FlightAnchored,
            flight: Some(flight),
        };
        let m = compute_metrics(samples, &force, &b, 70.0, 686.7);
        assert_eq!(m.fmax, 1200.0);
        assert_abs_diff_eq!(m.tempo_volo, 0.2, epsilon = 1e-12);
        assert!(m.impulso.is_nan());
    }

    #[test]
    fn test_zero_length_window() {
        let samples: Arc<[CorrectedSample]> =
            (0..3).map(|i| sample(i as f64 * 100.0, 400.0, 400.0)).collect::<Vec<_>>().into();
        let force: Vec<f64> = samples.iter().map(|s| s.total_force).collect();
        let m = compute_metrics(samples, &force, &boundaries(1, 1, 1, 2), 70.0, 700.0);
        assert_eq!(m.tempo_spinta, 0.0);
        assert_eq!(m.impulso, 0.0);
        assert_eq!(m.pmean, 0.0);
        assert_eq!(m.pmax_approx, 0.0);
    }
}
