/// One analysed trial: every intermediate product of the pipeline plus the
/// metrics derived from it. A new run replaces the whole value; a manual
/// override swaps one boundary and recomputes the metrics.
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::cmj_metrics::{compute_metrics, CmjMetrics};
use crate::config::AnalysisConfig;
use crate::error::CmjError;
use crate::flight_detector::{detect_flight_intervals, FlightInterval};
use crate::force_plate_reader::{normalize_with, read_recording, CorrectedSample, RawSample};
use crate::moving_average::centered_moving_average;
use crate::phase_segmenter::{segment, OverrideResolver, OverrideTarget, PhaseBoundaries};

#[derive(Debug, Clone)]
pub struct AnalysisSession {
    config: AnalysisConfig,
    samples: Arc<[CorrectedSample]>,
    time_s: Vec<f64>,
    force_filt: Vec<f64>,
    flights: Vec<FlightInterval>,
    boundaries: PhaseBoundaries,
    metrics: Arc<CmjMetrics>,
}

impl AnalysisSession {
    /// Validate the configuration, then run the full pipeline on `raw`.
    pub fn run(config: AnalysisConfig, raw: &[RawSample]) -> Result<Self, CmjError> {
        config.validate()?;
        if raw.is_empty() {
            return Err(CmjError::EmptyRecording);
        }

        let samples: Arc<[CorrectedSample]> = normalize_with(raw, &config).into();
        let time_s: Vec<f64> = samples.iter().map(|s| s.time_s).collect();
        let total: Vec<f64> = samples.iter().map(|s| s.total_force).collect();
        let force_filt = centered_moving_average(&total, config.smoothing_window);

        let flights = detect_flight_intervals(
            &force_filt,
            &time_s,
            config.flight_threshold,
            config.min_flight_duration,
        );
        debug!("{} flight interval(s) confirmed", flights.len());
        if flights.is_empty() {
            warn!("no flight phase longer than {:.3}s found", config.min_flight_duration);
        }

        let boundaries = segment(&force_filt, &flights, &config);
        let metrics = Arc::new(compute_metrics(
            Arc::clone(&samples),
            &force_filt,
            &boundaries,
            config.mass_kg(),
            config.effective_baseline(),
        ));

        Ok(AnalysisSession {
            config,
            samples,
            time_s,
            force_filt,
            flights,
            boundaries,
            metrics,
        })
    }

    pub fn run_file(config: AnalysisConfig, path: &Path) -> Result<Self, CmjError> {
        config.validate()?;
        let (raw, stats) = read_recording(path)?;
        if stats.rows_dropped > 0 {
            warn!(
                "{}: skipped {} malformed row(s) of {}",
                path.display(),
                stats.rows_dropped,
                stats.rows_read
            );
        }
        Self::run(config, &raw)
    }

    /// Place one boundary at the sample the resolver picks for `query_time`
    /// (seconds) and recompute the metrics. Other boundaries stay as they were.
    pub fn override_boundary(
        &mut self,
        target: OverrideTarget,
        query_time: f64,
        resolver: &dyn OverrideResolver,
    ) -> Result<usize, CmjError> {
        let index = resolver.resolve_override(query_time);
        self.override_boundary_index(target, index)?;
        Ok(index)
    }

    pub fn override_boundary_index(&mut self, target: OverrideTarget, index: usize) -> Result<(), CmjError> {
        if index >= self.samples.len() {
            return Err(CmjError::OverrideOutOfRange { index, len: self.samples.len() });
        }

        self.boundaries = self.boundaries.with_override(target, index);
        for (a, b) in self.boundaries.ordering_violations() {
            warn!("manual boundaries out of order: {} after {}", a, b);
        }

        self.metrics = Arc::new(compute_metrics(
            Arc::clone(&self.samples),
            &self.force_filt,
            &self.boundaries,
            self.config.mass_kg(),
            self.config.effective_baseline(),
        ));
        Ok(())
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    pub fn samples(&self) -> &[CorrectedSample] {
        &self.samples
    }

    pub fn time_s(&self) -> &[f64] {
        &self.time_s
    }

    pub fn force_filt(&self) -> &[f64] {
        &self.force_filt
    }

    pub fn flights(&self) -> &[FlightInterval] {
        &self.flights
    }

    pub fn boundaries(&self) -> &PhaseBoundaries {
        &self.boundaries
    }

    pub fn metrics(&self) -> Arc<CmjMetrics> {
        Arc::clone(&self.metrics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FlightSelection, SegmentationPolicy};
    use crate::error::ConfigError;
    use crate::force_plate_reader::parse_recording_str;
    use crate::phase_segmenter::{Boundary, BoundarySource, NearestSample};
    use approx::assert_abs_diff_eq;

    const SCENARIO: &str = "0,50,40\n100,20,15\n200,0,0\n300,0,0\n400,60,55\n500,70,65\n600,3,2\n";

    fn scenario_config() -> AnalysisConfig {
        AnalysisConfig {
            subject_mass: Some(9.0),
            baseline_force: Some(90.0),
            min_flight_duration: 0.2,
            ..Default::default()
        }
    }

    #[test]
    fn test_two_sample_dip_is_not_a_flight() {
        let raw = parse_recording_str(SCENARIO).unwrap();
        let session = AnalysisSession::run(scenario_config(), &raw).unwrap();
        assert!(session.flights().is_empty());
        assert_eq!(session.samples()[6].total_force, 0.0);
        assert!(session.metrics().tempo_volo.is_nan());
        assert!(session.metrics().jump_height_m.is_nan());
    }

    #[test]
    fn test_config_errors_stop_before_computation() {
        let raw = parse_recording_str(SCENARIO).unwrap();
        let config = AnalysisConfig { smoothing_window: 2, ..scenario_config() };
        let err = AnalysisSession::run(config, &raw).unwrap_err();
        assert!(matches!(err, CmjError::Config(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_empty_recording() {
        let raw = parse_recording_str("# nothing here\n").unwrap();
        assert!(matches!(
            AnalysisSession::run(scenario_config(), &raw),
            Err(CmjError::EmptyRecording)
        ));
    }

    /// 10 ms ticks, right plate carrying 55% of the load: stance, unweighting,
    /// push, 400 ms of flight, landing.
    fn synthetic_jump() -> Vec<RawSample> {
        (0..200)
            .map(|i| {
                let time_ms = (i * 10) as f64;
                let total = match i * 10 {
                    0..=499 => 700.0,
                    500..=799 => 500.0,
                    800..=1099 => 1200.0,
                    1100..=1499 => 0.0,
                    _ => 700.0,
                };
                RawSample { time_ms, left_raw: 0.45 * total, right_raw: 0.55 * total }
            })
            .collect()
    }

    fn jump_config() -> AnalysisConfig {
        AnalysisConfig {
            subject_mass: Some(70.0),
            baseline_force: Some(700.0),
            ..Default::default()
        }
    }

    #[test]
    fn test_override_recomputes_only_dependent_metrics() {
        let mut session = AnalysisSession::run(jump_config(), &synthetic_jump()).unwrap();
        let before_boundaries = session.boundaries().clone();
        let before = session.metrics();
        assert_eq!(before_boundaries.onset_concentric.index, 79);
        assert_eq!(before_boundaries.takeoff.index, 111);
        let times = session.time_s().to_vec();

        let index = session
            .override_boundary(OverrideTarget::OnsetConcentric, 1.1, &NearestSample::new(&times))
            .unwrap();
        assert_eq!(index, 110);

        let after_boundaries = session.boundaries();
        assert_eq!(after_boundaries.onset_concentric, Boundary::manual(110));
        assert_eq!(after_boundaries.onset_eccentric, before_boundaries.onset_eccentric);
        assert_eq!(after_boundaries.takeoff, before_boundaries.takeoff);

        let after = session.metrics();
        assert_abs_diff_eq!(before.tempo_spinta, 0.32, epsilon = 1e-9);
        assert_abs_diff_eq!(after.tempo_spinta, 0.01, epsilon = 1e-9);
        assert_abs_diff_eq!(before.fmax, 1200.0, epsilon = 1e-9);
        assert!(after.fmax < 500.0);
        assert!(after.impulso < before.impulso);
        assert_abs_diff_eq!(after.tempo_eccentrico, 1.1 - 0.49, epsilon = 1e-9);

        assert_eq!(after.tempo_volo, before.tempo_volo);
        assert_eq!(after.asymmetry_contact_pct, before.asymmetry_contact_pct);
        assert_abs_diff_eq!(after.asymmetry_contact_pct, 20.0, epsilon = 1e-6);
        assert_eq!(after.balance_right_pct, before.balance_right_pct);
    }

    #[test]
    fn test_eccentric_override_moves_eccentric_time_only() {
        let mut session = AnalysisSession::run(jump_config(), &synthetic_jump()).unwrap();
        let before = session.metrics();
        assert_abs_diff_eq!(before.tempo_eccentrico, 0.30, epsilon = 1e-9);

        session.override_boundary_index(OverrideTarget::OnsetEccentric, 60).unwrap();
        let after = session.metrics();
        assert_eq!(session.boundaries().onset_eccentric.source, BoundarySource::Manual);
        assert_abs_diff_eq!(after.tempo_eccentrico, 0.19, epsilon = 1e-9);
        assert_eq!(after.tempo_spinta, before.tempo_spinta);
        assert_eq!(after.fmax, before.fmax);
        assert_eq!(after.impulso, before.impulso);
        assert_eq!(after.tempo_volo, before.tempo_volo);
    }

    /// Two 1.8 s jump blocks. The first flight leaves 4 N on the left plate, the
    /// second is a clean 0 N flight.
    fn two_jumps() -> Vec<RawSample> {
        (0..360)
            .map(|i| {
                let time_ms = (i * 10) as f64;
                let (left_raw, right_raw) = match ((i % 180) * 10, i < 180) {
                    (0..=499, _) => (350.0, 350.0),
                    (500..=799, _) => (250.0, 250.0),
                    (800..=1099, _) => (600.0, 600.0),
                    (1100..=1499, true) => (4.0, 0.0),
                    (1100..=1499, false) => (0.0, 0.0),
                    _ => (350.0, 350.0),
                };
                RawSample { time_ms, left_raw, right_raw }
            })
            .collect()
    }

    #[test]
    fn test_baseline_policy_lands_in_its_own_flight() {
        for selection in [FlightSelection::First, FlightSelection::GlobalMinimum] {
            let config = AnalysisConfig { flight_selection: selection, ..jump_config() };
            let session = AnalysisSession::run(config, &two_jumps()).unwrap();
            let spans: Vec<(usize, usize)> =
                session.flights().iter().map(|f| (f.start_index, f.end_index)).collect();
            assert_eq!(spans, vec![(111, 148), (291, 328)]);

            let b = session.boundaries();
            assert_eq!(b.takeoff, Boundary::detected(111));
            assert_eq!(b.landing, Boundary::detected(148));
            assert_abs_diff_eq!(session.metrics().tempo_volo, 0.37, epsilon = 1e-9);
            assert!(session.metrics().jump_height_m < 0.2);
        }
    }

    #[test]
    fn test_flight_anchored_follows_selection() {
        let config = AnalysisConfig {
            segmentation_policy: SegmentationPolicy::FlightAnchored,
            flight_selection: FlightSelection::GlobalMinimum,
            ..jump_config()
        };
        let session = AnalysisSession::run(config, &two_jumps()).unwrap();
        let b = session.boundaries();
        assert_eq!(b.takeoff, Boundary::detected(291));
        assert_eq!(b.landing, Boundary::detected(328));
        assert_abs_diff_eq!(session.metrics().tempo_volo, 0.37, epsilon = 1e-9);
    }

    #[test]
    fn test_override_out_of_range() {
        let raw = parse_recording_str(SCENARIO).unwrap();
        let mut session = AnalysisSession::run(scenario_config(), &raw).unwrap();
        assert!(matches!(
            session.override_boundary_index(OverrideTarget::OnsetEccentric, 99),
            Err(CmjError::OverrideOutOfRange { index: 99, len: 7 })
        ));
    }
}
