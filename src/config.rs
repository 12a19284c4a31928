/// Analysis parameters for a single CMJ trial.
///
/// Values come from `Default`, an optional JSON file and textual `key=value`
/// overrides, in that order. Everything is checked by [`AnalysisConfig::validate`]
/// before the first sample is processed.
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{CmjError, ConfigError};

/// Standard gravity used by every metric.
pub const GRAVITY: f64 = 9.81;

/// How take-off and the movement onsets are located.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationPolicy {
    /// Onsets from a resting baseline ± delta, take-off from the flight threshold.
    BaselineThreshold,
    /// Take-off and landing from the selected flight interval.
    FlightAnchored,
}

/// Which confirmed flight interval counts as "the jump".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlightSelection {
    First,
    GlobalMinimum,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Unloaded reading of the left plate
    pub offset_left: f64,
    /// Unloaded reading of the right plate
    pub offset_right: f64,
    /// Per-channel force at or below which the plate is treated as unloaded
    pub contact_threshold: f64,
    pub flight_threshold: f64,
    /// Seconds
    pub min_flight_duration: f64,
    pub subject_mass: Option<f64>,
    /// Samples, odd
    pub smoothing_window: usize,
    pub baseline_force: Option<f64>,
    pub baseline_delta: f64,
    pub segmentation_policy: SegmentationPolicy,
    pub flight_selection: FlightSelection,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        AnalysisConfig {
            offset_left: 0.0,
            offset_right: 0.0,
            contact_threshold: 3.0,
            flight_threshold: 5.0,
            min_flight_duration: 0.2,
            subject_mass: None,
            smoothing_window: 3,
            baseline_force: None,
            baseline_delta: 5.0,
            segmentation_policy: SegmentationPolicy::BaselineThreshold,
            flight_selection: FlightSelection::First,
        }
    }
}

impl AnalysisConfig {
    /// Settings of the original desktop tool: 50/40 plate offsets, 0.5 s minimum
    /// flight, 55 N baseline and a 66 kg subject.
    pub fn legacy_desktop() -> Self {
        AnalysisConfig {
            offset_left: 50.0,
            offset_right: 40.0,
            min_flight_duration: 0.5,
            subject_mass: Some(66.0),
            baseline_force: Some(55.0),
            ..Default::default()
        }
    }

    pub fn from_json_file(path: &Path) -> Result<Self, CmjError> {
        let text = fs::read_to_string(path).map_err(|e| CmjError::io(path, e))?;
        Self::from_json_str(&text)
    }

    pub fn from_json_str(text: &str) -> Result<Self, CmjError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Apply one textual parameter, e.g. from a form field or `--param key=value`.
    pub fn apply_override(&mut self, key: &str, raw: &str) -> Result<(), ConfigError> {
        let key = key.trim();
        let raw = raw.trim();
        match key {
            "offset_left" => self.offset_left = parse_number(key, raw)?,
            "offset_right" => self.offset_right = parse_number(key, raw)?,
            "contact_threshold" => self.contact_threshold = parse_number(key, raw)?,
            "flight_threshold" => self.flight_threshold = parse_number(key, raw)?,
            "min_flight_duration" => self.min_flight_duration = parse_number(key, raw)?,
            "subject_mass" => self.subject_mass = Some(parse_number(key, raw)?),
            "baseline_force" => self.baseline_force = Some(parse_number(key, raw)?),
            "baseline_delta" => self.baseline_delta = parse_number(key, raw)?,
            "smoothing_window" => {
                self.smoothing_window = raw.parse::<usize>().map_err(|_| ConfigError::NotNumeric {
                    field: key.to_string(),
                    value: raw.to_string(),
                })?
            }
            "segmentation_policy" => {
                self.segmentation_policy = match raw {
                    "baseline_threshold" | "baseline-threshold" => SegmentationPolicy::BaselineThreshold,
                    "flight_anchored" | "flight-anchored" => SegmentationPolicy::FlightAnchored,
                    other => {
                        return Err(ConfigError::InvalidValue {
                            field: "segmentation_policy",
                            reason: format!("unknown policy '{}'", other),
                        })
                    }
                }
            }
            "flight_selection" => {
                self.flight_selection = match raw {
                    "first" => FlightSelection::First,
                    "global_minimum" | "global-minimum" => FlightSelection::GlobalMinimum,
                    other => {
                        return Err(ConfigError::InvalidValue {
                            field: "flight_selection",
                            reason: format!("unknown selection '{}'", other),
                        })
                    }
                }
            }
            other => return Err(ConfigError::UnknownParameter(other.to_string())),
        }
        Ok(())
    }

    /// Apply a `key=value` string.
    pub fn apply_assignment(&mut self, assignment: &str) -> Result<(), ConfigError> {
        let (key, value) = assignment
            .split_once('=')
            .ok_or_else(|| ConfigError::MalformedOverride(assignment.to_string()))?;
        self.apply_override(key, value)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_finite("offset_left", self.offset_left)?;
        check_finite("offset_right", self.offset_right)?;
        check_non_negative("contact_threshold", self.contact_threshold)?;
        check_non_negative("flight_threshold", self.flight_threshold)?;
        check_non_negative("min_flight_duration", self.min_flight_duration)?;
        check_non_negative("baseline_delta", self.baseline_delta)?;

        if self.smoothing_window == 0 || self.smoothing_window % 2 == 0 {
            return Err(ConfigError::InvalidValue {
                field: "smoothing_window",
                reason: format!("must be a positive odd sample count, got {}", self.smoothing_window),
            });
        }

        let mass = self.subject_mass.ok_or(ConfigError::MissingParameter("subject_mass"))?;
        if !mass.is_finite() || mass <= 0.0 {
            return Err(ConfigError::InvalidValue {
                field: "subject_mass",
                reason: format!("must be a positive mass in kg, got {}", mass),
            });
        }

        match (self.segmentation_policy, self.baseline_force) {
            (SegmentationPolicy::BaselineThreshold, None) => {
                return Err(ConfigError::MissingParameter("baseline_force"));
            }
            (_, Some(baseline)) => check_finite("baseline_force", baseline)?,
            _ => {}
        }

        Ok(())
    }

    /// Mass after validation.
    pub fn mass_kg(&self) -> f64 {
        self.subject_mass.unwrap_or(f64::NAN)
    }

    /// Reference level for onset detection and net impulse: the configured
    /// baseline, or body weight when none was given.
    pub fn effective_baseline(&self) -> f64 {
        self.baseline_force.unwrap_or_else(|| self.mass_kg() * GRAVITY)
    }
}

fn parse_number(field: &str, raw: &str) -> Result<f64, ConfigError> {
    raw.parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ConfigError::NotNumeric {
            field: field.to_string(),
            value: raw.to_string(),
        })
}

fn check_finite(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::InvalidValue {
            field,
            reason: format!("must be finite, got {}", value),
        })
    }
}

fn check_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    check_finite(field, value)?;
    if value < 0.0 {
        return Err(ConfigError::InvalidValue {
            field,
            reason: format!("must not be negative, got {}", value),
        });
    }
    Ok(())
}
