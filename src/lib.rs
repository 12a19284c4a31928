//! Countermovement-jump analysis for dual force plates.
//!
//! The pipeline runs strictly forward: [`force_plate_reader`] →
//! [`moving_average`] → [`flight_detector`] → [`phase_segmenter`] →
//! [`cmj_metrics`], with [`session::AnalysisSession`] tying the stages
//! together and [`pre_post_comparison`] comparing two exported trials.

pub mod batch_analysis;
pub mod cmj_metrics;
pub mod config;
pub mod error;
pub mod flight_detector;
pub mod force_plate_reader;
pub mod metrics_export;
pub mod moving_average;
pub mod phase_segmenter;
pub mod pre_post_comparison;
pub mod session;

pub use cmj_metrics::CmjMetrics;
pub use config::{AnalysisConfig, FlightSelection, SegmentationPolicy};
pub use error::{CmjError, ConfigError};
pub use phase_segmenter::{NearestSample, OverrideResolver, OverrideTarget, PhaseBoundaries};
pub use session::AnalysisSession;
