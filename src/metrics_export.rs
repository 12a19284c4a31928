/// CSV exports: the `Parametro,Valore` metrics table and the per-sample trace.
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use csv::{ReaderBuilder, Trim, Writer};
use serde::{Deserialize, Serialize};

use crate::cmj_metrics::{asymmetry_series, CmjMetrics};
use crate::error::CmjError;
use crate::flight_detector::FlightInterval;

/// Rendered in place of any undefined value.
pub const UNDEFINED: &str = "—";

pub mod labels {
    pub const TEMPO_ECCENTRICO: &str = "Tempo eccentrico (s)";
    pub const T_CONCENTRICA: &str = "t concentrica (s)";
    pub const TEMPO_VOLO: &str = "Tempo di volo (s)";
    pub const FMAX: &str = "Fmax (N)";
    pub const TEMPO_FMAX: &str = "Tempo Fmax (s)";
    pub const FORZA_MEDIA_CONCENTRICA: &str = "Forza media concentrica (N)";
    pub const IMPULSO_CONCENTRICO: &str = "Impulso concentrico (N·s)";
    pub const IMPULSO_BW: &str = "Impulso / BW (s)";
    pub const DELTA_V_TAKEOFF: &str = "Δv al take-off (m/s)";
    pub const PMAX: &str = "Pmax (W)";
    pub const PMEDIA: &str = "Pmedia (W)";
    pub const PMAX_STIMATA: &str = "Pmax stimata (W)";
    pub const ALTEZZA_M: &str = "Altezza salto (m)";
    pub const ALTEZZA_CM: &str = "Altezza salto (cm)";
    pub const ALTEZZA_IMPULSO_CM: &str = "Altezza salto da impulso (cm)";
    pub const ASIMMETRIA_MEDIA: &str = "Asimmetria media (%)";
    pub const ASIMMETRIA_CONCENTRICA: &str = "Asimmetria concentrica (%)";
    pub const BILANCIAMENTO_DX: &str = "Bilanciamento medio DX (%)";
    pub const MASSA: &str = "Massa soggetto (kg)";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricRow {
    #[serde(rename = "Parametro")]
    pub label: String,
    #[serde(rename = "Valore")]
    pub value: String,
}

impl MetricRow {
    fn new(label: &str, value: String) -> Self {
        MetricRow { label: label.to_string(), value }
    }
}

pub fn format_value(value: f64, decimals: usize) -> String {
    if value.is_finite() {
        format!("{:.*}", decimals, value)
    } else {
        UNDEFINED.to_string()
    }
}

pub fn format_percent(value: f64) -> String {
    if value.is_finite() {
        format!("{:.2}%", value)
    } else {
        UNDEFINED.to_string()
    }
}

/// The canonical metrics table, in export order.
pub fn metric_rows(m: &CmjMetrics) -> Vec<MetricRow> {
    use labels::*;
    vec![
        MetricRow::new(TEMPO_ECCENTRICO, format_value(m.tempo_eccentrico, 3)),
        MetricRow::new(T_CONCENTRICA, format_value(m.tempo_spinta, 3)),
        MetricRow::new(TEMPO_VOLO, format_value(m.tempo_volo, 3)),
        MetricRow::new(FMAX, format_value(m.fmax, 1)),
        MetricRow::new(TEMPO_FMAX, format_value(m.fmax_time_s, 3)),
        MetricRow::new(FORZA_MEDIA_CONCENTRICA, format_value(m.mean_concentric_force, 1)),
        MetricRow::new(IMPULSO_CONCENTRICO, format_value(m.impulso, 2)),
        MetricRow::new(IMPULSO_BW, format_value(m.impulse_per_body_weight, 3)),
        MetricRow::new(DELTA_V_TAKEOFF, format_value(m.takeoff_velocity, 3)),
        MetricRow::new(PMAX, format_value(m.pmax, 1)),
        MetricRow::new(PMEDIA, format_value(m.pmean, 1)),
        MetricRow::new(PMAX_STIMATA, format_value(m.pmax_approx, 1)),
        MetricRow::new(ALTEZZA_M, format_value(m.jump_height_m, 3)),
        MetricRow::new(ALTEZZA_CM, format_value(m.jump_height_cm(), 1)),
        MetricRow::new(ALTEZZA_IMPULSO_CM, format_value(m.jump_height_impulse_cm(), 1)),
        MetricRow::new(ASIMMETRIA_MEDIA, format_percent(m.asymmetry_contact_pct)),
        MetricRow::new(ASIMMETRIA_CONCENTRICA, format_percent(m.asymmetry_concentric_pct)),
        MetricRow::new(BILANCIAMENTO_DX, format_percent(m.balance_right_pct)),
        MetricRow::new(MASSA, format_value(m.mass_kg, 1)),
    ]
}

pub fn write_metric_rows<W: Write>(rows: &[MetricRow], writer: W) -> Result<(), CmjError> {
    let mut wtr = Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}

pub fn write_metrics_csv(metrics: &CmjMetrics, output_path: &Path) -> Result<(), CmjError> {
    let file = File::create(output_path).map_err(|e| CmjError::io(output_path, e))?;
    write_metric_rows(&metric_rows(metrics), file)
}

/// Read a `Parametro,Valore` table back, keeping file order. Header names are
/// trimmed so hand-edited spreadsheets still load.
pub fn read_metric_rows<R: Read>(reader: R) -> Result<Vec<MetricRow>, CmjError> {
    let mut rdr = ReaderBuilder::new().trim(Trim::All).flexible(true).from_reader(reader);
    let mut rows = Vec::new();
    for result in rdr.deserialize::<MetricRow>() {
        rows.push(result?);
    }
    Ok(rows)
}

pub fn read_metrics_csv(path: &Path) -> Result<Vec<MetricRow>, CmjError> {
    let file = File::open(path).map_err(|e| CmjError::io(path, e))?;
    read_metric_rows(file)
}

#[derive(Debug, Serialize)]
struct TraceRow {
    time_ms: f64,
    time_s: f64,
    left_n: f64,
    right_n: f64,
    total_force: f64,
    force_filt: f64,
    airborne: bool,
    asymmetry_pct: f64,
}

/// Per-sample series for external plotting: plates, total, smoothed total,
/// airborne flag and asymmetry.
pub fn write_trace<W: Write>(
    metrics: &CmjMetrics,
    force_filt: &[f64],
    flights: &[FlightInterval],
    writer: W,
) -> Result<(), CmjError> {
    let airborne = crate::flight_detector::airborne_mask(metrics.samples.len(), flights);
    let asymmetry = asymmetry_series(&metrics.samples);
    let mut wtr = Writer::from_writer(writer);

    for (i, s) in metrics.samples.iter().enumerate() {
        wtr.serialize(TraceRow {
            time_ms: s.time_ms,
            time_s: s.time_s,
            left_n: s.left_n,
            right_n: s.right_n,
            total_force: s.total_force,
            force_filt: force_filt.get(i).copied().unwrap_or(f64::NAN),
            airborne: airborne[i],
            asymmetry_pct: asymmetry[i],
        })?;
    }

    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}
