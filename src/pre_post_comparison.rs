/// Pre/Post comparison of two exported metrics tables.
use std::collections::HashMap;
use std::io::Write;
use std::path::Path;

use csv::Writer;
use serde::Serialize;

use crate::error::CmjError;
use crate::metrics_export::{labels, read_metrics_csv, MetricRow, UNDEFINED};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterGroup {
    ForcePower,
    Velocity,
    Time,
    Height,
    Balance,
    Mass,
}

impl ParameterGroup {
    pub fn title(&self) -> &'static str {
        match self {
            ParameterGroup::ForcePower => "Forza / Potenza",
            ParameterGroup::Velocity => "Velocità",
            ParameterGroup::Time => "Tempo",
            ParameterGroup::Height => "Altezza",
            ParameterGroup::Balance => "Bilanciamento",
            ParameterGroup::Mass => "Massa",
        }
    }
}

/// Labels that take part in a comparison, in output order.
pub const COMPARED_PARAMETERS: [(&str, ParameterGroup); 11] = [
    (labels::FMAX, ParameterGroup::ForcePower),
    (labels::PMAX, ParameterGroup::ForcePower),
    (labels::T_CONCENTRICA, ParameterGroup::Time),
    (labels::FORZA_MEDIA_CONCENTRICA, ParameterGroup::ForcePower),
    (labels::IMPULSO_CONCENTRICO, ParameterGroup::ForcePower),
    (labels::DELTA_V_TAKEOFF, ParameterGroup::Velocity),
    (labels::IMPULSO_BW, ParameterGroup::Time),
    (labels::TEMPO_VOLO, ParameterGroup::Time),
    (labels::ALTEZZA_CM, ParameterGroup::Height),
    (labels::BILANCIAMENTO_DX, ParameterGroup::Balance),
    (labels::MASSA, ParameterGroup::Mass),
];

#[derive(Debug, Clone, PartialEq)]
pub struct ComparisonRow {
    pub label: String,
    pub group: ParameterGroup,
    pub pre_value: Option<f64>,
    pub post_value: Option<f64>,
    pub diff_percent: Option<f64>,
}

/// Numeric value of an exported cell; `%` suffixes and padding are ignored,
/// anything else non-numeric is undefined.
pub fn parse_metric_value(raw: &str) -> Option<f64> {
    raw.trim()
        .trim_end_matches('%')
        .trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
}

pub fn percent_difference(pre: Option<f64>, post: Option<f64>) -> Option<f64> {
    match (pre, post) {
        (Some(pre), Some(post)) if pre != 0.0 => Some((post - pre) / pre * 100.0),
        _ => None,
    }
}

/// Inner-join both tables on label and keep only the compared parameters.
pub fn compare_tables(pre: &[MetricRow], post: &[MetricRow]) -> Vec<ComparisonRow> {
    let pre_map: HashMap<&str, &str> = pre.iter().map(|r| (r.label.trim(), r.value.as_str())).collect();
    let post_map: HashMap<&str, &str> = post.iter().map(|r| (r.label.trim(), r.value.as_str())).collect();

    COMPARED_PARAMETERS
        .iter()
        .filter_map(|&(label, group)| {
            let pre_value = parse_metric_value(pre_map.get(label)?);
            let post_value = parse_metric_value(post_map.get(label)?);
            Some(ComparisonRow {
                label: label.to_string(),
                group,
                pre_value,
                post_value,
                diff_percent: percent_difference(pre_value, post_value),
            })
        })
        .collect()
}

/// Holds the currently loaded Pre and Post tables; rows are derived on demand
/// so replacing either side is always reflected.
#[derive(Debug, Default)]
pub struct ComparisonSession {
    pre: Option<Vec<MetricRow>>,
    post: Option<Vec<MetricRow>>,
}

impl ComparisonSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_pre(&mut self, rows: Vec<MetricRow>) {
        self.pre = Some(rows);
    }

    pub fn set_post(&mut self, rows: Vec<MetricRow>) {
        self.post = Some(rows);
    }

    pub fn load_pre(&mut self, path: &Path) -> Result<(), CmjError> {
        self.set_pre(read_metrics_csv(path)?);
        Ok(())
    }

    pub fn load_post(&mut self, path: &Path) -> Result<(), CmjError> {
        self.set_post(read_metrics_csv(path)?);
        Ok(())
    }

    /// `None` until both sides are loaded.
    pub fn rows(&self) -> Option<Vec<ComparisonRow>> {
        match (&self.pre, &self.post) {
            (Some(pre), Some(post)) => Some(compare_tables(pre, post)),
            _ => None,
        }
    }
}

#[derive(Debug, Serialize)]
struct ComparisonCsvRow<'a> {
    #[serde(rename = "Parametro")]
    label: &'a str,
    #[serde(rename = "Pre")]
    pre: String,
    #[serde(rename = "Post")]
    post: String,
    #[serde(rename = "Diff %")]
    diff: String,
}

fn format_optional(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_else(|| UNDEFINED.to_string())
}

pub fn write_comparison<W: Write>(rows: &[ComparisonRow], writer: W) -> Result<(), CmjError> {
    let mut wtr = Writer::from_writer(writer);
    for row in rows {
        wtr.serialize(ComparisonCsvRow {
            label: &row.label,
            pre: format_optional(row.pre_value),
            post: format_optional(row.post_value),
            diff: format_optional(row.diff_percent),
        })?;
    }
    wtr.flush().map_err(csv::Error::from)?;
    Ok(())
}
