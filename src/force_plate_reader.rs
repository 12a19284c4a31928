/// Tolerant force-plate recording reader.
///
/// Acquisition software writes comment headers, blank lines and the odd
/// truncated row into its exports. Every row that does not start with three
/// numeric fields is skipped instead of failing the whole trial.
use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{ByteRecord, ReaderBuilder, Trim};
use tracing::debug;

use crate::config::AnalysisConfig;
use crate::error::CmjError;

/// One acquisition tick as written by the plates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RawSample {
    pub time_ms: f64,
    pub left_raw: f64,
    pub right_raw: f64,
}

/// A tick after offset removal and contact thresholding.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrectedSample {
    pub time_ms: f64,
    pub time_s: f64,
    pub left_raw: f64,
    pub right_raw: f64,
    pub left_n: f64,
    pub right_n: f64,
    pub total_force: f64,
}

#[derive(Debug, Clone, Default)]
pub struct RecordingStats {
    pub rows_read: usize,
    pub rows_dropped: usize,
}

pub fn read_recording(path: &Path) -> Result<(Vec<RawSample>, RecordingStats), CmjError> {
    let file = File::open(path).map_err(|e| CmjError::io(path, e))?;
    let (samples, stats) = parse_recording(file)?;
    debug!(
        "read {} samples from {} ({} rows dropped)",
        samples.len(),
        path.display(),
        stats.rows_dropped
    );
    Ok((samples, stats))
}

pub fn parse_recording<R: Read>(reader: R) -> Result<(Vec<RawSample>, RecordingStats), CmjError> {
    let mut rdr = ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .comment(Some(b'#'))
        .trim(Trim::All)
        .from_reader(reader);

    let mut samples = Vec::new();
    let mut stats = RecordingStats::default();
    let mut record = ByteRecord::new();

    while rdr.read_byte_record(&mut record)? {
        stats.rows_read += 1;
        match parse_row(&record) {
            Some(sample) => samples.push(sample),
            None => stats.rows_dropped += 1,
        }
    }

    Ok((samples, stats))
}

pub fn parse_recording_str(text: &str) -> Result<Vec<RawSample>, CmjError> {
    parse_recording(text.as_bytes()).map(|(samples, _)| samples)
}

fn parse_row(record: &ByteRecord) -> Option<RawSample> {
    let field = |i: usize| -> Option<f64> {
        let raw = std::str::from_utf8(record.get(i)?).ok()?;
        raw.trim().parse::<f64>().ok().filter(|v| v.is_finite())
    };

    Some(RawSample {
        time_ms: field(0)?,
        left_raw: field(1)?,
        right_raw: field(2)?,
    })
}

/// Subtract the unloaded offset, floor at zero, then zero anything at or
/// below the contact threshold.
pub fn correct_channel(raw: f64, offset: f64, contact_threshold: f64) -> f64 {
    let corrected = (raw - offset).max(0.0);
    if corrected <= contact_threshold {
        0.0
    } else {
        corrected
    }
}

pub fn normalize(
    raw: &[RawSample],
    offset_left: f64,
    offset_right: f64,
    contact_threshold: f64,
) -> Vec<CorrectedSample> {
    raw.iter()
        .map(|s| {
            let left_n = correct_channel(s.left_raw, offset_left, contact_threshold);
            let right_n = correct_channel(s.right_raw, offset_right, contact_threshold);
            CorrectedSample {
                time_ms: s.time_ms,
                time_s: s.time_ms / 1000.0,
                left_raw: s.left_raw,
                right_raw: s.right_raw,
                left_n,
                right_n,
                total_force: left_n + right_n,
            }
        })
        .collect()
}

pub fn normalize_with(raw: &[RawSample], config: &AnalysisConfig) -> Vec<CorrectedSample> {
    normalize(raw, config.offset_left, config.offset_right, config.contact_threshold)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_malformed_rows_are_skipped() {
        let text = "# plate export v2\n\
                    time,left,right\n\
                    \n\
                    0,50,40\n\
                    100,20\n\
                    200,abc,3\n\
                    300, 12.5 , 7,extra,columns\n";
        let (samples, stats) = parse_recording(text.as_bytes()).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[1], RawSample { time_ms: 300.0, left_raw: 12.5, right_raw: 7.0 });
        assert_eq!(stats.rows_read, 5);
        assert_eq!(stats.rows_dropped, 3);
    }

    #[test]
    fn test_order_is_preserved() {
        let samples = parse_recording_str("200,1,1\n100,2,2\n100,2,2\n").unwrap();
        let times: Vec<f64> = samples.iter().map(|s| s.time_ms).collect();
        assert_eq!(times, vec![200.0, 100.0, 100.0]);
    }

    #[test]
    fn test_contact_threshold_zeroes_small_loads() {
        assert_eq!(correct_channel(53.0, 50.0, 3.0), 0.0);
        assert_eq!(correct_channel(53.5, 50.0, 3.0), 3.5);
        assert_eq!(correct_channel(10.0, 50.0, 3.0), 0.0);
    }

    #[test]
    fn test_normalize_converts_time() {
        let raw = [RawSample { time_ms: 1500.0, left_raw: 300.0, right_raw: 250.0 }];
        let corrected = normalize(&raw, 50.0, 40.0, 3.0);
        assert_eq!(corrected[0].time_s, 1.5);
        assert_eq!(corrected[0].left_n, 250.0);
        assert_eq!(corrected[0].right_n, 210.0);
        assert_eq!(corrected[0].total_force, 460.0);
    }

    proptest! {
        #[test]
        fn prop_corrected_forces_never_negative(
            rows in proptest::collection::vec((0.0f64..1e6, -1e4f64..1e4, -1e4f64..1e4), 0..64),
            offset_left in -1e4f64..1e4,
            offset_right in -1e4f64..1e4,
            contact in 0.0f64..50.0,
        ) {
            let raw: Vec<RawSample> = rows
                .iter()
                .map(|&(t, l, r)| RawSample { time_ms: t, left_raw: l, right_raw: r })
                .collect();
            for s in normalize(&raw, offset_left, offset_right, contact) {
                prop_assert!(s.left_n >= 0.0);
                prop_assert!(s.right_n >= 0.0);
                prop_assert!(s.total_force >= 0.0);
            }
        }
    }
}
