//! Confusion-matrix sweep over every k in `1..=k_range`.
//!
//! Each validation sample is searched once at `k_range`; the neighbor list is
//! then fed into an incremental tally so the prediction for every smaller k
//! comes from the same search. Positive means failing throughout.
//!
//! Sweeps over disjoint sample ranges merge additively, which is how batches
//! run on different machines (or different days) are combined. The report
//! file keeps one four-row block per batch.

use std::fs::OpenOptions;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::error::{SearchError, SweepError, TableError};
use crate::knn::{LabeledVector, NeighborIndex, Voting};
use crate::scanner::Label;

/// Inclusive, 1-based range of validation samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SampleRange {
    pub start: usize,
    pub end: usize,
}

impl SampleRange {
    pub fn len(&self) -> usize {
        self.end + 1 - self.start
    }

    pub fn is_empty(&self) -> bool {
        self.end < self.start
    }
}

impl std::fmt::Display for SampleRange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

/// Confusion counts at a single k.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Confusion {
    pub true_pos: u64,
    pub true_neg: u64,
    pub false_pos: u64,
    pub false_neg: u64,
}

impl Confusion {
    pub fn total(&self) -> u64 {
        self.true_pos + self.true_neg + self.false_pos + self.false_neg
    }

    /// `None` only when nothing was counted.
    pub fn accuracy(&self) -> Option<f64> {
        let total = self.total();
        (total > 0).then(|| (self.true_pos + self.true_neg) as f64 / total as f64)
    }

    /// `None` when nothing was predicted failing.
    pub fn precision(&self) -> Option<f64> {
        let predicted = self.true_pos + self.false_pos;
        (predicted > 0).then(|| self.true_pos as f64 / predicted as f64)
    }

    /// `None` when no sample was actually failing.
    pub fn recall(&self) -> Option<f64> {
        let actual = self.true_pos + self.false_neg;
        (actual > 0).then(|| self.true_pos as f64 / actual as f64)
    }

    pub fn f1(&self) -> Option<f64> {
        let (p, r) = (self.precision()?, self.recall()?);
        if p + r == 0.0 {
            return None;
        }
        Some(2.0 * p * r / (p + r))
    }
}

/// Derived metrics for one k.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KMetrics {
    pub k: usize,
    pub accuracy: Option<f64>,
    pub precision: Option<f64>,
    pub recall: Option<f64>,
    pub f1: Option<f64>,
}

/// Best k for each metric, as `(k, value)`. `None` if the metric was
/// undefined at every k.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BestK {
    pub accuracy: Option<(usize, f64)>,
    pub precision: Option<(usize, f64)>,
    pub recall: Option<(usize, f64)>,
    pub f1: Option<(usize, f64)>,
}

/// TP/TN/FP/FN per k, plus the sample ranges they cover.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfusionSweep {
    k_range: usize,
    ranges: Vec<SampleRange>,
    true_pos: Vec<u64>,
    true_neg: Vec<u64>,
    false_pos: Vec<u64>,
    false_neg: Vec<u64>,
}

impl ConfusionSweep {
    pub fn new(k_range: usize) -> Self {
        Self {
            k_range,
            ranges: Vec::new(),
            true_pos: vec![0; k_range],
            true_neg: vec![0; k_range],
            false_pos: vec![0; k_range],
            false_neg: vec![0; k_range],
        }
    }

    pub fn k_range(&self) -> usize {
        self.k_range
    }

    pub fn ranges(&self) -> &[SampleRange] {
        &self.ranges
    }

    /// Number of validation samples covered: the sum of all range lengths.
    pub fn covered(&self) -> u64 {
        self.ranges.iter().map(|r| r.len() as u64).sum()
    }

    /// Count one prediction at `k` (1-based). Returns `false`, counting
    /// nothing, when `k` is outside `1..=k_range`.
    pub fn record(&mut self, k: usize, actual: Label, predicted: Label) -> bool {
        if k == 0 || k > self.k_range {
            return false;
        }
        let i = k - 1;
        match (actual, predicted) {
            (Label::Failing, Label::Failing) => self.true_pos[i] += 1,
            (Label::Healthy, Label::Healthy) => self.true_neg[i] += 1,
            (Label::Healthy, Label::Failing) => self.false_pos[i] += 1,
            (Label::Failing, Label::Healthy) => self.false_neg[i] += 1,
        }
        true
    }

    /// Counts at `k` (1-based), or `None` outside `1..=k_range`.
    pub fn confusion(&self, k: usize) -> Option<Confusion> {
        if k == 0 || k > self.k_range {
            return None;
        }
        let i = k - 1;
        Some(Confusion {
            true_pos: self.true_pos[i],
            true_neg: self.true_neg[i],
            false_pos: self.false_pos[i],
            false_neg: self.false_neg[i],
        })
    }

    /// Add another sweep's counts and ranges into this one.
    pub fn merge(&mut self, other: &ConfusionSweep) -> Result<(), SweepError> {
        if other.k_range != self.k_range {
            return Err(SweepError::KRangeMismatch {
                left: self.k_range,
                right: other.k_range,
            });
        }
        for i in 0..self.k_range {
            self.true_pos[i] += other.true_pos[i];
            self.true_neg[i] += other.true_neg[i];
            self.false_pos[i] += other.false_pos[i];
            self.false_neg[i] += other.false_neg[i];
        }
        self.ranges.extend_from_slice(&other.ranges);
        Ok(())
    }

    pub fn metrics(&self, k: usize) -> Option<KMetrics> {
        let c = self.confusion(k)?;
        Some(KMetrics {
            k,
            accuracy: c.accuracy(),
            precision: c.precision(),
            recall: c.recall(),
            f1: c.f1(),
        })
    }

    pub fn all_metrics(&self) -> Vec<KMetrics> {
        (1..=self.k_range).filter_map(|k| self.metrics(k)).collect()
    }

    /// Strict maximum per metric; the smallest k wins ties.
    pub fn best(&self) -> BestK {
        let all = self.all_metrics();
        BestK {
            accuracy: best_by(&all, |m| m.accuracy),
            precision: best_by(&all, |m| m.precision),
            recall: best_by(&all, |m| m.recall),
            f1: best_by(&all, |m| m.f1),
        }
    }
}

fn best_by(all: &[KMetrics], metric: impl Fn(&KMetrics) -> Option<f64>) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for m in all {
        if let Some(v) = metric(m) {
            if best.is_none_or(|(_, b)| v > b) {
                best = Some((m.k, v));
            }
        }
    }
    best
}

/// Parameters of one sweep run.
#[derive(Debug, Clone, Copy)]
pub struct SweepParams {
    pub range: SampleRange,
    pub k_range: usize,
    pub voting: Voting,
    pub threads: usize,
}

/// Worker count used when none is given.
pub fn default_threads() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Evaluate `validation[range]` against `index` for every k in
/// `1..=k_range`.
pub fn sweep(
    index: &NeighborIndex,
    validation: &[LabeledVector],
    params: &SweepParams,
) -> Result<ConfusionSweep, SweepError> {
    let SampleRange { start, end } = params.range;
    if start == 0 || end < start || end > validation.len() {
        return Err(SweepError::InvalidRange {
            start,
            end,
            available: validation.len(),
        });
    }
    let k_range = params.k_range;
    if k_range == 0 {
        return Err(SearchError::ZeroNeighbors.into());
    }
    if k_range > index.len() {
        return Err(SearchError::InsufficientData {
            requested: k_range,
            available: index.len(),
        }
        .into());
    }

    let queries = &validation[start - 1..end];
    let threads = params.threads.clamp(1, queries.len());
    let chunk_len = queries.len().div_ceil(threads);
    let voting = params.voting;
    log::info!(
        "sweeping samples {} over k=1..{} ({}, {} threads)",
        params.range,
        k_range,
        voting,
        threads
    );

    let partials: Vec<Result<ConfusionSweep, SearchError>> = std::thread::scope(|s| {
        let handles: Vec<_> = queries
            .chunks(chunk_len)
            .map(|chunk| s.spawn(move || sweep_chunk(index, chunk, k_range, voting)))
            .collect();
        handles
            .into_iter()
            .map(|h| match h.join() {
                Ok(result) => result,
                Err(panic) => std::panic::resume_unwind(panic),
            })
            .collect()
    });

    let mut total = ConfusionSweep::new(k_range);
    for partial in partials {
        total.merge(&partial?)?;
    }
    total.ranges = vec![params.range];
    Ok(total)
}

fn sweep_chunk(
    index: &NeighborIndex,
    queries: &[LabeledVector],
    k_range: usize,
    voting: Voting,
) -> Result<ConfusionSweep, SearchError> {
    let mut out = ConfusionSweep::new(k_range);
    for q in queries {
        let neighbors = index.find_neighbors(&q.features, k_range)?;
        let mut tally = voting.tally();
        for (j, n) in neighbors.iter().enumerate() {
            tally.add(n);
            out.record(j + 1, q.label, tally.decision());
        }
    }
    Ok(out)
}

// ---------------------------------------------------------------------------
// Report file
// ---------------------------------------------------------------------------

const ROW_KINDS: [&str; 4] = ["TP", "TN", "FP", "FN"];

/// Append a sweep over a single range to the report at `path` as four rows.
pub fn append_report(path: &Path, sweep: &ConfusionSweep) -> Result<(), TableError> {
    let [range] = sweep.ranges() else {
        return Err(TableError::MergedReport {
            path: path.to_path_buf(),
            ranges: sweep.ranges().len(),
        });
    };
    let io_err = |source| TableError::Io {
        path: path.to_path_buf(),
        source,
    };
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(io_err)?;
    let mut w = BufWriter::new(file);
    for (kind, counts) in ROW_KINDS.iter().zip([
        &sweep.true_pos,
        &sweep.true_neg,
        &sweep.false_pos,
        &sweep.false_neg,
    ]) {
        write!(w, "Samples {range} Inclusive: {kind}").map_err(io_err)?;
        for c in counts {
            write!(w, ",{c}").map_err(io_err)?;
        }
        writeln!(w).map_err(io_err)?;
    }
    w.flush().map_err(io_err)?;
    log::info!("appended samples {range} to {}", path.display());
    Ok(())
}

/// Parse `Samples {start}-{end} Inclusive: {kind}`.
fn parse_row_label(label: &str) -> Option<(SampleRange, usize)> {
    let rest = label.trim().strip_prefix("Samples ")?;
    let (range, kind) = rest.split_once(" Inclusive: ")?;
    let (start, end) = range.split_once('-')?;
    let range = SampleRange {
        start: start.trim().parse().ok()?,
        end: end.trim().parse().ok()?,
    };
    if range.start == 0 || range.is_empty() {
        return None;
    }
    let kind = ROW_KINDS.iter().position(|k| *k == kind.trim())?;
    Some((range, kind))
}

/// Read and merge every block of a report file.
pub fn read_report(path: &Path) -> Result<ConfusionSweep, TableError> {
    let text = std::fs::read_to_string(path).map_err(|source| TableError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let row_err = |line: usize, reason: String| TableError::Row {
        path: path.to_path_buf(),
        line,
        reason,
    };

    let mut merged: Option<ConfusionSweep> = None;
    for (i, line) in text.lines().enumerate() {
        let line_no = i + 1;
        if line.trim().is_empty() {
            continue;
        }
        let mut fields = line.split(',');
        let label = fields.next().unwrap_or_default();
        let (range, kind) = parse_row_label(label)
            .ok_or_else(|| row_err(line_no, format!("bad row label '{label}'")))?;
        let counts = fields
            .map(|f| f.trim().parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| row_err(line_no, format!("bad count: {e}")))?;
        if counts.is_empty() {
            return Err(row_err(line_no, "row has no counts".to_string()));
        }

        let sweep = merged.get_or_insert_with(|| ConfusionSweep::new(counts.len()));
        if counts.len() != sweep.k_range {
            return Err(row_err(
                line_no,
                format!("expected {} counts, found {}", sweep.k_range, counts.len()),
            ));
        }
        let target = match kind {
            0 => {
                sweep.ranges.push(range);
                &mut sweep.true_pos
            }
            1 => &mut sweep.true_neg,
            2 => &mut sweep.false_pos,
            _ => &mut sweep.false_neg,
        };
        for (t, c) in target.iter_mut().zip(counts) {
            *t += c;
        }
    }
    merged.ok_or_else(|| row_err(0, "report is empty".to_string()))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FEATURE_COUNT;

    fn vector(label: Label, x: f64, y: f64) -> LabeledVector {
        let mut features = [0.0; FEATURE_COUNT];
        features[0] = x;
        features[1] = y;
        LabeledVector {
            label,
            class_code: 0,
            features,
            device: None,
        }
    }

    /// Two loose clusters: failing near the origin, healthy near (1, 1).
    fn clusters(n: usize, offset: f64) -> Vec<LabeledVector> {
        (0..n)
            .map(|i| {
                let jitter = ((i * 7) % 11) as f64 / 40.0 + offset;
                if i % 3 == 0 {
                    vector(Label::Failing, jitter, 0.1 - jitter / 2.0)
                } else {
                    vector(Label::Healthy, 1.0 - jitter, 0.9 + jitter / 3.0)
                }
            })
            .collect()
    }

    fn params(start: usize, end: usize, k_range: usize, threads: usize) -> SweepParams {
        SweepParams {
            range: SampleRange { start, end },
            k_range,
            voting: Voting::default(),
            threads,
        }
    }

    #[test]
    fn test_counts_cover_every_sample_at_every_k() {
        let index = NeighborIndex::new(clusters(30, 0.0));
        let validation = clusters(17, 0.013);
        let sweep = sweep(&index, &validation, &params(1, 17, 5, 3)).unwrap();
        assert_eq!(sweep.covered(), 17);
        for k in 1..=5 {
            assert_eq!(sweep.confusion(k).unwrap().total(), 17, "k={k}");
        }
    }

    #[test]
    fn test_thread_count_does_not_change_counts() {
        let index = NeighborIndex::new(clusters(40, 0.0));
        let validation = clusters(23, 0.02);
        let one = sweep(&index, &validation, &params(2, 21, 7, 1)).unwrap();
        let many = sweep(&index, &validation, &params(2, 21, 7, 8)).unwrap();
        assert_eq!(one, many);
        assert_eq!(one.covered(), 20);
    }

    #[test]
    fn test_separable_clusters_classify_perfectly_at_k1() {
        let index = NeighborIndex::new(clusters(30, 0.0));
        let validation = clusters(12, 0.0);
        let sweep = sweep(&index, &validation, &params(1, 12, 1, 2)).unwrap();
        let c = sweep.confusion(1).unwrap();
        assert_eq!(c.false_pos + c.false_neg, 0);
        assert_eq!(c.true_pos, 4);
        assert_eq!(c.true_neg, 8);
    }

    #[test]
    fn test_invalid_ranges_rejected() {
        let index = NeighborIndex::new(clusters(10, 0.0));
        let validation = clusters(5, 0.0);
        for (start, end) in [(0, 3), (4, 3), (1, 6)] {
            assert!(matches!(
                sweep(&index, &validation, &params(start, end, 3, 1)),
                Err(SweepError::InvalidRange { .. })
            ));
        }
        assert_eq!(
            sweep(&index, &validation, &params(1, 5, 11, 1)),
            Err(SweepError::Search(SearchError::InsufficientData {
                requested: 11,
                available: 10
            }))
        );
    }

    #[test]
    fn test_merge_is_additive() {
        let index = NeighborIndex::new(clusters(30, 0.0));
        let validation = clusters(20, 0.01);
        let whole = sweep(&index, &validation, &params(1, 20, 4, 1)).unwrap();
        let mut a = sweep(&index, &validation, &params(1, 8, 4, 1)).unwrap();
        let b = sweep(&index, &validation, &params(9, 20, 4, 1)).unwrap();
        a.merge(&b).unwrap();
        assert_eq!(a.covered(), 20);
        for k in 1..=4 {
            assert_eq!(a.confusion(k), whole.confusion(k));
        }
        assert_eq!(
            a.merge(&ConfusionSweep::new(3)),
            Err(SweepError::KRangeMismatch { left: 4, right: 3 })
        );
    }

    #[test]
    fn test_undefined_metrics() {
        let none_predicted = Confusion {
            true_pos: 0,
            true_neg: 5,
            false_pos: 0,
            false_neg: 2,
        };
        assert_eq!(none_predicted.precision(), None);
        assert_eq!(none_predicted.recall(), Some(0.0));
        assert_eq!(none_predicted.f1(), None);

        let no_positives = Confusion {
            true_pos: 0,
            true_neg: 3,
            false_pos: 1,
            false_neg: 0,
        };
        assert_eq!(no_positives.recall(), None);
        assert_eq!(no_positives.precision(), Some(0.0));

        let all_wrong = Confusion {
            true_pos: 0,
            true_neg: 0,
            false_pos: 2,
            false_neg: 2,
        };
        assert_eq!(all_wrong.f1(), None);
        assert_eq!(all_wrong.accuracy(), Some(0.0));
        assert_eq!(Confusion::default().accuracy(), None);
    }

    #[test]
    fn test_best_k_first_wins_ties() {
        let mut sweep = ConfusionSweep::new(3);
        // k=1: 1 TP, 1 FP; k=2: 2 TP; k=3: 2 TP.
        sweep.record(1, Label::Failing, Label::Failing);
        sweep.record(1, Label::Healthy, Label::Failing);
        for k in 2..=3 {
            sweep.record(k, Label::Failing, Label::Failing);
            sweep.record(k, Label::Healthy, Label::Healthy);
        }
        let best = sweep.best();
        assert_eq!(best.accuracy, Some((2, 1.0)));
        assert_eq!(best.precision, Some((2, 1.0)));
        assert_eq!(best.recall, Some((1, 1.0)));
        assert_eq!(best.f1, Some((2, 1.0)));
    }

    #[test]
    fn test_record_ignores_k_outside_range() {
        let mut sweep = ConfusionSweep::new(2);
        assert!(!sweep.record(0, Label::Failing, Label::Failing));
        assert!(!sweep.record(3, Label::Healthy, Label::Failing));
        assert_eq!(sweep, ConfusionSweep::new(2));
        assert!(sweep.record(2, Label::Failing, Label::Healthy));
        assert_eq!(sweep.confusion(2).unwrap().false_neg, 1);
    }

    #[test]
    fn test_report_append_and_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("k_results.csv");
        let index = NeighborIndex::new(clusters(30, 0.0));
        let validation = clusters(20, 0.01);
        let a = sweep(&index, &validation, &params(1, 10, 4, 2)).unwrap();
        let b = sweep(&index, &validation, &params(11, 20, 4, 2)).unwrap();
        append_report(&path, &a).unwrap();
        append_report(&path, &b).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 8);
        assert!(text.starts_with("Samples 1-10 Inclusive: TP,"));
        assert!(text.contains("Samples 11-20 Inclusive: FN,"));

        let mut expected = a.clone();
        expected.merge(&b).unwrap();
        assert_eq!(read_report(&path).unwrap(), expected);

        let mut merged = a;
        merged.merge(&b).unwrap();
        assert!(matches!(
            append_report(&path, &merged),
            Err(TableError::MergedReport { ranges: 2, .. })
        ));
    }

    #[test]
    fn test_report_rejects_bad_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        std::fs::write(&path, "Samples 1-4 Inclusive: TP,1,2\nSamples 1-4 Inclusive: XX,1,2\n")
            .unwrap();
        match read_report(&path) {
            Err(TableError::Row { line, .. }) => assert_eq!(line, 2),
            other => panic!("expected row error, got {other:?}"),
        }
        std::fs::write(&path, "Samples 1-4 Inclusive: TP,1,2\nSamples 1-4 Inclusive: TN,1\n")
            .unwrap();
        assert!(matches!(
            read_report(&path),
            Err(TableError::Row { line: 2, .. })
        ));
        // A block without counts would otherwise define a sweep over no k.
        std::fs::write(&path, "Samples 1-4 Inclusive: TP\n").unwrap();
        assert!(matches!(
            read_report(&path),
            Err(TableError::Row { line: 1, .. })
        ));
    }

    #[test]
    fn test_row_label_parsing() {
        assert_eq!(
            parse_row_label("Samples 101-250 Inclusive: FP"),
            Some((SampleRange { start: 101, end: 250 }, 2))
        );
        assert_eq!(parse_row_label("Samples 5-4 Inclusive: TP"), None);
        assert_eq!(parse_row_label("Rows 1-4 Inclusive: TP"), None);
    }
}
