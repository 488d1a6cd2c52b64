use relief_core::Point3;

/// Slope dead band for up/down-mill run splitting.
pub(crate) fn mill_slope_deadband() -> f64 {
    (10.0f64).to_radians().sin()
}

/// One evaluated point along a scan line.
#[derive(Debug, Clone, Copy)]
pub struct CutSample {
    /// Sample index along the scanned line (column for row passes, row for
    /// column passes).
    pub index: usize,
    pub point: Point3,
    /// dZ per unit of travel in the direction of increasing index.
    pub slope_along: f64,
    /// dZ per unit across the scan line.
    pub slope_cross: f64,
}

/// An ordered run of samples; `entry` marks that the tool must re-enter
/// the stock before the first sample.
#[derive(Debug, Clone)]
pub struct Span {
    pub entry: bool,
    pub samples: Vec<CutSample>,
}

/// Reorders the samples of each scanned line into cut spans. Strategies
/// are stateful (the alternating variant carries a toggle counter), so a
/// converter resets them between passes to keep output deterministic.
pub trait ScanStrategy {
    fn next(&mut self, primary: bool, samples: Vec<CutSample>) -> Vec<Span>;
    fn reset(&mut self);
}

/// Always walk in the direction of increasing index.
pub struct PositiveScan;

impl ScanStrategy for PositiveScan {
    fn next(&mut self, _primary: bool, samples: Vec<CutSample>) -> Vec<Span> {
        vec![Span {
            entry: true,
            samples,
        }]
    }

    fn reset(&mut self) {}
}

/// Always walk in the direction of decreasing index.
pub struct NegativeScan;

impl ScanStrategy for NegativeScan {
    fn next(&mut self, _primary: bool, mut samples: Vec<CutSample>) -> Vec<Span> {
        samples.reverse();
        vec![Span {
            entry: true,
            samples,
        }]
    }

    fn reset(&mut self) {}
}

/// Walk forward on odd calls, backward on even calls. On the secondary
/// axis the tool stays down between adjacent lines, so only the first
/// line gets an entry cut there.
pub struct AlternatingScan {
    count: u32,
}

impl AlternatingScan {
    pub fn new() -> Self {
        Self { count: 0 }
    }
}

impl Default for AlternatingScan {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanStrategy for AlternatingScan {
    fn next(&mut self, primary: bool, mut samples: Vec<CutSample>) -> Vec<Span> {
        self.count += 1;
        if self.count % 2 == 0 {
            samples.reverse();
        }
        vec![Span {
            entry: self.count == 1 || primary,
            samples,
        }]
    }

    fn reset(&mut self) {
        self.count = 0;
    }
}

/// Split each line into slope-sign runs and orient every run uphill.
pub struct UpmillScan {
    deadband: f64,
}

impl UpmillScan {
    pub fn new() -> Self {
        Self {
            deadband: mill_slope_deadband(),
        }
    }
}

impl ScanStrategy for UpmillScan {
    fn next(&mut self, _primary: bool, samples: Vec<CutSample>) -> Vec<Span> {
        group_by_sign(samples, self.deadband)
            .into_iter()
            .map(|mut run| {
                if max_slope(&run) < 0.0 {
                    run.reverse();
                }
                Span {
                    entry: true,
                    samples: run,
                }
            })
            .collect()
    }

    fn reset(&mut self) {}
}

/// Split each line into slope-sign runs and orient every run downhill.
pub struct DownmillScan {
    deadband: f64,
}

impl DownmillScan {
    pub fn new() -> Self {
        Self {
            deadband: mill_slope_deadband(),
        }
    }
}

impl ScanStrategy for DownmillScan {
    fn next(&mut self, _primary: bool, samples: Vec<CutSample>) -> Vec<Span> {
        group_by_sign(samples, self.deadband)
            .into_iter()
            .map(|mut run| {
                if max_slope(&run) > 0.0 {
                    run.reverse();
                }
                Span {
                    entry: true,
                    samples: run,
                }
            })
            .collect()
    }

    fn reset(&mut self) {}
}

fn max_slope(run: &[CutSample]) -> f64 {
    run.iter()
        .map(|s| s.slope_along)
        .fold(f64::NEG_INFINITY, f64::max)
}

/// Partition samples into runs of consistent along-scan slope sign. The
/// sample where the sign flips closes one run and opens the next, so
/// adjacent runs share their boundary point.
fn group_by_sign(samples: Vec<CutSample>, deadband: f64) -> Vec<Vec<CutSample>> {
    let mut runs: Vec<Vec<CutSample>> = Vec::new();
    let mut current: Vec<CutSample> = Vec::new();
    let mut sign = 0.0f64;
    for s in samples {
        let k = s.slope_along;
        current.push(s);
        if sign == 0.0 {
            if k < -deadband {
                sign = -1.0;
            } else if k > deadband {
                sign = 1.0;
            }
        } else if sign * k < -deadband {
            sign = -sign;
            runs.push(current);
            current = vec![s];
        }
    }
    if !current.is_empty() {
        runs.push(current);
    }
    runs
}

/// Lace reducer: wraps another strategy and keeps only the steep (or, on
/// the primary axis, the shallow) stretches of each span, snapped outward
/// to the keep quantum so endpoints line up with the primary grid.
pub struct LaceReducer {
    inner: Box<dyn ScanStrategy>,
    /// tan of the contact angle.
    slope: f64,
    /// Keep quantum: pixelstep + 1.
    keep: usize,
}

impl LaceReducer {
    pub fn new(inner: Box<dyn ScanStrategy>, slope: f64, keep: usize) -> Self {
        Self {
            inner,
            slope,
            keep: keep.max(1),
        }
    }
}

impl ScanStrategy for LaceReducer {
    fn next(&mut self, primary: bool, samples: Vec<CutSample>) -> Vec<Span> {
        let mut out = Vec::new();
        for span in self.inner.next(primary, samples) {
            let keeps: Vec<bool> = span
                .samples
                .iter()
                .map(|s| {
                    if primary {
                        s.slope_cross.abs() <= self.slope
                    } else {
                        s.slope_along.abs() > self.slope
                    }
                })
                .collect();
            push_keep_runs(&span, &keeps, self.keep, true, &mut out);
        }
        out
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}

/// Top-skip reducer: keeps only the stretches of each span that actually
/// dip below the stock surface band.
pub struct TopSkipReducer {
    inner: Box<dyn ScanStrategy>,
    /// Z threshold; samples at or above it are skipped.
    threshold: f64,
}

impl TopSkipReducer {
    pub fn new(inner: Box<dyn ScanStrategy>, threshold: f64) -> Self {
        Self { inner, threshold }
    }
}

impl ScanStrategy for TopSkipReducer {
    fn next(&mut self, primary: bool, samples: Vec<CutSample>) -> Vec<Span> {
        let mut out = Vec::new();
        for span in self.inner.next(primary, samples) {
            let keeps: Vec<bool> = span
                .samples
                .iter()
                .map(|s| s.point.z < self.threshold)
                .collect();
            push_keep_runs(&span, &keeps, 1, false, &mut out);
        }
        out
    }

    fn reset(&mut self) {
        self.inner.reset();
    }
}

/// Emit the contiguous keeper runs of `span` as entry-flagged spans.
///
/// Gaps shorter than `quantum` samples do not break a run; when `snap` is
/// set, accepted runs must be at least `quantum` long and their endpoints
/// are pushed outward to quantum multiples.
fn push_keep_runs(span: &Span, keeps: &[bool], quantum: usize, snap: bool, out: &mut Vec<Span>) {
    let n = keeps.len();
    let mut start: Option<usize> = None;
    let mut last_keep = 0usize;

    let mut close = |a: usize, b: usize, out: &mut Vec<Span>| {
        if snap {
            if b - a + 1 < quantum {
                return;
            }
            let s = a - a % quantum;
            let e = (b - b % quantum + quantum - 1).min(n - 1);
            out.push(Span {
                entry: true,
                samples: span.samples[s..=e].to_vec(),
            });
        } else {
            out.push(Span {
                entry: true,
                samples: span.samples[a..=b].to_vec(),
            });
        }
    };

    for (i, &k) in keeps.iter().enumerate() {
        if k {
            if start.is_none() {
                start = Some(i);
            }
            last_keep = i;
        } else if let Some(a) = start {
            if i - last_keep >= quantum {
                close(a, last_keep, out);
                start = None;
            }
        }
    }
    if let Some(a) = start {
        close(a, last_keep, out);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(i: usize, z: f64, slope_along: f64, slope_cross: f64) -> CutSample {
        CutSample {
            index: i,
            point: Point3::new(i as f64, 0.0, z),
            slope_along,
            slope_cross,
        }
    }

    fn flat_line(n: usize) -> Vec<CutSample> {
        (0..n).map(|i| sample(i, -1.0, 0.0, 0.0)).collect()
    }

    #[test]
    fn test_positive_scan_keeps_order() {
        let spans = PositiveScan.next(true, flat_line(4));
        assert_eq!(spans.len(), 1);
        assert!(spans[0].entry);
        assert_eq!(spans[0].samples[0].index, 0);
        assert_eq!(spans[0].samples[3].index, 3);
    }

    #[test]
    fn test_negative_scan_reverses() {
        let spans = NegativeScan.next(true, flat_line(4));
        assert_eq!(spans[0].samples[0].index, 3);
    }

    #[test]
    fn test_alternating_toggles_and_resets() {
        let mut alt = AlternatingScan::new();
        let first = alt.next(true, flat_line(4));
        assert_eq!(first[0].samples[0].index, 0, "odd calls run forward");
        let second = alt.next(true, flat_line(4));
        assert_eq!(second[0].samples[0].index, 3, "even calls run backward");
        alt.reset();
        let third = alt.next(true, flat_line(4));
        assert_eq!(third[0].samples[0].index, 0, "reset restores forward");
    }

    #[test]
    fn test_alternating_entry_only_first_on_secondary() {
        let mut alt = AlternatingScan::new();
        assert!(alt.next(false, flat_line(4))[0].entry);
        assert!(!alt.next(false, flat_line(4))[0].entry);
        assert!(alt.next(true, flat_line(4))[0].entry);
    }

    #[test]
    fn test_upmill_splits_and_orients_runs() {
        // A valley: downhill then uphill.
        let mut samples = Vec::new();
        for i in 0..4 {
            samples.push(sample(i, -(i as f64), -1.0, 0.0));
        }
        for i in 4..8 {
            samples.push(sample(i, i as f64 - 6.0, 1.0, 0.0));
        }
        let spans = UpmillScan::new().next(true, samples);
        assert_eq!(spans.len(), 2);
        // The downhill run is reversed so the tool cuts uphill.
        let first = &spans[0];
        assert!(first.samples.first().unwrap().index > first.samples.last().unwrap().index);
        // The uphill run keeps its order.
        let second = &spans[1];
        assert!(second.samples.first().unwrap().index < second.samples.last().unwrap().index);
        assert!(spans.iter().all(|s| s.entry));
    }

    #[test]
    fn test_downmill_orients_runs_downhill() {
        let mut samples = Vec::new();
        for i in 0..4 {
            samples.push(sample(i, -(i as f64), -1.0, 0.0));
        }
        for i in 4..8 {
            samples.push(sample(i, i as f64 - 6.0, 1.0, 0.0));
        }
        let spans = DownmillScan::new().next(true, samples);
        assert_eq!(spans.len(), 2);
        assert!(spans[0].samples.first().unwrap().index < spans[0].samples.last().unwrap().index);
        assert!(spans[1].samples.first().unwrap().index > spans[1].samples.last().unwrap().index);
    }

    #[test]
    fn test_group_by_sign_shares_boundary_sample() {
        let samples: Vec<CutSample> = vec![
            sample(0, 0.0, -1.0, 0.0),
            sample(1, -1.0, -1.0, 0.0),
            sample(2, 0.0, 1.0, 0.0),
            sample(3, 1.0, 1.0, 0.0),
        ];
        let runs = group_by_sign(samples, mill_slope_deadband());
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].last().unwrap().index, 2);
        assert_eq!(runs[1].first().unwrap().index, 2);
    }

    #[test]
    fn test_lace_secondary_keeps_steep_stretches() {
        // Steep stretch over indices 5..=9 inside a 16-sample line.
        let samples: Vec<CutSample> = (0..16)
            .map(|i| {
                let slope = if (5..=9).contains(&i) { 2.0 } else { 0.1 };
                sample(i, -1.0, slope, 0.0)
            })
            .collect();
        let mut lace = LaceReducer::new(Box::new(PositiveScan), 1.0, 4);
        let spans = lace.next(false, samples);
        assert_eq!(spans.len(), 1);
        let idx: Vec<usize> = spans[0].samples.iter().map(|s| s.index).collect();
        // Snapped outward to the enclosing keep-quantum blocks.
        assert_eq!(*idx.first().unwrap(), 4);
        assert_eq!(*idx.last().unwrap(), 11);
        assert!(spans[0].entry);
    }

    #[test]
    fn test_lace_secondary_rejects_short_stretches() {
        let samples: Vec<CutSample> = (0..16)
            .map(|i| {
                let slope = if i == 8 { 2.0 } else { 0.1 };
                sample(i, -1.0, slope, 0.0)
            })
            .collect();
        let mut lace = LaceReducer::new(Box::new(PositiveScan), 1.0, 4);
        let spans = lace.next(false, samples);
        assert!(spans.is_empty(), "a 1-sample stretch is below the quantum");
    }

    #[test]
    fn test_lace_primary_keeps_shallow_cross_slope() {
        let samples: Vec<CutSample> = (0..8)
            .map(|i| {
                let cross = if i < 4 { 0.2 } else { 3.0 };
                sample(i, -1.0, 0.0, cross)
            })
            .collect();
        let mut lace = LaceReducer::new(Box::new(PositiveScan), 1.0, 2);
        let spans = lace.next(true, samples);
        assert_eq!(spans.len(), 1);
        assert!(spans[0].samples.iter().all(|s| s.index <= 4));
    }

    #[test]
    fn test_lace_bridges_small_gaps() {
        // Two steep stretches separated by a 1-sample dip: with quantum 3
        // the dip must not split the span.
        let samples: Vec<CutSample> = (0..12)
            .map(|i| {
                let slope = if i == 6 { 0.1 } else { 2.0 };
                sample(i, -1.0, slope, 0.0)
            })
            .collect();
        let mut lace = LaceReducer::new(Box::new(PositiveScan), 1.0, 3);
        let spans = lace.next(false, samples);
        assert_eq!(spans.len(), 1);
    }

    #[test]
    fn test_top_skip_drops_surface_stretches() {
        let samples: Vec<CutSample> = (0..8)
            .map(|i| {
                let z = if (2..=5).contains(&i) { -0.5 } else { 0.0 };
                sample(i, z, 0.0, 0.0)
            })
            .collect();
        let mut top = TopSkipReducer::new(Box::new(PositiveScan), -1e-5);
        let spans = top.next(true, samples);
        assert_eq!(spans.len(), 1);
        let idx: Vec<usize> = spans[0].samples.iter().map(|s| s.index).collect();
        assert_eq!(idx, vec![2, 3, 4, 5]);
    }

    #[test]
    fn test_top_skip_preserves_separate_pockets() {
        let samples: Vec<CutSample> = (0..9)
            .map(|i| {
                let z = if i == 1 || i == 7 { -0.5 } else { 0.0 };
                sample(i, z, 0.0, 0.0)
            })
            .collect();
        let mut top = TopSkipReducer::new(Box::new(PositiveScan), -1e-5);
        let spans = top.next(true, samples);
        assert_eq!(spans.len(), 2);
        assert!(spans.iter().all(|s| s.entry));
    }
}
