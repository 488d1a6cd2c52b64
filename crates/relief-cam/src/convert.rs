use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use relief_core::{Config, LaceBound, PlungeType, Point3, Roughing, ScanDirection, ScanPattern};
use relief_field::{DepthImage, FieldError, HeightField, ToolShape};
use relief_post::{GcodeEmitter, Plane};

use crate::entry::{EntryStyle, MillAxis, emit_arc_entry, shrink_entry_radius, simple_entry};
use crate::error::ConvertError;
use crate::scan::{
    AlternatingScan, CutSample, DownmillScan, LaceReducer, NegativeScan, PositiveScan,
    ScanStrategy, Span, TopSkipReducer, UpmillScan,
};

const EPSILON: f64 = 1e-5;

/// Caller-owned cancellation flag, polled at every sample iteration. A
/// cancelled conversion flushes pending cuts and closes the program, so
/// the (truncated) output is still valid G-code.
#[derive(Debug, Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }
}

/// Convert a depth image into G-code lines under `config`.
///
/// Deterministic: identical configuration and pixels produce identical
/// output. All validation happens before the first line is emitted.
pub fn convert(config: &Config, image: &DepthImage) -> Result<Vec<String>, ConvertError> {
    convert_with_cancel(config, image, &CancelToken::new())
}

/// [`convert`] with a caller-owned cancellation flag.
pub fn convert_with_cancel(
    config: &Config,
    image: &DepthImage,
    cancel: &CancelToken,
) -> Result<Vec<String>, ConvertError> {
    config.validate()?;
    if image.height() < 2 {
        return Err(ConvertError::Field(FieldError::ImageTooSmall));
    }
    let pixel_size = config.image_yscale / (image.height() - 1) as f64;

    let finish_shape = ToolShape::build(&config.tool, pixel_size, 0.0)?;
    let rough_shape = config
        .roughing
        .as_ref()
        .map(|r| ToolShape::build(&r.tool, pixel_size, r.offset))
        .transpose()?;

    let halo = finish_shape
        .half()
        .max(rough_shape.as_ref().map_or(0, ToolShape::half));
    let field = HeightField::from_image(image, config.z_cut, config.invert, config.normalize, halo)?;

    let image_h = config.image_yscale;
    let image_w = pixel_size * (image.width() - 1) as f64;
    let (x_zero, y_zero) = config.origin.anchor(image_w, image_h);

    let mut g = GcodeEmitter::new(
        config.units,
        config.z_safe,
        config.tolerance,
        config.disable_arcs,
        config.header_lines.clone(),
        config.postscript_lines.clone(),
    );
    g.begin();
    g.safety();

    if let Some(rough) = &config.roughing {
        g.comment("roughing pass");
        let mut conv = Converter::new(
            &field,
            &mut g,
            rough_shape.expect("shape built when roughing is set"),
            pixel_size,
            PhaseParams::roughing(config, rough),
            (-x_zero, -y_zero),
            cancel.clone(),
        );
        conv.run(Some(rough.depth_per_pass));
        g.comment("finish pass");
    }

    let mut conv = Converter::new(
        &field,
        &mut g,
        finish_shape,
        pixel_size,
        PhaseParams::finish(config),
        (-x_zero, -y_zero),
        cancel.clone(),
    );
    conv.run(None);

    g.end();
    Ok(g.into_lines())
}

/// Per-phase knobs: the finish phase reads them straight from the config,
/// the roughing phase from its dedicated table.
struct PhaseParams {
    feed: f64,
    plunge_feed: f64,
    stepover: f64,
    pattern: ScanPattern,
    direction: ScanDirection,
    cut_perimeter: bool,
    /// Physical distance the swath keeps away from the image edge.
    edge_offset: f64,
    lace_bound: LaceBound,
    contact_angle: f64,
    cut_top: bool,
    top_tolerance: f64,
    plunge: PlungeType,
    entry_arc_max_radius: f64,
    disable_arcs: bool,
    z_safe: f64,
    splitstep: f64,
}

impl PhaseParams {
    fn finish(config: &Config) -> Self {
        Self {
            feed: config.feed,
            plunge_feed: config.plunge_feed,
            stepover: config.stepover,
            pattern: config.scan_pattern,
            direction: config.scan_direction,
            cut_perimeter: config.cut_perimeter,
            edge_offset: 0.0,
            lace_bound: config.lace_bound,
            contact_angle: config.contact_angle,
            cut_top: config.cut_top,
            top_tolerance: config.top_tolerance,
            plunge: config.plunge,
            entry_arc_max_radius: config.entry_arc_max_radius,
            disable_arcs: config.disable_arcs,
            z_safe: config.z_safe,
            splitstep: config.splitstep,
        }
    }

    fn roughing(config: &Config, rough: &Roughing) -> Self {
        Self {
            feed: rough.feed,
            plunge_feed: rough.plunge_feed,
            stepover: rough.stepover,
            pattern: rough.scan_pattern,
            direction: rough.scan_direction,
            cut_perimeter: rough.cut_perimeter,
            edge_offset: ((rough.tool.diameter - config.tool.diameter) / 2.0).max(0.0),
            lace_bound: config.lace_bound,
            contact_angle: config.contact_angle,
            cut_top: config.cut_top,
            top_tolerance: config.top_tolerance,
            plunge: config.plunge,
            entry_arc_max_radius: config.entry_arc_max_radius,
            disable_arcs: config.disable_arcs,
            z_safe: config.z_safe,
            splitstep: config.splitstep,
        }
    }
}

/// Which stored scan strategy a milling call dispatches through. The
/// border pass runs the perpendicular axis with the active axis's
/// strategy, so the selector is explicit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Strat {
    Rows,
    Cols,
}

/// Walks one phase of the program: roughing layers or the finish pass.
/// Owns the phase's swept-height cache and scan strategies; borrows the
/// shared height field and emitter.
struct Converter<'a> {
    field: &'a HeightField,
    g: &'a mut GcodeEmitter,
    shape: ToolShape,
    pixel_size: f64,
    pixelstep: usize,
    splitpixels: usize,
    pixel_offset: usize,
    feed: f64,
    plunge_feed: f64,
    rows_scan: Option<Box<dyn ScanStrategy>>,
    cols_scan: Option<Box<dyn ScanStrategy>>,
    cols_first: bool,
    cut_perimeter: bool,
    entry: EntryStyle,
    disable_arcs: bool,
    z_safe: f64,
    xoffset: f64,
    yoffset: f64,
    /// Current layer floor; swept heights clamp to [rd, 0].
    rd: f64,
    /// Raw swept maxima memoized per pixel; NaN marks an empty slot.
    cache: Vec<f32>,
    cancel: CancelToken,
    cancelled: bool,
}

impl<'a> Converter<'a> {
    fn new(
        field: &'a HeightField,
        g: &'a mut GcodeEmitter,
        shape: ToolShape,
        pixel_size: f64,
        params: PhaseParams,
        offsets: (f64, f64),
        cancel: CancelToken,
    ) -> Self {
        let mut pixelstep = ((params.stepover / pixel_size).floor() as usize).max(1);
        let mut splitpixels = 0;
        if params.splitstep > EPSILON {
            pixelstep = ((pixelstep as f64 * params.splitstep * 2.0).floor() as usize).max(1);
            splitpixels = (pixelstep as f64 * params.splitstep).floor() as usize;
        }
        let pixel_offset = (params.edge_offset / pixel_size).ceil() as usize;

        let (rows_scan, cols_scan) = build_strategies(&params, pixelstep);

        Self {
            field,
            g,
            shape,
            pixel_size,
            pixelstep,
            splitpixels,
            pixel_offset,
            feed: params.feed,
            plunge_feed: params.plunge_feed,
            rows_scan,
            cols_scan,
            cols_first: params.pattern.columns_first(),
            cut_perimeter: params.cut_perimeter,
            entry: match params.plunge {
                PlungeType::Simple => EntryStyle::Simple,
                PlungeType::Arc => EntryStyle::Arc {
                    max_radius: params.entry_arc_max_radius,
                },
            },
            disable_arcs: params.disable_arcs,
            z_safe: params.z_safe,
            xoffset: offsets.0,
            yoffset: offsets.1,
            rd: field.min() as f64,
            cache: vec![f32::NAN; field.rows() * field.cols()],
            cancel,
            cancelled: false,
        }
    }

    /// Run the phase: either roughing layers stepping down by `delta`
    /// until the field minimum (the last layer snaps onto it), or a
    /// single full-depth pass.
    fn run(&mut self, layering: Option<f64>) {
        let floor = self.field.min() as f64;
        match layering {
            Some(delta) => {
                let mut r = -delta;
                while r > floor && !self.cancelled {
                    self.rd = r;
                    self.one_pass();
                    r -= delta;
                }
                if r < floor + EPSILON && !self.cancelled {
                    self.rd = floor;
                    self.one_pass();
                }
            }
            None => {
                self.rd = floor;
                self.one_pass();
            }
        }
    }

    fn one_pass(&mut self) {
        self.g.set_feed(self.feed);
        let rows_active = self.rows_scan.is_some();
        let cols_active = self.cols_scan.is_some();

        if cols_active && self.cols_first {
            self.g.set_plane(Plane::Yz);
            self.mill_cols(Strat::Cols, true, false);
            if rows_active {
                self.g.safety();
            }
        }
        if rows_active {
            self.g.set_plane(Plane::Xz);
            self.mill_rows(Strat::Rows, !self.cols_first, false);
        }
        if cols_active && !self.cols_first {
            self.g.set_plane(Plane::Yz);
            if rows_active {
                self.g.safety();
            }
            self.mill_cols(Strat::Cols, !rows_active, false);
        }
        self.g.safety();
        self.reset_strategies();

        // Border pass: an oversized pixelstep yields exactly the first and
        // last line of the perpendicular axis.
        if self.cut_perimeter && !self.cancelled {
            let step_save = self.pixelstep;
            self.pixelstep = self.field.rows().max(self.field.cols()) + 1;
            if !rows_active && cols_active {
                self.g.set_plane(Plane::Xz);
                self.mill_rows(Strat::Cols, true, true);
                self.g.safety();
            }
            if !cols_active && rows_active {
                self.g.set_plane(Plane::Yz);
                self.mill_cols(Strat::Rows, true, true);
                self.g.safety();
            }
            self.pixelstep = step_save;
            self.reset_strategies();
        }

        self.g.safety();
    }

    fn reset_strategies(&mut self) {
        if let Some(s) = self.rows_scan.as_mut() {
            s.reset();
        }
        if let Some(s) = self.cols_scan.as_mut() {
            s.reset();
        }
    }

    /// Clamped tool floor over pixel (row, col): the memoized swept
    /// maximum, bounded below by the layer floor and above by the stock
    /// surface.
    fn get_z(&mut self, row: usize, col: usize) -> f64 {
        let idx = row * self.field.cols() + col;
        let mut raw = self.cache[idx];
        if raw.is_nan() {
            raw = self.field.sweep(row, col, &self.shape);
            self.cache[idx] = raw;
        }
        (raw as f64).max(self.rd).min(0.0)
    }

    /// dZ per unit X at (row, col), from clamped neighbors.
    fn grad_cols(&mut self, row: usize, col: usize) -> f64 {
        let c1 = col.saturating_sub(1);
        let c2 = (col + 1).min(self.field.cols() - 1);
        if c2 == c1 {
            return 0.0;
        }
        (self.get_z(row, c2) - self.get_z(row, c1)) / ((c2 - c1) as f64 * self.pixel_size)
    }

    /// dZ per unit of increasing row index (toward -Y) at (row, col).
    fn grad_rows(&mut self, row: usize, col: usize) -> f64 {
        let r1 = row.saturating_sub(1);
        let r2 = (row + 1).min(self.field.rows() - 1);
        if r2 == r1 {
            return 0.0;
        }
        (self.get_z(r2, col) - self.get_z(r1, col)) / ((r2 - r1) as f64 * self.pixel_size)
    }

    /// The line schedule along one axis: every `pixelstep` indices from
    /// the (split-shifted) edge offset, forced to include both extreme
    /// lines.
    fn schedule(&self, extent: usize) -> Vec<usize> {
        let off = self.pixel_offset;
        if extent <= 2 * off {
            return Vec::new();
        }
        let stop = extent - off;
        let mut range = Vec::new();
        let mut j = self.splitpixels + off;
        while j < stop {
            range.push(j);
            j += self.pixelstep;
        }
        if range.first() != Some(&off) {
            range.insert(0, off);
        }
        let last = extent - 1 - off;
        if !range.contains(&last) {
            range.push(last);
        }
        range
    }

    fn mill_rows(&mut self, strat: Strat, primary: bool, border_flag: bool) {
        let rows = self.field.rows();
        let cols = self.field.cols();
        let jrange = self.schedule(rows);
        let (i0, i1) = (self.pixel_offset, cols - self.pixel_offset.min(cols));
        let mut strategy = self.take_strategy(strat);

        'lines: for j in jrange {
            let y = (rows - j - 1) as f64 * self.pixel_size + self.yoffset;
            let mut scan = Vec::with_capacity(i1.saturating_sub(i0));
            for i in i0..i1 {
                if self.check_cancel() {
                    break 'lines;
                }
                let x = i as f64 * self.pixel_size + self.xoffset;
                let z = self.get_z(j, i);
                scan.push(CutSample {
                    index: i,
                    point: Point3::new(x, y, z),
                    slope_along: self.grad_cols(j, i),
                    slope_cross: self.grad_rows(j, i),
                });
            }
            for span in strategy.next(primary, scan) {
                if span.samples.is_empty() {
                    continue;
                }
                if span.entry || border_flag {
                    self.entry_cut(MillAxis::Row, j, &span);
                }
                for s in &span.samples {
                    self.g.cut(Some(s.point.x), Some(s.point.y), Some(s.point.z));
                }
            }
            self.g.flush();
        }

        self.put_strategy(strat, strategy);
    }

    fn mill_cols(&mut self, strat: Strat, primary: bool, border_flag: bool) {
        let rows = self.field.rows();
        let cols = self.field.cols();
        let mut jrange = self.schedule(cols);
        jrange.reverse();
        let (i0, i1) = (self.pixel_offset, rows - self.pixel_offset.min(rows));
        let mut strategy = self.take_strategy(strat);

        'lines: for j in jrange {
            let x = j as f64 * self.pixel_size + self.xoffset;
            let mut scan = Vec::with_capacity(i1.saturating_sub(i0));
            for i in i0..i1 {
                if self.check_cancel() {
                    break 'lines;
                }
                let y = (rows - i - 1) as f64 * self.pixel_size + self.yoffset;
                let z = self.get_z(i, j);
                scan.push(CutSample {
                    index: i,
                    point: Point3::new(x, y, z),
                    slope_along: self.grad_rows(i, j),
                    slope_cross: self.grad_cols(i, j),
                });
            }
            for span in strategy.next(primary, scan) {
                if span.samples.is_empty() {
                    continue;
                }
                if span.entry || border_flag {
                    self.entry_cut(MillAxis::Col, j, &span);
                }
                for s in &span.samples {
                    self.g.cut(Some(s.point.x), Some(s.point.y), Some(s.point.z));
                }
            }
            self.g.flush();
        }

        self.put_strategy(strat, strategy);
    }

    fn entry_cut(&mut self, axis: MillAxis, j: usize, span: &Span) {
        let first = span.samples[0].point;
        let arc_radius = match self.entry {
            EntryStyle::Simple => None,
            EntryStyle::Arc { max_radius } => (!self.disable_arcs && span.samples.len() > 1)
                .then(|| self.entry_arc_radius(axis, j, span, max_radius))
                .flatten(),
        };
        match arc_radius {
            Some((approach, radius)) => emit_arc_entry(
                self.g,
                axis,
                approach,
                first,
                radius,
                self.z_safe,
                self.plunge_feed,
                self.feed,
            ),
            None => simple_entry(self.g, self.plunge_feed, self.feed, first),
        }
    }

    /// Approach sign and gouge-limited radius for an arc lead-in, or None
    /// when the first two samples do not fix an approach direction.
    fn entry_arc_radius(
        &mut self,
        axis: MillAxis,
        j: usize,
        span: &Span,
        max_radius: f64,
    ) -> Option<(f64, f64)> {
        let first = span.samples[0].point;
        let second = span.samples[1].point;
        let delta = match axis {
            MillAxis::Row => first.x - second.x,
            MillAxis::Col => first.y - second.y,
        };
        if delta == 0.0 {
            return None;
        }
        let approach = delta.signum();
        let i0 = span.samples[0].index as i64;
        // Index direction of the approach: +Y means decreasing row index.
        let istep = match axis {
            MillAxis::Row => approach as i64,
            MillAxis::Col => -(approach as i64),
        };
        let extent = match axis {
            MillAxis::Row => self.field.cols() as i64,
            MillAxis::Col => self.field.rows() as i64,
        };
        let radius = shrink_entry_radius(
            max_radius,
            self.pixel_size,
            first.z,
            |di| {
                let i = i0 + istep * di;
                if i < 0 || i >= extent {
                    return None;
                }
                Some(match axis {
                    MillAxis::Row => self.get_z(j, i as usize),
                    MillAxis::Col => self.get_z(i as usize, j),
                })
            },
        );
        Some((approach, radius))
    }

    fn take_strategy(&mut self, strat: Strat) -> Box<dyn ScanStrategy> {
        match strat {
            Strat::Rows => self.rows_scan.take(),
            Strat::Cols => self.cols_scan.take(),
        }
        .expect("strategy present for scheduled axis")
    }

    fn put_strategy(&mut self, strat: Strat, strategy: Box<dyn ScanStrategy>) {
        match strat {
            Strat::Rows => self.rows_scan = Some(strategy),
            Strat::Cols => self.cols_scan = Some(strategy),
        }
    }

    fn check_cancel(&mut self) -> bool {
        if !self.cancelled && self.cancel.is_cancelled() {
            self.cancelled = true;
        }
        self.cancelled
    }
}

fn make_strategy(direction: ScanDirection) -> Box<dyn ScanStrategy> {
    match direction {
        ScanDirection::Positive => Box::new(PositiveScan),
        ScanDirection::Negative => Box::new(NegativeScan),
        ScanDirection::Alternating => Box::new(AlternatingScan::new()),
        ScanDirection::Upmill => Box::new(UpmillScan::new()),
        ScanDirection::Downmill => Box::new(DownmillScan::new()),
    }
}

/// Build the row/column strategies for a phase, wrapping them in the lace
/// and top-skip reducers where the configuration asks for them.
fn build_strategies(
    params: &PhaseParams,
    pixelstep: usize,
) -> (Option<Box<dyn ScanStrategy>>, Option<Box<dyn ScanStrategy>>) {
    let mut rows = params
        .pattern
        .rows()
        .then(|| make_strategy(params.direction));
    let mut cols = params
        .pattern
        .columns()
        .then(|| make_strategy(params.direction));

    if params.lace_bound != LaceBound::None && rows.is_some() && cols.is_some() {
        let slope = params.contact_angle.to_radians().tan();
        let keep = pixelstep + 1;
        let (secondary, primary) = if params.pattern.columns_first() {
            (&mut rows, &mut cols)
        } else {
            (&mut cols, &mut rows)
        };
        let inner = secondary.take().expect("secondary strategy");
        *secondary = Some(Box::new(LaceReducer::new(inner, slope, keep)));
        if params.lace_bound == LaceBound::Full {
            let inner = primary.take().expect("primary strategy");
            *primary = Some(Box::new(LaceReducer::new(inner, slope, keep)));
        }
    }

    if !params.cut_top {
        let threshold = -params.top_tolerance;
        if let Some(inner) = rows.take() {
            rows = Some(Box::new(TopSkipReducer::new(inner, threshold)));
        }
        if let Some(inner) = cols.take() {
            cols = Some(Box::new(TopSkipReducer::new(inner, threshold)));
        }
    }

    (rows, cols)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relief_core::Tool;

    fn image(pixels: &[u8], w: usize, h: usize) -> DepthImage {
        DepthImage::from_gray8(pixels, w, h).unwrap()
    }

    fn base_config() -> Config {
        Config {
            tool: Tool::ball(2.0),
            image_yscale: 8.0,
            z_safe: 5.0,
            z_cut: 1.0,
            stepover: 1.0,
            normalize: false,
            scan_direction: ScanDirection::Positive,
            ..Config::default()
        }
    }

    #[test]
    fn test_output_is_deterministic() {
        let im = image(&[10, 80, 160, 240, 5, 90, 170, 250, 0, 60, 120, 200, 30, 90, 150, 210], 4, 4);
        let cfg = Config {
            image_yscale: 3.0,
            ..base_config()
        };
        let a = convert(&cfg, &im).unwrap();
        let b = convert(&cfg, &im).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_invalid_config_produces_no_output() {
        let im = image(&[128; 16], 4, 4);
        let cfg = Config {
            feed: -5.0,
            ..base_config()
        };
        assert!(convert(&cfg, &im).is_err());
    }

    #[test]
    fn test_single_row_image_rejected() {
        let im = image(&[128; 4], 4, 1);
        assert!(matches!(
            convert(&base_config(), &im),
            Err(ConvertError::Field(FieldError::ImageTooSmall))
        ));
    }

    #[test]
    fn test_cancelled_run_still_closes_program() {
        let im = image(&[128; 64], 8, 8);
        let token = CancelToken::new();
        token.cancel();
        let lines = convert_with_cancel(&base_config(), &im, &token).unwrap();
        assert!(lines.iter().any(|l| l == "G21"));
        assert_eq!(lines.last().unwrap(), "M2");
        // No cutting happened.
        assert!(!lines.iter().any(|l| l.starts_with("G1 ") && l.contains("Z-")));
    }

    #[test]
    fn test_roughing_phase_precedes_finish() {
        let im = image(&[0; 64], 8, 8);
        let cfg = Config {
            z_cut: 3.0,
            roughing: Some(Roughing {
                tool: Tool::flat(4.0),
                depth_per_pass: 1.0,
                stepover: 2.0,
                ..Roughing::default()
            }),
            ..base_config()
        };
        let lines = convert(&cfg, &im).unwrap();
        let rough_at = lines.iter().position(|l| l.contains("roughing pass")).unwrap();
        let finish_at = lines.iter().position(|l| l.contains("finish pass")).unwrap();
        assert!(rough_at < finish_at);
    }

    #[test]
    fn test_roughing_layers_step_down() {
        // A black image carves to -3; one-unit layers must appear at
        // -1, -2 and finally -3.
        let im = image(&[0; 64], 8, 8);
        let cfg = Config {
            z_cut: 3.0,
            roughing: Some(Roughing {
                tool: Tool::flat(4.0),
                depth_per_pass: 1.0,
                stepover: 2.0,
                ..Roughing::default()
            }),
            ..base_config()
        };
        let lines = convert(&cfg, &im).unwrap();
        let finish_at = lines.iter().position(|l| l.contains("finish pass")).unwrap();
        let mut depths: Vec<f64> = Vec::new();
        for l in &lines[..finish_at] {
            if let Some(zpos) = l.find('Z') {
                if l.starts_with("G1") || l.starts_with('Z') {
                    let z: f64 = l[zpos + 1..]
                        .split_whitespace()
                        .next()
                        .unwrap()
                        .parse()
                        .unwrap();
                    depths.push(z);
                }
            }
        }
        for target in [-1.0, -2.0, -3.0] {
            assert!(
                depths.iter().any(|z| (z - target).abs() < 1e-6),
                "missing layer at {target}: {depths:?}"
            );
        }
        let deepest_first_layer = depths
            .iter()
            .take_while(|z| **z > -1.5)
            .fold(0.0f64, |a, &z| a.min(z));
        assert!(deepest_first_layer >= -1.0 - 1e-6, "layer floor violated");
    }

    #[test]
    fn test_lace_requires_both_axes() {
        // With rows only, the lace bound must leave the scan untouched
        // rather than dropping every span.
        let im = image(&[128; 64], 8, 8);
        let cfg = Config {
            lace_bound: LaceBound::Full,
            contact_angle: 45.0,
            ..base_config()
        };
        let lines = convert(&cfg, &im).unwrap();
        assert!(lines.iter().any(|l| l.contains("Z-0.498")));
    }
}
