use relief_core::{Point3, Unit};

use crate::plane::Plane;
use crate::simplify::{MotionWord, simplify};

/// Cuts ending above this height are discarded: they would only skim the
/// stock surface. Expressed in engine units and deliberately not rescaled
/// between inch and metric jobs.
const SURFACE_GUARD_Z: f64 = -0.01;

/// Prologue used when no header lines are configured.
pub const DEFAULT_HEADER: &str = "G17 G90 G64 P0.001 M3 S3000";

/// Modal motion state between emitted lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Motion {
    Rapid,
    Feed,
}

impl Motion {
    fn word(self) -> &'static str {
        match self {
            Motion::Rapid => "G0",
            Motion::Feed => "G1",
        }
    }
}

/// Stateful G-code writer. Tracks the last commanded position and motion
/// word so unchanged axes and modal codes are coalesced away, queues cut
/// points between non-cut operations, and flushes the queue through the
/// path simplifier.
pub struct GcodeEmitter {
    lines: Vec<String>,
    last_x: f64,
    last_y: f64,
    last_z: f64,
    last_a: f64,
    last_motion: Option<Motion>,
    cuts: Vec<Point3>,
    plane: Option<Plane>,
    safety_height: f64,
    tolerance: f64,
    units: Unit,
    disable_arcs: bool,
    header: Vec<String>,
    postscript: Vec<String>,
}

impl GcodeEmitter {
    pub fn new(
        units: Unit,
        safety_height: f64,
        tolerance: f64,
        disable_arcs: bool,
        header: Vec<String>,
        postscript: Vec<String>,
    ) -> Self {
        Self {
            lines: Vec::new(),
            last_x: 0.0,
            last_y: 0.0,
            last_z: safety_height,
            last_a: 0.0,
            last_motion: None,
            cuts: Vec::new(),
            plane: None,
            safety_height,
            tolerance,
            units,
            disable_arcs,
            header,
            postscript,
        }
    }

    /// Program prologue: header lines, units word, incremental arc centers
    /// and an initial rapid to clearance height.
    pub fn begin(&mut self) {
        if self.header.is_empty() {
            self.write(DEFAULT_HEADER);
        } else {
            let header = std::mem::take(&mut self.header);
            for line in &header {
                self.write(line.as_str());
            }
            self.header = header;
        }
        self.write(self.units.gcode());
        if !self.disable_arcs {
            self.write("G91.1");
        }
        self.write(format!("G0 Z{:.4}", self.safety_height));
    }

    /// Program epilogue: drain the queue, retract, return home, and close
    /// with the postscript (or spindle-stop + end-of-program).
    pub fn end(&mut self) {
        self.flush();
        self.write(format!("G0 Z{:.4}", self.safety_height));
        self.write("G0 X0 Y0");
        if self.postscript.is_empty() {
            self.write("M5");
            self.write("M2");
        } else {
            let postscript = std::mem::take(&mut self.postscript);
            for line in &postscript {
                self.write(line.as_str());
            }
            self.postscript = postscript;
        }
    }

    /// Select the arc plane. A no-op while arcs are disabled.
    pub fn set_plane(&mut self, plane: Plane) {
        if self.disable_arcs {
            return;
        }
        self.flush();
        if self.plane != Some(plane) {
            self.plane = Some(plane);
            self.write(plane.gcode());
        }
    }

    /// Rapid move with sparse coordinates; missing axes hold their last
    /// commanded value.
    pub fn rapid(&mut self, x: Option<f64>, y: Option<f64>, z: Option<f64>, a: Option<f64>) {
        self.flush();
        self.move_common(x, y, z, a, Motion::Rapid);
    }

    /// Queue a cutting move. Coordinates resolve against the queue tail (or
    /// the last commanded position), and near-surface cuts are dropped by
    /// the stock-clearance guard.
    pub fn cut(&mut self, x: Option<f64>, y: Option<f64>, z: Option<f64>) {
        let tail = self
            .cuts
            .last()
            .copied()
            .unwrap_or(Point3::new(self.last_x, self.last_y, self.last_z));
        let p = Point3::new(x.unwrap_or(tail.x), y.unwrap_or(tail.y), z.unwrap_or(tail.z));
        if p.z > SURFACE_GUARD_Z {
            return;
        }
        self.cuts.push(p);
    }

    /// Immediate straight feed move, bypassing the cut queue (and its
    /// surface guard). Used for entry descents that start above the stock.
    pub fn feed(&mut self, x: Option<f64>, y: Option<f64>, z: Option<f64>) {
        self.flush();
        self.move_common(x, y, z, None, Motion::Feed);
    }

    /// Flush pending cuts and set the feed rate.
    pub fn set_feed(&mut self, feed: f64) {
        self.flush();
        self.write(format!("F{feed:.4}"));
    }

    /// Flush and retract to the clearance height.
    pub fn safety(&mut self) {
        self.flush();
        self.move_common(None, None, Some(self.safety_height), None, Motion::Rapid);
    }

    /// Emit a G-code comment.
    pub fn comment(&mut self, text: &str) {
        self.flush();
        let clean: String = text
            .chars()
            .map(|c| if c == '(' || c == ')' { ' ' } else { c })
            .collect();
        self.write(format!("({clean})"));
    }

    /// Emit a raw arc move ending at `target` with the given in-plane
    /// incremental center offsets. Resets the modal motion word so the
    /// next straight move re-announces itself.
    pub fn arc(&mut self, word: MotionWord, target: Point3, center: (f64, f64)) {
        let plane = self.plane.unwrap_or(Plane::Xy);
        let gword = match word {
            MotionWord::Cw => "G2",
            MotionWord::Ccw => "G3",
            MotionWord::Feed => "G1",
        };
        self.write(format!(
            "{gword} X{:.4} Y{:.4} Z{:.4} {}",
            target.x,
            target.y,
            target.z,
            plane.center_words(center.0, center.1)
        ));
        self.last_x = target.x;
        self.last_y = target.y;
        self.last_z = target.z;
        self.last_motion = None;
    }

    /// Drain the cut queue through the simplifier.
    pub fn flush(&mut self) {
        if self.cuts.is_empty() {
            return;
        }
        let cuts = std::mem::take(&mut self.cuts);
        if cuts.len() == 1 {
            let p = cuts[0];
            self.move_common(Some(p.x), Some(p.y), Some(p.z), None, Motion::Feed);
            return;
        }
        let plane = if self.disable_arcs { None } else { self.plane };
        for rec in simplify(&cuts, self.tolerance, plane) {
            match rec.center {
                Some(center) => self.arc(rec.word, rec.target, center),
                None => self.move_common(
                    Some(rec.target.x),
                    Some(rec.target.y),
                    Some(rec.target.z),
                    None,
                    Motion::Feed,
                ),
            }
        }
    }

    /// Consume the emitter, returning the program lines.
    pub fn into_lines(mut self) -> Vec<String> {
        self.flush();
        self.lines
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    fn move_common(
        &mut self,
        x: Option<f64>,
        y: Option<f64>,
        z: Option<f64>,
        a: Option<f64>,
        motion: Motion,
    ) {
        let x = x.unwrap_or(self.last_x);
        let y = y.unwrap_or(self.last_y);
        let z = z.unwrap_or(self.last_z);
        let a = a.unwrap_or(self.last_a);

        let mut words: Vec<String> = Vec::with_capacity(5);
        if x != self.last_x {
            words.push(format!("X{x:.4}"));
            self.last_x = x;
        }
        if y != self.last_y {
            words.push(format!("Y{y:.4}"));
            self.last_y = y;
        }
        if z != self.last_z {
            words.push(format!("Z{z:.4}"));
            self.last_z = z;
        }
        if a != self.last_a {
            words.push(format!("A{a:.4}"));
            self.last_a = a;
        }
        if words.is_empty() {
            return;
        }
        if self.last_motion != Some(motion) {
            words.insert(0, motion.word().to_string());
            self.last_motion = Some(motion);
        }
        self.write(words.join(" "));
    }

    fn write(&mut self, line: impl Into<String>) {
        self.lines.push(line.into());
    }
}
