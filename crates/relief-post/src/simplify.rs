use relief_core::{Point3, dist_to_segment};

use crate::plane::Plane;

/// Floor for near-zero determinants and axis-sign classification.
const EPSILON: f64 = 1e-5;

/// Motion word carried by a simplified record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MotionWord {
    /// G1 straight feed.
    Feed,
    /// G2 clockwise arc.
    Cw,
    /// G3 counter-clockwise arc.
    Ccw,
}

/// One simplified move: a target point and, for arcs, the center offset
/// from the move's start expressed in the active plane's axes.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotionRecord {
    pub word: MotionWord,
    pub target: Point3,
    pub center: Option<(f64, f64)>,
}

impl MotionRecord {
    fn line(target: Point3) -> Self {
        Self {
            word: MotionWord::Feed,
            target,
            center: None,
        }
    }
}

/// Douglas-Peucker with circular-arc fitting.
///
/// Reduces `points` to motion records whose deviation from the original
/// polyline stays within `tolerance`. When `plane` is `Some`, each segment
/// is also tested against a circle through its endpoints and the
/// tightest-radius interior point; an arc that deviates less than both the
/// tolerance and the worst chord error replaces the whole segment. Passing
/// `None` confines the output to straight moves.
pub fn simplify(points: &[Point3], tolerance: f64, plane: Option<Plane>) -> Vec<MotionRecord> {
    let mut out = Vec::new();
    if points.is_empty() {
        return out;
    }

    enum Task {
        Span { s: usize, e: usize, first: bool },
        Joint(usize),
    }

    let mut stack = vec![Task::Span {
        s: 0,
        e: points.len() - 1,
        first: true,
    }];

    while let Some(task) = stack.pop() {
        let (s, e, first) = match task {
            Task::Joint(i) => {
                out.push(MotionRecord::line(points[i]));
                continue;
            }
            Task::Span { s, e, first } => (s, e, first),
        };

        if s == e {
            out.push(MotionRecord::line(points[s]));
            continue;
        }

        // One sweep finds both the worst chord deviation and the interior
        // point giving the tightest circle through the endpoints.
        let mut worst = s;
        let mut worst_dist = 0.0f64;
        let mut min_rad = f64::INFINITY;
        let mut arc_mid = s;
        for i in s + 1..e {
            let d = dist_to_segment(points[i], points[s], points[e]);
            if d > worst_dist {
                worst_dist = d;
                worst = i;
            }
            if let Some(pl) = plane {
                if let Some((_, rad)) = circumcircle(
                    pl.project(points[s]),
                    pl.project(points[i]),
                    pl.project(points[e]),
                ) {
                    if rad < min_rad {
                        min_rad = rad;
                        arc_mid = i;
                    }
                }
            }
        }

        let arc = if min_rad.is_finite() {
            plane.and_then(|pl| fit_arc(points, s, arc_mid, e, pl, tolerance, worst_dist))
        } else {
            None
        };

        if let Some((word, center_di, center_dj)) = arc {
            out.push(MotionRecord::line(points[s]));
            out.push(MotionRecord {
                word,
                target: points[e],
                center: Some((center_di, center_dj)),
            });
        } else if worst_dist > tolerance {
            if first {
                out.push(MotionRecord::line(points[s]));
                stack.push(Task::Joint(e));
            }
            stack.push(Task::Span {
                s: worst,
                e,
                first: false,
            });
            stack.push(Task::Joint(worst));
            stack.push(Task::Span {
                s,
                e: worst,
                first: false,
            });
        } else if first {
            out.push(MotionRecord::line(points[s]));
            out.push(MotionRecord::line(points[e]));
        }
    }

    out
}

/// Validate the candidate arc through (s, mid, e) in `plane`; on success
/// return the motion word and the center offset from the start point.
fn fit_arc(
    points: &[Point3],
    s: usize,
    mid: usize,
    e: usize,
    plane: Plane,
    tolerance: f64,
    worst_dist: f64,
) -> Option<(MotionWord, f64, f64)> {
    let a = plane.project(points[s]);
    let m = plane.project(points[mid]);
    let b = plane.project(points[e]);
    let (center, radius) = circumcircle(a, m, b)?;

    // Arcs are only trusted inside a single quadrant around their center;
    // anything wider falls back to subdivision.
    if !single_quadrant(center, [a, m, b]) {
        return None;
    }

    let mut worst_arc_dist = 0.0f64;
    for i in s..=e {
        let q = plane.project(points[i]);
        worst_arc_dist = worst_arc_dist.max((planar_dist(q, center) - radius).abs());
        if i < e {
            let chord_mid = plane.project(points[i].midpoint(points[i + 1]));
            worst_arc_dist = worst_arc_dist.max((planar_dist(chord_mid, center) - radius).abs());
        }
    }
    if worst_arc_dist >= tolerance || worst_arc_dist >= worst_dist {
        return None;
    }

    let cross = (m.0 - a.0) * (b.1 - m.1) - (m.1 - a.1) * (b.0 - m.0);
    let mut ccw = cross > 0.0;
    if plane == Plane::Xz {
        ccw = !ccw;
    }
    let word = if ccw { MotionWord::Ccw } else { MotionWord::Cw };
    Some((word, center.0 - a.0, center.1 - a.1))
}

/// Circle through three planar points: (center, radius), or None when the
/// points are close to colinear.
fn circumcircle(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> Option<((f64, f64), f64)> {
    let den = 2.0 * (a.0 * (b.1 - c.1) + b.0 * (c.1 - a.1) + c.0 * (a.1 - b.1));
    if den.abs() < EPSILON {
        return None;
    }
    let a2 = a.0 * a.0 + a.1 * a.1;
    let b2 = b.0 * b.0 + b.1 * b.1;
    let c2 = c.0 * c.0 + c.1 * c.1;
    let ux = (a2 * (b.1 - c.1) + b2 * (c.1 - a.1) + c2 * (a.1 - b.1)) / den;
    let uy = (a2 * (c.0 - b.0) + b2 * (a.0 - c.0) + c2 * (b.0 - a.0)) / den;
    let center = (ux, uy);
    Some((center, planar_dist(a, center)))
}

fn planar_dist(p: (f64, f64), q: (f64, f64)) -> f64 {
    ((p.0 - q.0).powi(2) + (p.1 - q.1).powi(2)).sqrt()
}

/// True when all three points sit in one quadrant around `center`. Points
/// on an axis (coordinate within EPSILON of the center) are compatible
/// with either neighboring quadrant.
fn single_quadrant(center: (f64, f64), pts: [(f64, f64); 3]) -> bool {
    let mut common = 0b1111u8;
    for p in pts {
        common &= quadrant_candidates(p.0 - center.0, p.1 - center.1);
    }
    common != 0
}

/// Bitmask of quadrants (++, -+, --, +-) a sign pair may belong to.
fn quadrant_candidates(dx: f64, dy: f64) -> u8 {
    let sx = axis_sign(dx);
    let sy = axis_sign(dy);
    const QUADRANT_SIGNS: [(i8, i8); 4] = [(1, 1), (-1, 1), (-1, -1), (1, -1)];
    let mut mask = 0u8;
    for (q, (qx, qy)) in QUADRANT_SIGNS.iter().enumerate() {
        if (sx == 0 || sx == *qx) && (sy == 0 || sy == *qy) {
            mask |= 1 << q;
        }
    }
    mask
}

fn axis_sign(v: f64) -> i8 {
    if v.abs() < EPSILON {
        0
    } else if v > 0.0 {
        1
    } else {
        -1
    }
}
