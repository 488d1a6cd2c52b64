use relief_core::Point3;
use relief_post::{GcodeEmitter, MotionWord};

/// Which axis a scan line runs along; fixes the lead-in arc plane.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MillAxis {
    /// Scan lines along X; lead-in arcs live in XZ (G18).
    Row,
    /// Scan lines along Y; lead-in arcs live in YZ (G19).
    Col,
}

/// How the tool descends from clearance height into a cut span.
#[derive(Debug, Clone, Copy)]
pub enum EntryStyle {
    /// Straight plunge at the plunge feed.
    Simple,
    /// Tangent arc lead-in, at most `max_radius` wide.
    Arc { max_radius: f64 },
}

/// Plunge straight down to the first sample: retract, rapid over it, feed
/// down at the plunge rate, then restore the cutting feed.
pub fn simple_entry(g: &mut GcodeEmitter, plunge_feed: f64, cut_feed: f64, first: Point3) {
    g.set_feed(plunge_feed);
    g.safety();
    g.rapid(Some(first.x), Some(first.y), None, None);
    g.cut(None, None, Some(first.z));
    g.set_feed(cut_feed);
}

/// Shrink the lead-in radius so an arc tangent to the surface at the span
/// start cannot gouge the stock it sweeps over. `lookahead(di)` reports
/// the clamped tool floor `di` pixels along the approach direction, or
/// None past the image edge.
pub fn shrink_entry_radius(
    max_radius: f64,
    pixel_size: f64,
    z0: f64,
    mut lookahead: impl FnMut(i64) -> Option<f64>,
) -> f64 {
    let mut radius = max_radius;
    let limit = (max_radius / pixel_size).ceil() as i64;
    for di in 1..limit {
        let Some(z1) = lookahead(di) else { break };
        let dx = di as f64 * pixel_size;
        let dz = z1 - z0;
        if dz <= 0.0 {
            continue;
        }
        if dz >= dx {
            radius = dx;
            break;
        }
        let r1 = (dx * dx / dz + dz) / 2.0;
        if r1 < radius {
            radius = r1;
        }
        if dx > radius {
            break;
        }
    }
    radius
}

/// Emit the arc lead-in: rapid beside the span start, feed down to the
/// arc's top, then swing down onto the first sample. `approach` is the
/// sign of (first - second) along the scan axis, i.e. which side of the
/// span the tool comes from. The caller has already set the matching arc
/// plane.
pub fn emit_arc_entry(
    g: &mut GcodeEmitter,
    axis: MillAxis,
    approach: f64,
    first: Point3,
    radius: f64,
    z_safe: f64,
    plunge_feed: f64,
    cut_feed: f64,
) {
    g.set_feed(plunge_feed);
    g.safety();

    let z1 = (first.z + radius).min(z_safe);
    // Horizontal reach of the arc between its top at z1 and its tangent
    // point: the center sits a full radius above the span start.
    let drop = z1 - first.z;
    let reach_sq = radius * radius - (radius - drop) * (radius - drop);
    let reach = reach_sq.max(0.0).sqrt();
    let center_rise = (first.z + radius) - z1;

    match axis {
        MillAxis::Row => {
            g.rapid(Some(first.x + approach * reach), Some(first.y), None, None);
            g.feed(None, None, Some(z1));
            let word = if approach > 0.0 {
                MotionWord::Ccw
            } else {
                MotionWord::Cw
            };
            g.arc(word, first, (-approach * reach, center_rise));
        }
        MillAxis::Col => {
            g.rapid(Some(first.x), Some(first.y + approach * reach), None, None);
            g.feed(None, None, Some(z1));
            let word = if approach > 0.0 {
                MotionWord::Cw
            } else {
                MotionWord::Ccw
            };
            g.arc(word, first, (-approach * reach, center_rise));
        }
    }
    g.set_feed(cut_feed);
}
