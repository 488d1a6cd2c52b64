use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::tool::Tool;
use crate::units::Unit;

/// Scan axes for a carving phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanPattern {
    Rows,
    Columns,
    #[serde(alias = "columns_first")]
    ColumnsThenRows,
}

impl ScanPattern {
    pub fn rows(self) -> bool {
        self != ScanPattern::Columns
    }

    pub fn columns(self) -> bool {
        self != ScanPattern::Rows
    }

    pub fn columns_first(self) -> bool {
        self == ScanPattern::ColumnsThenRows
    }
}

/// Ordering of samples within each scanned line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanDirection {
    Positive,
    Negative,
    Alternating,
    Upmill,
    Downmill,
}

impl ScanDirection {
    /// Parse a user-supplied direction name. Unknown names fall back to
    /// `Alternating`; the second element reports whether the name was
    /// recognized so callers can surface a warning.
    pub fn parse_lenient(name: &str) -> (Self, bool) {
        match name.trim().to_ascii_lowercase().as_str() {
            "positive" => (ScanDirection::Positive, true),
            "negative" => (ScanDirection::Negative, true),
            "alternating" => (ScanDirection::Alternating, true),
            "upmill" => (ScanDirection::Upmill, true),
            "downmill" => (ScanDirection::Downmill, true),
            _ => (ScanDirection::Alternating, false),
        }
    }
}

/// Which scan converters get wrapped in the lace reducer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaceBound {
    None,
    Secondary,
    Full,
}

/// Where machine (0,0) lands on the image rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    TopLeft,
    TopCenter,
    TopRight,
    MidLeft,
    MidCenter,
    MidRight,
    BotLeft,
    BotCenter,
    BotRight,
    /// Leave machine zero at the image's bottom-left pixel (no translation).
    ArcCenter,
}

impl Origin {
    /// The (x_zero, y_zero) anchor for an image spanning `width` x `height`
    /// physical units. Offsets applied to emitted coordinates are the
    /// negation of the anchor.
    pub fn anchor(self, width: f64, height: f64) -> (f64, f64) {
        let midx = width / 2.0;
        let midy = height / 2.0;
        match self {
            Origin::TopLeft => (0.0, height),
            Origin::TopCenter => (midx, height),
            Origin::TopRight => (width, height),
            Origin::MidLeft => (0.0, midy),
            Origin::MidCenter => (midx, midy),
            Origin::MidRight => (width, midy),
            Origin::BotLeft => (0.0, 0.0),
            Origin::BotCenter => (midx, 0.0),
            Origin::BotRight => (width, 0.0),
            Origin::ArcCenter => (0.0, 0.0),
        }
    }
}

/// Entry-cut geometry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlungeType {
    Simple,
    Arc,
}

/// Roughing-phase parameters. Present iff a roughing phase runs before the
/// finish phase.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Roughing {
    pub tool: Tool,
    pub stepover: f64,
    pub depth_per_pass: f64,
    pub feed: f64,
    pub plunge_feed: f64,
    /// Stock to leave for the finish pass; widens the effective cutter.
    pub offset: f64,
    pub scan_pattern: ScanPattern,
    pub scan_direction: ScanDirection,
    pub cut_perimeter: bool,
}

impl Default for Roughing {
    fn default() -> Self {
        Self {
            tool: Tool::flat(6.0),
            stepover: 3.0,
            depth_per_pass: 3.0,
            feed: 5000.0,
            plunge_feed: 1500.0,
            offset: 1.0,
            scan_pattern: ScanPattern::Rows,
            scan_direction: ScanDirection::Alternating,
            cut_perimeter: false,
        }
    }
}

/// The immutable per-run configuration record. A TOML file may specify any
/// subset of fields; the rest take the defaults below.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub units: Unit,
    pub tool: Tool,

    /// Physical length of the image's full height; fixes the pixel size.
    pub image_yscale: f64,

    /// Rapid-travel clearance height (positive).
    pub z_safe: f64,

    /// Maximum carve depth as a positive magnitude; carving reaches -z_cut.
    pub z_cut: f64,

    pub feed: f64,
    pub plunge_feed: f64,

    /// Distance between adjacent scan lines.
    pub stepover: f64,

    /// Maximum chord/arc deviation allowed by the path simplifier.
    pub tolerance: f64,

    pub scan_pattern: ScanPattern,
    pub scan_direction: ScanDirection,

    pub lace_bound: LaceBound,
    /// Slope threshold (degrees) splitting lace work between the axes.
    pub contact_angle: f64,

    pub origin: Origin,

    /// Flip the intensity-to-depth mapping (lighter = deeper).
    pub invert: bool,

    /// Stretch [min,max] intensity to the full depth range before scaling.
    pub normalize: bool,

    /// When false, samples at the stock surface are skipped entirely.
    pub cut_top: bool,
    /// Surface band (positive magnitude) used by the cut_top filter.
    pub top_tolerance: f64,

    /// Add a border pass along the unscanned axis.
    pub cut_perimeter: bool,

    pub plunge: PlungeType,
    /// Largest lead-in radius for arc plunges, in job units.
    pub entry_arc_max_radius: f64,

    /// Emit straight moves only; G2/G3 and G91.1/G17-19 are suppressed.
    pub disable_arcs: bool,

    /// Within (0, 0.5], interleaves half-stepped secondary passes.
    pub splitstep: f64,

    pub roughing: Option<Roughing>,

    /// Free-form prologue lines; empty means the built-in default header.
    pub header_lines: Vec<String>,
    /// Free-form epilogue lines; empty means `M5` + `M2`.
    pub postscript_lines: Vec<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            units: Unit::Millimeters,
            tool: Tool::ball(4.0),
            image_yscale: 150.0,
            z_safe: 10.0,
            z_cut: 20.0,
            feed: 3000.0,
            plunge_feed: 1500.0,
            stepover: 1.0,
            tolerance: 0.05,
            scan_pattern: ScanPattern::Rows,
            scan_direction: ScanDirection::Alternating,
            lace_bound: LaceBound::None,
            contact_angle: 45.0,
            origin: Origin::BotLeft,
            invert: false,
            normalize: true,
            cut_top: true,
            top_tolerance: 1e-5,
            cut_perimeter: false,
            plunge: PlungeType::Simple,
            entry_arc_max_radius: 0.125,
            disable_arcs: false,
            splitstep: 0.0,
            roughing: None,
            header_lines: Vec::new(),
            postscript_lines: Vec::new(),
        }
    }
}

impl Config {
    /// Parse a configuration from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, Error> {
        Ok(toml::from_str(text)?)
    }

    /// Reject configurations the engine cannot honor. Runs before any
    /// emission so a failed run produces no partial output.
    pub fn validate(&self) -> Result<(), Error> {
        self.tool.validate()?;
        positive("image_yscale", self.image_yscale)?;
        positive("z_safe", self.z_safe)?;
        positive("z_cut", self.z_cut)?;
        positive("feed", self.feed)?;
        positive("plunge_feed", self.plunge_feed)?;
        positive("stepover", self.stepover)?;
        positive("tolerance", self.tolerance)?;
        if !(0.0..=0.5).contains(&self.splitstep) {
            return Err(Error::OutOfRange {
                name: "splitstep".into(),
                value: self.splitstep,
                min: 0.0,
                max: 0.5,
            });
        }
        if self.lace_bound != LaceBound::None
            && !(self.contact_angle > 0.0 && self.contact_angle < 90.0)
        {
            return Err(Error::OutOfRange {
                name: "contact_angle".into(),
                value: self.contact_angle,
                min: 0.0,
                max: 90.0,
            });
        }
        if let Some(rough) = &self.roughing {
            rough.tool.validate()?;
            positive("roughing.stepover", rough.stepover)?;
            positive("roughing.depth_per_pass", rough.depth_per_pass)?;
            positive("roughing.feed", rough.feed)?;
            positive("roughing.plunge_feed", rough.plunge_feed)?;
            if rough.offset < 0.0 {
                return Err(Error::OutOfRange {
                    name: "roughing.offset".into(),
                    value: rough.offset,
                    min: 0.0,
                    max: f64::INFINITY,
                });
            }
        }
        Ok(())
    }
}

fn positive(name: &str, value: f64) -> Result<(), Error> {
    if value > 0.0 {
        Ok(())
    } else {
        Err(Error::OutOfRange {
            name: name.into(),
            value,
            min: 0.0,
            max: f64::INFINITY,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn test_partial_toml_fills_defaults() {
        let cfg = Config::from_toml(
            r#"
units = "in"
image_yscale = 4.0
z_cut = 0.25

[tool]
kind = "flat"
diameter = 0.25
"#,
        )
        .unwrap();
        assert_eq!(cfg.units, Unit::Inches);
        assert_eq!(cfg.tool.kind, crate::tool::ToolKind::Flat);
        assert_eq!(cfg.scan_pattern, ScanPattern::Rows);
        assert!((cfg.feed - 3000.0).abs() < 1e-12);
    }

    #[test]
    fn test_roughing_table_parses() {
        let cfg = Config::from_toml(
            r#"
[roughing]
depth_per_pass = 2.0
offset = 0.5

[roughing.tool]
kind = "flat"
diameter = 8.0
"#,
        )
        .unwrap();
        let rough = cfg.roughing.expect("roughing should be present");
        assert!((rough.depth_per_pass - 2.0).abs() < 1e-12);
        assert!((rough.tool.diameter - 8.0).abs() < 1e-12);
        // Unspecified roughing fields take their own defaults.
        assert!((rough.feed - 5000.0).abs() < 1e-12);
    }

    #[test]
    fn test_validate_rejects_splitstep_above_half() {
        let cfg = Config {
            splitstep: 0.6,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_nonpositive_feed() {
        let cfg = Config {
            feed: 0.0,
            ..Config::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_lenient_direction_parse() {
        assert_eq!(
            ScanDirection::parse_lenient("downmill"),
            (ScanDirection::Downmill, true)
        );
        assert_eq!(
            ScanDirection::parse_lenient("zigzag"),
            (ScanDirection::Alternating, false)
        );
    }

    #[test]
    fn test_origin_anchors() {
        assert_eq!(Origin::BotLeft.anchor(10.0, 8.0), (0.0, 0.0));
        assert_eq!(Origin::TopRight.anchor(10.0, 8.0), (10.0, 8.0));
        assert_eq!(Origin::MidCenter.anchor(10.0, 8.0), (5.0, 4.0));
        assert_eq!(Origin::ArcCenter.anchor(10.0, 8.0), (0.0, 0.0));
    }

    #[test]
    fn test_pattern_axis_flags() {
        assert!(ScanPattern::Rows.rows() && !ScanPattern::Rows.columns());
        assert!(ScanPattern::ColumnsThenRows.rows());
        assert!(ScanPattern::ColumnsThenRows.columns());
        assert!(ScanPattern::ColumnsThenRows.columns_first());
    }
}
