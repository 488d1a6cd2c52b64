use serde::{Deserialize, Serialize};

/// Unit system for a carving job. All engine math runs on f64/f32 values
/// interpreted in the job's unit system; only the G-code units word differs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Unit {
    #[serde(alias = "in", alias = "inch")]
    Inches,
    #[serde(alias = "mm")]
    Millimeters,
}

impl Unit {
    /// G-code command selecting this unit mode.
    pub fn gcode(&self) -> &'static str {
        match self {
            Unit::Inches => "G20",
            Unit::Millimeters => "G21",
        }
    }

    /// Convert a value from this unit into `target`.
    pub fn convert_to(self, value: f64, target: Unit) -> f64 {
        match (self, target) {
            (Unit::Inches, Unit::Millimeters) => value * 25.4,
            (Unit::Millimeters, Unit::Inches) => value / 25.4,
            _ => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gcode_words() {
        assert_eq!(Unit::Inches.gcode(), "G20");
        assert_eq!(Unit::Millimeters.gcode(), "G21");
    }

    #[test]
    fn test_conversion_round_trip() {
        let mm = Unit::Inches.convert_to(1.0, Unit::Millimeters);
        assert!((mm - 25.4).abs() < 1e-10);
        let back = Unit::Millimeters.convert_to(mm, Unit::Inches);
        assert!((back - 1.0).abs() < 1e-10);
    }

    #[test]
    fn test_short_aliases_parse() {
        #[derive(Deserialize)]
        struct Wrap {
            v: Unit,
        }
        let w: Wrap = toml::from_str("v = \"mm\"").unwrap();
        assert_eq!(w.v, Unit::Millimeters);
        let w: Wrap = toml::from_str("v = \"in\"").unwrap();
        assert_eq!(w.v, Unit::Inches);
    }
}
