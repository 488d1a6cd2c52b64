use serde::{Deserialize, Serialize};

/// Machine limits a finished program is checked against.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Limits {
    /// Clearance height rapids must stay at or above.
    pub z_safe: f64,
    /// Deepest allowed cut as a positive magnitude.
    pub max_depth: f64,
}

/// Result of checking an emitted program.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CheckReport {
    /// Violations that should abort the job.
    pub errors: Vec<CheckError>,
    /// Oddities worth reviewing that won't damage stock.
    pub warnings: Vec<CheckWarning>,
}

impl CheckReport {
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CheckError {
    /// A rapid move ends below the clearance height.
    RapidBelowSafety { line: usize, z: f64, z_safe: f64 },
    /// A cutting move ends below the deepest configured cut.
    CutBelowFloor { line: usize, z: f64, floor: f64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum CheckWarning {
    /// A cutting move ends above the stock surface (an air move; expected
    /// for arc lead-ins, suspicious otherwise).
    CutAboveSurface { line: usize, z: f64 },
}

impl std::fmt::Display for CheckError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RapidBelowSafety { line, z, z_safe } => write!(
                f,
                "line {line}: rapid ends at Z{z:.4}, below clearance Z{z_safe:.4}"
            ),
            Self::CutBelowFloor { line, z, floor } => write!(
                f,
                "line {line}: cut ends at Z{z:.4}, below the depth floor Z{floor:.4}"
            ),
        }
    }
}

impl std::fmt::Display for CheckWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::CutAboveSurface { line, z } => {
                write!(f, "line {line}: cutting move ends in air at Z{z:.4}")
            }
        }
    }
}

const EPS: f64 = 1e-6;

/// Scan an emitted program and report safety-property violations: rapids
/// must stay at the clearance height, cuts must stay within the depth
/// envelope. Modal motion words are honored, comments skipped.
pub fn check_program<S: AsRef<str>>(lines: &[S], limits: &Limits) -> CheckReport {
    let mut report = CheckReport::default();
    let mut motion: Option<u8> = None;
    for (idx, raw) in lines.iter().enumerate() {
        let line = raw.as_ref().trim();
        if line.is_empty() || line.starts_with('(') {
            continue;
        }
        let mut z: Option<f64> = None;
        for word in line.split_whitespace() {
            let Some((letter, rest)) = word.split_at_checked(1) else {
                continue;
            };
            match letter {
                "G" => {
                    // Only motion words change the modal group; G17-G91.1
                    // and friends pass through.
                    if let Ok(code) = rest.parse::<f64>() {
                        if code == 0.0 || code == 1.0 || code == 2.0 || code == 3.0 {
                            motion = Some(code as u8);
                        }
                    }
                }
                "Z" => z = rest.parse::<f64>().ok(),
                _ => {}
            }
        }
        let Some(z) = z else { continue };
        match motion {
            Some(0) => {
                if z < limits.z_safe - EPS {
                    report.errors.push(CheckError::RapidBelowSafety {
                        line: idx + 1,
                        z,
                        z_safe: limits.z_safe,
                    });
                }
            }
            Some(1..=3) => {
                if z < -limits.max_depth - EPS {
                    report.errors.push(CheckError::CutBelowFloor {
                        line: idx + 1,
                        z,
                        floor: -limits.max_depth,
                    });
                }
                if z > EPS {
                    report
                        .warnings
                        .push(CheckWarning::CutAboveSurface { line: idx + 1, z });
                }
            }
            _ => {}
        }
    }
    report
}

#[cfg(test)]
mod tests {
    use super::*;

    const LIMITS: Limits = Limits {
        z_safe: 10.0,
        max_depth: 2.0,
    };

    #[test]
    fn test_clean_program_passes() {
        let lines = [
            "G21",
            "G0 Z10.0000",
            "G0 X0.0000 Y0.0000",
            "F1500.0000",
            "G1 Z-1.5000",
            "X8.0000",
            "G0 Z10.0000",
            "M2",
        ];
        let report = check_program(&lines, &LIMITS);
        assert!(report.is_ok(), "{:?}", report.errors);
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_rapid_below_safety_flagged() {
        let lines = ["G0 Z10.0000", "G0 Z1.0000"];
        let report = check_program(&lines, &LIMITS);
        assert_eq!(report.errors.len(), 1);
        assert!(matches!(
            report.errors[0],
            CheckError::RapidBelowSafety { line: 2, .. }
        ));
    }

    #[test]
    fn test_cut_below_floor_flagged() {
        let lines = ["G1 Z-2.5000"];
        let report = check_program(&lines, &LIMITS);
        assert!(matches!(
            report.errors[0],
            CheckError::CutBelowFloor { .. }
        ));
    }

    #[test]
    fn test_modal_motion_tracked_across_lines() {
        // The bare Z word inherits G1 from two lines earlier.
        let lines = ["G1 Z-1.0000", "X5.0000", "Z-3.0000"];
        let report = check_program(&lines, &LIMITS);
        assert_eq!(report.errors.len(), 1);
        assert!(matches!(
            report.errors[0],
            CheckError::CutBelowFloor { line: 3, .. }
        ));
    }

    #[test]
    fn test_air_cut_warns() {
        let lines = ["G1 Z5.0000"];
        let report = check_program(&lines, &LIMITS);
        assert!(report.is_ok());
        assert_eq!(report.warnings.len(), 1);
    }

    #[test]
    fn test_comments_ignored() {
        let lines = ["(rapid Z0.0000 in a comment)", "G0 Z10.0000"];
        let report = check_program(&lines, &LIMITS);
        assert!(report.is_ok());
    }
}
