use serde::{Deserialize, Serialize};

use crate::error::Error;

/// A cutter description. `v_angle` is the included angle in degrees and is
/// only meaningful for [`ToolKind::Vee`].
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Tool {
    pub kind: ToolKind,

    /// Cutting diameter in job units.
    pub diameter: f64,

    /// Included V-bit angle in degrees.
    #[serde(default = "default_v_angle")]
    pub v_angle: f64,
}

fn default_v_angle() -> f64 {
    45.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    /// Ball nose endmill
    Ball,
    /// Flat endmill
    Flat,
    /// V-bit engraving cutter
    #[serde(alias = "v")]
    Vee,
}

impl Tool {
    pub fn ball(diameter: f64) -> Self {
        Self {
            kind: ToolKind::Ball,
            diameter,
            v_angle: default_v_angle(),
        }
    }

    pub fn flat(diameter: f64) -> Self {
        Self {
            kind: ToolKind::Flat,
            diameter,
            v_angle: default_v_angle(),
        }
    }

    pub fn vee(diameter: f64, v_angle: f64) -> Self {
        Self {
            kind: ToolKind::Vee,
            diameter,
            v_angle,
        }
    }

    pub fn radius(&self) -> f64 {
        self.diameter / 2.0
    }

    /// How far the cutter's underside sits below its tip at radial distance
    /// `r` from the axis, for a cutter of effective radius `radius`.
    ///
    /// The ball profile is negative (deepest at the tip); callers normalize
    /// the sampled matrix so the minimum lands at zero.
    pub fn envelope(&self, r: f64, radius: f64) -> f64 {
        match self.kind {
            ToolKind::Ball => -(radius * radius - r * r).sqrt(),
            ToolKind::Flat => 0.0,
            ToolKind::Vee => {
                let half = self.v_angle.to_radians() / 2.0;
                r * (std::f64::consts::FRAC_PI_2 - half).tan()
            }
        }
    }

    pub fn validate(&self) -> Result<(), Error> {
        if !(self.diameter > 0.0) {
            return Err(Error::OutOfRange {
                name: "tool.diameter".into(),
                value: self.diameter,
                min: 0.0,
                max: f64::INFINITY,
            });
        }
        if self.kind == ToolKind::Vee && !(self.v_angle > 0.0 && self.v_angle < 180.0) {
            return Err(Error::OutOfRange {
                name: "tool.v_angle".into(),
                value: self.v_angle,
                min: 0.0,
                max: 180.0,
            });
        }
        Ok(())
    }
}
