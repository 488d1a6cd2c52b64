use relief_core::Point3;

/// The coordinate plane circular moves are interpreted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plane {
    /// G17: arcs in XY, centers as I/J.
    Xy,
    /// G18: arcs in XZ, centers as I/K. Direction sense is inverted
    /// relative to the projected cross product.
    Xz,
    /// G19: arcs in YZ, centers as J/K.
    Yz,
}

impl Plane {
    pub fn gcode(&self) -> &'static str {
        match self {
            Plane::Xy => "G17",
            Plane::Xz => "G18",
            Plane::Yz => "G19",
        }
    }

    /// Project a 3D point onto this plane's two working axes.
    pub fn project(&self, p: Point3) -> (f64, f64) {
        match self {
            Plane::Xy => (p.x, p.y),
            Plane::Xz => (p.x, p.z),
            Plane::Yz => (p.y, p.z),
        }
    }

    /// Format incremental center offsets (relative to the move's start
    /// point) as the plane's two center words.
    pub fn center_words(&self, di: f64, dj: f64) -> String {
        match self {
            Plane::Xy => format!("I{di:.4} J{dj:.4}"),
            Plane::Xz => format!("I{di:.4} K{dj:.4}"),
            Plane::Yz => format!("J{di:.4} K{dj:.4}"),
        }
    }
}
