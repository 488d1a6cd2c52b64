pub mod config;
pub mod error;
pub mod geometry;
pub mod tool;
pub mod units;

pub use config::{Config, LaceBound, Origin, PlungeType, Roughing, ScanDirection, ScanPattern};
pub use error::Error;
pub use geometry::{Point3, Vector3, dist_to_segment};
pub use tool::{Tool, ToolKind};
pub use units::Unit;
