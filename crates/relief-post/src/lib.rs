pub mod emitter;
pub mod plane;
pub mod simplify;
pub mod validate;

pub use emitter::{DEFAULT_HEADER, GcodeEmitter};
pub use plane::Plane;
pub use simplify::{MotionRecord, MotionWord, simplify};
pub use validate::{CheckReport, Limits, check_program};
