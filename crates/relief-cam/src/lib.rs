pub mod convert;
pub mod entry;
pub mod error;
pub mod scan;

pub use convert::{CancelToken, convert, convert_with_cancel};
pub use entry::{EntryStyle, MillAxis};
pub use error::ConvertError;
pub use scan::{CutSample, ScanStrategy, Span};
