mod types;

pub use types::{DriveError, Result};
