mod config;
mod error;
mod types;

pub use config::*;
pub use error::{BrambleError, Result};
pub use types::*;
