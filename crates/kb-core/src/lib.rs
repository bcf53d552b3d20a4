pub mod config;
pub mod error;
pub mod types;

pub use config::KbConfig;
pub use error::{KbError, Result};
pub use types::*;
