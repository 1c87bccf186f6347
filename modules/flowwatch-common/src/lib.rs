pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, ErrorPolicy};
pub use error::{FlowwatchError, Result};
pub use types::*;
