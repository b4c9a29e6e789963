pub mod config;
pub mod error;
pub mod types;

pub use config::{ApiKeys, RunConfig};
pub use error::ClipScoutError;
pub use types::*;
