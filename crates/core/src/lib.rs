pub mod config;
pub mod error;
pub mod gate;
pub mod types;

pub use config::{RetryConfig, WakerConfig};
pub use error::*;
pub use gate::{decide, GateDecision, TimeWindowPolicy};
pub use types::*;
