pub mod config;
pub mod simulation;
pub mod compute;
pub mod error;

pub use simulation::*;
pub use config::*;
pub use error::{TrafficError, TrafficResult};
