pub mod analytic;
pub mod config;
pub mod detectors;
pub mod error;
pub mod filter;
pub mod runs;
pub mod signal;
pub mod stats;

pub use config::*;
pub use detectors::*;
pub use error::SpindleError;
pub use filter::*;
pub use signal::*;
