pub mod spindle;

pub use spindle::{
    detect_spindles, detect_spindles_with_config, SpindleDetector, SpindleEvent, SpindleResult,
};
